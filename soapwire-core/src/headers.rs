//! Raw response header blocks.
//!
//! The network layer hands back response headers as a single raw block: the
//! status line followed by one `Name: value` line per header, each terminated
//! by a NUL byte, with an empty line (a second NUL) ending the block.
//!
//! ```text
//! HTTP/1.1 200 OK\0Content-Type: text/xml\0Content-Length: 312\0\0
//! ```
//!
//! Before the SOAP engine sees the response, the block is rebuilt as CRLF
//! text with the headers that the transport has already acted on removed.

use crate::error::CoreError;

/// Response headers consumed by the transport and never shown to the engine.
///
/// Matched case-insensitively as line prefixes.
pub const CONSUMED_RESPONSE_HEADERS: [&str; 2] = ["Transfer-Encoding:", "WWW-Authenticate:"];

/// Iterator over the lines of a raw NUL-separated header block.
///
/// Stops at the first empty line or at the end of the input.
#[derive(Clone, Debug)]
pub struct RawHeaderLines<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for RawHeaderLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (line, rest) = match self.rest.iter().position(|&b| b == 0) {
            Some(nul) => (&self.rest[..nul], &self.rest[nul + 1..]),
            None => (self.rest, &[][..]),
        };
        if line.is_empty() {
            self.rest = &[];
            return None;
        }
        self.rest = rest;
        Some(line)
    }
}

/// Iterate the lines of a raw header block, status line first.
pub fn raw_header_lines(raw: &[u8]) -> RawHeaderLines<'_> {
    RawHeaderLines { rest: raw }
}

/// Append `lines` to `out` in raw block form, including the terminator.
pub fn encode_raw_header_block<I, L>(lines: I, out: &mut Vec<u8>)
where
    I: IntoIterator<Item = L>,
    L: AsRef<[u8]>,
{
    for line in lines {
        let line = line.as_ref();
        // embedded NULs would split the line
        out.extend(line.iter().map(|&b| if b == 0 { b' ' } else { b }));
        out.push(0);
    }
    out.push(0);
}

/// Split a `Name: value` header line.
///
/// Returns `None` for lines without a colon, such as the status line.
pub fn split_header_line(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let colon = line.iter().position(|&b| b == b':')?;
    let value = line[colon + 1..].trim_ascii_start();
    Some((&line[..colon], value))
}

/// Whether `line` is a header the transport consumes.
pub fn is_consumed_header(line: &[u8]) -> bool {
    CONSUMED_RESPONSE_HEADERS.iter().any(|prefix| {
        line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    })
}

/// Number of bytes [`reconstruct_header_block`] writes for `raw`.
pub fn reconstructed_len(raw: &[u8]) -> usize {
    raw_header_lines(raw)
        .filter(|line| !is_consumed_header(line))
        .map(|line| line.len() + 2)
        .sum::<usize>()
        + 2
}

/// Rebuild a raw header block as CRLF text into `out`.
///
/// Every kept line is followed by CRLF and the block by one more CRLF.
/// Consumed headers ([`CONSUMED_RESPONSE_HEADERS`]) are dropped. Returns the
/// number of bytes written.
///
/// Fails with [`CoreError::HeaderBufferTooSmall`] when `out` is shorter than
/// two bytes, or when a line plus its CRLF would leave no room for the final
/// CRLF. Nothing useful is left in `out` on failure.
pub fn reconstruct_header_block(raw: &[u8], out: &mut [u8]) -> Result<usize, CoreError> {
    let available = out.len();
    let too_small = || CoreError::HeaderBufferTooSmall {
        needed: reconstructed_len(raw),
        available,
    };
    if out.len() < 2 {
        return Err(too_small());
    }

    let mut written = 0;
    for line in raw_header_lines(raw).filter(|line| !is_consumed_header(line)) {
        if written + line.len() + 4 > out.len() {
            return Err(too_small());
        }
        out[written..written + line.len()].copy_from_slice(line);
        written += line.len();
        out[written..written + 2].copy_from_slice(b"\r\n");
        written += 2;
    }

    out[written..written + 2].copy_from_slice(b"\r\n");
    Ok(written + 2)
}
