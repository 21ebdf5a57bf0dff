//! Outgoing message assembly.
//!
//! A SOAP engine emits its request as an arbitrary sequence of partial writes.
//! Authentication and certificate challenges may force the transport to send
//! the request more than once, so the whole message has to be available as a
//! single byte slice before the first transmission. [`MessageAssembler`]
//! collects the writes and reports when the message is complete.
//!
//! Two framings are supported:
//!
//! - **Fixed**: a `Content-Length` was declared before the body. The message
//!   is complete once exactly that many bytes have been written.
//! - **Chunked**: no length was declared. Writes alternate between a
//!   chunk-size line (hex) and a chunk data block; the message is complete
//!   once the terminating `0` size line has been written.
//!
//! ```text
//! "1a\r\n"  <26 bytes>  "\r\n1a\r\n"  <26 bytes>  "\r\n0\r\n\r\n"
//!  size      data        size          data        terminator
//! ```

use crate::buffer::GrowableBuffer;
use crate::error::CoreError;

/// Extra room reserved past a declared chunk for the terminating size line.
pub const CHUNK_TERMINATOR_SLACK: usize = 16;

/// How the body of the current message is delimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// No body write and no length declaration seen yet.
    Undetermined,
    /// Total length declared up front.
    Fixed,
    /// Chunked transfer coding, completed by a `0` size line.
    Chunked,
}

/// Where a completed message lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Accumulated in the assembler's own buffer.
    Buffered(&'a [u8]),
    /// The caller's single write already was the entire message; no copy made.
    Borrowed(&'a [u8]),
}

impl<'a> Payload<'a> {
    /// The message bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Payload::Buffered(bytes) | Payload::Borrowed(bytes) => bytes,
        }
    }

    /// Length of the message in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the message is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Whether the zero-copy path was taken.
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Payload::Borrowed(_))
    }
}

/// Result of feeding one write into the assembler.
#[derive(Debug, PartialEq, Eq)]
pub enum Assembly<'a> {
    /// More data is expected; nothing should be sent yet.
    Incomplete,
    /// The message is complete and ready to send.
    Complete(Payload<'a>),
}

impl Assembly<'_> {
    /// Whether this write completed the message.
    pub fn is_complete(&self) -> bool {
        matches!(self, Assembly::Complete(_))
    }
}

/// A parsed chunk-size line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkSizeLine {
    /// A data chunk of the given size follows.
    Data(usize),
    /// The terminating zero-length chunk.
    Terminator,
}

/// Parse a chunk-size line.
///
/// Surrounding CR, LF, space and tab characters are ignored, as is a
/// `;extension` suffix. The line is the terminator only when what remains is
/// exactly `0`.
pub fn parse_chunk_size_line(line: &[u8]) -> Result<ChunkSizeLine, CoreError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| CoreError::protocol("chunk-size line is not valid ASCII"))?;
    let text = text.trim_matches(|c| matches!(c, '\r' | '\n' | ' ' | '\t'));
    let size = match text.split_once(';') {
        Some((size, _extension)) => size.trim_end(),
        None => text,
    };

    if size == "0" {
        return Ok(ChunkSizeLine::Terminator);
    }
    usize::from_str_radix(size, 16)
        .map(ChunkSizeLine::Data)
        .map_err(|_| CoreError::Protocol(format!("malformed chunk-size line {size:?}")))
}

/// Strip the chunked transfer coding from a complete chunked body.
///
/// Accepts the layout [`MessageAssembler`] accumulates, where the CRLF that
/// closes a chunk arrives as the start of the next size line.
pub fn decode_chunked_body(body: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::with_capacity(body.len());
    let mut rest = body;
    loop {
        let start = rest
            .iter()
            .position(|&b| !matches!(b, b'\r' | b'\n'))
            .ok_or_else(|| CoreError::protocol("chunked body ends without a terminator"))?;
        rest = &rest[start..];
        let eol = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());

        match parse_chunk_size_line(&rest[..eol])? {
            ChunkSizeLine::Terminator => return Ok(out),
            ChunkSizeLine::Data(size) => {
                rest = rest.get(eol + 1..).unwrap_or_default();
                let chunk = rest.get(..size).ok_or_else(|| {
                    CoreError::Protocol(format!("chunk of {size} bytes is truncated"))
                })?;
                out.extend_from_slice(chunk);
                rest = &rest[size..];
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Assembling,
    Complete,
}

/// Accumulates partial writes into one complete outgoing message.
///
/// Call [`begin`](Self::begin) when a new request's header block starts,
/// [`declare_length`](Self::declare_length) if a `Content-Length` header is
/// written, then [`push`](Self::push) every body write. The first push that
/// completes the message returns [`Assembly::Complete`].
///
/// Invariant: `accumulated() <= capacity()`.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: GrowableBuffer,
    accumulated: usize,
    expected: Option<usize>,
    provisional: usize,
    framing: Framing,
    expecting_size_line: bool,
    phase: Phase,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    /// Create an idle assembler with an empty buffer.
    pub fn new() -> Self {
        Self::with_buffer(GrowableBuffer::new())
    }

    /// Create an idle assembler reusing `buffer`.
    pub fn with_buffer(buffer: GrowableBuffer) -> Self {
        Self {
            buffer,
            accumulated: 0,
            expected: None,
            provisional: 0,
            framing: Framing::Undetermined,
            expecting_size_line: false,
            phase: Phase::Idle,
        }
    }

    /// Start a new message, discarding any previous state.
    pub fn begin(&mut self) {
        self.accumulated = 0;
        self.expected = None;
        self.provisional = 0;
        self.framing = Framing::Undetermined;
        self.expecting_size_line = false;
        self.phase = Phase::Assembling;
    }

    /// Record a declared total length and pre-grow the buffer to hold it.
    pub fn declare_length(&mut self, length: usize) -> Result<(), CoreError> {
        self.require_assembling()?;
        if self.expected.is_some() || self.framing == Framing::Fixed {
            return Err(CoreError::protocol("Content-Length declared twice"));
        }
        if self.accumulated > 0 || self.framing == Framing::Chunked {
            return Err(CoreError::protocol(
                "Content-Length declared after the body framing was fixed",
            ));
        }

        self.expected = Some(length);
        self.framing = Framing::Fixed;
        if length > 0 {
            if let Err(e) = self.buffer.ensure(length) {
                self.abandon();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Mark the message as chunked before any body data was written.
    ///
    /// Optional: chunked framing is also inferred when the first body write
    /// arrives without a declared length.
    pub fn declare_chunked(&mut self) -> Result<(), CoreError> {
        self.require_assembling()?;
        match self.framing {
            Framing::Undetermined => {
                self.framing = Framing::Chunked;
                self.expecting_size_line = true;
                Ok(())
            }
            Framing::Chunked => Ok(()),
            Framing::Fixed => Err(CoreError::protocol(
                "chunked transfer coding declared for a fixed-length message",
            )),
        }
    }

    /// Feed one body write.
    ///
    /// On error the message is abandoned and the caller must restart the whole
    /// request with [`begin`](Self::begin).
    pub fn push<'a>(&'a mut self, data: &'a [u8]) -> Result<Assembly<'a>, CoreError> {
        self.require_assembling()?;

        if self.framing == Framing::Undetermined {
            if data.is_empty() {
                // empty body, nothing will follow
                self.expected = Some(0);
                self.framing = Framing::Fixed;
            } else {
                self.framing = Framing::Chunked;
                self.expecting_size_line = true;
            }
        }

        match self.framing {
            Framing::Fixed => self.push_fixed(data),
            _ => self.push_chunked(data),
        }
    }

    fn push_fixed<'a>(&'a mut self, data: &'a [u8]) -> Result<Assembly<'a>, CoreError> {
        let expected = self.expected.unwrap_or(0);

        if self.accumulated == 0 && data.len() == expected {
            self.phase = Phase::Complete;
            return Ok(Assembly::Complete(Payload::Borrowed(data)));
        }
        if data.is_empty() {
            return Ok(Assembly::Incomplete);
        }

        let total = self.accumulated + data.len();
        if total > expected {
            self.abandon();
            return Err(CoreError::Protocol(format!(
                "body write overruns declared Content-Length: {total} > {expected}"
            )));
        }

        self.append(data)?;
        if self.accumulated == expected {
            self.phase = Phase::Complete;
            return Ok(Assembly::Complete(Payload::Buffered(
                self.buffer.prefix(self.accumulated),
            )));
        }
        Ok(Assembly::Incomplete)
    }

    fn push_chunked<'a>(&'a mut self, data: &'a [u8]) -> Result<Assembly<'a>, CoreError> {
        if data.is_empty() {
            return Ok(Assembly::Incomplete);
        }

        if !self.expecting_size_line {
            self.append(data)?;
            self.expecting_size_line = true;
            return Ok(Assembly::Incomplete);
        }

        let line = match parse_chunk_size_line(data) {
            Ok(line) => line,
            Err(e) => {
                self.abandon();
                return Err(e);
            }
        };

        match line {
            ChunkSizeLine::Terminator => {
                self.append(data)?;
                self.expected = Some(self.accumulated);
                self.phase = Phase::Complete;
                Ok(Assembly::Complete(Payload::Buffered(
                    self.buffer.prefix(self.accumulated),
                )))
            }
            ChunkSizeLine::Data(size) => {
                let bound = self
                    .accumulated
                    .checked_add(data.len())
                    .and_then(|n| n.checked_add(size))
                    .and_then(|n| n.checked_add(CHUNK_TERMINATOR_SLACK));
                let Some(bound) = bound else {
                    self.abandon();
                    return Err(CoreError::Protocol(format!("chunk size {size:#x} too large")));
                };
                if let Err(e) = self.buffer.ensure(bound) {
                    self.abandon();
                    return Err(e);
                }
                self.provisional = bound;
                self.append(data)?;
                self.expecting_size_line = false;
                Ok(Assembly::Incomplete)
            }
        }
    }

    fn append(&mut self, data: &[u8]) -> Result<(), CoreError> {
        if let Err(e) = self.buffer.write_at(self.accumulated, data) {
            self.abandon();
            return Err(e);
        }
        self.accumulated += data.len();
        Ok(())
    }

    fn require_assembling(&self) -> Result<(), CoreError> {
        match self.phase {
            Phase::Assembling => Ok(()),
            Phase::Idle => Err(CoreError::protocol("no message in progress")),
            Phase::Complete => Err(CoreError::protocol(
                "message already complete; begin a new request",
            )),
        }
    }

    /// Drop the message in progress.
    pub fn abandon(&mut self) {
        self.accumulated = 0;
        self.expected = None;
        self.provisional = 0;
        self.expecting_size_line = false;
        self.phase = Phase::Idle;
    }

    /// Bytes accumulated for the current message.
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    /// Total message size, once known.
    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    /// Upper bound used to pre-size the buffer while a chunked message is
    /// still open.
    pub fn provisional_length(&self) -> usize {
        self.provisional
    }

    /// Framing of the current message.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Whether the next chunked write is expected to be a chunk-size line.
    pub fn expecting_chunk_size_line(&self) -> bool {
        self.expecting_size_line
    }

    /// Whether a message is currently being assembled.
    pub fn in_progress(&self) -> bool {
        self.phase == Phase::Assembling
    }

    /// Whether the last message was completed.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Allocated size of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// The underlying buffer, for reuse once the message has been sent.
    pub fn buffer_mut(&mut self) -> &mut GrowableBuffer {
        &mut self.buffer
    }
}
