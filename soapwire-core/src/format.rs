//! Pretty printers for message bodies in the diagnostic log.
//!
//! - [`hex_dump`]: offset, hex and printable ASCII, 24 bytes per line
//! - [`wrap_text`]: text broken at 120 columns
//! - [`indent_xml`]: one element per line, 2-space indent
//!
//! All of them append to a `String` and never fail; non UTF-8 input is
//! rendered lossily.

use crate::content::ContentKind;

/// Bytes per hex dump line.
pub const HEX_COLUMNS: usize = 24;

/// Maximum text line length before a break is inserted.
pub const WRAP_COLUMNS: usize = 120;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
// offset, hex with a gap every 8 bytes, two spaces, ascii
const HEX_LINE_LEN: usize = 7 + HEX_COLUMNS * 3 + HEX_COLUMNS / 3 + 2 + HEX_COLUMNS;
const HEX_ASCII_START: usize = 7 + 3 + HEX_COLUMNS * 3 + 2;

/// Render `data` according to `kind`.
///
/// [`ContentKind::Unknown`] and [`ContentKind::Binary`] are hex dumped.
pub fn render(kind: ContentKind, data: &[u8], out: &mut String) {
    match kind {
        ContentKind::Xml => indent_xml(data, out),
        ContentKind::Text => wrap_text(data, out),
        ContentKind::Unknown | ContentKind::Binary => hex_dump(data, out),
    }
}

/// Hex dump with a 5-digit decimal offset, 24 bytes per line.
///
/// ```text
/// 00000: 3c 3f 78 6d 6c 20 76 65  72 73 69 6f 6e ...   <?xml version...
/// ```
pub fn hex_dump(data: &[u8], out: &mut String) {
    for (row, chunk) in data.chunks(HEX_COLUMNS).enumerate() {
        let offset = row * HEX_COLUMNS;
        let mut line = [b' '; HEX_LINE_LEN];

        let mut digits = offset;
        for slot in (0..5).rev() {
            line[slot] = b'0' + (digits % 10) as u8;
            digits /= 10;
        }
        line[5] = b':';

        for (n, &byte) in chunk.iter().enumerate() {
            let at = 7 + n * 3 + n / 8;
            line[at] = HEX_DIGITS[usize::from(byte >> 4)];
            line[at + 1] = HEX_DIGITS[usize::from(byte & 0x0f)];
            line[HEX_ASCII_START + n] = if (32..127).contains(&byte) { byte } else { b'.' };
        }

        // the line is pure ASCII
        out.push_str(&String::from_utf8_lossy(&line));
        out.push('\n');
    }
}

/// Text broken into lines of at most 120 characters.
///
/// Existing line breaks restart the count.
pub fn wrap_text(data: &[u8], out: &mut String) {
    let text = String::from_utf8_lossy(data);
    let mut column = 0;
    for ch in text.chars() {
        if column == WRAP_COLUMNS {
            out.push('\n');
            column = 0;
        }
        out.push(ch);
        column = if ch == '\n' { 1 } else { column + 1 };
    }
    if !text.is_empty() {
        out.push('\n');
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemKind {
    Text,
    Open,
    Close,
    // processing instructions, self-closing tags
    Other,
}

#[derive(Clone, Copy, Debug)]
struct Item {
    kind: ItemKind,
    start: usize,
    end: usize,
    ends_with_newline: bool,
    split_attributes: bool,
}

const ENVELOPE_PREFIX: &[u8] = b"<SOAP-ENV:Envelope ";

fn next_item(buf: &[u8], start: usize) -> Option<Item> {
    if start >= buf.len() {
        return None;
    }
    let mut item = Item {
        kind: ItemKind::Open,
        start,
        end: start,
        ends_with_newline: false,
        split_attributes: false,
    };

    if buf[start] != b'<' {
        let end = buf[start..]
            .iter()
            .position(|&b| b == b'<')
            .map_or(buf.len(), |p| start + p);
        item.kind = ItemKind::Text;
        item.end = end;
        item.ends_with_newline = buf[end - 1] == b'\n';
        return Some(item);
    }

    let close = buf[start..].iter().position(|&b| b == b'>').map(|p| start + p);
    let Some(gt) = close else {
        item.kind = ItemKind::Text;
        item.end = buf.len();
        return Some(item);
    };
    item.end = gt + 1;

    if gt <= start + 1 {
        item.kind = ItemKind::Text;
    } else if buf[start + 1] == b'/' {
        item.kind = ItemKind::Close;
    } else if matches!(buf[gt - 1], b'/' | b'?') {
        item.kind = ItemKind::Other;
    } else if item.end - start > ENVELOPE_PREFIX.len()
        && buf[start..start + ENVELOPE_PREFIX.len()].eq_ignore_ascii_case(ENVELOPE_PREFIX)
    {
        item.split_attributes = true;
    }
    Some(item)
}

fn has_child_element(buf: &[u8], mut pos: usize) -> bool {
    while let Some(item) = next_item(buf, pos) {
        pos = item.end;
        match item.kind {
            ItemKind::Open => return true,
            ItemKind::Close => return false,
            _ => {}
        }
    }
    false
}

fn push_indent(out: &mut String, indent: isize) {
    for _ in 0..indent.max(0) {
        out.push(' ');
    }
}

fn push_bytes(out: &mut String, bytes: &[u8]) {
    out.push_str(&String::from_utf8_lossy(bytes));
}

fn write_text(buf: &[u8], item: &Item, indent: isize, out: &mut String) {
    let end = item.end;
    let mut pos = item.start;
    while pos < end {
        let mut len = 0;
        let mut newline = false;
        while len < WRAP_COLUMNS && pos + len < end {
            if matches!(buf[pos + len], b'\r' | b'\n') {
                newline = true;
                break;
            }
            len += 1;
        }
        push_bytes(out, &buf[pos..pos + len]);
        pos += len;

        if pos < end || newline {
            out.push('\n');
            if pos < end && buf[pos] == b'\r' {
                pos += 1;
            }
            if pos < end && buf[pos] == b'\n' {
                pos += 1;
            }
        }
        if pos < end {
            push_indent(out, indent);
        }
    }
}

fn write_split_tag(buf: &[u8], item: &Item, indent: isize, out: &mut String) {
    let end = item.end;
    let mut cur = item.start;
    while cur < end && buf[cur] != b' ' {
        cur += 1;
    }
    while cur < end && buf[cur] == b' ' {
        cur += 1;
    }
    push_bytes(out, &buf[item.start..cur]);

    let indent = indent + 4;
    let mut pos = cur;
    while pos < end {
        while cur < end && buf[cur] != b'=' {
            cur += 1;
        }
        if cur < end {
            cur += 1;
            if cur < end && buf[cur] == b'"' {
                cur += 1;
                while cur < end && buf[cur] != b'"' {
                    cur += 1;
                }
                if cur < end {
                    cur += 1;
                }
            }
        }
        if cur < end && buf[cur] == b' ' {
            cur += 1;
        }
        if cur < end && buf[cur] == b'>' {
            cur += 1;
        }

        out.push('\n');
        push_indent(out, indent);
        push_bytes(out, &buf[pos..cur]);
        pos = cur;
    }
}

/// XML with one element per line and a 2-space indent.
///
/// Elements whose only content is text stay on one line. The attributes of a
/// `SOAP-ENV:Envelope` start tag are placed one per line, four columns deeper
/// than the tag. Text longer than 120 characters is wrapped and CRLF is
/// turned into LF.
pub fn indent_xml(data: &[u8], out: &mut String) {
    let mut indent: isize = 0;
    let mut inline = false;
    let mut pos = 0;

    while let Some(item) = next_item(data, pos) {
        pos = item.end;

        if item.kind == ItemKind::Close {
            indent -= 2;
        }
        if !inline {
            push_indent(out, indent);
        }
        if item.kind == ItemKind::Close {
            inline = false;
        }

        match item.kind {
            ItemKind::Text => write_text(data, &item, indent, out),
            _ if item.split_attributes => write_split_tag(data, &item, indent, out),
            _ => push_bytes(out, &data[item.start..item.end]),
        }

        if item.kind == ItemKind::Open {
            indent += 2;
            if !has_child_element(data, pos) {
                inline = true;
            }
        }
        if !item.ends_with_newline && !inline {
            out.push('\n');
        }
    }
}
