//! Content kind detection for the diagnostic log.

use serde::{Deserialize, Serialize};

use crate::headers::split_header_line;

/// How a message body should be rendered in the diagnostic log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Nothing seen yet; rendered as hex.
    #[default]
    Unknown,
    /// Any `text/*` type other than XML; wrapped text.
    Text,
    /// `text/xml`; indented XML.
    Xml,
    /// Encoded or non-text content; hex dump.
    Binary,
}

impl ContentKind {
    /// Classify a `Content-Type` value.
    pub fn from_content_type(value: &str) -> Self {
        if value.contains("text/xml") {
            ContentKind::Xml
        } else if value.contains("text/") {
            ContentKind::Text
        } else {
            ContentKind::Binary
        }
    }
}

/// Tracks the content kind of one message as its headers go by.
///
/// A `Content-Encoding` header always forces [`ContentKind::Binary`]. The
/// first `Content-Type` decides otherwise; later ones are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentKindTracker {
    kind: ContentKind,
}

impl ContentKindTracker {
    /// A tracker that has seen nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything seen so far.
    pub fn reset(&mut self) {
        self.kind = ContentKind::Unknown;
    }

    /// Observe one header by name and value.
    pub fn observe(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("Content-Encoding") {
            self.kind = ContentKind::Binary;
        } else if self.kind == ContentKind::Unknown && name.eq_ignore_ascii_case("Content-Type") {
            self.kind = ContentKind::from_content_type(value);
        }
    }

    /// Observe one raw `Name: value` header line. Lines without a colon are
    /// ignored.
    pub fn observe_line(&mut self, line: &[u8]) {
        let Some((name, value)) = split_header_line(line) else {
            return;
        };
        let name = String::from_utf8_lossy(name);
        let value = String::from_utf8_lossy(value);
        self.observe(name.trim(), &value);
    }

    /// The kind decided so far.
    pub fn kind(&self) -> ContentKind {
        self.kind
    }
}
