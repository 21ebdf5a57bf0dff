//! Diagnostic logging.
//!
//! Every step of the adapter goes through one [`DiagnosticLog`]. Lines are
//! always emitted as `tracing` debug events (with the `tracing` feature) and,
//! when a [`LogSink`] is attached, also written to it with a timestamp and the
//! session id. Message bodies are pretty-printed according to their
//! [`ContentKind`] before they reach the sink.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use soapwire_core::ContentKind;
use soapwire_core::format;

/// Destination for diagnostic text.
///
/// Writes are best effort: a sink never fails the operation being logged.
pub trait LogSink: Send {
    /// Append `text`, which already ends with a newline.
    fn write(&mut self, text: &str);
}

/// Appends to a file, flushing after every write.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open `path` for appending and write a separator line.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", "-".repeat(80))?;
        file.flush()?;
        Ok(Self { path, file })
    }

    /// The file being appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write(&mut self, text: &str) {
        // a failing log file must not fail the request
        let _ = self.file.write_all(text.as_bytes());
        let _ = self.file.flush();
    }
}

/// Collects diagnostic output for one transport.
pub struct DiagnosticLog {
    sink: Option<Box<dyn LogSink>>,
    session_id: u32,
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("sink", &self.sink.as_ref().map(|_| "..."))
            .field("session_id", &format_args!("{:08x}", self.session_id))
            .finish()
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    /// A log without a sink.
    pub fn new() -> Self {
        Self {
            sink: None,
            session_id: rand::random(),
        }
    }

    /// Attach or detach a sink.
    pub fn set_sink(&mut self, sink: Option<Box<dyn LogSink>>) {
        self.sink = sink;
    }

    /// Whether a sink is attached.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Log one line.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        #[cfg(feature = "tracing")]
        tracing::debug!(session = self.session_id, "{}", args);

        if let Some(sink) = self.sink.as_mut() {
            let text = format!("{} {:08x} {}\n", timestamp(), self.session_id, args);
            sink.write(&text);
        }
    }

    /// Log a block of message data rendered according to `kind`.
    pub fn data(&mut self, label: &str, data: &[u8], kind: ContentKind) {
        self.line(format_args!("{label} ({} bytes):", data.len()));
        if let Some(sink) = self.sink.as_mut() {
            let mut text = String::new();
            format::render(kind, data, &mut text);
            text.push('\n');
            sink.write(&text);
        }
    }
}

/// `seconds.millis` since the Unix epoch.
fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

static REQUEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A semi-unique id tying server logs to the diagnostic log.
///
/// Process id, a random value and a process-wide counter, all in upper-case
/// hex.
pub fn request_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    format!(
        "{:X}{:X}{:X}",
        std::process::id(),
        rand::random::<u16>(),
        counter
    )
}
