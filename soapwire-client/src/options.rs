//! Transport configuration.
//!
//! [`TransportOptions`] holds everything that shapes how requests are sent.
//! It can be built in code through [`TransportBuilder`](crate::TransportBuilder)
//! or deserialized from a configuration file:
//!
//! ```ignore
//! let options: TransportOptions = serde_json::from_str(r#"{
//!     "timeouts": { "connect": { "secs": 5, "nanos": 0 } },
//!     "keep_alive": true,
//!     "user_agent": "billing-client/2.1"
//! }"#)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flags::RequestFlags;

/// Timeout applied when none (or zero) is configured.
pub const UNLIMITED_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Connect, send and receive timeouts.
///
/// `None`, or anything shorter than one second, stands for "unlimited", which
/// is realised as [`UNLIMITED_TIMEOUT`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Establishing the connection, TLS included.
    pub connect: Option<Duration>,
    /// Writing the request and waiting for the response head.
    pub send: Option<Duration>,
    /// Waiting for each part of the response body.
    pub receive: Option<Duration>,
}

impl Timeouts {
    /// All three unlimited.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the same timeout for all three phases.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: Some(timeout),
            send: Some(timeout),
            receive: Some(timeout),
        }
    }

    /// The connect timeout actually enforced.
    pub fn connect_timeout(&self) -> Duration {
        effective(self.connect)
    }

    /// The send timeout actually enforced.
    pub fn send_timeout(&self) -> Duration {
        effective(self.send)
    }

    /// The receive timeout actually enforced.
    pub fn receive_timeout(&self) -> Duration {
        effective(self.receive)
    }
}

fn effective(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) if timeout >= Duration::from_secs(1) => timeout,
        _ => UNLIMITED_TIMEOUT,
    }
}

/// Options shaping every request sent through a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Applied when a connection is opened.
    pub timeouts: Timeouts,
    /// Added to every request on top of [`RequestFlags::BASE`].
    pub extra_flags: RequestFlags,
    /// Ask the network layer to keep the connection open between requests.
    pub keep_alive: bool,
    /// Replaces the `User-Agent` header value written by the engine.
    pub user_agent: Option<String>,
    /// Upper bound on resolve-and-resend rounds per message. `None` means
    /// the loop only ends when a resolver declines.
    pub max_resolve_attempts: Option<u32>,
}

impl TransportOptions {
    /// Options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags for a request to an endpoint with the given scheme.
    pub fn request_flags(&self, secure: bool) -> RequestFlags {
        let mut flags = RequestFlags::BASE | self.extra_flags;
        flags.set(RequestFlags::SECURE, secure);
        if self.keep_alive {
            flags.insert(RequestFlags::KEEP_CONNECTION);
        }
        flags
    }
}
