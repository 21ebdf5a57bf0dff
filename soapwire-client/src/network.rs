//! The network layer seam.
//!
//! [`HttpTransport`](crate::HttpTransport) does no HTTP itself. Connections,
//! TLS, authentication headers and response parsing all belong to a
//! [`NetworkLayer`]. The crate ships [`HyperNetwork`]; tests use a scripted
//! implementation.
//!
//! All calls are blocking. Status notifications may arrive on any thread and
//! only ever flip an atomic flag, see [`StatusNotifier`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{NetError, RecoverableError};
use crate::flags::RequestFlags;
use crate::options::Timeouts;
use crate::resolver::Resolution;

pub mod hyper;

mod connector;
mod verifier;

pub use self::connector::has_tls_support;
pub use self::hyper::{HyperNetwork, HyperNetworkBuilder};

/// Where to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Target {
    /// `scheme://host:port`, with IPv6 hosts bracketed.
    pub fn authority_uri(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{scheme}://[{}]:{}", self.host, self.port)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }
}

/// Which header block [`NetworkLayer::query_headers`] returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderQuery {
    /// The response status line and headers.
    Response,
    /// The request line and headers actually sent.
    Request,
}

/// Result of [`NetworkLayer::query_headers`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderQueryResult {
    /// The raw block was written; this many bytes are valid.
    Written(usize),
    /// The output was too small; at least this many bytes are needed.
    NeedsCapacity(usize),
}

/// Notifications a network layer emits while it works.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    ResolvingName(String),
    NameResolved(String),
    ConnectingToServer,
    ConnectedToServer,
    SendingRequest,
    RequestSent(usize),
    ReceivingResponse,
    ResponseReceived(usize),
    ClosingConnection,
    /// The peer or the layer closed the connection. The only event that
    /// changes session state.
    ConnectionClosed,
    HandleCreated,
    HandleClosing,
    Redirect(String),
    RequestComplete,
    StateChange(String),
}

#[derive(Debug, Default)]
pub(crate) struct SessionSignals {
    disconnected: AtomicBool,
    // 0 while no connection exists
    generation: AtomicU64,
}

impl SessionSignals {
    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub(crate) fn set_disconnected(&self, value: bool) {
        self.disconnected.store(value, Ordering::Release);
    }

    pub(crate) fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::Release);
    }
}

/// Handle a network layer uses to report [`StatusEvent`]s for one connection.
///
/// Cheap to clone and safe to use from any thread. A notification about a
/// connection the session has already replaced or torn down is ignored.
#[derive(Clone, Debug)]
pub struct StatusNotifier {
    signals: Arc<SessionSignals>,
    generation: u64,
}

impl StatusNotifier {
    pub(crate) fn new(signals: Arc<SessionSignals>, generation: u64) -> Self {
        Self {
            signals,
            generation,
        }
    }

    /// A notifier attached to nothing, for layers used outside a session.
    pub fn detached() -> Self {
        Self::new(Arc::new(SessionSignals::default()), u64::MAX)
    }

    /// Report `event`. Only [`StatusEvent::ConnectionClosed`] changes session
    /// state, and only while this notifier's connection is current.
    pub fn notify(&self, event: StatusEvent) {
        #[cfg(feature = "tracing")]
        tracing::debug!(generation = self.generation, ?event, "status notification");

        if event == StatusEvent::ConnectionClosed
            && self.signals.generation.load(Ordering::Acquire) == self.generation
        {
            #[cfg(feature = "tracing")]
            tracing::debug!("marking connection for disconnect");
            self.signals.set_disconnected(true);
        }
    }
}

/// Adjustments a resolver may make to an open request before it is resent.
pub trait RequestControl {
    fn flags(&self) -> RequestFlags;

    /// Add flags, typically `IGNORE_*` ones after a trust decision.
    fn add_flags(&mut self, flags: RequestFlags);

    /// Credentials answering a 401.
    fn set_credentials(&mut self, user: &str, password: &str);

    /// Credentials answering a 407.
    fn set_proxy_credentials(&mut self, user: &str, password: &str);
}

/// A blocking HTTP stack the transport drives.
///
/// A connection is a logical handle to one host; the layer may dial and
/// redial physical connections underneath it. A request is one POST on that
/// connection and may be sent several times.
pub trait NetworkLayer {
    type Connection;
    type Request: RequestControl;

    /// Open a logical connection. `notifier` reports events for it.
    fn connect(
        &self,
        target: &Target,
        timeouts: &Timeouts,
        notifier: StatusNotifier,
    ) -> Result<Self::Connection, NetError>;

    /// Create a POST request for `path`.
    fn open_request(
        &self,
        connection: &mut Self::Connection,
        path: &str,
        flags: RequestFlags,
    ) -> Result<Self::Request, NetError>;

    /// Attach one header to the request.
    fn add_request_header(
        &self,
        request: &mut Self::Request,
        name: &str,
        value: &str,
    ) -> Result<(), NetError>;

    /// Send the request with `body` and wait for the response head.
    fn send(
        &self,
        connection: &mut Self::Connection,
        request: &mut Self::Request,
        body: &[u8],
    ) -> Result<(), NetError>;

    /// Status code of the last response.
    fn status_code(&self, request: &Self::Request) -> Result<u16, NetError>;

    /// Copy a raw header block (NUL separated lines, double NUL terminated)
    /// into `out`.
    fn query_headers(
        &self,
        request: &Self::Request,
        which: HeaderQuery,
        out: &mut [u8],
    ) -> Result<HeaderQueryResult, NetError>;

    /// Read response body bytes. `Ok(0)` is end of body.
    fn read(&self, request: &mut Self::Request, out: &mut [u8]) -> Result<usize, NetError>;

    fn close_request(&self, request: Self::Request);

    fn close_connection(&self, connection: Self::Connection);

    /// The layer's own answer to a challenge the resolver deferred.
    fn resolve_builtin(
        &self,
        _request: &mut Self::Request,
        _error: RecoverableError,
    ) -> Resolution {
        Resolution::NotResolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_ignores_stale_generation() {
        let signals = Arc::new(SessionSignals::default());
        signals.set_generation(2);

        StatusNotifier::new(signals.clone(), 1).notify(StatusEvent::ConnectionClosed);
        assert!(!signals.is_disconnected());

        let current = StatusNotifier::new(signals.clone(), 2);
        current.notify(StatusEvent::RequestComplete);
        assert!(!signals.is_disconnected());
        current.notify(StatusEvent::ConnectionClosed);
        assert!(signals.is_disconnected());
    }

    #[test]
    fn test_notifier_without_connection() {
        let signals = Arc::new(SessionSignals::default());
        StatusNotifier::new(signals.clone(), 1).notify(StatusEvent::ConnectionClosed);
        assert!(!signals.is_disconnected());
    }

    #[test]
    fn test_authority_uri() {
        let target = Target {
            host: "::1".into(),
            port: 8443,
            secure: true,
        };
        assert_eq!(target.authority_uri(), "https://[::1]:8443");

        let target = Target {
            host: "example.com".into(),
            port: 80,
            secure: false,
        };
        assert_eq!(target.authority_uri(), "http://example.com:80");
    }
}
