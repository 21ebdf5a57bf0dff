//! Connection and request handles for one logical session.

use std::sync::Arc;

use crate::diagnostics::DiagnosticLog;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::flags::RequestFlags;
use crate::network::{NetworkLayer, SessionSignals, StatusNotifier, Target};
use crate::options::Timeouts;

/// Observable state of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing open.
    Idle,
    /// A connection, no request.
    Connected,
    /// A connection with a request.
    RequestOpen,
    /// A status notification reported the connection closed; handles are
    /// discarded by the next operation.
    Disconnected,
}

/// Owns the connection and request handles of one transport.
///
/// The disconnect flag is the only state shared with other threads. It is set
/// by [`StatusNotifier`]s and acted on here, at the start of the next
/// operation, never inside the notification.
pub struct Session<N: NetworkLayer> {
    connection: Option<N::Connection>,
    request: Option<N::Request>,
    signals: Arc<SessionSignals>,
    generation: u64,
    target: Option<Target>,
    path: String,
}

impl<N: NetworkLayer> Default for Session<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NetworkLayer> Session<N> {
    /// A session holding nothing.
    pub fn new() -> Self {
        Self {
            connection: None,
            request: None,
            signals: Arc::new(SessionSignals::default()),
            generation: 0,
            target: None,
            path: String::from("/"),
        }
    }

    /// A signalled disconnect wins over the handles still held.
    pub fn state(&self) -> SessionState {
        if self.signals.is_disconnected() {
            SessionState::Disconnected
        } else if self.request.is_some() {
            SessionState::RequestOpen
        } else if self.connection.is_some() {
            SessionState::Connected
        } else {
            SessionState::Idle
        }
    }

    /// Close any previous handles and connect to `endpoint`.
    pub fn open(
        &mut self,
        network: &N,
        endpoint: &Endpoint,
        timeouts: &Timeouts,
        diag: &mut DiagnosticLog,
    ) -> Result<(), TransportError> {
        if self.request.is_some() {
            diag.line(format_args!("open: closing existing request handle"));
        }
        if self.connection.is_some() {
            diag.line(format_args!("open: closing existing connection handle"));
        }
        self.teardown(network);

        self.target = Some(endpoint.target.clone());
        self.path.clone_from(&endpoint.path);

        diag.line(format_args!(
            "open: timeouts connect = {:?}, send = {:?}, receive = {:?}",
            timeouts.connect_timeout(),
            timeouts.send_timeout(),
            timeouts.receive_timeout()
        ));

        self.generation += 1;
        self.signals.set_generation(self.generation);
        self.signals.set_disconnected(false);
        let notifier = StatusNotifier::new(self.signals.clone(), self.generation);

        match network.connect(&endpoint.target, timeouts, notifier) {
            Ok(connection) => {
                self.connection = Some(connection);
                diag.line(format_args!("open: connected"));
                Ok(())
            }
            Err(e) => {
                self.signals.set_generation(0);
                diag.line(format_args!("open: error {} ({}) in connect", e.code, e.message));
                Err(e.into())
            }
        }
    }

    /// Discard stale handles and report whether a connection is usable.
    ///
    /// Fails with [`TransportError::NotConnected`] when there is no
    /// connection or a disconnect was signalled.
    pub fn ensure_connected(
        &mut self,
        network: &N,
        diag: &mut DiagnosticLog,
    ) -> Result<(), TransportError> {
        if self.signals.is_disconnected() || self.connection.is_none() {
            if self.request.is_some() {
                diag.line(format_args!("have_connection: closing request"));
            }
            if self.connection.is_some() {
                diag.line(format_args!("have_connection: closing connection"));
            }
            self.teardown(network);
            self.signals.set_disconnected(false);
        }

        if self.connection.is_none() {
            diag.line(format_args!("have_connection: false"));
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    /// Force the handles closed. Idempotent.
    pub fn close(&mut self, network: &N, diag: &mut DiagnosticLog) {
        diag.line(format_args!("close: setting disconnect to true"));
        self.signals.set_disconnected(true);
        // always NotConnected here
        let _ = self.ensure_connected(network, diag);
    }

    /// Replace the current request with a new POST to the endpoint path.
    pub fn create_request(
        &mut self,
        network: &N,
        flags: RequestFlags,
        diag: &mut DiagnosticLog,
    ) -> Result<(), TransportError> {
        if let Some(request) = self.request.take() {
            network.close_request(request);
        }
        let connection = self.connection.as_mut().ok_or(TransportError::NotConnected)?;

        diag.line(format_args!("create_request: using flags = {flags}"));
        match network.open_request(connection, &self.path, flags) {
            Ok(request) => {
                self.request = Some(request);
                diag.line(format_args!("create_request: success"));
                Ok(())
            }
            Err(e) => {
                diag.line(format_args!(
                    "create_request: error {} ({}) in open_request",
                    e.code, e.message
                ));
                Err(e.into())
            }
        }
    }

    /// Disregard any disconnect reported so far.
    pub fn clear_disconnect(&self) {
        self.signals.set_disconnected(false);
    }

    /// Whether a disconnect was signalled and not yet acted on.
    pub fn is_disconnected(&self) -> bool {
        self.signals.is_disconnected()
    }

    pub fn request_mut(&mut self) -> Option<&mut N::Request> {
        self.request.as_mut()
    }

    /// The open request, if any.
    pub fn request(&self) -> Option<&N::Request> {
        self.request.as_ref()
    }

    /// Both handles, when both exist.
    pub fn handles_mut(&mut self) -> Option<(&mut N::Connection, &mut N::Request)> {
        match (self.connection.as_mut(), self.request.as_mut()) {
            (Some(connection), Some(request)) => Some((connection, request)),
            _ => None,
        }
    }

    /// Where the last open connected to.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Path requests are created with; `/` before any open.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn teardown(&mut self, network: &N) {
        if let Some(request) = self.request.take() {
            network.close_request(request);
        }
        if let Some(connection) = self.connection.take() {
            network.close_connection(connection);
        }
        self.signals.set_generation(0);
    }
}
