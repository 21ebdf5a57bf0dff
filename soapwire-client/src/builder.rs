//! Builder for [`HttpTransport`].
//!
//! Provides a fluent API for configuring a transport before handing it the
//! network layer it should drive.

use std::path::PathBuf;
use std::time::Duration;

use crate::client::HttpTransport;
use crate::diagnostics::{DiagnosticLog, FileSink, LogSink};
use crate::flags::RequestFlags;
use crate::network::NetworkLayer;
use crate::options::{Timeouts, TransportOptions};
use crate::resolver::{Resolver, default_resolver};

/// Builder for creating an [`HttpTransport`].
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use soapwire_client::{HyperNetwork, RequestFlags, TransportBuilder};
///
/// let transport = TransportBuilder::new()
///     .connect_timeout(Duration::from_secs(5))
///     .receive_timeout(Duration::from_secs(60))
///     .keep_alive(true)
///     .extra_flags(RequestFlags::NO_COOKIES)
///     .user_agent("billing-client/2.1")
///     .log_file("/var/log/billing/wire.log")
///     .build(HyperNetwork::new()?);
/// ```
#[derive(Default)]
pub struct TransportBuilder {
    options: TransportOptions,
    resolver: Option<Resolver>,
    log_file: Option<PathBuf>,
    log_sink: Option<Box<dyn LogSink>>,
}

impl std::fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("options", &self.options)
            .field("resolver", &self.resolver.is_some())
            .field("log_file", &self.log_file)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl TransportBuilder {
    /// A builder with default options, the default resolver and no log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from options loaded elsewhere, e.g. a configuration file.
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace all three timeouts.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.options.timeouts = timeouts;
        self
    }

    /// Anything under one second means unlimited.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeouts.connect = Some(timeout);
        self
    }

    /// Bounds writing the request and waiting for the response head.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeouts.send = Some(timeout);
        self
    }

    /// Bounds the wait for each part of the response body.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeouts.receive = Some(timeout);
        self
    }

    /// Flags added to every request.
    pub fn extra_flags(mut self, flags: RequestFlags) -> Self {
        self.options.extra_flags = flags;
        self
    }

    /// Keep the connection open between requests.
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.options.keep_alive = keep_alive;
        self
    }

    /// Replace the `User-Agent` value the engine writes.
    pub fn user_agent<S: Into<String>>(mut self, agent: S) -> Self {
        self.options.user_agent = Some(agent.into());
        self
    }

    /// Bound the resolve-and-resend rounds per message.
    pub fn max_resolve_attempts(mut self, attempts: u32) -> Self {
        self.options.max_resolve_attempts = Some(attempts);
        self
    }

    /// Answer authentication and trust challenges with `resolver`.
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Append diagnostics to a file. Takes precedence over
    /// [`log_sink`](Self::log_sink).
    pub fn log_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Write diagnostics to a custom sink.
    pub fn log_sink<S: LogSink + 'static>(mut self, sink: S) -> Self {
        self.log_sink = Some(Box::new(sink));
        self
    }

    /// Build a transport driving `network`.
    ///
    /// A log file that cannot be opened leaves logging disabled.
    pub fn build<N: NetworkLayer>(self, network: N) -> HttpTransport<N> {
        let mut diag = DiagnosticLog::new();
        let sink = match self.log_file {
            Some(path) => match FileSink::open(&path) {
                Ok(file) => Some(Box::new(file) as Box<dyn LogSink>),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(path = %path.display(), error = %_e, "cannot open log file, logging disabled");
                    None
                }
            },
            None => self.log_sink,
        };
        diag.set_sink(sink);

        HttpTransport::with_parts(
            network,
            self.options,
            self.resolver.unwrap_or_else(default_resolver),
            diag,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::tests::MemorySink;
    use crate::testing::MockNetwork;

    #[test]
    fn test_builder_collects_options() {
        let transport = TransportBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .send_timeout(Duration::from_secs(6))
            .receive_timeout(Duration::from_secs(7))
            .keep_alive(true)
            .user_agent("probe/1.0")
            .max_resolve_attempts(3)
            .build(MockNetwork::new());

        let options = transport.options();
        assert_eq!(options.timeouts.connect, Some(Duration::from_secs(5)));
        assert_eq!(options.timeouts.send, Some(Duration::from_secs(6)));
        assert_eq!(options.timeouts.receive, Some(Duration::from_secs(7)));
        assert!(options.keep_alive);
        assert_eq!(options.user_agent.as_deref(), Some("probe/1.0"));
        assert_eq!(options.max_resolve_attempts, Some(3));
    }

    #[test]
    fn test_options_then_overrides() {
        let base = TransportOptions {
            extra_flags: RequestFlags::NO_AUTH,
            ..Default::default()
        };
        let transport = TransportBuilder::new()
            .options(base)
            .timeouts(Timeouts::uniform(Duration::from_secs(9)))
            .build(MockNetwork::new());
        assert_eq!(transport.options().extra_flags, RequestFlags::NO_AUTH);
        assert_eq!(
            transport.options().timeouts.receive_timeout(),
            Duration::from_secs(9)
        );
    }

    #[test]
    fn test_log_sink_receives_lines() {
        let sink = MemorySink::default();
        let network = MockNetwork::new();
        let mut transport = TransportBuilder::new()
            .log_sink(sink.clone())
            .build(network);
        transport.open("http://example.com/").unwrap();
        assert!(sink.contents().contains("open: endpoint = http://example.com/"));
    }

    #[test]
    fn test_unopenable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        let mut transport = TransportBuilder::new()
            .log_file(dir.path().join("no").join("such").join("file.log"))
            .log_sink(sink.clone())
            .build(MockNetwork::new());
        transport.open("http://example.com/").unwrap();
        assert!(sink.contents().is_empty());
    }
}
