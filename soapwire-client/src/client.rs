//! The caller-facing transport.
//!
//! [`HttpTransport`] ties a [`NetworkLayer`] to the message assembler, the
//! send engine and the response reader. A SOAP engine drives it through five
//! calls per exchange:
//!
//! ```ignore
//! use soapwire_client::{HeaderLine, HttpTransport, HyperNetwork, WriteStatus};
//!
//! let mut transport = HttpTransport::new(HyperNetwork::new()?);
//! transport.open("https://example.com/calc")?;
//!
//! transport.write_header(HeaderLine::Begin)?;
//! transport.write_header(HeaderLine::field("Content-Type", "text/xml"))?;
//! transport.write_header(HeaderLine::field("Content-Length", "312"))?;
//! transport.write_header(HeaderLine::End)?;
//!
//! let status = match transport.write_body(&envelope)? {
//!     WriteStatus::Sent { status } => status,
//!     WriteStatus::Buffered => unreachable!("whole body written"),
//! };
//!
//! let mut buf = [0u8; 8192];
//! loop {
//!     let n = transport.read_body(&mut buf)?;
//!     if n == 0 {
//!         break;
//!     }
//!     // header block first, then the body
//! }
//! transport.close();
//! ```

use std::borrow::Cow;
use std::path::Path;

use soapwire_core::{
    Assembly, BUFFER_GROWTH_STEP, ContentKindTracker, MessageAssembler, raw_header_lines,
};

use crate::builder::TransportBuilder;
use crate::diagnostics::{DiagnosticLog, FileSink, LogSink, request_id};
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::flags::RequestFlags;
use crate::network::{HeaderQuery, HeaderQueryResult, HyperNetwork, NetworkLayer};
use crate::options::{Timeouts, TransportOptions};
use crate::receive::ResponseReader;
use crate::resolver::{Resolver, default_resolver};
use crate::send::send_message;
use crate::session::{Session, SessionState};

/// One call of the header-writing protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderLine<'a> {
    /// A new request starts. Creates the request on the open connection.
    Begin,
    /// One header.
    Field { name: &'a str, value: &'a str },
    /// The header block is complete.
    End,
}

impl<'a> HeaderLine<'a> {
    /// A header line.
    pub fn field(name: &'a str, value: &'a str) -> Self {
        HeaderLine::Field { name, value }
    }
}

/// Result of a body write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// The write was buffered; more body is expected.
    Buffered,
    /// The message was complete and has been sent. The response is ready.
    Sent { status: u16 },
}

/// The I/O callbacks a SOAP engine drives.
///
/// Implemented by [`HttpTransport`]. Decorators that rewrite headers or
/// record traffic wrap another `SoapIo`.
pub trait SoapIo {
    fn open(&mut self, endpoint: &str) -> Result<(), TransportError>;

    /// Check the connection is still usable.
    fn poll(&mut self) -> Result<(), TransportError>;

    fn post_header(&mut self, line: HeaderLine<'_>) -> Result<(), TransportError>;

    fn send(&mut self, data: &[u8]) -> Result<WriteStatus, TransportError>;

    /// `Ok(0)` is end of response.
    fn recv(&mut self, out: &mut [u8]) -> Result<usize, TransportError>;

    fn close(&mut self);
}

/// Blocking SOAP-over-HTTP transport over a [`NetworkLayer`].
pub struct HttpTransport<N: NetworkLayer> {
    network: N,
    session: Session<N>,
    assembler: MessageAssembler,
    reader: ResponseReader,
    tracker: ContentKindTracker,
    resolver: Resolver,
    options: TransportOptions,
    diag: DiagnosticLog,
}

impl HttpTransport<HyperNetwork> {
    /// Start configuring a transport. [`TransportBuilder::build`] accepts
    /// any network layer, not only [`HyperNetwork`].
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }
}

impl<N: NetworkLayer> HttpTransport<N> {
    /// A transport with default options.
    pub fn new(network: N) -> Self {
        Self::with_parts(
            network,
            TransportOptions::default(),
            default_resolver(),
            DiagnosticLog::new(),
        )
    }

    pub(crate) fn with_parts(
        network: N,
        options: TransportOptions,
        resolver: Resolver,
        diag: DiagnosticLog,
    ) -> Self {
        Self {
            network,
            session: Session::new(),
            assembler: MessageAssembler::new(),
            reader: ResponseReader::new(),
            tracker: ContentKindTracker::new(),
            resolver,
            options,
            diag,
        }
    }

    /// Connect to `endpoint`, closing whatever was open before.
    pub fn open(&mut self, endpoint: &str) -> Result<(), TransportError> {
        self.diag.line(format_args!("open: endpoint = {endpoint}"));
        let endpoint = Endpoint::parse(endpoint)?;
        self.assembler.abandon();
        self.reader.reset();
        self.session
            .open(&self.network, &endpoint, &self.options.timeouts, &mut self.diag)
    }

    /// Fails with an end-of-stream error when the connection is gone.
    pub fn poll(&mut self) -> Result<(), TransportError> {
        self.session.ensure_connected(&self.network, &mut self.diag)
    }

    /// Handle one header-protocol call.
    ///
    /// `Content-Length` fixes the body size, `Transfer-Encoding: chunked`
    /// announces chunked writes, and a configured user agent replaces the
    /// `User-Agent` value. A header the network layer rejects is logged and
    /// otherwise ignored.
    pub fn write_header(&mut self, line: HeaderLine<'_>) -> Result<(), TransportError> {
        self.session.ensure_connected(&self.network, &mut self.diag)?;

        match line {
            HeaderLine::Begin => {
                self.diag.line(format_args!("post_header: begin"));
                self.assembler.begin();
                self.tracker.reset();
                self.reader.reset();
                let secure = self.session.target().is_some_and(|target| target.secure);
                let flags = self.options.request_flags(secure);
                self.session
                    .create_request(&self.network, flags, &mut self.diag)
            }
            HeaderLine::End => {
                self.diag.line(format_args!("post_header: end of headers"));
                Ok(())
            }
            HeaderLine::Field { name, value } => self.add_header(name, value),
        }
    }

    fn add_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.session.request().is_none() {
            return Err(TransportError::NoRequest);
        }

        let mut value = Cow::Borrowed(value);
        if name.eq_ignore_ascii_case("User-Agent") {
            if let Some(agent) = &self.options.user_agent {
                value = Cow::Owned(agent.clone());
            }
            if self.diag.is_enabled() {
                value = Cow::Owned(format!("{value} [{}]", request_id()));
            }
        }

        if name.eq_ignore_ascii_case("Content-Length") {
            let length = value.trim().parse::<usize>().map_err(|_| {
                TransportError::Protocol(format!("malformed Content-Length {value:?}"))
            })?;
            self.assembler.declare_length(length)?;
        } else if name.eq_ignore_ascii_case("Transfer-Encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            self.assembler.declare_chunked()?;
        }
        self.tracker.observe(name, &value);

        self.diag.line(format_args!("post_header: {name}: {value}"));
        let request = self.session.request_mut().ok_or(TransportError::NoRequest)?;
        if let Err(e) = self.network.add_request_header(request, name, &value) {
            self.diag.line(format_args!(
                "post_header: error {} ({}) adding header {name}",
                e.code, e.message
            ));
        }
        Ok(())
    }

    /// Feed one body write. Once the message is complete it is sent, with
    /// challenges resolved and the message resent as needed.
    pub fn write_body(&mut self, data: &[u8]) -> Result<WriteStatus, TransportError> {
        self.session.ensure_connected(&self.network, &mut self.diag)?;

        let result = match self.assembler.push(data) {
            Err(e) => {
                self.diag.line(format_args!("send: {e}, message abandoned"));
                return Err(e.into());
            }
            Ok(Assembly::Incomplete) => None,
            Ok(Assembly::Complete(payload)) => {
                let message = payload.as_bytes();
                self.diag
                    .data("send: message data", message, self.tracker.kind());
                Some(send_message(
                    &self.network,
                    &mut self.session,
                    &*self.resolver,
                    message,
                    self.options.max_resolve_attempts,
                    &mut self.diag,
                ))
            }
        };

        let Some(result) = result else {
            self.diag.line(format_args!(
                "send: buffered {} bytes, {} so far",
                data.len(),
                self.assembler.accumulated()
            ));
            return Ok(WriteStatus::Buffered);
        };

        if self.diag.is_enabled() {
            self.log_request_headers();
        }
        self.reader.response_ready();
        result.map(|status| WriteStatus::Sent { status })
    }

    /// Read the next part of the response: the header block first, then the
    /// body. `Ok(0)` is end of response.
    pub fn read_body(&mut self, out: &mut [u8]) -> Result<usize, TransportError> {
        self.reader.read(
            &self.network,
            &mut self.session,
            self.assembler.buffer_mut(),
            &mut self.tracker,
            &mut self.diag,
            out,
        )
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.assembler.abandon();
        self.reader.reset();
        self.session.close(&self.network, &mut self.diag);
    }

    /// Flags added to every request from now on.
    pub fn set_extra_flags(&mut self, flags: RequestFlags) {
        self.diag.line(format_args!("set_extra_flags: {flags}"));
        self.options.extra_flags = flags;
    }

    /// Replace the `User-Agent` value, or stop replacing it.
    pub fn set_user_agent(&mut self, agent: Option<String>) {
        self.options.user_agent = agent;
    }

    /// Install a resolver; `None` restores the default.
    pub fn set_resolver(&mut self, resolver: Option<Resolver>) {
        self.resolver = resolver.unwrap_or_else(default_resolver);
    }

    /// Applied on the next [`open`](Self::open).
    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.options.timeouts = timeouts;
    }

    /// Log to `path`, or stop logging. Failing to open the file disables
    /// logging and is not an error.
    pub fn set_log_file(&mut self, path: Option<&Path>) {
        let Some(path) = path else {
            self.diag.set_sink(None);
            return;
        };
        match FileSink::open(path) {
            Ok(sink) => {
                self.diag.set_sink(Some(Box::new(sink)));
                self.diag
                    .line(format_args!("log file {} opened", path.display()));
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(path = %path.display(), error = %_e, "cannot open log file, logging disabled");
                self.diag.set_sink(None);
            }
        }
    }

    /// Log to `sink`, or stop logging.
    pub fn set_log_sink(&mut self, sink: Option<Box<dyn LogSink>>) {
        self.diag.set_sink(sink);
    }

    /// Options applied to the next request.
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Handles currently held by the session.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The network layer requests go through.
    pub fn network(&self) -> &N {
        &self.network
    }

    fn log_request_headers(&mut self) {
        let Some(request) = self.session.request() else {
            return;
        };
        let scratch = self.assembler.buffer_mut();
        if scratch.ensure(BUFFER_GROWTH_STEP).is_err() {
            return;
        }

        let mut result =
            self.network
                .query_headers(request, HeaderQuery::Request, scratch.as_mut_slice());
        if let Ok(HeaderQueryResult::NeedsCapacity(n)) = result {
            if n > scratch.capacity() && scratch.ensure(n).is_ok() {
                result = self.network.query_headers(
                    request,
                    HeaderQuery::Request,
                    scratch.as_mut_slice(),
                );
            }
        }

        match result {
            Ok(HeaderQueryResult::Written(n)) => {
                self.diag.line(format_args!("send: actual request headers:"));
                for line in raw_header_lines(scratch.prefix(n)) {
                    self.diag
                        .line(format_args!("  {}", String::from_utf8_lossy(line)));
                }
            }
            Ok(HeaderQueryResult::NeedsCapacity(_)) => {}
            Err(e) => self.diag.line(format_args!(
                "send: error {} ({}) querying request headers",
                e.code, e.message
            )),
        }
    }
}

impl<N: NetworkLayer> Drop for HttpTransport<N> {
    fn drop(&mut self) {
        self.session.close(&self.network, &mut self.diag);
    }
}

impl<N: NetworkLayer> SoapIo for HttpTransport<N> {
    fn open(&mut self, endpoint: &str) -> Result<(), TransportError> {
        HttpTransport::open(self, endpoint)
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        HttpTransport::poll(self)
    }

    fn post_header(&mut self, line: HeaderLine<'_>) -> Result<(), TransportError> {
        self.write_header(line)
    }

    fn send(&mut self, data: &[u8]) -> Result<WriteStatus, TransportError> {
        self.write_body(data)
    }

    fn recv(&mut self, out: &mut [u8]) -> Result<usize, TransportError> {
        self.read_body(out)
    }

    fn close(&mut self) {
        HttpTransport::close(self)
    }
}
