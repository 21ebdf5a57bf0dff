//! Blocking [`NetworkLayer`] over hyper's HTTP/1.1 client and rustls.
//!
//! [`HyperNetwork`] owns a small private tokio runtime and drives it with
//! `block_on` from the caller's thread. Connection tasks keep running on the
//! runtime's worker threads, so a peer closing the connection is reported
//! through [`StatusEvent::ConnectionClosed`] even while the caller is idle.
//!
//! A logical connection dials lazily: the first send opens the TCP (and TLS)
//! connection, and later sends reuse it while it stays open. Because the
//! `IGNORE_*` request flags decide which certificate problems are tolerated,
//! a fresh TLS configuration is built for every dial.
//!
//! The blocking calls panic when made from inside an async runtime.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_rustls::MaybeHttpsStream;
use hyper_util::rt::TokioIo;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::{AlertDescription, CertificateError, RootCertStore};
use soapwire_core::{decode_chunked_body, encode_raw_header_block};
use tokio::net::TcpStream;
use tokio::runtime::{Handle, Runtime};
use tower::ServiceExt;

use super::connector;
use super::{
    HeaderQuery, HeaderQueryResult, NetworkLayer, RequestControl, StatusEvent, StatusNotifier,
    Target,
};
use crate::error::{NetError, NetErrorKind, RecoverableError};
use crate::flags::RequestFlags;
use crate::options::Timeouts;

/// Same-origin redirects followed before the redirect response is delivered.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

type Stream = MaybeHttpsStream<TokioIo<TcpStream>>;

/// The default network layer: HTTP/1.1 over hyper, TLS over rustls.
///
/// Cheap to clone; clones share the runtime and the trust configuration.
///
/// ```ignore
/// let network = HyperNetwork::builder()
///     .add_root_certificate(internal_ca)
///     .max_redirects(3)
///     .build()?;
/// let transport = HttpTransport::new(network);
/// ```
#[derive(Clone)]
pub struct HyperNetwork {
    shared: Arc<Shared>,
}

struct Shared {
    handle: Handle,
    runtime: Option<Runtime>,
    roots: Arc<RootCertStore>,
    provider: Option<Arc<CryptoProvider>>,
    max_redirects: usize,
    dials: AtomicU64,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for HyperNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperNetwork")
            .field("roots", &self.shared.roots.len())
            .field("tls", &self.shared.provider.is_some())
            .field("max_redirects", &self.shared.max_redirects)
            .finish_non_exhaustive()
    }
}

impl HyperNetwork {
    /// Start configuring a network layer.
    pub fn builder() -> HyperNetworkBuilder {
        HyperNetworkBuilder::new()
    }

    /// A network with default roots and crypto provider.
    pub fn new() -> Result<Self, NetError> {
        Self::builder().build()
    }

    /// Physical connections dialled so far, across all clones.
    pub fn dial_count(&self) -> u64 {
        self.shared.dials.load(Ordering::Relaxed)
    }

    /// One request and its response head. A request the connection refused
    /// before sending anything is retried once on a fresh connection.
    async fn round_trip(
        &self,
        connection: &mut HyperConnection,
        outgoing: &Outgoing,
        path: &str,
        flags: RequestFlags,
    ) -> Result<Response<Incoming>, NetError> {
        let notifier = connection.notifier.clone();
        let send_timeout = connection.timeouts.send_timeout();
        let mut redialled = false;
        loop {
            self.ensure_sender(connection, flags).await?;
            let request = outgoing.to_request(path)?;
            let sender = connection
                .sender
                .as_mut()
                .ok_or_else(|| NetError::new(NetErrorKind::Send, "no connection to send on"))?;

            notifier.notify(StatusEvent::SendingRequest);
            let result = tokio::time::timeout(send_timeout, sender.send_request(request))
                .await
                .map_err(|_| {
                    NetError::new(NetErrorKind::Timeout, "timed out waiting for the response")
                })?;
            match result {
                Ok(response) => {
                    notifier.notify(StatusEvent::RequestSent(outgoing.body.len()));
                    notifier.notify(StatusEvent::ResponseReceived(response.headers().len()));
                    return Ok(response);
                }
                Err(e) if e.is_canceled() && !redialled => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "connection went away before sending, redialling");
                    connection.current.store(0, Ordering::Release);
                    connection.sender = None;
                    redialled = true;
                }
                Err(e) => {
                    return Err(NetError::new(
                        NetErrorKind::Send,
                        format!("request failed: {e}"),
                    ));
                }
            }
        }
    }

    /// Send `outgoing`, following same-origin redirects. `path` ends up as
    /// the path of the delivered response.
    async fn send_following_redirects(
        &self,
        connection: &mut HyperConnection,
        outgoing: &Outgoing,
        path: &mut String,
        flags: RequestFlags,
    ) -> Result<Response<Incoming>, NetError> {
        let mut redirects = 0;
        loop {
            let response = self.round_trip(connection, outgoing, path, flags).await?;
            let next = redirect_path(
                &connection.target,
                response.status(),
                response.headers(),
                flags,
            )?;
            match next {
                Some(next) if redirects < self.shared.max_redirects => {
                    redirects += 1;
                    connection
                        .notifier
                        .notify(StatusEvent::Redirect(next.clone()));
                    received(response, connection).discard().await?;
                    *path = next;
                }
                _ => return Ok(response),
            }
        }
    }

    async fn ensure_sender(
        &self,
        connection: &mut HyperConnection,
        flags: RequestFlags,
    ) -> Result<(), NetError> {
        if let Some(sender) = connection.sender.as_mut() {
            if !sender.is_closed() && sender.ready().await.is_ok() {
                return Ok(());
            }
            // a stale connection's close must not mark the session
            connection.current.store(0, Ordering::Release);
            connection.sender = None;
        }
        let sender = self.dial(connection, flags).await?;
        connection.sender = Some(sender);
        Ok(())
    }

    async fn dial(
        &self,
        connection: &HyperConnection,
        flags: RequestFlags,
    ) -> Result<SendRequest<Full<Bytes>>, NetError> {
        let target = &connection.target;
        let notifier = &connection.notifier;
        let authority = target.authority_uri();
        let uri: Uri = authority.parse().map_err(|e| {
            NetError::new(NetErrorKind::Connect, format!("invalid target {authority}: {e}"))
        })?;

        notifier.notify(StatusEvent::ResolvingName(target.host.clone()));
        notifier.notify(StatusEvent::ConnectingToServer);
        let stream = tokio::time::timeout(
            connection.timeouts.connect_timeout(),
            self.open_stream(target, uri, flags),
        )
        .await
        .map_err(|_| {
            NetError::new(NetErrorKind::Timeout, format!("timed out connecting to {authority}"))
        })??;
        notifier.notify(StatusEvent::ConnectedToServer);

        let (sender, driver) = http1::handshake::<_, Full<Bytes>>(stream)
            .await
            .map_err(|e| NetError::new(NetErrorKind::Connect, format!("handshake failed: {e}")))?;

        let id = self.shared.dials.fetch_add(1, Ordering::Relaxed) + 1;
        connection.current.store(id, Ordering::Release);
        let current = connection.current.clone();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            if let Err(_error) = driver.await {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_error, "connection ended with an error");
            }
            if current.load(Ordering::Acquire) == id {
                notifier.notify(StatusEvent::ConnectionClosed);
            }
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(id, %authority, "connection established");
        Ok(sender)
    }

    async fn open_stream(
        &self,
        target: &Target,
        uri: Uri,
        flags: RequestFlags,
    ) -> Result<Stream, NetError> {
        if !target.secure {
            let tcp = connector::http_connector()
                .oneshot(uri)
                .await
                .map_err(|e| NetError::new(NetErrorKind::Connect, format!("connect failed: {e}")))?;
            return Ok(MaybeHttpsStream::Http(tcp));
        }

        let provider = self.shared.provider.clone().ok_or_else(|| {
            NetError::new(NetErrorKind::Connect, "no TLS crypto provider available")
        })?;
        let config = connector::client_config(provider, self.shared.roots.clone(), flags)
            .map_err(|e| {
                NetError::new(NetErrorKind::Connect, format!("TLS configuration failed: {e}"))
            })?;
        connector::https_connector(config)
            .oneshot(uri)
            .await
            .map_err(|e| classify_connect_error(&*e))
    }
}

/// Builder for [`HyperNetwork`].
#[derive(Debug)]
pub struct HyperNetworkBuilder {
    roots: Option<RootCertStore>,
    extra_roots: Vec<CertificateDer<'static>>,
    worker_threads: usize,
    max_redirects: usize,
}

impl Default for HyperNetworkBuilder {
    fn default() -> Self {
        Self {
            roots: None,
            extra_roots: Vec::new(),
            worker_threads: 1,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl HyperNetworkBuilder {
    /// Roots from the enabled features and a single worker thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust exactly these roots instead of the feature-selected ones.
    pub fn root_store(mut self, roots: RootCertStore) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Trust one more root certificate (DER encoded).
    pub fn add_root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.extra_roots.push(certificate);
        self
    }

    /// Worker threads of the private runtime. At least one.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Same-origin 307/308 redirects to follow. Zero delivers every redirect.
    pub fn max_redirects(mut self, redirects: usize) -> Self {
        self.max_redirects = redirects;
        self
    }

    /// Start the runtime. Fails when it cannot be created.
    pub fn build(self) -> Result<HyperNetwork, NetError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name("soapwire-net")
            .enable_all()
            .build()
            .map_err(|e| NetError::new(NetErrorKind::Other, format!("runtime failed to start: {e}")))?;

        let mut roots = self.roots.unwrap_or_else(connector::default_root_store);
        for certificate in self.extra_roots {
            roots.add(certificate).map_err(|e| {
                NetError::new(NetErrorKind::Other, format!("invalid root certificate: {e}"))
            })?;
        }

        let provider = connector::crypto_provider();
        #[cfg(feature = "tracing")]
        if provider.is_none() || roots.is_empty() {
            tracing::debug!(
                provider = provider.is_some(),
                roots = roots.len(),
                "https endpoints are not fully configured"
            );
        }

        Ok(HyperNetwork {
            shared: Arc::new(Shared {
                handle: runtime.handle().clone(),
                runtime: Some(runtime),
                roots: Arc::new(roots),
                provider,
                max_redirects: self.max_redirects,
                dials: AtomicU64::new(0),
            }),
        })
    }
}

/// A logical connection to one target.
pub struct HyperConnection {
    target: Target,
    timeouts: Timeouts,
    notifier: StatusNotifier,
    sender: Option<SendRequest<Full<Bytes>>>,
    // id of the physical connection whose end is reported, 0 for none
    current: Arc<AtomicU64>,
}

impl fmt::Debug for HyperConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperConnection")
            .field("target", &self.target)
            .field("dialled", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    fn header_value(&self) -> Result<HeaderValue, NetError> {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {token}"))
            .map_err(|e| NetError::new(NetErrorKind::Send, format!("invalid credentials: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// One POST on a [`HyperConnection`].
#[derive(Debug)]
pub struct HyperRequest {
    path: String,
    flags: RequestFlags,
    headers: Vec<(HeaderName, HeaderValue)>,
    credentials: Option<Credentials>,
    proxy_credentials: Option<Credentials>,
    // request line and headers of the last send
    sent: Vec<String>,
    response: Option<ReceivedResponse>,
}

impl HyperRequest {
    /// The path the request is sent to, after any followed redirect.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl RequestControl for HyperRequest {
    fn flags(&self) -> RequestFlags {
        self.flags
    }

    fn add_flags(&mut self, flags: RequestFlags) {
        self.flags.insert(flags);
    }

    fn set_credentials(&mut self, user: &str, password: &str) {
        self.credentials = Some(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        });
    }

    fn set_proxy_credentials(&mut self, user: &str, password: &str) {
        self.proxy_credentials = Some(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        });
    }
}

#[derive(Debug)]
struct ReceivedResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Incoming,
    pending: Bytes,
    finished: bool,
    receive_timeout: Duration,
    notifier: StatusNotifier,
}

impl ReceivedResponse {
    async fn fill(&mut self) -> Result<(), NetError> {
        while self.pending.is_empty() && !self.finished {
            match tokio::time::timeout(self.receive_timeout, self.body.frame()).await {
                Err(_) => {
                    return Err(NetError::new(
                        NetErrorKind::Timeout,
                        "timed out reading the response body",
                    ));
                }
                Ok(None) => {
                    self.finished = true;
                    self.notifier.notify(StatusEvent::RequestComplete);
                }
                Ok(Some(Err(e))) => {
                    return Err(NetError::new(
                        NetErrorKind::Receive,
                        format!("reading the response body failed: {e}"),
                    ));
                }
                Ok(Some(Ok(frame))) => {
                    if let Ok(data) = frame.into_data() {
                        self.pending = data;
                    }
                }
            }
        }
        Ok(())
    }

    async fn discard(mut self) -> Result<(), NetError> {
        loop {
            self.pending.clear();
            self.fill().await?;
            if self.finished {
                return Ok(());
            }
        }
    }
}

/// The message actually put on the wire for a request.
#[derive(Debug)]
struct Outgoing {
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl Outgoing {
    /// Apply what the layer owns: de-chunking, `Host`, connection handling
    /// and credentials.
    fn new(request: &HyperRequest, target: &Target, body: &[u8]) -> Result<Self, NetError> {
        let chunked = request
            .headers
            .iter()
            .any(|(name, value)| *name == header::TRANSFER_ENCODING && is_chunked(value));
        let body = if chunked {
            decode_chunked_body(body)
                .map_err(|e| NetError::new(NetErrorKind::Send, e.to_string()))?
        } else {
            body.to_vec()
        };

        let mut headers: Vec<(HeaderName, HeaderValue)> = request
            .headers
            .iter()
            .filter(|(name, _)| {
                !(chunked && (*name == header::TRANSFER_ENCODING || *name == header::CONTENT_LENGTH))
            })
            .cloned()
            .collect();
        let has = |headers: &[(HeaderName, HeaderValue)], wanted: &HeaderName| {
            headers.iter().any(|(name, _)| name == wanted)
        };

        if !has(&headers, &header::HOST) {
            let host = HeaderValue::from_str(&host_header(target)).map_err(|e| {
                NetError::new(NetErrorKind::Send, format!("invalid host {}: {e}", target.host))
            })?;
            headers.insert(0, (header::HOST, host));
        }
        if chunked {
            headers.push((header::CONTENT_LENGTH, HeaderValue::from(body.len())));
        }
        if !request.flags.contains(RequestFlags::KEEP_CONNECTION)
            && !has(&headers, &header::CONNECTION)
        {
            headers.push((header::CONNECTION, HeaderValue::from_static("close")));
        }
        if request.flags.contains(RequestFlags::PRAGMA_NOCACHE) && !has(&headers, &header::PRAGMA)
        {
            headers.push((header::PRAGMA, HeaderValue::from_static("no-cache")));
        }
        if let Some(credentials) = &request.credentials {
            headers.push((header::AUTHORIZATION, credentials.header_value()?));
        }
        if let Some(credentials) = &request.proxy_credentials {
            headers.push((header::PROXY_AUTHORIZATION, credentials.header_value()?));
        }

        Ok(Self {
            headers,
            body: Bytes::from(body),
        })
    }

    fn to_request(&self, path: &str) -> Result<Request<Full<Bytes>>, NetError> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .version(Version::HTTP_11);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder
            .body(Full::new(self.body.clone()))
            .map_err(|e| NetError::new(NetErrorKind::Send, format!("invalid request: {e}")))
    }

    /// Request line and headers as text lines, credentials masked.
    fn lines(&self, path: &str) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.headers.len() + 1);
        lines.push(format!("POST {path} HTTP/1.1"));
        for (name, value) in &self.headers {
            let value = if value.is_sensitive() {
                "****".into()
            } else {
                String::from_utf8_lossy(value.as_bytes())
            };
            lines.push(format!("{}: {value}", title_case(name.as_str())));
        }
        lines
    }
}

fn is_chunked(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|v| {
            v.split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        })
        .unwrap_or(false)
}

/// `Host` value for `target`, without the scheme's default port.
fn host_header(target: &Target) -> String {
    let default_port = if target.secure { 443 } else { 80 };
    let host = if target.host.contains(':') && !target.host.starts_with('[') {
        format!("[{}]", target.host)
    } else {
        target.host.clone()
    };
    if target.port == default_port {
        host
    } else {
        format!("{host}:{}", target.port)
    }
}

/// `content-type` to `Content-Type`.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        out.push(if upper { c.to_ascii_uppercase() } else { c });
        upper = c == '-';
    }
    out
}

fn response_lines(version: Version, status: StatusCode, headers: &HeaderMap) -> Vec<String> {
    let mut lines = Vec::with_capacity(headers.len() + 1);
    let reason = status.canonical_reason().unwrap_or("");
    lines.push(
        format!("{version:?} {} {reason}", status.as_u16())
            .trim_end()
            .to_string(),
    );
    for (name, value) in headers {
        lines.push(format!(
            "{}: {}",
            title_case(name.as_str()),
            String::from_utf8_lossy(value.as_bytes())
        ));
    }
    lines
}

/// Where to resend after a 307/308, if the redirect is followed.
///
/// Only same-origin redirects are followed. A redirect changing the scheme
/// fails with a recoverable error unless the matching `IGNORE_REDIRECT_*`
/// flag is set, in which case the redirect response is delivered as is.
fn redirect_path(
    target: &Target,
    status: StatusCode,
    headers: &HeaderMap,
    flags: RequestFlags,
) -> Result<Option<String>, NetError> {
    if flags.contains(RequestFlags::NO_AUTO_REDIRECT)
        || !matches!(
            status,
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
        )
    {
        return Ok(None);
    }
    let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    if location.starts_with('/') && !location.starts_with("//") {
        return Ok(Some(location.to_string()));
    }
    let Ok(uri) = location.parse::<Uri>() else {
        return Ok(None);
    };
    let Some(scheme) = uri.scheme_str() else {
        return Ok(None);
    };

    let secure = scheme.eq_ignore_ascii_case("https");
    if secure != target.secure {
        let (error, allowed) = if secure {
            (
                RecoverableError::HttpToHttpsOnRedirect,
                RequestFlags::IGNORE_REDIRECT_TO_HTTPS,
            )
        } else {
            (
                RecoverableError::HttpsToHttpOnRedirect,
                RequestFlags::IGNORE_REDIRECT_TO_HTTP,
            )
        };
        return if flags.contains(allowed) {
            Ok(None)
        } else {
            Err(NetError::recoverable(error))
        };
    }

    let host = uri
        .host()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
    if host.eq_ignore_ascii_case(&target.host) && port == target.port {
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        Ok(Some(path.to_string()))
    } else {
        Ok(None)
    }
}

fn classify_connect_error(error: &(dyn StdError + 'static)) -> NetError {
    match find_tls_error(error).and_then(recoverable_tls_error) {
        Some(recoverable) => {
            let mut err = NetError::recoverable(recoverable);
            err.message = format!("{}: {error}", recoverable.name());
            err
        }
        None => NetError::new(NetErrorKind::Connect, format!("connect failed: {error}")),
    }
}

/// The rustls error somewhere in `error`'s source chain, including inside
/// `io::Error` wrappers.
fn find_tls_error<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(tls) = err.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        if let Some(tls) = err
            .downcast_ref::<io::Error>()
            .and_then(|io| io.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return Some(tls);
        }
        current = err.source();
    }
    None
}

fn recoverable_tls_error(error: &rustls::Error) -> Option<RecoverableError> {
    match error {
        rustls::Error::InvalidCertificate(certificate) => match certificate {
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
                Some(RecoverableError::CertCommonNameInvalid)
            }
            CertificateError::Expired
            | CertificateError::ExpiredContext { .. }
            | CertificateError::NotValidYet
            | CertificateError::NotValidYetContext { .. } => {
                Some(RecoverableError::CertDateInvalid)
            }
            CertificateError::UnknownIssuer => Some(RecoverableError::InvalidCa),
            _ => None,
        },
        rustls::Error::AlertReceived(AlertDescription::CertificateRequired) => {
            Some(RecoverableError::ClientAuthCertNeeded)
        }
        _ => None,
    }
}

impl NetworkLayer for HyperNetwork {
    type Connection = HyperConnection;
    type Request = HyperRequest;

    fn connect(
        &self,
        target: &Target,
        timeouts: &Timeouts,
        notifier: StatusNotifier,
    ) -> Result<HyperConnection, NetError> {
        notifier.notify(StatusEvent::HandleCreated);
        Ok(HyperConnection {
            target: target.clone(),
            timeouts: *timeouts,
            notifier,
            sender: None,
            current: Arc::new(AtomicU64::new(0)),
        })
    }

    fn open_request(
        &self,
        connection: &mut HyperConnection,
        path: &str,
        flags: RequestFlags,
    ) -> Result<HyperRequest, NetError> {
        connection.notifier.notify(StatusEvent::HandleCreated);
        let path = if path.starts_with('/') { path } else { "/" };
        Ok(HyperRequest {
            path: path.to_string(),
            flags,
            headers: Vec::new(),
            credentials: None,
            proxy_credentials: None,
            sent: Vec::new(),
            response: None,
        })
    }

    fn add_request_header(
        &self,
        request: &mut HyperRequest,
        name: &str,
        value: &str,
    ) -> Result<(), NetError> {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
            NetError::new(NetErrorKind::Other, format!("invalid header name {name:?}: {e}"))
        })?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|e| {
            NetError::new(NetErrorKind::Other, format!("invalid value for {name}: {e}"))
        })?;
        request.headers.push((header_name, header_value));
        Ok(())
    }

    fn send(
        &self,
        connection: &mut HyperConnection,
        request: &mut HyperRequest,
        body: &[u8],
    ) -> Result<(), NetError> {
        request.response = None;
        let outgoing = Outgoing::new(request, &connection.target, body)?;
        request.sent = outgoing.lines(&request.path);
        let mut path = request.path.clone();
        let response = self.shared.handle.block_on(self.send_following_redirects(
            connection,
            &outgoing,
            &mut path,
            request.flags,
        ))?;

        if path != request.path {
            request.sent = outgoing.lines(&path);
        }
        request.response = Some(received(response, connection));
        Ok(())
    }

    fn status_code(&self, request: &HyperRequest) -> Result<u16, NetError> {
        request
            .response
            .as_ref()
            .map(|response| response.status.as_u16())
            .ok_or_else(|| NetError::new(NetErrorKind::Query, "no response received"))
    }

    fn query_headers(
        &self,
        request: &HyperRequest,
        which: HeaderQuery,
        out: &mut [u8],
    ) -> Result<HeaderQueryResult, NetError> {
        let mut block = Vec::new();
        match which {
            HeaderQuery::Response => {
                let response = request
                    .response
                    .as_ref()
                    .ok_or_else(|| NetError::new(NetErrorKind::Query, "no response received"))?;
                let lines = response_lines(response.version, response.status, &response.headers);
                encode_raw_header_block(&lines, &mut block);
            }
            HeaderQuery::Request => {
                if request.sent.is_empty() {
                    return Err(NetError::new(NetErrorKind::Query, "request not sent"));
                }
                encode_raw_header_block(&request.sent, &mut block);
            }
        }

        if block.len() > out.len() {
            return Ok(HeaderQueryResult::NeedsCapacity(block.len()));
        }
        out[..block.len()].copy_from_slice(&block);
        Ok(HeaderQueryResult::Written(block.len()))
    }

    fn read(&self, request: &mut HyperRequest, out: &mut [u8]) -> Result<usize, NetError> {
        let response = request
            .response
            .as_mut()
            .ok_or_else(|| NetError::new(NetErrorKind::Receive, "no response to read"))?;
        if out.is_empty() {
            return Ok(0);
        }
        if response.pending.is_empty() && !response.finished {
            self.shared.handle.block_on(response.fill())?;
        }
        let n = out.len().min(response.pending.len());
        out[..n].copy_from_slice(&response.pending.split_to(n));
        Ok(n)
    }

    fn close_request(&self, request: HyperRequest) {
        drop(request);
    }

    fn close_connection(&self, connection: HyperConnection) {
        connection.current.store(0, Ordering::Release);
        connection.notifier.notify(StatusEvent::ClosingConnection);
        let notifier = connection.notifier.clone();
        drop(connection);
        notifier.notify(StatusEvent::HandleClosing);
    }
}

fn received(response: Response<Incoming>, connection: &HyperConnection) -> ReceivedResponse {
    let (parts, body) = response.into_parts();
    ReceivedResponse {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
        body,
        pending: Bytes::new(),
        finished: false,
        receive_timeout: connection.timeouts.receive_timeout(),
        notifier: connection.notifier.clone(),
    }
}
