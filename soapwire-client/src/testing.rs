//! Scripted network layer for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use soapwire_core::encode_raw_header_block;

use crate::error::{NetError, NetErrorKind, RecoverableError};
use crate::flags::RequestFlags;
use crate::network::{
    HeaderQuery, HeaderQueryResult, NetworkLayer, RequestControl, StatusNotifier, Target,
};
use crate::options::Timeouts;
use crate::resolver::Resolution;

/// Every call the transport made, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Connect(String),
    OpenRequest(String, RequestFlags),
    AddHeader(String, String),
    Send(Vec<u8>),
    StatusCode,
    QueryHeaders(HeaderQuery),
    Read,
    CloseRequest,
    CloseConnection,
    ResolveBuiltin(RecoverableError),
}

/// What one `send` does.
#[derive(Clone, Debug)]
pub(crate) enum SendOutcome {
    Status(u16),
    Fail(NetError),
}

#[derive(Debug)]
pub(crate) struct Script {
    pub(crate) calls: Vec<Call>,
    pub(crate) sends: VecDeque<SendOutcome>,
    pub(crate) connect_error: Option<NetError>,
    pub(crate) builtin: Resolution,
    pub(crate) response_headers: Vec<String>,
    pub(crate) body: Vec<u8>,
    /// Largest number of bytes one read returns.
    pub(crate) read_chunk: usize,
    /// Fail reads once this many body bytes were delivered.
    pub(crate) read_error_at: Option<usize>,
    pub(crate) notifiers: Vec<StatusNotifier>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            sends: VecDeque::new(),
            connect_error: None,
            builtin: Resolution::NotResolved,
            response_headers: vec!["Content-Type: text/xml".to_string()],
            body: b"<ok/>".to_vec(),
            read_chunk: usize::MAX,
            read_error_at: None,
            notifiers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MockNetwork {
    script: Arc<Mutex<Script>>,
}

pub(crate) struct MockConnection;

#[derive(Debug, Default)]
pub(crate) struct MockRequest {
    pub(crate) path: String,
    pub(crate) flags: RequestFlags,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) credentials: Option<(String, String)>,
    status: Option<u16>,
    body_pos: usize,
}

impl RequestControl for MockRequest {
    fn flags(&self) -> RequestFlags {
        self.flags
    }

    fn add_flags(&mut self, flags: RequestFlags) {
        self.flags |= flags;
    }

    fn set_credentials(&mut self, user: &str, password: &str) {
        self.credentials = Some((user.to_string(), password.to_string()));
    }

    fn set_proxy_credentials(&mut self, user: &str, password: &str) {
        self.set_credentials(user, password);
    }
}

impl MockNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    /// Bodies passed to `send`, in order.
    pub(crate) fn sent_bodies(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn push_send(&self, outcome: SendOutcome) {
        self.script().sends.push_back(outcome);
    }

    /// Deliver `ConnectionClosed` through the most recent notifier.
    pub(crate) fn drop_connection(&self) {
        let notifier = self.script().notifiers.last().cloned();
        if let Some(notifier) = notifier {
            notifier.notify(crate::network::StatusEvent::ConnectionClosed);
        }
    }

    fn record(&self, call: Call) {
        self.script().calls.push(call);
    }
}

impl NetworkLayer for MockNetwork {
    type Connection = MockConnection;
    type Request = MockRequest;

    fn connect(
        &self,
        target: &Target,
        _timeouts: &Timeouts,
        notifier: StatusNotifier,
    ) -> Result<MockConnection, NetError> {
        let mut script = self.script();
        script.calls.push(Call::Connect(target.authority_uri()));
        if let Some(err) = script.connect_error.clone() {
            return Err(err);
        }
        script.notifiers.push(notifier);
        Ok(MockConnection)
    }

    fn open_request(
        &self,
        _connection: &mut MockConnection,
        path: &str,
        flags: RequestFlags,
    ) -> Result<MockRequest, NetError> {
        self.record(Call::OpenRequest(path.to_string(), flags));
        Ok(MockRequest {
            path: path.to_string(),
            flags,
            ..Default::default()
        })
    }

    fn add_request_header(
        &self,
        request: &mut MockRequest,
        name: &str,
        value: &str,
    ) -> Result<(), NetError> {
        self.record(Call::AddHeader(name.to_string(), value.to_string()));
        request.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn send(
        &self,
        _connection: &mut MockConnection,
        request: &mut MockRequest,
        body: &[u8],
    ) -> Result<(), NetError> {
        let mut script = self.script();
        script.calls.push(Call::Send(body.to_vec()));
        request.body_pos = 0;
        match script.sends.pop_front().unwrap_or(SendOutcome::Status(200)) {
            SendOutcome::Status(status) => {
                request.status = Some(status);
                Ok(())
            }
            SendOutcome::Fail(err) => {
                request.status = None;
                Err(err)
            }
        }
    }

    fn status_code(&self, request: &MockRequest) -> Result<u16, NetError> {
        self.record(Call::StatusCode);
        request
            .status
            .ok_or_else(|| NetError::new(NetErrorKind::Query, "no response"))
    }

    fn query_headers(
        &self,
        request: &MockRequest,
        which: HeaderQuery,
        out: &mut [u8],
    ) -> Result<HeaderQueryResult, NetError> {
        let script = self.script();
        let mut raw = Vec::new();
        match which {
            HeaderQuery::Response => {
                let status = request
                    .status
                    .ok_or_else(|| NetError::new(NetErrorKind::Query, "no response"))?;
                let mut lines = vec![format!("HTTP/1.1 {status} Mock")];
                lines.extend(script.response_headers.iter().cloned());
                encode_raw_header_block(lines, &mut raw);
            }
            HeaderQuery::Request => {
                let mut lines = vec![format!("POST {} HTTP/1.1", request.path)];
                lines.extend(
                    request
                        .headers
                        .iter()
                        .map(|(name, value)| format!("{name}: {value}")),
                );
                encode_raw_header_block(lines, &mut raw);
            }
        }
        drop(script);
        self.record(Call::QueryHeaders(which));

        if out.len() < raw.len() {
            return Ok(HeaderQueryResult::NeedsCapacity(raw.len()));
        }
        out[..raw.len()].copy_from_slice(&raw);
        Ok(HeaderQueryResult::Written(raw.len()))
    }

    fn read(&self, request: &mut MockRequest, out: &mut [u8]) -> Result<usize, NetError> {
        let mut script = self.script();
        script.calls.push(Call::Read);
        if let Some(at) = script.read_error_at {
            if request.body_pos >= at {
                script.read_error_at = None;
                return Err(NetError::new(NetErrorKind::Receive, "connection reset").with_code(104));
            }
        }
        let remaining = &script.body[request.body_pos.min(script.body.len())..];
        let mut n = remaining.len().min(out.len()).min(script.read_chunk);
        if let Some(at) = script.read_error_at {
            n = n.min(at.saturating_sub(request.body_pos));
        }
        out[..n].copy_from_slice(&remaining[..n]);
        request.body_pos += n;
        Ok(n)
    }

    fn close_request(&self, _request: MockRequest) {
        self.record(Call::CloseRequest);
    }

    fn close_connection(&self, _connection: MockConnection) {
        self.record(Call::CloseConnection);
    }

    fn resolve_builtin(&self, _request: &mut MockRequest, error: RecoverableError) -> Resolution {
        let mut script = self.script();
        script.calls.push(Call::ResolveBuiltin(error));
        script.builtin
    }
}
