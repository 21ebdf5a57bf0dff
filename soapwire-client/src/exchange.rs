//! One complete request/response cycle over a [`SoapIo`].

use crate::client::{HeaderLine, SoapIo, WriteStatus};
use crate::error::TransportError;

const READ_CHUNK: usize = 8192;

/// A request as an engine would write it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SoapRequest {
    /// Headers in write order. `Content-Length` is added when missing.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SoapRequest {
    /// A `text/xml` request carrying `envelope`.
    pub fn xml(envelope: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: vec![("Content-Type".to_string(), "text/xml; charset=utf-8".to_string())],
            body: envelope.into(),
        }
    }

    /// Add a header written after `Content-Type`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What came back: the status and the raw stream the transport delivered,
/// header block included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub raw: Vec<u8>,
}

impl SoapResponse {
    /// The part after the blank line ending the header block.
    pub fn body(&self) -> &[u8] {
        match self.raw.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(end) => &self.raw[end + 4..],
            None => &[],
        }
    }

    /// Header lines, status line excluded.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let end = self
            .raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap_or(0);
        std::str::from_utf8(&self.raw[..end])
            .unwrap_or_default()
            .split("\r\n")
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim()))
    }

    /// First header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

/// Open `endpoint`, write `request` and read the whole response.
///
/// The transport is left open; the next exchange reopens it.
pub fn exchange<T: SoapIo + ?Sized>(
    io: &mut T,
    endpoint: &str,
    request: &SoapRequest,
) -> Result<SoapResponse, TransportError> {
    io.open(endpoint)?;

    io.post_header(HeaderLine::Begin)?;
    let mut has_length = false;
    for (name, value) in &request.headers {
        has_length |= name.eq_ignore_ascii_case("Content-Length");
        io.post_header(HeaderLine::field(name, value))?;
    }
    if !has_length {
        let length = request.body.len().to_string();
        io.post_header(HeaderLine::field("Content-Length", &length))?;
    }
    io.post_header(HeaderLine::End)?;

    let status = match io.send(&request.body)? {
        WriteStatus::Sent { status } => status,
        WriteStatus::Buffered => {
            return Err(TransportError::protocol(
                "request body shorter than its declared Content-Length",
            ));
        }
    };

    let mut raw = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = io.recv(&mut chunk)?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
    }

    Ok(SoapResponse { status, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpTransport;
    use crate::testing::{Call, MockNetwork, SendOutcome};

    #[test]
    fn test_exchange_round() {
        let network = MockNetwork::new();
        network.script().body = b"<sum>3</sum>".to_vec();
        let mut transport = HttpTransport::new(network.clone());

        let request = SoapRequest::xml("<add>1 2</add>").header("SOAPAction", "\"add\"");
        let response = exchange(&mut transport, "http://example.com/calc", &request).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body(), b"<sum>3</sum>");
        assert_eq!(response.header("content-type"), Some("text/xml"));
        assert!(
            network
                .calls()
                .contains(&Call::AddHeader("Content-Length".into(), "14".into()))
        );
    }

    #[test]
    fn test_exchange_reports_status() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Status(500));
        let mut transport = HttpTransport::new(network);

        let request = SoapRequest::xml("<x/>");
        let response = exchange(&mut transport, "http://example.com/", &request).unwrap();
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_short_body_is_rejected() {
        let network = MockNetwork::new();
        let mut transport = HttpTransport::new(network.clone());
        let request = SoapRequest::xml("<x/>").header("Content-Length", "10");
        let err = exchange(&mut transport, "http://example.com/", &request).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        assert!(network.sent_bodies().is_empty());
    }

    #[test]
    fn test_works_through_trait_object() {
        let network = MockNetwork::new();
        let mut transport = HttpTransport::new(network);
        let io: &mut dyn SoapIo = &mut transport;
        let response = exchange(io, "http://example.com/", &SoapRequest::xml("<x/>")).unwrap();
        assert_eq!(response.body(), b"<ok/>");
    }
}
