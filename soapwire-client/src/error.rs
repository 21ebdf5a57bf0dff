//! Error types for the transport adapter.
//!
//! - [`NetError`]: what a [`NetworkLayer`](crate::NetworkLayer) reports
//! - [`TransportError`]: what the caller of [`HttpTransport`](crate::HttpTransport) sees

use std::fmt;

use soapwire_core::CoreError;

use crate::resolver::Challenge;

/// Send failures that a resolver may be able to fix before a resend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoverableError {
    /// A redirect would move the request from http to https.
    HttpToHttpsOnRedirect,
    /// A redirect would move the request from https to http.
    HttpsToHttpOnRedirect,
    /// Missing or wrong credentials. Also used for 401 and 407 responses.
    IncorrectPassword,
    /// The certificate chain ends in an unknown authority.
    InvalidCa,
    /// Posting over an insecure channel needs confirmation.
    PostIsNonSecure,
    /// The certificate is not valid for the host name.
    CertCommonNameInvalid,
    /// The certificate is expired or not yet valid.
    CertDateInvalid,
    /// The server asked for a client certificate.
    ClientAuthCertNeeded,
}

impl RecoverableError {
    /// Stable upper-case name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            RecoverableError::HttpToHttpsOnRedirect => "HTTP_TO_HTTPS_ON_REDIR",
            RecoverableError::HttpsToHttpOnRedirect => "HTTPS_TO_HTTP_ON_REDIR",
            RecoverableError::IncorrectPassword => "INCORRECT_PASSWORD",
            RecoverableError::InvalidCa => "INVALID_CA",
            RecoverableError::PostIsNonSecure => "POST_IS_NON_SECURE",
            RecoverableError::CertCommonNameInvalid => "SEC_CERT_CN_INVALID",
            RecoverableError::CertDateInvalid => "SEC_CERT_DATE_INVALID",
            RecoverableError::ClientAuthCertNeeded => "CLIENT_AUTH_CERT_NEEDED",
        }
    }
}

impl fmt::Display for RecoverableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Category of a [`NetError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetErrorKind {
    Connect,
    Timeout,
    Send,
    Receive,
    Query,
    Recoverable(RecoverableError),
    Other,
}

/// An error reported by a network layer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} error {code}: {message}")]
pub struct NetError {
    pub kind: NetErrorKind,
    /// Layer specific numeric code, 0 when there is none.
    pub code: u32,
    pub message: String,
}

impl NetError {
    /// An error with code 0.
    pub fn new<S: Into<String>>(kind: NetErrorKind, message: S) -> Self {
        Self {
            kind,
            code: 0,
            message: message.into(),
        }
    }

    /// Attach a numeric code.
    pub fn with_code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    /// A failure a resolver may be able to fix.
    pub fn recoverable(error: RecoverableError) -> Self {
        Self::new(NetErrorKind::Recoverable(error), error.name())
    }

    /// The recoverable error carried by this failure, if any.
    pub fn as_recoverable(&self) -> Option<RecoverableError> {
        match self.kind {
            NetErrorKind::Recoverable(error) => Some(error),
            _ => None,
        }
    }
}

/// How a [`TransportError`] should be treated by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connect, send or receive failure in the network layer.
    Transport,
    /// Malformed or oversized message data.
    Protocol,
    /// Allocation failure; the session stays usable.
    Resource,
    /// Authentication or certificate challenge nobody resolved.
    RecoverableAuthTrust,
    /// No connection or request; equivalent to end of stream.
    State,
}

/// Errors returned by [`HttpTransport`](crate::HttpTransport) operations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// The network layer failed.
    #[error("transport error {code}: {message}")]
    Transport {
        kind: NetErrorKind,
        code: u32,
        message: String,
    },

    /// Malformed message data or a buffer too small for the response headers.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A buffer could not grow; the current message is lost.
    #[error("out of memory growing buffer to {requested} bytes")]
    OutOfMemory { requested: usize },

    /// An authentication or trust challenge was not resolved.
    #[error("unresolved challenge: {0}")]
    Unresolved(Challenge),

    /// The connection is gone (never opened, closed, or dropped by the peer).
    #[error("not connected")]
    NotConnected,

    /// No request is open.
    #[error("no request in progress")]
    NoRequest,

    /// The endpoint URL could not be parsed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// Create a protocol error.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        TransportError::Protocol(message.into())
    }

    /// Broad category, for callers that only branch on kind of failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::Transport { .. } | TransportError::InvalidEndpoint(_) => {
                ErrorClass::Transport
            }
            TransportError::Protocol(_) => ErrorClass::Protocol,
            TransportError::OutOfMemory { .. } => ErrorClass::Resource,
            TransportError::Unresolved(_) => ErrorClass::RecoverableAuthTrust,
            TransportError::NotConnected | TransportError::NoRequest => ErrorClass::State,
        }
    }

    /// Whether the caller should treat this as end of stream.
    pub fn is_eof(&self) -> bool {
        self.class() == ErrorClass::State
    }

    /// Whether reopening and repeating the whole exchange may succeed.
    ///
    /// True for end-of-stream errors and for connect failures and timeouts.
    /// The adapter itself never retries these; see
    /// [`retry_with_policy`](crate::retry_with_policy).
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Transport { kind, .. } => {
                matches!(kind, NetErrorKind::Connect | NetErrorKind::Timeout)
            }
            other => other.is_eof(),
        }
    }

    /// Numeric code of a transport error.
    pub fn code(&self) -> Option<u32> {
        match self {
            TransportError::Transport { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<NetError> for TransportError {
    fn from(err: NetError) -> Self {
        TransportError::Transport {
            kind: err.kind,
            code: err.code,
            message: err.message,
        }
    }
}

impl From<CoreError> for TransportError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::OutOfMemory { requested } => TransportError::OutOfMemory { requested },
            CoreError::Protocol(message) => TransportError::Protocol(message),
            CoreError::HeaderBufferTooSmall { needed, available } => TransportError::Protocol(
                format!("buffer too small for response headers: need {needed}, have {available}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        let transport: TransportError = NetError::new(NetErrorKind::Send, "reset").into();
        assert_eq!(transport.class(), ErrorClass::Transport);

        let resource: TransportError = CoreError::OutOfMemory { requested: 4096 }.into();
        assert_eq!(resource.class(), ErrorClass::Resource);

        let protocol: TransportError = CoreError::HeaderBufferTooSmall {
            needed: 10,
            available: 1,
        }
        .into();
        assert_eq!(protocol.class(), ErrorClass::Protocol);

        let unresolved = TransportError::Unresolved(Challenge::Status(401));
        assert_eq!(unresolved.class(), ErrorClass::RecoverableAuthTrust);

        assert!(TransportError::NotConnected.is_eof());
        assert!(TransportError::NoRequest.is_eof());
        assert!(!unresolved.is_eof());
    }

    #[test]
    fn test_is_retryable() {
        assert!(TransportError::NotConnected.is_retryable());

        let connect: TransportError = NetError::new(NetErrorKind::Connect, "refused").into();
        assert!(connect.is_retryable());
        let timeout: TransportError = NetError::new(NetErrorKind::Timeout, "slow").into();
        assert!(timeout.is_retryable());

        let send: TransportError = NetError::new(NetErrorKind::Send, "reset").into();
        assert!(!send.is_retryable());
        assert!(!TransportError::protocol("bad").is_retryable());
        assert!(!TransportError::Unresolved(Challenge::Status(407)).is_retryable());
    }

    #[test]
    fn test_net_error_display() {
        let err = NetError::recoverable(RecoverableError::InvalidCa).with_code(7);
        assert_eq!(err.as_recoverable(), Some(RecoverableError::InvalidCa));
        assert_eq!(err.to_string(), "Recoverable(InvalidCa) error 7: INVALID_CA");

        let err: TransportError = NetError::new(NetErrorKind::Connect, "refused")
            .with_code(111)
            .into();
        assert_eq!(err.to_string(), "transport error 111: refused");
        assert_eq!(err.code(), Some(111));
    }
}
