//! Blocking HTTP(S) transport for SOAP RPC engines.
//!
//! A SOAP engine writes its request as a header block and any number of
//! partial body writes, then reads the response back as one byte stream. This
//! crate turns those calls into exactly one buffered HTTP POST per message,
//! resolves authentication and certificate challenges by resending the same
//! bytes, and hands the response back with a reconstructed header block in
//! front of the body.
//!
//! ## Example
//!
//! ```ignore
//! use soapwire_client::{HttpTransport, HyperNetwork, SoapRequest, exchange};
//!
//! let mut transport = HttpTransport::builder()
//!     .keep_alive(true)
//!     .build(HyperNetwork::new()?);
//!
//! let request = SoapRequest::xml(envelope).header("SOAPAction", "\"urn:calc#add\"");
//! let response = exchange(&mut transport, "https://example.com/calc", &request)?;
//! println!("{} {}", response.status, String::from_utf8_lossy(response.body()));
//! ```
//!
//! ## Challenges
//!
//! A 401/407 response or a recoverable send failure (untrusted or expired
//! certificate, name mismatch, scheme-changing redirect) is handed to the
//! configured [`Resolver`]:
//!
//! ```ignore
//! use soapwire_client::{Challenge, RecoverableError, RequestFlags, Resolution, resolver_fn};
//!
//! let resolver = resolver_fn(|request, challenge| match challenge {
//!     Challenge::Status(401) => {
//!         request.set_credentials("svc-billing", &password);
//!         Resolution::Resolved
//!     }
//!     Challenge::Send(RecoverableError::InvalidCa) => {
//!         request.add_flags(RequestFlags::IGNORE_UNKNOWN_CA);
//!         Resolution::Resolved
//!     }
//!     _ => Resolution::DeferToBuiltin,
//! });
//! ```
//!
//! ## Modules
//!
//! - [`network`]: the [`NetworkLayer`] seam and the hyper-based [`HyperNetwork`]
//! - [`retry`]: whole-exchange retry with exponential backoff
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` / `tls-aws-lc` | rustls crypto provider |
//! | `tls-native-roots` / `tls-webpki-roots` | root certificates |
//! | `tracing` (default) | debug events for every diagnostic line and status notification |

mod builder;
mod client;
mod diagnostics;
mod endpoint;
mod error;
mod exchange;
mod flags;
pub mod network;
mod options;
mod receive;
mod resolver;
pub mod retry;
mod send;
mod session;

#[cfg(test)]
mod testing;

pub use builder::TransportBuilder;
pub use client::{HeaderLine, HttpTransport, SoapIo, WriteStatus};
pub use diagnostics::{DiagnosticLog, FileSink, LogSink, request_id};
pub use endpoint::Endpoint;
pub use error::{ErrorClass, NetError, NetErrorKind, RecoverableError, TransportError};
pub use exchange::{SoapRequest, SoapResponse, exchange};
pub use flags::RequestFlags;
pub use network::{
    HeaderQuery, HeaderQueryResult, HyperNetwork, HyperNetworkBuilder, NetworkLayer,
    RequestControl, StatusEvent, StatusNotifier, Target, has_tls_support,
};
pub use options::{Timeouts, TransportOptions, UNLIMITED_TIMEOUT};
pub use resolver::{
    Challenge, DeferToBuiltin, Resolution, ResolveChallenge, Resolver, default_resolver,
    resolver_fn,
};
pub use retry::{ExponentialBackoff, RetryPolicy, retry_with_policy};
pub use session::{Session, SessionState};

pub use soapwire_core::ContentKind;
