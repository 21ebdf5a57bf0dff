//! Pluggable resolution of authentication and trust challenges.
//!
//! When a send fails with a [`RecoverableError`] or the server answers 401 or
//! 407, the send engine asks the configured [`Resolver`] what to do. Returning
//! [`Resolution::DeferToBuiltin`] hands the challenge to the network layer's
//! own handling ([`NetworkLayer::resolve_builtin`](crate::NetworkLayer::resolve_builtin)).
//!
//! ```ignore
//! use soapwire_client::{Challenge, Resolution, resolver_fn};
//!
//! let resolver = resolver_fn(|request, challenge| match challenge {
//!     Challenge::Status(401) => {
//!         request.set_credentials("user", "secret");
//!         Resolution::Resolved
//!     }
//!     _ => Resolution::DeferToBuiltin,
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::RecoverableError;
use crate::network::RequestControl;

/// Outcome of asking a resolver about a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Give up; the challenge becomes the caller's problem.
    NotResolved,
    /// The request was adjusted; resend it.
    Resolved,
    /// Let the network layer's built-in handling decide.
    DeferToBuiltin,
}

/// What the resolver is asked about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Challenge {
    /// The send itself failed with a recoverable error.
    Send(RecoverableError),
    /// The response status asked for credentials (401 or 407).
    Status(u16),
}

impl Challenge {
    /// The error handed to built-in resolution for this challenge.
    pub fn builtin_error(self) -> RecoverableError {
        match self {
            Challenge::Send(error) => error,
            Challenge::Status(_) => RecoverableError::IncorrectPassword,
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::Send(error) => write!(f, "send error {error}"),
            Challenge::Status(code) => write!(f, "HTTP status {code}"),
        }
    }
}

/// Strategy for answering challenges without user interaction.
///
/// Implemented for every `Fn(&mut dyn RequestControl, Challenge) -> Resolution`.
pub trait ResolveChallenge: Send + Sync {
    fn resolve(&self, request: &mut dyn RequestControl, challenge: Challenge) -> Resolution;
}

impl<F> ResolveChallenge for F
where
    F: Fn(&mut dyn RequestControl, Challenge) -> Resolution + Send + Sync,
{
    fn resolve(&self, request: &mut dyn RequestControl, challenge: Challenge) -> Resolution {
        self(request, challenge)
    }
}

/// Shared resolver handle.
pub type Resolver = Arc<dyn ResolveChallenge>;

/// Resolver that always defers to built-in handling.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferToBuiltin;

impl ResolveChallenge for DeferToBuiltin {
    fn resolve(&self, _request: &mut dyn RequestControl, _challenge: Challenge) -> Resolution {
        Resolution::DeferToBuiltin
    }
}

/// The resolver used when none is configured.
pub fn default_resolver() -> Resolver {
    Arc::new(DeferToBuiltin)
}

/// Wrap a closure as a [`Resolver`].
pub fn resolver_fn<F>(f: F) -> Resolver
where
    F: Fn(&mut dyn RequestControl, Challenge) -> Resolution + Send + Sync + 'static,
{
    Arc::new(f)
}
