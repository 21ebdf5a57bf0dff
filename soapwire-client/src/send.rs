//! Sending a complete message and resolving challenges.
//!
//! The message is sent as one byte slice. If the send fails with a
//! [`RecoverableError`], or the server answers 401 or 407, the resolver (and
//! after it the network layer's built-in handling) gets a chance to adjust the
//! request. When it reports [`Resolution::Resolved`] the very same bytes are
//! sent again.

use crate::diagnostics::DiagnosticLog;
use crate::error::{RecoverableError, TransportError};
use crate::flags::RequestFlags;
use crate::network::{NetworkLayer, RequestControl};
use crate::resolver::{Challenge, ResolveChallenge, Resolution};
use crate::session::Session;

const UNAUTHORIZED: u16 = 401;
const PROXY_AUTHENTICATION_REQUIRED: u16 = 407;

/// Ask the resolver, then built-in handling, about `challenge`.
pub(crate) fn resolve_challenge<N: NetworkLayer>(
    network: &N,
    request: &mut N::Request,
    resolver: &dyn ResolveChallenge,
    challenge: Challenge,
    diag: &mut DiagnosticLog,
) -> Resolution {
    diag.line(format_args!("resolve: calling resolver for {challenge}"));
    let mut resolution = resolver.resolve(request, challenge);

    if resolution == Resolution::DeferToBuiltin {
        let error = challenge.builtin_error();
        diag.line(format_args!("resolve: built-in handling of {error}"));
        resolution = match network.resolve_builtin(request, error) {
            Resolution::DeferToBuiltin => Resolution::NotResolved,
            other => other,
        };

        if resolution == Resolution::Resolved && error == RecoverableError::CertCommonNameInvalid {
            diag.line(format_args!(
                "resolve: ignoring {} in future",
                RecoverableError::CertCommonNameInvalid
            ));
            request.add_flags(RequestFlags::IGNORE_CERT_CN_INVALID);
        }
    }

    diag.line(format_args!("resolve: result = {resolution:?}"));
    resolution
}

/// Send `message` on the session's open request until it goes through or a
/// challenge stays unresolved. Returns the final HTTP status.
///
/// A 401 or 407 nobody resolves is not an error: the response is delivered
/// as it is. An unresolved send error is returned as
/// [`TransportError::Unresolved`].
pub(crate) fn send_message<N: NetworkLayer>(
    network: &N,
    session: &mut Session<N>,
    resolver: &dyn ResolveChallenge,
    message: &[u8],
    max_resolve_attempts: Option<u32>,
    diag: &mut DiagnosticLog,
) -> Result<u16, TransportError> {
    let mut attempt = 0u32;
    let mut resolved = 0u32;

    loop {
        attempt += 1;
        diag.line(format_args!("send: sending message, attempt {attempt}"));

        let challenge = {
            let (connection, request) = session.handles_mut().ok_or(TransportError::NoRequest)?;
            match network.send(connection, request, message) {
                Ok(()) => {
                    let status = match network.status_code(request) {
                        Ok(status) => status,
                        Err(e) => {
                            diag.line(format_args!(
                                "send: error {} ({}) querying status",
                                e.code, e.message
                            ));
                            return Err(e.into());
                        }
                    };
                    diag.line(format_args!("send: HTTP status code = {status}"));
                    if status != UNAUTHORIZED && status != PROXY_AUTHENTICATION_REQUIRED {
                        return Ok(status);
                    }
                    diag.line(format_args!("send: user authentication required"));
                    Challenge::Status(status)
                }
                Err(e) => {
                    diag.line(format_args!("send: error {} ({}) in send", e.code, e.message));
                    match e.as_recoverable() {
                        Some(error) => Challenge::Send(error),
                        None => return Err(e.into()),
                    }
                }
            }
        };

        let exhausted = max_resolve_attempts.is_some_and(|max| resolved >= max);
        let resolution = if exhausted {
            diag.line(format_args!("send: giving up after {resolved} resolved challenges"));
            Resolution::NotResolved
        } else {
            let request = session.request_mut().ok_or(TransportError::NoRequest)?;
            resolve_challenge(network, request, resolver, challenge, diag)
        };

        if resolution == Resolution::Resolved {
            // resolving may have cost the connection; the resend reconnects
            session.clear_disconnect();
            resolved += 1;
            diag.line(format_args!("send: {challenge} resolved, retrying"));
            continue;
        }

        return match challenge {
            Challenge::Status(status) => Ok(status),
            Challenge::Send(_) => Err(TransportError::Unresolved(challenge)),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::endpoint::Endpoint;
    use crate::error::{NetError, NetErrorKind};
    use crate::options::Timeouts;
    use crate::resolver::{DeferToBuiltin, resolver_fn};
    use crate::testing::{Call, MockNetwork, SendOutcome};

    fn connected(network: &MockNetwork) -> (Session<MockNetwork>, DiagnosticLog) {
        let mut session = Session::new();
        let mut diag = DiagnosticLog::new();
        let endpoint = Endpoint::parse("https://example.com/svc").unwrap();
        session
            .open(network, &endpoint, &Timeouts::default(), &mut diag)
            .unwrap();
        session
            .create_request(network, RequestFlags::BASE, &mut diag)
            .unwrap();
        (session, diag)
    }

    fn resolving(result: Resolution) -> (Arc<AtomicUsize>, crate::resolver::Resolver) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let resolver = resolver_fn(move |_request, _challenge| {
            seen.fetch_add(1, Ordering::SeqCst);
            result
        });
        (count, resolver)
    }

    #[test]
    fn test_plain_success() {
        let network = MockNetwork::new();
        let (mut session, mut diag) = connected(&network);

        let status =
            send_message(&network, &mut session, &DeferToBuiltin, b"hello", None, &mut diag)
                .unwrap();
        assert_eq!(status, 200);
        assert_eq!(network.sent_bodies(), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_trust_error_resolved_resends_identical_bytes() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Fail(NetError::recoverable(
            RecoverableError::InvalidCa,
        )));
        let (mut session, mut diag) = connected(&network);
        // a notification during the failed attempt
        network.drop_connection();
        assert!(session.is_disconnected());

        let (count, resolver) = resolving(Resolution::Resolved);
        let message = b"<Envelope>payload</Envelope>";
        let status =
            send_message(&network, &mut session, &*resolver, message, None, &mut diag).unwrap();

        assert_eq!(status, 200);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let bodies = network.sent_bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[0], message.to_vec());
        assert!(!session.is_disconnected());
    }

    #[test]
    fn test_unresolved_send_error() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Fail(NetError::recoverable(
            RecoverableError::CertDateInvalid,
        )));
        let (mut session, mut diag) = connected(&network);

        let (_, resolver) = resolving(Resolution::NotResolved);
        let err = send_message(&network, &mut session, &*resolver, b"x", None, &mut diag)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unresolved(Challenge::Send(RecoverableError::CertDateInvalid))
        ));
        assert_eq!(network.sent_bodies().len(), 1);
        // declining resolver: built-in handling is not consulted
        assert!(
            !network
                .calls()
                .iter()
                .any(|c| matches!(c, Call::ResolveBuiltin(_)))
        );
    }

    #[test]
    fn test_plain_send_error_is_not_resolved() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Fail(
            NetError::new(NetErrorKind::Send, "broken pipe").with_code(32),
        ));
        let (mut session, mut diag) = connected(&network);

        let (count, resolver) = resolving(Resolution::Resolved);
        let err = send_message(&network, &mut session, &*resolver, b"x", None, &mut diag)
            .unwrap_err();
        assert_eq!(err.code(), Some(32));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unauthorized_delivered_when_not_resolved() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Status(401));
        let (mut session, mut diag) = connected(&network);

        let status =
            send_message(&network, &mut session, &DeferToBuiltin, b"x", None, &mut diag).unwrap();
        assert_eq!(status, 401);
        assert!(
            network
                .calls()
                .contains(&Call::ResolveBuiltin(RecoverableError::IncorrectPassword))
        );
    }

    #[test]
    fn test_proxy_auth_resolved_by_builtin() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Status(407));
        network.script().builtin = Resolution::Resolved;
        let (mut session, mut diag) = connected(&network);

        let status =
            send_message(&network, &mut session, &DeferToBuiltin, b"x", None, &mut diag).unwrap();
        assert_eq!(status, 200);
        assert_eq!(network.sent_bodies().len(), 2);
    }

    #[test]
    fn test_builtin_cn_resolution_sets_ignore_flag() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Fail(NetError::recoverable(
            RecoverableError::CertCommonNameInvalid,
        )));
        network.script().builtin = Resolution::Resolved;
        let (mut session, mut diag) = connected(&network);

        send_message(&network, &mut session, &DeferToBuiltin, b"x", None, &mut diag).unwrap();
        let request = session.request().unwrap();
        assert!(request.flags.contains(RequestFlags::IGNORE_CERT_CN_INVALID));
    }

    #[test]
    fn test_resolver_credentials_reach_request() {
        let network = MockNetwork::new();
        network.push_send(SendOutcome::Status(401));
        let (mut session, mut diag) = connected(&network);

        let resolver = resolver_fn(|request, challenge| {
            assert_eq!(challenge, Challenge::Status(401));
            request.set_credentials("alice", "pw");
            Resolution::Resolved
        });
        let status =
            send_message(&network, &mut session, &*resolver, b"x", None, &mut diag).unwrap();
        assert_eq!(status, 200);
        assert_eq!(
            session.request().unwrap().credentials,
            Some(("alice".to_string(), "pw".to_string()))
        );
    }

    #[test]
    fn test_resolve_cap() {
        let network = MockNetwork::new();
        for _ in 0..5 {
            network.push_send(SendOutcome::Status(401));
        }
        let (mut session, mut diag) = connected(&network);

        let (count, resolver) = resolving(Resolution::Resolved);
        let status =
            send_message(&network, &mut session, &*resolver, b"x", Some(2), &mut diag).unwrap();
        assert_eq!(status, 401);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(network.sent_bodies().len(), 3);
    }

    #[test]
    fn test_error_kind_is_preserved() {
        let network = MockNetwork::new();
        let (mut session, mut diag) = connected(&network);

        network.push_send(SendOutcome::Fail(NetError::new(NetErrorKind::Query, "gone")));
        let err = send_message(&network, &mut session, &DeferToBuiltin, b"x", None, &mut diag)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Transport {
                kind: NetErrorKind::Query,
                ..
            }
        ));
    }
}
