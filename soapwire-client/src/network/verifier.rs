//! Server certificate verification honouring the `IGNORE_*` request flags.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{
    WebPkiServerVerifier, verify_server_cert_signed_by_trust_anchor, verify_server_name,
};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::flags::RequestFlags;

/// Validity windows stepped into before giving up on a chain.
const MAX_CLOCK_MOVES: usize = 8;

/// WebPKI verification that forgives the certificate errors a request
/// chose to ignore:
///
/// | flag | forgives |
/// |------|----------|
/// | `IGNORE_CERT_CN_INVALID` | name mismatch |
/// | `IGNORE_CERT_DATE_INVALID` | expired or not yet valid |
/// | `IGNORE_UNKNOWN_CA` | unknown issuer |
///
/// WebPKI stops at the first failed check, so a forgiven error never
/// ends verification: a date error moves the clock into the reported
/// window and verifies again, and an unknown issuer is followed by the
/// name and date checks against the presented chain. Handshake signatures
/// are always checked.
#[derive(Debug)]
pub(crate) struct RelaxedVerifier {
    // None when the root store is empty
    inner: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
    flags: RequestFlags,
}

impl RelaxedVerifier {
    pub(crate) fn new(
        roots: Arc<RootCertStore>,
        provider: Arc<CryptoProvider>,
        flags: RequestFlags,
    ) -> Self {
        let inner = WebPkiServerVerifier::builder_with_provider(roots, provider.clone())
            .build()
            .ok();
        Self {
            inner,
            provider,
            flags,
        }
    }

    fn forgives(&self, error: &CertificateError) -> bool {
        let flag = match error {
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
                RequestFlags::IGNORE_CERT_CN_INVALID
            }
            CertificateError::Expired
            | CertificateError::ExpiredContext { .. }
            | CertificateError::NotValidYet
            | CertificateError::NotValidYetContext { .. } => RequestFlags::IGNORE_CERT_DATE_INVALID,
            CertificateError::UnknownIssuer => RequestFlags::IGNORE_UNKNOWN_CA,
            _ => return false,
        };
        self.flags.contains(flag)
    }

    /// Run `check`, moving `now` into the reported validity window while
    /// the date error is forgiven. Other forgiven errors are returned.
    fn forgiving_dates<F>(&self, now: UnixTime, mut check: F) -> Result<(), rustls::Error>
    where
        F: FnMut(UnixTime) -> Result<(), rustls::Error>,
    {
        let mut now = now;
        for _ in 0..MAX_CLOCK_MOVES {
            let error = match check(now) {
                Err(rustls::Error::InvalidCertificate(error)) if self.forgives(&error) => error,
                result => return result,
            };
            now = match error {
                CertificateError::ExpiredContext { not_after, .. } => not_after,
                CertificateError::NotValidYetContext { not_before, .. } => not_before,
                other => return Err(rustls::Error::InvalidCertificate(other)),
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(now = now.as_secs(), "certificate date ignored by request flags");
        }
        Err(rustls::Error::InvalidCertificate(CertificateError::Expired))
    }

    fn verify_trusted(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<(), rustls::Error> {
        match &self.inner {
            Some(inner) => inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
                .map(|_| ()),
            None => Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            )),
        }
    }

    /// Checks left to do once an unknown issuer is forgiven: the chain is
    /// verified up to its own top certificate, then the name.
    fn verify_untrusted(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> Result<(), rustls::Error> {
        let parsed = ParsedCertificate::try_from(end_entity)?;

        let top = intermediates.last().unwrap_or(end_entity);
        let mut anchors = RootCertStore::empty();
        anchors.add(top.clone())?;
        let algorithms = self.provider.signature_verification_algorithms.all;

        let anchored = self.forgiving_dates(now, |now| {
            verify_server_cert_signed_by_trust_anchor(
                &parsed,
                &anchors,
                intermediates,
                now,
                algorithms,
            )
        });
        match anchored {
            // the issuer is outside the presented chain; WebPKI checks a
            // certificate's own window before looking for its issuer
            Ok(()) | Err(rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)) => {}
            Err(error) => return Err(error),
        }

        if !self.flags.contains(RequestFlags::IGNORE_CERT_CN_INVALID) {
            verify_server_name(&parsed, server_name)?;
        }
        Ok(())
    }
}

impl ServerCertVerifier for RelaxedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = self.forgiving_dates(now, |now| {
            self.verify_trusted(end_entity, intermediates, server_name, ocsp_response, now)
        });

        let error = match verdict {
            Ok(()) => return Ok(ServerCertVerified::assertion()),
            Err(rustls::Error::InvalidCertificate(error)) if self.forgives(&error) => error,
            Err(error) => return Err(error),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(?error, "certificate error ignored by request flags");

        match error {
            // the name is checked after the chain and the dates
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
                Ok(ServerCertVerified::assertion())
            }
            CertificateError::UnknownIssuer => {
                self.verify_untrusted(end_entity, intermediates, server_name, now)?;
                Ok(ServerCertVerified::assertion())
            }
            // a date error without its window leaves the rest unchecked
            other => Err(rustls::Error::InvalidCertificate(other)),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
