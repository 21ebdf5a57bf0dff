//! TLS plumbing for [`HyperNetwork`](super::HyperNetwork).
//!
//! # Feature Flags
//!
//! TLS needs a crypto provider and root certificates:
//!
//! - **Crypto providers**: `tls-ring` (default with `tls`) or `tls-aws-lc`.
//!   Without either, a provider installed with
//!   `CryptoProvider::install_default()` is used.
//! - **Root certificates**: `tls-native-roots` (default with `tls`) or
//!   `tls-webpki-roots`. Without either, roots must be supplied through
//!   [`HyperNetworkBuilder`](super::HyperNetworkBuilder).
//!
//! A client configuration is built per dial, because the request flags
//! decide which certificate problems are tolerated.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};

use super::verifier::RelaxedVerifier;
use crate::flags::RequestFlags;

/// Whether the crate was built with both a crypto provider and root
/// certificates, so `https` endpoints work without further setup.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// The crypto provider to build client configurations with.
///
/// A feature-selected provider wins over a process-wide default.
pub(crate) fn crypto_provider() -> Option<Arc<CryptoProvider>> {
    #[cfg(feature = "tls-ring")]
    return Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    CryptoProvider::get_default().cloned()
}

/// Root certificates from the enabled features; empty without any.
pub(crate) fn default_root_store() -> RootCertStore {
    #[allow(unused_mut)]
    let mut roots = RootCertStore::empty();

    #[cfg(feature = "tls-native-roots")]
    {
        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native.errors);
        }
        roots.add_parsable_certificates(native.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    roots
}

/// A client configuration whose verifier tolerates what `flags` ignore.
pub(crate) fn client_config(
    provider: Arc<CryptoProvider>,
    roots: Arc<RootCertStore>,
    flags: RequestFlags,
) -> Result<ClientConfig, rustls::Error> {
    let verifier = RelaxedVerifier::new(roots, provider.clone(), flags);
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(config)
}

/// An HTTP/1.1-only connector speaking TLS with `config`.
pub(crate) fn https_connector(config: ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_only()
        .enable_http1()
        .build()
}

/// A plain TCP connector.
pub(crate) fn http_connector() -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    connector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_client_config_with_empty_roots() {
        let provider = crypto_provider().unwrap();
        let config = client_config(
            provider,
            Arc::new(RootCertStore::empty()),
            RequestFlags::IGNORE_UNKNOWN_CA,
        )
        .unwrap();
        assert!(config.alpn_protocols.is_empty());
        let _ = https_connector(config);
    }

    #[test]
    fn test_tls_support_matches_features() {
        let expected = cfg!(all(feature = "tls-ring", feature = "tls-native-roots"));
        if expected {
            assert!(has_tls_support());
        }
        let _ = http_connector();
    }
}
