//! Endpoint URL parsing.

use http::Uri;

use crate::error::TransportError;
use crate::network::Target;

/// A parsed service endpoint: where to connect and which path to POST to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub target: Target,
    /// Path and query, always starting with `/`.
    pub path: String,
}

impl Endpoint {
    /// Parse an `http://` or `https://` URL.
    ///
    /// The port defaults to 80 or 443 and the path to `/`.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidEndpoint(format!("{url}: {e}")))?;

        let secure = match uri.scheme_str() {
            Some(scheme) if scheme.eq_ignore_ascii_case("https") => true,
            Some(scheme) if scheme.eq_ignore_ascii_case("http") => false,
            Some(scheme) => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "{url}: unsupported scheme {scheme:?}"
                )));
            }
            None => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "{url}: missing scheme"
                )));
            }
        };

        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("{url}: missing host")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| pq.starts_with('/'))
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            target: Target { host, port, secure },
            path,
        })
    }
}
