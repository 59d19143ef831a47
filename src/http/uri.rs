//! Externally visible request URI reconstruction.
//!
//! # Precedence
//! - Scheme: `x-forwarded-proto`, else `https` for encrypted connections, else `http`
//! - Host: `x-forwarded-host`, else `host`, else the local socket `address:port`
//! - Result: `scheme://host` followed by the raw request target
//!
//! Forwarding headers are only consulted when the resolver trusts them.

use url::Url;

use crate::error::UriError;
use crate::headers::HeaderTable;
use crate::net::NativeConnection;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// Builds the URI a client used to reach this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UriResolver {
    trust_forwarded_headers: bool,
}

impl UriResolver {
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    pub fn resolve(
        &self,
        headers: &HeaderTable,
        connection: &dyn NativeConnection,
        target: &str,
    ) -> Result<Url, UriError> {
        let scheme = self
            .forwarded(headers, FORWARDED_PROTO)
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| {
                let scheme = if connection.is_encrypted() { "https" } else { "http" };
                scheme.to_string()
            });

        let host = match self
            .forwarded(headers, FORWARDED_HOST)
            .or_else(|| headers.host().map(str::trim))
            .filter(|host| !host.is_empty())
        {
            Some(host) => host.to_string(),
            // SocketAddr formatting brackets IPv6 literals.
            None => connection.local_addr().ok_or(UriError::NoHost)?.to_string(),
        };

        let uri = if target.starts_with('/') {
            format!("{scheme}://{host}{target}")
        } else if let Ok(absolute) = Url::parse(target) {
            return Ok(absolute);
        } else {
            format!("{scheme}://{host}/{target}")
        };

        Url::parse(&uri).map_err(|source| UriError::Invalid { uri, source })
    }

    /// First token of the first value of a forwarding header, if trusted.
    fn forwarded<'a>(&self, headers: &'a HeaderTable, name: &str) -> Option<&'a str> {
        if !self.trust_forwarded_headers {
            return None;
        }
        headers
            .first(name)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

impl Default for UriResolver {
    fn default() -> Self {
        Self::new(true)
    }
}
