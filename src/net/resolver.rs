//! Bind address resolution.
//!
//! # Responsibilities
//! - Accept IP literals as-is (bracketed IPv6 included)
//! - Resolve host names through an `AddressResolver`
//! - Pick the first resolved candidate

use std::io;
use std::net::IpAddr;

use futures_util::future::BoxFuture;

use crate::error::BindError;

/// Host name lookup collaborator.
pub trait AddressResolver: Send + Sync {
    /// Resolve `host` to an ordered list of candidate addresses.
    fn lookup(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl AddressResolver for SystemResolver {
    fn lookup(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        let host = host.to_string();
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        })
    }
}

/// Parse `address` as an IP literal, if it is one.
pub fn parse_literal(address: &str) -> Option<IpAddr> {
    let trimmed = address
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(address);
    trimmed.parse().ok()
}

/// Turn a bind address into the IP to listen on.
pub async fn resolve_bind_address(
    resolver: &dyn AddressResolver,
    address: &str,
) -> Result<IpAddr, BindError> {
    if let Some(ip) = parse_literal(address) {
        return Ok(ip);
    }

    let candidates = resolver
        .lookup(address)
        .await
        .map_err(|source| BindError::Resolve {
            host: address.to_string(),
            source,
        })?;

    tracing::debug!(host = %address, candidates = ?candidates, "Resolved bind address");

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| BindError::NoAddresses(address.to_string()))
}
