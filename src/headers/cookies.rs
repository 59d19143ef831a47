//! Cookie extraction from header values.
//!
//! A malformed cookie string drops only that cookie; the rest of the header
//! and the request itself are unaffected.

use cookie::Cookie;

use super::HeaderTable;

/// Parse every `Cookie` request header (`a=1; b=2`) into individual cookies.
pub fn request_cookies(headers: &HeaderTable) -> Vec<Cookie<'static>> {
    let Some(values) = headers.get("cookie") else {
        return Vec::new();
    };
    values
        .iter()
        .flat_map(|value| Cookie::split_parse(value.clone()))
        .filter_map(|parsed| match parsed {
            Ok(cookie) => Some(cookie),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed request cookie");
                None
            }
        })
        .collect()
}

/// Parse every `Set-Cookie` header value, one cookie per value.
pub fn set_cookies(headers: &HeaderTable) -> Vec<Cookie<'static>> {
    let Some(values) = headers.get("set-cookie") else {
        return Vec::new();
    };
    values
        .iter()
        .filter_map(|value| match Cookie::parse(value.clone()) {
            Ok(cookie) => Some(cookie),
            Err(e) => {
                tracing::debug!(error = %e, value = %value, "Dropping malformed set-cookie");
                None
            }
        })
        .collect()
}
