//! Request facade.
//!
//! # Responsibilities
//! - Wrap one native exchange as a request plus its paired response
//! - Build the header table, cookies and requested URI lazily, once each
//! - Expose the body as a lazy byte stream
//!
//! # Design Decisions
//! - Derived fields are memoized in `OnceLock`s; a second access returns the
//!   same value without recomputation
//! - Sessions and client certificates fail with `UnsupportedOperation`

use std::fmt;
use std::sync::{Arc, OnceLock};

use cookie::Cookie;
use http::{Method, Version};
use url::Url;
use uuid::Uuid;

use super::response::HttpResponse;
use super::uri::UriResolver;
use crate::error::{UnsupportedOperation, UriError};
use crate::headers::{cookies, HeaderTable};
use crate::net::{ConnectionInfo, NativeConnection};
use crate::transport::{Body, NativeExchange, RequestHead};

/// Header used to carry request IDs.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Unique identifier for a request, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reuse a UUID from an incoming `x-request-id` header, if it carries one.
    fn from_head(head: &RequestHead) -> Self {
        head.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(X_REQUEST_ID))
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
            .map(Self)
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An incoming request and its paired response.
pub struct HttpRequest {
    id: RequestId,
    head: RequestHead,
    connection: Arc<dyn NativeConnection>,
    uri_resolver: UriResolver,
    headers: OnceLock<HeaderTable>,
    cookies: OnceLock<Vec<Cookie<'static>>>,
    requested_uri: OnceLock<Result<Url, UriError>>,
    body: Option<Body>,
    response: HttpResponse,
}

impl HttpRequest {
    pub(crate) fn from_exchange(exchange: NativeExchange, uri_resolver: UriResolver) -> Self {
        let NativeExchange {
            head,
            connection,
            body,
            response,
        } = exchange;
        let response = HttpResponse::new(head.version, response);
        Self {
            id: RequestId::from_head(&head),
            head,
            connection,
            uri_resolver,
            headers: OnceLock::new(),
            cookies: OnceLock::new(),
            requested_uri: OnceLock::new(),
            body: Some(body),
            response,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn protocol_version(&self) -> Version {
        self.head.version
    }

    /// Raw request target as received (path and query).
    pub fn target(&self) -> &str {
        &self.head.target
    }

    pub fn path(&self) -> &str {
        let target = self.target();
        let end = target.find(['?', '#']).unwrap_or(target.len());
        &target[..end]
    }

    pub fn query(&self) -> Option<&str> {
        let target = self.target();
        let start = target.find('?')? + 1;
        let end = target[start..]
            .find('#')
            .map(|i| start + i)
            .unwrap_or(target.len());
        Some(&target[start..end])
    }

    /// Read-only request headers.
    pub fn headers(&self) -> &HeaderTable {
        self.headers.get_or_init(|| {
            HeaderTable::request(
                self.head.version,
                self.head
                    .headers
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.clone())),
            )
        })
    }

    /// Cookies from the `cookie` header; malformed entries are skipped.
    pub fn cookies(&self) -> &[Cookie<'static>] {
        self.cookies
            .get_or_init(|| cookies::request_cookies(self.headers()))
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers().content_length()
    }

    pub fn persistent_connection(&self) -> bool {
        self.headers().persistent_connection()
    }

    /// Endpoint snapshot, read from the native socket on every call.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        ConnectionInfo::from_native(self.connection.as_ref())
    }

    /// URI the client used to reach this server, resolved on first access.
    pub fn requested_uri(&self) -> Result<&Url, UriError> {
        let resolved = self.requested_uri.get_or_init(|| {
            self.uri_resolver
                .resolve(self.headers(), self.connection.as_ref(), self.target())
        });
        match resolved {
            Ok(uri) => Ok(uri),
            Err(e) => Err(e.clone()),
        }
    }

    /// Take the body stream. Later calls return `None`.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    pub fn into_response(self) -> HttpResponse {
        self.response
    }

    pub fn session(&self) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::Session)
    }

    pub fn certificate(&self) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::ClientCertificate)
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("id", &self.id)
            .field("method", &self.head.method)
            .field("target", &self.head.target)
            .field("version", &self.head.version)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
