//! Response facade.
//!
//! # Responsibilities
//! - Hold status, reason phrase and headers while the response is open
//! - Finalize the head exactly once, on the first flush or on close
//! - Stream body chunks to the native transport
//!
//! # Design Decisions
//! - Status, reason and headers all share one finalization point: the header
//!   table's mode. Once it is `Finalized`, every setter fails
//! - Features without a native counterpart fail with `UnsupportedOperation`

use std::time::{Duration, Instant};

use bytes::Bytes;
use cookie::Cookie;
use http::{StatusCode, Version};

use crate::error::{HeaderImmutableError, ResponseError, UnsupportedOperation};
use crate::headers::{cookies, HeaderTable};
use crate::observability::metrics;
use crate::transport::{ResponseHead, ResponseSink};

/// The response half of a request/response pair.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderTable,
    sink: ResponseSink,
    closed: bool,
}

impl HttpResponse {
    pub(crate) fn new(version: Version, sink: ResponseSink) -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderTable::response(version),
            sink,
            closed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), HeaderImmutableError> {
        self.ensure_open("status")?;
        self.status = status;
        Ok(())
    }

    /// Explicit reason phrase, or the canonical one for the current status.
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }

    pub fn set_reason_phrase(&mut self, reason: impl Into<String>) -> Result<(), HeaderImmutableError> {
        self.ensure_open("reason phrase")?;
        self.reason = Some(reason.into());
        Ok(())
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    /// Mutable headers. Mutations fail once the response is finalized.
    pub fn headers_mut(&mut self) -> &mut HeaderTable {
        &mut self.headers
    }

    /// Cookies currently set through `set-cookie` headers.
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        cookies::set_cookies(&self.headers)
    }

    pub fn add_cookie(&mut self, cookie: &Cookie<'_>) -> Result<(), HeaderImmutableError> {
        self.headers.add("set-cookie", cookie.to_string())
    }

    pub fn set_content_length(&mut self, length: Option<u64>) -> Result<(), HeaderImmutableError> {
        self.headers.set_content_length(length)
    }

    pub fn set_persistent_connection(&mut self, persistent: bool) -> Result<(), HeaderImmutableError> {
        self.headers.set_persistent_connection(persistent)
    }

    /// Set or clear the `server` header.
    pub fn set_server_header(&mut self, server: Option<&str>) -> Result<(), HeaderImmutableError> {
        self.headers.set("server", server)
    }

    pub fn set_auto_compress(&mut self, _enabled: bool) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::AutoCompress)
    }

    pub fn set_idle_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::IdleTimeout)
    }

    pub fn set_buffer_output(&mut self, _buffer: bool) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::BufferOutput)
    }

    pub fn set_deadline(&mut self, _deadline: Option<Instant>) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::Deadline)
    }

    /// Taking over the raw socket is not possible through the transport boundary.
    pub fn detach_socket(&mut self) -> Result<(), UnsupportedOperation> {
        Err(UnsupportedOperation::DetachSocket)
    }

    /// Whether the head has been handed to the transport.
    pub fn is_finalized(&self) -> bool {
        self.headers.is_finalized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write a body chunk, finalizing the head first if needed.
    pub async fn write(&mut self, data: impl Into<Bytes>) -> Result<(), ResponseError> {
        if self.closed {
            return Err(ResponseError::Closed);
        }
        self.finalize()?;
        let data = data.into();
        if data.is_empty() {
            return Ok(());
        }
        self.sink.send_chunk(data).await?;
        Ok(())
    }

    /// Send the head now, even without body data.
    pub async fn flush(&mut self) -> Result<(), ResponseError> {
        if self.closed {
            return Err(ResponseError::Closed);
        }
        self.finalize()
    }

    /// Finalize the head and end the output. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), ResponseError> {
        if self.closed {
            return Ok(());
        }
        let finalized = self.finalize();
        self.sink.finish();
        self.closed = true;
        tracing::trace!(status = %self.status, "Response closed");
        finalized
    }

    /// Redirect to `location` with `status`, then close.
    pub async fn redirect(&mut self, location: &str, status: StatusCode) -> Result<(), ResponseError> {
        self.set_status(status)?;
        self.headers.set("location", [location])?;
        self.close().await
    }

    fn finalize(&mut self) -> Result<(), ResponseError> {
        if !self.headers.finalize() {
            return Ok(());
        }
        let head = ResponseHead {
            status: self.status,
            reason: self.reason_phrase().to_string(),
            headers: self.headers.to_pairs(),
        };
        tracing::debug!(
            status = %head.status,
            headers = head.headers.len(),
            "Response head finalized"
        );
        metrics::record_response(head.status.as_u16());
        self.sink.send_head(head)?;
        Ok(())
    }

    /// Give the native sink back, for responses answered below this facade.
    pub(crate) fn into_sink(self) -> ResponseSink {
        self.sink
    }

    fn ensure_open(&self, target: &str) -> Result<(), HeaderImmutableError> {
        if self.headers.is_mutable() {
            Ok(())
        } else {
            Err(HeaderImmutableError::new(target))
        }
    }
}
