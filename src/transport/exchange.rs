//! One native request/response pair and the channel that carries the response
//! back to the transport.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode, Version};
use tokio::sync::{mpsc, oneshot};

use super::Body;
use crate::error::TransportError;
use crate::net::NativeConnection;

/// Request line and raw headers as the transport parsed them.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Raw request target (path + query, or absolute form).
    pub target: String,
    pub version: Version,
    /// Header pairs in arrival order; names keep their original case.
    pub headers: Vec<(String, String)>,
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

/// A request delivered by a native listener, together with its response sink.
pub struct NativeExchange {
    pub head: RequestHead,
    pub connection: Arc<dyn NativeConnection>,
    pub body: Body,
    pub response: ResponseSink,
}

impl fmt::Debug for NativeExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeExchange")
            .field("head", &self.head)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// Create a linked sink/source pair. `capacity` bounds buffered body chunks.
pub fn response_channel(capacity: usize) -> (ResponseSink, ResponseSource) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
    (
        ResponseSink {
            head: Some(head_tx),
            body: Some(body_tx),
        },
        ResponseSource {
            head: head_rx,
            body: body_rx,
        },
    )
}

/// Writing half of a response: the head exactly once, then body chunks.
///
/// Dropping the sink ends the body. Dropping it before the head was sent
/// tells the transport that no response was produced.
#[derive(Debug)]
pub struct ResponseSink {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: Option<mpsc::Sender<Bytes>>,
}

impl ResponseSink {
    pub fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.body.is_none()
    }

    pub fn send_head(&mut self, head: ResponseHead) -> Result<(), TransportError> {
        let tx = self
            .head
            .take()
            .ok_or_else(|| TransportError::Protocol("response head already sent".into()))?;
        tx.send(head).map_err(|_| TransportError::ConnectionClosed)
    }

    /// Send one body chunk, waiting while the transport's buffer is full.
    pub async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), TransportError> {
        if !self.head_sent() {
            return Err(TransportError::Protocol(
                "body chunk before response head".into(),
            ));
        }
        let tx = self.body.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(chunk)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// End the response body.
    pub fn finish(&mut self) {
        self.head = None;
        self.body = None;
    }

    /// Send a complete small response without waiting.
    pub fn respond_now(&mut self, head: ResponseHead, body: Bytes) -> Result<(), TransportError> {
        self.send_head(head)?;
        if !body.is_empty() {
            if let Some(tx) = &self.body {
                tx.try_send(body)
                    .map_err(|_| TransportError::ConnectionClosed)?;
            }
        }
        self.finish();
        Ok(())
    }
}

/// Reading half of a response, held by the transport.
#[derive(Debug)]
pub struct ResponseSource {
    pub head: oneshot::Receiver<ResponseHead>,
    pub body: mpsc::Receiver<Bytes>,
}

impl ResponseSource {
    /// Wait for the head and the complete body.
    ///
    /// Returns `None` if the sink was dropped without sending a head.
    pub async fn collect(mut self) -> Option<(ResponseHead, Bytes)> {
        let head = self.head.await.ok()?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.recv().await {
            buf.extend_from_slice(&chunk);
        }
        Some((head, buf.freeze()))
    }
}
