//! Lazy request body.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::{BodyError, TransportError};

/// Request body as a lazy byte stream.
///
/// Nothing is read from the connection until the stream is polled.
pub struct Body {
    inner: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Collect the whole body, failing once it grows past `limit` bytes.
    pub async fn to_bytes(mut self, limit: usize) -> Result<Bytes, BodyError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > limit {
                return Err(BodyError::TooLarge { limit });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_stream(stream::once(async move { Ok(bytes) }))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl Stream for Body {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> Body {
        let items: Vec<Result<Bytes, TransportError>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Body::from_stream(stream::iter(items))
    }

    #[tokio::test]
    async fn collects_all_chunks() {
        let body = chunks(&["hello, ", "world"]);
        assert_eq!(body.to_bytes(64).await.unwrap(), "hello, world");
    }

    #[tokio::test]
    async fn enforces_limit() {
        let body = chunks(&["12345", "67890"]);
        assert!(matches!(
            body.to_bytes(8).await,
            Err(BodyError::TooLarge { limit: 8 })
        ));
    }

    #[tokio::test]
    async fn propagates_transport_errors() {
        let items = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::ConnectionClosed),
        ];
        let body = Body::from_stream(stream::iter(items));
        assert!(matches!(
            body.to_bytes(1024).await,
            Err(BodyError::Transport(TransportError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn empty_body_is_empty() {
        assert!(Body::empty().to_bytes(0).await.unwrap().is_empty());
    }
}
