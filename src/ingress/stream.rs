//! The consumer's view of incoming requests.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};

use super::bridge::{reject, IngressBridge, StreamItem};
use super::demand::Demand;
use crate::error::TransportError;
use crate::http::HttpRequest;
use crate::transport::NativeListener;

/// Pull-based stream of admitted requests.
///
/// While paused, or while the bounded queue is full, new arrivals are
/// answered with 503 and never queued. Requests admitted before the pause
/// are still yielded. Listener errors
/// arrive as `Err` items and do not end the stream. The stream ends after
/// the server closes and everything already admitted has been yielded.
///
/// Cancelling (or dropping) the stream stops the native listener.
pub struct RequestStream {
    rx: mpsc::Receiver<StreamItem>,
    bridge: Arc<IngressBridge>,
    listener: Arc<dyn NativeListener>,
    cancelled: bool,
}

impl RequestStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<StreamItem>,
        bridge: Arc<IngressBridge>,
        listener: Arc<dyn NativeListener>,
    ) -> Self {
        Self {
            rx,
            bridge,
            listener,
            cancelled: false,
        }
    }

    /// Stop admitting new requests. Returns false if not currently flowing.
    ///
    /// An arrival racing with the pause is either queued before this returns
    /// or rejected.
    pub fn pause(&self) -> bool {
        let paused = self.bridge.pause();
        if paused {
            tracing::debug!("Request stream paused");
        }
        paused
    }

    /// Admit new requests again. Returns false if not currently paused.
    pub fn resume(&self) -> bool {
        let resumed = self.bridge.resume();
        if resumed {
            tracing::debug!("Request stream resumed");
        }
        resumed
    }

    pub fn is_paused(&self) -> bool {
        self.bridge.demand() == Demand::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// End the subscription and stop the native listener.
    ///
    /// Admitted requests not yet taken from the stream are answered with 503.
    /// Requests already yielded keep their connections.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.bridge.end();
        self.rx.close();

        let mut drained = 0usize;
        while let Ok(item) = self.rx.try_recv() {
            if let Ok(request) = item {
                reject(request.into_response().into_sink(), "cancelled");
                drained += 1;
            }
        }
        tracing::debug!(drained, "Request stream cancelled");

        // Nobody waits for the acknowledgement.
        let (ack, _) = oneshot::channel();
        self.listener.close(ack);
    }
}

impl Stream for RequestStream {
    type Item = Result<HttpRequest, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for RequestStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for RequestStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStream")
            .field("demand", &self.bridge.demand())
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}
