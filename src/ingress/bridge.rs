//! Native event sink that feeds the request stream.
//!
//! # Responsibilities
//! - Complete or fail the pending bind on the first listener event
//! - Admit arrivals only while the consumer's demand is `Flowing` and the queue has room
//! - Answer every other arrival with a fixed 503 at the edge
//! - Forward listener errors to the stream without ending it

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::StatusCode;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::demand::{Demand, DemandSignal};
use super::stream::RequestStream;
use crate::error::{SubscribeError, TransportError};
use crate::http::{HttpRequest, UriResolver};
use crate::lifecycle::ServerState;
use crate::observability::metrics;
use crate::transport::{ListenerSink, NativeExchange, NativeListener, ResponseHead, ResponseSink};

pub(crate) type StreamItem = Result<HttpRequest, TransportError>;
pub(crate) type BindResult = Result<SocketAddr, TransportError>;

/// Default number of admitted requests waiting for the consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

const SERVICE_UNAVAILABLE_BODY: &[u8] = b"Service Unavailable";

/// Head of the response sent to rejected arrivals.
pub fn service_unavailable_head() -> ResponseHead {
    ResponseHead {
        status: StatusCode::SERVICE_UNAVAILABLE,
        reason: "Service Unavailable".to_string(),
        headers: vec![
            ("content-type".to_string(), "text/plain; charset=utf-8".to_string()),
            (
                "content-length".to_string(),
                SERVICE_UNAVAILABLE_BODY.len().to_string(),
            ),
            ("connection".to_string(), "close".to_string()),
        ],
    }
}

/// Answer an arrival with 503 without waiting.
pub(crate) fn reject(mut sink: ResponseSink, reason: &'static str) {
    metrics::record_rejected(reason);
    if let Err(e) = sink.respond_now(
        service_unavailable_head(),
        Bytes::from_static(SERVICE_UNAVAILABLE_BODY),
    ) {
        tracing::debug!(error = %e, "Rejected peer already gone");
    }
}

/// Bridges push-style listener events into a pull-based `RequestStream`.
///
/// Admitted requests wait in a bounded queue. A full queue rejects like a
/// paused consumer does. Demand changes and hand-offs are serialized by the
/// sender lock, so an arrival is admitted only if no pause completed before
/// its hand-off.
pub struct IngressBridge {
    pub(crate) demand: DemandSignal,
    uri_resolver: UriResolver,
    tx: Mutex<Option<mpsc::Sender<StreamItem>>>,
    rx: Mutex<Option<mpsc::Receiver<StreamItem>>>,
    pending_bind: Mutex<Option<oneshot::Sender<BindResult>>>,
    error_held: AtomicBool,
}

impl IngressBridge {
    /// Create a bridge and the receiver of its pending bind result.
    ///
    /// `queue_capacity` bounds admitted requests the consumer has not taken yet.
    pub fn new(
        uri_resolver: UriResolver,
        queue_capacity: usize,
    ) -> (Arc<Self>, oneshot::Receiver<BindResult>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (bind_tx, bind_rx) = oneshot::channel();
        let bridge = Arc::new(Self {
            demand: DemandSignal::new(),
            uri_resolver,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            pending_bind: Mutex::new(Some(bind_tx)),
            error_held: AtomicBool::new(false),
        });
        (bridge, bind_rx)
    }

    /// Attach the single consumer. Arrivals are admitted from now on.
    pub fn subscribe(
        self: &Arc<Self>,
        listener: Arc<dyn NativeListener>,
    ) -> Result<RequestStream, SubscribeError> {
        let rx = lock(&self.rx)
            .take()
            .ok_or(SubscribeError::AlreadySubscribed)?;
        let subscribed = {
            let _tx = lock(&self.tx);
            self.demand.subscribe()
        };
        if !subscribed {
            return Err(SubscribeError::Closed(ServerState::Closed));
        }
        tracing::debug!("Request stream subscribed");
        Ok(RequestStream::new(rx, Arc::clone(self), listener))
    }

    pub fn demand(&self) -> Demand {
        self.demand.current()
    }

    /// `Flowing → Paused`. Once this returns, no further arrival is admitted.
    pub(crate) fn pause(&self) -> bool {
        let _tx = lock(&self.tx);
        self.demand.pause()
    }

    /// `Paused → Flowing`.
    pub(crate) fn resume(&self) -> bool {
        let _tx = lock(&self.tx);
        self.demand.resume()
    }

    /// Stop admitting and end the stream once queued items are consumed.
    pub fn end(&self) {
        let previous = {
            let mut tx = lock(&self.tx);
            tx.take();
            self.demand.cancel()
        };
        if previous != Demand::Cancelled {
            tracing::debug!(previous = previous.as_str(), "Request stream ended");
        }
    }
}

impl ListenerSink for IngressBridge {
    fn on_listening(&self, local: SocketAddr) {
        if let Some(pending) = lock(&self.pending_bind).take() {
            let _ = pending.send(Ok(local));
        }
    }

    fn on_exchange(&self, exchange: NativeExchange) {
        let method = exchange.head.method.clone();
        let target = exchange.head.target.clone();

        // Demand check and hand-off happen under the sender lock; the 503 is sent after it.
        let (sink, reason) = {
            let tx = lock(&self.tx);
            let demand = self.demand.current();
            match tx.as_ref() {
                Some(tx) if demand == Demand::Flowing => {
                    let request = HttpRequest::from_exchange(exchange, self.uri_resolver);
                    let request_id = request.id();
                    match tx.try_send(Ok(request)) {
                        Ok(()) => {
                            metrics::record_admitted();
                            tracing::debug!(request_id = %request_id, "Request admitted");
                            return;
                        }
                        Err(TrySendError::Full(item)) => (refused_sink(item), "queue_full"),
                        Err(TrySendError::Closed(item)) => (refused_sink(item), "consumer_gone"),
                    }
                }
                _ => (Some(exchange.response), demand.as_str()),
            }
        };

        tracing::debug!(
            method = %method,
            target = %target,
            reason,
            "Consumer not ready, rejecting request"
        );
        if let Some(sink) = sink {
            reject(sink, reason);
        }
    }

    fn on_error(&self, error: TransportError) {
        metrics::record_listener_error();
        tracing::warn!(error = %error, "Listener error");
        if let Some(pending) = lock(&self.pending_bind).take() {
            let _ = pending.send(Err(error.clone()));
        }

        let tx = lock(&self.tx);
        let Some(tx) = tx.as_ref() else {
            return;
        };
        // Without a subscriber only the first error is held.
        let detached = self.demand.current() == Demand::Detached;
        if detached && self.error_held.swap(true, Ordering::AcqRel) {
            tracing::debug!(error = %error, "Listener error dropped, one already held");
            return;
        }
        if let Err(e) = tx.try_send(Err(error)) {
            tracing::debug!(error = %e, "Listener error dropped, queue full");
        }
    }
}

fn refused_sink(item: StreamItem) -> Option<ResponseSink> {
    item.ok().map(|request| request.into_response().into_sink())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::SocketMeta;
    use crate::transport::{response_channel, Body, RequestHead, ResponseSource};
    use futures_util::{FutureExt, StreamExt};
    use http::{Method, Version};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        closes: AtomicUsize,
    }

    impl NativeListener for CountingListener {
        fn listen(&self, _options: crate::transport::ListenOptions, _sink: Arc<dyn ListenerSink>) {}

        fn close(&self, ack: oneshot::Sender<()>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let _ = ack.send(());
        }
    }

    fn arrival(target: &str) -> (NativeExchange, ResponseSource) {
        let (sink, source) = response_channel(4);
        let exchange = NativeExchange {
            head: RequestHead {
                method: Method::GET,
                target: target.to_string(),
                version: Version::HTTP_11,
                headers: vec![("host".into(), "localhost".into())],
            },
            connection: Arc::new(SocketMeta {
                local: Some("127.0.0.1:8080".parse().unwrap()),
                remote: Some("127.0.0.1:40000".parse().unwrap()),
                encrypted: false,
            }),
            body: Body::empty(),
            response: sink,
        };
        (exchange, source)
    }

    async fn assert_rejected(source: ResponseSource) {
        let (head, body) = source.collect().await.expect("no response");
        assert_eq!(head.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "Service Unavailable");
    }

    #[tokio::test]
    async fn arrivals_before_subscription_are_rejected() {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        let (exchange, source) = arrival("/early");
        bridge.on_exchange(exchange);
        assert_rejected(source).await;

        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn second_subscription_fails() {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        let listener: Arc<dyn NativeListener> = Arc::new(CountingListener::default());
        let _stream = bridge.subscribe(Arc::clone(&listener)).unwrap();
        assert_eq!(
            bridge.subscribe(listener).err(),
            Some(SubscribeError::AlreadySubscribed)
        );
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Arrive,
        Pause,
        Resume,
    }

    fn sequences(len: usize) -> Vec<Vec<Op>> {
        let mut out = vec![Vec::new()];
        for _ in 0..len {
            out = out
                .into_iter()
                .flat_map(|seq| {
                    [Op::Arrive, Op::Pause, Op::Resume].into_iter().map(move |op| {
                        let mut next = seq.clone();
                        next.push(op);
                        next
                    })
                })
                .collect();
        }
        out
    }

    #[tokio::test]
    async fn every_interleaving_admits_exactly_the_flowing_arrivals() {
        // Hundreds of `now_or_never` polls in one task would exhaust the coop budget.
        tokio::task::unconstrained(async {
            for len in 1..=5 {
                for ops in sequences(len) {
                    check_interleaving(&ops).await;
                }
            }
        })
        .await;
    }

    async fn check_interleaving(ops: &[Op]) {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();

        let mut paused = false;
        let mut admitted = Vec::new();
        let mut rejected = Vec::new();

        for (i, op) in ops.iter().enumerate() {
            match op {
                Op::Pause => {
                    stream.pause();
                    paused = true;
                }
                Op::Resume => {
                    stream.resume();
                    paused = false;
                }
                Op::Arrive => {
                    let target = format!("/{i}");
                    let (exchange, source) = arrival(&target);
                    bridge.on_exchange(exchange);
                    if paused {
                        rejected.push(source);
                    } else {
                        admitted.push(target);
                    }
                }
            }
        }

        for source in rejected {
            assert_rejected(source).await;
        }
        for target in admitted {
            let request = stream
                .next()
                .now_or_never()
                .flatten()
                .unwrap_or_else(|| panic!("{ops:?}: {target} missing"))
                .unwrap();
            assert_eq!(request.target(), target, "{ops:?}");
        }
        assert!(stream.next().now_or_never().is_none(), "{ops:?}: extra request");
    }

    #[tokio::test]
    async fn full_queue_rejects_next_arrival() {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), 2);
        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();

        let (first, _first) = arrival("/1");
        let (second, _second) = arrival("/2");
        let (third, third_source) = arrival("/3");
        bridge.on_exchange(first);
        bridge.on_exchange(second);
        bridge.on_exchange(third);
        assert_rejected(third_source).await;

        let request = stream.next().await.unwrap().unwrap();
        assert_eq!(request.target(), "/1");

        // Draining one slot admits the next arrival again.
        let (fourth, _fourth) = arrival("/4");
        bridge.on_exchange(fourth);
        assert_eq!(stream.next().await.unwrap().unwrap().target(), "/2");
        assert_eq!(stream.next().await.unwrap().unwrap().target(), "/4");
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn only_first_error_before_subscription_is_held() {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        for i in 0..100 {
            bridge.on_error(TransportError::Protocol(format!("accept failed {i}")));
        }

        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();
        match stream.next().now_or_never().flatten() {
            Some(Err(TransportError::Protocol(message))) => assert_eq!(message, "accept failed 0"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(stream.next().now_or_never().is_none());

        // Subscribed consumers see every error again.
        bridge.on_error(TransportError::ConnectionClosed);
        bridge.on_error(TransportError::ConnectionClosed);
        assert!(matches!(stream.next().await, Some(Err(TransportError::ConnectionClosed))));
        assert!(matches!(stream.next().await, Some(Err(TransportError::ConnectionClosed))));
    }

    #[tokio::test]
    async fn errors_are_dropped_while_queue_is_full() {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), 1);
        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();

        let (exchange, _source) = arrival("/kept");
        bridge.on_exchange(exchange);
        bridge.on_error(TransportError::ConnectionClosed);

        assert_eq!(stream.next().await.unwrap().unwrap().target(), "/kept");
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn no_arrival_is_admitted_after_pause_returns() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 200;

        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), THREADS * PER_THREAD);
        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();
        let arrived = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let bridge = Arc::clone(&bridge);
                let arrived = Arc::clone(&arrived);
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|i| {
                            let (exchange, source) = arrival(&format!("/{t}/{i}"));
                            bridge.on_exchange(exchange);
                            arrived.fetch_add(1, Ordering::SeqCst);
                            source
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        while arrived.load(Ordering::SeqCst) < THREADS * PER_THREAD / 4 {
            std::thread::yield_now();
        }
        assert!(bridge.pause());

        tokio::task::unconstrained(async {
            let mut before_pause = 0;
            while let Some(Some(item)) = stream.next().now_or_never() {
                item.unwrap();
                before_pause += 1;
            }

            let sources: Vec<_> = workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect();
            assert!(
                stream.next().now_or_never().is_none(),
                "request admitted after pause"
            );

            let mut rejected = 0;
            for source in sources {
                // Admitted requests were dropped above, so they carry no response.
                if let Some((head, _)) = source.collect().await {
                    assert_eq!(head.status, StatusCode::SERVICE_UNAVAILABLE);
                    rejected += 1;
                }
            }
            assert_eq!(before_pause + rejected, THREADS * PER_THREAD);
        })
        .await;
    }

    #[tokio::test]
    async fn listener_error_fails_pending_bind_and_reaches_stream() {
        let (bridge, bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        bridge.on_error(TransportError::Protocol("boom".into()));
        assert!(matches!(bind.await, Ok(Err(TransportError::Protocol(_)))));

        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();
        let item = stream.next().now_or_never().flatten().unwrap();
        assert!(item.is_err());

        // The stream keeps flowing after an error.
        let (exchange, _source) = arrival("/after");
        bridge.on_exchange(exchange);
        let request = stream.next().now_or_never().flatten().unwrap().unwrap();
        assert_eq!(request.target(), "/after");
    }

    #[tokio::test]
    async fn listening_completes_pending_bind_once() {
        let (bridge, bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        bridge.on_listening(addr);
        bridge.on_listening("127.0.0.1:1".parse().unwrap());
        assert_eq!(bind.await.unwrap().unwrap(), addr);
    }

    #[tokio::test]
    async fn ended_bridge_rejects_and_finishes_stream() {
        let (bridge, _bind) = IngressBridge::new(UriResolver::default(), DEFAULT_QUEUE_CAPACITY);
        let mut stream = bridge
            .subscribe(Arc::new(CountingListener::default()))
            .unwrap();

        let (exchange, _source) = arrival("/queued");
        bridge.on_exchange(exchange);
        bridge.end();

        let (late, late_source) = arrival("/late");
        bridge.on_exchange(late);
        assert_rejected(late_source).await;

        let queued = stream.next().await.unwrap().unwrap();
        assert_eq!(queued.target(), "/queued");
        assert!(stream.next().await.is_none());
    }
}
