//! Shared utilities for integration testing.
//!
//! `MockTransport` is an in-memory push transport: tests decide when a
//! connection "arrives" and get the response the adapter produced for it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{Method, Version};
use ingress_http::error::TransportError;
use ingress_http::net::{AddressResolver, SocketMeta};
use ingress_http::transport::{
    response_channel, Body, ListenOptions, ListenerSink, NativeExchange, NativeListener,
    RequestHead, ResponseSource, Transport,
};
use tokio::sync::oneshot;

/// Port reported when a mock listener is asked for port 0.
pub const EPHEMERAL_PORT: u16 = 49152;

#[derive(Clone, Default)]
pub struct MockTransport {
    listeners: Arc<Mutex<Vec<Arc<MockListener>>>>,
    bind_failure: Arc<Mutex<Option<TransportError>>>,
    hold_close: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listeners report `error` instead of listening.
    pub fn failing(error: TransportError) -> Self {
        let transport = Self::default();
        *transport.bind_failure.lock().unwrap() = Some(error);
        transport
    }

    /// Listeners keep close acknowledgements until `release_close`.
    pub fn holding_close() -> Self {
        Self {
            hold_close: true,
            ..Self::default()
        }
    }

    pub fn listeners_created(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// The most recently created listener.
    pub fn listener(&self) -> Arc<MockListener> {
        self.listeners
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no listener created")
    }
}

impl Transport for MockTransport {
    fn create_listener(&self) -> Arc<dyn NativeListener> {
        let listener = Arc::new(MockListener {
            sink: Mutex::new(None),
            options: Mutex::new(None),
            failure: self.bind_failure.lock().unwrap().clone(),
            hold_close: self.hold_close,
            held_acks: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        self.listeners.lock().unwrap().push(Arc::clone(&listener));
        listener
    }
}

pub struct MockListener {
    sink: Mutex<Option<Arc<dyn ListenerSink>>>,
    options: Mutex<Option<ListenOptions>>,
    failure: Option<TransportError>,
    hold_close: bool,
    held_acks: Mutex<Vec<oneshot::Sender<()>>>,
    closes: AtomicUsize,
}

impl MockListener {
    /// Deliver a connection. `None` if the listener no longer accepts.
    pub fn arrive(&self, target: &str, headers: &[(&str, &str)]) -> Option<ResponseSource> {
        self.arrive_with(Method::GET, target, headers, Body::empty())
    }

    pub fn arrive_with(
        &self,
        method: Method,
        target: &str,
        headers: &[(&str, &str)],
        body: Body,
    ) -> Option<ResponseSource> {
        let sink = self.sink.lock().unwrap().clone()?;
        let (response, source) = response_channel(8);
        sink.on_exchange(NativeExchange {
            head: RequestHead {
                method,
                target: target.to_string(),
                version: Version::HTTP_11,
                headers: headers
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
            },
            connection: Arc::new(SocketMeta {
                local: self.local_addr(),
                remote: Some("192.0.2.10:51000".parse().unwrap()),
                encrypted: false,
            }),
            body,
            response,
        });
        Some(source)
    }

    /// Report a listener-level error.
    pub fn fail(&self, error: TransportError) {
        if let Some(sink) = self.sink.lock().unwrap().clone() {
            sink.on_error(error);
        }
    }

    pub fn listen_options(&self) -> Option<ListenOptions> {
        *self.options.lock().unwrap()
    }

    pub fn is_accepting(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn release_close(&self) {
        for ack in self.held_acks.lock().unwrap().drain(..) {
            let _ = ack.send(());
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        let options = self.options.lock().unwrap();
        options.as_ref().map(|o| {
            let port = if o.addr.port() == 0 {
                EPHEMERAL_PORT
            } else {
                o.addr.port()
            };
            SocketAddr::new(o.addr.ip(), port)
        })
    }
}

impl NativeListener for MockListener {
    fn listen(&self, options: ListenOptions, sink: Arc<dyn ListenerSink>) {
        *self.options.lock().unwrap() = Some(options);
        if let Some(error) = self.failure.clone() {
            sink.on_error(error);
            return;
        }
        *self.sink.lock().unwrap() = Some(Arc::clone(&sink));
        if let Some(local) = self.local_addr() {
            sink.on_listening(local);
        }
    }

    fn close(&self, ack: oneshot::Sender<()>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().unwrap().take();
        if self.hold_close {
            self.held_acks.lock().unwrap().push(ack);
        } else {
            let _ = ack.send(());
        }
    }
}

/// Resolver backed by a fixed table.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn with(mut self, host: &str, addrs: &[&str]) -> Self {
        self.entries.insert(
            host.to_string(),
            addrs.iter().map(|a| a.parse().unwrap()).collect(),
        );
        self
    }
}

impl AddressResolver for StaticResolver {
    fn lookup(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        let result = self.entries.get(host).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}"))
        });
        Box::pin(async move { result })
    }
}

/// HTTP client without pooling, so closed servers are observed immediately.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Wait until `check` holds, yielding to the runtime in between.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
