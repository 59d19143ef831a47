//! Server lifecycle: bind, subscribe, close.
//!
//! # Responsibilities
//! - Validate bind options and resolve the bind address
//! - Drive `Unbound → Binding → Listening` from native listener events
//! - Hand out the single request stream
//! - Close gracefully: stop admitting, tear down the listener, wait for the ack
//!
//! # Design Decisions
//! - Unsupported options (`shared`, `force`) fail before any native call
//! - A failed bind ends in `Closed`; the server value is never produced
//! - Dropping a `Server` does not close it. The native listener stops once
//!   the server and its request stream are both gone

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::state::{ServerState, StateCell};
use crate::config::schema::{ListenerConfig, ServerConfig};
use crate::error::{BindError, CloseError, SubscribeError, UnsupportedOperation};
use crate::http::UriResolver;
use crate::ingress::{IngressBridge, RequestStream, DEFAULT_QUEUE_CAPACITY};
use crate::net::resolver::resolve_bind_address;
use crate::net::{AddressResolver, SystemResolver};
use crate::transport::{HyperTransport, ListenOptions, NativeListener, Transport};

/// Listener options for a bind call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    /// Pending-connection queue length. `None` uses the transport default.
    pub backlog: Option<u32>,
    /// For IPv6 addresses, refuse IPv4-mapped connections.
    pub v6_only: bool,
    /// Not supported; binding with `shared = true` always fails.
    pub shared: bool,
}

impl From<&ListenerConfig> for BindOptions {
    fn from(config: &ListenerConfig) -> Self {
        Self {
            backlog: config.backlog,
            v6_only: config.v6_only,
            shared: config.shared,
        }
    }
}

/// Creates servers on a given transport.
#[derive(Clone)]
pub struct Binder {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn AddressResolver>,
    uri_resolver: UriResolver,
    queue_capacity: usize,
}

impl Binder {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            resolver: Arc::new(SystemResolver),
            uri_resolver: UriResolver::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Replace the resolver used for non-literal bind addresses.
    pub fn with_resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Whether requests of bound servers honor `x-forwarded-*` headers.
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.uri_resolver = UriResolver::new(trust);
        self
    }

    /// How many admitted requests may wait for the consumer before arrivals
    /// are rejected with 503.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// A hyper-backed binder configured from `config.ingress`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(HyperTransport::new(config.ingress.response_buffer))
            .trust_forwarded_headers(config.ingress.trust_forwarded_headers)
            .queue_capacity(config.ingress.queue_capacity)
    }

    pub async fn bind_config(&self, config: &ListenerConfig) -> Result<Server, BindError> {
        self.bind(&config.address, config.port, config.into()).await
    }

    /// Bind a listener and wait until it is accepting connections.
    pub async fn bind(
        &self,
        address: &str,
        port: u16,
        options: BindOptions,
    ) -> Result<Server, BindError> {
        if options.shared {
            return Err(UnsupportedOperation::SharedBinding.into());
        }

        let state = StateCell::new();
        // A fresh cell is always Unbound.
        let _ = state.transition(ServerState::Unbound, ServerState::Binding);

        let ip = match resolve_bind_address(self.resolver.as_ref(), address).await {
            Ok(ip) => ip,
            Err(e) => {
                let _ = state.transition(ServerState::Binding, ServerState::Closed);
                return Err(e);
            }
        };

        let listener = self.transport.create_listener();
        let (bridge, bound) = IngressBridge::new(self.uri_resolver, self.queue_capacity);
        listener.listen(
            ListenOptions {
                addr: SocketAddr::new(ip, port),
                backlog: options.backlog,
                v6_only: options.v6_only,
            },
            bridge.clone(),
        );

        let failure = match bound.await {
            Ok(Ok(local_addr)) => {
                let _ = state.transition(ServerState::Binding, ServerState::Listening);
                tracing::info!(address = %local_addr, requested = %address, "Server listening");
                return Ok(Server {
                    local_addr,
                    state,
                    listener,
                    bridge,
                });
            }
            Ok(Err(e)) => BindError::Listen(e),
            Err(_) => BindError::Aborted,
        };

        tracing::warn!(address = %address, port, error = %failure, "Bind failed");
        bridge.end();
        let (ack, _) = oneshot::channel();
        listener.close(ack);
        let _ = state.transition(ServerState::Binding, ServerState::Closed);
        Err(failure)
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("uri_resolver", &self.uri_resolver)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

/// A bound server.
pub struct Server {
    local_addr: SocketAddr,
    state: StateCell,
    listener: Arc<dyn NativeListener>,
    bridge: Arc<IngressBridge>,
}

impl Server {
    /// Subscribe to incoming requests. Only one subscription is allowed.
    pub fn requests(&self) -> Result<RequestStream, SubscribeError> {
        match self.state.get() {
            state @ (ServerState::Closing | ServerState::Closed) => {
                Err(SubscribeError::Closed(state))
            }
            _ => self.bridge.subscribe(Arc::clone(&self.listener)),
        }
    }

    /// Stop accepting, tear down the listener and wait for in-flight
    /// connections to finish.
    ///
    /// `force = true` is not supported. Closing a closed server is a no-op.
    pub async fn close(&self, force: bool) -> Result<(), CloseError> {
        if force {
            return Err(UnsupportedOperation::ForcedClose.into());
        }

        match self.state.transition(ServerState::Listening, ServerState::Closing) {
            Ok(()) => {}
            Err(ServerState::Closing) => return Err(CloseError::InProgress),
            Err(_) => return Ok(()),
        }

        tracing::info!(address = %self.local_addr, "Closing server");
        self.bridge.end();

        let (ack, done) = oneshot::channel();
        self.listener.close(ack);
        if done.await.is_err() {
            tracing::debug!(address = %self.local_addr, "Listener dropped its close acknowledgement");
        }

        let _ = self.state.transition(ServerState::Closing, ServerState::Closed);
        tracing::info!(address = %self.local_addr, "Server closed");
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    pub fn address(&self) -> IpAddr {
        self.local_addr.ip()
    }

    /// Actual bound port, also when bound to port 0.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state.get())
            .field("demand", &self.bridge.demand())
            .finish()
    }
}
