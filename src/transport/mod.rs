//! Native transport boundary.
//!
//! # Data Flow
//! ```text
//! Transport::create_listener()
//!     → NativeListener::listen(options, sink)      (returns immediately)
//!         sink.on_listening(local_addr)            once, on success
//!         sink.on_exchange(NativeExchange)         per request
//!         sink.on_error(TransportError)            listener-level failures
//!     → NativeListener::close(ack)                 ack fires after teardown
//! ```
//!
//! # Design Decisions
//! - Push-style and callback based: the transport owns its accept loop and
//!   never waits on the consumer
//! - A response travels back through a head-then-body channel
//!   (`ResponseSink` → `ResponseSource`), so any transport can consume it
//! - `http1.rs` is the bundled hyper-based implementation

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::TransportError;

pub mod body;
pub mod exchange;
pub mod http1;

pub use body::Body;
pub use exchange::{
    response_channel, NativeExchange, RequestHead, ResponseHead, ResponseSink, ResponseSource,
};
pub use http1::HyperTransport;

/// Socket options for one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    pub addr: SocketAddr,
    /// Accept queue length; `None` uses the platform default.
    pub backlog: Option<u32>,
    /// Restrict an IPv6 listener to IPv6 traffic.
    pub v6_only: bool,
}

/// Receiver of native listener events.
///
/// Callbacks may arrive from several connection tasks at once.
pub trait ListenerSink: Send + Sync {
    /// The listener is accepting connections on `local`.
    fn on_listening(&self, local: SocketAddr);

    /// A request arrived.
    fn on_exchange(&self, exchange: NativeExchange);

    /// The listener failed. Before `on_listening` this means the bind failed.
    fn on_error(&self, error: TransportError);
}

/// A native listener handle.
pub trait NativeListener: Send + Sync {
    /// Start listening. Progress and failures are reported through `sink`.
    fn listen(&self, options: ListenOptions, sink: Arc<dyn ListenerSink>);

    /// Stop accepting and tear the listener down.
    ///
    /// `ack` fires once the listener and its open connections are gone.
    /// Calling `close` more than once is allowed; every call is acknowledged.
    fn close(&self, ack: oneshot::Sender<()>);
}

/// Factory for native listeners.
pub trait Transport: Send + Sync {
    fn create_listener(&self) -> Arc<dyn NativeListener>;
}
