//! Ingress subsystem: native listener events to a pull-based request stream.
//!
//! # Data Flow
//! ```text
//! NativeListener
//!     → bridge.rs (ListenerSink: admit or reject at the edge)
//!         → demand == Flowing  → bounded queue → stream.rs (RequestStream)
//!         → otherwise, or full → 503 Service Unavailable, never queued
//!
//! Consumer
//!     → stream.rs pause/resume/cancel
//!     → demand.rs (shared readiness signal)
//! ```
//!
//! # Design Decisions
//! - Admission is decided once, on arrival, from the current demand
//! - The native side never waits on the consumer
//! - Pause and the admission check share the sender lock
//! - Before subscription only the first listener error is held
//! - Listener errors are stream items, not stream termination

pub mod bridge;
pub mod demand;
pub mod stream;

pub use bridge::{IngressBridge, DEFAULT_QUEUE_CAPACITY};
pub use demand::Demand;
pub use stream::RequestStream;
