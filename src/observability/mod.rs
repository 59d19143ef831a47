//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle, bridge, and response code produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters through the `metrics` facade)
//!
//! Consumers:
//!     → tracing subscriber installed by `logging::init`
//!     → any metrics recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (request ID, address, state)
//! - Metrics are no-ops until a recorder is installed
//! - Subscriber setup is opt-in; a library never installs one implicitly

pub mod logging;
pub mod metrics;
