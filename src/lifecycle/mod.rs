//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Bind (server.rs):
//!     Check options → Resolve address → Native listen → Listening
//!
//! Close (server.rs):
//!     Stop admitting → Native close → Drain connections → Closed
//!
//! Listener teardown (shutdown.rs):
//!     Trigger → Accept loop stops → Connections shut down gracefully
//! ```
//!
//! # Design Decisions
//! - State lives in an atomic (state.rs), so accessors never block
//! - Forced close is refused, not approximated

pub mod server;
pub mod shutdown;
pub mod state;

pub use server::{BindOptions, Binder, Server};
pub use shutdown::Shutdown;
pub use state::ServerState;
