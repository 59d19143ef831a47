//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Bind request (host name or IP literal)
//!     → resolver.rs (first resolved candidate)
//!     → listener.rs (socket2 bind: backlog, v6-only)
//!     → connection.rs (socket metadata, open-connection tracking)
//!     → Hand off to the transport
//! ```
//!
//! # Design Decisions
//! - Name resolution is a pluggable collaborator, not hard-wired DNS
//! - Connection info is a value snapshot, never a live view of the socket
//! - Each connection is tracked so listener teardown can drain in-flight work

pub mod connection;
pub mod listener;
pub mod resolver;

pub use connection::{ConnectionInfo, NativeConnection, SocketMeta};
pub use resolver::{AddressResolver, SystemResolver};
