//! Header storage subsystem.
//!
//! # Data Flow
//! ```text
//! Native raw header pairs
//!     → table.rs (grouped, lower-cased, read-only for requests)
//!     → cookies.rs (lazy cookie extraction)
//!
//! Response headers:
//!     Mutable → finalize() on first flush/close → Finalized
//! ```
//!
//! # Design Decisions
//! - Names are lower-cased on the way in; lookups normalize the query too
//! - Multi-valued headers (e.g. `set-cookie`) keep order and count
//! - Mutation after finalization is a `HeaderImmutableError`, never a no-op

pub mod cookies;
pub mod table;

pub use table::{HeaderMode, HeaderTable};
