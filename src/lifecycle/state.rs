//! Server lifecycle state machine.
//!
//! ```text
//! Unbound → Binding → Listening → Closing → Closed
//!              └──────────(bind failed)────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::observability::metrics;

/// Lifecycle state of a server.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unbound = 0,
    Binding = 1,
    Listening = 2,
    Closing = 3,
    Closed = 4,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Unbound => "unbound",
            ServerState::Binding => "binding",
            ServerState::Listening => "listening",
            ServerState::Closing => "closing",
            ServerState::Closed => "closed",
        }
    }

    /// Whether `self → next` is a legal transition.
    fn can_move_to(self, next: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self, next),
            (Unbound, Binding)
                | (Binding, Listening)
                | (Binding, Closed)
                | (Listening, Closing)
                | (Closing, Closed)
        )
    }
}

impl From<u8> for ServerState {
    fn from(val: u8) -> Self {
        match val {
            1 => ServerState::Binding,
            2 => ServerState::Listening,
            3 => ServerState::Closing,
            4 => ServerState::Closed,
            _ => ServerState::Unbound,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a `ServerState`.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ServerState::Unbound as u8))
    }

    pub fn get(&self) -> ServerState {
        self.0.load(Ordering::Acquire).into()
    }

    /// Move from `from` to `to`. Fails with the actual state if the cell is
    /// not in `from` or the transition is not part of the state machine.
    pub fn transition(&self, from: ServerState, to: ServerState) -> Result<(), ServerState> {
        if !from.can_move_to(to) {
            return Err(self.get());
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(ServerState::from)?;
        tracing::debug!(from = %from, to = %to, "Server state changed");
        metrics::record_state(to);
        Ok(())
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
