//! Consumer readiness signal.
//!
//! The only state shared between the consumer and the native event side.
//! Only `Flowing` admits new arrivals.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// Nobody has subscribed yet.
    Detached = 0,
    Flowing = 1,
    Paused = 2,
    /// The subscription ended; terminal.
    Cancelled = 3,
}

impl Demand {
    /// Label used for rejection metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Demand::Detached => "detached",
            Demand::Flowing => "flowing",
            Demand::Paused => "paused",
            Demand::Cancelled => "cancelled",
        }
    }
}

impl From<u8> for Demand {
    fn from(val: u8) -> Self {
        match val {
            1 => Demand::Flowing,
            2 => Demand::Paused,
            3 => Demand::Cancelled,
            _ => Demand::Detached,
        }
    }
}

#[derive(Debug)]
pub struct DemandSignal(AtomicU8);

impl DemandSignal {
    pub fn new() -> Self {
        Self(AtomicU8::new(Demand::Detached as u8))
    }

    pub fn current(&self) -> Demand {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn admits(&self) -> bool {
        self.current() == Demand::Flowing
    }

    /// `Detached → Flowing`. Returns false if already subscribed or cancelled.
    pub fn subscribe(&self) -> bool {
        self.swap(Demand::Detached, Demand::Flowing)
    }

    /// `Flowing → Paused`.
    pub fn pause(&self) -> bool {
        self.swap(Demand::Flowing, Demand::Paused)
    }

    /// `Paused → Flowing`.
    pub fn resume(&self) -> bool {
        self.swap(Demand::Paused, Demand::Flowing)
    }

    /// Any state → `Cancelled`. Returns the previous state.
    pub fn cancel(&self) -> Demand {
        self.0.swap(Demand::Cancelled as u8, Ordering::AcqRel).into()
    }

    fn swap(&self, from: Demand, to: Demand) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for DemandSignal {
    fn default() -> Self {
        Self::new()
    }
}
