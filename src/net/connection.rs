//! Connection metadata and lifecycle tracking.
//!
//! # Responsibilities
//! - Describe the native connection handle (`NativeConnection`)
//! - Snapshot local/remote address and port (`ConnectionInfo`)
//! - Generate unique connection IDs for tracing
//! - Count open connections so listener teardown can wait for them to drain

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The socket side of a native connection handle.
///
/// Addresses are optional because a handle whose socket was already destroyed
/// no longer reports them.
pub trait NativeConnection: Send + Sync + std::fmt::Debug {
    fn remote_addr(&self) -> Option<SocketAddr>;
    fn local_addr(&self) -> Option<SocketAddr>;
    /// Whether the connection is TLS-protected.
    fn is_encrypted(&self) -> bool;
}

/// Plain socket metadata captured when a connection is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketMeta {
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
    pub encrypted: bool,
}

impl NativeConnection for SocketMeta {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

/// Value snapshot of a connection's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub local_port: u16,
    pub remote_address: IpAddr,
    pub remote_port: u16,
}

impl ConnectionInfo {
    /// Read the endpoints from a native handle.
    ///
    /// Returns `None` if the handle no longer knows either endpoint.
    pub fn from_native(conn: &dyn NativeConnection) -> Option<Self> {
        let local = conn.local_addr()?;
        let remote = conn.remote_addr()?;
        Some(Self {
            local_port: local.port(),
            remote_address: remote.ip(),
            remote_port: remote.port(),
        })
    }
}

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks open connections for listener teardown.
///
/// The count lives in a watch channel so `wait_idle` wakes on every change
/// instead of polling.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new open connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|count| *count += 1);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until every tracked connection has closed.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the open count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_info_snapshots_native_handle() {
        let meta = SocketMeta {
            local: Some("127.0.0.1:8080".parse().unwrap()),
            remote: Some("10.0.0.7:51234".parse().unwrap()),
            encrypted: false,
        };
        let info = ConnectionInfo::from_native(&meta).unwrap();
        assert_eq!(info.local_port, 8080);
        assert_eq!(info.remote_address, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(info.remote_port, 51234);
    }

    #[test]
    fn destroyed_socket_has_no_info() {
        let meta = SocketMeta {
            local: Some("127.0.0.1:8080".parse().unwrap()),
            remote: None,
            encrypted: false,
        };
        assert_eq!(ConnectionInfo::from_native(&meta), None);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_last_guard_drops() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("tracker never became idle")
            .unwrap();
    }
}
