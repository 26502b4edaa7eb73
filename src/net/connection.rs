//! Session identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Track running sessions so shutdown can drain them
//! - Keep the active-sessions gauge current

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

/// Global atomic counter for session IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one client connection and its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    total: AtomicU64,
    idle: Notify,
}

/// Tracks running sessions for graceful shutdown and the admin API.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    counters: Arc<Counters>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. Returns a guard that decrements on drop.
    pub fn track(&self) -> SessionGuard {
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        metrics::set_active_sessions(active);
        SessionGuard {
            counters: Arc::clone(&self.counters),
            id: SessionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Sessions started since the tracker was created.
    pub fn total_count(&self) -> u64 {
        self.counters.total.load(Ordering::Relaxed)
    }

    /// Wait until no session is running. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.counters.idle.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

/// Guard that tracks a session's lifetime.
/// Decrements the active count when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    counters: Arc<Counters>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let remaining = self.counters.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_sessions(remaining);
        if remaining == 0 {
            self.counters.idle.notify_waiters();
        }
        tracing::trace!(session_id = %self.id, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("sess-"));
    }

    #[test]
    fn tracker_counts() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.total_count(), 2);
    }

    #[tokio::test]
    async fn wait_idle_returns_when_drained() {
        let tracker = SessionTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_idle_times_out() {
        let tracker = SessionTracker::new();
        let _guard = tracker.track();
        assert!(!tracker.wait_idle(Duration::from_millis(20)).await);
    }
}
