//! Stampede Guard
//!
//! Serializes loads per key: the first caller to miss becomes the
//! leader and runs the loader; everyone else arriving before the load
//! completes becomes a waiter on the same ticket and observes the one
//! outcome. Tickets are removed the moment the load completes, success
//! or failure, so a failed load is retried fresh on the next call.
//!
//! The key map is sharded under `parking_lot::Mutex`es; no lock is held
//! while a loader executes.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::GUARD_SHARD_COUNT;

/// Outcome of an in-flight load, delivered to the leader and every waiter.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The loader produced a value
    Loaded(Bytes),
    /// The loader reported no canonical record
    NotFound,
    /// The loader itself failed; the reason is carried as text so the
    /// outcome stays cloneable across waiters
    Failed(String),
}

/// Result of acquiring a ticket for a key
#[derive(Debug)]
pub enum Acquired {
    /// This caller is the leader and must run the loader, then call
    /// [`StampedeGuard::complete`]. The receiver observes its own
    /// load's outcome.
    Leader(broadcast::Receiver<LoadOutcome>),
    /// A leader already exists; await the outcome on this receiver
    Waiter(broadcast::Receiver<LoadOutcome>),
}

/// Per-key in-flight load tracking
pub struct StampedeGuard {
    shards: Vec<Mutex<HashMap<String, broadcast::Sender<LoadOutcome>>>>,
}

impl StampedeGuard {
    /// Create a new guard
    pub fn new() -> Self {
        Self {
            shards: (0..GUARD_SHARD_COUNT)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, broadcast::Sender<LoadOutcome>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & (GUARD_SHARD_COUNT - 1)]
    }

    /// Acquire a ticket for a key: leader if none is in flight, waiter
    /// otherwise. Waiters subscribe before the lock is released, so the
    /// eventual broadcast cannot be missed.
    pub fn acquire(&self, key: &str) -> Acquired {
        let mut shard = self.shard_for(key).lock();

        if let Some(sender) = shard.get(key) {
            return Acquired::Waiter(sender.subscribe());
        }

        // Capacity 1: exactly one outcome is ever sent per ticket.
        let (tx, rx) = broadcast::channel(1);
        shard.insert(key.to_string(), tx);
        Acquired::Leader(rx)
    }

    /// Deliver the outcome to every ticket holder and retire the
    /// ticket. Removal happens before the send, so a call racing in
    /// after completion starts a fresh load instead of observing a
    /// stale pending marker.
    pub fn complete(&self, key: &str, outcome: LoadOutcome) {
        let sender = self.shard_for(key).lock().remove(key);
        if let Some(tx) = sender {
            // Send fails only if every receiver was dropped, which just
            // means nobody is left to care.
            let _ = tx.send(outcome);
        }
    }

    /// Number of loads currently in flight
    pub fn in_flight(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
}

/// Retires a ticket no matter how the load task ends.
///
/// The load task holds one of these for the duration of the load; if
/// the task unwinds or is dropped before delivering an outcome, the
/// drop impl completes the ticket as a failure so waiters are released
/// and the next call starts fresh instead of waiting forever.
pub struct CompletionGuard {
    guard: Arc<StampedeGuard>,
    key: Option<String>,
}

impl CompletionGuard {
    /// Arm a guard for the key's in-flight ticket
    pub fn new(guard: Arc<StampedeGuard>, key: String) -> Self {
        Self {
            guard,
            key: Some(key),
        }
    }

    /// Deliver the outcome and disarm the guard
    pub fn finish(mut self, outcome: LoadOutcome) {
        if let Some(key) = self.key.take() {
            self.guard.complete(&key, outcome);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.guard
                .complete(&key, LoadOutcome::Failed("load task ended without an outcome".into()));
        }
    }
}

impl Default for StampedeGuard {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_acquire_is_leader() {
        let guard = StampedeGuard::new();

        assert_matches!(guard.acquire("k"), Acquired::Leader(_));
        assert_eq!(guard.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_second_acquire_is_waiter() {
        let guard = StampedeGuard::new();

        let _leader = guard.acquire("k");
        assert_matches!(guard.acquire("k"), Acquired::Waiter(_));
        assert_eq!(guard.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_leaders() {
        let guard = StampedeGuard::new();

        assert_matches!(guard.acquire("a"), Acquired::Leader(_));
        assert_matches!(guard.acquire("b"), Acquired::Leader(_));
        assert_eq!(guard.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_complete_broadcasts_to_all_waiters() {
        let guard = Arc::new(StampedeGuard::new());

        let Acquired::Leader(mut leader_rx) = guard.acquire("k") else {
            panic!("expected leader");
        };

        let mut waiters = Vec::new();
        for _ in 0..4 {
            match guard.acquire("k") {
                Acquired::Waiter(rx) => waiters.push(rx),
                Acquired::Leader(_) => panic!("expected waiter"),
            }
        }

        guard.complete("k", LoadOutcome::Loaded(Bytes::from_static(b"v")));

        assert_matches!(leader_rx.recv().await.unwrap(), LoadOutcome::Loaded(b) if b.as_ref() == b"v");
        for mut rx in waiters {
            assert_matches!(rx.recv().await.unwrap(), LoadOutcome::Loaded(b) if b.as_ref() == b"v");
        }
    }

    #[tokio::test]
    async fn test_ticket_removed_on_completion() {
        let guard = StampedeGuard::new();

        let _leader = guard.acquire("k");
        guard.complete("k", LoadOutcome::NotFound);
        assert_eq!(guard.in_flight(), 0);

        // Next caller starts a fresh load, it does not observe the old outcome.
        assert_matches!(guard.acquire("k"), Acquired::Leader(_));
    }

    #[tokio::test]
    async fn test_failure_reaches_waiters_and_ticket_is_discarded() {
        let guard = StampedeGuard::new();

        let _leader = guard.acquire("k");
        let Acquired::Waiter(mut rx) = guard.acquire("k") else {
            panic!("expected waiter");
        };

        guard.complete("k", LoadOutcome::Failed("db timeout".into()));

        assert_matches!(rx.recv().await.unwrap(), LoadOutcome::Failed(reason) if reason == "db timeout");
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_completion_guard_finish_delivers_outcome() {
        let guard = Arc::new(StampedeGuard::new());

        let Acquired::Leader(mut rx) = guard.acquire("k") else {
            panic!("expected leader");
        };

        let completion = CompletionGuard::new(Arc::clone(&guard), "k".into());
        completion.finish(LoadOutcome::Loaded(Bytes::from_static(b"v")));

        assert_matches!(rx.recv().await.unwrap(), LoadOutcome::Loaded(b) if b.as_ref() == b"v");
        assert_eq!(guard.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_completion_guard_drop_fails_the_ticket() {
        let guard = Arc::new(StampedeGuard::new());

        let Acquired::Leader(mut rx) = guard.acquire("k") else {
            panic!("expected leader");
        };

        // Dropped without finish, as an unwinding load task would.
        drop(CompletionGuard::new(Arc::clone(&guard), "k".into()));

        assert_matches!(rx.recv().await.unwrap(), LoadOutcome::Failed(_));
        assert_eq!(guard.in_flight(), 0);
        assert_matches!(guard.acquire("k"), Acquired::Leader(_));
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_block_completion() {
        let guard = StampedeGuard::new();

        let _leader = guard.acquire("k");
        let waiter = guard.acquire("k");
        drop(waiter); // caller cancelled

        // Completion proceeds normally for everyone else.
        guard.complete("k", LoadOutcome::Loaded(Bytes::from_static(b"v")));
        assert_eq!(guard.in_flight(), 0);
    }
}
