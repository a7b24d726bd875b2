//! Per-session turn management.
//!
//! Events bound to the same session must be applied in arrival order,
//! exactly one at a time, while unrelated sessions never serialize against
//! each other and no OS-level lock is held across a suspension point.
//!
//! # How it works
//!
//! The manager keeps one ticket per session key. [`TurnManager::acquire`]
//! atomically swaps a fresh, not-yet-signaled ticket into the map and hands
//! back a [`Turn`] holding whatever ticket was stored before. The caller
//! awaits the *previous* ticket via [`Turn::wait`] (immediately satisfied
//! when there was none) and signals its own ticket when the `Turn` drops.
//! The result is a chain of single-resolution tickets per key: an async,
//! per-key FIFO mutex.
//!
//! # Release is structural
//!
//! If a turn were ever signaled late, every subsequent event for that
//! session would deadlock permanently. Release therefore happens in `Drop`:
//! success, early `?` return, and panics inside a spawned job body all
//! signal the ticket. There is no code path that leaks a held turn.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::types::SessionId;

/// A single-resolution future: starts unsignaled, is signaled exactly once,
/// and any number of waiters observe the signal.
#[derive(Debug, Default)]
struct Ticket {
    done: AtomicBool,
    notify: Notify,
}

impl Ticket {
    fn signal(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_signaled(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            if self.is_signaled() {
                return;
            }
            // Arm before re-checking so a signal between the check and the
            // await is not lost.
            let notified = self.notify.notified();
            if self.is_signaled() {
                return;
            }
            notified.await;
        }
    }
}

/// The right to execute one session-scoped event, granted in arrival order.
///
/// Await [`Turn::wait`] before touching session state; the turn releases
/// when the value drops.
pub struct Turn {
    previous: Option<Arc<Ticket>>,
    mine: Arc<Ticket>,
}

impl Turn {
    /// Waits until the previous holder for this key has released.
    ///
    /// Returns immediately when this turn is first in line.
    pub async fn wait(&self) {
        if let Some(previous) = &self.previous {
            previous.wait().await;
        }
    }

    /// Releases the turn explicitly.
    ///
    /// Equivalent to dropping it; provided for call sites that want the
    /// release visible before the end of scope.
    pub fn release(self) {}
}

impl Drop for Turn {
    fn drop(&mut self) {
        self.mine.signal();
    }
}

impl fmt::Debug for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Turn")
            .field("has_predecessor", &self.previous.is_some())
            .finish()
    }
}

/// Per-key FIFO ordering of session-scoped events.
#[derive(Debug, Default)]
pub struct TurnManager {
    turns: Mutex<HashMap<SessionId, Arc<Ticket>>>,
}

impl TurnManager {
    pub fn new() -> Self {
        TurnManager::default()
    }

    /// Registers intent to run under `key`, in call order.
    ///
    /// The swap is atomic under the map lock, so concurrent acquisitions
    /// from different sessions never interfere and acquisitions for the
    /// same key form a strict chain.
    pub fn acquire(&self, key: &SessionId) -> Turn {
        let mine = Arc::new(Ticket::default());
        let previous = self.turns.lock().insert(key.clone(), Arc::clone(&mine));
        Turn { previous, mine }
    }

    /// Removes map entries whose ticket is already signaled and has no
    /// outstanding holder, returning how many were removed.
    ///
    /// Advisory cleanup only: a stale signaled entry is harmless to
    /// correctness, it is just memory. Runs as part of each cleanup pass.
    pub fn sweep(&self) -> usize {
        let mut turns = self.turns.lock();
        let before = turns.len();
        turns.retain(|_, ticket| !(ticket.is_signaled() && Arc::strong_count(ticket) == 1));
        before - turns.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.turns.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn key(s: &str) -> SessionId {
        SessionId::new(s)
    }

    // ─── Ordering within a key ───

    #[tokio::test]
    async fn first_turn_proceeds_immediately() {
        let manager = TurnManager::new();
        let turn = manager.acquire(&key("a"));
        tokio::time::timeout(Duration::from_millis(100), turn.wait())
            .await
            .expect("first turn must not wait");
    }

    #[tokio::test]
    async fn second_turn_waits_for_first_release() {
        let manager = TurnManager::new();
        let first = manager.acquire(&key("a"));
        let second = manager.acquire(&key("a"));

        // Second must be blocked while first is held.
        let blocked = tokio::time::timeout(Duration::from_millis(50), second.wait()).await;
        assert!(blocked.is_err(), "second turn ran before first released");

        first.release();

        tokio::time::timeout(Duration::from_secs(1), second.wait())
            .await
            .expect("second turn should run after release");
    }

    #[tokio::test]
    async fn turns_run_in_acquisition_order() {
        let manager = Arc::new(TurnManager::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u32 {
            let turn = manager.acquire(&key("a"));
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                turn.wait().await;
                order.lock().push(i);
                // Turn drops here, releasing to the next in line.
            }));
        }

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("chain should drain")
                .unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    // ─── Independence across keys ───

    #[tokio::test]
    async fn different_keys_never_block_each_other() {
        let manager = TurnManager::new();
        let _held = manager.acquire(&key("slow"));

        let other = manager.acquire(&key("fast"));
        tokio::time::timeout(Duration::from_millis(100), other.wait())
            .await
            .expect("unrelated key must not serialize");
    }

    // ─── Release on every exit path ───

    #[tokio::test]
    async fn turn_released_on_error_path() {
        let manager = TurnManager::new();

        fn failing_op(turn: Turn) -> Result<(), &'static str> {
            let _turn = turn;
            Err("boom")
        }

        let first = manager.acquire(&key("a"));
        assert!(failing_op(first).is_err());

        let second = manager.acquire(&key("a"));
        tokio::time::timeout(Duration::from_secs(1), second.wait())
            .await
            .expect("turn must be released when the holder errors");
    }

    #[tokio::test]
    async fn turn_released_on_panic() {
        let manager = TurnManager::new();
        let first = manager.acquire(&key("a"));

        let panicking = tokio::spawn(async move {
            let _turn = first;
            panic!("handler bug");
        });
        assert!(panicking.await.is_err());

        let second = manager.acquire(&key("a"));
        tokio::time::timeout(Duration::from_secs(1), second.wait())
            .await
            .expect("turn must be released when the holder panics");
    }

    #[tokio::test]
    async fn already_released_predecessor_does_not_block() {
        let manager = TurnManager::new();
        let first = manager.acquire(&key("a"));
        first.release();

        let second = manager.acquire(&key("a"));
        tokio::time::timeout(Duration::from_millis(100), second.wait())
            .await
            .expect("signaled predecessor must not block");
    }

    // ─── Sweep ───

    #[tokio::test]
    async fn sweep_removes_only_settled_entries() {
        let manager = TurnManager::new();

        let done = manager.acquire(&key("done"));
        done.release();

        let _held = manager.acquire(&key("held"));

        assert_eq!(manager.tracked(), 2);
        let removed = manager.sweep();
        assert_eq!(removed, 1);
        assert_eq!(manager.tracked(), 1);

        // Sweeping again removes nothing.
        assert_eq!(manager.sweep(), 0);
    }

    #[tokio::test]
    async fn sweep_keeps_entry_with_waiting_successor() {
        let manager = TurnManager::new();
        let first = manager.acquire(&key("a"));
        let second = manager.acquire(&key("a"));

        // The map holds second's (unsignaled) ticket; nothing to sweep.
        assert_eq!(manager.sweep(), 0);
        assert_eq!(manager.tracked(), 1);

        first.release();
        second.wait().await;
        second.release();

        assert_eq!(manager.sweep(), 1);
        assert_eq!(manager.tracked(), 0);
    }
}
