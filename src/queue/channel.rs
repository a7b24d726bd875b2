//! Two-tier priority channel for job dispatch.
//!
//! Jobs are ordered by priority (High before Normal), then FIFO within the
//! same priority level. High items preempt any backlog of Normal items: a
//! reader never sees a Normal item while a High item is enqueued. This lets
//! an unacknowledged interaction jump ahead of queued background work so it
//! is not perceived as hung.
//!
//! # Contract
//!
//! - [`write`](PriorityChannel::write) never blocks and only fails after
//!   [`close`](PriorityChannel::close).
//! - [`read`](PriorityChannel::read) suspends until an item is available and
//!   always returns the highest-priority item currently enqueued.
//! - After `close()`, remaining items are still drained; once both tiers are
//!   empty, every pending and future read fails with [`ChannelClosed`].
//!   Close signals shutdown; it plays no role in steady-state operation.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

/// Job priority level.
///
/// Higher-priority items are returned before lower-priority items,
/// regardless of write order across tiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Normal priority: work that can wait behind other work.
    #[default]
    Normal = 0,
    /// High priority: work that must preempt the backlog (e.g. an
    /// interaction the transport has not acknowledged yet).
    High = 1,
}

/// The channel has been closed and fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("priority channel closed")]
pub struct ChannelClosed;

#[derive(Debug)]
struct Shared<T> {
    high: VecDeque<T>,
    normal: VecDeque<T>,
    closed: bool,
}

impl<T> Shared<T> {
    fn pop(&mut self) -> Option<T> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }
}

/// An unbounded two-tier FIFO queue with strict priority draining and an
/// async read side.
#[derive(Debug)]
pub struct PriorityChannel<T> {
    shared: Mutex<Shared<T>>,
    readable: Notify,
}

impl<T> Default for PriorityChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityChannel<T> {
    /// Creates a new open channel.
    pub fn new() -> Self {
        PriorityChannel {
            shared: Mutex::new(Shared {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                closed: false,
            }),
            readable: Notify::new(),
        }
    }

    /// Enqueues an item at the given priority.
    ///
    /// Never blocks. Fails only after the channel has been closed.
    pub fn write(&self, item: T, priority: Priority) -> Result<(), ChannelClosed> {
        {
            let mut shared = self.shared.lock();
            if shared.closed {
                return Err(ChannelClosed);
            }
            match priority {
                Priority::High => shared.high.push_back(item),
                Priority::Normal => shared.normal.push_back(item),
            }
        }
        self.readable.notify_one();
        Ok(())
    }

    /// Dequeues the highest-priority item, suspending until one is
    /// available.
    ///
    /// All High items are returned before any Normal item; within a tier,
    /// return order equals write order. Once the channel is closed and both
    /// tiers are empty, returns [`ChannelClosed`].
    pub async fn read(&self) -> Result<T, ChannelClosed> {
        loop {
            // Arm the wakeup before checking, so a write between the check
            // and the await is not lost.
            let notified = self.readable.notified();
            {
                let mut shared = self.shared.lock();
                if let Some(item) = shared.pop() {
                    return Ok(item);
                }
                if shared.closed {
                    return Err(ChannelClosed);
                }
            }
            notified.await;
        }
    }

    /// Dequeues the highest-priority item without suspending.
    ///
    /// Returns `None` when both tiers are empty, whether or not the channel
    /// is closed.
    pub fn try_read(&self) -> Option<T> {
        self.shared.lock().pop()
    }

    /// Closes the channel.
    ///
    /// Pending and future reads drain the remaining items, then fail with
    /// [`ChannelClosed`]. Subsequent writes fail immediately.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.readable.notify_waiters();
    }

    /// Returns the number of items currently enqueued across both tiers.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Returns true if both tiers are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    // ─── Basic operations ───

    #[test]
    fn new_channel_is_empty() {
        let channel: PriorityChannel<u32> = PriorityChannel::new();
        assert!(channel.is_empty());
        assert_eq!(channel.len(), 0);
        assert!(!channel.is_closed());
    }

    #[test]
    fn write_increases_length() {
        let channel = PriorityChannel::new();
        channel.write(1u32, Priority::Normal).unwrap();
        assert_eq!(channel.len(), 1);
        channel.write(2, Priority::High).unwrap();
        assert_eq!(channel.len(), 2);
    }

    #[tokio::test]
    async fn read_returns_written_item() {
        let channel = PriorityChannel::new();
        channel.write("a", Priority::Normal).unwrap();
        assert_eq!(channel.read().await.unwrap(), "a");
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn read_suspends_until_write() {
        let channel = Arc::new(PriorityChannel::new());

        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.read().await })
        };

        // Give the reader time to park.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!reader.is_finished());

        channel.write(7u32, Priority::Normal).unwrap();

        let item = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader should wake")
            .unwrap();
        assert_eq!(item.unwrap(), 7);
    }

    // ─── Priority ordering ───

    #[tokio::test]
    async fn high_priority_read_before_normal() {
        let channel = PriorityChannel::new();
        channel.write("normal", Priority::Normal).unwrap();
        channel.write("high", Priority::High).unwrap();

        assert_eq!(channel.read().await.unwrap(), "high");
        assert_eq!(channel.read().await.unwrap(), "normal");
    }

    #[tokio::test]
    async fn fifo_within_same_priority() {
        let channel = PriorityChannel::new();
        for i in 0..3u32 {
            channel.write(i, Priority::Normal).unwrap();
        }
        for i in 0..3u32 {
            assert_eq!(channel.read().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn interleaved_priorities() {
        let channel = PriorityChannel::new();
        channel.write("n1", Priority::Normal).unwrap();
        channel.write("h1", Priority::High).unwrap();
        channel.write("n2", Priority::Normal).unwrap();
        channel.write("h2", Priority::High).unwrap();
        channel.write("n3", Priority::Normal).unwrap();

        // All High first (FIFO), then all Normal (FIFO).
        assert_eq!(channel.read().await.unwrap(), "h1");
        assert_eq!(channel.read().await.unwrap(), "h2");
        assert_eq!(channel.read().await.unwrap(), "n1");
        assert_eq!(channel.read().await.unwrap(), "n2");
        assert_eq!(channel.read().await.unwrap(), "n3");
    }

    // ─── Close semantics ───

    #[tokio::test]
    async fn close_drains_remaining_items_then_fails() {
        let channel = PriorityChannel::new();
        channel.write(1u32, Priority::Normal).unwrap();
        channel.write(2, Priority::High).unwrap();
        channel.close();

        assert_eq!(channel.read().await.unwrap(), 2);
        assert_eq!(channel.read().await.unwrap(), 1);
        assert_eq!(channel.read().await, Err(ChannelClosed));
    }

    #[test]
    fn write_after_close_fails() {
        let channel = PriorityChannel::new();
        channel.close();
        assert_eq!(channel.write(1u32, Priority::Normal), Err(ChannelClosed));
    }

    #[tokio::test]
    async fn close_wakes_pending_reader() {
        let channel: Arc<PriorityChannel<u32>> = Arc::new(PriorityChannel::new());

        let reader = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.read().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.close();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader should wake on close")
            .unwrap();
        assert_eq!(result, Err(ChannelClosed));
    }

    // ─── Property tests ───

    fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::Normal), Just(Priority::High)]
    }

    proptest! {
        /// High items always drain before Normal items, FIFO within a tier.
        #[test]
        fn prop_strict_priority_and_fifo(priorities in proptest::collection::vec(arb_priority(), 0..40)) {
            let channel = PriorityChannel::new();
            for (i, priority) in priorities.iter().enumerate() {
                channel.write((i, *priority), *priority).unwrap();
            }

            let mut drained = Vec::new();
            while let Some(item) = channel.try_read() {
                drained.push(item);
            }

            let high_count = priorities.iter().filter(|p| **p == Priority::High).count();
            prop_assert_eq!(drained.len(), priorities.len());

            // Strict priority: the first high_count items are all High.
            for (_, priority) in &drained[..high_count] {
                prop_assert_eq!(*priority, Priority::High);
            }
            for (_, priority) in &drained[high_count..] {
                prop_assert_eq!(*priority, Priority::Normal);
            }

            // FIFO within each tier: write indices strictly increase.
            for window in drained[..high_count].windows(2) {
                prop_assert!(window[0].0 < window[1].0);
            }
            for window in drained[high_count..].windows(2) {
                prop_assert!(window[0].0 < window[1].0);
            }
        }

        /// Length is always accurate under interleaved write/try_read.
        #[test]
        fn prop_length_accurate(write_count in 0usize..30, read_count in 0usize..30) {
            let channel = PriorityChannel::new();
            for i in 0..write_count {
                channel.write(i, Priority::Normal).unwrap();
            }
            let actual_reads = read_count.min(write_count);
            for _ in 0..actual_reads {
                channel.try_read().unwrap();
            }
            prop_assert_eq!(channel.len(), write_count - actual_reads);
        }
    }
}
