// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Queue
//!
//! In-memory multi-priority FIFO with bounded capacity, retry bookkeeping,
//! and a blocking `take`.
//!
//! ## Lifecycle
//!
//! An item is created on `enqueue`, moves to the processing set on `take`,
//! and leaves through `mark_completed` or `mark_failed`. A retryable failure
//! with attempts remaining returns the item to the tail of its original
//! priority band with `attempts + 1`; an exhausted item is recorded as
//! permanently failed. An id is never simultaneously pending and
//! processing: the item physically moves between the band deque and the
//! processing map.
//!
//! ## Ordering
//!
//! `take` drains bands in `Critical > High > Normal > Low` order; within a
//! band, first-in first-out. All state changes hold a single mutex; waiters
//! are signalled on every enqueue and on every retry re-enqueue.
//!
//! ## Cancellation
//!
//! `close()` wakes all waiters and makes every subsequent `take` return
//! `None` once the bands are drained of nothing; workers finish their
//! in-flight items and exit.

use docbatch_domain::{BatchError, Document, ItemId, Priority};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Default maximum number of pending items.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Default maximum handler attempts per item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Poll interval for `wait_for_completion`.
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum pending items before `enqueue` fails with `QueueFull`
    pub max_size: usize,
    /// Handler attempts budget assigned to each item
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// An item in the processing queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Unique item identity
    pub id: ItemId,
    /// The queued document
    pub document: Document,
    /// Priority band
    pub priority: Priority,
    /// Handler attempts consumed so far
    pub attempts: u32,
    /// Attempts budget
    pub max_attempts: u32,
}

impl QueueItem {
    /// Whether another attempt is permitted after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }
}

/// Per-band and lifecycle statistics.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Pending items across all bands
    pub queue_size: usize,
    /// Items currently being processed
    pub processing: usize,
    /// Items completed successfully
    pub completed: usize,
    /// Items permanently failed
    pub failed: usize,
    /// Cumulative enqueues
    pub total_enqueued: u64,
    /// Cumulative completions
    pub total_completed: u64,
    /// Cumulative permanent failures
    pub total_failed: u64,
    /// Cumulative retry re-enqueues
    pub total_retried: u64,
    /// Pending count per band, indexed Low..Critical
    pub by_band: [usize; 4],
}

#[derive(Default)]
struct Counters {
    total_enqueued: u64,
    total_completed: u64,
    total_failed: u64,
    total_retried: u64,
}

struct QueueState {
    bands: [VecDeque<QueueItem>; 4],
    processing: HashMap<ItemId, QueueItem>,
    completed: HashSet<ItemId>,
    failed: HashSet<ItemId>,
    closed: bool,
    counters: Counters,
}

impl QueueState {
    fn pending_count(&self) -> usize {
        self.bands.iter().map(VecDeque::len).sum()
    }

    fn pop_highest(&mut self) -> Option<QueueItem> {
        for priority in Priority::DRAIN_ORDER {
            if let Some(item) = self.bands[priority.band_index()].pop_front() {
                return Some(item);
            }
        }
        None
    }
}

/// Thread-safe multi-priority processing queue.
pub struct ProcessingQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    items_available: Notify,
    space_available: Notify,
}

impl ProcessingQueue {
    /// Creates a queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState {
                bands: Default::default(),
                processing: HashMap::new(),
                completed: HashSet::new(),
                failed: HashSet::new(),
                closed: false,
                counters: Counters::default(),
            }),
            items_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    /// Creates a queue with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(QueueConfig::default())
    }

    /// Adds a document at the given priority.
    ///
    /// Fails with `QueueFull` when the pending count has reached `max_size`;
    /// the queue state is unchanged in that case.
    pub fn enqueue(&self, document: Document, priority: Priority) -> Result<ItemId, BatchError> {
        let id = {
            let mut state = self.state.lock();

            if state.closed {
                return Err(BatchError::cancelled("queue is closed".to_string()));
            }

            if state.pending_count() >= self.config.max_size {
                return Err(BatchError::queue_full(format!(
                    "queue is full (max size: {})",
                    self.config.max_size
                )));
            }

            let item = QueueItem {
                id: ItemId::new(),
                document,
                priority,
                attempts: 0,
                max_attempts: self.config.max_attempts,
            };
            let id = item.id;
            state.bands[priority.band_index()].push_back(item);
            state.counters.total_enqueued += 1;
            id
        };

        self.items_available.notify_one();
        debug!(item = %id, priority = %priority, "enqueued document");
        Ok(id)
    }

    /// Adds a document, waiting for capacity when the queue is full.
    ///
    /// This is the streaming producer's entry point: the bounded capacity
    /// becomes implicit backpressure.
    pub async fn enqueue_wait(&self, document: Document, priority: Priority) -> Result<ItemId, BatchError> {
        loop {
            match self.enqueue(document.clone(), priority) {
                Ok(id) => return Ok(id),
                Err(BatchError::QueueFull(_)) => {
                    // Re-check after registering the waiter; a take() may
                    // have freed space in between.
                    let notified = self.space_available.notified();
                    if self.state.lock().pending_count() < self.config.max_size {
                        continue;
                    }
                    notified.await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Takes the next item, blocking until one is available.
    ///
    /// Drains bands in `Critical > High > Normal > Low` order. Returns
    /// `None` on timeout, or immediately once the queue has been closed.
    pub async fn take(&self, timeout: Option<Duration>) -> Option<QueueItem> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    drop(state);
                    // Cascade the wakeup so every blocked worker observes
                    // the closed queue. Pending items are deliberately not
                    // handed out after close; the scheduler accounts for
                    // them via drain_pending.
                    self.items_available.notify_one();
                    return None;
                }
                if let Some(item) = state.pop_highest() {
                    state.processing.insert(item.id, item.clone());
                    drop(state);
                    self.space_available.notify_one();
                    return Some(item);
                }
            }

            let notified = self.items_available.notified();

            // An enqueue or close between the lock release and here would
            // otherwise be missed.
            {
                let state = self.state.lock();
                if state.closed || state.pending_count() > 0 {
                    continue;
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Marks an in-flight item as completed.
    pub fn mark_completed(&self, id: ItemId) {
        let mut state = self.state.lock();
        if state.processing.remove(&id).is_some() {
            state.completed.insert(id);
            state.counters.total_completed += 1;
            debug!(item = %id, "completed");
        } else {
            warn!(item = %id, "mark_completed for unknown item");
        }
    }

    /// Marks an in-flight item as failed.
    ///
    /// With `retry = true` and attempts remaining, the item returns to the
    /// tail of its original priority band with `attempts + 1` and the
    /// method returns `true`. Otherwise the item is recorded as permanently
    /// failed and the method returns `false`.
    pub fn mark_failed(&self, id: ItemId, retry: bool) -> bool {
        let requeued = {
            let mut state = self.state.lock();

            let Some(mut item) = state.processing.remove(&id) else {
                warn!(item = %id, "mark_failed for unknown item");
                return false;
            };

            if retry && item.attempts + 1 < item.max_attempts && !state.closed {
                item.attempts += 1;
                let attempts = item.attempts;
                state.bands[item.priority.band_index()].push_back(item);
                state.counters.total_retried += 1;
                debug!(item = %id, attempts, "re-enqueued for retry");
                true
            } else {
                state.failed.insert(id);
                state.counters.total_failed += 1;
                debug!(item = %id, "permanently failed");
                false
            }
        };

        if requeued {
            self.items_available.notify_one();
        }
        requeued
    }

    /// Whether all bands are empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending_count() == 0
    }

    /// Total pending items across all bands.
    pub fn size(&self) -> usize {
        self.state.lock().pending_count()
    }

    /// Whether the queue is fully drained: nothing pending, nothing in
    /// flight.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.pending_count() == 0 && state.processing.is_empty()
    }

    /// Queue statistics by band and lifecycle.
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            queue_size: state.pending_count(),
            processing: state.processing.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            total_enqueued: state.counters.total_enqueued,
            total_completed: state.counters.total_completed,
            total_failed: state.counters.total_failed,
            total_retried: state.counters.total_retried,
            by_band: [
                state.bands[0].len(),
                state.bands[1].len(),
                state.bands[2].len(),
                state.bands[3].len(),
            ],
        }
    }

    /// Clears all pending items and lifecycle sets.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for band in &mut state.bands {
            band.clear();
        }
        state.processing.clear();
        state.completed.clear();
        state.failed.clear();
        debug!("queue cleared");
    }

    /// Closes the queue: wakes all waiters, rejects further enqueues, and
    /// makes `take` return `None` once pending items are drained.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
        }
        self.items_available.notify_waiters();
        self.items_available.notify_one();
        self.space_available.notify_waiters();
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Removes and returns all pending items.
    ///
    /// Used after cancellation so the batch result can account for items
    /// that were never handed to a worker.
    pub fn drain_pending(&self) -> Vec<QueueItem> {
        let mut state = self.state.lock();
        let mut drained = Vec::new();
        for priority in Priority::DRAIN_ORDER {
            drained.extend(state.bands[priority.band_index()].drain(..));
        }
        drained
    }

    /// Waits until nothing is pending and nothing is in flight.
    ///
    /// Polls at 100 ms intervals. Returns `false` on timeout.
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            if self.is_drained() {
                return true;
            }

            match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let remaining = deadline - now;
                    tokio::time::sleep(remaining.min(COMPLETION_POLL_INTERVAL)).await;
                }
                None => tokio::time::sleep(COMPLETION_POLL_INTERVAL).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(payload: &str) -> Document {
        Document::from_payload(payload)
    }

    #[tokio::test]
    async fn test_enqueue_then_take_round_trip() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("a"), Priority::Normal).unwrap();

        let item = queue.take(Some(Duration::from_millis(100))).await.unwrap();
        assert_eq!(item.document.payload(), "a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_priority_drain_order() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("low"), Priority::Low).unwrap();
        queue.enqueue(doc("crit"), Priority::Critical).unwrap();
        queue.enqueue(doc("norm"), Priority::Normal).unwrap();
        queue.enqueue(doc("high"), Priority::High).unwrap();

        let mut order = Vec::new();
        while let Some(item) = queue.take(Some(Duration::from_millis(10))).await {
            order.push(item.document.payload().to_string());
            queue.mark_completed(item.id);
        }
        assert_eq!(order, vec!["crit", "high", "norm", "low"]);
    }

    #[tokio::test]
    async fn test_fifo_within_band() {
        let queue = ProcessingQueue::with_defaults();
        for name in ["first", "second", "third"] {
            queue.enqueue(doc(name), Priority::Normal).unwrap();
        }

        let mut order = Vec::new();
        while let Some(item) = queue.take(Some(Duration::from_millis(10))).await {
            order.push(item.document.payload().to_string());
            queue.mark_completed(item.id);
        }
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_queue_full_leaves_state_unchanged() {
        let queue = ProcessingQueue::new(QueueConfig {
            max_size: 2,
            ..Default::default()
        });
        queue.enqueue(doc("a"), Priority::Normal).unwrap();
        queue.enqueue(doc("b"), Priority::Normal).unwrap();

        let err = queue.enqueue(doc("c"), Priority::Normal).unwrap_err();
        assert!(matches!(err, BatchError::QueueFull(_)));
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.stats().total_enqueued, 2);
    }

    #[tokio::test]
    async fn test_take_timeout_returns_none() {
        let queue = ProcessingQueue::with_defaults();
        let taken = queue.take(Some(Duration::from_millis(20))).await;
        assert!(taken.is_none());
    }

    #[tokio::test]
    async fn test_take_blocks_until_enqueue() {
        let queue = std::sync::Arc::new(ProcessingQueue::with_defaults());
        let consumer = queue.clone();

        let handle = tokio::spawn(async move { consumer.take(Some(Duration::from_secs(5))).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(doc("late"), Priority::Normal).unwrap();

        let item = handle.await.unwrap().unwrap();
        assert_eq!(item.document.payload(), "late");
    }

    #[tokio::test]
    async fn test_retry_returns_to_original_band() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("flaky"), Priority::High).unwrap();

        let item = queue.take(Some(Duration::from_millis(10))).await.unwrap();
        assert_eq!(item.attempts, 0);
        assert!(queue.mark_failed(item.id, true));

        let retried = queue.take(Some(Duration::from_millis(10))).await.unwrap();
        assert_eq!(retried.id, item.id);
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("always-fails"), Priority::Normal).unwrap();

        let mut invocations = 0;
        while let Some(item) = queue.take(Some(Duration::from_millis(10))).await {
            invocations += 1;
            queue.mark_failed(item.id, true);
        }

        // max_attempts = 3 → exactly 3 invocations, then permanent failure
        assert_eq!(invocations, 3);
        assert_eq!(queue.stats().failed, 1);
        assert_eq!(queue.stats().total_retried, 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_fatal_failure() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("fatal"), Priority::Normal).unwrap();

        let item = queue.take(Some(Duration::from_millis(10))).await.unwrap();
        assert!(!queue.mark_failed(item.id, false));
        assert!(queue.is_drained());
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_takers() {
        let queue = std::sync::Arc::new(ProcessingQueue::with_defaults());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let consumer = queue.clone();
            handles.push(tokio::spawn(async move { consumer.take(None).await }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        for handle in handles {
            assert!(handle.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_wait_for_completion() {
        let queue = std::sync::Arc::new(ProcessingQueue::with_defaults());
        queue.enqueue(doc("a"), Priority::Normal).unwrap();

        let worker = queue.clone();
        tokio::spawn(async move {
            let item = worker.take(Some(Duration::from_millis(100))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            worker.mark_completed(item.id);
        });

        assert!(queue.wait_for_completion(Some(Duration::from_secs(2))).await);
        assert!(queue.is_drained());
    }

    #[tokio::test]
    async fn test_wait_for_completion_timeout() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("stuck"), Priority::Normal).unwrap();
        assert!(!queue.wait_for_completion(Some(Duration::from_millis(50))).await);
    }

    #[tokio::test]
    async fn test_stats_by_band() {
        let queue = ProcessingQueue::with_defaults();
        queue.enqueue(doc("a"), Priority::Low).unwrap();
        queue.enqueue(doc("b"), Priority::Critical).unwrap();
        queue.enqueue(doc("c"), Priority::Critical).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.by_band[Priority::Low.band_index()], 1);
        assert_eq!(stats.by_band[Priority::Critical.band_index()], 2);
        assert_eq!(stats.queue_size, 3);
    }
}
