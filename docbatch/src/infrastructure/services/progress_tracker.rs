// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracker
//!
//! Per-operation counters with ETA and throughput, plus event fan-out to
//! subscribers.
//!
//! One record per tracked operation: created by `start` (duplicates
//! rejected), advanced by `update` (capped at the total, transitions to
//! `Completed` when the total is reached), and finalized by `complete`,
//! which stamps the end time and moves the record to the history list.
//!
//! Subscribers register per event kind. Notifications are delivered
//! synchronously on the updating worker, but always after the internal lock
//! has been released: a slow observer delays its caller, never other
//! workers' accounting.

use docbatch_domain::{
    BatchError, OperationId, OperationProgress, OperationStatus, ProgressEvent, ProgressEventKind, ProgressObserver,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregated view over active and completed operations.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSummary {
    /// Number of operations currently tracked
    pub active_operations: usize,
    /// Number of operations in the history list
    pub completed_operations: usize,
    /// Mean progress percentage across active operations
    pub average_progress: f64,
    /// Sum of active operations' throughput (items/s)
    pub total_throughput: f64,
    /// Mean wall-clock duration of completed operations, in seconds
    pub average_completion_secs: f64,
    /// Share of history entries that finished with `Completed` status
    pub success_rate: f64,
}

struct TrackerState {
    active: HashMap<String, OperationProgress>,
    history: Vec<OperationProgress>,
}

/// Tracks progress for concurrent batch operations.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    observers: RwLock<HashMap<ProgressEventKind, Vec<Arc<dyn ProgressObserver>>>>,
}

impl ProgressTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                active: HashMap::new(),
                history: Vec::new(),
            }),
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes an observer to one event kind.
    pub fn subscribe(&self, kind: ProgressEventKind, observer: Arc<dyn ProgressObserver>) {
        self.observers.write().entry(kind).or_default().push(observer);
    }

    fn emit(&self, event: ProgressEvent) {
        let observers: Vec<Arc<dyn ProgressObserver>> = {
            let map = self.observers.read();
            match map.get(&event.kind) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for observer in observers {
            observer.on_event(&event);
        }
    }

    /// Starts tracking a new operation.
    ///
    /// Rejects an operation id that is already being tracked.
    pub fn start(&self, operation_id: OperationId, total_items: usize) -> Result<(), BatchError> {
        {
            let mut state = self.state.lock();
            if state.active.contains_key(operation_id.as_str()) {
                return Err(BatchError::invalid_config(format!(
                    "operation {} is already tracked",
                    operation_id
                )));
            }
            state.active.insert(
                operation_id.as_str().to_string(),
                OperationProgress::new(operation_id.clone(), total_items),
            );
        }

        info!(operation = %operation_id, total_items, "tracking started");
        self.emit(ProgressEvent::new(ProgressEventKind::Started, operation_id, 0, total_items));
        Ok(())
    }

    /// Updates progress for an operation.
    ///
    /// `processed` sets the absolute count; otherwise the count advances by
    /// `increment`. Either way the count is capped at the total. An error
    /// message is appended to the record and additionally emitted as an
    /// `Error` event.
    pub fn update(
        &self,
        operation_id: &OperationId,
        processed: Option<usize>,
        increment: usize,
        error: Option<String>,
    ) -> Option<OperationProgress> {
        let (snapshot, events) = {
            let mut state = self.state.lock();
            let Some(progress) = state.active.get_mut(operation_id.as_str()) else {
                warn!(operation = %operation_id, "update for unknown operation");
                return None;
            };

            progress.processed_items = match processed {
                Some(absolute) => absolute.min(progress.total_items),
                None => (progress.processed_items + increment).min(progress.total_items),
            };

            let mut events = Vec::new();
            events.push(ProgressEvent::new(
                ProgressEventKind::ItemCompleted,
                operation_id.clone(),
                progress.processed_items,
                progress.total_items,
            ));

            if let Some(message) = error {
                progress.errors.push(message.clone());
                events.push(
                    ProgressEvent::new(
                        ProgressEventKind::Error,
                        operation_id.clone(),
                        progress.processed_items,
                        progress.total_items,
                    )
                    .with_error(message),
                );
            }

            if progress.is_complete() && progress.status == OperationStatus::Running {
                progress.status = OperationStatus::Completed;
            }

            (progress.clone(), events)
        };

        for event in events {
            self.emit(event);
        }
        Some(snapshot)
    }

    /// Completes an operation, moving its record to the history list.
    pub fn complete(&self, operation_id: &OperationId, status: OperationStatus) -> Option<OperationProgress> {
        let snapshot = {
            let mut state = self.state.lock();
            let mut progress = state.active.remove(operation_id.as_str())?;
            progress.end_time = Some(chrono::Utc::now());
            progress.status = status;
            let snapshot = progress.clone();
            state.history.push(progress);
            snapshot
        };

        info!(
            operation = %operation_id,
            processed = snapshot.processed_items,
            total = snapshot.total_items,
            elapsed_secs = snapshot.elapsed().as_secs_f64(),
            throughput = snapshot.throughput(),
            status = status.as_str(),
            "operation complete"
        );

        self.emit(ProgressEvent::new(
            ProgressEventKind::BatchCompleted,
            operation_id.clone(),
            snapshot.processed_items,
            snapshot.total_items,
        ));
        Some(snapshot)
    }

    /// Gets the progress record for one operation.
    pub fn get(&self, operation_id: &OperationId) -> Option<OperationProgress> {
        self.state.lock().active.get(operation_id.as_str()).cloned()
    }

    /// All active operation records.
    pub fn active(&self) -> Vec<OperationProgress> {
        self.state.lock().active.values().cloned().collect()
    }

    /// Aggregates active and history records into a summary.
    pub fn summary(&self) -> TrackerSummary {
        let state = self.state.lock();

        let active: Vec<&OperationProgress> = state.active.values().collect();
        let history = &state.history;

        let (average_progress, total_throughput) = if active.is_empty() {
            (0.0, 0.0)
        } else {
            (
                active.iter().map(|p| p.percent()).sum::<f64>() / active.len() as f64,
                active.iter().map(|p| p.throughput()).sum::<f64>(),
            )
        };

        let (average_completion_secs, success_rate) = if history.is_empty() {
            (0.0, 0.0)
        } else {
            let successes = history.iter().filter(|p| p.status == OperationStatus::Completed).count();
            (
                history.iter().map(|p| p.elapsed().as_secs_f64()).sum::<f64>() / history.len() as f64,
                successes as f64 / history.len() as f64 * 100.0,
            )
        };

        TrackerSummary {
            active_operations: active.len(),
            completed_operations: history.len(),
            average_progress,
            total_throughput,
            average_completion_secs,
            success_rate,
        }
    }

    /// Clears the history list.
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
        debug!("completed-operations history cleared");
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbatch_domain::OperationType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(AtomicUsize);

    impl ProgressObserver for CountingObserver {
        fn on_event(&self, _event: &ProgressEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn new_id() -> OperationId {
        OperationId::new(OperationType::Analyze)
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let tracker = ProgressTracker::new();
        let id = new_id();
        tracker.start(id.clone(), 5).unwrap();
        assert!(tracker.start(id, 5).is_err());
    }

    #[test]
    fn test_update_increments_and_caps() {
        let tracker = ProgressTracker::new();
        let id = new_id();
        tracker.start(id.clone(), 2).unwrap();

        let p = tracker.update(&id, None, 1, None).unwrap();
        assert_eq!(p.processed_items, 1);
        assert_eq!(p.status, OperationStatus::Running);

        // Overshooting the total is capped, and the status transitions
        let p = tracker.update(&id, None, 5, None).unwrap();
        assert_eq!(p.processed_items, 2);
        assert_eq!(p.status, OperationStatus::Completed);
    }

    #[test]
    fn test_update_absolute_value() {
        let tracker = ProgressTracker::new();
        let id = new_id();
        tracker.start(id.clone(), 10).unwrap();

        let p = tracker.update(&id, Some(7), 1, None).unwrap();
        assert_eq!(p.processed_items, 7);
    }

    #[test]
    fn test_update_unknown_operation() {
        let tracker = ProgressTracker::new();
        assert!(tracker.update(&new_id(), None, 1, None).is_none());
    }

    #[test]
    fn test_errors_are_recorded() {
        let tracker = ProgressTracker::new();
        let id = new_id();
        tracker.start(id.clone(), 3).unwrap();

        tracker.update(&id, None, 1, Some("boom".to_string()));
        let p = tracker.get(&id).unwrap();
        assert_eq!(p.errors, vec!["boom".to_string()]);
    }

    #[test]
    fn test_complete_moves_to_history() {
        let tracker = ProgressTracker::new();
        let id = new_id();
        tracker.start(id.clone(), 1).unwrap();
        tracker.update(&id, None, 1, None);

        let finished = tracker.complete(&id, OperationStatus::Completed).unwrap();
        assert!(finished.end_time.is_some());
        assert!(tracker.get(&id).is_none());

        let summary = tracker.summary();
        assert_eq!(summary.active_operations, 0);
        assert_eq!(summary.completed_operations, 1);
        assert_eq!(summary.success_rate, 100.0);
    }

    #[test]
    fn test_observer_fan_out() {
        let tracker = ProgressTracker::new();
        let started = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let items = Arc::new(CountingObserver(AtomicUsize::new(0)));
        tracker.subscribe(ProgressEventKind::Started, started.clone());
        tracker.subscribe(ProgressEventKind::ItemCompleted, items.clone());

        let id = new_id();
        tracker.start(id.clone(), 2).unwrap();
        tracker.update(&id, None, 1, None);
        tracker.update(&id, None, 1, None);

        assert_eq!(started.0.load(Ordering::SeqCst), 1);
        assert_eq!(items.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_summary_averages_active_progress() {
        let tracker = ProgressTracker::new();
        let a = new_id();
        let b = new_id();
        tracker.start(a.clone(), 4).unwrap();
        tracker.start(b.clone(), 4).unwrap();
        tracker.update(&a, Some(2), 0, None);
        tracker.update(&b, Some(4), 0, None);

        let summary = tracker.summary();
        assert_eq!(summary.active_operations, 2);
        assert!((summary.average_progress - 75.0).abs() < 0.001);
    }
}
