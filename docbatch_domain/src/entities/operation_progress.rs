// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Progress
//!
//! Progress record for one tracked operation. All derived figures (percent,
//! ETA, throughput) are computed lazily from the stored counters and
//! timestamps: an unfinished record measures against `now`, a finished one
//! against its recorded end time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::value_objects::OperationId;

/// Lifecycle status of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Returns the status name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }
}

/// Progress information for a single operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationProgress {
    /// Identity of the tracked operation
    pub operation_id: OperationId,
    /// Total number of items to process
    pub total_items: usize,
    /// Items processed so far (capped at `total_items`)
    pub processed_items: usize,
    /// Start timestamp
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// End timestamp, set on completion
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Lifecycle status
    pub status: OperationStatus,
    /// Recorded per-item error messages
    pub errors: Vec<String>,
}

impl OperationProgress {
    /// Creates a running progress record.
    pub fn new(operation_id: OperationId, total_items: usize) -> Self {
        Self {
            operation_id,
            total_items,
            processed_items: 0,
            start_time: chrono::Utc::now(),
            end_time: None,
            status: OperationStatus::Running,
            errors: Vec::new(),
        }
    }

    /// Progress percentage (0 for an empty operation).
    pub fn percent(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        self.processed_items as f64 / self.total_items as f64 * 100.0
    }

    /// Elapsed time; an unfinished record measures against now.
    pub fn elapsed(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(chrono::Utc::now);
        (end - self.start_time).to_std().unwrap_or(Duration::ZERO)
    }

    /// Estimated remaining time, when a rate can be derived.
    pub fn eta(&self) -> Option<Duration> {
        if self.processed_items == 0 {
            return None;
        }
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return None;
        }
        let rate = self.processed_items as f64 / elapsed;
        if rate <= 0.0 {
            return None;
        }
        let remaining = (self.total_items - self.processed_items) as f64 / rate;
        Some(Duration::from_secs_f64(remaining))
    }

    /// Items per second.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.processed_items as f64 / elapsed
    }

    /// Whether all items have been processed.
    pub fn is_complete(&self) -> bool {
        self.processed_items >= self.total_items
    }

    /// Renders a text progress bar of the given width.
    pub fn progress_bar(&self, width: usize) -> String {
        let fraction = self.percent() / 100.0;
        let filled = (width as f64 * fraction).round() as usize;
        let filled = filled.min(width);
        format!(
            "[{}{}] {:.1}%",
            "█".repeat(filled),
            "░".repeat(width - filled),
            self.percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::OperationType;

    fn progress(total: usize, processed: usize) -> OperationProgress {
        let mut p = OperationProgress::new(OperationId::new(OperationType::Analyze), total);
        p.processed_items = processed;
        p
    }

    #[test]
    fn test_percent_empty_operation() {
        assert_eq!(progress(0, 0).percent(), 0.0);
    }

    #[test]
    fn test_percent() {
        assert_eq!(progress(4, 1).percent(), 25.0);
        assert_eq!(progress(4, 4).percent(), 100.0);
    }

    #[test]
    fn test_eta_requires_progress() {
        assert!(progress(10, 0).eta().is_none());
    }

    #[test]
    fn test_finished_record_uses_end_time() {
        let mut p = progress(2, 2);
        p.end_time = Some(p.start_time + chrono::Duration::seconds(4));
        assert_eq!(p.elapsed(), Duration::from_secs(4));
        assert_eq!(p.throughput(), 0.5);
    }

    #[test]
    fn test_progress_bar_bounds() {
        let bar = progress(2, 1).progress_bar(10);
        assert!(bar.starts_with('['));
        assert!(bar.contains("50.0%"));

        let full = progress(2, 2).progress_bar(10);
        assert!(full.contains("100.0%"));
        assert!(!full.contains('░'));
    }
}
