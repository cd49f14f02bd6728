// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Result
//!
//! The aggregate outcome of one batch invocation. Every input document
//! appears in exactly one of the processed / failed / skipped tallies
//! (totality), and the per-item outcomes are recorded in completion order.
//!
//! `processed` counts attempted items (successes and failures alike), so
//! `success_rate = (processed - failed) / total * 100`. The distinction
//! matters: a skipped item was never attempted (validation rejection, rate
//! limit), while a failed item consumed handler attempts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::value_objects::{OperationId, OperationType, ThreatLevel};

/// Terminal status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
    Skipped,
}

impl ItemStatus {
    /// Returns the status name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Success => "success",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

/// Per-item success record, ordered by completion within the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Identity of the source document
    pub document_id: String,
    /// Terminal status
    pub status: ItemStatus,
    /// Opaque handler result (empty for skipped items)
    pub result: serde_json::Value,
    /// Whether the result was served from the cache
    #[serde(default)]
    pub from_cache: bool,
    /// Completion timestamp
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Per-item failure or skip record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Identity of the source document
    pub document_id: String,
    /// Terminal status (Failed or Skipped)
    pub status: ItemStatus,
    /// Error category (see `BatchError::category`)
    pub category: String,
    /// Human-readable reason
    pub error: String,
    /// Envelope violations, when the item was rejected by a security check
    #[serde(default)]
    pub violations: Vec<String>,
    /// Threat level attached by the validator, if any
    #[serde(default)]
    pub threat_level: ThreatLevel,
    /// Number of handler attempts consumed
    #[serde(default)]
    pub attempts: u32,
}

/// Result of a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Identity of the batch
    pub operation_id: OperationId,
    /// Kind of operation dispatched
    pub kind: OperationType,
    /// Number of input documents
    pub total: usize,
    /// Items whose handler ran to a terminal outcome (successes + failures)
    pub processed: usize,
    /// Items whose handler terminally failed
    pub failed: usize,
    /// Items rejected before the handler ran
    pub skipped: usize,
    /// Wall-clock duration of the batch
    pub elapsed: Duration,
    /// Per-item successes, ordered by completion
    pub results: Vec<ItemOutcome>,
    /// Per-item failures and skips
    pub errors: Vec<ItemFailure>,
    /// Free-form metadata (mode, worker count, tier, ...)
    pub metadata: HashMap<String, String>,
}

impl BatchResult {
    /// Creates an empty result shell for a starting batch.
    pub fn new(operation_id: OperationId, kind: OperationType, total: usize) -> Self {
        Self {
            operation_id,
            kind,
            total,
            processed: 0,
            failed: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
            results: Vec::new(),
            errors: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Success rate as a percentage.
    ///
    /// `(processed - failed) / total * 100`, or 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed.saturating_sub(self.failed)) as f64 / self.total as f64 * 100.0
    }

    /// Throughput in documents per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.processed as f64 / secs
    }

    /// Totality check: every input accounted for exactly once.
    ///
    /// `processed` counts attempted items; successes are `processed -
    /// failed`. Totality therefore reads `(processed - failed) + failed +
    /// skipped == total`, i.e. `processed + skipped == total`.
    pub fn is_total(&self) -> bool {
        self.processed + self.skipped == self.total
    }
}
