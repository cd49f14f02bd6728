// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Priority
//!
//! Priority bands for queued documents. The queue drains bands in order
//! `Critical > High > Normal > Low`; within a band, admission order is
//! preserved (FIFO).

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document processing priority level.
///
/// Derives `Ord` with `Low` as the smallest variant so that
/// `Priority::Critical > Priority::High > Priority::Normal > Priority::Low`
/// holds, matching the queue's drain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities in drain order (highest first).
    pub const DRAIN_ORDER: [Priority; 4] = [Priority::Critical, Priority::High, Priority::Normal, Priority::Low];

    /// Stable index for per-band storage (0 = Low .. 3 = Critical).
    pub fn band_index(&self) -> usize {
        *self as usize
    }

    /// Returns the priority name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(BatchError::invalid_config(format!("unknown priority: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_drain_order_is_descending() {
        let order = Priority::DRAIN_ORDER;
        for pair in order.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_band_indices_are_distinct() {
        let mut seen = [false; 4];
        for p in [Priority::Low, Priority::Normal, Priority::High, Priority::Critical] {
            assert!(!seen[p.band_index()]);
            seen[p.band_index()] = true;
        }
    }

    #[test]
    fn test_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
