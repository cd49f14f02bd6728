// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Memory Tier and Pressure
//!
//! Two distinct memory classifications drive the scheduler:
//!
//! - [`MemoryTier`] is derived from **total host RAM** once per batch and
//!   pins the default worker count. It is stable for the process lifetime
//!   unless explicitly refreshed.
//! - [`MemoryPressure`] is derived from **current utilization** and is
//!   polled during a batch to drive runtime throttling and compaction.
//!
//! Concurrency and batch size are chosen from the tier; backpressure
//! decisions come from the pressure. Keeping the two separate is what lets
//! a large host still throttle under transient load.

use serde::{Deserialize, Serialize};
use std::fmt;

const GIB: u64 = 1024 * 1024 * 1024;

/// Coarse classification of total host RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Less than 2 GiB of RAM
    Baseline,
    /// 2-4 GiB of RAM
    Standard,
    /// 4-8 GiB of RAM
    Enhanced,
    /// More than 8 GiB of RAM
    Performance,
}

impl MemoryTier {
    /// Classify total physical memory into a tier.
    pub fn from_total_bytes(total: u64) -> Self {
        if total < 2 * GIB {
            MemoryTier::Baseline
        } else if total < 4 * GIB {
            MemoryTier::Standard
        } else if total < 8 * GIB {
            MemoryTier::Enhanced
        } else {
            MemoryTier::Performance
        }
    }

    /// Target worker count pinned by this tier.
    pub fn concurrency(&self) -> usize {
        match self {
            MemoryTier::Baseline => 1,
            MemoryTier::Standard => 4,
            MemoryTier::Enhanced => 8,
            MemoryTier::Performance => 16,
        }
    }

    /// Whether the scheduler runs periodic compaction in this tier.
    pub fn wants_compaction(&self) -> bool {
        matches!(self, MemoryTier::Baseline | MemoryTier::Standard)
    }

    /// Returns the tier name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Baseline => "baseline",
            MemoryTier::Standard => "standard",
            MemoryTier::Enhanced => "enhanced",
            MemoryTier::Performance => "performance",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime classification of current memory utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    /// Below 50% utilization
    Low,
    /// 50-70% utilization
    Medium,
    /// 70-85% utilization
    High,
    /// 85% and above
    Critical,
}

impl MemoryPressure {
    /// Classify a used-memory percentage into a pressure level.
    pub fn from_used_percent(percent: f64) -> Self {
        if percent < 50.0 {
            MemoryPressure::Low
        } else if percent < 70.0 {
            MemoryPressure::Medium
        } else if percent < 85.0 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }

    /// Whether processing should be slowed down at this pressure level.
    pub fn should_throttle(&self) -> bool {
        matches!(self, MemoryPressure::High | MemoryPressure::Critical)
    }

    /// Returns the pressure name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPressure::Low => "low",
            MemoryPressure::Medium => "medium",
            MemoryPressure::High => "high",
            MemoryPressure::Critical => "critical",
        }
    }
}

impl fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
