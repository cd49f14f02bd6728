// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Count
//!
//! Bounded worker-count value object for the batch scheduler.
//!
//! The default worker count for a batch is pinned by the host's
//! [`MemoryTier`](crate::value_objects::MemoryTier); a caller may override
//! it, and every path clamps the result to the operational range `[1, 16]`.
//! The clamp is what guarantees a batch can neither stall (zero workers)
//! nor oversubscribe a small host (unbounded workers).
//!
//! # Benefits Over Raw Numbers
//!
//! - **Type Safety**: `WorkerCount` cannot be confused with other numeric
//!   parameters of a batch
//! - **Domain Semantics**: signatures say "this is a parallelism level"
//! - **Centralized Bounds**: the 1-16 clamp lives in exactly one place

use serde::{Deserialize, Serialize};
use std::fmt;

use super::MemoryTier;

/// Worker count for the batch scheduler, clamped to `[1, 16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerCount {
    count: usize,
}

impl WorkerCount {
    /// Minimum number of workers (always at least 1)
    pub const MIN_WORKERS: usize = 1;

    /// Maximum number of workers (prevent resource exhaustion)
    pub const MAX_WORKERS: usize = 16;

    /// Default worker count for fallback scenarios
    pub const DEFAULT_WORKERS: usize = 4;

    /// Creates a new WorkerCount with the specified number of workers
    ///
    /// # Arguments
    /// * `count` - Number of workers (will be clamped to the 1-16 range)
    ///
    /// # Returns
    /// `WorkerCount` with value clamped to [`MIN_WORKERS`](Self::MIN_WORKERS),
    /// [`MAX_WORKERS`](Self::MAX_WORKERS)
    pub fn new(count: usize) -> Self {
        Self {
            count: count.clamp(Self::MIN_WORKERS, Self::MAX_WORKERS),
        }
    }

    /// Returns the number of workers
    pub fn count(&self) -> usize {
        self.count
    }

    /// Worker count pinned by a memory tier.
    ///
    /// Baseline → 1, Standard → 4, Enhanced → 8, Performance → 16.
    pub fn for_tier(tier: MemoryTier) -> Self {
        Self::new(tier.concurrency())
    }

    /// Resolves the effective worker count for a batch.
    ///
    /// An explicit override wins over the tier default; both are clamped.
    pub fn resolve(tier: MemoryTier, override_count: Option<usize>) -> Self {
        match override_count {
            Some(count) => Self::new(count),
            None => Self::for_tier(tier),
        }
    }

    /// Returns the default worker count based on system capabilities
    ///
    /// Used as a fallback when no tier information is available.
    pub fn default_for_system() -> Self {
        let available_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(Self::DEFAULT_WORKERS);

        Self::new(available_cores.min(Self::MAX_WORKERS))
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::default_for_system()
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} workers", self.count)
    }
}

impl From<usize> for WorkerCount {
    fn from(count: usize) -> Self {
        Self::new(count)
    }
}

impl From<WorkerCount> for usize {
    fn from(worker_count: WorkerCount) -> Self {
        worker_count.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(WorkerCount::new(0).count(), 1);
        assert_eq!(WorkerCount::new(1).count(), 1);
        assert_eq!(WorkerCount::new(8).count(), 8);
        assert_eq!(WorkerCount::new(16).count(), 16);
        assert_eq!(WorkerCount::new(100).count(), 16);
    }

    #[test]
    fn test_tier_mapping() {
        assert_eq!(WorkerCount::for_tier(MemoryTier::Baseline).count(), 1);
        assert_eq!(WorkerCount::for_tier(MemoryTier::Standard).count(), 4);
        assert_eq!(WorkerCount::for_tier(MemoryTier::Enhanced).count(), 8);
        assert_eq!(WorkerCount::for_tier(MemoryTier::Performance).count(), 16);
    }

    #[test]
    fn test_override_wins_and_is_clamped() {
        assert_eq!(WorkerCount::resolve(MemoryTier::Baseline, Some(6)).count(), 6);
        assert_eq!(WorkerCount::resolve(MemoryTier::Performance, Some(64)).count(), 16);
        assert_eq!(WorkerCount::resolve(MemoryTier::Performance, Some(0)).count(), 1);
        assert_eq!(WorkerCount::resolve(MemoryTier::Enhanced, None).count(), 8);
    }

    #[test]
    fn test_display_and_conversions() {
        let wc = WorkerCount::new(4);
        assert_eq!(format!("{}", wc), "4 workers");
        assert_eq!(usize::from(wc), 4);
        assert_eq!(WorkerCount::from(4usize), wc);
    }

    proptest! {
        #[test]
        fn prop_always_in_operational_range(count in any::<usize>()) {
            let wc = WorkerCount::new(count);
            prop_assert!(wc.count() >= WorkerCount::MIN_WORKERS);
            prop_assert!(wc.count() <= WorkerCount::MAX_WORKERS);
        }
    }
}
