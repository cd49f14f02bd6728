// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Memory Probe
//!
//! Centralized memory governance for the batch engine. The probe answers two
//! different questions for two different moments of a batch:
//!
//! 1. **At batch start**: `tier()` classifies *total* host RAM and pins the
//!    default worker count. The tier is computed once and cached, so every
//!    batch in a process observes the same classification (deterministic
//!    admission planning).
//! 2. **During a batch**: `pressure()` classifies *current* utilization and
//!    drives runtime throttling: at High or Critical the scheduler sleeps
//!    between takes and requests compaction.
//!
//! ## Compaction
//!
//! Rust has no collector to invoke, so `compact()` is a best-effort
//! reclamation hook: it trims the probe's own history buffers and invokes
//! any registered compaction hooks (the orchestrator registers cache
//! expired-entry cleanup here). The call is cheap and idempotent.

use docbatch_bootstrap::platform::Platform;
use docbatch_domain::{MemoryPressure, MemoryTier};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Maximum pressure-history samples retained for the metrics surface.
const PRESSURE_HISTORY_LIMIT: usize = 256;

/// Point-in-time memory numbers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemorySnapshot {
    /// Total physical memory in bytes
    pub total: u64,
    /// Available memory in bytes
    pub available: u64,
    /// Used percentage of total memory
    pub used_percent: f64,
    /// Resident set size of this process in bytes
    pub process_rss: u64,
}

impl MemorySnapshot {
    /// Total memory in GiB
    pub fn total_gb(&self) -> f64 {
        self.total as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Available memory in GiB
    pub fn available_gb(&self) -> f64 {
        self.available as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Process memory in MiB
    pub fn process_mb(&self) -> f64 {
        self.process_rss as f64 / (1024.0 * 1024.0)
    }
}

/// Summary of the probe's current recommendations.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationStrategy {
    /// Memory tier pinned at first use
    pub tier: MemoryTier,
    /// Current pressure classification
    pub pressure: MemoryPressure,
    /// Recommended batch size for the available memory
    pub batch_size: usize,
    /// Whether processing should be throttled right now
    pub throttle: bool,
}

/// Hook invoked on compaction, registered by components that can shed
/// memory on demand.
pub type CompactionHook = Arc<dyn Fn() + Send + Sync>;

/// Memory probe reporting host/process memory and recommendations.
pub struct MemoryProbe {
    platform: Arc<dyn Platform>,
    tier: OnceLock<MemoryTier>,
    pressure_history: Mutex<Vec<MemoryPressure>>,
    compaction_hooks: Mutex<Vec<CompactionHook>>,
}

impl MemoryProbe {
    /// Creates a probe over the given platform.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            tier: OnceLock::new(),
            pressure_history: Mutex::new(Vec::new()),
            compaction_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Creates a probe over the native platform.
    pub fn for_host() -> Self {
        Self::new(Arc::from(docbatch_bootstrap::platform::create_platform()))
    }

    /// Current memory numbers.
    ///
    /// Falls back to conservative values when a platform query fails; a
    /// probe failure must never abort a batch.
    pub fn snapshot(&self) -> MemorySnapshot {
        let total = self.platform.total_memory().unwrap_or_else(|e| {
            warn!("total_memory query failed: {}", e);
            4 * 1024 * 1024 * 1024
        });
        let available = self.platform.available_memory().unwrap_or_else(|e| {
            warn!("available_memory query failed: {}", e);
            total / 2
        });
        let process_rss = self.platform.process_rss().unwrap_or(0);

        let used = total.saturating_sub(available);
        let used_percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        MemorySnapshot {
            total,
            available,
            used_percent,
            process_rss,
        }
    }

    /// The memory tier, computed once per process and stable thereafter.
    pub fn tier(&self) -> MemoryTier {
        *self.tier.get_or_init(|| {
            let tier = MemoryTier::from_total_bytes(self.snapshot().total);
            debug!("memory tier pinned: {}", tier);
            tier
        })
    }

    /// Current memory pressure, recorded into the history window.
    pub fn pressure(&self) -> MemoryPressure {
        let pressure = MemoryPressure::from_used_percent(self.snapshot().used_percent);

        let mut history = self.pressure_history.lock();
        history.push(pressure);
        if history.len() > PRESSURE_HISTORY_LIMIT {
            let excess = history.len() - PRESSURE_HISTORY_LIMIT;
            history.drain(..excess);
        }

        pressure
    }

    /// Recent pressure samples, oldest first.
    pub fn pressure_history(&self) -> Vec<MemoryPressure> {
        self.pressure_history.lock().clone()
    }

    /// Whether processing should be throttled right now.
    pub fn should_throttle(&self) -> bool {
        self.pressure().should_throttle()
    }

    /// Recommended batch size by piecewise table on available memory.
    pub fn recommend_batch_size(&self) -> usize {
        let available_gb = self.snapshot().available_gb();

        if available_gb < 0.5 {
            10
        } else if available_gb < 1.0 {
            50
        } else if available_gb < 2.0 {
            100
        } else if available_gb < 4.0 {
            500
        } else {
            1000
        }
    }

    /// Current optimization recommendations in one struct.
    pub fn optimization_strategy(&self) -> OptimizationStrategy {
        let tier = self.tier();
        let pressure = self.pressure();
        let mut batch_size = self.recommend_batch_size();

        // Baseline hosts under pressure shrink the batch further.
        if tier == MemoryTier::Baseline && pressure.should_throttle() {
            batch_size = batch_size.min(10);
        }

        OptimizationStrategy {
            tier,
            pressure,
            batch_size,
            throttle: pressure.should_throttle(),
        }
    }

    /// Registers a compaction hook.
    pub fn register_compaction_hook(&self, hook: CompactionHook) {
        self.compaction_hooks.lock().push(hook);
    }

    /// Best-effort memory reclamation.
    pub fn compact(&self) {
        {
            let mut history = self.pressure_history.lock();
            if history.len() > PRESSURE_HISTORY_LIMIT / 2 {
                let keep_from = history.len() - PRESSURE_HISTORY_LIMIT / 2;
                history.drain(..keep_from);
            }
            history.shrink_to_fit();
        }

        let hooks: Vec<CompactionHook> = self.compaction_hooks.lock().clone();
        for hook in hooks {
            hook();
        }

        debug!("memory compaction pass complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbatch_bootstrap::platform::PlatformError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Deterministic platform for probe tests.
    struct FixedPlatform {
        total: u64,
        available: u64,
    }

    impl Platform for FixedPlatform {
        fn page_size(&self) -> usize {
            4096
        }
        fn cpu_count(&self) -> usize {
            8
        }
        fn total_memory(&self) -> Result<u64, PlatformError> {
            Ok(self.total)
        }
        fn available_memory(&self) -> Result<u64, PlatformError> {
            Ok(self.available)
        }
        fn process_rss(&self) -> Result<u64, PlatformError> {
            Ok(64 * 1024 * 1024)
        }
        fn process_cpu_time(&self) -> Result<Duration, PlatformError> {
            Ok(Duration::from_secs(1))
        }
        fn platform_name(&self) -> &'static str {
            "fixed"
        }
        fn temp_dir(&self) -> PathBuf {
            std::env::temp_dir()
        }
    }

    const GIB: u64 = 1024 * 1024 * 1024;

    fn probe_with(total: u64, available: u64) -> MemoryProbe {
        MemoryProbe::new(Arc::new(FixedPlatform { total, available }))
    }

    #[test]
    fn test_snapshot_percentages() {
        let probe = probe_with(8 * GIB, 2 * GIB);
        let snap = probe.snapshot();
        assert_eq!(snap.total, 8 * GIB);
        assert!((snap.used_percent - 75.0).abs() < 0.001);
    }

    #[test]
    fn test_tier_is_stable() {
        let probe = probe_with(3 * GIB, GIB);
        assert_eq!(probe.tier(), MemoryTier::Standard);
        // Same answer on every call within a process lifetime
        for _ in 0..10 {
            assert_eq!(probe.tier(), MemoryTier::Standard);
        }
    }

    #[test]
    fn test_pressure_thresholds() {
        assert_eq!(probe_with(10 * GIB, 9 * GIB).pressure(), MemoryPressure::Low);
        assert_eq!(probe_with(10 * GIB, 4 * GIB).pressure(), MemoryPressure::Medium);
        assert_eq!(probe_with(10 * GIB, 2 * GIB).pressure(), MemoryPressure::High);
        assert_eq!(probe_with(10 * GIB, GIB / 2).pressure(), MemoryPressure::Critical);
    }

    #[test]
    fn test_throttle_at_high_pressure() {
        assert!(!probe_with(10 * GIB, 8 * GIB).should_throttle());
        assert!(probe_with(10 * GIB, GIB).should_throttle());
    }

    #[test]
    fn test_batch_size_table() {
        assert_eq!(probe_with(8 * GIB, GIB / 4).recommend_batch_size(), 10);
        assert_eq!(probe_with(8 * GIB, GIB * 3 / 4).recommend_batch_size(), 50);
        assert_eq!(probe_with(8 * GIB, GIB + GIB / 2).recommend_batch_size(), 100);
        assert_eq!(probe_with(8 * GIB, 3 * GIB).recommend_batch_size(), 500);
        assert_eq!(probe_with(16 * GIB, 8 * GIB).recommend_batch_size(), 1000);
    }

    #[test]
    fn test_strategy_shrinks_baseline_under_pressure() {
        // 1.5 GiB host at critical pressure: Baseline tier, tiny batches
        let probe = probe_with(GIB + GIB / 2, GIB / 8);
        let strategy = probe.optimization_strategy();
        assert_eq!(strategy.tier, MemoryTier::Baseline);
        assert!(strategy.throttle);
        assert_eq!(strategy.batch_size, 10);
    }

    #[test]
    fn test_compaction_invokes_hooks() {
        let probe = probe_with(8 * GIB, 4 * GIB);
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = calls.clone();
        probe.register_compaction_hook(Arc::new(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        probe.compact();
        probe.compact();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pressure_history_is_bounded() {
        let probe = probe_with(10 * GIB, 9 * GIB);
        for _ in 0..(PRESSURE_HISTORY_LIMIT + 50) {
            probe.pressure();
        }
        assert!(probe.pressure_history().len() <= PRESSURE_HISTORY_LIMIT);
    }
}
