// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Guard
//!
//! Per-operation wall-clock, CPU-time, and memory-delta limits with a
//! process-wide circuit breaker.
//!
//! ## Mechanism
//!
//! Every guarded invocation registers a tracking record (start instant,
//! starting CPU time, starting RSS) and races the operation future against
//! its cancellation token inside a wall-clock timeout. A background sampler
//! inspects all live records about once per second; on a breach it cancels
//! the offender's token (Hard and Strict enforcement) and, under Strict,
//! opens the circuit breaker for a cool-down window during which new
//! operations are rejected before entry.
//!
//! The termination guarantee is cooperative-plus-timeout: a handler that
//! never yields cannot observe its cancellation token, but the outer
//! `tokio::time::timeout` still bounds its wall-clock time, because the
//! race is resolved by the runtime rather than the handler.
//!
//! ## Process-global breaker
//!
//! The breaker deadline is deliberately process-global state, shared by
//! every guard instance and consulted with a single atomic read on each
//! admission.
//!
//! Exit always decrements counters and removes the tracking record, even
//! when the operation failed or was terminated.

use docbatch_bootstrap::platform::Platform;
use docbatch_bootstrap::shutdown::CancellationToken;
use docbatch_domain::{BatchError, SecurityLevel};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sampler cadence.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Process-global circuit-breaker deadline, in milliseconds on the process
/// clock. Zero means closed.
static BREAKER_OPEN_UNTIL_MS: AtomicU64 = AtomicU64::new(0);

static PROCESS_CLOCK: Lazy<Instant> = Lazy::new(Instant::now);

fn clock_ms() -> u64 {
    PROCESS_CLOCK.elapsed().as_millis() as u64
}

/// Enforcement level applied on a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    /// Log only
    Soft,
    /// Terminate the offending operation
    Hard,
    /// Terminate and open the process-wide circuit breaker
    Strict,
}

/// Resource limits. Unknown fields in profile files are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardLimits {
    /// Memory-delta budget per operation, in bytes
    pub max_memory_per_operation: u64,
    /// CPU-time budget per operation, in seconds
    pub max_cpu_time_secs: u64,
    /// Wall-clock budget per operation, in seconds
    pub operation_timeout_secs: u64,
    /// Maximum concurrently guarded operations
    pub max_concurrent_operations: usize,
    /// Circuit-breaker cool-down, in seconds
    pub circuit_cooldown_secs: u64,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            max_memory_per_operation: 512 * 1024 * 1024,
            max_cpu_time_secs: 300,
            operation_timeout_secs: 600,
            max_concurrent_operations: 10,
            circuit_cooldown_secs: 60,
        }
    }
}

impl GuardLimits {
    /// Preset limits for a named security level.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Basic => Self {
                max_memory_per_operation: 1024 * 1024 * 1024,
                max_cpu_time_secs: 600,
                operation_timeout_secs: 1_200,
                max_concurrent_operations: 20,
                ..Default::default()
            },
            SecurityLevel::Standard => Self::default(),
            SecurityLevel::Strict => Self {
                max_memory_per_operation: 256 * 1024 * 1024,
                max_cpu_time_secs: 180,
                operation_timeout_secs: 300,
                max_concurrent_operations: 5,
                ..Default::default()
            },
            SecurityLevel::Paranoid => Self {
                max_memory_per_operation: 128 * 1024 * 1024,
                max_cpu_time_secs: 60,
                operation_timeout_secs: 120,
                max_concurrent_operations: 3,
                ..Default::default()
            },
        }
    }

    /// Enforcement level matching a preset.
    pub fn enforcement_for_level(level: SecurityLevel) -> EnforcementLevel {
        match level {
            SecurityLevel::Basic => EnforcementLevel::Soft,
            SecurityLevel::Standard => EnforcementLevel::Hard,
            SecurityLevel::Strict | SecurityLevel::Paranoid => EnforcementLevel::Strict,
        }
    }
}

struct TrackedOperation {
    label: String,
    started: Instant,
    start_cpu: Duration,
    start_rss: u64,
    timeout: Duration,
    cancel: CancellationToken,
    violations: Mutex<Vec<String>>,
}

/// Guard status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStatus {
    /// Currently guarded operations
    pub active_operations: usize,
    /// Configured concurrency cap
    pub max_concurrent: usize,
    /// Cumulative violations observed
    pub violation_count: u64,
    /// Whether the process-wide breaker is open right now
    pub circuit_open: bool,
    /// Enforcement level
    pub enforcement: EnforcementLevel,
}

/// Guard wrapping operation invocations with resource limits.
pub struct ResourceGuard {
    limits: GuardLimits,
    enforcement: EnforcementLevel,
    platform: Arc<dyn Platform>,
    active: Mutex<HashMap<u64, Arc<TrackedOperation>>>,
    next_id: AtomicU64,
    violation_count: AtomicU64,
    sampler: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ResourceGuard {
    /// Creates a guard with the given limits and enforcement level.
    pub fn new(limits: GuardLimits, enforcement: EnforcementLevel, platform: Arc<dyn Platform>) -> Arc<Self> {
        Arc::new(Self {
            limits,
            enforcement,
            platform,
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            violation_count: AtomicU64::new(0),
            sampler: Mutex::new(None),
        })
    }

    /// Creates a guard from a preset level over the native platform.
    pub fn for_level(level: SecurityLevel) -> Arc<Self> {
        Self::new(
            GuardLimits::for_level(level),
            GuardLimits::enforcement_for_level(level),
            Arc::from(docbatch_bootstrap::platform::create_platform()),
        )
    }

    /// Starts the background sampler (~1 Hz). Idempotent; requires a
    /// running tokio runtime. The sampler task holds only a weak reference
    /// and exits when the guard is dropped.
    pub fn start_sampler(self: &Arc<Self>) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("no tokio runtime available; resource sampler not started");
            return;
        }
        let mut slot = self.sampler.lock();
        if slot.is_some() {
            return;
        }
        let weak: Weak<ResourceGuard> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(guard) = weak.upgrade() else {
                    break;
                };
                guard.sample_once();
            }
        }));
    }

    /// Stops the background sampler.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sampler.lock().take() {
            handle.abort();
        }
    }

    /// One sampler pass over all live operations.
    fn sample_once(&self) {
        let now = Instant::now();
        let cpu_now = self.platform.process_cpu_time().ok();
        let rss_now = self.platform.process_rss().ok();

        let tracked: Vec<Arc<TrackedOperation>> = self.active.lock().values().cloned().collect();

        for op in tracked {
            let mut breaches: Vec<String> = Vec::new();

            let elapsed = now.duration_since(op.started);
            if elapsed > op.timeout {
                breaches.push(format!(
                    "operation timeout: {:.1}s > {:.1}s",
                    elapsed.as_secs_f64(),
                    op.timeout.as_secs_f64()
                ));
            }

            if let Some(cpu_now) = cpu_now {
                let cpu_used = cpu_now.saturating_sub(op.start_cpu);
                if cpu_used > Duration::from_secs(self.limits.max_cpu_time_secs) {
                    breaches.push(format!(
                        "cpu time limit exceeded: {:.1}s > {}s",
                        cpu_used.as_secs_f64(),
                        self.limits.max_cpu_time_secs
                    ));
                }
            }

            if let Some(rss_now) = rss_now {
                let memory_used = rss_now.saturating_sub(op.start_rss);
                if memory_used > self.limits.max_memory_per_operation {
                    breaches.push(format!(
                        "memory limit exceeded: {} MiB > {} MiB",
                        memory_used / (1024 * 1024),
                        self.limits.max_memory_per_operation / (1024 * 1024)
                    ));
                }
            }

            if !breaches.is_empty() {
                self.handle_violation(&op, breaches);
            }
        }
    }

    fn handle_violation(&self, op: &TrackedOperation, breaches: Vec<String>) {
        self.violation_count.fetch_add(breaches.len() as u64, Ordering::Relaxed);
        warn!(operation = %op.label, ?breaches, "resource violation");
        op.violations.lock().extend(breaches);

        match self.enforcement {
            EnforcementLevel::Soft => {}
            EnforcementLevel::Hard => op.cancel.cancel(),
            EnforcementLevel::Strict => {
                op.cancel.cancel();
                self.open_circuit();
            }
        }
    }

    fn open_circuit(&self) {
        let until = clock_ms() + self.limits.circuit_cooldown_secs * 1000;
        BREAKER_OPEN_UNTIL_MS.store(until, Ordering::SeqCst);
        warn!(cooldown_secs = self.limits.circuit_cooldown_secs, "resource-guard circuit breaker opened");
    }

    /// Whether the process-wide circuit breaker is currently open.
    ///
    /// This is the single atomic read performed on every admission.
    pub fn circuit_open() -> bool {
        BREAKER_OPEN_UNTIL_MS.load(Ordering::SeqCst) > clock_ms()
    }

    /// Closes the process-wide breaker (administrative reset).
    pub fn reset_circuit() {
        BREAKER_OPEN_UNTIL_MS.store(0, Ordering::SeqCst);
    }

    /// Runs a future under resource protection.
    ///
    /// Admission is rejected while the breaker is open or the concurrency
    /// cap is reached (except under Soft enforcement). The tracking record
    /// is removed on every exit path.
    pub async fn run<F, T>(&self, label: &str, future: F) -> Result<T, BatchError>
    where
        F: Future<Output = Result<T, BatchError>>,
    {
        if Self::circuit_open() {
            return Err(BatchError::circuit_open(
                "resource guard circuit breaker is active".to_string(),
            ));
        }

        let op = {
            let mut active = self.active.lock();

            if active.len() >= self.limits.max_concurrent_operations {
                if self.enforcement == EnforcementLevel::Soft {
                    warn!(
                        active = active.len(),
                        cap = self.limits.max_concurrent_operations,
                        "concurrency cap exceeded (soft enforcement)"
                    );
                } else {
                    return Err(BatchError::resource_exhausted(format!(
                        "too many concurrent operations: {}",
                        active.len()
                    )));
                }
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let op = Arc::new(TrackedOperation {
                label: label.to_string(),
                started: Instant::now(),
                start_cpu: self.platform.process_cpu_time().unwrap_or(Duration::ZERO),
                start_rss: self.platform.process_rss().unwrap_or(0),
                timeout: Duration::from_secs(self.limits.operation_timeout_secs),
                cancel: CancellationToken::new(),
                violations: Mutex::new(Vec::new()),
            });
            active.insert(id, op.clone());
            (id, op)
        };
        let (id, op) = op;

        let timeout = op.timeout;
        let cancel = op.cancel.clone();

        let outcome = tokio::time::timeout(timeout, async {
            tokio::select! {
                result = future => result,
                _ = cancel.cancelled() => {
                    let reasons = op.violations.lock().join("; ");
                    Err(BatchError::resource_exhausted(if reasons.is_empty() {
                        "operation terminated by resource guard".to_string()
                    } else {
                        reasons
                    }))
                }
            }
        })
        .await;

        // Exit path: always remove the tracking record.
        self.active.lock().remove(&id);

        match outcome {
            Ok(result) => {
                debug!(
                    operation = label,
                    duration_secs = op.started.elapsed().as_secs_f64(),
                    "guarded operation finished"
                );
                result
            }
            Err(_) => {
                self.violation_count.fetch_add(1, Ordering::Relaxed);
                if self.enforcement == EnforcementLevel::Strict {
                    self.open_circuit();
                }
                warn!(operation = label, timeout_secs = timeout.as_secs(), "guarded operation timed out");
                Err(BatchError::resource_exhausted(format!(
                    "operation timeout: exceeded {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Cancels and removes operations that have overstayed twice their
    /// timeout. Returns the number cleaned.
    pub fn force_cleanup(&self) -> usize {
        let now = Instant::now();
        let mut active = self.active.lock();
        let stale: Vec<u64> = active
            .iter()
            .filter(|(_, op)| now.duration_since(op.started) > op.timeout * 2)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(op) = active.remove(id) {
                op.cancel.cancel();
                info!(operation = %op.label, "force-cleaned stale operation");
            }
        }
        stale.len()
    }

    /// Number of currently guarded operations.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Cumulative violation count.
    pub fn violation_count(&self) -> u64 {
        self.violation_count.load(Ordering::Relaxed)
    }

    /// Guard status snapshot.
    pub fn status(&self) -> GuardStatus {
        GuardStatus {
            active_operations: self.active_count(),
            max_concurrent: self.limits.max_concurrent_operations,
            violation_count: self.violation_count(),
            circuit_open: Self::circuit_open(),
            enforcement: self.enforcement,
        }
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.sampler.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbatch_bootstrap::platform::PlatformError;
    use std::path::PathBuf;

    struct QuietPlatform;

    impl Platform for QuietPlatform {
        fn page_size(&self) -> usize {
            4096
        }
        fn cpu_count(&self) -> usize {
            4
        }
        fn total_memory(&self) -> Result<u64, PlatformError> {
            Ok(8 * 1024 * 1024 * 1024)
        }
        fn available_memory(&self) -> Result<u64, PlatformError> {
            Ok(4 * 1024 * 1024 * 1024)
        }
        fn process_rss(&self) -> Result<u64, PlatformError> {
            Ok(100 * 1024 * 1024)
        }
        fn process_cpu_time(&self) -> Result<Duration, PlatformError> {
            Ok(Duration::from_secs(1))
        }
        fn platform_name(&self) -> &'static str {
            "quiet"
        }
        fn temp_dir(&self) -> PathBuf {
            std::env::temp_dir()
        }
    }

    fn guard(limits: GuardLimits, enforcement: EnforcementLevel) -> Arc<ResourceGuard> {
        ResourceGuard::new(limits, enforcement, Arc::new(QuietPlatform))
    }

    // The circuit breaker is process-global; serialize the tests that
    // consult or mutate it.
    static BREAKER_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_successful_operation_passes_through() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let guard = guard(GuardLimits::default(), EnforcementLevel::Hard);

        let result = guard.run("ok-op", async { Ok::<_, BatchError>(7) }).await.unwrap();
        assert_eq!(result, 7);
        assert_eq!(guard.active_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_still_removes_tracking_record() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let guard = guard(GuardLimits::default(), EnforcementLevel::Hard);

        let result: Result<(), _> = guard
            .run("failing-op", async { Err(BatchError::handler_failure("boom")) })
            .await;
        assert!(result.is_err());
        assert_eq!(guard.active_count(), 0);
    }

    #[tokio::test]
    async fn test_wall_clock_timeout_terminates() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let limits = GuardLimits {
            operation_timeout_secs: 0,
            ..Default::default()
        };
        let guard = guard(limits, EnforcementLevel::Hard);

        let result: Result<(), _> = guard
            .run("slow-op", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(BatchError::ResourceExhausted(_))));
        assert_eq!(guard.active_count(), 0);
        ResourceGuard::reset_circuit();
    }

    #[tokio::test]
    async fn test_concurrency_cap_rejects() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let limits = GuardLimits {
            max_concurrent_operations: 1,
            ..Default::default()
        };
        let guard = guard(limits, EnforcementLevel::Hard);

        let inner = guard.clone();
        let blocker = tokio::spawn(async move {
            inner
                .run("holder", async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, BatchError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let rejected: Result<(), _> = guard.run("rejected", async { Ok(()) }).await;
        assert!(matches!(rejected, Err(BatchError::ResourceExhausted(_))));

        blocker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_strict_timeout_opens_circuit() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let limits = GuardLimits {
            operation_timeout_secs: 0,
            circuit_cooldown_secs: 60,
            ..Default::default()
        };
        let guard = guard(limits, EnforcementLevel::Strict);

        let _: Result<(), _> = guard
            .run("runaway", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(ResourceGuard::circuit_open());

        // New admissions are rejected during cool-down
        let rejected: Result<(), _> = guard.run("after", async { Ok(()) }).await;
        assert!(matches!(rejected, Err(BatchError::CircuitOpen(_))));

        ResourceGuard::reset_circuit();
        assert!(!ResourceGuard::circuit_open());
    }

    #[tokio::test]
    async fn test_sampler_cancels_on_violation() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let limits = GuardLimits {
            operation_timeout_secs: 600,
            ..Default::default()
        };
        let guard = guard(limits, EnforcementLevel::Hard);

        // Simulate a sampler-detected breach by cancelling the token
        // directly through handle_violation.
        let inner = guard.clone();
        let running = tokio::spawn(async move {
            inner
                .run("victim", async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, BatchError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let active = guard.active.lock();
            let op = active.values().next().unwrap().clone();
            drop(active);
            guard.handle_violation(&op, vec!["memory limit exceeded: test".to_string()]);
        }

        let result = running.await.unwrap();
        match result {
            Err(BatchError::ResourceExhausted(reason)) => assert!(reason.contains("memory limit")),
            other => panic!("expected ResourceExhausted, got {:?}", other),
        }
        assert_eq!(guard.active_count(), 0);
        assert!(guard.violation_count() >= 1);
        ResourceGuard::reset_circuit();
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let _serial = BREAKER_TEST_LOCK.lock();
        ResourceGuard::reset_circuit();
        let guard = guard(GuardLimits::for_level(SecurityLevel::Strict), EnforcementLevel::Strict);
        let status = guard.status();
        assert_eq!(status.active_operations, 0);
        assert_eq!(status.max_concurrent, 5);
        assert!(!status.circuit_open);
    }
}
