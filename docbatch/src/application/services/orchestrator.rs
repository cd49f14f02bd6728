// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Orchestrator
//!
//! The public face of the engine. Owns every component instance for its
//! lifetime, selects the component set from the execution mode, and exposes
//! the batch and streaming entry points plus the observability surface.
//!
//! ## Mode-conditional construction
//!
//! | Mode | Components |
//! |---|---|
//! | Basic | scheduler + queue + memory probe + progress tracker |
//! | Performance | Basic + unencrypted cache + batch grouping + streaming |
//! | Secure | Basic + validator + rate limiter + encrypted cache + resource guard + audit log |
//! | Enterprise | Performance ∪ Secure |
//!
//! Handlers for the five registrable operation kinds are pre-registered
//! with self-contained defaults; `Custom` operations carry their handler in
//! the call. Batches never abort on per-item errors; the batch as a whole
//! fails only on invalid arguments or a circuit already open at start.

use crate::application::services::builtin_operations::default_handlers;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::memory_probe::{MemoryProbe, OptimizationStrategy};
use crate::infrastructure::runtime::scheduler::{BatchScheduler, SchedulerConfig, SecurityComponents};
use crate::infrastructure::security::audit_log::{AuditConfig, AuditLog, AuditStats};
use crate::infrastructure::security::profiles::{SecurityProfile, SecurityProfileStore};
use crate::infrastructure::security::rate_limiter::{RateLimiter, RateLimiterStats};
use crate::infrastructure::security::resource_guard::{GuardLimits, GuardStatus, ResourceGuard};
use crate::infrastructure::security::secure_cache::{CacheConfig, CacheStats, SecureCache};
use crate::infrastructure::security::validator::{InputValidator, ValidatorStats};
use crate::infrastructure::services::pii_masking::RegexPiiDetector;
use crate::infrastructure::services::progress_tracker::{ProgressTracker, TrackerSummary};
use docbatch_bootstrap::shutdown::CancellationToken;
use docbatch_domain::{
    BatchError, BatchResult, Document, ExecutionMode, ItemOutcome, MemoryPressure, Operation, OperationHandler,
    OperationParams, OperationType, PiiDetector, SecurityContext, SecurityLevel,
};
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Execution mode (component selection)
    pub mode: ExecutionMode,
    /// Security preset parameterizing the envelope components
    pub security_level: SecurityLevel,
    /// Explicit worker-count override, clamped to `[1, 16]`
    pub concurrency_override: Option<usize>,
    /// Chunk size for the Performance/Enterprise grouping variant
    /// (`<= 1` disables it)
    pub batch_group_size: usize,
    /// Queue capacity
    pub queue_capacity: usize,
    /// Handler attempts budget per item
    pub max_attempts: u32,
    /// TTL for cached results
    pub cache_ttl: Duration,
    /// Optional whole-batch timeout, enforced by cancellation
    pub batch_timeout: Option<Duration>,
    /// Directory receiving the audit journal
    pub audit_directory: PathBuf,
    /// Optional security-profile file (YAML or JSON)
    pub profile_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Basic,
            security_level: SecurityLevel::Standard,
            concurrency_override: None,
            batch_group_size: 0,
            queue_capacity: crate::infrastructure::runtime::processing_queue::DEFAULT_MAX_SIZE,
            max_attempts: crate::infrastructure::runtime::processing_queue::DEFAULT_MAX_ATTEMPTS,
            cache_ttl: Duration::from_secs(3_600),
            batch_timeout: None,
            audit_directory: PathBuf::from("."),
            profile_path: None,
        }
    }
}

impl OrchestratorConfig {
    /// Convenience constructor for a mode with defaults.
    pub fn for_mode(mode: ExecutionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }
}

/// Cumulative engine statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Batches run
    pub total_batches: u64,
    /// Documents attempted across all batches
    pub total_documents: u64,
    /// Wall-clock seconds across all batches
    pub total_time_secs: f64,
    /// Terminal item failures across all batches
    pub failures: u64,
}

impl EngineStats {
    /// Mean documents per second across the engine lifetime
    pub fn throughput(&self) -> f64 {
        if self.total_time_secs == 0.0 {
            0.0
        } else {
            self.total_documents as f64 / self.total_time_secs
        }
    }
}

/// The full metrics surface returned by [`BatchOrchestrator::metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetrics {
    /// Cumulative counters
    pub counters: EngineStats,
    /// Progress tracker aggregation
    pub tracker: TrackerSummary,
    /// Cache statistics, when a cache is constructed
    pub cache: Option<CacheStats>,
    /// Cache hit ratio from the prometheus counters
    pub cache_hit_ratio: f64,
    /// Rate limiter statistics, when constructed
    pub rate_limiter: Option<RateLimiterStats>,
    /// Rate-limit block ratio from the prometheus counters
    pub rate_limit_block_ratio: f64,
    /// Resource guard status, when constructed
    pub resource_guard: Option<GuardStatus>,
    /// Audit statistics, when constructed
    pub audit: Option<AuditStats>,
    /// Validator statistics, when constructed
    pub validator: Option<ValidatorStats>,
    /// Memory recommendations and pressure history
    pub memory: MemoryMetrics,
}

/// Memory portion of the metrics surface.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryMetrics {
    /// Current optimization recommendations
    pub strategy: OptimizationStrategy,
    /// Recent pressure samples, oldest first
    pub pressure_history: Vec<MemoryPressure>,
}

/// Security posture summary.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    /// Execution mode
    pub mode: ExecutionMode,
    /// Active security preset
    pub security_level: SecurityLevel,
    /// Component presence flags
    pub validator_enabled: bool,
    pub rate_limiter_enabled: bool,
    pub cache_enabled: bool,
    pub resource_guard_enabled: bool,
    pub audit_enabled: bool,
    /// Whether the process-wide guard circuit is open
    pub circuit_open: bool,
    /// Per-component statistics
    pub validator: Option<ValidatorStats>,
    pub rate_limiter: Option<RateLimiterStats>,
    pub cache: Option<CacheStats>,
    pub resource_guard: Option<GuardStatus>,
    pub audit: Option<AuditStats>,
}

/// Public entry point owning all engine components.
pub struct BatchOrchestrator {
    config: OrchestratorConfig,
    probe: Arc<MemoryProbe>,
    tracker: Arc<ProgressTracker>,
    metrics: Arc<MetricsService>,
    scheduler: Arc<BatchScheduler>,
    security: SecurityComponents,
    registry: RwLock<HashMap<OperationType, Arc<dyn OperationHandler>>>,
    stats: Mutex<EngineStats>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    /// Constructs an orchestrator, wiring components per the execution
    /// mode.
    pub fn new(config: OrchestratorConfig) -> Result<Arc<Self>, BatchError> {
        let probe = Arc::new(MemoryProbe::for_host());
        let tracker = Arc::new(ProgressTracker::new());
        let metrics = Arc::new(MetricsService::new()?);
        let cancel = CancellationToken::new();
        let pii_detector: Arc<dyn PiiDetector> = Arc::new(RegexPiiDetector::new());

        let profile = Self::resolve_profile(&config)?;
        let security = Self::build_components(&config, &profile, &probe, pii_detector)?;

        let scheduler = Arc::new(BatchScheduler::new(
            SchedulerConfig {
                mode: config.mode,
                security_level: config.security_level,
                concurrency_override: config.concurrency_override,
                batch_group_size: config.batch_group_size,
                queue_capacity: config.queue_capacity,
                max_attempts: config.max_attempts,
                cache_ttl: config.cache_ttl,
                compact_every: 10,
            },
            probe.clone(),
            tracker.clone(),
            metrics.clone(),
            security.clone(),
            cancel.clone(),
        ));

        let mut registry: HashMap<OperationType, Arc<dyn OperationHandler>> = HashMap::new();
        for (kind, handler) in default_handlers() {
            registry.insert(kind, handler);
        }

        info!(
            mode = %config.mode,
            level = %config.security_level,
            tier = %probe.tier(),
            "batch orchestrator initialized"
        );

        Ok(Arc::new(Self {
            config,
            probe,
            tracker,
            metrics,
            scheduler,
            security,
            registry: RwLock::new(registry),
            stats: Mutex::new(EngineStats::default()),
            cancel,
        }))
    }

    /// Constructs an orchestrator for a mode with default settings.
    pub fn for_mode(mode: ExecutionMode) -> Result<Arc<Self>, BatchError> {
        Self::new(OrchestratorConfig::for_mode(mode))
    }

    fn resolve_profile(config: &OrchestratorConfig) -> Result<SecurityProfile, BatchError> {
        match &config.profile_path {
            Some(path) => {
                let store = SecurityProfileStore::load(path)?;
                Ok(store.active_profile().clone())
            }
            None => Ok(SecurityProfile::for_level(config.security_level)),
        }
    }

    fn build_components(
        config: &OrchestratorConfig,
        profile: &SecurityProfile,
        probe: &Arc<MemoryProbe>,
        pii_detector: Arc<dyn PiiDetector>,
    ) -> Result<SecurityComponents, BatchError> {
        let mut security = SecurityComponents::default();

        if config.mode.needs_security() {
            security.validator = Some(Arc::new(InputValidator::new(
                profile.validation.clone(),
                pii_detector.clone(),
            )));
            security.rate_limiter = Some(Arc::new(RateLimiter::new(profile.rate_limit.clone())));

            let cache = Arc::new(SecureCache::new(CacheConfig {
                enable_encryption: config.mode.cache_encrypted(),
                ..profile.cache.clone()
            }));
            security.cache = Some(cache.clone());

            let guard = ResourceGuard::new(
                profile.guard.clone(),
                GuardLimits::enforcement_for_level(profile.level),
                Arc::from(docbatch_bootstrap::platform::create_platform()),
            );
            guard.start_sampler();
            security.guard = Some(guard);

            let audit = AuditLog::new(
                AuditConfig {
                    log_file_path: config.audit_directory.join("audit.log"),
                    ..profile.audit.clone()
                },
                pii_detector,
            )?;
            audit.start_flush_task();
            security.audit = Some(audit);
        } else if config.mode.needs_cache() {
            // Performance mode: result cache without encryption, no
            // envelope.
            security.cache = Some(Arc::new(SecureCache::new(CacheConfig {
                enable_encryption: false,
                ..profile.cache.clone()
            })));
        }

        // Expired cache entries are reclaimable memory: hook the probe's
        // compaction pass into the cache.
        if let Some(cache) = &security.cache {
            let cache = cache.clone();
            probe.register_compaction_hook(Arc::new(move || {
                cache.cleanup_expired();
            }));
        }

        Ok(security)
    }

    fn resolve_handler(&self, operation: &Operation) -> Result<Arc<dyn OperationHandler>, BatchError> {
        match operation {
            Operation::Custom(handler) => Ok(handler.clone()),
            Operation::Registered(OperationType::Custom) => Err(BatchError::invalid_config(
                "custom operations must carry their handler in the call".to_string(),
            )),
            Operation::Registered(kind) => self
                .registry
                .read()
                .get(kind)
                .cloned()
                .ok_or_else(|| BatchError::OperationNotFound(format!("no handler registered for {}", kind))),
        }
    }

    /// Processes a batch of documents through the given operation.
    pub async fn process_batch(
        &self,
        documents: Vec<Document>,
        operation: Operation,
        params: Option<OperationParams>,
        security_context: Option<SecurityContext>,
    ) -> Result<BatchResult, BatchError> {
        let handler = self.resolve_handler(&operation)?;
        let kind = operation.kind();
        let params = params.unwrap_or_default();
        let mut context = security_context.unwrap_or_default();
        if context.operation() == "unknown" {
            context.set_operation(kind.as_str());
        }
        let document_count = documents.len() as u64;

        // Per-batch timeout is enforced through cancellation: in-flight
        // items finish, unstarted items become skip entries.
        let batch_cancel = CancellationToken::new();
        let watchdog = self.config.batch_timeout.map(|timeout| {
            let token = batch_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs_f64(), "batch timeout, cancelling");
                token.cancel();
            })
        });

        let result = self
            .scheduler
            .run_batch(kind, handler, documents, params, context, Some(batch_cancel))
            .await;

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        if let Ok(result) = &result {
            let mut stats = self.stats.lock();
            stats.total_batches += 1;
            stats.total_documents += document_count;
            stats.total_time_secs += result.elapsed.as_secs_f64();
            stats.failures += result.failed as u64;
        }

        result
    }

    /// Processes a lazy sequence of documents, yielding per-item results as
    /// they complete (arbitrary order).
    ///
    /// Available in Performance and Enterprise modes. Backpressure is
    /// implicit: the queue's bounded capacity blocks the producer when
    /// full.
    pub fn process_stream<I>(
        &self,
        documents: I,
        operation: Operation,
        params: Option<OperationParams>,
        security_context: Option<SecurityContext>,
    ) -> Result<impl Stream<Item = ItemOutcome>, BatchError>
    where
        I: IntoIterator<Item = Document>,
        I::IntoIter: Send + 'static,
    {
        if !self.config.mode.needs_performance() {
            return Err(BatchError::invalid_config(format!(
                "streaming requires performance or enterprise mode (current: {})",
                self.config.mode
            )));
        }

        let handler = self.resolve_handler(&operation)?;
        let kind = operation.kind();
        let params = params.unwrap_or_default();
        let mut context = security_context.unwrap_or_default();
        if context.operation() == "unknown" {
            context.set_operation(kind.as_str());
        }

        Ok(self.scheduler.run_stream(kind, handler, documents, params, context))
    }

    /// Registers (or with `override_existing`, replaces) a handler for an
    /// operation kind.
    pub fn register_operation(
        &self,
        kind: OperationType,
        handler: Arc<dyn OperationHandler>,
        override_existing: bool,
    ) -> Result<(), BatchError> {
        if kind == OperationType::Custom {
            return Err(BatchError::invalid_config(
                "custom operations are not registrable; pass the handler with the call".to_string(),
            ));
        }

        let mut registry = self.registry.write();
        if registry.contains_key(&kind) && !override_existing {
            return Err(BatchError::invalid_config(format!("operation {} already registered", kind)));
        }
        registry.insert(kind, handler);
        info!(operation = %kind, "registered operation handler");
        Ok(())
    }

    /// The full metrics surface.
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            counters: self.stats.lock().clone(),
            tracker: self.tracker.summary(),
            cache: self.security.cache.as_ref().map(|c| c.stats()),
            cache_hit_ratio: self.metrics.cache_hit_ratio(),
            rate_limiter: self.security.rate_limiter.as_ref().map(|r| r.stats()),
            rate_limit_block_ratio: self.metrics.rate_limit_block_ratio(),
            resource_guard: self.security.guard.as_ref().map(|g| g.status()),
            audit: self.security.audit.as_ref().map(|a| a.stats()),
            validator: self.security.validator.as_ref().map(|v| v.stats()),
            memory: MemoryMetrics {
                strategy: self.probe.optimization_strategy(),
                pressure_history: self.probe.pressure_history(),
            },
        }
    }

    /// Prometheus text exposition of the engine's series.
    pub fn prometheus_metrics(&self) -> Result<String, BatchError> {
        self.metrics.gather()
    }

    /// Security posture summary.
    pub fn security_status(&self) -> SecurityStatus {
        SecurityStatus {
            mode: self.config.mode,
            security_level: self.config.security_level,
            validator_enabled: self.security.validator.is_some(),
            rate_limiter_enabled: self.security.rate_limiter.is_some(),
            cache_enabled: self.security.cache.is_some(),
            resource_guard_enabled: self.security.guard.is_some(),
            audit_enabled: self.security.audit.is_some(),
            circuit_open: ResourceGuard::circuit_open(),
            validator: self.security.validator.as_ref().map(|v| v.stats()),
            rate_limiter: self.security.rate_limiter.as_ref().map(|r| r.stats()),
            cache: self.security.cache.as_ref().map(|c| c.stats()),
            resource_guard: self.security.guard.as_ref().map(|g| g.status()),
            audit: self.security.audit.as_ref().map(|a| a.stats()),
        }
    }

    /// The memory probe (shared with the scheduler).
    pub fn memory_probe(&self) -> &Arc<MemoryProbe> {
        &self.probe
    }

    /// The progress tracker (for subscribing observers).
    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Requests cooperative cancellation of all running work.
    pub fn cancel(&self) {
        warn!("orchestrator cancellation requested");
        self.cancel.cancel();
    }

    /// Resets the cumulative statistics (component state is untouched).
    pub fn reset_statistics(&self) {
        *self.stats.lock() = EngineStats::default();
        if let Some(validator) = &self.security.validator {
            validator.reset_stats();
        }
        if let Some(limiter) = &self.security.rate_limiter {
            limiter.reset_stats();
        }
        self.tracker.clear_history();
        info!("statistics reset");
    }

    /// Flushes buffers and stops background tasks.
    pub fn cleanup(&self) {
        if let Some(audit) = &self.security.audit {
            audit.cleanup();
        }
        if let Some(cache) = &self.security.cache {
            cache.cleanup_expired();
        }
        if let Some(guard) = &self.security.guard {
            guard.force_cleanup();
            guard.shutdown();
        }
        info!("orchestrator cleanup complete");
    }
}

impl Drop for BatchOrchestrator {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_basic_mode_has_no_security_components() {
        let orchestrator = BatchOrchestrator::for_mode(ExecutionMode::Basic).unwrap();
        let status = orchestrator.security_status();
        assert!(!status.validator_enabled);
        assert!(!status.rate_limiter_enabled);
        assert!(!status.cache_enabled);
        assert!(!status.resource_guard_enabled);
        assert!(!status.audit_enabled);
    }

    #[tokio::test]
    async fn test_performance_mode_has_unencrypted_cache_only() {
        let orchestrator = BatchOrchestrator::for_mode(ExecutionMode::Performance).unwrap();
        let status = orchestrator.security_status();
        assert!(status.cache_enabled);
        assert!(!status.validator_enabled);
        assert!(!status.cache.unwrap().encryption_enabled);
    }

    #[tokio::test]
    async fn test_registered_custom_kind_is_invalid() {
        let orchestrator = BatchOrchestrator::for_mode(ExecutionMode::Basic).unwrap();
        let result = orchestrator
            .process_batch(
                vec![Document::from_payload("a")],
                Operation::Registered(OperationType::Custom),
                None,
                None,
            )
            .await;
        assert!(matches!(result, Err(BatchError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_register_operation_duplicate_rejected() {
        let orchestrator = BatchOrchestrator::for_mode(ExecutionMode::Basic).unwrap();
        let handler = Operation::custom(|_d, _p| Box::pin(async { Ok(json!(null)) }));
        let Operation::Custom(handler) = handler else {
            unreachable!()
        };

        // Defaults are pre-registered; plain re-registration fails
        assert!(orchestrator
            .register_operation(OperationType::Analyze, handler.clone(), false)
            .is_err());
        assert!(orchestrator
            .register_operation(OperationType::Analyze, handler, true)
            .is_ok());
    }

    #[tokio::test]
    async fn test_streaming_requires_performance_mode() {
        let orchestrator = BatchOrchestrator::for_mode(ExecutionMode::Basic).unwrap();
        let result = orchestrator.process_stream(
            vec![Document::from_payload("a")],
            Operation::Registered(OperationType::Validate),
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_metrics_surface_shape() {
        let orchestrator = BatchOrchestrator::for_mode(ExecutionMode::Basic).unwrap();
        let metrics = orchestrator.metrics();
        assert_eq!(metrics.counters.total_batches, 0);
        assert!(metrics.cache.is_none());

        let rendered = orchestrator.prometheus_metrics().unwrap();
        assert!(rendered.contains("docbatch"));
    }
}
