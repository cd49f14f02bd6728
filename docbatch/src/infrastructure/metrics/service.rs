// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus-backed metrics for the batch engine. One registry per
//! orchestrator instance; the orchestrator's `metrics()` surface combines
//! these series with per-component statistics structs.
//!
//! ## Series
//!
//! - `docbatch_batches_total{kind}` / `docbatch_batch_duration_seconds`
//! - `docbatch_items_processed_total` / `_failed_total` / `_skipped_total`
//! - `docbatch_item_duration_seconds{profile}`: per-profile latency
//!   histogram
//! - `docbatch_cache_hits_total` / `docbatch_cache_misses_total`
//! - `docbatch_rate_limit_blocks_total`
//! - `docbatch_guard_violations_total`
//! - `docbatch_audit_events_total{severity}`
//! - `docbatch_memory_pressure_level` (0 = Low .. 3 = Critical)
//! - `docbatch_active_workers`
//! - `docbatch_throughput_docs_per_second`

use docbatch_domain::{BatchError, BatchResult, MemoryPressure};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const NAMESPACE: &str = "docbatch";

/// Prometheus metrics for one engine instance.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // Batch execution metrics
    batches_total: IntCounterVec,
    batch_duration_seconds: Histogram,
    items_processed_total: IntCounter,
    items_failed_total: IntCounter,
    items_skipped_total: IntCounter,
    item_duration_seconds: HistogramVec,

    // Security envelope metrics
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
    rate_limit_blocks_total: IntCounter,
    guard_violations_total: IntCounter,
    audit_events_total: IntCounterVec,

    // Runtime gauges
    memory_pressure_level: IntGauge,
    active_workers: IntGauge,
    throughput_docs_per_second: Gauge,
}

impl MetricsService {
    /// Create a new MetricsService with its own Prometheus registry
    pub fn new() -> Result<Self, BatchError> {
        let registry = Registry::new();

        let batches_total = IntCounterVec::new(
            Opts::new("batches_total", "Total batches processed, by operation kind").namespace(NAMESPACE),
            &["kind"],
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create batches_total metric: {}", e)))?;

        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("batch_duration_seconds", "Wall-clock time per batch")
                .namespace(NAMESPACE)
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create batch_duration_seconds metric: {}", e)))?;

        let items_processed_total = IntCounter::with_opts(
            Opts::new("items_processed_total", "Total items attempted (successes and failures)").namespace(NAMESPACE),
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create items_processed_total metric: {}", e)))?;

        let items_failed_total =
            IntCounter::with_opts(Opts::new("items_failed_total", "Total items terminally failed").namespace(NAMESPACE))
                .map_err(|e| BatchError::metrics_error(format!("Failed to create items_failed_total metric: {}", e)))?;

        let items_skipped_total = IntCounter::with_opts(
            Opts::new("items_skipped_total", "Total items rejected before the handler ran").namespace(NAMESPACE),
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create items_skipped_total metric: {}", e)))?;

        let item_duration_seconds = HistogramVec::new(
            HistogramOpts::new("item_duration_seconds", "Per-item processing latency, by security profile")
                .namespace(NAMESPACE)
                .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["profile"],
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create item_duration_seconds metric: {}", e)))?;

        let cache_hits_total =
            IntCounter::with_opts(Opts::new("cache_hits_total", "Secure-cache hits").namespace(NAMESPACE))
                .map_err(|e| BatchError::metrics_error(format!("Failed to create cache_hits_total metric: {}", e)))?;

        let cache_misses_total =
            IntCounter::with_opts(Opts::new("cache_misses_total", "Secure-cache misses").namespace(NAMESPACE))
                .map_err(|e| BatchError::metrics_error(format!("Failed to create cache_misses_total metric: {}", e)))?;

        let rate_limit_blocks_total = IntCounter::with_opts(
            Opts::new("rate_limit_blocks_total", "Admissions denied by the rate limiter").namespace(NAMESPACE),
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create rate_limit_blocks_total metric: {}", e)))?;

        let guard_violations_total = IntCounter::with_opts(
            Opts::new("guard_violations_total", "Resource-guard violations").namespace(NAMESPACE),
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create guard_violations_total metric: {}", e)))?;

        let audit_events_total = IntCounterVec::new(
            Opts::new("audit_events_total", "Audit events written, by severity").namespace(NAMESPACE),
            &["severity"],
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create audit_events_total metric: {}", e)))?;

        let memory_pressure_level = IntGauge::with_opts(
            Opts::new("memory_pressure_level", "Current memory pressure (0=low .. 3=critical)").namespace(NAMESPACE),
        )
        .map_err(|e| BatchError::metrics_error(format!("Failed to create memory_pressure_level metric: {}", e)))?;

        let active_workers =
            IntGauge::with_opts(Opts::new("active_workers", "Workers currently running").namespace(NAMESPACE))
                .map_err(|e| BatchError::metrics_error(format!("Failed to create active_workers metric: {}", e)))?;

        let throughput_docs_per_second = Gauge::with_opts(
            Opts::new("throughput_docs_per_second", "Most recent batch throughput").namespace(NAMESPACE),
        )
        .map_err(|e| {
            BatchError::metrics_error(format!("Failed to create throughput_docs_per_second metric: {}", e))
        })?;

        // Register all metrics
        registry
            .register(Box::new(batches_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register batches_total: {}", e)))?;
        registry
            .register(Box::new(batch_duration_seconds.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register batch_duration_seconds: {}", e)))?;
        registry
            .register(Box::new(items_processed_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register items_processed_total: {}", e)))?;
        registry
            .register(Box::new(items_failed_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register items_failed_total: {}", e)))?;
        registry
            .register(Box::new(items_skipped_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register items_skipped_total: {}", e)))?;
        registry
            .register(Box::new(item_duration_seconds.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register item_duration_seconds: {}", e)))?;
        registry
            .register(Box::new(cache_hits_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register cache_hits_total: {}", e)))?;
        registry
            .register(Box::new(cache_misses_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register cache_misses_total: {}", e)))?;
        registry
            .register(Box::new(rate_limit_blocks_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register rate_limit_blocks_total: {}", e)))?;
        registry
            .register(Box::new(guard_violations_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register guard_violations_total: {}", e)))?;
        registry
            .register(Box::new(audit_events_total.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register audit_events_total: {}", e)))?;
        registry
            .register(Box::new(memory_pressure_level.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register memory_pressure_level: {}", e)))?;
        registry
            .register(Box::new(active_workers.clone()))
            .map_err(|e| BatchError::metrics_error(format!("Failed to register active_workers: {}", e)))?;
        registry
            .register(Box::new(throughput_docs_per_second.clone()))
            .map_err(|e| {
                BatchError::metrics_error(format!("Failed to register throughput_docs_per_second: {}", e))
            })?;

        debug!("MetricsService initialized with Prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            batches_total,
            batch_duration_seconds,
            items_processed_total,
            items_failed_total,
            items_skipped_total,
            item_duration_seconds,
            cache_hits_total,
            cache_misses_total,
            rate_limit_blocks_total,
            guard_violations_total,
            audit_events_total,
            memory_pressure_level,
            active_workers,
            throughput_docs_per_second,
        })
    }

    /// Record the completion of a whole batch
    pub fn record_batch_completion(&self, result: &BatchResult) {
        self.batches_total.with_label_values(&[result.kind.as_str()]).inc();
        self.batch_duration_seconds.observe(result.elapsed.as_secs_f64());
        self.items_processed_total.inc_by(result.processed as u64);
        self.items_failed_total.inc_by(result.failed as u64);
        self.items_skipped_total.inc_by(result.skipped as u64);
        self.throughput_docs_per_second.set(result.throughput());
    }

    /// Record one item's processing latency under a profile label
    pub fn record_item_duration(&self, profile: &str, duration: Duration) {
        self.item_duration_seconds
            .with_label_values(&[profile])
            .observe(duration.as_secs_f64());
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    /// Record a rate-limit denial
    pub fn record_rate_limit_block(&self) {
        self.rate_limit_blocks_total.inc();
    }

    /// Record a resource-guard violation
    pub fn record_guard_violation(&self) {
        self.guard_violations_total.inc();
    }

    /// Record an audit event write
    pub fn record_audit_event(&self, severity: &str) {
        self.audit_events_total.with_label_values(&[severity]).inc();
    }

    /// Update the memory-pressure gauge
    pub fn set_memory_pressure(&self, pressure: MemoryPressure) {
        self.memory_pressure_level.set(pressure as i64);
    }

    /// Track a worker entering its loop
    pub fn worker_started(&self) {
        self.active_workers.inc();
    }

    /// Track a worker leaving its loop
    pub fn worker_finished(&self) {
        self.active_workers.dec();
    }

    /// Current cache hit ratio across this instance's lifetime
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits_total.get() as f64;
        let misses = self.cache_misses_total.get() as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    /// Current rate-limit block ratio against attempted items
    pub fn rate_limit_block_ratio(&self) -> f64 {
        let blocks = self.rate_limit_blocks_total.get() as f64;
        let attempts = (self.items_processed_total.get() + self.items_skipped_total.get()) as f64;
        if attempts == 0.0 {
            0.0
        } else {
            blocks / attempts
        }
    }

    /// Render all series in Prometheus text exposition format
    pub fn gather(&self) -> Result<String, BatchError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| BatchError::metrics_error(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| BatchError::metrics_error(format!("Invalid UTF-8 in metrics: {}", e)))
    }

    /// The underlying registry (for embedding in a host exporter)
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbatch_domain::{OperationId, OperationType};

    fn sample_result() -> BatchResult {
        let mut result = BatchResult::new(OperationId::new(OperationType::Analyze), OperationType::Analyze, 10);
        result.processed = 8;
        result.failed = 1;
        result.skipped = 2;
        result.elapsed = Duration::from_secs(4);
        result
    }

    #[test]
    fn test_batch_completion_updates_counters() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_batch_completion(&sample_result());

        assert_eq!(metrics.items_processed_total.get(), 8);
        assert_eq!(metrics.items_failed_total.get(), 1);
        assert_eq!(metrics.items_skipped_total.get(), 2);
        assert_eq!(metrics.batches_total.with_label_values(&["analyze"]).get(), 1);
    }

    #[test]
    fn test_cache_hit_ratio() {
        let metrics = MetricsService::new().unwrap();
        assert_eq!(metrics.cache_hit_ratio(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert!((metrics.cache_hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_gather_renders_exposition_format() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_batch_completion(&sample_result());
        metrics.record_item_duration("standard", Duration::from_millis(25));

        let text = metrics.gather().unwrap();
        assert!(text.contains("docbatch_items_processed_total"));
        assert!(text.contains("docbatch_item_duration_seconds"));
    }

    #[test]
    fn test_worker_gauge_balances() {
        let metrics = MetricsService::new().unwrap();
        metrics.worker_started();
        metrics.worker_started();
        metrics.worker_finished();
        assert_eq!(metrics.active_workers.get(), 1);
    }
}
