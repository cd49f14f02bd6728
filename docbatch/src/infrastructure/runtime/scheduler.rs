// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Scheduler
//!
//! The worker-pool loop that drains the priority queue through an operation
//! handler, applying the security envelope and backpressure.
//!
//! ## Loop skeleton (mode-agnostic)
//!
//! 1. **Admission plan**: worker count = tier default, clamped override
//!    allowed; progress record created.
//! 2. **Enqueue**: every document enters the queue (documents may
//!    pre-classify themselves via a `priority` attribute; default Normal).
//! 3. **Worker pool**: N parallel tasks take → envelope → guarded handler →
//!    cache store → progress update → audit, with retry classification on
//!    failure.
//! 4. **Backpressure**: every K completed items on compaction tiers the
//!    memory probe compacts, and at High/Critical pressure the worker
//!    sleeps 100 ms before its next take.
//! 5. **Completion**: when the queue is drained the progress record closes
//!    and the accumulated `BatchResult` is returned.
//!
//! Per-item failures never abort the batch. Every input document lands in
//! exactly one of processed / failed / skipped, including after
//! cancellation (unstarted items are drained into skip entries).
//!
//! ## Envelope (Secure / Enterprise)
//!
//! Validation → rate admission → cache probe (under the per-fingerprint
//! lock) → guarded invocation → output re-validation (Strict) → cache store
//! → audit. Rate-limit slots are released on every path; cache read errors
//! degrade silently to misses.

use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::memory_probe::MemoryProbe;
use crate::infrastructure::runtime::processing_queue::{ProcessingQueue, QueueConfig, QueueItem};
use crate::infrastructure::security::audit_log::{AuditEvent, AuditEventType, AuditLog, AuditSeverity};
use crate::infrastructure::security::rate_limiter::RateLimiter;
use crate::infrastructure::security::resource_guard::ResourceGuard;
use crate::infrastructure::security::secure_cache::{fingerprint, CacheStatus, SecureCache};
use crate::infrastructure::security::validator::InputValidator;
use crate::infrastructure::services::progress_tracker::ProgressTracker;
use docbatch_bootstrap::shutdown::CancellationToken;
use docbatch_domain::{
    BatchError, BatchResult, Document, ExecutionMode, HandlerError, ItemFailure, ItemOutcome, ItemStatus,
    OperationHandler, OperationId, OperationParams, OperationStatus, OperationType, Priority, SecurityContext,
    SecurityLevel, ThreatLevel, WorkerCount,
};
use futures::Stream;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Worker idle poll interval on `take`.
const TAKE_TIMEOUT: Duration = Duration::from_millis(50);

/// Backpressure sleep at High/Critical pressure.
const THROTTLE_SLEEP: Duration = Duration::from_millis(100);

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Execution mode (drives envelope and cache behavior)
    pub mode: ExecutionMode,
    /// Security preset (drives the latency histogram label and Strict
    /// output re-validation)
    pub security_level: SecurityLevel,
    /// Explicit worker-count override, clamped to `[1, 16]`
    pub concurrency_override: Option<usize>,
    /// Chunk size for the batch-grouping variant (`<= 1` disables it)
    pub batch_group_size: usize,
    /// Queue capacity
    pub queue_capacity: usize,
    /// Handler attempts budget per item
    pub max_attempts: u32,
    /// TTL for cached results
    pub cache_ttl: Duration,
    /// Completed items between compaction passes (K)
    pub compact_every: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Basic,
            security_level: SecurityLevel::Standard,
            concurrency_override: None,
            batch_group_size: 0,
            queue_capacity: crate::infrastructure::runtime::processing_queue::DEFAULT_MAX_SIZE,
            max_attempts: crate::infrastructure::runtime::processing_queue::DEFAULT_MAX_ATTEMPTS,
            cache_ttl: Duration::from_secs(3_600),
            compact_every: 10,
        }
    }
}

/// The security components wired into the envelope. All optional; the mode
/// decides which are present.
#[derive(Clone, Default)]
pub struct SecurityComponents {
    pub validator: Option<Arc<InputValidator>>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub cache: Option<Arc<SecureCache>>,
    pub guard: Option<Arc<ResourceGuard>>,
    pub audit: Option<Arc<AuditLog>>,
}

/// Accumulated per-batch tallies.
#[derive(Default)]
struct Accumulator {
    outcomes: Vec<ItemOutcome>,
    failures: Vec<ItemFailure>,
}

/// Everything a worker needs for one batch.
struct BatchContext {
    operation_id: OperationId,
    kind: OperationType,
    handler: Arc<dyn OperationHandler>,
    params: OperationParams,
    security_context: SecurityContext,
    acc: Mutex<Accumulator>,
    completed: AtomicUsize,
    cancel: CancellationToken,
    producer_done: AtomicBool,
    /// Whether a progress-tracker record exists for this run (streams have
    /// no known total and are untracked)
    tracked: bool,
    stream_tx: Option<tokio::sync::mpsc::Sender<ItemOutcome>>,
}

impl BatchContext {
    fn update_tracker(&self, tracker: &ProgressTracker, error: Option<String>) {
        if self.tracked {
            tracker.update(&self.operation_id, None, 1, error);
        }
    }
}

/// Worker-pool scheduler driving items through an operation.
pub struct BatchScheduler {
    config: SchedulerConfig,
    probe: Arc<MemoryProbe>,
    tracker: Arc<ProgressTracker>,
    metrics: Arc<MetricsService>,
    security: SecurityComponents,
    cancel: CancellationToken,
}

impl BatchScheduler {
    /// Creates a scheduler over the shared components.
    pub fn new(
        config: SchedulerConfig,
        probe: Arc<MemoryProbe>,
        tracker: Arc<ProgressTracker>,
        metrics: Arc<MetricsService>,
        security: SecurityComponents,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            probe,
            tracker,
            metrics,
            security,
            cancel,
        }
    }

    fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_size: self.config.queue_capacity,
            max_attempts: self.config.max_attempts,
        }
    }

    fn resolve_workers(&self) -> WorkerCount {
        WorkerCount::resolve(self.probe.tier(), self.config.concurrency_override)
    }

    /// Runs a full batch to completion.
    ///
    /// `batch_cancel` scopes cancellation to this batch; the orchestrator
    /// uses it for per-batch timeouts. The scheduler-wide token still
    /// cancels every batch.
    pub async fn run_batch(
        self: &Arc<Self>,
        kind: OperationType,
        handler: Arc<dyn OperationHandler>,
        documents: Vec<Document>,
        params: OperationParams,
        security_context: SecurityContext,
        batch_cancel: Option<CancellationToken>,
    ) -> Result<BatchResult, BatchError> {
        // A circuit already open at batch start fails the batch as a whole.
        if self.config.mode.needs_security() && ResourceGuard::circuit_open() {
            return Err(BatchError::circuit_open(
                "resource guard circuit open at batch start".to_string(),
            ));
        }

        let started = Instant::now();
        let operation_id = OperationId::new(kind);
        let total = documents.len();
        let workers = self.resolve_workers();

        self.tracker.start(operation_id.clone(), total)?;
        self.audit_batch_event(
            AuditEventType::BatchStart,
            AuditSeverity::Info,
            &operation_id,
            &security_context,
            format!("batch started: {} documents", total),
        );

        let batch = Arc::new(BatchContext {
            operation_id: operation_id.clone(),
            kind,
            handler,
            params,
            security_context,
            acc: Mutex::new(Accumulator::default()),
            completed: AtomicUsize::new(0),
            cancel: batch_cancel.unwrap_or_default(),
            producer_done: AtomicBool::new(true),
            tracked: true,
            stream_tx: None,
        });

        info!(
            operation = %operation_id,
            total,
            workers = workers.count(),
            tier = %self.probe.tier(),
            mode = %self.config.mode,
            "batch admission plan"
        );

        for chunk in self.partition(documents) {
            if batch.cancel.is_cancelled() || self.cancel.is_cancelled() {
                // Unstarted chunks become skip entries.
                let mut acc = batch.acc.lock();
                for document in chunk {
                    acc.failures.push(cancelled_failure(&document));
                }
                continue;
            }
            self.execute_chunk(&batch, chunk).await;
        }

        let cancelled = batch.cancel.is_cancelled() || self.cancel.is_cancelled();

        // Assemble the result.
        let accumulator = {
            let mut acc = batch.acc.lock();
            std::mem::take(&mut *acc)
        };

        let mut result = BatchResult::new(operation_id.clone(), kind, total);
        result.processed = accumulator.outcomes.len()
            + accumulator.failures.iter().filter(|f| f.status == ItemStatus::Failed).count();
        result.failed = accumulator.failures.iter().filter(|f| f.status == ItemStatus::Failed).count();
        result.skipped = accumulator.failures.iter().filter(|f| f.status == ItemStatus::Skipped).count();
        result.results = accumulator.outcomes;
        result.errors = accumulator.failures;
        result.elapsed = started.elapsed();
        result
            .metadata
            .insert("mode".to_string(), self.config.mode.to_string());
        result
            .metadata
            .insert("workers".to_string(), workers.count().to_string());
        result
            .metadata
            .insert("memory_tier".to_string(), self.probe.tier().to_string());

        let status = if cancelled {
            OperationStatus::Cancelled
        } else {
            OperationStatus::Completed
        };
        self.tracker.complete(&operation_id, status);
        self.metrics.record_batch_completion(&result);

        let (event_type, severity) = if cancelled {
            (AuditEventType::BatchCancelled, AuditSeverity::Warning)
        } else if result.failed == 0 {
            (AuditEventType::BatchSuccess, AuditSeverity::Info)
        } else {
            (AuditEventType::BatchFailure, AuditSeverity::Warning)
        };
        self.audit_batch_event(
            event_type,
            severity,
            &operation_id,
            &batch.security_context,
            format!(
                "batch finished: {} processed, {} failed, {} skipped",
                result.processed, result.failed, result.skipped
            ),
        );

        Ok(result)
    }

    /// Runs the streaming variant: results are yielded as items complete,
    /// in arbitrary order. Backpressure is implicit through the queue's
    /// bounded capacity and the output channel.
    pub fn run_stream<I>(
        self: &Arc<Self>,
        kind: OperationType,
        handler: Arc<dyn OperationHandler>,
        documents: I,
        params: OperationParams,
        security_context: SecurityContext,
    ) -> impl Stream<Item = ItemOutcome>
    where
        I: IntoIterator<Item = Document>,
        I::IntoIter: Send + 'static,
    {
        let workers = self.resolve_workers();
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ItemOutcome>(workers.count() * 2);
        let operation_id = OperationId::new(kind);

        let batch = Arc::new(BatchContext {
            operation_id: operation_id.clone(),
            kind,
            handler,
            params,
            security_context,
            acc: Mutex::new(Accumulator::default()),
            completed: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            producer_done: AtomicBool::new(false),
            tracked: false,
            stream_tx: Some(tx),
        });

        let queue = Arc::new(ProcessingQueue::new(self.queue_config()));

        // Producer: lazy enqueue with implicit backpressure.
        {
            let queue = queue.clone();
            let batch = batch.clone();
            let scheduler = self.clone();
            let mut documents = documents.into_iter();
            tokio::spawn(async move {
                for document in documents.by_ref() {
                    if batch.cancel.is_cancelled() || scheduler.cancel.is_cancelled() {
                        break;
                    }
                    let priority = document_priority(&document);
                    if let Err(e) = queue.enqueue_wait(document, priority).await {
                        warn!("stream enqueue failed: {}", e);
                        break;
                    }
                }
                batch.producer_done.store(true, Ordering::SeqCst);
            });
        }

        // Worker pool.
        let mut worker_handles = Vec::with_capacity(workers.count());
        for _ in 0..workers.count() {
            let scheduler = self.clone();
            let queue = queue.clone();
            let batch = batch.clone();
            worker_handles.push(tokio::spawn(async move {
                scheduler.worker_loop(&queue, &batch).await;
            }));
        }

        // Close the channel when every worker has exited.
        {
            let batch = batch.clone();
            tokio::spawn(async move {
                for handle in worker_handles {
                    let _ = handle.await;
                }
                // Dropping the context's sender ends the stream.
                drop(batch);
            });
        }

        async_stream::stream! {
            while let Some(outcome) = rx.recv().await {
                yield outcome;
            }
        }
    }

    /// Partitions documents into chunks for the grouping variant.
    ///
    /// Documents sharing a `group` attribute are kept adjacent; otherwise
    /// input order is preserved. Per-item semantics are unchanged.
    fn partition(&self, documents: Vec<Document>) -> Vec<Vec<Document>> {
        let group_size = self.config.batch_group_size;
        let grouping_active =
            self.config.mode.needs_performance() && group_size > 1 && documents.len() > group_size;

        if !grouping_active {
            return vec![documents];
        }

        let mut ordered = documents;
        // Stable sort: ungrouped documents keep input order among
        // themselves.
        ordered.sort_by_key(|d| d.attribute("group").map(str::to_string));

        let mut chunks = Vec::new();
        let mut current = Vec::with_capacity(group_size);
        for document in ordered {
            current.push(document);
            if current.len() == group_size {
                chunks.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        debug!(chunks = chunks.len(), "batch grouping active");
        chunks
    }

    /// Drives one chunk through a fresh queue and worker pool.
    async fn execute_chunk(self: &Arc<Self>, batch: &Arc<BatchContext>, documents: Vec<Document>) {
        let queue = Arc::new(ProcessingQueue::new(self.queue_config()));

        for document in documents {
            let priority = document_priority(&document);
            if let Err(e) = queue.enqueue(document.clone(), priority) {
                // QueueFull is a synchronous enqueue failure; the item is
                // accounted as skipped and never retried.
                let mut acc = batch.acc.lock();
                acc.failures.push(ItemFailure {
                    document_id: document.id().to_string(),
                    status: ItemStatus::Skipped,
                    category: e.category().to_string(),
                    error: e.to_string(),
                    violations: vec![],
                    threat_level: ThreatLevel::None,
                    attempts: 0,
                });
                batch.update_tracker(&self.tracker, Some(e.to_string()));
            }
        }

        let workers = self.resolve_workers();
        let mut handles = Vec::with_capacity(workers.count());
        for _ in 0..workers.count() {
            let scheduler = self.clone();
            let queue = queue.clone();
            let batch = batch.clone();
            handles.push(tokio::spawn(async move {
                scheduler.worker_loop(&queue, &batch).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        // Cancellation accounting: unstarted items become skip entries.
        if batch.cancel.is_cancelled() || self.cancel.is_cancelled() {
            for item in queue.drain_pending() {
                let failure = cancelled_failure(&item.document);
                batch.update_tracker(&self.tracker, Some(failure.error.clone()));
                batch.acc.lock().failures.push(failure);
            }
        }
    }

    /// One worker's take-process loop.
    async fn worker_loop(self: &Arc<Self>, queue: &Arc<ProcessingQueue>, batch: &Arc<BatchContext>) {
        self.metrics.worker_started();

        loop {
            if batch.cancel.is_cancelled() || self.cancel.is_cancelled() {
                queue.close();
                break;
            }

            match queue.take(Some(TAKE_TIMEOUT)).await {
                Some(item) => {
                    self.process_item(queue, batch, item).await;
                    self.backpressure_pause(batch).await;
                }
                None => {
                    let producer_done = batch.producer_done.load(Ordering::SeqCst);
                    if queue.is_closed() || (producer_done && queue.is_drained()) {
                        break;
                    }
                }
            }
        }

        self.metrics.worker_finished();
    }

    /// Processes one queue item through the (mode-dependent) envelope.
    async fn process_item(self: &Arc<Self>, queue: &Arc<ProcessingQueue>, batch: &Arc<BatchContext>, item: QueueItem) {
        let started = Instant::now();
        let mut document = item.document.clone();
        let user = batch.security_context.user_id();
        let ip = batch.security_context.ip_address();
        let isolation = batch.security_context.isolation_key().to_string();
        let mut rate_admitted = false;

        // === Security envelope: input validation ===
        if self.config.mode.needs_security() {
            if let Some(validator) = &self.security.validator {
                let validation = validator.validate(&document);
                if validation.threat_level >= ThreatLevel::High {
                    self.audit_item_event(
                        batch,
                        AuditEventType::ValidationFailure,
                        AuditSeverity::Warning,
                        &document,
                        format!("input rejected: {}", validation.violations.join("; ")),
                        Some(validation.threat_level),
                    );
                    queue.mark_failed(item.id, false);
                    self.record_skip(
                        batch,
                        &document,
                        "validation",
                        "input validation rejected payload",
                        validation.violations,
                        validation.threat_level,
                    )
                    .await;
                    self.finish_item(started, rate_admitted, user, ip);
                    return;
                }
                if validation.threat_level.is_sanitizable() {
                    if let Some(sanitized) = validation.sanitized {
                        document.set_payload(sanitized);
                    }
                }
            }

            // === Security envelope: rate admission ===
            if let Some(limiter) = &self.security.rate_limiter {
                let cost = batch
                    .params
                    .get("cost")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                let decision = limiter.check(user, ip, batch.kind.as_str(), cost, document.payload_size());
                if !decision.allowed {
                    self.metrics.record_rate_limit_block();
                    self.audit_item_event(
                        batch,
                        AuditEventType::RateLimitExceeded,
                        AuditSeverity::Warning,
                        &document,
                        format!("rate limited: {}", decision.violations.join("; ")),
                        Some(ThreatLevel::Medium),
                    );
                    queue.mark_failed(item.id, false);
                    self.record_skip(
                        batch,
                        &document,
                        "rate_limit",
                        "rate limited",
                        decision.violations,
                        ThreatLevel::Medium,
                    )
                    .await;
                    self.finish_item(started, rate_admitted, user, ip);
                    return;
                }
                rate_admitted = true;
            }
        }

        // === Cache probe (any mode with a cache) ===
        let cache_key = self
            .security
            .cache
            .as_ref()
            .map(|_| fingerprint(user, document.payload()));

        let mut in_flight_guard = None;
        if let (Some(cache), Some(key)) = (&self.security.cache, &cache_key) {
            // At most one handler per fingerprint: hold the key lock across
            // probe, invoke, and store.
            let lock = cache.key_lock(key, &isolation);
            in_flight_guard = Some(lock.lock_owned().await);

            match cache.get(key, &isolation) {
                (Some(value), CacheStatus::Hit) => {
                    self.metrics.record_cache_hit();
                    self.audit_item_event(
                        batch,
                        AuditEventType::CacheHit,
                        AuditSeverity::Info,
                        &document,
                        "cache_hit".to_string(),
                        None,
                    );
                    queue.mark_completed(item.id);
                    self.record_success(batch, &document, value, true).await;
                    self.finish_item(started, rate_admitted, user, ip);
                    return;
                }
                (_, CacheStatus::Poisoned | CacheStatus::Invalid | CacheStatus::Error) => {
                    // Degrades silently to a miss for reads.
                    self.metrics.record_cache_miss();
                }
                _ => self.metrics.record_cache_miss(),
            }
        }

        // === Resource-guarded invocation ===
        let invocation = {
            let handler = batch.handler.clone();
            let document = document.clone();
            let params = batch.params.clone();
            async move { Ok::<_, BatchError>(handler.execute(&document, &params).await) }
        };

        let guarded = self.config.mode.needs_security();
        let outcome: Result<Result<serde_json::Value, HandlerError>, BatchError> =
            if let (true, Some(guard)) = (guarded, &self.security.guard) {
                let label = format!("{}:{}", batch.kind, document.id());
                guard.run(&label, invocation).await
            } else {
                invocation.await
            };

        match outcome {
            // Guard-terminated or circuit-rejected: fatal, never retried.
            Err(guard_error) => {
                self.metrics.record_guard_violation();
                self.audit_item_event(
                    batch,
                    AuditEventType::ResourceViolation,
                    AuditSeverity::Error,
                    &document,
                    guard_error.to_string(),
                    Some(ThreatLevel::High),
                );
                queue.mark_failed(item.id, false);
                self.record_failure(batch, &document, &guard_error, item.attempts + 1).await;
                if let Some(limiter) = &self.security.rate_limiter {
                    limiter.record_outcome(user, ip, false);
                }
            }

            // Handler error: retry when classified retryable and attempts
            // remain; otherwise permanent failure.
            Ok(Err(handler_error)) => {
                let retryable = handler_error.is_retryable();
                if retryable && queue.mark_failed(item.id, true) {
                    debug!(
                        document = document.id(),
                        attempt = item.attempts + 1,
                        "retryable failure, item re-enqueued"
                    );
                } else {
                    if !retryable {
                        queue.mark_failed(item.id, false);
                    }
                    let error = BatchError::handler_failure(handler_error.to_string());
                    self.audit_item_event(
                        batch,
                        AuditEventType::ItemFailure,
                        AuditSeverity::Warning,
                        &document,
                        error.to_string(),
                        None,
                    );
                    self.record_failure(batch, &document, &error, item.attempts + 1).await;
                    if let Some(limiter) = &self.security.rate_limiter {
                        limiter.record_outcome(user, ip, false);
                    }
                }
            }

            Ok(Ok(mut value)) => {
                // === Output validation (Strict and above) ===
                let mut output_rejected = false;
                if self.config.security_level.is_strict() {
                    if let Some(validator) = &self.security.validator {
                        if let serde_json::Value::String(text) = &value {
                            let check = validator.validate_content(text, None);
                            if check.threat_level >= ThreatLevel::High {
                                output_rejected = true;
                                let error =
                                    BatchError::validation_failure("handler output rejected by validator");
                                self.audit_item_event(
                                    batch,
                                    AuditEventType::ValidationFailure,
                                    AuditSeverity::Warning,
                                    &document,
                                    error.to_string(),
                                    Some(check.threat_level),
                                );
                                queue.mark_failed(item.id, false);
                                self.record_failure(batch, &document, &error, item.attempts + 1).await;
                            } else if let Some(sanitized) = check.sanitized {
                                value = serde_json::Value::String(sanitized);
                            }
                        }
                    }
                }

                if !output_rejected {
                    // === Cache store ===
                    if let (Some(cache), Some(key)) = (&self.security.cache, &cache_key) {
                        if !cache.put(key, &value, Some(self.config.cache_ttl), &isolation) {
                            // Degrades to uncached; the failure is audited.
                            self.audit_item_event(
                                batch,
                                AuditEventType::CachePoisoningDetected,
                                AuditSeverity::Warning,
                                &document,
                                "cache store rejected".to_string(),
                                None,
                            );
                        }
                    }

                    self.audit_item_event(
                        batch,
                        AuditEventType::ItemSuccess,
                        AuditSeverity::Info,
                        &document,
                        "item processed".to_string(),
                        None,
                    );
                    queue.mark_completed(item.id);
                    self.record_success(batch, &document, value, false).await;
                    if let Some(limiter) = &self.security.rate_limiter {
                        limiter.record_outcome(user, ip, true);
                    }
                }
            }
        }

        drop(in_flight_guard);
        self.finish_item(started, rate_admitted, user, ip);
    }

    /// Always-run per-item epilogue: release the rate slot and record the
    /// latency sample.
    fn finish_item(&self, started: Instant, rate_admitted: bool, user: Option<&str>, ip: Option<&str>) {
        if rate_admitted {
            if let Some(limiter) = &self.security.rate_limiter {
                limiter.release(user, ip);
            }
        }
        self.metrics
            .record_item_duration(self.config.security_level.as_str(), started.elapsed());
    }

    /// Backpressure: compaction and throttling on memory-constrained tiers.
    async fn backpressure_pause(&self, batch: &BatchContext) {
        let completed = batch.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.probe.tier().wants_compaction() {
            return;
        }
        if completed % self.config.compact_every.max(1) != 0 {
            return;
        }

        self.probe.compact();
        let pressure = self.probe.pressure();
        self.metrics.set_memory_pressure(pressure);
        if pressure.should_throttle() {
            debug!(pressure = %pressure, "memory pressure throttle");
            tokio::time::sleep(THROTTLE_SLEEP).await;
        }
    }

    async fn record_success(&self, batch: &BatchContext, document: &Document, value: serde_json::Value, from_cache: bool) {
        let outcome = ItemOutcome {
            document_id: document.id().to_string(),
            status: ItemStatus::Success,
            result: value,
            from_cache,
            completed_at: chrono::Utc::now(),
        };
        batch.acc.lock().outcomes.push(outcome.clone());
        batch.update_tracker(&self.tracker, None);
        if let Some(tx) = &batch.stream_tx {
            let _ = tx.send(outcome).await;
        }
    }

    async fn record_failure(&self, batch: &BatchContext, document: &Document, error: &BatchError, attempts: u32) {
        let failure = ItemFailure {
            document_id: document.id().to_string(),
            status: ItemStatus::Failed,
            category: error.category().to_string(),
            error: error.to_string(),
            violations: vec![],
            threat_level: ThreatLevel::None,
            attempts,
        };
        batch.acc.lock().failures.push(failure);
        batch.update_tracker(&self.tracker, Some(error.to_string()));
        if let Some(tx) = &batch.stream_tx {
            let _ = tx
                .send(ItemOutcome {
                    document_id: document.id().to_string(),
                    status: ItemStatus::Failed,
                    result: serde_json::json!({ "error": error.to_string() }),
                    from_cache: false,
                    completed_at: chrono::Utc::now(),
                })
                .await;
        }
    }

    async fn record_skip(
        &self,
        batch: &BatchContext,
        document: &Document,
        category: &str,
        error: &str,
        violations: Vec<String>,
        threat_level: ThreatLevel,
    ) {
        let failure = ItemFailure {
            document_id: document.id().to_string(),
            status: ItemStatus::Skipped,
            category: category.to_string(),
            error: error.to_string(),
            violations,
            threat_level,
            attempts: 0,
        };
        batch.acc.lock().failures.push(failure);
        batch.update_tracker(&self.tracker, Some(error.to_string()));
        if let Some(tx) = &batch.stream_tx {
            let _ = tx
                .send(ItemOutcome {
                    document_id: document.id().to_string(),
                    status: ItemStatus::Skipped,
                    result: serde_json::json!({ "error": error }),
                    from_cache: false,
                    completed_at: chrono::Utc::now(),
                })
                .await;
        }
    }

    fn audit_item_event(
        &self,
        batch: &BatchContext,
        event_type: AuditEventType,
        severity: AuditSeverity,
        document: &Document,
        message: String,
        threat_level: Option<ThreatLevel>,
    ) {
        let Some(audit) = &self.security.audit else {
            return;
        };
        let mut event = AuditEvent::new(event_type, severity, message)
            .with_subject(
                batch.security_context.user_id(),
                batch.security_context.ip_address(),
            )
            .with_operation(batch.kind.as_str())
            .with_metadata("document_id", serde_json::json!(document.id()))
            .with_metadata("operation_id", serde_json::json!(batch.operation_id.as_str()));
        if let Some(level) = threat_level {
            event = event.with_threat_level(level);
        }
        self.metrics.record_audit_event(severity.as_str());
        audit.log(event);
    }

    fn audit_batch_event(
        &self,
        event_type: AuditEventType,
        severity: AuditSeverity,
        operation_id: &OperationId,
        security_context: &SecurityContext,
        message: String,
    ) {
        let Some(audit) = &self.security.audit else {
            return;
        };
        let event = AuditEvent::new(event_type, severity, message)
            .with_subject(security_context.user_id(), security_context.ip_address())
            .with_operation(security_context.operation())
            .with_metadata("operation_id", serde_json::json!(operation_id.as_str()));
        self.metrics.record_audit_event(severity.as_str());
        audit.log(event);
    }

    /// The orchestrator-wide cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Priority pre-classification via the document's `priority` attribute.
fn document_priority(document: &Document) -> Priority {
    document
        .attribute("priority")
        .and_then(|p| Priority::from_str(p).ok())
        .unwrap_or_default()
}

fn cancelled_failure(document: &Document) -> ItemFailure {
    ItemFailure {
        document_id: document.id().to_string(),
        status: ItemStatus::Skipped,
        category: "cancellation".to_string(),
        error: "batch cancelled before processing".to_string(),
        violations: vec![],
        threat_level: ThreatLevel::None,
        attempts: 0,
    }
}
