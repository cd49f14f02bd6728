// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DocBatch
//!
//! A memory-aware batch execution core for document-processing pipelines.
//! The engine accepts a heterogeneous stream of documents, dispatches each
//! through a pluggable per-item operation, and returns aggregate results
//! while respecting memory, concurrency, and security constraints.
//!
//! ## Architecture Overview
//!
//! ```text
//! caller
//!   └─ BatchOrchestrator          (mode selection, registry, metrics)
//!        └─ BatchScheduler        (worker pool over the priority queue)
//!             ├─ ProcessingQueue  (multi-band FIFO, retries, backpressure)
//!             ├─ MemoryProbe      (tier → worker count, pressure → throttle)
//!             ├─ ProgressTracker  (counters, ETA, event fan-out)
//!             └─ security envelope (Secure / Enterprise)
//!                  ├─ InputValidator   (threat classification, sanitization)
//!                  ├─ RateLimiter      (buckets, windows, circuit breakers)
//!                  ├─ SecureCache      (encrypted, isolated, TTL-bounded)
//!                  ├─ ResourceGuard    (wall/CPU/memory limits, breaker)
//!                  └─ AuditLog         (HMAC-signed journal, PII masking)
//! ```
//!
//! ## Execution Modes
//!
//! - **Basic**: scheduler + queue + memory probe + progress tracker
//! - **Performance**: Basic + result cache (no encryption) + batch grouping
//!   + streaming
//! - **Secure**: Basic + the full security envelope with an encrypted cache
//! - **Enterprise**: Performance ∪ Secure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docbatch::application::services::BatchOrchestrator;
//! use docbatch_domain::{Document, ExecutionMode, Operation, OperationType};
//!
//! # async fn example() -> Result<(), docbatch_domain::BatchError> {
//! let engine = BatchOrchestrator::for_mode(ExecutionMode::Basic)?;
//!
//! let documents = vec![Document::from_payload("a"), Document::from_payload("b")];
//! let result = engine
//!     .process_batch(documents, Operation::Registered(OperationType::Analyze), None, None)
//!     .await?;
//!
//! assert_eq!(result.processed, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - **Totality**: every input document lands in exactly one of
//!   processed / failed / skipped.
//! - **Priority admission**: the queue drains Critical > High > Normal >
//!   Low, FIFO within a band.
//! - **Retry bound**: no item's handler runs more than `max_attempts`
//!   times.
//! - **Cache isolation**: distinct isolation keys cannot observe each
//!   other's entries.
//! - **Audit integrity**: every journal line verifies against its trailing
//!   HMAC; tampering invalidates that line only.

pub mod application;
pub mod infrastructure;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

// Re-export domain types for convenient access
pub use docbatch_domain::{
    BatchError, BatchResult, Document, ExecutionMode, HandlerError, ItemOutcome, ItemStatus, MemoryPressure,
    MemoryTier, Operation, OperationHandler, OperationParams, OperationType, Priority, SecurityContext,
    SecurityLevel, ThreatLevel, WorkerCount,
};

// Re-export the public entry points
pub use application::services::{BatchOrchestrator, EngineMetrics, OrchestratorConfig, SecurityStatus};
