// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DocBatch Domain
//!
//! Pure domain layer for the batch execution engine: the types and contracts
//! shared by every component, free of I/O and runtime concerns.
//!
//! ## Contents
//!
//! - **Entities**: [`Document`], [`SecurityContext`], [`BatchResult`],
//!   [`OperationProgress`]: objects with identity and lifecycle
//! - **Value Objects**: identities, [`Priority`], [`OperationType`],
//!   [`ThreatLevel`], [`ExecutionMode`], [`SecurityLevel`], [`MemoryTier`],
//!   [`MemoryPressure`], [`WorkerCount`]: immutable, validated values
//! - **Events**: progress notifications and the observer contract
//! - **Services**: the operation-handler port and the PII-detection
//!   capability
//! - **Errors**: the [`BatchError`] taxonomy used across all layers
//!
//! ## Layering
//!
//! This crate depends on nothing async and performs no I/O. The application
//! crate (`docbatch`) implements the runtime, the security envelope, and
//! all infrastructure against these types; the bootstrap crate
//! (`docbatch-bootstrap`) supplies platform facts the runtime consumes.

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod value_objects;

// Re-export the types that make up the public vocabulary of the engine.
pub use entities::{
    BatchResult, Document, ItemFailure, ItemOutcome, ItemStatus, OperationProgress, OperationStatus, Permission,
    SecurityClearance, SecurityContext,
};
pub use error::BatchError;
pub use events::{ProgressEvent, ProgressEventKind, ProgressObserver};
pub use services::{
    FnHandler, HandlerError, HandlerFuture, Operation, OperationHandler, OperationParams, PiiDetection, PiiDetector,
    PiiKind,
};
pub use value_objects::{
    ExecutionMode, ItemId, MemoryPressure, MemoryTier, OperationId, OperationType, Priority, SecurityLevel,
    ThreatLevel, WorkerCount,
};
