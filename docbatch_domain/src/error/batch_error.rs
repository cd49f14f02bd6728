// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the batch
//! processing domain. It categorizes failures, provides actionable error
//! messages, and supports both automated retry decisions and human-readable
//! diagnostics.
//!
//! ## Error Architecture
//!
//! Errors are organized into logical categories:
//!
//! #### Admission Errors
//! - **QueueFull**: The processing queue rejected an enqueue
//! - **RateLimited**: An admission request was denied by the rate limiter
//! - **CircuitOpen**: The resource-guard circuit breaker is in cool-down
//!
//! #### Per-Item Errors
//! - **ValidationFailure**: Input validation classified the payload as a
//!   threat
//! - **HandlerFailure**: The registered operation raised an error
//! - **ResourceExhausted**: The resource guard terminated the operation
//! - **TimeoutError**: An operation exceeded its wall-clock budget
//!
//! #### Security Errors
//! - **SecurityViolation**: Access control or envelope policy violations
//! - **EncryptionError**: Cache cryptographic operation failures
//! - **IntegrityError**: Tamper or corruption detection (cache tags, audit
//!   lines)
//!
//! #### Infrastructure Errors
//! - **IoError**: File system failures (audit journal)
//! - **CacheError**: Secure-cache storage failures
//! - **SerializationError**: JSON/YAML encoding failures
//! - **MetricsError**: Metrics registration and collection failures
//!
//! #### System Errors
//! - **InvalidConfiguration**: Malformed or missing configuration
//! - **Cancelled**: Cooperative cancellation of a batch
//! - **InternalError**: Unexpected failures
//!
//! ## Error Recovery Strategies
//!
//! Some errors indicate temporary conditions that can be retried
//! (`TimeoutError`, `IoError`, retryable `HandlerFailure`); others are
//! permanent and require intervention (`SecurityViolation`,
//! `InvalidConfiguration`, `IntegrityError`). The scheduler consults
//! [`BatchError::is_recoverable`] when deciding whether a failed item goes
//! back into its priority band.

use thiserror::Error;

/// Domain-specific errors for the batch processing system.
///
/// This enum represents all possible errors that can occur within the domain
/// layer. Each variant includes a descriptive message and is designed to
/// provide clear information about what went wrong and potentially how to
/// fix it.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Actionable**: Error messages provide enough context for debugging
/// - **Categorized**: Errors are grouped by type for systematic handling
/// - **Recoverable**: Some errors indicate retry-able conditions
#[derive(Error, Debug, Clone)]
pub enum BatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Integrity check failed: {0}")]
    IntegrityError(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl BatchError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new queue-full error
    pub fn queue_full(msg: impl Into<String>) -> Self {
        Self::QueueFull(msg.into())
    }

    /// Creates a new validation failure
    pub fn validation_failure(msg: impl Into<String>) -> Self {
        Self::ValidationFailure(msg.into())
    }

    /// Creates a new rate-limited error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Creates a new security violation error
    pub fn security_violation(msg: impl Into<String>) -> Self {
        Self::SecurityViolation(msg.into())
    }

    /// Creates a new resource exhausted error
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Creates a new circuit-open error
    pub fn circuit_open(msg: impl Into<String>) -> Self {
        Self::CircuitOpen(msg.into())
    }

    /// Creates a new handler failure
    pub fn handler_failure(msg: impl Into<String>) -> Self {
        Self::HandlerFailure(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Checks if the error is recoverable
    ///
    /// Recoverable errors put a failed item back into its priority band
    /// (attempts permitting); everything else is a permanent failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BatchError::TimeoutError(_) | BatchError::IoError(_) | BatchError::HandlerFailure(_)
        )
    }

    /// Checks if the error is a security-related error
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            BatchError::SecurityViolation(_)
                | BatchError::ValidationFailure(_)
                | BatchError::EncryptionError(_)
                | BatchError::IntegrityError(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            BatchError::InvalidConfiguration(_) => "configuration",
            BatchError::QueueFull(_) => "queue",
            BatchError::ValidationFailure(_) => "validation",
            BatchError::RateLimited(_) => "rate_limit",
            BatchError::CacheError(_) => "cache",
            BatchError::EncryptionError(_) => "encryption",
            BatchError::IntegrityError(_) => "integrity",
            BatchError::SecurityViolation(_) => "security",
            BatchError::ResourceExhausted(_) => "resource",
            BatchError::CircuitOpen(_) => "circuit_breaker",
            BatchError::HandlerFailure(_) => "handler",
            BatchError::IoError(_) => "io",
            BatchError::SerializationError(_) => "serialization",
            BatchError::TimeoutError(_) => "timeout",
            BatchError::Cancelled(_) => "cancellation",
            BatchError::OperationNotFound(_) => "operation",
            BatchError::InternalError(_) => "internal",
            BatchError::MetricsError(_) => "metrics",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        let err = BatchError::queue_full("max size 10000 reached");
        assert!(matches!(err, BatchError::QueueFull(_)));
        assert_eq!(err.category(), "queue");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(BatchError::TimeoutError("t".into()).is_recoverable());
        assert!(BatchError::HandlerFailure("h".into()).is_recoverable());
        assert!(!BatchError::ValidationFailure("v".into()).is_recoverable());
        assert!(!BatchError::RateLimited("r".into()).is_recoverable());
        assert!(!BatchError::ResourceExhausted("m".into()).is_recoverable());
    }

    #[test]
    fn test_security_classification() {
        assert!(BatchError::SecurityViolation("s".into()).is_security_error());
        assert!(BatchError::IntegrityError("i".into()).is_security_error());
        assert!(!BatchError::QueueFull("q".into()).is_security_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BatchError = io.into();
        assert_eq!(err.category(), "io");
    }
}
