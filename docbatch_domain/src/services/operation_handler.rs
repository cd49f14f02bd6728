// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Handler Port
//!
//! The contract between the scheduler and per-item operations.
//!
//! A handler is a pure async function from `(document, params)` to an opaque
//! JSON result. Handlers must not retain references to core components;
//! errors propagate to the scheduler's failure path, where
//! [`HandlerError::Retryable`] items re-enter their priority band (attempts
//! permitting) and [`HandlerError::Fatal`] items fail permanently.
//!
//! Registered operations live in the orchestrator's `{tag → handler}` map;
//! a `Custom` operation carries its handler in the call itself via
//! [`Operation::Custom`], so ad-hoc work needs no global registration.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::entities::Document;
use crate::value_objects::OperationType;

/// Free-form parameters passed to every handler invocation.
pub type OperationParams = HashMap<String, serde_json::Value>;

/// Error raised by an operation handler.
///
/// `Retryable` is the default classification for transient, network-like
/// failures; `Fatal` marks errors where retrying cannot help (bad input,
/// unsupported document). The scheduler honors the distinction when
/// deciding whether attempts remain.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl HandlerError {
    /// Creates a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Creates a non-retryable error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether the scheduler may re-enqueue the item
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

/// Async port implemented by every per-item operation.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Executes the operation against one document.
    ///
    /// The result is opaque to the core; it is stored verbatim in the
    /// `BatchResult` (and the secure cache, in secure modes).
    async fn execute(&self, document: &Document, params: &OperationParams) -> Result<serde_json::Value, HandlerError>;
}

/// Boxed future type used by the closure adapter.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send>>;

/// Adapter turning a closure into an [`OperationHandler`].
///
/// The closure receives owned copies of the document and parameters so the
/// returned future is `'static`, which is what lets handlers run on spawned
/// worker tasks.
pub struct FnHandler<F>
where
    F: Fn(Document, OperationParams) -> HandlerFuture + Send + Sync,
{
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Document, OperationParams) -> HandlerFuture + Send + Sync,
{
    /// Wraps a closure as a handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> OperationHandler for FnHandler<F>
where
    F: Fn(Document, OperationParams) -> HandlerFuture + Send + Sync,
{
    async fn execute(&self, document: &Document, params: &OperationParams) -> Result<serde_json::Value, HandlerError> {
        (self.f)(document.clone(), params.clone()).await
    }
}

/// The operation to dispatch for a batch.
///
/// Registered operations resolve through the orchestrator's handler map;
/// custom operations carry their handler with the call.
#[derive(Clone)]
pub enum Operation {
    /// A registered operation tag
    Registered(OperationType),
    /// An ad-hoc operation carrying its own handler
    Custom(Arc<dyn OperationHandler>),
}

impl Operation {
    /// Convenience constructor wrapping a closure as a custom operation.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Document, OperationParams) -> HandlerFuture + Send + Sync + 'static,
    {
        Operation::Custom(Arc::new(FnHandler::new(f)))
    }

    /// The operation tag (`Custom` for ad-hoc handlers).
    pub fn kind(&self) -> OperationType {
        match self {
            Operation::Registered(kind) => *kind,
            Operation::Custom(_) => OperationType::Custom,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Registered(kind) => write!(f, "Operation::Registered({})", kind),
            Operation::Custom(_) => write!(f, "Operation::Custom(..)"),
        }
    }
}
