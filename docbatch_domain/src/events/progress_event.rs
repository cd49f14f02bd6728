// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Events
//!
//! Event payloads emitted by the progress tracker and fanned out to
//! subscribers. Per-item notifications are strictly one-per-item, but
//! observers must not assume input order: workers race, so completion order
//! is unspecified.
//!
//! Observers are invoked synchronously, outside the tracker's internal lock.
//! A slow observer delays notification delivery, never progress accounting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::OperationId;

/// The kinds of progress notifications subscribers can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    /// An operation started tracking
    Started,
    /// One item reached a terminal outcome
    ItemCompleted,
    /// The whole operation completed
    BatchCompleted,
    /// An error was recorded against the operation
    Error,
}

impl ProgressEventKind {
    /// Returns the kind name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressEventKind::Started => "started",
            ProgressEventKind::ItemCompleted => "item_completed",
            ProgressEventKind::BatchCompleted => "batch_completed",
            ProgressEventKind::Error => "error",
        }
    }
}

impl fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Kind of notification
    pub kind: ProgressEventKind,
    /// Operation the notification belongs to
    pub operation_id: OperationId,
    /// Items processed at the time of the event
    pub processed: usize,
    /// Total items in the operation
    pub total: usize,
    /// Error message, for `Error` events
    pub error: Option<String>,
    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ProgressEvent {
    /// Creates an event for the given operation state.
    pub fn new(kind: ProgressEventKind, operation_id: OperationId, processed: usize, total: usize) -> Self {
        Self {
            kind,
            operation_id,
            processed,
            total,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attaches an error message (used with `ProgressEventKind::Error`).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Subscriber receiving progress notifications.
///
/// Implementations must be cheap and non-blocking; they run on the worker
/// that completed the item.
pub trait ProgressObserver: Send + Sync {
    /// Called once per notification the observer is subscribed to.
    fn on_event(&self, event: &ProgressEvent);
}
