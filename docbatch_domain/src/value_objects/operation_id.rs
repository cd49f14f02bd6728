// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Identity
//!
//! ULID-backed identity for one batch invocation. The textual form is
//! `batch-<kind>-<ulid>`, which keeps identifiers sortable by creation time
//! and self-describing in audit trails.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use super::OperationType;

/// Unique identity of a single batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    /// Generates a fresh identity for a batch of the given kind.
    pub fn new(kind: OperationType) -> Self {
        Self(format!("batch-{}-{}", kind.as_str(), Ulid::new()))
    }

    /// Wraps an existing identifier (e.g. parsed from an audit trail).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<OperationId> for String {
    fn from(id: OperationId) -> Self {
        id.0
    }
}
