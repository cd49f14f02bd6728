// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Item Identity
//!
//! ULID-backed identity assigned to each document on enqueue and used for
//! lifecycle bookkeeping (`mark_completed` / `mark_failed`).

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique identity of an item in the processing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Ulid);

impl ItemId {
    /// Generates a fresh item identity.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID
    pub fn ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
