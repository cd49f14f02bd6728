// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Mode
//!
//! Mode selection governing which components the orchestrator constructs:
//!
//! | Mode | Components enabled |
//! |---|---|
//! | Basic | Scheduler + Queue + MemoryProbe + ProgressTracker |
//! | Performance | Basic + cache (no encryption) + batch-grouping + streaming |
//! | Secure | Basic + Validator + RateLimiter + encrypted cache + ResourceGuard + AuditLog |
//! | Enterprise | Performance ∪ Secure |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Basic,
    Performance,
    Secure,
    Enterprise,
}

impl ExecutionMode {
    /// Whether the security envelope (validator, rate limiter, resource
    /// guard, audit log) is active in this mode.
    pub fn needs_security(&self) -> bool {
        matches!(self, ExecutionMode::Secure | ExecutionMode::Enterprise)
    }

    /// Whether the performance features (batch grouping, streaming,
    /// unencrypted cache) are active in this mode.
    pub fn needs_performance(&self) -> bool {
        matches!(self, ExecutionMode::Performance | ExecutionMode::Enterprise)
    }

    /// Whether any result cache is constructed in this mode.
    pub fn needs_cache(&self) -> bool {
        self.needs_security() || self.needs_performance()
    }

    /// Whether cache values are encrypted in this mode.
    pub fn cache_encrypted(&self) -> bool {
        self.needs_security()
    }

    /// Returns the mode name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Basic => "basic",
            ExecutionMode::Performance => "performance",
            ExecutionMode::Secure => "secure",
            ExecutionMode::Enterprise => "enterprise",
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Basic
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_matrix() {
        assert!(!ExecutionMode::Basic.needs_security());
        assert!(!ExecutionMode::Basic.needs_performance());
        assert!(!ExecutionMode::Basic.needs_cache());

        assert!(!ExecutionMode::Performance.needs_security());
        assert!(ExecutionMode::Performance.needs_performance());
        assert!(ExecutionMode::Performance.needs_cache());
        assert!(!ExecutionMode::Performance.cache_encrypted());

        assert!(ExecutionMode::Secure.needs_security());
        assert!(!ExecutionMode::Secure.needs_performance());
        assert!(ExecutionMode::Secure.cache_encrypted());

        assert!(ExecutionMode::Enterprise.needs_security());
        assert!(ExecutionMode::Enterprise.needs_performance());
        assert!(ExecutionMode::Enterprise.cache_encrypted());
    }
}
