// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Threat Level
//!
//! Severity classification produced by the input validator and carried
//! through the security envelope. The composite level of a validation pass
//! is the maximum across all checks; a result at `High` or above is never
//! considered valid, even when a sanitized form exists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Security threat levels, ordered from benign to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Whether content at this level may still be accepted (possibly after
    /// sanitization).
    pub fn is_acceptable(&self) -> bool {
        *self <= ThreatLevel::Medium
    }

    /// Whether sanitization applies at this level. Sanitization only makes
    /// sense for content that is otherwise acceptable.
    pub fn is_sanitizable(&self) -> bool {
        matches!(self, ThreatLevel::Low | ThreatLevel::Medium)
    }

    /// Returns the level name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::None => "none",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl Default for ThreatLevel {
    fn default() -> Self {
        ThreatLevel::None
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(ThreatLevel::Critical > ThreatLevel::High);
        assert!(ThreatLevel::High > ThreatLevel::Medium);
        assert!(ThreatLevel::Medium > ThreatLevel::Low);
        assert!(ThreatLevel::Low > ThreatLevel::None);
    }

    #[test]
    fn test_acceptability_boundary() {
        assert!(ThreatLevel::Medium.is_acceptable());
        assert!(!ThreatLevel::High.is_acceptable());
    }

    #[test]
    fn test_sanitizable_band() {
        assert!(!ThreatLevel::None.is_sanitizable());
        assert!(ThreatLevel::Low.is_sanitizable());
        assert!(ThreatLevel::Medium.is_sanitizable());
        assert!(!ThreatLevel::High.is_sanitizable());
    }

    #[test]
    fn test_max_composes() {
        let composite = [ThreatLevel::Low, ThreatLevel::High, ThreatLevel::None]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(composite, ThreatLevel::High);
    }
}
