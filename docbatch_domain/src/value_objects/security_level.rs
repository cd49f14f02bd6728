// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Security Level
//!
//! Named preset profiles that parameterize the validator, rate limiter,
//! secure cache, resource guard, and audit log simultaneously. The concrete
//! numeric knobs live in each component's configuration; the level only
//! chooses between preset tables.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named security preset.
///
/// Ordered from most permissive to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Basic,
    Standard,
    Strict,
    Paranoid,
}

impl SecurityLevel {
    /// Whether this level re-validates handler output and escalates
    /// resource-guard violations to the global circuit breaker.
    pub fn is_strict(&self) -> bool {
        *self >= SecurityLevel::Strict
    }

    /// Returns the level name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Basic => "basic",
            SecurityLevel::Standard => "standard",
            SecurityLevel::Strict => "strict",
            SecurityLevel::Paranoid => "paranoid",
        }
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        SecurityLevel::Standard
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(SecurityLevel::Basic),
            "standard" => Ok(SecurityLevel::Standard),
            "strict" => Ok(SecurityLevel::Strict),
            "paranoid" => Ok(SecurityLevel::Paranoid),
            other => Err(BatchError::invalid_config(format!("unknown security level: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictness_boundary() {
        assert!(!SecurityLevel::Basic.is_strict());
        assert!(!SecurityLevel::Standard.is_strict());
        assert!(SecurityLevel::Strict.is_strict());
        assert!(SecurityLevel::Paranoid.is_strict());
    }

    #[test]
    fn test_parse_round_trip() {
        for level in [
            SecurityLevel::Basic,
            SecurityLevel::Standard,
            SecurityLevel::Strict,
            SecurityLevel::Paranoid,
        ] {
            assert_eq!(level.as_str().parse::<SecurityLevel>().unwrap(), level);
        }
    }
}
