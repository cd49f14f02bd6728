// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Type
//!
//! Enumerated tags for the batch operations the engine can dispatch. Each
//! tag maps to exactly one registered handler; `Custom` operations carry
//! their handler in the call parameters instead of the registry.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported batch operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Generate,
    Analyze,
    Review,
    Enhance,
    Validate,
    Custom,
}

impl OperationType {
    /// All registrable operation types (excludes `Custom`, whose handler
    /// travels with the call).
    pub const REGISTRABLE: [OperationType; 5] = [
        OperationType::Generate,
        OperationType::Analyze,
        OperationType::Review,
        OperationType::Enhance,
        OperationType::Validate,
    ];

    /// Returns the operation name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Generate => "generate",
            OperationType::Analyze => "analyze",
            OperationType::Review => "review",
            OperationType::Enhance => "enhance",
            OperationType::Validate => "validate",
            OperationType::Custom => "custom",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generate" => Ok(OperationType::Generate),
            "analyze" => Ok(OperationType::Analyze),
            "review" => Ok(OperationType::Review),
            "enhance" => Ok(OperationType::Enhance),
            "validate" => Ok(OperationType::Validate),
            "custom" => Ok(OperationType::Custom),
            other => Err(BatchError::OperationNotFound(format!("unknown operation type: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for op in [
            OperationType::Generate,
            OperationType::Analyze,
            OperationType::Review,
            OperationType::Enhance,
            OperationType::Validate,
            OperationType::Custom,
        ] {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("GENERATE".parse::<OperationType>().unwrap(), OperationType::Generate);
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert!("transmogrify".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_registrable_excludes_custom() {
        assert!(!OperationType::REGISTRABLE.contains(&OperationType::Custom));
    }
}
