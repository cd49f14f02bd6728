// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PII Detection Capability
//!
//! Port for personally-identifiable-information detection. Two consumers:
//! the input validator flags payloads whose detections exceed a confidence
//! threshold, and the audit log masks detected spans before serialization.
//!
//! Concrete detection is a collaborator concern; the engine ships a
//! regex-based implementation in the infrastructure layer and hosts may
//! inject their own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categories of PII the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
}

impl PiiKind {
    /// Returns the kind name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Email => "email",
            PiiKind::Phone => "phone",
            PiiKind::Ssn => "ssn",
            PiiKind::CreditCard => "credit_card",
            PiiKind::IpAddress => "ip_address",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detected PII span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiDetection {
    /// Category of the detection
    pub kind: PiiKind,
    /// Byte offset where the span starts
    pub start: usize,
    /// Byte offset one past the span end
    pub end: usize,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
}

impl PiiDetection {
    /// Creates a detection for the given span.
    pub fn new(kind: PiiKind, start: usize, end: usize, confidence: f64) -> Self {
        Self {
            kind,
            start,
            end,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Length of the detected span in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Capability trait for PII detection.
pub trait PiiDetector: Send + Sync {
    /// Scans text and returns all detected spans, in ascending start order.
    fn detect(&self, text: &str) -> Vec<PiiDetection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(PiiDetection::new(PiiKind::Email, 0, 5, 1.5).confidence, 1.0);
        assert_eq!(PiiDetection::new(PiiKind::Email, 0, 5, -0.5).confidence, 0.0);
    }

    #[test]
    fn test_span_length() {
        let d = PiiDetection::new(PiiKind::Phone, 10, 22, 0.9);
        assert_eq!(d.len(), 12);
        assert!(!d.is_empty());
        assert!(PiiDetection::new(PiiKind::Phone, 5, 5, 0.9).is_empty());
    }
}
