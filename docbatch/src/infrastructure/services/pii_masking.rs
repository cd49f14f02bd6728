// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PII Detection & Masking
//!
//! Regex-based implementation of the domain's [`PiiDetector`] capability,
//! plus the masker the audit log applies before serializing events.
//!
//! Pattern-based detection is deliberately conservative: it exists as the
//! engine's built-in fallback, and hosts with an ML-backed detector inject
//! their own implementation of the trait. The validator treats detections
//! above its confidence threshold as High-severity violations; the audit
//! log replaces detected spans with a mask character, optionally keeping
//! the first and last characters for debuggability.

use docbatch_domain::{PiiDetection, PiiDetector, PiiKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Compiled regex patterns for PII detection.
/// These are computed once at startup and reused for all scans.
///
/// Note: These regex patterns are known-good at compile time. If compilation
/// fails, we fall back to a regex that matches nothing rather than
/// panicking. The fallback pattern `[^\s\S]` matches nothing (neither
/// whitespace nor non-whitespace).
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .unwrap_or_else(|_| Regex::new(r"[^\s\S]").expect("fallback regex"))
});

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap_or_else(|_| Regex::new(r"[^\s\S]").expect("fallback regex"))
});

static SSN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-?\d{2}-?\d{4}\b").unwrap_or_else(|_| Regex::new(r"[^\s\S]").expect("fallback regex")));

static CREDIT_CARD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").unwrap_or_else(|_| Regex::new(r"[^\s\S]").expect("fallback regex"))
});

static IP_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap_or_else(|_| Regex::new(r"[^\s\S]").expect("fallback regex"))
});

fn pattern_for(kind: PiiKind) -> &'static Regex {
    match kind {
        PiiKind::Email => &EMAIL_REGEX,
        PiiKind::Phone => &PHONE_REGEX,
        PiiKind::Ssn => &SSN_REGEX,
        PiiKind::CreditCard => &CREDIT_CARD_REGEX,
        PiiKind::IpAddress => &IP_ADDRESS_REGEX,
    }
}

/// Confidence assigned to a pattern match.
///
/// Structured formats (SSN, credit card) are high-confidence; bare digit
/// runs (phone) and dotted quads (IP) are weaker signals.
fn confidence_for(kind: PiiKind) -> f64 {
    match kind {
        PiiKind::Email => 0.95,
        PiiKind::Ssn => 0.9,
        PiiKind::CreditCard => 0.9,
        PiiKind::Phone => 0.8,
        PiiKind::IpAddress => 0.75,
    }
}

/// Regex-backed [`PiiDetector`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexPiiDetector;

impl RegexPiiDetector {
    /// Creates a detector scanning for all known kinds.
    pub fn new() -> Self {
        Self
    }

    const ALL_KINDS: [PiiKind; 5] = [
        PiiKind::Email,
        PiiKind::Phone,
        PiiKind::Ssn,
        PiiKind::CreditCard,
        PiiKind::IpAddress,
    ];
}

impl PiiDetector for RegexPiiDetector {
    fn detect(&self, text: &str) -> Vec<PiiDetection> {
        let mut detections = Vec::new();
        for kind in Self::ALL_KINDS {
            for found in pattern_for(kind).find_iter(text) {
                detections.push(PiiDetection::new(kind, found.start(), found.end(), confidence_for(kind)));
            }
        }
        detections.sort_by_key(|d| (d.start, d.end));
        detections
    }
}

/// Masks detected PII spans in text.
pub struct PiiMasker {
    detector: std::sync::Arc<dyn PiiDetector>,
    mask_char: char,
    /// Keep first/last character of a span for debugging
    preserve_context: bool,
    /// Minimum detector confidence before a span is masked
    confidence_threshold: f64,
}

impl PiiMasker {
    /// Creates a masker over the given detector.
    pub fn new(detector: std::sync::Arc<dyn PiiDetector>, mask_char: char, preserve_context: bool) -> Self {
        Self {
            detector,
            mask_char,
            preserve_context,
            confidence_threshold: 0.7,
        }
    }

    /// Sets the confidence threshold below which spans are left alone.
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    fn mask_span(&self, span: &str, preserve_context: bool) -> String {
        let char_count = span.chars().count();
        if preserve_context && char_count > 4 {
            let first = span.chars().next().unwrap_or(self.mask_char);
            let last = span.chars().next_back().unwrap_or(self.mask_char);
            let mut masked = String::with_capacity(span.len());
            masked.push(first);
            masked.extend(std::iter::repeat(self.mask_char).take(char_count - 2));
            masked.push(last);
            masked
        } else {
            self.mask_char.to_string().repeat(char_count)
        }
    }

    /// Masks all detected spans in the text.
    pub fn mask(&self, text: &str) -> String {
        self.mask_with_context(text, self.preserve_context)
    }

    /// Masks with an explicit preserve-context override.
    pub fn mask_with_context(&self, text: &str, preserve_context: bool) -> String {
        let detections = self.detector.detect(text);
        if detections.is_empty() {
            return text.to_string();
        }

        // Rebuild back-to-front so earlier spans keep their offsets.
        let mut masked = text.to_string();
        let mut spans: Vec<&PiiDetection> = detections
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold && !d.is_empty() && d.end <= text.len())
            .collect();
        spans.sort_by_key(|d| std::cmp::Reverse(d.start));

        let mut last_start = usize::MAX;
        for detection in spans {
            // Overlapping detections (e.g. SSN inside phone): first
            // replacement wins.
            if detection.end > last_start {
                continue;
            }
            last_start = detection.start;
            let replacement = self.mask_span(&text[detection.start..detection.end], preserve_context);
            masked.replace_range(detection.start..detection.end, &replacement);
        }

        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn masker(preserve: bool) -> PiiMasker {
        PiiMasker::new(Arc::new(RegexPiiDetector::new()), '*', preserve)
    }

    #[test]
    fn test_detects_email() {
        let detections = RegexPiiDetector::new().detect("contact alice@example.com please");
        assert!(detections.iter().any(|d| d.kind == PiiKind::Email));
    }

    #[test]
    fn test_detects_multiple_kinds() {
        let text = "ssn 123-45-6789 from 192.168.0.1";
        let detections = RegexPiiDetector::new().detect(text);
        let kinds: Vec<PiiKind> = detections.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&PiiKind::Ssn));
        assert!(kinds.contains(&PiiKind::IpAddress));
    }

    #[test]
    fn test_detections_sorted_by_start() {
        let text = "a@b.co then 555-123-4567";
        let detections = RegexPiiDetector::new().detect(text);
        for pair in detections.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_clean_text_has_no_detections() {
        assert!(RegexPiiDetector::new().detect("nothing sensitive here").is_empty());
    }

    #[test]
    fn test_mask_full() {
        let masked = masker(false).mask("mail alice@example.com now");
        assert!(!masked.contains("alice@example.com"));
        assert!(masked.contains("*****************"));
    }

    #[test]
    fn test_mask_preserves_context() {
        let masked = masker(true).mask("id 123-45-6789 end");
        assert!(!masked.contains("123-45-6789"));
        // First and last characters survive
        assert!(masked.contains('1'));
        assert!(masked.contains('9'));
    }

    #[test]
    fn test_mask_leaves_clean_text_alone() {
        let text = "perfectly ordinary sentence";
        assert_eq!(masker(true).mask(text), text);
    }
}
