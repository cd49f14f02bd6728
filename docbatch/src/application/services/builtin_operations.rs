// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Built-in Batch Operations
//!
//! Default handlers registered for each `OperationType`. Each one is
//! self-contained and produces a deterministic structured result from the
//! document alone, so the engine works out of the box; hosts replace them
//! with real generators, analyzers, and reviewers via
//! `register_operation`.

use async_trait::async_trait;
use docbatch_domain::{Document, HandlerError, OperationHandler, OperationParams, OperationType};
use serde_json::json;
use std::sync::Arc;

/// Registers the default handler set into a registry map.
pub fn default_handlers() -> Vec<(OperationType, Arc<dyn OperationHandler>)> {
    vec![
        (OperationType::Generate, Arc::new(GenerateHandler) as Arc<dyn OperationHandler>),
        (OperationType::Analyze, Arc::new(AnalyzeHandler)),
        (OperationType::Review, Arc::new(ReviewHandler)),
        (OperationType::Enhance, Arc::new(EnhanceHandler)),
        (OperationType::Validate, Arc::new(ValidateHandler)),
    ]
}

fn string_param<'a>(params: &'a OperationParams, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

/// Documentation generation.
pub struct GenerateHandler;

#[async_trait]
impl OperationHandler for GenerateHandler {
    async fn execute(&self, document: &Document, params: &OperationParams) -> Result<serde_json::Value, HandlerError> {
        let doc_type = string_param(params, "type", "readme");
        Ok(json!({
            "generated": format!("# {}\n\nGenerated {} documentation.", document.id(), doc_type),
            "type": doc_type,
        }))
    }
}

/// Quality analysis with a simple structural score.
pub struct AnalyzeHandler;

impl AnalyzeHandler {
    /// Structural quality score in [0, 100]: rewards length, headings, and
    /// code fences, the features the downstream quality engine also weighs.
    fn quality_score(payload: &str) -> f64 {
        let mut score: f64 = 50.0;

        let words = payload.split_whitespace().count();
        score += (words as f64 / 20.0).min(20.0);

        if payload.lines().any(|l| l.starts_with('#')) {
            score += 15.0;
        }
        if payload.contains("```") {
            score += 10.0;
        }
        if payload.lines().count() > 5 {
            score += 5.0;
        }

        score.min(100.0)
    }
}

#[async_trait]
impl OperationHandler for AnalyzeHandler {
    async fn execute(&self, document: &Document, _params: &OperationParams) -> Result<serde_json::Value, HandlerError> {
        Ok(json!({
            "quality_score": Self::quality_score(document.payload()),
            "analyzed": document.id(),
            "length": document.payload_size(),
        }))
    }
}

/// Document review with placeholder suggestions.
pub struct ReviewHandler;

#[async_trait]
impl OperationHandler for ReviewHandler {
    async fn execute(&self, document: &Document, _params: &OperationParams) -> Result<serde_json::Value, HandlerError> {
        let mut suggestions: Vec<String> = Vec::new();
        if document.payload().len() < 80 {
            suggestions.push("expand the content".to_string());
        }
        if !document.payload().lines().any(|l| l.starts_with('#')) {
            suggestions.push("add section headings".to_string());
        }

        Ok(json!({
            "review_score": 90.0 - suggestions.len() as f64 * 10.0,
            "reviewed": document.id(),
            "suggestions": suggestions,
        }))
    }
}

/// Document enhancement.
pub struct EnhanceHandler;

#[async_trait]
impl OperationHandler for EnhanceHandler {
    async fn execute(&self, document: &Document, params: &OperationParams) -> Result<serde_json::Value, HandlerError> {
        let strategy = string_param(params, "strategy", "auto");
        Ok(json!({
            "enhanced": format!("Enhanced {}", document.id()),
            "improvements": strategy,
        }))
    }
}

/// Structural validation.
pub struct ValidateHandler;

#[async_trait]
impl OperationHandler for ValidateHandler {
    async fn execute(&self, document: &Document, _params: &OperationParams) -> Result<serde_json::Value, HandlerError> {
        Ok(json!({
            "valid": !document.payload().trim().is_empty(),
            "document": document.id(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> OperationParams {
        OperationParams::new()
    }

    #[tokio::test]
    async fn test_generate_uses_type_param() {
        let mut p = params();
        p.insert("type".to_string(), json!("api"));
        let result = GenerateHandler
            .execute(&Document::new("proj", "src"), &p)
            .await
            .unwrap();
        assert_eq!(result["type"], "api");
        assert!(result["generated"].as_str().unwrap().contains("proj"));
    }

    #[tokio::test]
    async fn test_analyze_scores_structure() {
        let plain = AnalyzeHandler::quality_score("short text");
        let structured =
            AnalyzeHandler::quality_score("# Title\n\nlots of words here in this rather long body\n\n```rust\ncode\n```\nmore\nlines\nhere");
        assert!(structured > plain);
        assert!(structured <= 100.0);
    }

    #[tokio::test]
    async fn test_review_suggests_for_short_documents() {
        let result = ReviewHandler
            .execute(&Document::new("d", "tiny"), &params())
            .await
            .unwrap();
        assert!(!result["suggestions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_payload() {
        let result = ValidateHandler
            .execute(&Document::new("d", "   "), &params())
            .await
            .unwrap();
        assert_eq!(result["valid"], false);
    }

    #[test]
    fn test_default_handler_set_covers_registrable_types() {
        let handlers = default_handlers();
        for kind in OperationType::REGISTRABLE {
            assert!(handlers.iter().any(|(k, _)| *k == kind));
        }
    }
}
