// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Processing Integration Tests
//!
//! End-to-end coverage of the core scheduling loop: the baseline scenarios,
//! totality, priority admission, retry bounds, cancellation, streaming, and
//! batch grouping.

use docbatch::application::services::{BatchOrchestrator, OrchestratorConfig};
use docbatch::{Document, ExecutionMode, HandlerError, ItemStatus, Operation, OperationType};
use futures::StreamExt;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn basic_engine(concurrency: Option<usize>) -> Arc<BatchOrchestrator> {
    BatchOrchestrator::new(OrchestratorConfig {
        mode: ExecutionMode::Basic,
        concurrency_override: concurrency,
        ..Default::default()
    })
    .unwrap()
}

fn echo_operation() -> Operation {
    Operation::custom(|doc, _params| {
        Box::pin(async move { Ok(json!({ "processed": doc.payload() })) })
    })
}

// ============================================================================
// SEED SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_baseline_run() {
    let engine = basic_engine(Some(1));
    let documents: Vec<Document> = ["a", "b", "c"].iter().map(|s| Document::from_payload(*s)).collect();

    let result = engine
        .process_batch(documents, echo_operation(), None, None)
        .await
        .unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(result.processed, 3);
    assert_eq!(result.failed, 0);
    assert_eq!(result.skipped, 0);

    let processed: BTreeSet<String> = result
        .results
        .iter()
        .map(|o| o.result["processed"].as_str().unwrap().to_string())
        .collect();
    let expected: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    assert_eq!(processed, expected);
    for outcome in &result.results {
        assert_eq!(outcome.status, ItemStatus::Success);
    }
}

#[tokio::test]
async fn test_partial_failure() {
    let engine = basic_engine(Some(1));
    let documents: Vec<Document> = ["a", "fail", "c"].iter().map(|s| Document::from_payload(*s)).collect();

    let operation = Operation::custom(|doc, _params| {
        Box::pin(async move {
            if doc.payload() == "fail" {
                Err(HandlerError::retryable("simulated failure"))
            } else {
                Ok(json!({ "processed": doc.payload() }))
            }
        })
    });

    let result = engine.process_batch(documents, operation, None, None).await.unwrap();

    // processed counts attempted items; the failing item consumed its
    // attempts and is counted once
    assert_eq!(result.processed, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.skipped, 0);
    assert!((result.success_rate() - 2.0 / 3.0 * 100.0).abs() < 0.01);

    let failure = &result.errors[0];
    assert_eq!(failure.document_id, "fail");
    assert_eq!(failure.attempts, 3);
}

#[tokio::test]
async fn test_priority_completion_order() {
    let engine = basic_engine(Some(1));
    let documents = vec![
        Document::new("low", "low").with_attribute("priority", "low"),
        Document::new("crit", "crit").with_attribute("priority", "critical"),
        Document::new("norm", "norm").with_attribute("priority", "normal"),
        Document::new("high", "high").with_attribute("priority", "high"),
    ];

    let operation = Operation::custom(|doc, _params| {
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(json!(doc.id()))
        })
    });

    let result = engine.process_batch(documents, operation, None, None).await.unwrap();

    let order: Vec<String> = result.results.iter().map(|o| o.document_id.clone()).collect();
    assert_eq!(order, vec!["crit", "high", "norm", "low"]);
}

// ============================================================================
// INVARIANTS
// ============================================================================

#[tokio::test]
async fn test_totality_with_mixed_outcomes() {
    let engine = basic_engine(Some(4));
    let documents: Vec<Document> = (0..20)
        .map(|i| Document::new(format!("doc-{}", i), if i % 5 == 0 { "fail" } else { "ok" }))
        .collect();

    let operation = Operation::custom(|doc, _params| {
        Box::pin(async move {
            if doc.payload() == "fail" {
                Err(HandlerError::fatal("bad input"))
            } else {
                Ok(json!("ok"))
            }
        })
    });

    let result = engine.process_batch(documents, operation, None, None).await.unwrap();
    assert_eq!(result.total, 20);
    assert!(result.is_total());
    assert_eq!(result.failed, 4);
}

#[tokio::test]
async fn test_outcomes_independent_of_worker_count() {
    let documents: Vec<Document> = (0..12)
        .map(|i| Document::new(format!("doc-{}", i), if i % 3 == 0 { "fail" } else { "ok" }))
        .collect();

    let operation = || {
        Operation::custom(|doc, _params| {
            Box::pin(async move {
                if doc.payload() == "fail" {
                    Err(HandlerError::fatal("bad input"))
                } else {
                    Ok(json!("ok"))
                }
            })
        })
    };

    let mut outcomes_by_workers = Vec::new();
    for workers in [1usize, 4, 16] {
        let engine = basic_engine(Some(workers));
        let result = engine
            .process_batch(documents.clone(), operation(), None, None)
            .await
            .unwrap();

        let mut outcomes: Vec<(String, ItemStatus)> = result
            .results
            .iter()
            .map(|o| (o.document_id.clone(), o.status))
            .chain(result.errors.iter().map(|e| (e.document_id.clone(), e.status)))
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes_by_workers.push(outcomes);
    }

    assert_eq!(outcomes_by_workers[0], outcomes_by_workers[1]);
    assert_eq!(outcomes_by_workers[1], outcomes_by_workers[2]);
}

#[tokio::test]
async fn test_retry_bound_exact_invocations() {
    let engine = basic_engine(Some(1));
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let operation = Operation::custom(move |_doc, _params| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::retryable("always fails"))
        })
    });

    let result = engine
        .process_batch(vec![Document::from_payload("stubborn")], operation, None, None)
        .await
        .unwrap();

    // max_attempts = 3: exactly three invocations, final status failed
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].status, ItemStatus::Failed);
}

#[tokio::test]
async fn test_fatal_errors_are_not_retried() {
    let engine = basic_engine(Some(1));
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let operation = Operation::custom(move |_doc, _params| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::fatal("unsupported"))
        })
    });

    engine
        .process_batch(vec![Document::from_payload("doc")], operation, None, None)
        .await
        .unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

// ============================================================================
// BOUNDARIES
// ============================================================================

#[tokio::test]
async fn test_empty_input() {
    let engine = basic_engine(None);
    let result = engine
        .process_batch(Vec::new(), echo_operation(), None, None)
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(result.processed, 0);
    assert_eq!(result.success_rate(), 0.0);
    assert!(result.elapsed > Duration::ZERO);
}

#[tokio::test]
async fn test_queue_at_capacity_skips_overflow() {
    let engine = BatchOrchestrator::new(OrchestratorConfig {
        mode: ExecutionMode::Basic,
        concurrency_override: Some(1),
        queue_capacity: 2,
        ..Default::default()
    })
    .unwrap();

    let documents: Vec<Document> = (0..3).map(|i| Document::new(format!("d{}", i), "x")).collect();
    let result = engine.process_batch(documents, echo_operation(), None, None).await.unwrap();

    assert!(result.is_total());
    assert_eq!(result.skipped, 1);
    assert_eq!(result.errors[0].category, "queue");
}

#[tokio::test]
async fn test_repeat_batches_are_deterministic() {
    let documents: Vec<Document> = ["x", "y"].iter().map(|s| Document::from_payload(*s)).collect();

    let engine = basic_engine(Some(2));
    let first = engine
        .process_batch(documents.clone(), echo_operation(), None, None)
        .await
        .unwrap();
    let second = engine
        .process_batch(documents, echo_operation(), None, None)
        .await
        .unwrap();

    assert_eq!(first.processed, second.processed);
    assert_eq!(first.failed, second.failed);
    assert_eq!(first.skipped, second.skipped);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_batch_timeout_cancels_with_totality() {
    let engine = BatchOrchestrator::new(OrchestratorConfig {
        mode: ExecutionMode::Basic,
        concurrency_override: Some(1),
        batch_timeout: Some(Duration::from_millis(150)),
        ..Default::default()
    })
    .unwrap();

    let documents: Vec<Document> = (0..10).map(|i| Document::new(format!("d{}", i), "slow")).collect();
    let operation = Operation::custom(|_doc, _params| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(json!("done"))
        })
    });

    let result = engine.process_batch(documents, operation, None, None).await.unwrap();

    // Some items finished, the rest were skipped at cancellation; every
    // input is accounted for
    assert!(result.is_total());
    assert!(result.skipped > 0, "expected unstarted items to be skipped");
    assert!(result
        .errors
        .iter()
        .filter(|e| e.status == ItemStatus::Skipped)
        .all(|e| e.category == "cancellation"));
}

// ============================================================================
// STREAMING & GROUPING
// ============================================================================

#[tokio::test]
async fn test_streaming_yields_all_items() {
    let engine = BatchOrchestrator::new(OrchestratorConfig {
        mode: ExecutionMode::Performance,
        concurrency_override: Some(2),
        ..Default::default()
    })
    .unwrap();

    let documents: Vec<Document> = (0..5).map(|i| Document::new(format!("s{}", i), format!("body {}", i))).collect();
    let stream = engine
        .process_stream(documents, echo_operation(), None, None)
        .unwrap();

    let outcomes: Vec<_> = stream.collect().await;
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.status == ItemStatus::Success));

    let ids: BTreeSet<String> = outcomes.iter().map(|o| o.document_id.clone()).collect();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_streaming_unavailable_in_basic_mode() {
    let engine = basic_engine(None);
    assert!(engine
        .process_stream(vec![Document::from_payload("a")], echo_operation(), None, None)
        .is_err());
}

#[tokio::test]
async fn test_batch_grouping_preserves_item_semantics() {
    let grouped = BatchOrchestrator::new(OrchestratorConfig {
        mode: ExecutionMode::Performance,
        concurrency_override: Some(2),
        batch_group_size: 2,
        ..Default::default()
    })
    .unwrap();

    let documents: Vec<Document> = (0..7)
        .map(|i| {
            Document::new(format!("g{}", i), format!("body {}", i))
                .with_attribute("group", if i % 2 == 0 { "even" } else { "odd" })
        })
        .collect();

    let result = grouped
        .process_batch(documents, echo_operation(), None, None)
        .await
        .unwrap();

    assert_eq!(result.total, 7);
    assert_eq!(result.processed, 7);
    assert!(result.is_total());

    let ids: BTreeSet<String> = result.results.iter().map(|o| o.document_id.clone()).collect();
    assert_eq!(ids.len(), 7);
}

// ============================================================================
// OBSERVABILITY
// ============================================================================

#[tokio::test]
async fn test_engine_statistics_accumulate() {
    let engine = basic_engine(Some(2));
    engine
        .process_batch(
            vec![Document::from_payload("a"), Document::from_payload("b")],
            echo_operation(),
            None,
            None,
        )
        .await
        .unwrap();

    let metrics = engine.metrics();
    assert_eq!(metrics.counters.total_batches, 1);
    assert_eq!(metrics.counters.total_documents, 2);
    assert!(metrics.counters.total_time_secs > 0.0);

    engine.reset_statistics();
    assert_eq!(engine.metrics().counters.total_batches, 0);
}

#[tokio::test]
async fn test_registered_default_operations_work() {
    let engine = basic_engine(Some(1));
    let documents = vec![Document::new("readme", "# Title\n\nSome body text")];

    for kind in [
        OperationType::Generate,
        OperationType::Analyze,
        OperationType::Review,
        OperationType::Enhance,
        OperationType::Validate,
    ] {
        let result = engine
            .process_batch(documents.clone(), Operation::Registered(kind), None, None)
            .await
            .unwrap();
        assert_eq!(result.processed, 1, "operation {} failed", kind);
        assert_eq!(result.failed, 0);
    }
}
