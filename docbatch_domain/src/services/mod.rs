// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain service traits and ports.
//!
//! These are the seams between the core and its collaborators: the
//! operation-handler port invoked by the scheduler, and the PII-detection
//! capability consumed by the validator and the audit log.

pub mod operation_handler;
pub mod pii_detector;

pub use operation_handler::{FnHandler, HandlerError, HandlerFuture, Operation, OperationHandler, OperationParams};
pub use pii_detector::{PiiDetection, PiiDetector, PiiKind};
