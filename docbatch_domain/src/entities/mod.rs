// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entities for the batch processing domain.

pub mod batch_result;
pub mod document;
pub mod operation_progress;
pub mod security_context;

pub use batch_result::{BatchResult, ItemFailure, ItemOutcome, ItemStatus};
pub use document::Document;
pub use operation_progress::{OperationProgress, OperationStatus};
pub use security_context::{Permission, SecurityClearance, SecurityContext};
