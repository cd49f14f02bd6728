// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects for the batch processing domain.
//!
//! Immutable, validated types that give domain meaning to raw numbers and
//! strings: identities, priorities, operation kinds, threat levels, memory
//! classifications, and bounded worker counts.

pub mod execution_mode;
pub mod item_id;
pub mod memory_tier;
pub mod operation_id;
pub mod operation_type;
pub mod priority;
pub mod security_level;
pub mod threat_level;
pub mod worker_count;

pub use execution_mode::ExecutionMode;
pub use item_id::ItemId;
pub use memory_tier::{MemoryPressure, MemoryTier};
pub use operation_id::OperationId;
pub use operation_type::OperationType;
pub use priority::Priority;
pub use security_level::SecurityLevel;
pub use threat_level::ThreatLevel;
pub use worker_count::WorkerCount;
