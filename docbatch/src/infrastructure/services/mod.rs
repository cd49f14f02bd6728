// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Supporting infrastructure services.

pub mod pii_masking;
pub mod progress_tracker;

pub use pii_masking::{PiiMasker, RegexPiiDetector};
pub use progress_tracker::{ProgressTracker, TrackerSummary};
