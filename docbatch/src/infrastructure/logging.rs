// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Setup
//!
//! Tracing-subscriber initialization for hosts embedding the engine. The
//! engine itself only emits `tracing` events; installing a subscriber is
//! the host's choice, and this helper wires the conventional one:
//! EnvFilter (`RUST_LOG`, default `info`) over a compact fmt layer.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Safe to call more than once: later calls are no-ops. Respects
/// `RUST_LOG`; defaults to `info` for the engine crates and `warn`
/// elsewhere.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,docbatch=info,docbatch_bootstrap=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
