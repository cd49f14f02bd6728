// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DocBatch Bootstrap
//!
//! Platform-level support for the batch engine. This crate sits outside the
//! application layers and owns the two concerns that require direct access to
//! the operating system:
//!
//! - **Platform abstraction** ([`platform`]): memory and CPU queries behind a
//!   trait, with POSIX and Windows implementations selected at compile time.
//!   The engine's memory probe and resource guard consume these instead of
//!   calling OS APIs directly.
//! - **Shutdown & cancellation** ([`shutdown`]): a lightweight cancellation
//!   token and a coordinator for graceful wind-down. The scheduler uses
//!   tokens both for cooperative batch cancellation and for terminating
//!   operations that breach resource limits.
//!
//! ## Design Philosophy
//!
//! Keeping OS-specific code in one crate means the domain and application
//! layers stay free of conditional compilation, and tests can substitute a
//! mock [`platform::Platform`] where deterministic memory numbers are needed.

pub mod platform;
pub mod shutdown;

pub use platform::{create_platform, Platform, PlatformError};
pub use shutdown::{CancellationToken, ShutdownCoordinator};
