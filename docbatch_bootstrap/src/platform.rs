// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Abstraction Module
//!
//! This module provides platform-specific abstractions for the operating
//! system facilities the batch engine depends on: physical memory totals,
//! available memory, process resident size, and process CPU time.
//!
//! ## Architecture Pattern
//!
//! Following hexagonal architecture principles:
//! - **Interface**: `Platform` trait defines the contract
//! - **Implementations**:
//!   - `UnixPlatform`: POSIX implementation (Linux + macOS)
//!   - `WindowsPlatform`: Windows API implementation
//! - **Selection**: Compile-time platform selection via `#[cfg]`
//!
//! ## Why a trait?
//!
//! The memory probe derives its tier classification from `total_memory()` and
//! the resource guard samples `process_rss()` / `process_cpu_time()` once per
//! second. Both need deterministic substitutes in tests, which a trait object
//! provides without conditional compilation in the callers.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

// Re-export implementations
#[cfg(unix)]
pub use unix::UnixPlatform;

#[cfg(windows)]
pub use windows::WindowsPlatform;

/// Platform-specific errors
#[derive(Debug, Error)]
pub enum PlatformError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feature not supported on this platform
    #[error("Not supported on this platform: {0}")]
    NotSupported(String),

    /// Generic platform error
    #[error("Platform error: {0}")]
    Other(String),
}

/// Platform abstraction trait for OS-specific queries
///
/// All methods are stateless and thread-safe. Implementations should use
/// native platform APIs (POSIX `sysconf`/`/proc` on Unix, `winapi` on
/// Windows) and fall back to standard Rust APIs where a native call is
/// unavailable.
pub trait Platform: Send + Sync {
    /// Get the system page size for memory accounting
    ///
    /// # Returns
    /// Page size in bytes (typically 4096 on most systems)
    fn page_size(&self) -> usize;

    /// Get the number of available CPU cores
    ///
    /// Returns the number of logical processors available to the process.
    /// Used for determining optimal parallelism levels.
    fn cpu_count(&self) -> usize;

    /// Get total physical memory in bytes
    ///
    /// # Errors
    /// Returns error if system information cannot be retrieved
    fn total_memory(&self) -> Result<u64, PlatformError>;

    /// Get available (free) memory in bytes
    ///
    /// # Errors
    /// Returns error if system information cannot be retrieved
    fn available_memory(&self) -> Result<u64, PlatformError>;

    /// Get the current process resident set size in bytes
    ///
    /// # Errors
    /// Returns error if process information cannot be retrieved
    fn process_rss(&self) -> Result<u64, PlatformError>;

    /// Get the cumulative CPU time (user + system) consumed by this process
    ///
    /// # Errors
    /// Returns error if process accounting is unavailable
    fn process_cpu_time(&self) -> Result<Duration, PlatformError>;

    /// Get the platform name
    ///
    /// # Returns
    /// Platform identifier: "linux", "macos", "windows", etc.
    fn platform_name(&self) -> &'static str;

    /// Get the platform-specific temporary directory
    fn temp_dir(&self) -> PathBuf;
}

// === Platform Selection ===

#[cfg(unix)]
type PlatformImpl = UnixPlatform;

#[cfg(windows)]
type PlatformImpl = WindowsPlatform;

/// Create the platform-specific implementation
///
/// Returns the appropriate platform implementation for the current operating
/// system, selected at compile time.
pub fn create_platform() -> Box<dyn Platform> {
    Box::new(PlatformImpl::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_platform() {
        let platform = create_platform();

        // Should have at least one CPU
        assert!(platform.cpu_count() >= 1);

        // Page size should be reasonable
        let page_size = platform.page_size();
        assert!(page_size >= 512);
        assert!(page_size <= 65536);

        // Platform name should not be empty
        assert!(!platform.platform_name().is_empty());
    }

    #[test]
    fn test_memory_queries() {
        let platform = create_platform();

        let total = platform.total_memory().unwrap();
        assert!(total > 0);

        match platform.available_memory() {
            Ok(available) => assert!(available <= total),
            // Platforms without an available-memory source report so
            Err(PlatformError::NotSupported(_)) => {}
            Err(other) => panic!("unexpected platform error: {}", other),
        }
    }

    #[test]
    fn test_process_queries() {
        let platform = create_platform();

        // The test process itself has a nonzero footprint
        let rss = platform.process_rss().unwrap();
        assert!(rss > 0);

        // CPU time is monotone
        let before = platform.process_cpu_time().unwrap();
        let mut acc: u64 = 0;
        for i in 0..200_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        std::hint::black_box(acc);
        let after = platform.process_cpu_time().unwrap();
        assert!(after >= before);
    }
}
