// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Unix Platform Implementation
//!
//! POSIX implementation covering Linux and macOS.
//!
//! ## APIs Used
//!
//! - `sysconf(_SC_PHYS_PAGES)` / `sysconf(_SC_PAGESIZE)` - total memory
//! - `/proc/meminfo` (`MemAvailable`) on Linux - available memory; the
//!   `_SC_AVPHYS_PAGES` value counts only free pages and badly understates
//!   what the kernel can actually reclaim
//! - `/proc/self/statm` on Linux - process resident set size
//! - `getrusage(RUSAGE_SELF)` - CPU time, and RSS fallback on macOS

use super::{Platform, PlatformError};
use std::path::PathBuf;
use std::time::Duration;

/// Unix platform implementation
pub struct UnixPlatform;

impl UnixPlatform {
    /// Create a new Unix platform instance
    pub fn new() -> Self {
        Self
    }

    fn sysconf(name: libc::c_int) -> Option<u64> {
        let value = unsafe { libc::sysconf(name) };
        if value > 0 {
            Some(value as u64)
        } else {
            None
        }
    }

    /// Parse a `kB` field out of /proc/meminfo, e.g. `MemAvailable: 12345 kB`
    #[cfg(target_os = "linux")]
    fn meminfo_field(field: &str) -> Option<u64> {
        let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix(field) {
                let kb: u64 = rest
                    .trim_start_matches(':')
                    .trim()
                    .split_whitespace()
                    .next()?
                    .parse()
                    .ok()?;
                return Some(kb * 1024);
            }
        }
        None
    }

    fn rusage_self() -> Result<libc::rusage, PlatformError> {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if rc == 0 {
            Ok(usage)
        } else {
            Err(PlatformError::Other("getrusage failed".to_string()))
        }
    }
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for UnixPlatform {
    fn page_size(&self) -> usize {
        Self::sysconf(libc::_SC_PAGESIZE).unwrap_or(4096) as usize
    }

    fn cpu_count(&self) -> usize {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        let pages = Self::sysconf(libc::_SC_PHYS_PAGES)
            .ok_or_else(|| PlatformError::Other("sysconf(_SC_PHYS_PAGES) failed".to_string()))?;
        Ok(pages * self.page_size() as u64)
    }

    fn available_memory(&self) -> Result<u64, PlatformError> {
        #[cfg(target_os = "linux")]
        {
            if let Some(available) = Self::meminfo_field("MemAvailable") {
                return Ok(available);
            }
            // Fallback: free pages only (/proc unavailable)
            let pages = Self::sysconf(libc::_SC_AVPHYS_PAGES)
                .ok_or_else(|| PlatformError::NotSupported("no available-memory source".to_string()))?;
            Ok(pages * self.page_size() as u64)
        }

        // macOS has no _SC_AVPHYS_PAGES; callers fall back to their own
        // conservative estimate when this errors.
        #[cfg(not(target_os = "linux"))]
        {
            Err(PlatformError::NotSupported(
                "available memory query not supported on this platform".to_string(),
            ))
        }
    }

    fn process_rss(&self) -> Result<u64, PlatformError> {
        #[cfg(target_os = "linux")]
        {
            // /proc/self/statm: size resident shared text lib data dt (in pages)
            let statm = std::fs::read_to_string("/proc/self/statm")?;
            if let Some(resident) = statm.split_whitespace().nth(1) {
                if let Ok(pages) = resident.parse::<u64>() {
                    return Ok(pages * self.page_size() as u64);
                }
            }
        }

        // Fallback: peak RSS from getrusage. Linux reports kilobytes, macOS
        // reports bytes.
        let usage = Self::rusage_self()?;
        let maxrss = usage.ru_maxrss as u64;
        #[cfg(target_os = "macos")]
        let rss = maxrss;
        #[cfg(not(target_os = "macos"))]
        let rss = maxrss * 1024;
        Ok(rss)
    }

    fn process_cpu_time(&self) -> Result<Duration, PlatformError> {
        let usage = Self::rusage_self()?;
        let user = Duration::new(usage.ru_utime.tv_sec as u64, (usage.ru_utime.tv_usec as u32) * 1000);
        let system = Duration::new(usage.ru_stime.tv_sec as u64, (usage.ru_stime.tv_usec as u32) * 1000);
        Ok(user + system)
    }

    fn platform_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "linux"
        }
        #[cfg(target_os = "macos")]
        {
            "macos"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            "unix"
        }
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_platform_basics() {
        let platform = UnixPlatform::new();

        assert!(platform.cpu_count() >= 1);

        let page_size = platform.page_size();
        assert!(page_size >= 512);
        assert!(page_size <= 65536);
    }

    #[test]
    fn test_total_memory_positive() {
        let platform = UnixPlatform::new();
        assert!(platform.total_memory().unwrap() > 0);
    }

    #[test]
    fn test_cpu_time_accumulates() {
        let platform = UnixPlatform::new();
        let t = platform.process_cpu_time().unwrap();
        // A freshly started test process has consumed some CPU already
        assert!(t >= Duration::ZERO);
    }
}
