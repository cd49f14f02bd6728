// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Secure Cache
//!
//! Encrypted, isolated, TTL-bounded key→value store with integrity tags and
//! configurable eviction.
//!
//! ## Storage model
//!
//! The storage key is `SHA-256(isolation_key ":" logical_key)`, so distinct
//! isolation keys cannot observe each other's entries even when their
//! logical keys collide. Values are AES-256-GCM encrypted under a
//! process-local master key (encryption can be disabled for the
//! performance-mode cache) and carry an HMAC-SHA256 integrity tag over the
//! stored ciphertext. An entry is returned only if it is unexpired and its
//! tag verifies; a tag mismatch poisons the key for all future reads and
//! writes.
//!
//! ## Key rotation
//!
//! When the rotation interval elapses, the next `put` re-encrypts every
//! entry under a fresh master key while holding the write lock. Entries
//! that fail to re-encrypt are marked poisoned rather than silently
//! dropped. The brief admission stall during rotation is expected and
//! observable in metrics.
//!
//! ## In-flight locks
//!
//! `key_lock` hands out a per-normalized-key async mutex; the scheduler
//! holds it across probe → invoke → store so at most one handler runs for
//! any fingerprint at a time.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use docbatch_domain::SecurityLevel;
use parking_lot::RwLock;
use ring::hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Eviction policy for a full cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used
    Lfu,
    /// First in, first out
    Fifo,
}

/// Cache configuration. Unknown fields in profile files are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_size: usize,
    /// Maximum logical key length in bytes
    pub max_key_length: usize,
    /// Maximum serialized value size in bytes
    pub max_value_size: usize,
    /// Default TTL in seconds when none is given
    pub default_ttl_seconds: u64,
    /// Upper TTL clamp
    pub max_ttl_seconds: u64,
    /// Lower TTL clamp
    pub min_ttl_seconds: u64,
    /// Encrypt stored values
    pub enable_encryption: bool,
    /// Eviction policy
    pub eviction_policy: EvictionPolicy,
    /// Master-key rotation interval in seconds (0 disables rotation)
    pub key_rotation_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1_000,
            max_key_length: 1_000,
            max_value_size: 10 * 1024 * 1024,
            default_ttl_seconds: 3_600,
            max_ttl_seconds: 86_400,
            min_ttl_seconds: 60,
            enable_encryption: true,
            eviction_policy: EvictionPolicy::Lru,
            key_rotation_interval_seconds: 86_400,
        }
    }
}

impl CacheConfig {
    /// Preset configuration for a named security level.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Basic => Self {
                enable_encryption: false,
                ..Default::default()
            },
            SecurityLevel::Standard => Self::default(),
            SecurityLevel::Strict => Self {
                max_size: 500,
                default_ttl_seconds: 1_800,
                max_ttl_seconds: 3_600,
                ..Default::default()
            },
            SecurityLevel::Paranoid => Self {
                max_size: 100,
                max_value_size: 1024 * 1024,
                default_ttl_seconds: 900,
                max_ttl_seconds: 1_800,
                key_rotation_interval_seconds: 3_600,
                ..Default::default()
            },
        }
    }

    /// Configuration for the performance-mode cache (no encryption).
    pub fn unencrypted() -> Self {
        Self {
            enable_encryption: false,
            ..Default::default()
        }
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    Expired,
    Invalid,
    Poisoned,
    Error,
}

/// One stored entry.
struct CacheEntry {
    /// Stored bytes (ciphertext when encryption is enabled)
    stored: Vec<u8>,
    created_at: Instant,
    accessed_at: Instant,
    expires_at: Instant,
    access_count: u64,
    insert_seq: u64,
    isolation_key: String,
    integrity_tag: Vec<u8>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    poisoned: HashSet<String>,
    key_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    master_key: Zeroizing<[u8; 32]>,
    key_rotated_at: Instant,
    insert_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    security_violations: u64,
    key_rotations: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Current entry count
    pub size: usize,
    /// Configured capacity
    pub max_size: usize,
    /// Read hits
    pub hits: u64,
    /// Read misses (including expired)
    pub misses: u64,
    /// `hits / (hits + misses)`
    pub hit_rate: f64,
    /// Entries removed by the eviction policy
    pub evictions: u64,
    /// Rejected suspicious writes plus integrity failures
    pub security_violations: u64,
    /// Poisoned key count
    pub poisoned_keys: usize,
    /// Master-key rotations performed
    pub key_rotations: u64,
    /// Whether values are encrypted
    pub encryption_enabled: bool,
}

/// Cache health summary.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    /// "healthy", "warning" or "critical"
    pub status: &'static str,
    /// Outstanding issues
    pub issues: Vec<String>,
}

/// Encrypted, isolated, TTL-bounded cache.
pub struct SecureCache {
    config: CacheConfig,
    state: RwLock<CacheState>,
}

/// Deterministic fingerprint of `(user_id, payload prefix)` used as the
/// envelope's cache key.
pub fn fingerprint(user_id: Option<&str>, payload: &str) -> String {
    let prefix_end = payload
        .char_indices()
        .nth(256)
        .map(|(index, _)| index)
        .unwrap_or(payload.len());
    let mut hasher = Sha256::new();
    hasher.update(user_id.unwrap_or("anonymous").as_bytes());
    hasher.update(b":");
    hasher.update(payload[..prefix_end].as_bytes());
    hex::encode(hasher.finalize())
}

impl SecureCache {
    /// Creates a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                poisoned: HashSet::new(),
                key_locks: HashMap::new(),
                master_key: generate_master_key(),
                key_rotated_at: Instant::now(),
                insert_seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                security_violations: 0,
                key_rotations: 0,
            }),
        }
    }

    /// Creates a cache from a preset level.
    pub fn for_level(level: SecurityLevel) -> Self {
        Self::new(CacheConfig::for_level(level))
    }

    fn normalize_key(key: &str, isolation_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(isolation_key.as_bytes());
        hasher.update(b":");
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn integrity_tag(master_key: &[u8], stored: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, master_key);
        hmac::sign(&key, stored).as_ref().to_vec()
    }

    fn verify_tag(master_key: &[u8], stored: &[u8], tag: &[u8]) -> bool {
        let key = hmac::Key::new(hmac::HMAC_SHA256, master_key);
        hmac::verify(&key, stored, tag).is_ok()
    }

    fn encrypt(&self, master_key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, ()> {
        if !self.config.enable_encryption {
            return Ok(plaintext.to_vec());
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| ())?;
        let mut stored = nonce.as_slice().to_vec();
        stored.append(&mut ciphertext);
        Ok(stored)
    }

    fn decrypt(&self, master_key: &[u8; 32], stored: &[u8]) -> Result<Vec<u8>, ()> {
        if !self.config.enable_encryption {
            return Ok(stored.to_vec());
        }
        if stored.len() < 12 {
            return Err(());
        }
        let (nonce, ciphertext) = stored.split_at(12);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| ())
    }

    /// Heuristic rejection of suspicious writes.
    fn is_suspicious(&self, key: &str, serialized: &[u8]) -> bool {
        if key.len() > self.config.max_key_length {
            return true;
        }
        if key.contains("../") || key.contains("..\\") || key.matches('/').count() > 10 {
            return true;
        }
        if serialized.len() > self.config.max_value_size {
            return true;
        }
        let text = String::from_utf8_lossy(serialized).to_lowercase();
        text.contains("<script") || text.contains("javascript:") || text.contains("eval(")
    }

    fn rotate_key_if_due(&self, state: &mut CacheState) {
        if self.config.key_rotation_interval_seconds == 0 {
            return;
        }
        let interval = Duration::from_secs(self.config.key_rotation_interval_seconds);
        if state.key_rotated_at.elapsed() < interval {
            return;
        }

        let old_key = state.master_key.clone();
        let new_key = generate_master_key();

        let normalized_keys: Vec<String> = state.entries.keys().cloned().collect();
        for normalized in normalized_keys {
            let Some(entry) = state.entries.get_mut(&normalized) else {
                continue;
            };

            let reencrypted = self
                .decrypt(&old_key, &entry.stored)
                .and_then(|plaintext| self.encrypt(&new_key, &plaintext));

            match reencrypted {
                Ok(stored) => {
                    entry.integrity_tag = Self::integrity_tag(new_key.as_slice(), &stored);
                    entry.stored = stored;
                }
                Err(()) => {
                    warn!(key = %truncate_key(&normalized), "re-encryption failed, poisoning entry");
                    state.entries.remove(&normalized);
                    state.poisoned.insert(normalized);
                }
            }
        }

        state.master_key = new_key;
        state.key_rotated_at = Instant::now();
        state.key_rotations += 1;
        info!("cache master key rotated");
    }

    fn evict(&self, state: &mut CacheState) {
        while state.entries.len() > self.config.max_size {
            let victim = match self.config.eviction_policy {
                EvictionPolicy::Lru => state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.accessed_at)
                    .map(|(k, _)| k.clone()),
                EvictionPolicy::Lfu => state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| (e.access_count, e.insert_seq))
                    .map(|(k, _)| k.clone()),
                EvictionPolicy::Fifo => state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.insert_seq)
                    .map(|(k, _)| k.clone()),
            };

            match victim {
                Some(key) => {
                    state.entries.remove(&key);
                    state.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Stores a value under `(isolation_key, key)` with the given TTL.
    ///
    /// Returns `false` (without storing) for suspicious input, poisoned
    /// keys, or serialization failures. The TTL is clamped to the
    /// configured range; rotation runs first when due.
    pub fn put(&self, key: &str, value: &serde_json::Value, ttl: Option<Duration>, isolation_key: &str) -> bool {
        let serialized = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cache value serialization failed: {}", e);
                return false;
            }
        };

        let mut state = self.state.write();

        self.rotate_key_if_due(&mut state);

        if self.is_suspicious(key, &serialized) {
            state.security_violations += 1;
            warn!(key = %truncate_key(key), "suspicious cache write rejected");
            return false;
        }

        let normalized = Self::normalize_key(key, isolation_key);
        if state.poisoned.contains(&normalized) {
            warn!(key = %truncate_key(key), "write to poisoned cache key rejected");
            return false;
        }

        let ttl = ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_seconds));
        let ttl = ttl.clamp(
            Duration::from_secs(self.config.min_ttl_seconds),
            Duration::from_secs(self.config.max_ttl_seconds),
        );

        let stored = match self.encrypt(&state.master_key.clone(), &serialized) {
            Ok(stored) => stored,
            Err(()) => {
                warn!("cache value encryption failed");
                return false;
            }
        };

        let now = Instant::now();
        let integrity_tag = Self::integrity_tag(state.master_key.as_slice(), &stored);
        state.insert_seq += 1;
        let entry = CacheEntry {
            stored,
            created_at: now,
            accessed_at: now,
            expires_at: now + ttl,
            access_count: 0,
            insert_seq: state.insert_seq,
            isolation_key: isolation_key.to_string(),
            integrity_tag,
        };
        state.entries.insert(normalized, entry);

        self.evict(&mut state);
        debug!(key = %truncate_key(key), isolation = isolation_key, ttl_secs = ttl.as_secs(), "cached entry");
        true
    }

    /// Reads a value. Returns the decrypted value on a verified, unexpired
    /// hit; otherwise the status explains the outcome.
    pub fn get(&self, key: &str, isolation_key: &str) -> (Option<serde_json::Value>, CacheStatus) {
        let normalized = Self::normalize_key(key, isolation_key);
        let now = Instant::now();

        let mut state = self.state.write();

        if state.poisoned.contains(&normalized) {
            warn!(key = %truncate_key(key), "read of poisoned cache key");
            return (None, CacheStatus::Poisoned);
        }

        enum ReadOutcome {
            Expired,
            Invalid,
            Verified(Vec<u8>),
        }

        let master_key = state.master_key.clone();
        let outcome = match state.entries.get_mut(&normalized) {
            None => {
                state.misses += 1;
                return (None, CacheStatus::Miss);
            }
            Some(entry) => {
                if entry.is_expired(now) {
                    ReadOutcome::Expired
                } else if !Self::verify_tag(master_key.as_slice(), &entry.stored, &entry.integrity_tag) {
                    ReadOutcome::Invalid
                } else {
                    entry.accessed_at = now;
                    entry.access_count += 1;
                    ReadOutcome::Verified(entry.stored.clone())
                }
            }
        };

        let stored = match outcome {
            ReadOutcome::Expired => {
                state.entries.remove(&normalized);
                state.misses += 1;
                return (None, CacheStatus::Expired);
            }
            ReadOutcome::Invalid => {
                state.entries.remove(&normalized);
                state.poisoned.insert(normalized);
                state.security_violations += 1;
                warn!(key = %truncate_key(key), "cache integrity violation");
                return (None, CacheStatus::Invalid);
            }
            ReadOutcome::Verified(stored) => stored,
        };

        match self
            .decrypt(&master_key, &stored)
            .map_err(|()| ())
            .and_then(|plaintext| serde_json::from_slice(&plaintext).map_err(|_| ()))
        {
            Ok(value) => {
                state.hits += 1;
                (Some(value), CacheStatus::Hit)
            }
            Err(()) => {
                state.entries.remove(&normalized);
                state.poisoned.insert(normalized);
                state.security_violations += 1;
                (None, CacheStatus::Invalid)
            }
        }
    }

    /// Deletes an entry. Returns whether one existed.
    pub fn delete(&self, key: &str, isolation_key: &str) -> bool {
        let normalized = Self::normalize_key(key, isolation_key);
        self.state.write().entries.remove(&normalized).is_some()
    }

    /// Clears entries, optionally only those of one isolation key.
    ///
    /// A full clear also forgets poisoned keys.
    pub fn clear(&self, isolation_key: Option<&str>) -> usize {
        let mut state = self.state.write();
        match isolation_key {
            None => {
                let cleared = state.entries.len();
                state.entries.clear();
                state.poisoned.clear();
                cleared
            }
            Some(isolation) => {
                let keys: Vec<String> = state
                    .entries
                    .iter()
                    .filter(|(_, e)| e.isolation_key == isolation)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &keys {
                    state.entries.remove(key);
                }
                keys.len()
            }
        }
    }

    /// Removes expired entries and stale in-flight locks; returns the
    /// number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();

        // Locks held elsewhere have a strong count above 1.
        state.key_locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        if removed > 0 {
            debug!(removed, "expired cache entries cleaned up");
        }
        removed
    }

    /// Per-normalized-key in-flight lock for fingerprint deduplication.
    pub fn key_lock(&self, key: &str, isolation_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let normalized = Self::normalize_key(key, isolation_key);
        let mut state = self.state.write();
        state
            .key_locks
            .entry(normalized)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        let lookups = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            max_size: self.config.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate: state.hits as f64 / lookups.max(1) as f64,
            evictions: state.evictions,
            security_violations: state.security_violations,
            poisoned_keys: state.poisoned.len(),
            key_rotations: state.key_rotations,
            encryption_enabled: self.config.enable_encryption,
        }
    }

    /// Health summary derived from the statistics.
    pub fn health(&self) -> CacheHealth {
        let stats = self.stats();
        let mut issues = Vec::new();

        if stats.hits + stats.misses > 20 && stats.hit_rate < 0.3 {
            issues.push("low hit rate".to_string());
        }
        if stats.security_violations > 0 {
            issues.push("security violations detected".to_string());
        }
        if stats.poisoned_keys > 0 {
            issues.push("poisoned keys present".to_string());
        }

        let status = match issues.len() {
            0 => "healthy",
            1..=2 => "warning",
            _ => "critical",
        };
        CacheHealth { status, issues }
    }
}

fn generate_master_key() -> Zeroizing<[u8; 32]> {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(key.as_slice());
    Zeroizing::new(bytes)
}

fn truncate_key(key: &str) -> &str {
    match key.char_indices().nth(20) {
        Some((index, _)) => &key[..index],
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tiny_ttl_config() -> CacheConfig {
        CacheConfig {
            min_ttl_seconds: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let cache = SecureCache::new(CacheConfig::default());
        let value = json!({ "answer": 42 });

        assert!(cache.put("k1", &value, None, "alice"));
        let (found, status) = cache.get("k1", "alice");
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(found.unwrap(), value);
    }

    #[test]
    fn test_miss_for_absent_key() {
        let cache = SecureCache::new(CacheConfig::default());
        let (found, status) = cache.get("missing", "alice");
        assert!(found.is_none());
        assert_eq!(status, CacheStatus::Miss);
    }

    #[test]
    fn test_isolation_keys_partition_namespace() {
        let cache = SecureCache::new(CacheConfig::default());
        cache.put("shared-key", &json!("alice's data"), None, "alice");

        // Same logical key, different isolation key: independent
        let (found, status) = cache.get("shared-key", "bob");
        assert!(found.is_none());
        assert_eq!(status, CacheStatus::Miss);

        cache.put("shared-key", &json!("bob's data"), None, "bob");
        assert_eq!(cache.get("shared-key", "alice").0.unwrap(), json!("alice's data"));
        assert_eq!(cache.get("shared-key", "bob").0.unwrap(), json!("bob's data"));
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let cache = SecureCache::new(tiny_ttl_config());
        cache.put("k", &json!(1), Some(Duration::ZERO), "g");

        let (found, status) = cache.get("k", "g");
        assert!(found.is_none());
        assert_eq!(status, CacheStatus::Expired);

        // Second read is a plain miss: the entry is gone
        assert_eq!(cache.get("k", "g").1, CacheStatus::Miss);
    }

    #[test]
    fn test_suspicious_writes_rejected() {
        let cache = SecureCache::new(CacheConfig::default());

        assert!(!cache.put("../../etc/passwd", &json!(1), None, "g"));
        assert!(!cache.put("k", &json!("<script>alert(1)</script>"), None, "g"));
        assert!(!cache.put("k", &json!("javascript:alert(1)"), None, "g"));
        assert_eq!(cache.stats().security_violations, 3);
    }

    #[test]
    fn test_oversize_value_rejected() {
        let config = CacheConfig {
            max_value_size: 16,
            ..Default::default()
        };
        let cache = SecureCache::new(config);
        assert!(!cache.put("k", &json!("a very long value indeed, far past the cap"), None, "g"));
    }

    #[test]
    fn test_lru_eviction() {
        let config = CacheConfig {
            max_size: 2,
            eviction_policy: EvictionPolicy::Lru,
            ..Default::default()
        };
        let cache = SecureCache::new(config);

        cache.put("a", &json!(1), None, "g");
        cache.put("b", &json!(2), None, "g");
        // Touch "a" so "b" becomes least recently used
        cache.get("a", "g");
        cache.put("c", &json!(3), None, "g");

        assert_eq!(cache.get("a", "g").1, CacheStatus::Hit);
        assert_eq!(cache.get("b", "g").1, CacheStatus::Miss);
        assert_eq!(cache.get("c", "g").1, CacheStatus::Hit);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_fifo_eviction() {
        let config = CacheConfig {
            max_size: 2,
            eviction_policy: EvictionPolicy::Fifo,
            ..Default::default()
        };
        let cache = SecureCache::new(config);

        cache.put("first", &json!(1), None, "g");
        cache.put("second", &json!(2), None, "g");
        cache.get("first", "g");
        cache.put("third", &json!(3), None, "g");

        // FIFO ignores recency: the oldest insert goes
        assert_eq!(cache.get("first", "g").1, CacheStatus::Miss);
        assert_eq!(cache.get("second", "g").1, CacheStatus::Hit);
    }

    #[test]
    fn test_lfu_eviction() {
        let config = CacheConfig {
            max_size: 2,
            eviction_policy: EvictionPolicy::Lfu,
            ..Default::default()
        };
        let cache = SecureCache::new(config);

        cache.put("hot", &json!(1), None, "g");
        cache.put("cold", &json!(2), None, "g");
        cache.get("hot", "g");
        cache.get("hot", "g");
        cache.put("new", &json!(3), None, "g");

        assert_eq!(cache.get("hot", "g").1, CacheStatus::Hit);
        assert_eq!(cache.get("cold", "g").1, CacheStatus::Miss);
    }

    #[test]
    fn test_clear_by_isolation_key() {
        let cache = SecureCache::new(CacheConfig::default());
        cache.put("a", &json!(1), None, "alice");
        cache.put("b", &json!(2), None, "alice");
        cache.put("c", &json!(3), None, "bob");

        assert_eq!(cache.clear(Some("alice")), 2);
        assert_eq!(cache.get("c", "bob").1, CacheStatus::Hit);
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = SecureCache::new(tiny_ttl_config());
        cache.put("dies", &json!(1), Some(Duration::ZERO), "g");
        cache.put("lives", &json!(2), Some(Duration::from_secs(60)), "g");

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.get("lives", "g").1, CacheStatus::Hit);
    }

    #[test]
    fn test_key_rotation_preserves_entries() {
        let config = CacheConfig {
            key_rotation_interval_seconds: 1,
            ..Default::default()
        };
        let cache = SecureCache::new(config);
        cache.put("stable", &json!("survives rotation"), None, "g");

        // Force the rotation clock backwards so the next put rotates
        {
            let mut state = cache.state.write();
            state.key_rotated_at = Instant::now() - Duration::from_secs(5);
        }
        cache.put("trigger", &json!(1), None, "g");

        assert_eq!(cache.stats().key_rotations, 1);
        let (found, status) = cache.get("stable", "g");
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(found.unwrap(), json!("survives rotation"));
    }

    #[test]
    fn test_tampered_entry_is_poisoned() {
        let cache = SecureCache::new(CacheConfig::default());
        cache.put("k", &json!(1), None, "g");

        // Corrupt the stored bytes behind the cache's back
        {
            let mut state = cache.state.write();
            let entry = state.entries.values_mut().next().unwrap();
            if let Some(byte) = entry.stored.last_mut() {
                *byte ^= 0xFF;
            }
        }

        let (found, status) = cache.get("k", "g");
        assert!(found.is_none());
        assert_eq!(status, CacheStatus::Invalid);

        // The key is now poisoned for reads and writes
        assert_eq!(cache.get("k", "g").1, CacheStatus::Poisoned);
        assert!(!cache.put("k", &json!(2), None, "g"));
    }

    #[test]
    fn test_unencrypted_mode_round_trip() {
        let cache = SecureCache::new(CacheConfig::unencrypted());
        cache.put("k", &json!({ "plain": true }), None, "g");
        let (found, status) = cache.get("k", "g");
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(found.unwrap(), json!({ "plain": true }));
        assert!(!cache.stats().encryption_enabled);
    }

    #[tokio::test]
    async fn test_key_lock_is_shared_per_key() {
        let cache = SecureCache::new(CacheConfig::default());
        let lock_a1 = cache.key_lock("a", "g");
        let lock_a2 = cache.key_lock("a", "g");
        let lock_b = cache.key_lock("b", "g");

        assert!(Arc::ptr_eq(&lock_a1, &lock_a2));
        assert!(!Arc::ptr_eq(&lock_a1, &lock_b));

        let _held = lock_a1.lock().await;
        assert!(lock_a2.try_lock().is_err());
    }

    #[test]
    fn test_fingerprint_determinism_and_scoping() {
        let a1 = fingerprint(Some("alice"), "same payload");
        let a2 = fingerprint(Some("alice"), "same payload");
        let b = fingerprint(Some("bob"), "same payload");
        assert_eq!(a1, a2);
        assert_ne!(a1, b);

        // Only the prefix participates: long payloads with a shared prefix
        // collapse to one fingerprint
        let long_a = format!("{}{}", "x".repeat(256), "tail one");
        let long_b = format!("{}{}", "x".repeat(256), "tail two");
        assert_eq!(fingerprint(None, &long_a), fingerprint(None, &long_b));
    }

    #[test]
    fn test_health_reports_poisoned_keys() {
        let cache = SecureCache::new(CacheConfig::default());
        assert_eq!(cache.health().status, "healthy");

        cache.put("k", &json!(1), None, "g");
        {
            let mut state = cache.state.write();
            let entry = state.entries.values_mut().next().unwrap();
            entry.integrity_tag[0] ^= 0xFF;
        }
        cache.get("k", "g");

        let health = cache.health();
        assert_ne!(health.status, "healthy");
        assert!(health.issues.iter().any(|i| i.contains("poisoned")));
    }
}
