// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Security Profiles
//!
//! Named presets bundling the five security-component configurations, plus
//! the on-disk profile document.
//!
//! A profile file is YAML or JSON (selected by extension) carrying the
//! active profile name and any custom profile definitions; the four
//! built-in presets are always available. There is no schema version:
//! unknown fields are ignored, so older engines read newer files.

use crate::infrastructure::security::audit_log::AuditConfig;
use crate::infrastructure::security::rate_limiter::RateLimitConfig;
use crate::infrastructure::security::resource_guard::GuardLimits;
use crate::infrastructure::security::secure_cache::CacheConfig;
use crate::infrastructure::security::validator::ValidationConfig;
use docbatch_domain::{BatchError, SecurityLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One named bundle of security-component configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    /// Profile name (referenced by `active_profile`)
    pub name: String,
    /// The preset level the profile is derived from
    pub level: SecurityLevel,
    /// Validator knobs
    pub validation: ValidationConfig,
    /// Rate limiter knobs
    pub rate_limit: RateLimitConfig,
    /// Secure cache knobs
    pub cache: CacheConfig,
    /// Resource guard knobs
    pub guard: GuardLimits,
    /// Audit log knobs
    pub audit: AuditConfig,
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self::for_level(SecurityLevel::Standard)
    }
}

impl SecurityProfile {
    /// Builds the preset profile for a level.
    pub fn for_level(level: SecurityLevel) -> Self {
        Self {
            name: level.as_str().to_string(),
            level,
            validation: ValidationConfig::for_level(level),
            rate_limit: RateLimitConfig::for_level(level),
            cache: CacheConfig::for_level(level),
            guard: GuardLimits::for_level(level),
            audit: AuditConfig::for_level(level),
        }
    }
}

/// On-disk profile document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ProfileDocument {
    active_profile: String,
    profiles: Vec<SecurityProfile>,
}

/// In-memory profile store with an active selection.
pub struct SecurityProfileStore {
    profiles: HashMap<String, SecurityProfile>,
    active: String,
}

impl SecurityProfileStore {
    /// Creates a store holding the four built-in presets, with `standard`
    /// active.
    pub fn new() -> Self {
        let mut profiles = HashMap::new();
        for level in [
            SecurityLevel::Basic,
            SecurityLevel::Standard,
            SecurityLevel::Strict,
            SecurityLevel::Paranoid,
        ] {
            let profile = SecurityProfile::for_level(level);
            profiles.insert(profile.name.clone(), profile);
        }
        Self {
            profiles,
            active: SecurityLevel::Standard.as_str().to_string(),
        }
    }

    /// Loads a profile document, layering its definitions over the
    /// built-ins and selecting its active profile.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let contents = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let document: ProfileDocument = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| BatchError::invalid_config(format!("bad profile file {}: {}", path.display(), e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| BatchError::invalid_config(format!("bad profile file {}: {}", path.display(), e)))?,
            other => {
                return Err(BatchError::invalid_config(format!(
                    "unsupported profile file extension: {:?}",
                    other
                )))
            }
        };

        let mut store = Self::new();
        for profile in document.profiles {
            store.profiles.insert(profile.name.clone(), profile);
        }

        if !document.active_profile.is_empty() {
            store.set_active(&document.active_profile)?;
        }

        info!(
            path = %path.display(),
            active = %store.active,
            profiles = store.profiles.len(),
            "security profiles loaded"
        );
        Ok(store)
    }

    /// Writes the store as a profile document.
    pub fn save(&self, path: &Path) -> Result<(), BatchError> {
        let mut profiles: Vec<SecurityProfile> = self.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        let document = ProfileDocument {
            active_profile: self.active.clone(),
            profiles,
        };

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let rendered = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::to_string(&document)
                .map_err(|e| BatchError::SerializationError(e.to_string()))?,
            "json" => serde_json::to_string_pretty(&document)?,
            other => {
                return Err(BatchError::invalid_config(format!(
                    "unsupported profile file extension: {:?}",
                    other
                )))
            }
        };

        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// The active profile.
    ///
    /// The constructor seeds the built-ins and `set_active` validates
    /// names, so the active name always resolves.
    #[allow(clippy::expect_used)]
    pub fn active_profile(&self) -> &SecurityProfile {
        self.profiles
            .get(&self.active)
            .expect("active profile name validated by set_active")
    }

    /// Selects the active profile by name.
    pub fn set_active(&mut self, name: &str) -> Result<(), BatchError> {
        if !self.profiles.contains_key(name) {
            return Err(BatchError::invalid_config(format!("unknown profile: {}", name)));
        }
        self.active = name.to_string();
        Ok(())
    }

    /// Looks up a profile by name.
    pub fn get(&self, name: &str) -> Option<&SecurityProfile> {
        self.profiles.get(name)
    }

    /// Registers or replaces a profile.
    pub fn insert(&mut self, profile: SecurityProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// All profile names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for SecurityProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_presets_present() {
        let store = SecurityProfileStore::new();
        assert_eq!(store.names(), vec!["basic", "paranoid", "standard", "strict"]);
        assert_eq!(store.active_profile().name, "standard");
    }

    #[test]
    fn test_preset_knobs_tighten_with_level() {
        let store = SecurityProfileStore::new();
        let standard = store.get("standard").unwrap();
        let paranoid = store.get("paranoid").unwrap();

        assert!(paranoid.validation.max_content_length < standard.validation.max_content_length);
        assert!(paranoid.rate_limit.user_requests_per_minute < standard.rate_limit.user_requests_per_minute);
        assert!(paranoid.cache.max_size < standard.cache.max_size);
        assert!(paranoid.guard.operation_timeout_secs < standard.guard.operation_timeout_secs);
    }

    #[test]
    fn test_set_active_validates_name() {
        let mut store = SecurityProfileStore::new();
        assert!(store.set_active("strict").is_ok());
        assert!(store.set_active("nonexistent").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("security.yaml");

        let mut store = SecurityProfileStore::new();
        let mut custom = SecurityProfile::for_level(SecurityLevel::Strict);
        custom.name = "team-policy".to_string();
        custom.rate_limit.user_requests_per_minute = 7;
        store.insert(custom);
        store.set_active("team-policy").unwrap();
        store.save(&path).unwrap();

        let loaded = SecurityProfileStore::load(&path).unwrap();
        assert_eq!(loaded.active_profile().name, "team-policy");
        assert_eq!(loaded.active_profile().rate_limit.user_requests_per_minute, 7);
    }

    #[test]
    fn test_json_with_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("security.json");
        std::fs::write(
            &path,
            r#"{
                "active_profile": "basic",
                "some_future_field": {"ignored": true},
                "profiles": []
            }"#,
        )
        .unwrap();

        let loaded = SecurityProfileStore::load(&path).unwrap();
        assert_eq!(loaded.active_profile().name, "basic");
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("security.toml");
        std::fs::write(&path, "x = 1").unwrap();
        assert!(SecurityProfileStore::load(&path).is_err());
    }
}
