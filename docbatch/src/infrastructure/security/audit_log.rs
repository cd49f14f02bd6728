// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Log
//!
//! Tamper-evident append-only event journal.
//!
//! ## Line format
//!
//! Each line is `<canonical-JSON>\t<HMAC-SHA256-hex>\n`. The canonical form
//! is the serde serialization with declaration-order fields; the signature
//! covers the exact serialized bytes, so verification re-signs the stored
//! text rather than re-serializing the event. Tampering with any byte of a
//! line invalidates that line only.
//!
//! ## Write path
//!
//! Events below the minimum severity are filtered. A PII masking pass runs
//! before serialization: the injected detector's spans are replaced with
//! the mask character (user ids keep their first/last characters for
//! debuggability) and metadata keys on the redaction list are replaced
//! outright. Standard-and-above modes buffer lines and flush on a timer or
//! when the buffer fills; Basic writes synchronously.
//!
//! ## Rotation & anomaly detection
//!
//! When the current file would exceed its size budget it is renamed to
//! `<name>.<N>` (optionally gzip-compressed) and rotated files beyond the
//! retention count are deleted. A per-`(event_type, subject)` rolling
//! window flags more than 10 occurrences inside any 60-second sub-window
//! as a `SuspiciousActivity` event; the detector never audits its own
//! anomaly events.

use crate::infrastructure::services::pii_masking::PiiMasker;
use docbatch_domain::{BatchError, PiiDetector, SecurityLevel, ThreatLevel};
use parking_lot::Mutex;
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Audit event types, serialized in dotted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "batch.start")]
    BatchStart,
    #[serde(rename = "batch.success")]
    BatchSuccess,
    #[serde(rename = "batch.failure")]
    BatchFailure,
    #[serde(rename = "batch.cancelled")]
    BatchCancelled,
    #[serde(rename = "item.success")]
    ItemSuccess,
    #[serde(rename = "item.failure")]
    ItemFailure,
    #[serde(rename = "item.cache_hit")]
    CacheHit,
    #[serde(rename = "security.rate_limit.exceeded")]
    RateLimitExceeded,
    #[serde(rename = "security.validation.failure")]
    ValidationFailure,
    #[serde(rename = "security.cache_poisoning.detected")]
    CachePoisoningDetected,
    #[serde(rename = "security.resource.violation")]
    ResourceViolation,
    #[serde(rename = "security.circuit.open")]
    CircuitOpen,
    #[serde(rename = "security.suspicious_activity")]
    SuspiciousActivity,
    #[serde(rename = "system.service.start")]
    ServiceStart,
    #[serde(rename = "system.service.stop")]
    ServiceStop,
    #[serde(rename = "system.config.change")]
    ConfigurationChange,
    #[serde(rename = "system.error.occurred")]
    ErrorOccurred,
}

impl AuditEventType {
    /// Whether this is a security-family event.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            AuditEventType::RateLimitExceeded
                | AuditEventType::ValidationFailure
                | AuditEventType::CachePoisoningDetected
                | AuditEventType::ResourceViolation
                | AuditEventType::CircuitOpen
                | AuditEventType::SuspiciousActivity
        )
    }
}

/// Event severity, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl AuditSeverity {
    /// Returns the severity name as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Debug => "debug",
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
            AuditSeverity::Critical => "critical",
        }
    }
}

/// Data classification for compliance tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// Structured audit event.
///
/// Field order is the canonical serialization order; do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<ThreatLevel>,
    #[serde(default)]
    pub security_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub data_classification: DataClassification,
    pub retention_days: u32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// Creates an event with the given type, severity, and message.
    pub fn new(event_type: AuditEventType, severity: AuditSeverity, message: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            timestamp: chrono::Utc::now(),
            message: message.into(),
            user_id: None,
            session_id: None,
            ip_address: None,
            operation: None,
            resource: None,
            action: None,
            result: None,
            threat_level: None,
            security_flags: Vec::new(),
            duration_ms: None,
            data_classification: DataClassification::Internal,
            retention_days: 365,
            metadata: HashMap::new(),
        }
    }

    /// Attaches subject identity fields.
    pub fn with_subject(mut self, user_id: Option<&str>, ip_address: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self.ip_address = ip_address.map(str::to_string);
        self
    }

    /// Attaches the operation name.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attaches the outcome string.
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Attaches a threat level.
    pub fn with_threat_level(mut self, level: ThreatLevel) -> Self {
        self.threat_level = Some(level);
        self
    }

    /// Attaches security flags.
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.security_flags = flags;
        self
    }

    /// Attaches a duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_secs_f64() * 1000.0);
        self
    }

    /// Attaches one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    fn subject(&self) -> String {
        self.user_id.clone().unwrap_or_else(|| "anonymous".to_string())
    }
}

/// Audit configuration. Unknown fields in profile files are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Journal file path
    pub log_file_path: PathBuf,
    /// Rotation threshold in MiB
    pub max_file_size_mb: u64,
    /// Rotated files kept before deletion
    pub max_files: usize,
    /// Gzip-compress rotated files
    pub compress_rotated: bool,
    /// Sign each line with HMAC-SHA256
    pub enable_integrity: bool,
    /// Hex-encoded HMAC key; a per-process random key is generated when
    /// absent
    pub integrity_key_hex: Option<String>,
    /// Run the PII masking pass
    pub enable_pii_masking: bool,
    /// Mask character
    pub pii_mask_char: char,
    /// Keep first/last characters of masked spans
    pub preserve_pii_context: bool,
    /// Events below this severity are dropped
    pub minimum_severity: AuditSeverity,
    /// Metadata keys replaced with `[REDACTED]`
    pub excluded_metadata_keys: HashSet<String>,
    /// Buffer lines and flush on a timer
    pub async_buffering: bool,
    /// Buffered lines before a forced flush
    pub buffer_size: usize,
    /// Timer flush interval in seconds
    pub flush_interval_secs: u64,
    /// Default retention assigned to events
    pub default_retention_days: u32,
    /// Run the per-subject anomaly detector
    pub enable_anomaly_detection: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file_path: PathBuf::from("audit.log"),
            max_file_size_mb: 100,
            max_files: 10,
            compress_rotated: true,
            enable_integrity: true,
            integrity_key_hex: None,
            enable_pii_masking: true,
            pii_mask_char: '*',
            preserve_pii_context: false,
            minimum_severity: AuditSeverity::Info,
            excluded_metadata_keys: ["password", "secret", "key", "token", "private"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            async_buffering: true,
            buffer_size: 1_000,
            flush_interval_secs: 30,
            default_retention_days: 365,
            enable_anomaly_detection: false,
        }
    }
}

impl AuditConfig {
    /// Preset configuration for a named security level.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Basic => Self {
                enable_integrity: false,
                enable_pii_masking: false,
                async_buffering: false,
                ..Default::default()
            },
            SecurityLevel::Standard => Self::default(),
            SecurityLevel::Strict => Self {
                minimum_severity: AuditSeverity::Warning,
                enable_anomaly_detection: true,
                ..Default::default()
            },
            SecurityLevel::Paranoid => Self {
                max_file_size_mb: 50,
                max_files: 20,
                buffer_size: 100,
                flush_interval_secs: 10,
                enable_anomaly_detection: true,
                ..Default::default()
            },
        }
    }
}

/// Audit log statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    /// Events written (post-filter)
    pub events_logged: u64,
    /// Events dropped by severity filter
    pub events_filtered: u64,
    /// Security-family events written
    pub security_events: u64,
    /// Events that had metadata or fields masked
    pub pii_masked_count: u64,
    /// Current journal size in bytes
    pub log_file_size: u64,
    /// Lines waiting in the buffer
    pub buffered_lines: usize,
    /// Event counts by type
    pub events_by_type: HashMap<String, u64>,
    /// Event counts by severity
    pub events_by_severity: HashMap<String, u64>,
}

#[derive(Default)]
struct AuditCounters {
    events_logged: u64,
    events_filtered: u64,
    security_events: u64,
    pii_masked_count: u64,
    by_type: HashMap<String, u64>,
    by_severity: HashMap<String, u64>,
}

struct FileState {
    current_size: u64,
}

/// Tamper-evident audit journal.
pub struct AuditLog {
    config: AuditConfig,
    hmac_key: hmac::Key,
    masker: Option<PiiMasker>,
    file: Mutex<FileState>,
    buffer: Mutex<Vec<String>>,
    anomaly_windows: Mutex<HashMap<(AuditEventType, String), VecDeque<Instant>>>,
    counters: Mutex<AuditCounters>,
    flush_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AuditLog {
    /// Creates an audit log with the given configuration and PII detector.
    pub fn new(config: AuditConfig, pii_detector: Arc<dyn PiiDetector>) -> Result<Arc<Self>, BatchError> {
        if let Some(parent) = config.log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let key_bytes = match &config.integrity_key_hex {
            Some(hex_key) => hex::decode(hex_key)
                .map_err(|e| BatchError::invalid_config(format!("bad integrity key: {}", e)))?,
            None => {
                let rng = ring::rand::SystemRandom::new();
                let key: [u8; 32] = ring::rand::generate(&rng)
                    .map_err(|_| BatchError::internal_error("integrity key generation failed"))?
                    .expose();
                key.to_vec()
            }
        };
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, &key_bytes);

        let masker = if config.enable_pii_masking {
            Some(PiiMasker::new(pii_detector, config.pii_mask_char, config.preserve_pii_context))
        } else {
            None
        };

        let current_size = std::fs::metadata(&config.log_file_path).map(|m| m.len()).unwrap_or(0);

        info!(path = %config.log_file_path.display(), "audit log initialized");

        Ok(Arc::new(Self {
            config,
            hmac_key,
            masker,
            file: Mutex::new(FileState { current_size }),
            buffer: Mutex::new(Vec::new()),
            anomaly_windows: Mutex::new(HashMap::new()),
            counters: Mutex::new(AuditCounters::default()),
            flush_task: Mutex::new(None),
        }))
    }

    /// Creates an audit log from a preset level, writing under the given
    /// directory.
    pub fn for_level(
        level: SecurityLevel,
        directory: &std::path::Path,
        pii_detector: Arc<dyn PiiDetector>,
    ) -> Result<Arc<Self>, BatchError> {
        let config = AuditConfig {
            log_file_path: directory.join("audit.log"),
            ..AuditConfig::for_level(level)
        };
        Self::new(config, pii_detector)
    }

    /// Starts the periodic flush task. Idempotent; a no-op when buffering
    /// is disabled. Requires a running tokio runtime.
    pub fn start_flush_task(self: &Arc<Self>) {
        if !self.config.async_buffering {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("no tokio runtime available; audit flush task not started");
            return;
        }
        let mut slot = self.flush_task.lock();
        if slot.is_some() {
            return;
        }
        let weak: Weak<AuditLog> = Arc::downgrade(self);
        let interval = Duration::from_secs(self.config.flush_interval_secs.max(1));
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(log) = weak.upgrade() else {
                    break;
                };
                log.flush();
            }
        }));
    }

    /// Logs one event.
    pub fn log(&self, event: AuditEvent) {
        if event.severity < self.config.minimum_severity {
            self.counters.lock().events_filtered += 1;
            return;
        }

        let mut event = event;
        event.retention_days = self.config.default_retention_days;

        if self.masker.is_some() {
            event = self.mask_event(event);
        }

        let line = match self.render_line(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("failed to serialize audit event: {}", e);
                return;
            }
        };

        if self.config.async_buffering {
            let flush_now = {
                let mut buffer = self.buffer.lock();
                buffer.push(line);
                buffer.len() >= self.config.buffer_size
            };
            if flush_now {
                self.flush();
            }
        } else {
            self.write_lines(std::slice::from_ref(&line));
        }

        {
            let mut counters = self.counters.lock();
            counters.events_logged += 1;
            if event.event_type.is_security() || event.severity >= AuditSeverity::Error {
                counters.security_events += 1;
            }
            let type_key = serde_json::to_string(&event.event_type)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string();
            *counters.by_type.entry(type_key).or_insert(0) += 1;
            *counters.by_severity.entry(event.severity.as_str().to_string()).or_insert(0) += 1;
        }

        if self.config.enable_anomaly_detection {
            self.detect_anomaly(&event);
        }
    }

    /// Renders the signed line for an event (without trailing newline).
    fn render_line(&self, event: &AuditEvent) -> Result<String, BatchError> {
        let json = serde_json::to_string(event)?;
        if self.config.enable_integrity {
            let tag = hmac::sign(&self.hmac_key, json.as_bytes());
            Ok(format!("{}\t{}", json, hex::encode(tag.as_ref())))
        } else {
            Ok(json)
        }
    }

    /// Verifies a stored line against its trailing HMAC.
    ///
    /// Lines written without integrity checking verify trivially.
    pub fn verify_line(&self, line: &str) -> bool {
        if !self.config.enable_integrity {
            return true;
        }
        let Some((json, signature)) = line.rsplit_once('\t') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature.trim_end()) else {
            return false;
        };
        hmac::verify(&self.hmac_key, json.as_bytes(), &signature).is_ok()
    }

    fn mask_event(&self, mut event: AuditEvent) -> AuditEvent {
        let Some(masker) = &self.masker else {
            return event;
        };

        let mut masked_any = false;

        let masked_message = masker.mask(&event.message);
        if masked_message != event.message {
            event.message = masked_message;
            masked_any = true;
        }

        if let Some(user) = &event.user_id {
            // Partially mask user ids so operators can still correlate
            let masked = masker.mask_with_context(user, true);
            if masked != *user {
                event.user_id = Some(masked);
                masked_any = true;
            }
        }

        if let Some(ip) = &event.ip_address {
            let masked = masker.mask(ip);
            if masked != *ip {
                event.ip_address = Some(masked);
                masked_any = true;
            }
        }

        let excluded = &self.config.excluded_metadata_keys;
        for (key, value) in event.metadata.iter_mut() {
            if excluded.contains(&key.to_lowercase()) {
                *value = serde_json::json!("[REDACTED]");
                masked_any = true;
            } else if let serde_json::Value::String(text) = value {
                let masked = masker.mask(text);
                if masked != *text {
                    *value = serde_json::Value::String(masked);
                    masked_any = true;
                }
            }
        }

        if masked_any {
            self.counters.lock().pii_masked_count += 1;
        }
        event
    }

    /// Flushes buffered lines to the journal.
    pub fn flush(&self) {
        let lines: Vec<String> = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };
        if !lines.is_empty() {
            self.write_lines(&lines);
        }
    }

    fn write_lines(&self, lines: &[String]) {
        let payload: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        let payload_len = payload.len() as u64;

        let mut file = self.file.lock();

        if file.current_size + payload_len > self.config.max_file_size_mb * 1024 * 1024 {
            if let Err(e) = self.rotate(&mut file) {
                error!("audit log rotation failed: {}", e);
            }
        }

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_file_path)
            .and_then(|mut handle| handle.write_all(payload.as_bytes()).and_then(|_| handle.flush()));

        match result {
            Ok(()) => file.current_size += payload_len,
            Err(e) => error!("audit log write failed: {}", e),
        }
    }

    fn rotate(&self, file: &mut FileState) -> std::io::Result<()> {
        let path = &self.config.log_file_path;
        if !path.exists() {
            file.current_size = 0;
            return Ok(());
        }

        // Find the next free rotation suffix
        let mut rotation = 1usize;
        let rotated = loop {
            let candidate = rotated_path(path, rotation, false);
            let compressed = rotated_path(path, rotation, true);
            if !candidate.exists() && !compressed.exists() {
                break candidate;
            }
            rotation += 1;
        };

        std::fs::rename(path, &rotated)?;
        info!(rotated = %rotated.display(), "audit log rotated");

        if self.config.compress_rotated {
            if let Err(e) = compress_file(&rotated) {
                warn!("audit log compression failed: {}", e);
            }
        }

        self.cleanup_rotated()?;
        file.current_size = 0;
        Ok(())
    }

    fn cleanup_rotated(&self) -> std::io::Result<()> {
        let path = &self.config.log_file_path;
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };
        let stem = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut rotated: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{}.", stem)) {
                let modified = entry.metadata()?.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                rotated.push((modified, entry.path()));
            }
        }

        // Newest first; delete beyond the retention count
        rotated.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, stale) in rotated.into_iter().skip(self.config.max_files) {
            debug!(file = %stale.display(), "removing rotated audit file");
            std::fs::remove_file(stale)?;
        }
        Ok(())
    }

    fn detect_anomaly(&self, event: &AuditEvent) {
        // Recursion guard: the detector's own events are not re-analyzed.
        if event.event_type == AuditEventType::SuspiciousActivity {
            return;
        }

        let now = Instant::now();
        let subject = event.subject();
        let frequency = {
            let mut windows = self.anomaly_windows.lock();
            let window = windows.entry((event.event_type, subject.clone())).or_default();
            window.push_back(now);
            while let Some(front) = window.front() {
                if now.duration_since(*front) > Duration::from_secs(3_600) {
                    window.pop_front();
                } else {
                    break;
                }
            }
            window
                .iter()
                .filter(|at| now.duration_since(**at) <= Duration::from_secs(60))
                .count()
        };

        if frequency > 10 {
            warn!(subject = %subject, frequency, "anomalous event frequency");
            self.log(
                AuditEvent::new(
                    AuditEventType::SuspiciousActivity,
                    AuditSeverity::Warning,
                    format!("anomalous activity: {} events in 60s window", frequency),
                )
                .with_subject(event.user_id.as_deref(), event.ip_address.as_deref())
                .with_metadata("frequency", serde_json::json!(frequency)),
            );
        }
    }

    /// Linear scan of the current journal with filters and a result cap.
    pub fn search(
        &self,
        event_type: Option<AuditEventType>,
        user_id: Option<&str>,
        start_time: Option<chrono::DateTime<chrono::Utc>>,
        end_time: Option<chrono::DateTime<chrono::Utc>>,
        max_results: usize,
    ) -> Vec<AuditEvent> {
        self.flush();

        let Ok(contents) = std::fs::read_to_string(&self.config.log_file_path) else {
            warn!("audit log file not found for search");
            return Vec::new();
        };

        let mut events = Vec::new();
        for line in contents.lines() {
            if events.len() >= max_results {
                break;
            }

            let json = line.split('\t').next().unwrap_or(line);
            let Ok(event) = serde_json::from_str::<AuditEvent>(json) else {
                continue;
            };

            if let Some(wanted) = event_type {
                if event.event_type != wanted {
                    continue;
                }
            }
            if let Some(user) = user_id {
                if event.user_id.as_deref() != Some(user) {
                    continue;
                }
            }
            if let Some(start) = start_time {
                if event.timestamp < start {
                    continue;
                }
            }
            if let Some(end) = end_time {
                if event.timestamp > end {
                    continue;
                }
            }

            events.push(event);
        }
        events
    }

    /// Audit statistics.
    pub fn stats(&self) -> AuditStats {
        let counters = self.counters.lock();
        AuditStats {
            events_logged: counters.events_logged,
            events_filtered: counters.events_filtered,
            security_events: counters.security_events,
            pii_masked_count: counters.pii_masked_count,
            log_file_size: self.file.lock().current_size,
            buffered_lines: self.buffer.lock().len(),
            events_by_type: counters.by_type.clone(),
            events_by_severity: counters.by_severity.clone(),
        }
    }

    /// Flushes the buffer and stops the flush task.
    pub fn cleanup(&self) {
        self.flush();
        if let Some(handle) = self.flush_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if let Some(handle) = self.flush_task.lock().take() {
            handle.abort();
        }
    }
}

fn rotated_path(path: &std::path::Path, rotation: usize, compressed: bool) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", rotation));
    if compressed {
        name.push(".gz");
    }
    PathBuf::from(name)
}

fn compress_file(path: &std::path::Path) -> std::io::Result<()> {
    let contents = std::fs::read(path)?;
    let compressed_path = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    };

    let out = std::fs::File::create(&compressed_path)?;
    let mut encoder = flate2::write::GzEncoder::new(out, flate2::Compression::default());
    encoder.write_all(&contents)?;
    encoder.finish()?;

    std::fs::remove_file(path)?;
    debug!(file = %compressed_path.display(), "compressed rotated audit file");
    Ok(())
}
