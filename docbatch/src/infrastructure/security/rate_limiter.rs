// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Multi-Level Rate Limiter
//!
//! Admission control with three enforcement tiers, checked on every request:
//!
//! 1. **User tier**: token bucket + sliding windows at 60 s / 3600 s /
//!    86400 s + hourly/daily cost ceilings + per-operation sub-windows
//! 2. **IP tier**: token bucket + windows + bandwidth-per-minute ceiling
//! 3. **Global tier**: larger bucket + minute/hour windows
//!
//! ## Admission order
//!
//! Blacklist (hard deny) → whitelist (hard allow) → active burst penalty →
//! per-identifier circuit breaker → global limits → user limits → IP limits
//! → concurrent-count limits. Limit violations are *accumulated*, not
//! short-circuited; a request with two or more violations also earns a
//! burst penalty (fixed-duration deny-list entry).
//!
//! ## Concurrency accounting
//!
//! Counters are incremented on admit and must be decremented via
//! [`RateLimiter::release`]; the scheduler guarantees this on all paths.
//! Counters saturate at zero: a release without a matching admit (e.g. on a
//! whitelisted path) is a no-op, never an underflow.
//!
//! ## Failure feedback
//!
//! The per-identifier circuit breaker counts both rate-limit violations and
//! downstream operation failures reported by the scheduler through
//! [`RateLimiter::record_outcome`]. Fail-secure: anything unexpected denies
//! the request.

use docbatch_domain::SecurityLevel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-operation sub-window limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationLimits {
    /// Requests per minute for this operation, if bounded
    pub requests_per_minute: Option<usize>,
    /// Requests per hour for this operation, if bounded
    pub requests_per_hour: Option<usize>,
}

/// Rate limiter configuration. Unknown fields in profile files are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    // User-level limits
    pub user_requests_per_minute: usize,
    pub user_requests_per_hour: usize,
    pub user_requests_per_day: usize,
    pub user_cost_per_hour: f64,
    pub user_cost_per_day: f64,
    pub user_concurrent_requests: usize,

    // IP-level limits
    pub ip_requests_per_minute: usize,
    pub ip_requests_per_hour: usize,
    pub ip_requests_per_day: usize,
    pub ip_concurrent_requests: usize,
    pub ip_bandwidth_per_minute: u64,

    // Global system limits
    pub global_requests_per_minute: usize,
    pub global_requests_per_hour: usize,
    pub global_concurrent_requests: usize,

    // Per-operation sub-windows, keyed by operation name
    pub operation_limits: HashMap<String, OperationLimits>,

    // Token bucket parameters
    pub bucket_size: usize,
    pub refill_rate: f64,

    // Circuit breaker parameters
    pub circuit_failure_threshold: u32,
    pub circuit_timeout_seconds: u64,

    // Burst protection
    pub enable_burst_protection: bool,
    pub burst_penalty_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_requests_per_minute: 100,
            user_requests_per_hour: 1_000,
            user_requests_per_day: 10_000,
            user_cost_per_hour: 5.0,
            user_cost_per_day: 50.0,
            user_concurrent_requests: 10,
            ip_requests_per_minute: 200,
            ip_requests_per_hour: 2_000,
            ip_requests_per_day: 20_000,
            ip_concurrent_requests: 20,
            ip_bandwidth_per_minute: 10 * 1024 * 1024,
            global_requests_per_minute: 10_000,
            global_requests_per_hour: 100_000,
            global_concurrent_requests: 500,
            operation_limits: HashMap::new(),
            bucket_size: 100,
            refill_rate: 10.0,
            circuit_failure_threshold: 10,
            circuit_timeout_seconds: 60,
            enable_burst_protection: true,
            burst_penalty_seconds: 300,
        }
    }
}

impl RateLimitConfig {
    /// Preset configuration for a named security level.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Basic => Self {
                user_requests_per_minute: 200,
                ip_requests_per_minute: 500,
                global_requests_per_minute: 20_000,
                enable_burst_protection: false,
                ..Default::default()
            },
            SecurityLevel::Standard => Self::default(),
            SecurityLevel::Strict => Self {
                user_requests_per_minute: 50,
                user_requests_per_hour: 500,
                user_concurrent_requests: 5,
                ip_requests_per_minute: 100,
                ip_requests_per_hour: 1_000,
                global_requests_per_minute: 5_000,
                burst_penalty_seconds: 600,
                ..Default::default()
            },
            SecurityLevel::Paranoid => Self {
                user_requests_per_minute: 20,
                user_requests_per_hour: 200,
                user_requests_per_day: 2_000,
                user_concurrent_requests: 3,
                ip_requests_per_minute: 50,
                ip_requests_per_hour: 500,
                ip_requests_per_day: 5_000,
                global_requests_per_minute: 2_000,
                burst_penalty_seconds: 900,
                circuit_failure_threshold: 5,
                ..Default::default()
            },
        }
    }
}

/// Result status of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStatus {
    Allowed,
    RateLimited,
    CircuitOpen,
    Blocked,
}

/// Decision returned by [`RateLimiter::check`].
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    /// Overall status
    pub status: RateLimitStatus,
    /// Whether the request may proceed
    pub allowed: bool,
    /// Names of all violated limits
    pub violations: Vec<String>,
    /// Diagnostic metadata (current counts)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RateLimitDecision {
    fn allowed() -> Self {
        Self {
            status: RateLimitStatus::Allowed,
            allowed: true,
            violations: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    fn denied(status: RateLimitStatus, violations: Vec<String>) -> Self {
        Self {
            status,
            allowed: false,
            violations,
            metadata: HashMap::new(),
        }
    }
}

/// Thread-safe token bucket.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: usize, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate,
            tokens: capacity as f64,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    fn consume(&mut self, tokens: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }
}

/// Time-bounded request counter.
#[derive(Debug)]
struct SlidingWindow {
    window: Duration,
    max_requests: usize,
    requests: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            requests: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.requests.front() {
            if now.duration_since(*front) > self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admits the request (recording it) or reports the window as full.
    fn try_admit(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.requests.len() < self.max_requests {
            self.requests.push_back(now);
            true
        } else {
            false
        }
    }

    fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.requests.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-identifier circuit breaker.
#[derive(Debug)]
struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    failure_count: u32,
    last_failure: Option<Instant>,
    state: BreakerState,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            timeout,
            failure_count: 0,
            last_failure: None,
            state: BreakerState::Closed,
        }
    }

    fn call_allowed(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|at| now.duration_since(at))
                    .unwrap_or(Duration::ZERO);
                if elapsed > self.timeout {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => true,
        }
    }

    fn record_success(&mut self) {
        if self.state == BreakerState::HalfOpen {
            self.state = BreakerState::Closed;
            self.failure_count = 0;
        }
    }

    fn record_failure(&mut self, now: Instant) {
        self.failure_count += 1;
        self.last_failure = Some(now);
        if self.failure_count >= self.failure_threshold {
            self.state = BreakerState::Open;
        }
    }
}

#[derive(Default)]
struct UserState {
    bucket: Option<TokenBucket>,
    minute: Option<SlidingWindow>,
    hour: Option<SlidingWindow>,
    day: Option<SlidingWindow>,
    operation_windows: HashMap<String, SlidingWindow>,
    hour_costs: HashMap<u64, f64>,
    day_costs: HashMap<u64, f64>,
}

#[derive(Default)]
struct IpState {
    bucket: Option<TokenBucket>,
    minute: Option<SlidingWindow>,
    hour: Option<SlidingWindow>,
    day: Option<SlidingWindow>,
    bandwidth: HashMap<u64, u64>,
}

struct LimiterState {
    users: HashMap<String, UserState>,
    ips: HashMap<String, IpState>,
    global_bucket: TokenBucket,
    global_minute: SlidingWindow,
    global_hour: SlidingWindow,
    breakers: HashMap<String, CircuitBreaker>,
    concurrent: HashMap<String, usize>,
    global_concurrent: usize,
    whitelisted_users: HashSet<String>,
    whitelisted_ips: HashSet<String>,
    blacklisted_users: HashSet<String>,
    blacklisted_ips: HashSet<String>,
    burst_penalties: HashMap<String, Instant>,
    started_at: Instant,
    request_count: u64,
    blocked_count: u64,
    violation_tally: HashMap<String, u64>,
}

/// Rate limiter statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    /// Total admission checks
    pub request_count: u64,
    /// Denied admissions
    pub blocked_count: u64,
    /// `blocked_count / request_count`
    pub block_rate: f64,
    /// Distinct users with active state
    pub active_users: usize,
    /// Distinct IPs with active state
    pub active_ips: usize,
    /// Identifiers with circuit breakers
    pub active_circuits: usize,
    /// Global in-flight count
    pub concurrent_requests: usize,
    /// Violation counts by limit name
    pub limit_violations: HashMap<String, u64>,
    /// Identifiers currently serving a burst penalty
    pub burst_penalties: usize,
}

/// Identifier kind for allow/deny list management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    User,
    Ip,
}

/// Multi-level rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        let global_bucket = TokenBucket::new(config.bucket_size * 10, config.refill_rate * 5.0);
        let global_minute = SlidingWindow::new(Duration::from_secs(60), config.global_requests_per_minute);
        let global_hour = SlidingWindow::new(Duration::from_secs(3600), config.global_requests_per_hour);

        Self {
            config,
            state: Mutex::new(LimiterState {
                users: HashMap::new(),
                ips: HashMap::new(),
                global_bucket,
                global_minute,
                global_hour,
                breakers: HashMap::new(),
                concurrent: HashMap::new(),
                global_concurrent: 0,
                whitelisted_users: HashSet::new(),
                whitelisted_ips: HashSet::new(),
                blacklisted_users: HashSet::new(),
                blacklisted_ips: HashSet::new(),
                burst_penalties: HashMap::new(),
                started_at: Instant::now(),
                request_count: 0,
                blocked_count: 0,
                violation_tally: HashMap::new(),
            }),
        }
    }

    /// Creates a limiter from a preset level.
    pub fn for_level(level: SecurityLevel) -> Self {
        Self::new(RateLimitConfig::for_level(level))
    }

    /// Checks all admission tiers for one request.
    ///
    /// On an allowed decision the concurrent counters have been
    /// incremented; the caller must pair it with [`release`](Self::release)
    /// on every path.
    pub fn check(
        &self,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        operation: &str,
        cost: f64,
        content_size: usize,
    ) -> RateLimitDecision {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.request_count += 1;

        // 1-2. Blacklist / whitelist
        if let Some(ip) = ip_address {
            if state.blacklisted_ips.contains(ip) {
                state.blocked_count += 1;
                return RateLimitDecision::denied(RateLimitStatus::Blocked, vec!["ip_blacklisted".to_string()]);
            }
        }
        if let Some(user) = user_id {
            if state.blacklisted_users.contains(user) {
                state.blocked_count += 1;
                return RateLimitDecision::denied(RateLimitStatus::Blocked, vec!["user_blacklisted".to_string()]);
            }
        }
        let whitelisted = user_id.map(|u| state.whitelisted_users.contains(u)).unwrap_or(false)
            || ip_address.map(|ip| state.whitelisted_ips.contains(ip)).unwrap_or(false);
        if whitelisted {
            // Bypasses all remaining checks; no concurrent accounting.
            return RateLimitDecision::allowed();
        }

        // 3. Burst-penalty window
        let penalty_key = user_id.or(ip_address).map(str::to_string);
        if let Some(key) = &penalty_key {
            match state.burst_penalties.get(key).copied() {
                Some(until) if now < until => {
                    state.blocked_count += 1;
                    return RateLimitDecision::denied(RateLimitStatus::Blocked, vec!["burst_penalty".to_string()]);
                }
                Some(_) => {
                    state.burst_penalties.remove(key);
                }
                None => {}
            }
        }

        // 4. Circuit breaker for the identifier
        let circuit_key = penalty_key.clone().unwrap_or_else(|| "global".to_string());
        let circuit_blocked = state
            .breakers
            .get_mut(&circuit_key)
            .map(|breaker| !breaker.call_allowed(now))
            .unwrap_or(false);
        if circuit_blocked {
            state.blocked_count += 1;
            return RateLimitDecision::denied(RateLimitStatus::CircuitOpen, vec!["circuit_breaker".to_string()]);
        }

        // 5-8. Accumulate limit violations
        let mut violations: Vec<String> = Vec::new();
        let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();

        self.check_global(&mut state, now, &mut violations, &mut metadata);
        if let Some(user) = user_id {
            self.check_user(&mut state, user, operation, cost, now, &mut violations, &mut metadata);
        }
        if let Some(ip) = ip_address {
            self.check_ip(&mut state, ip, content_size, now, &mut violations, &mut metadata);
        }
        self.check_concurrent(&mut state, user_id, ip_address, &mut violations, &mut metadata);

        if violations.is_empty() {
            if let Some(breaker) = state.breakers.get_mut(&circuit_key) {
                breaker.record_success();
            }

            if let Some(user) = user_id {
                *state.concurrent.entry(format!("user:{}", user)).or_insert(0) += 1;
            }
            if let Some(ip) = ip_address {
                *state.concurrent.entry(format!("ip:{}", ip)).or_insert(0) += 1;
            }
            state.global_concurrent += 1;

            let mut decision = RateLimitDecision::allowed();
            decision.metadata = metadata;
            return decision;
        }

        // Denied path: tally, burst penalty, breaker feedback.
        state.blocked_count += 1;
        for violation in &violations {
            *state.violation_tally.entry(violation.clone()).or_insert(0) += 1;
        }

        if self.config.enable_burst_protection && violations.len() >= 2 {
            if let Some(key) = &penalty_key {
                let until = now + Duration::from_secs(self.config.burst_penalty_seconds);
                state.burst_penalties.insert(key.clone(), until);
                violations.push("burst_penalty_applied".to_string());
            }
        }

        if !circuit_key.is_empty() {
            let threshold = self.config.circuit_failure_threshold;
            let timeout = Duration::from_secs(self.config.circuit_timeout_seconds);
            state
                .breakers
                .entry(circuit_key)
                .or_insert_with(|| CircuitBreaker::new(threshold, timeout))
                .record_failure(now);
        }

        warn!(user = ?user_id, ip = ?ip_address, ?violations, "rate limit violations");

        let mut decision = RateLimitDecision::denied(RateLimitStatus::RateLimited, violations);
        decision.metadata = metadata;
        decision
    }

    fn check_global(
        &self,
        state: &mut LimiterState,
        now: Instant,
        violations: &mut Vec<String>,
        metadata: &mut HashMap<String, serde_json::Value>,
    ) {
        if !state.global_bucket.consume(1.0, now) {
            violations.push("global_token_bucket".to_string());
        }
        if !state.global_minute.try_admit(now) {
            violations.push("global_minute".to_string());
            metadata.insert(
                "global_minute_requests".to_string(),
                serde_json::json!(state.global_minute.count(now)),
            );
        }
        if !state.global_hour.try_admit(now) {
            violations.push("global_hour".to_string());
            metadata.insert(
                "global_hour_requests".to_string(),
                serde_json::json!(state.global_hour.count(now)),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_user(
        &self,
        state: &mut LimiterState,
        user: &str,
        operation: &str,
        cost: f64,
        now: Instant,
        violations: &mut Vec<String>,
        metadata: &mut HashMap<String, serde_json::Value>,
    ) {
        let config = &self.config;
        let started_at = state.started_at;
        let user_state = state.users.entry(user.to_string()).or_default();

        let bucket = user_state
            .bucket
            .get_or_insert_with(|| TokenBucket::new(config.bucket_size, config.refill_rate));
        if !bucket.consume(1.0, now) {
            violations.push("user_token_bucket".to_string());
        }

        let minute = user_state
            .minute
            .get_or_insert_with(|| SlidingWindow::new(Duration::from_secs(60), config.user_requests_per_minute));
        if !minute.try_admit(now) {
            violations.push("user_minute".to_string());
            metadata.insert("user_minute_requests".to_string(), serde_json::json!(minute.count(now)));
        }

        let hour = user_state
            .hour
            .get_or_insert_with(|| SlidingWindow::new(Duration::from_secs(3600), config.user_requests_per_hour));
        if !hour.try_admit(now) {
            violations.push("user_hour".to_string());
        }

        let day = user_state
            .day
            .get_or_insert_with(|| SlidingWindow::new(Duration::from_secs(86_400), config.user_requests_per_day));
        if !day.try_admit(now) {
            violations.push("user_day".to_string());
        }

        // Cost ceilings, bucketed by wall-clock hour/day since limiter start
        if cost > 0.0 {
            let elapsed = now.duration_since(started_at).as_secs();
            let hour_index = elapsed / 3600;
            let day_index = elapsed / 86_400;

            let hourly = user_state.hour_costs.entry(hour_index).or_insert(0.0);
            let daily = user_state.day_costs.entry(day_index).or_insert(0.0);

            let mut over_budget = false;
            if *hourly + cost > config.user_cost_per_hour {
                violations.push("user_cost_hourly".to_string());
                metadata.insert("user_hourly_cost".to_string(), serde_json::json!(*hourly + cost));
                over_budget = true;
            }
            if *daily + cost > config.user_cost_per_day {
                violations.push("user_cost_daily".to_string());
                metadata.insert("user_daily_cost".to_string(), serde_json::json!(*daily + cost));
                over_budget = true;
            }
            if !over_budget {
                *hourly += cost;
                *daily += cost;
            }
        }

        // Per-operation sub-windows
        if let Some(limits) = config.operation_limits.get(operation) {
            if let Some(per_minute) = limits.requests_per_minute {
                let key = format!("{}_minute", operation);
                let window = user_state
                    .operation_windows
                    .entry(key)
                    .or_insert_with(|| SlidingWindow::new(Duration::from_secs(60), per_minute));
                if !window.try_admit(now) {
                    violations.push(format!("user_operation_{}_minute", operation));
                }
            }
            if let Some(per_hour) = limits.requests_per_hour {
                let key = format!("{}_hour", operation);
                let window = user_state
                    .operation_windows
                    .entry(key)
                    .or_insert_with(|| SlidingWindow::new(Duration::from_secs(3600), per_hour));
                if !window.try_admit(now) {
                    violations.push(format!("user_operation_{}_hour", operation));
                }
            }
        }
    }

    fn check_ip(
        &self,
        state: &mut LimiterState,
        ip: &str,
        content_size: usize,
        now: Instant,
        violations: &mut Vec<String>,
        metadata: &mut HashMap<String, serde_json::Value>,
    ) {
        let config = &self.config;
        let started_at = state.started_at;
        let ip_state = state.ips.entry(ip.to_string()).or_default();

        let bucket = ip_state
            .bucket
            .get_or_insert_with(|| TokenBucket::new(config.bucket_size, config.refill_rate));
        if !bucket.consume(1.0, now) {
            violations.push("ip_token_bucket".to_string());
        }

        let minute = ip_state
            .minute
            .get_or_insert_with(|| SlidingWindow::new(Duration::from_secs(60), config.ip_requests_per_minute));
        if !minute.try_admit(now) {
            violations.push("ip_minute".to_string());
            metadata.insert("ip_minute_requests".to_string(), serde_json::json!(minute.count(now)));
        }

        let hour = ip_state
            .hour
            .get_or_insert_with(|| SlidingWindow::new(Duration::from_secs(3600), config.ip_requests_per_hour));
        if !hour.try_admit(now) {
            violations.push("ip_hour".to_string());
        }

        let day = ip_state
            .day
            .get_or_insert_with(|| SlidingWindow::new(Duration::from_secs(86_400), config.ip_requests_per_day));
        if !day.try_admit(now) {
            violations.push("ip_day".to_string());
        }

        if content_size > 0 {
            let minute_index = now.duration_since(started_at).as_secs() / 60;
            // Keep only the current minute's accumulator.
            ip_state.bandwidth.retain(|index, _| *index == minute_index);
            let used = ip_state.bandwidth.entry(minute_index).or_insert(0);
            *used += content_size as u64;
            if *used > config.ip_bandwidth_per_minute {
                violations.push("ip_bandwidth".to_string());
                metadata.insert("ip_bandwidth_bytes".to_string(), serde_json::json!(*used));
            }
        }
    }

    fn check_concurrent(
        &self,
        state: &mut LimiterState,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        violations: &mut Vec<String>,
        metadata: &mut HashMap<String, serde_json::Value>,
    ) {
        if state.global_concurrent >= self.config.global_concurrent_requests {
            violations.push("global_concurrent".to_string());
            metadata.insert("global_concurrent".to_string(), serde_json::json!(state.global_concurrent));
        }

        if let Some(user) = user_id {
            let current = state.concurrent.get(&format!("user:{}", user)).copied().unwrap_or(0);
            if current >= self.config.user_concurrent_requests {
                violations.push("user_concurrent".to_string());
                metadata.insert("user_concurrent".to_string(), serde_json::json!(current));
            }
        }

        if let Some(ip) = ip_address {
            let current = state.concurrent.get(&format!("ip:{}", ip)).copied().unwrap_or(0);
            if current >= self.config.ip_concurrent_requests {
                violations.push("ip_concurrent".to_string());
                metadata.insert("ip_concurrent".to_string(), serde_json::json!(current));
            }
        }
    }

    /// Releases one admitted request's concurrent-count slots.
    ///
    /// Saturating: releasing an identity that was never admitted (or was
    /// whitelisted past the counters) is a no-op.
    pub fn release(&self, user_id: Option<&str>, ip_address: Option<&str>) {
        let mut state = self.state.lock();

        if let Some(user) = user_id {
            let key = format!("user:{}", user);
            if let Some(count) = state.concurrent.get_mut(&key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.concurrent.remove(&key);
                }
            }
        }
        if let Some(ip) = ip_address {
            let key = format!("ip:{}", ip);
            if let Some(count) = state.concurrent.get_mut(&key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.concurrent.remove(&key);
                }
            }
        }

        state.global_concurrent = state.global_concurrent.saturating_sub(1);
    }

    /// Feeds a downstream operation outcome into the identifier's circuit
    /// breaker.
    pub fn record_outcome(&self, user_id: Option<&str>, ip_address: Option<&str>, success: bool) {
        let Some(key) = user_id.or(ip_address) else {
            return;
        };
        let now = Instant::now();
        let mut state = self.state.lock();
        let threshold = self.config.circuit_failure_threshold;
        let timeout = Duration::from_secs(self.config.circuit_timeout_seconds);
        let breaker = state
            .breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::new(threshold, timeout));
        if success {
            breaker.record_success();
        } else {
            breaker.record_failure(now);
        }
    }

    /// Adds an identifier to the whitelist.
    pub fn add_to_whitelist(&self, identifier: &str, kind: IdentifierKind) {
        let mut state = self.state.lock();
        match kind {
            IdentifierKind::User => state.whitelisted_users.insert(identifier.to_string()),
            IdentifierKind::Ip => state.whitelisted_ips.insert(identifier.to_string()),
        };
        info!(identifier, ?kind, "added to whitelist");
    }

    /// Adds an identifier to the blacklist.
    pub fn add_to_blacklist(&self, identifier: &str, kind: IdentifierKind) {
        let mut state = self.state.lock();
        match kind {
            IdentifierKind::User => state.blacklisted_users.insert(identifier.to_string()),
            IdentifierKind::Ip => state.blacklisted_ips.insert(identifier.to_string()),
        };
        warn!(identifier, ?kind, "added to blacklist");
    }

    /// Current global concurrent count (for invariant checks).
    pub fn concurrent_count(&self) -> usize {
        self.state.lock().global_concurrent
    }

    /// Rate limiting statistics.
    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock();
        RateLimiterStats {
            request_count: state.request_count,
            blocked_count: state.blocked_count,
            block_rate: state.blocked_count as f64 / state.request_count.max(1) as f64,
            active_users: state.users.len(),
            active_ips: state.ips.len(),
            active_circuits: state.breakers.len(),
            concurrent_requests: state.global_concurrent,
            limit_violations: state.violation_tally.clone(),
            burst_penalties: state.burst_penalties.len(),
        }
    }

    /// Resets statistics counters (limits and penalties stay).
    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        state.request_count = 0;
        state.blocked_count = 0;
        state.violation_tally.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_config() -> RateLimitConfig {
        RateLimitConfig {
            user_requests_per_minute: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_request_allowed() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let decision = limiter.check(Some("alice"), Some("10.0.0.1"), "enhance", 0.0, 100);
        assert!(decision.allowed);
        assert_eq!(limiter.concurrent_count(), 1);
        limiter.release(Some("alice"), Some("10.0.0.1"));
        assert_eq!(limiter.concurrent_count(), 0);
    }

    #[test]
    fn test_user_minute_limit() {
        let limiter = RateLimiter::new(tight_config());

        let first = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert!(first.allowed);
        limiter.release(Some("alice"), None);

        let second = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert!(!second.allowed);
        assert_eq!(second.status, RateLimitStatus::RateLimited);
        assert_eq!(second.violations, vec!["user_minute".to_string()]);
    }

    #[test]
    fn test_blacklist_hard_deny() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter.add_to_blacklist("mallory", IdentifierKind::User);

        let decision = limiter.check(Some("mallory"), None, "enhance", 0.0, 0);
        assert!(!decision.allowed);
        assert_eq!(decision.status, RateLimitStatus::Blocked);
        assert_eq!(decision.violations, vec!["user_blacklisted".to_string()]);
    }

    #[test]
    fn test_whitelist_bypasses_limits() {
        let limiter = RateLimiter::new(tight_config());
        limiter.add_to_whitelist("robot", IdentifierKind::User);

        for _ in 0..5 {
            assert!(limiter.check(Some("robot"), None, "enhance", 0.0, 0).allowed);
        }
        // Whitelisted admissions skip concurrent accounting; release must
        // saturate rather than underflow.
        limiter.release(Some("robot"), None);
        assert_eq!(limiter.concurrent_count(), 0);
    }

    #[test]
    fn test_burst_penalty_after_multiple_violations() {
        let config = RateLimitConfig {
            user_requests_per_minute: 1,
            user_requests_per_hour: 1,
            burst_penalty_seconds: 300,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(Some("alice"), None, "enhance", 0.0, 0).allowed);
        limiter.release(Some("alice"), None);

        // Violates both minute and hour windows → burst penalty applied
        let denied = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert!(denied.violations.contains(&"user_minute".to_string()));
        assert!(denied.violations.contains(&"user_hour".to_string()));
        assert!(denied.violations.contains(&"burst_penalty_applied".to_string()));

        // Next request is denied outright by the active penalty
        let blocked = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert_eq!(blocked.status, RateLimitStatus::Blocked);
        assert_eq!(blocked.violations, vec!["burst_penalty".to_string()]);
    }

    #[test]
    fn test_concurrent_ceiling() {
        let config = RateLimitConfig {
            user_concurrent_requests: 2,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(Some("alice"), None, "enhance", 0.0, 0).allowed);
        assert!(limiter.check(Some("alice"), None, "enhance", 0.0, 0).allowed);

        let third = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert!(!third.allowed);
        assert!(third.violations.contains(&"user_concurrent".to_string()));

        // After release the slot frees up
        limiter.release(Some("alice"), None);
        assert!(limiter.check(Some("alice"), None, "enhance", 0.0, 0).allowed);
    }

    #[test]
    fn test_cost_ceiling() {
        let config = RateLimitConfig {
            user_cost_per_hour: 1.0,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(Some("alice"), None, "enhance", 0.8, 0).allowed);
        limiter.release(Some("alice"), None);

        let over = limiter.check(Some("alice"), None, "enhance", 0.8, 0);
        assert!(over.violations.contains(&"user_cost_hourly".to_string()));
    }

    #[test]
    fn test_operation_sub_window() {
        let mut operation_limits = HashMap::new();
        operation_limits.insert(
            "enhance".to_string(),
            OperationLimits {
                requests_per_minute: Some(1),
                requests_per_hour: None,
            },
        );
        let config = RateLimitConfig {
            operation_limits,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(Some("alice"), None, "enhance", 0.0, 0).allowed);
        limiter.release(Some("alice"), None);

        let denied = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert!(denied.violations.contains(&"user_operation_enhance_minute".to_string()));

        // A different operation is not affected
        assert!(limiter.check(Some("bob"), None, "analyze", 0.0, 0).allowed);
    }

    #[test]
    fn test_ip_bandwidth_ceiling() {
        let config = RateLimitConfig {
            ip_bandwidth_per_minute: 1_000,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(None, Some("10.0.0.1"), "enhance", 0.0, 800).allowed);
        limiter.release(None, Some("10.0.0.1"));

        let denied = limiter.check(None, Some("10.0.0.1"), "enhance", 0.0, 800);
        assert!(denied.violations.contains(&"ip_bandwidth".to_string()));
    }

    #[test]
    fn test_circuit_breaker_opens_on_failures() {
        let config = RateLimitConfig {
            circuit_failure_threshold: 3,
            ..Default::default()
        };
        let limiter = RateLimiter::new(config);

        for _ in 0..3 {
            limiter.record_outcome(Some("alice"), None, false);
        }

        let decision = limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        assert_eq!(decision.status, RateLimitStatus::CircuitOpen);
        assert_eq!(decision.violations, vec!["circuit_breaker".to_string()]);
    }

    #[test]
    fn test_breaker_state_machine() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(2, Duration::from_millis(10));
        assert!(breaker.call_allowed(now));

        breaker.record_failure(now);
        breaker.record_failure(now);
        assert!(!breaker.call_allowed(now));

        // After the timeout the breaker half-opens, then closes on success
        let later = now + Duration::from_millis(20);
        assert!(breaker.call_allowed(later));
        assert_eq!(breaker.state, BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state, BreakerState::Closed);
    }

    #[test]
    fn test_token_bucket_refill() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, 10.0);
        assert!(bucket.consume(1.0, start));
        assert!(bucket.consume(1.0, start));
        assert!(!bucket.consume(1.0, start));

        // 100 ms at 10 tokens/s refills one token
        assert!(bucket.consume(1.0, start + Duration::from_millis(100)));
    }

    #[test]
    fn test_sliding_window_expiry() {
        let start = Instant::now();
        let mut window = SlidingWindow::new(Duration::from_millis(50), 1);
        assert!(window.try_admit(start));
        assert!(!window.try_admit(start));
        assert!(window.try_admit(start + Duration::from_millis(60)));
    }

    #[test]
    fn test_stats() {
        let limiter = RateLimiter::new(tight_config());
        limiter.check(Some("alice"), None, "enhance", 0.0, 0);
        limiter.release(Some("alice"), None);
        limiter.check(Some("alice"), None, "enhance", 0.0, 0);

        let stats = limiter.stats();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.blocked_count, 1);
        assert_eq!(stats.limit_violations.get("user_minute"), Some(&1));
    }
}
