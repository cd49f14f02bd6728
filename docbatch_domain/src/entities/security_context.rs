// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Security Context
//!
//! Advisory metadata about the caller of a batch, threaded through the
//! security envelope. The context never grants anything by itself: the rate
//! limiter keys its buckets on `user_id`/`ip_address`, the cache derives its
//! isolation key from `user_id`, and the audit log records the identity
//! fields. Permissions and clearance are available for host applications
//! that enforce their own policy on top.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Security permission for fine-grained access control.
///
/// `Admin` implies all other permissions. `Custom` permissions are evaluated
/// independently by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Execute,
    Admin,
    Custom(String),
}

/// Caller clearance carried through the envelope.
///
/// Ordered from lowest to highest; comparison is used when a host applies a
/// minimum-clearance policy to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityClearance {
    Public,
    Standard,
    Elevated,
    Privileged,
}

/// Advisory security context for a batch invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    user_id: Option<String>,
    session_id: Uuid,
    ip_address: Option<String>,
    user_agent: Option<String>,
    operation: String,
    clearance: SecurityClearance,
    permissions: Vec<Permission>,
    request_origin: String,
    metadata: HashMap<String, String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Default for SecurityContext {
    fn default() -> Self {
        Self {
            user_id: None,
            session_id: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
            operation: "unknown".to_string(),
            clearance: SecurityClearance::Standard,
            permissions: vec![Permission::Read],
            request_origin: "internal".to_string(),
            metadata: HashMap::new(),
            created_at: chrono::Utc::now(),
        }
    }
}

impl SecurityContext {
    /// Creates a new security context for a user
    pub fn new(user_id: Option<String>, operation: impl Into<String>) -> Self {
        Self {
            user_id,
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Creates a security context with permissions and clearance
    pub fn with_permissions(
        user_id: Option<String>,
        permissions: Vec<Permission>,
        clearance: SecurityClearance,
    ) -> Self {
        Self {
            user_id,
            permissions,
            clearance,
            ..Default::default()
        }
    }

    /// Gets the user ID
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Gets the session ID
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Gets the IP address
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Gets the user agent
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Gets the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Gets the clearance
    pub fn clearance(&self) -> SecurityClearance {
        self.clearance
    }

    /// Gets the permissions
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Gets the request origin
    pub fn request_origin(&self) -> &str {
        &self.request_origin
    }

    /// Gets the metadata
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Gets the creation timestamp
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    /// Sets the IP address
    pub fn set_ip_address(&mut self, ip: Option<String>) {
        self.ip_address = ip;
    }

    /// Sets the user agent
    pub fn set_user_agent(&mut self, agent: Option<String>) {
        self.user_agent = agent;
    }

    /// Sets the operation name
    pub fn set_operation(&mut self, operation: impl Into<String>) {
        self.operation = operation.into();
    }

    /// Sets the request origin
    pub fn set_request_origin(&mut self, origin: impl Into<String>) {
        self.request_origin = origin.into();
    }

    /// Adds a permission if not already present
    pub fn add_permission(&mut self, permission: Permission) {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
    }

    /// Adds a metadata entry
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Checks whether a permission is granted (Admin implies everything)
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(permission)
    }

    /// Checks whether the context meets a minimum clearance
    pub fn meets_clearance(&self, minimum: SecurityClearance) -> bool {
        self.clearance >= minimum
    }

    /// The cache isolation key derived from this context.
    ///
    /// Distinct users cannot observe each other's cache entries; anonymous
    /// callers share the global scope.
    pub fn isolation_key(&self) -> &str {
        self.user_id.as_deref().unwrap_or("global")
    }

    /// Identity fields in the flattened form the audit log records.
    pub fn to_audit_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        if let Some(user) = &self.user_id {
            fields.insert("user_id".to_string(), user.clone());
        }
        fields.insert("session_id".to_string(), self.session_id.to_string());
        if let Some(ip) = &self.ip_address {
            fields.insert("ip_address".to_string(), ip.clone());
        }
        fields.insert("operation".to_string(), self.operation.clone());
        fields.insert("request_origin".to_string(), self.request_origin.clone());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = SecurityContext::default();
        assert!(ctx.user_id().is_none());
        assert_eq!(ctx.clearance(), SecurityClearance::Standard);
        assert_eq!(ctx.isolation_key(), "global");
    }

    #[test]
    fn test_user_isolation_key() {
        let ctx = SecurityContext::new(Some("alice".to_string()), "enhance");
        assert_eq!(ctx.isolation_key(), "alice");
    }

    #[test]
    fn test_admin_implies_all() {
        let ctx = SecurityContext::with_permissions(
            Some("root".to_string()),
            vec![Permission::Admin],
            SecurityClearance::Privileged,
        );
        assert!(ctx.has_permission(&Permission::Write));
        assert!(ctx.has_permission(&Permission::Custom("deploy".to_string())));
    }

    #[test]
    fn test_clearance_ordering() {
        let ctx = SecurityContext::with_permissions(None, vec![], SecurityClearance::Elevated);
        assert!(ctx.meets_clearance(SecurityClearance::Standard));
        assert!(!ctx.meets_clearance(SecurityClearance::Privileged));
    }

    #[test]
    fn test_audit_fields_include_identity() {
        let mut ctx = SecurityContext::new(Some("alice".to_string()), "analyze");
        ctx.set_ip_address(Some("10.0.0.1".to_string()));
        let fields = ctx.to_audit_fields();
        assert_eq!(fields.get("user_id").map(String::as_str), Some("alice"));
        assert_eq!(fields.get("ip_address").map(String::as_str), Some("10.0.0.1"));
        assert_eq!(fields.get("operation").map(String::as_str), Some("analyze"));
    }
}
