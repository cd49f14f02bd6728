// /////////////////////////////////////////////////////////////////////////////
// DocBatch RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document
//!
//! The unit of work flowing through the engine. The core treats a document
//! as opaque: an identity, a textual payload, and free-form attributes. Only
//! two aspects are interpreted by the engine itself:
//!
//! - the payload text, which the input validator scans and the cache
//!   fingerprints;
//! - an optional source path, whose extension the validator checks against
//!   its file-type policy.
//!
//! Everything else is for the registered operation handlers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A document submitted for batch processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    payload: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_path: Option<PathBuf>,
}

impl Document {
    /// Creates a document with an explicit identity.
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            attributes: HashMap::new(),
            source_path: None,
        }
    }

    /// Creates a document whose identity is its payload.
    ///
    /// Convenient for callers submitting plain strings; matches the
    /// "heterogeneous stream of documents" entry point where inputs may be
    /// bare text.
    pub fn from_payload(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            id: payload.clone(),
            payload,
            attributes: HashMap::new(),
            source_path: None,
        }
    }

    /// Attaches a source path (enables the validator's file-type check).
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Adds a free-form attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Gets the document identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the payload text
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Replaces the payload (used when the envelope substitutes a sanitized
    /// form)
    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
    }

    /// Gets the free-form attributes
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Gets a single attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Gets the optional source path
    pub fn source_path(&self) -> Option<&PathBuf> {
        self.source_path.as_ref()
    }

    /// Payload size in bytes (used for rate-limit bandwidth accounting)
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl From<&str> for Document {
    fn from(payload: &str) -> Self {
        Document::from_payload(payload)
    }
}

impl From<String> for Document {
    fn from(payload: String) -> Self {
        Document::from_payload(payload)
    }
}
