//! Query Fingerprints
//!
//! A fingerprint is the SHA-256 of a normalized query descriptor. Two
//! descriptors that differ only in casing, surrounding whitespace, map key
//! order or list element order produce the same fingerprint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Description of a retrieval query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Query text
    pub text: String,
    /// Backend filters (values may be scalars, lists or nested maps)
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    /// Result count requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Owner issuing the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Invalidation tags (not part of the fingerprint)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl QueryDescriptor {
    /// Create a descriptor for `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Add a filter
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Set top-k
    #[must_use]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set owner
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Add an invalidation tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Fingerprint of this descriptor
    pub fn fingerprint(&self) -> String {
        generate_key(self)
    }
}

#[derive(Serialize)]
struct NormalizedQuery {
    text: String,
    filters: BTreeMap<String, Value>,
    top_k: Option<u32>,
    owner_id: Option<String>,
}

fn normalize_text(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a filter value: strings are lowercased and trimmed, lists are
/// sorted, maps are normalized recursively.
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_text(s)),
        Value::Array(items) => {
            let mut normalized: Vec<Value> = items.iter().map(normalize_value).collect();
            normalized.sort_by_cached_key(|v| v.to_string());
            Value::Array(normalized)
        }
        Value::Object(map) => {
            // Sort explicitly in case serde_json preserves insertion order
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (normalize_text(k), normalize_value(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        other => other.clone(),
    }
}

/// Deterministic fixed-length fingerprint (64 hex chars) for a query
pub fn generate_key(descriptor: &QueryDescriptor) -> String {
    let normalized = NormalizedQuery {
        text: normalize_text(&descriptor.text),
        filters: descriptor
            .filters
            .iter()
            .map(|(k, v)| (normalize_text(k), normalize_value(v)))
            .collect(),
        top_k: descriptor.top_k,
        owner_id: descriptor.owner_id.as_deref().map(normalize_text),
    };

    let encoded = serde_json::to_vec(&normalized).unwrap_or_default();
    format!("{:x}", Sha256::digest(&encoded))
}

// =============================================================================
// Tests
// =============================================================================
