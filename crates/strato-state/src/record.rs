//! Persisted per-resource records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

/// Who owns a reconciled resource's lifecycle.
///
/// `Managed` resources were created by a reconciliation run and may be
/// updated by later runs. `External` resources were looked up from the
/// provider and are never created or updated by strato; attempting to
/// switch a logical name between modes across runs is a caller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Managed,
    External,
}

/// The durable record of one successfully applied resource.
///
/// Written exclusively by the reconciler: created on the first successful
/// apply of a descriptor, updated in place on later applies, and read at
/// the start of every run to decide create-vs-update-vs-noop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Logical name of the descriptor this record belongs to.
    pub logical_name: String,
    /// Provider-assigned identifier (never invented locally).
    pub provider_id: String,
    /// Outputs other resources may reference (ids, invoke targets, versions).
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Digest of the resolved desired properties at last apply.
    pub content_hash: ContentDigest,
    /// Lifecycle ownership recorded at first apply.
    pub ownership: Ownership,
}

impl AppliedResource {
    /// Look up a single output value by key.
    pub fn output(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs.get(key)
    }
}
