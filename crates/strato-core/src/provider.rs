//! The provider boundary: the only interface the engine consumes from the
//! outside world.
//!
//! One implementation per cloud backend. The engine hands a provider
//! fully-resolved properties (no reference placeholders) and records
//! whatever id and outputs come back — it never invents provider ids.
//! Inject a real implementation that calls vendor APIs, or
//! [`crate::fakes::MemoryProvider`] for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::ResourceKind;

/// Result of creating a resource.
#[derive(Debug, Clone)]
pub struct Created {
    /// Provider-assigned identifier.
    pub provider_id: String,
    /// Outputs other resources may reference.
    pub outputs: BTreeMap<String, Value>,
}

/// Errors surfaced by a provider call.
///
/// These are per-node failures: the reconciler collects them into the run
/// report and skips dependents, it never aborts the whole run for one.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The resource does not exist (lookup or update by stale id).
    #[error("resource not found: {provider_id}")]
    NotFound { provider_id: String },

    /// The backend rejected or failed the call.
    #[error("provider call failed: {0}")]
    Failed(String),

    /// The caller-supplied timeout elapsed before the call returned.
    #[error("provider call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Create/read/update/delete against the cloud backend for one resource.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create a resource from resolved properties.
    async fn create(
        &self,
        kind: ResourceKind,
        properties: &Value,
    ) -> Result<Created, ProviderError>;

    /// Update an existing resource in place, returning fresh outputs.
    async fn update(
        &self,
        kind: ResourceKind,
        provider_id: &str,
        properties: &Value,
    ) -> Result<BTreeMap<String, Value>, ProviderError>;

    /// Read an existing resource's outputs (external lookups, drift checks).
    async fn read(
        &self,
        kind: ResourceKind,
        provider_id: &str,
    ) -> Result<BTreeMap<String, Value>, ProviderError>;

    /// Delete a resource. Explicit teardown only; the reconciler itself
    /// never deletes.
    async fn delete(&self, kind: ResourceKind, provider_id: &str) -> Result<(), ProviderError>;
}
