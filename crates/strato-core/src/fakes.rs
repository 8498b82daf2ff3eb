//! In-memory provider fake (testing and simulation only)
//!
//! [`MemoryProvider`] satisfies the [`Provider`] contract without any
//! network: provider ids are sequential per kind, function versions are
//! monotonic per resource, and alias invoke targets are derived from the
//! alias's resolved properties so they stay stable across version bumps —
//! the property the real routing layer depends on.
//!
//! Per-verb call counters make idempotence assertions trivial: an
//! unchanged second run must leave `create_calls` and `update_calls`
//! untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use strato_state::{Ownership, StateMap};

use crate::model::ResourceKind;
use crate::provider::{Created, Provider, ProviderError};

#[derive(Debug, Clone)]
struct FakeResource {
    outputs: BTreeMap<String, Value>,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<String, FakeResource>,
    externals: HashMap<String, BTreeMap<String, Value>>,
    seq: u64,
    create_calls: u64,
    update_calls: u64,
    read_calls: u64,
    fail_kinds: HashSet<ResourceKind>,
}

/// In-memory [`Provider`] backed by a mutex-guarded resource table.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script every create/update of `kind` to fail.
    pub fn fail_on(&self, kind: ResourceKind) {
        self.inner.lock().unwrap().fail_kinds.insert(kind);
    }

    /// Clear scripted failures.
    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().fail_kinds.clear();
    }

    /// Sleep this long before answering any call (timeout tests).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Register a resource owned outside any run, addressable via `read`.
    pub fn register_external(&self, provider_id: &str, outputs: BTreeMap<String, Value>) {
        self.inner
            .lock()
            .unwrap()
            .externals
            .insert(provider_id.to_string(), outputs);
    }

    /// Adopt resources recorded by an earlier process, so that updates
    /// against their stored provider ids succeed instead of reporting
    /// `NotFound`. Function versions resume from the recorded `version`
    /// output, and the id sequence is advanced past every adopted id.
    pub fn adopt(&self, state: &StateMap) {
        let mut inner = self.inner.lock().unwrap();
        for record in state.values() {
            if record.ownership == Ownership::External {
                inner
                    .externals
                    .insert(record.provider_id.clone(), record.outputs.clone());
                continue;
            }
            let version = record
                .output("version")
                .and_then(Value::as_str)
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            if let Some(n) = record
                .provider_id
                .rsplit('-')
                .next()
                .and_then(|s| s.parse::<u64>().ok())
            {
                inner.seq = inner.seq.max(n);
            }
            inner.resources.insert(
                record.provider_id.clone(),
                FakeResource {
                    outputs: record.outputs.clone(),
                    version,
                },
            );
        }
    }

    pub fn create_calls(&self) -> u64 {
        self.inner.lock().unwrap().create_calls
    }

    pub fn update_calls(&self) -> u64 {
        self.inner.lock().unwrap().update_calls
    }

    pub fn read_calls(&self) -> u64 {
        self.inner.lock().unwrap().read_calls
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }

    fn outputs_for(
        kind: ResourceKind,
        provider_id: &str,
        properties: &Value,
        version: u64,
    ) -> BTreeMap<String, Value> {
        let mut outputs = BTreeMap::new();
        outputs.insert("id".to_string(), Value::String(provider_id.to_string()));
        match kind {
            ResourceKind::Function => {
                outputs.insert("version".to_string(), Value::String(version.to_string()));
            }
            ResourceKind::Alias => {
                // Stable identity: function id + alias name, never the
                // version the alias currently points at.
                let function = properties
                    .get("function")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown-function");
                let name = properties
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown-alias");
                outputs.insert(
                    "invoke_target".to_string(),
                    Value::String(format!("{function}:{name}")),
                );
            }
            ResourceKind::Api => {
                outputs.insert(
                    "endpoint".to_string(),
                    Value::String(format!("https://{provider_id}.gateway.test")),
                );
            }
            ResourceKind::Stage => {
                let name = properties
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("default");
                outputs.insert("stage_name".to_string(), Value::String(name.to_string()));
            }
            ResourceKind::DomainName => {
                let name = properties
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(provider_id);
                outputs.insert("domain".to_string(), Value::String(name.to_string()));
            }
            _ => {}
        }
        outputs
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn create(
        &self,
        kind: ResourceKind,
        properties: &Value,
    ) -> Result<Created, ProviderError> {
        self.maybe_delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;
        if inner.fail_kinds.contains(&kind) {
            return Err(ProviderError::Failed(format!(
                "scripted failure creating {kind}"
            )));
        }

        inner.seq += 1;
        let provider_id = format!("{kind}-{}", inner.seq);
        let version = 1;
        let outputs = Self::outputs_for(kind, &provider_id, properties, version);
        inner.resources.insert(
            provider_id.clone(),
            FakeResource {
                outputs: outputs.clone(),
                version,
            },
        );
        Ok(Created {
            provider_id,
            outputs,
        })
    }

    async fn update(
        &self,
        kind: ResourceKind,
        provider_id: &str,
        properties: &Value,
    ) -> Result<BTreeMap<String, Value>, ProviderError> {
        self.maybe_delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.update_calls += 1;
        if inner.fail_kinds.contains(&kind) {
            return Err(ProviderError::Failed(format!(
                "scripted failure updating {kind}"
            )));
        }

        let Some(existing) = inner.resources.get(provider_id).cloned() else {
            return Err(ProviderError::NotFound {
                provider_id: provider_id.to_string(),
            });
        };

        // Functions publish a new immutable version on every code change;
        // versions only ever go up.
        let version = match kind {
            ResourceKind::Function => existing.version + 1,
            _ => existing.version,
        };
        let outputs = Self::outputs_for(kind, provider_id, properties, version);
        inner.resources.insert(
            provider_id.to_string(),
            FakeResource {
                outputs: outputs.clone(),
                version,
            },
        );
        Ok(outputs)
    }

    async fn read(
        &self,
        _kind: ResourceKind,
        provider_id: &str,
    ) -> Result<BTreeMap<String, Value>, ProviderError> {
        self.maybe_delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.read_calls += 1;
        if let Some(outputs) = inner.externals.get(provider_id) {
            return Ok(outputs.clone());
        }
        if let Some(resource) = inner.resources.get(provider_id) {
            return Ok(resource.outputs.clone());
        }
        Err(ProviderError::NotFound {
            provider_id: provider_id.to_string(),
        })
    }

    async fn delete(
        &self,
        _kind: ResourceKind,
        provider_id: &str,
    ) -> Result<(), ProviderError> {
        self.maybe_delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.resources.remove(provider_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_function_version_is_monotonic_across_updates() {
        let provider = MemoryProvider::new();
        let created = provider
            .create(ResourceKind::Function, &json!({ "artifact": "v1" }))
            .await
            .unwrap();
        assert_eq!(created.outputs["version"], json!("1"));

        let updated = provider
            .update(ResourceKind::Function, &created.provider_id, &json!({ "artifact": "v2" }))
            .await
            .unwrap();
        assert_eq!(updated["version"], json!("2"));
    }

    #[tokio::test]
    async fn test_alias_invoke_target_stable_across_repoint() {
        let provider = MemoryProvider::new();
        let props_v1 = json!({ "function": "function-1", "name": "live", "function_version": "1" });
        let created = provider.create(ResourceKind::Alias, &props_v1).await.unwrap();

        let props_v2 = json!({ "function": "function-1", "name": "live", "function_version": "2" });
        let updated = provider
            .update(ResourceKind::Alias, &created.provider_id, &props_v2)
            .await
            .unwrap();

        assert_eq!(created.outputs["invoke_target"], updated["invoke_target"]);
        assert_eq!(updated["invoke_target"], json!("function-1:live"));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let provider = MemoryProvider::new();
        let err = provider
            .update(ResourceKind::Api, "api-99", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_serves_registered_externals() {
        let provider = MemoryProvider::new();
        let mut outputs = BTreeMap::new();
        outputs.insert("id".to_string(), json!("api.example.test"));
        provider.register_external("api.example.test", outputs);

        let read = provider
            .read(ResourceKind::DomainName, "api.example.test")
            .await
            .unwrap();
        assert_eq!(read["id"], json!("api.example.test"));
    }

    #[tokio::test]
    async fn test_delete_removes_the_resource() {
        let provider = MemoryProvider::new();
        let created = provider.create(ResourceKind::Api, &json!({})).await.unwrap();
        provider
            .delete(ResourceKind::Api, &created.provider_id)
            .await
            .unwrap();
        let err = provider
            .read(ResourceKind::Api, &created.provider_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_adopted_state_supports_updates_in_a_new_process() {
        use strato_state::{AppliedResource, ContentDigest};

        let mut outputs = BTreeMap::new();
        outputs.insert("id".to_string(), json!("function-3"));
        outputs.insert("version".to_string(), json!("2"));
        let mut state = StateMap::new();
        state.insert(
            "fn".to_string(),
            AppliedResource {
                logical_name: "fn".to_string(),
                provider_id: "function-3".to_string(),
                outputs,
                content_hash: ContentDigest::from_bytes(b"v2"),
                ownership: Ownership::Managed,
            },
        );

        // A fresh provider stands in for a process restart.
        let provider = MemoryProvider::new();
        provider.adopt(&state);

        let updated = provider
            .update(ResourceKind::Function, "function-3", &json!({ "artifact": "v3" }))
            .await
            .unwrap();
        assert_eq!(updated["version"], json!("3"));

        // New ids pick up after the adopted sequence.
        let created = provider.create(ResourceKind::Api, &json!({})).await.unwrap();
        assert_eq!(created.provider_id, "api-4");
    }

    #[tokio::test]
    async fn test_scripted_failure_only_hits_that_kind() {
        let provider = MemoryProvider::new();
        provider.fail_on(ResourceKind::Route);

        assert!(provider.create(ResourceKind::Api, &json!({})).await.is_ok());
        let err = provider.create(ResourceKind::Route, &json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Failed(_)));
    }
}
