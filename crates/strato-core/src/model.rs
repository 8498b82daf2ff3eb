//! The declarative resource model.
//!
//! A deployment is described as a set of [`ResourceDescriptor`]s: typed,
//! named, with explicit `depends_on` edges and desired properties that may
//! embed [`Reference`] placeholders resolved from other resources' outputs
//! at apply time. Descriptors carry no behavior; validation lives here,
//! everything else in `graph` / `schedule` / `reconcile`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strato_state::{AppliedResource, ContentDigest, Ownership};

use crate::error::{ReconcileError, ReconcileResult};

/// The fixed set of resource kinds this engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ExecutionRole,
    RolePolicyAttachment,
    Function,
    Alias,
    Permission,
    Api,
    Integration,
    Route,
    Deployment,
    Stage,
    DomainName,
    ApiMapping,
    LogGroup,
    LogResourcePolicy,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::ExecutionRole => "execution_role",
            ResourceKind::RolePolicyAttachment => "role_policy_attachment",
            ResourceKind::Function => "function",
            ResourceKind::Alias => "alias",
            ResourceKind::Permission => "permission",
            ResourceKind::Api => "api",
            ResourceKind::Integration => "integration",
            ResourceKind::Route => "route",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Stage => "stage",
            ResourceKind::DomainName => "domain_name",
            ResourceKind::ApiMapping => "api_mapping",
            ResourceKind::LogGroup => "log_group",
            ResourceKind::LogResourcePolicy => "log_resource_policy",
        };
        write!(f, "{}", s)
    }
}

/// A placeholder inside desired properties that resolves to another
/// resource's output once that resource has been applied.
///
/// Wire form: `{"$ref": {"resource": "<logical name>", "output": "<key>"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub resource: String,
    pub output: String,
}

impl Reference {
    pub fn new(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            output: output.into(),
        }
    }

    /// Encode as a property value.
    pub fn value(resource: impl Into<String>, output: impl Into<String>) -> Value {
        serde_json::json!({
            "$ref": { "resource": resource.into(), "output": output.into() }
        })
    }

    /// Decode a property value if it is a reference placeholder.
    pub fn from_value(value: &Value) -> Option<Reference> {
        let obj = value.as_object()?;
        if obj.len() != 1 {
            return None;
        }
        let inner = obj.get("$ref")?.as_object()?;
        Some(Reference {
            resource: inner.get("resource")?.as_str()?.to_string(),
            output: inner.get("output")?.as_str()?.to_string(),
        })
    }
}

/// One declared resource: what it is, what it needs, what it should look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub logical_name: String,
    /// Desired properties, possibly containing [`Reference`] placeholders.
    pub properties: Value,
    /// Logical names this resource must be applied after.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Lifecycle ownership: `Managed` resources are created/updated by the
    /// run; `External` ones are looked up read-only by `provider_id`.
    #[serde(default = "default_ownership")]
    pub ownership: Ownership,
}

fn default_ownership() -> Ownership {
    Ownership::Managed
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, logical_name: impl Into<String>, properties: Value) -> Self {
        Self {
            kind,
            logical_name: logical_name.into(),
            properties,
            depends_on: BTreeSet::new(),
            ownership: Ownership::Managed,
        }
    }

    /// Declare a dependency on another logical name.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    /// Mark this descriptor as an external lookup rather than a managed
    /// resource. The properties must carry a `provider_id` to read by.
    pub fn external(mut self) -> Self {
        self.ownership = Ownership::External;
        self
    }

    /// All references embedded in this descriptor's properties.
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        collect_references(&self.properties, &mut refs);
        refs
    }
}

fn collect_references(value: &Value, out: &mut Vec<Reference>) {
    if let Some(r) = Reference::from_value(value) {
        out.push(r);
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

/// Substitute every reference placeholder in `value` with the matching
/// output from already-applied state.
///
/// Fails with [`ReconcileError::UnresolvedReference`] when the target
/// resource or the named output is absent — by the time resolution runs,
/// the scheduler has guaranteed every producer is in `state`, so absence
/// is a defect, not a retryable condition.
pub fn resolve_references(
    owner: &str,
    value: &Value,
    state: &BTreeMap<String, AppliedResource>,
) -> ReconcileResult<Value> {
    if let Some(r) = Reference::from_value(value) {
        let resolved = state
            .get(&r.resource)
            .and_then(|applied| applied.output(&r.output))
            .cloned()
            .ok_or_else(|| ReconcileError::UnresolvedReference {
                from: owner.to_string(),
                target: r.resource.clone(),
                output: r.output.clone(),
            })?;
        return Ok(resolved);
    }
    match value {
        Value::Array(items) => {
            let resolved: ReconcileResult<Vec<Value>> = items
                .iter()
                .map(|item| resolve_references(owner, item, state))
                .collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), resolve_references(owner, item, state)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Digest of fully-resolved desired properties.
///
/// serde_json maps serialize key-sorted, so equal property sets always
/// produce equal bytes and therefore equal digests.
pub fn content_hash(resolved: &Value) -> ContentDigest {
    let bytes = serde_json::to_vec(resolved).unwrap_or_default();
    ContentDigest::from_bytes(&bytes)
}

/// The live pointer from a routing layer to one immutable compute version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasBinding {
    pub function_name: String,
    pub alias_name: String,
    pub target_version: String,
}

/// Validate a descriptor set before any graph construction.
///
/// Checks, in order:
/// 1. logical names are unique
/// 2. every `depends_on` entry is declared in the set
/// 3. every property reference targets a declared dependency
/// 4. external descriptors carry a `provider_id` lookup key
/// 5. every route carries a string `route_key` and attaches to a declared
///    api; no two routes on the same api share a route key
pub fn validate_set(descriptors: &[ResourceDescriptor]) -> ReconcileResult<()> {
    let mut by_name: HashMap<&str, &ResourceDescriptor> = HashMap::new();
    for desc in descriptors {
        if by_name
            .insert(desc.logical_name.as_str(), desc)
            .is_some()
        {
            return Err(ReconcileError::DuplicateLogicalName {
                name: desc.logical_name.clone(),
            });
        }
    }

    for desc in descriptors {
        for dep in &desc.depends_on {
            if !by_name.contains_key(dep.as_str()) {
                return Err(ReconcileError::DanglingReference {
                    from: desc.logical_name.clone(),
                    missing: dep.clone(),
                });
            }
        }
        for r in desc.references() {
            if !by_name.contains_key(r.resource.as_str()) {
                return Err(ReconcileError::DanglingReference {
                    from: desc.logical_name.clone(),
                    missing: r.resource.clone(),
                });
            }
            if !desc.depends_on.contains(&r.resource) {
                return Err(ReconcileError::UndeclaredReference {
                    from: desc.logical_name.clone(),
                    target: r.resource.clone(),
                });
            }
        }
        if desc.ownership == Ownership::External
            && desc
                .properties
                .get("provider_id")
                .and_then(Value::as_str)
                .is_none()
        {
            return Err(ReconcileError::MissingLookupId {
                name: desc.logical_name.clone(),
            });
        }
    }

    // Route-key uniqueness per api. A route missing its key or detached
    // from every api is rejected, not silently skipped.
    let mut seen_routes: HashSet<(String, String)> = HashSet::new();
    for desc in descriptors {
        if desc.kind != ResourceKind::Route {
            continue;
        }
        let Some(route_key) = desc.properties.get("route_key").and_then(Value::as_str) else {
            return Err(ReconcileError::MissingRouteKey {
                name: desc.logical_name.clone(),
            });
        };
        let api = route_api_name(desc, &by_name).ok_or_else(|| {
            ReconcileError::RouteWithoutApi {
                name: desc.logical_name.clone(),
            }
        })?;
        if !seen_routes.insert((api.clone(), route_key.to_string())) {
            return Err(ReconcileError::DuplicateRouteKey {
                api,
                route_key: route_key.to_string(),
            });
        }
    }

    Ok(())
}

/// The api a route attaches to: the referenced Api resource if the route's
/// properties point at one, otherwise the first Api in its `depends_on`.
fn route_api_name(
    route: &ResourceDescriptor,
    by_name: &HashMap<&str, &ResourceDescriptor>,
) -> Option<String> {
    for r in route.references() {
        if let Some(target) = by_name.get(r.resource.as_str()) {
            if target.kind == ResourceKind::Api {
                return Some(target.logical_name.clone());
            }
        }
    }
    route
        .depends_on
        .iter()
        .find(|dep| {
            by_name
                .get(dep.as_str())
                .map(|d| d.kind == ResourceKind::Api)
                .unwrap_or(false)
        })
        .cloned()
}
