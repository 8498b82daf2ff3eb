//! Error types for the reconciliation engine.
//!
//! Validation errors (cycles, dangling references, duplicate route keys)
//! carry the full offending identifier and surface before any provider
//! call. Per-node provider failures are *collected* into the run report,
//! not returned through this enum — see `reconcile::RunReport`.

use thiserror::Error;

use crate::provider::ProviderError;

/// Errors produced by graph construction, scheduling, and reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A dependency cycle was detected among the declared resources.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// Two descriptors in the same set share a logical name.
    #[error("duplicate logical name in descriptor set: {name}")]
    DuplicateLogicalName { name: String },

    /// A `depends_on` entry names a resource absent from the set.
    #[error("resource '{from}' depends on '{missing}', which is not declared in the set")]
    DanglingReference { from: String, missing: String },

    /// A property reference targets a resource not listed in `depends_on`.
    ///
    /// Implicit ordering via references is exactly the failure mode this
    /// engine exists to remove, so it is rejected rather than promoted to
    /// an edge.
    #[error("resource '{from}' references '{target}' without declaring it in depends_on")]
    UndeclaredReference { from: String, target: String },

    /// Two routes on the same api declare the same (method, path) key.
    #[error("duplicate route key '{route_key}' on api '{api}'")]
    DuplicateRouteKey { api: String, route_key: String },

    /// A route descriptor has no string `route_key` property.
    #[error("route '{name}' has no 'route_key' property")]
    MissingRouteKey { name: String },

    /// A route's owning api could not be determined from its references
    /// or dependencies.
    #[error("route '{name}' is not attached to any declared api")]
    RouteWithoutApi { name: String },

    /// An externally-owned descriptor has no lookup id to read by.
    #[error("external resource '{name}' has no 'provider_id' property to look up")]
    MissingLookupId { name: String },

    /// A reference could not be resolved at apply time.
    ///
    /// The scheduler guarantees producers apply before consumers, so this
    /// indicates a defect in graph construction (or a provider returning
    /// fewer outputs than the descriptor set assumes). Fatal, never retried.
    #[error("resource '{from}' references output '{output}' of '{target}', which is not available")]
    UnresolvedReference {
        from: String,
        target: String,
        output: String,
    },

    /// A descriptor's ownership mode conflicts with recorded state.
    #[error("resource '{name}' ownership conflicts with prior state (managed vs external)")]
    OwnershipConflict { name: String },

    /// A provider call failed outside the collected per-node path.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State persistence failed. Fatal: applies that cannot be recorded
    /// would break idempotent retry safety.
    #[error("state store error: {0}")]
    Store(#[from] strato_state::StateError),

    /// A worker task was aborted or panicked mid-batch.
    #[error("apply worker failed: {0}")]
    Worker(String),

    /// An alias cutover run left the function or alias node unapplied.
    #[error("cutover did not complete: node '{node}' ended {status}")]
    CutoverIncomplete { node: String, status: String },
}

/// Convenience result alias.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_displays_full_path() {
        let err = ReconcileError::Cycle {
            path: vec!["alias".to_string(), "fn".to_string(), "alias".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: alias -> fn -> alias"
        );
    }

    #[test]
    fn test_duplicate_route_key_displays_api_and_key() {
        let err = ReconcileError::DuplicateRouteKey {
            api: "api".to_string(),
            route_key: "GET /auth".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("GET /auth"));
        assert!(msg.contains("api"));
    }

    #[test]
    fn test_unresolved_reference_names_all_three_identifiers() {
        let err = ReconcileError::UnresolvedReference {
            from: "integration".to_string(),
            target: "alias".to_string(),
            output: "invoke_target".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("integration"));
        assert!(msg.contains("alias"));
        assert!(msg.contains("invoke_target"));
    }
}
