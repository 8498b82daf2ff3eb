//! End-to-end reconciliation of the canonical API stack.
//!
//! Exercises the engine through the public surface only: build the stack
//! descriptors, reconcile against the in-memory provider, and check the
//! idempotence / alias-stability / failure-isolation contracts.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use strato_core::fakes::MemoryProvider;
use strato_core::{
    ApiStack, ApplyOptions, DomainConfig, DomainMode, NodeStatus, Provider, Reconciler, Reference,
    ResourceDescriptor, ResourceKind, StackConfig,
};
use strato_state::fakes::MemoryStateStore;

fn stack_config(domain: Option<DomainConfig>) -> StackConfig {
    StackConfig {
        account_id: "123456789012".to_string(),
        region: "eu-central-1".to_string(),
        runtime: "provided".to_string(),
        handler: "bootstrap".to_string(),
        layers: vec![],
        domain,
    }
}

fn auth_stack() -> ApiStack {
    ApiStack::new(
        "auth",
        stack_config(Some(DomainConfig {
            name: "api.example.test".to_string(),
            mode: DomainMode::Managed,
            certificate_id: Some("cert-1".to_string()),
        })),
        "artifact-v1",
    )
    .with_route("ANY", "/auth")
}

fn harness() -> (Arc<MemoryProvider>, Reconciler) {
    let provider = Arc::new(MemoryProvider::new());
    let reconciler = Reconciler::new(
        Arc::clone(&provider) as Arc<dyn Provider>,
        Arc::new(MemoryStateStore::new()),
    );
    (provider, reconciler)
}

#[tokio::test]
async fn first_apply_creates_the_whole_stack() {
    let (provider, reconciler) = harness();
    let stack = auth_stack();
    let set = stack.descriptors();

    let report = reconciler
        .reconcile(&set, &ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.applied.len(), set.len());
    assert_eq!(provider.create_calls() as usize, set.len());
    assert_eq!(provider.update_calls(), 0);
}

#[tokio::test]
async fn unchanged_reapply_makes_zero_provider_calls() {
    let (provider, reconciler) = harness();
    let set = auth_stack().descriptors();

    reconciler
        .reconcile(&set, &ApplyOptions::default())
        .await
        .unwrap();
    let creates_after_first = provider.create_calls();

    let second = reconciler
        .reconcile(&set, &ApplyOptions::default())
        .await
        .unwrap();

    assert!(second.success());
    assert_eq!(second.noop.len(), set.len());
    assert!(second.applied.is_empty());
    assert_eq!(provider.create_calls(), creates_after_first);
    assert_eq!(provider.update_calls(), 0);
}

#[tokio::test]
async fn cutover_touches_only_function_and_alias() {
    let (provider, reconciler) = harness();
    let mut stack = auth_stack();

    reconciler
        .reconcile(&stack.descriptors(), &ApplyOptions::default())
        .await
        .unwrap();
    let creates_after_first = provider.create_calls();

    let (report, binding) = stack
        .publish_and_cutover(&reconciler, "artifact-v2", &ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.success());
    let mut touched = report.applied.clone();
    touched.sort();
    assert_eq!(touched, vec!["auth-alias", "auth-fn"]);

    // Everything downstream of the alias's stable identity no-ops.
    for node in [
        "auth-invoke-permission",
        "auth-integration",
        "auth-route-any-auth",
        "auth-deployment",
        "auth-stage",
        "auth-mapping",
    ] {
        assert_eq!(
            report.status_of(node),
            Some(NodeStatus::Noop),
            "{node} must not re-apply on cutover"
        );
    }

    // The alias now points at the freshly published version.
    assert_eq!(binding.function_name, "auth");
    assert_eq!(binding.alias_name, "live");
    assert_eq!(binding.target_version, "2");

    // No new resources were created, only the two updates ran.
    assert_eq!(provider.create_calls(), creates_after_first);
    assert_eq!(provider.update_calls(), 2);
}

#[tokio::test]
async fn external_domain_is_looked_up_not_created() {
    let (provider, reconciler) = harness();
    let mut outputs = BTreeMap::new();
    outputs.insert("id".to_string(), json!("api.example.test"));
    provider.register_external("api.example.test", outputs);

    let stack = ApiStack::new(
        "auth",
        stack_config(Some(DomainConfig {
            name: "api.example.test".to_string(),
            mode: DomainMode::External,
            certificate_id: None,
        })),
        "artifact-v1",
    )
    .with_route("ANY", "/auth");

    let report = reconciler
        .reconcile(&stack.descriptors(), &ApplyOptions::default())
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.status_of("auth-domain"), Some(NodeStatus::Applied));
    assert_eq!(provider.read_calls(), 1);

    // The mapping resolved the domain id from the looked-up outputs.
    let state = reconciler.current_state().await.unwrap();
    assert_eq!(
        state["auth-domain"].provider_id,
        "api.example.test".to_string()
    );
}

#[tokio::test]
async fn failed_function_skips_alias_chain_but_not_api_side() {
    let (provider, reconciler) = harness();
    provider.fail_on(ResourceKind::Function);

    let report = reconciler
        .reconcile(&auth_stack().descriptors(), &ApplyOptions::default())
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.status_of("auth-fn"), Some(NodeStatus::Failed));
    for node in ["auth-alias", "auth-invoke-permission", "auth-integration"] {
        assert_eq!(report.status_of(node), Some(NodeStatus::Skipped), "{node}");
    }
    // Independent of the function: created fine.
    for node in ["auth-role", "auth-api", "auth-domain", "auth-logs"] {
        assert_eq!(report.status_of(node), Some(NodeStatus::Applied), "{node}");
    }
}

#[tokio::test]
async fn recovery_run_finishes_the_skipped_tail() {
    let (provider, reconciler) = harness();
    provider.fail_on(ResourceKind::Function);
    let set = auth_stack().descriptors();

    reconciler
        .reconcile(&set, &ApplyOptions::default())
        .await
        .unwrap();
    provider.clear_failures();

    let second = reconciler
        .reconcile(&set, &ApplyOptions::default())
        .await
        .unwrap();

    assert!(second.success());
    // Nodes applied in run one are noops now; the tail gets created.
    assert_eq!(second.status_of("auth-role"), Some(NodeStatus::Noop));
    assert_eq!(second.status_of("auth-fn"), Some(NodeStatus::Applied));
    assert_eq!(second.status_of("auth-stage"), Some(NodeStatus::Applied));
}

/// A worked example declared by hand rather than via [`ApiStack`]: every
/// dependency edge must map to a strictly increasing batch index, and an
/// artifact bump must leave everything but Function and Alias untouched.
#[tokio::test]
async fn hand_declared_example_set_respects_edges_and_alias_stability() {
    fn example_set(artifact: &str) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor::new(ResourceKind::ExecutionRole, "role", json!({ "name": "r" })),
            ResourceDescriptor::new(
                ResourceKind::Function,
                "fn",
                json!({ "role": Reference::value("role", "id"), "artifact": artifact }),
            )
            .depends_on("role"),
            ResourceDescriptor::new(
                ResourceKind::Alias,
                "alias",
                json!({
                    "function": Reference::value("fn", "id"),
                    "name": "live",
                    "function_version": Reference::value("fn", "version"),
                }),
            )
            .depends_on("fn"),
            ResourceDescriptor::new(
                ResourceKind::Permission,
                "permission",
                json!({ "target": Reference::value("alias", "invoke_target") }),
            )
            .depends_on("alias"),
            ResourceDescriptor::new(ResourceKind::Api, "api", json!({ "protocol": "http" })),
            ResourceDescriptor::new(
                ResourceKind::Integration,
                "integration",
                json!({
                    "api": Reference::value("api", "id"),
                    "target": Reference::value("alias", "invoke_target"),
                }),
            )
            .depends_on("api")
            .depends_on("alias"),
            ResourceDescriptor::new(
                ResourceKind::Route,
                "route",
                json!({
                    "api": Reference::value("api", "id"),
                    "route_key": "ANY /auth",
                    "integration": Reference::value("integration", "id"),
                }),
            )
            .depends_on("api")
            .depends_on("integration"),
            ResourceDescriptor::new(
                ResourceKind::Stage,
                "stage",
                json!({ "api": Reference::value("api", "id"), "name": "prod" }),
            )
            .depends_on("api"),
            ResourceDescriptor::new(
                ResourceKind::DomainName,
                "domain",
                json!({ "name": "api.example.test" }),
            ),
            ResourceDescriptor::new(
                ResourceKind::ApiMapping,
                "mapping",
                json!({
                    "domain": Reference::value("domain", "id"),
                    "stage": Reference::value("stage", "stage_name"),
                }),
            )
            .depends_on("stage")
            .depends_on("domain"),
        ]
    }

    let set = example_set("artifact-v1");
    let graph = strato_core::DependencyGraph::build(&set).unwrap();
    let plan = strato_core::schedule(&graph).unwrap();

    // The batch count equals the longest dependency chain:
    // role -> fn -> alias -> integration -> route, five nodes deep.
    assert_eq!(plan.batches().len(), 5);

    for desc in &set {
        let consumer = plan.batch_of(&desc.logical_name).unwrap();
        for dep in &desc.depends_on {
            assert!(plan.batch_of(dep).unwrap() < consumer, "{dep} before {}", desc.logical_name);
        }
    }

    let (_, reconciler) = harness();
    reconciler
        .reconcile(&set, &ApplyOptions::default())
        .await
        .unwrap();

    let second = reconciler
        .reconcile(&example_set("artifact-v2"), &ApplyOptions::default())
        .await
        .unwrap();
    assert!(second.success());
    let mut touched = second.applied.clone();
    touched.sort();
    assert_eq!(touched, vec!["alias", "fn"]);
    for node in ["permission", "integration", "route", "stage", "mapping"] {
        assert_eq!(second.status_of(node), Some(NodeStatus::Noop), "{node}");
    }
}
