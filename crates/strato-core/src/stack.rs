//! Canonical serverless-API stack composition and alias cutover.
//!
//! [`ApiStack`] is the one parameterized construction of the resource
//! chain every deployment needs: execution role → policy attachment →
//! log group → function → alias → permission → api → integration →
//! route(s) → deployment → stage → custom domain → api mapping. All
//! configuration (account, region, domain, certificate, layers) is
//! threaded in explicitly via [`StackConfig`] — nothing ambient.
//!
//! The load-bearing rule lives here: the Integration and the Permission
//! reference the **alias's** stable invoke identity, never the function
//! or a version-qualified identity. Repointing the alias to a freshly
//! published version therefore changes nothing downstream of it — routes,
//! deployment, stage, and mapping all no-op on a cutover run.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{AliasBinding, Reference, ResourceDescriptor, ResourceKind};
use crate::reconcile::{ApplyOptions, NodeStatus, Reconciler, RunReport};

/// Who owns the custom domain's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainMode {
    /// This stack creates and updates the DomainName resource.
    Managed,
    /// The DomainName exists outside this stack; bind to it read-only.
    External,
}

/// Custom-domain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub mode: DomainMode,
    /// Required for managed domains; issuance itself is out of scope.
    #[serde(default)]
    pub certificate_id: Option<String>,
}

/// Explicit deployment configuration.
///
/// The source systems kept these as mutable process-wide globals; here
/// they are plain data handed to the stack builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub account_id: String,
    pub region: String,
    pub runtime: String,
    pub handler: String,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub domain: Option<DomainConfig>,
}

/// Builder for the canonical descriptor chain of one serverless HTTP API.
#[derive(Debug, Clone)]
pub struct ApiStack {
    name: String,
    config: StackConfig,
    artifact: String,
    alias_name: String,
    stage_name: String,
    routes: Vec<(String, String)>,
}

impl ApiStack {
    /// A stack named `name` serving `artifact` (a content digest of the
    /// packaged code; packaging happens elsewhere).
    pub fn new(name: impl Into<String>, config: StackConfig, artifact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config,
            artifact: artifact.into(),
            alias_name: "live".to_string(),
            stage_name: "prod".to_string(),
            routes: Vec::new(),
        }
    }

    /// Add a route, e.g. `with_route("ANY", "/auth")`.
    pub fn with_route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.routes.push((method.into(), path.into()));
        self
    }

    pub fn with_alias_name(mut self, name: impl Into<String>) -> Self {
        self.alias_name = name.into();
        self
    }

    pub fn with_stage_name(mut self, name: impl Into<String>) -> Self {
        self.stage_name = name.into();
        self
    }

    /// Swap the artifact; the next reconcile publishes a new version.
    pub fn set_artifact(&mut self, artifact: impl Into<String>) {
        self.artifact = artifact.into();
    }

    fn logical(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }

    /// The full descriptor set for this stack.
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        let role = self.logical("role");
        let role_policy = self.logical("role-policy");
        let log_group = self.logical("logs");
        let log_policy = self.logical("logs-policy");
        let function = self.logical("fn");
        let alias = self.logical("alias");
        let permission = self.logical("invoke-permission");
        let api = self.logical("api");
        let integration = self.logical("integration");
        let deployment = self.logical("deployment");
        let stage = self.logical("stage");
        let domain = self.logical("domain");
        let mapping = self.logical("mapping");

        let mut set = vec![
            ResourceDescriptor::new(
                ResourceKind::ExecutionRole,
                &role,
                json!({
                    "name": format!("{}-exec", self.name),
                    "account_id": self.config.account_id,
                    "trusted_service": "compute",
                }),
            ),
            ResourceDescriptor::new(
                ResourceKind::RolePolicyAttachment,
                &role_policy,
                json!({
                    "role": Reference::value(&role, "id"),
                    "policy": "basic-execution",
                }),
            )
            .depends_on(&role),
            ResourceDescriptor::new(
                ResourceKind::LogGroup,
                &log_group,
                json!({
                    "name": format!("/functions/{}", self.name),
                    "retention_days": 30,
                }),
            ),
            ResourceDescriptor::new(
                ResourceKind::LogResourcePolicy,
                &log_policy,
                json!({
                    "log_group": Reference::value(&log_group, "id"),
                    "principal": "gateway",
                }),
            )
            .depends_on(&log_group),
            ResourceDescriptor::new(
                ResourceKind::Function,
                &function,
                json!({
                    "name": self.name,
                    "runtime": self.config.runtime,
                    "handler": self.config.handler,
                    "layers": self.config.layers,
                    "role": Reference::value(&role, "id"),
                    "log_group": Reference::value(&log_group, "id"),
                    "artifact": self.artifact,
                    "publish": true,
                }),
            )
            .depends_on(&role)
            .depends_on(&role_policy)
            .depends_on(&log_group),
            ResourceDescriptor::new(
                ResourceKind::Alias,
                &alias,
                json!({
                    "function": Reference::value(&function, "id"),
                    "name": self.alias_name,
                    "function_version": Reference::value(&function, "version"),
                }),
            )
            .depends_on(&function),
            // Scoped to the alias identity: stable across version bumps,
            // so it is never reissued on publish.
            ResourceDescriptor::new(
                ResourceKind::Permission,
                &permission,
                json!({
                    "principal": "gateway",
                    "action": "invoke",
                    "target": Reference::value(&alias, "invoke_target"),
                }),
            )
            .depends_on(&alias),
            ResourceDescriptor::new(
                ResourceKind::Api,
                &api,
                json!({
                    "name": self.name,
                    "protocol": "http",
                    "region": self.config.region,
                }),
            ),
            ResourceDescriptor::new(
                ResourceKind::Integration,
                &integration,
                json!({
                    "api": Reference::value(&api, "id"),
                    "target": Reference::value(&alias, "invoke_target"),
                    "payload_format": "2.0",
                }),
            )
            .depends_on(&api)
            .depends_on(&alias),
        ];

        let mut route_names = Vec::new();
        for (method, path) in &self.routes {
            let slug = path.trim_matches('/').replace('/', "-");
            let route = self.logical(&format!("route-{}-{}", method.to_lowercase(), slug));
            set.push(
                ResourceDescriptor::new(
                    ResourceKind::Route,
                    &route,
                    json!({
                        "api": Reference::value(&api, "id"),
                        "route_key": format!("{method} {path}"),
                        "integration": Reference::value(&integration, "id"),
                    }),
                )
                .depends_on(&api)
                .depends_on(&integration),
            );
            route_names.push(route);
        }

        let mut deployment_desc = ResourceDescriptor::new(
            ResourceKind::Deployment,
            &deployment,
            json!({
                "api": Reference::value(&api, "id"),
                "routes": route_names
                    .iter()
                    .map(|r| Reference::value(r, "id"))
                    .collect::<Vec<_>>(),
            }),
        )
        .depends_on(&api);
        for route in &route_names {
            deployment_desc = deployment_desc.depends_on(route);
        }
        set.push(deployment_desc);

        set.push(
            ResourceDescriptor::new(
                ResourceKind::Stage,
                &stage,
                json!({
                    "api": Reference::value(&api, "id"),
                    "deployment": Reference::value(&deployment, "id"),
                    "name": self.stage_name,
                }),
            )
            .depends_on(&api)
            .depends_on(&deployment),
        );

        if let Some(domain_cfg) = &self.config.domain {
            let domain_desc = match domain_cfg.mode {
                DomainMode::Managed => ResourceDescriptor::new(
                    ResourceKind::DomainName,
                    &domain,
                    json!({
                        "name": domain_cfg.name,
                        "certificate": domain_cfg.certificate_id,
                    }),
                ),
                DomainMode::External => ResourceDescriptor::new(
                    ResourceKind::DomainName,
                    &domain,
                    json!({ "provider_id": domain_cfg.name }),
                )
                .external(),
            };
            set.push(domain_desc);
            set.push(
                ResourceDescriptor::new(
                    ResourceKind::ApiMapping,
                    &mapping,
                    json!({
                        "api": Reference::value(&api, "id"),
                        "domain": Reference::value(&domain, "id"),
                        "stage": Reference::value(&stage, "stage_name"),
                    }),
                )
                .depends_on(&api)
                .depends_on(&domain)
                .depends_on(&stage),
            );
        }

        set
    }

    /// Publish a new artifact and atomically repoint the alias to the
    /// version the provider assigns for it.
    ///
    /// The changed artifact digest forces the Function node to re-apply,
    /// which publishes a new immutable version; the Alias node re-resolves
    /// the version output and repoints. Everything referencing the alias's
    /// stable identity no-ops. Fails if the function or alias node did not
    /// settle as applied or noop.
    pub async fn publish_and_cutover(
        &mut self,
        reconciler: &Reconciler,
        artifact: impl Into<String>,
        options: &ApplyOptions,
    ) -> ReconcileResult<(RunReport, AliasBinding)> {
        self.set_artifact(artifact);
        let report = reconciler.reconcile(&self.descriptors(), options).await?;

        for node in [self.logical("fn"), self.logical("alias")] {
            match report.status_of(&node) {
                Some(NodeStatus::Applied) | Some(NodeStatus::Noop) => {}
                other => {
                    return Err(ReconcileError::CutoverIncomplete {
                        node,
                        status: other
                            .map(|s| format!("{s:?}").to_lowercase())
                            .unwrap_or_else(|| "unscheduled".to_string()),
                    })
                }
            }
        }

        let state = reconciler.current_state().await?;
        let target_version = state
            .get(&self.logical("fn"))
            .and_then(|r| r.output("version"))
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| ReconcileError::CutoverIncomplete {
                node: self.logical("fn"),
                status: "missing version output".to_string(),
            })?;

        let binding = AliasBinding {
            function_name: self.name.clone(),
            alias_name: self.alias_name.clone(),
            target_version,
        };
        Ok((report, binding))
    }
}
