//! The reconciler: drives a [`RunPlan`] against a [`Provider`], batch by
//! batch, and converges real resources toward the declared set.
//!
//! Per node: resolve references from already-applied state, hash the
//! resolved properties, and either no-op (hash unchanged), create (no
//! prior record), update (hash changed), or read (external ownership).
//! Nodes within a batch run concurrently on a [`JoinSet`]; the reconciler
//! drains the set before touching the next batch, so reference resolution
//! only ever sees settled producers.
//!
//! A node failure is contained: siblings finish, transitive dependents are
//! skipped, and the run completes with a partitioned report. There is no
//! rollback — partial application is a valid, resumable state, and the
//! next run's hash check makes retries convergent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strato_state::{AppliedResource, ContentDigest, Ownership, StateMap, StateStore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::graph::DependencyGraph;
use crate::model::{content_hash, resolve_references, ResourceDescriptor};
use crate::provider::{Provider, ProviderError};
use crate::schedule::{schedule, RunPlan};

/// Caller-tunable knobs for one reconciliation run.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Per-provider-call timeout. Elapsing it fails that node only.
    pub timeout: Duration,
    /// Cooperative cancellation: in-flight applies finish, no new batch
    /// starts, everything unattempted is reported skipped.
    pub cancel: CancellationToken,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }
}

/// Terminal state of one node in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Applied,
    Noop,
    Failed,
    Skipped,
}

/// Aggregated result of a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Nodes created or updated through the provider.
    pub applied: Vec<String>,
    /// Nodes whose content hash matched prior state (no provider call).
    pub noop: Vec<String>,
    /// Nodes whose provider call failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Nodes not attempted because an upstream node failed (or the run
    /// was cancelled before their batch).
    pub skipped: Vec<String>,
}

impl RunReport {
    /// `true` when no node ended failed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Terminal status of a named node, if it was part of the run.
    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        if self.applied.iter().any(|n| n == name) {
            Some(NodeStatus::Applied)
        } else if self.noop.iter().any(|n| n == name) {
            Some(NodeStatus::Noop)
        } else if self.failed.iter().any(|(n, _)| n == name) {
            Some(NodeStatus::Failed)
        } else if self.skipped.iter().any(|n| n == name) {
            Some(NodeStatus::Skipped)
        } else {
            None
        }
    }
}

/// Drives plans against a provider and records applied state durably.
pub struct Reconciler {
    provider: Arc<dyn Provider>,
    store: Arc<dyn StateStore>,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<dyn StateStore>) -> Self {
        Self { provider, store }
    }

    /// Validate, build, schedule, and apply a descriptor set in one go.
    pub async fn reconcile(
        &self,
        descriptors: &[ResourceDescriptor],
        options: &ApplyOptions,
    ) -> ReconcileResult<RunReport> {
        let graph = DependencyGraph::build(descriptors)?;
        let plan = schedule(&graph)?;
        self.apply(&graph, &plan, descriptors, options).await
    }

    /// Apply a pre-computed plan.
    ///
    /// State is loaded before the first batch (a store failure here aborts
    /// the run — applies that cannot be recorded are never safe) and saved
    /// after every batch so a crash mid-run resumes cleanly.
    pub async fn apply(
        &self,
        graph: &DependencyGraph,
        plan: &RunPlan,
        descriptors: &[ResourceDescriptor],
        options: &ApplyOptions,
    ) -> ReconcileResult<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, nodes = plan.node_count(), batches = plan.batches().len(), "starting reconciliation");

        let mut state = self.store.load().await?;
        let by_name: HashMap<&str, &ResourceDescriptor> = descriptors
            .iter()
            .map(|d| (d.logical_name.as_str(), d))
            .collect();

        let mut applied: Vec<String> = Vec::new();
        let mut noop: Vec<String> = Vec::new();
        let mut failed: Vec<(String, String)> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        let mut skip_set: HashSet<String> = HashSet::new();
        let mut cancelled = false;

        for (batch_idx, batch) in plan.batches().iter().enumerate() {
            if options.cancel.is_cancelled() && !cancelled {
                warn!(run_id = %run_id, batch = batch_idx, "cancellation requested, skipping remaining batches");
                cancelled = true;
            }
            if cancelled {
                skipped.extend(batch.iter().cloned());
                continue;
            }

            let mut workers: JoinSet<(String, Result<AppliedResource, String>)> = JoinSet::new();
            // A fatal error mid-batch never short-circuits past the join
            // barrier: workers already spawned run to completion and their
            // records are persisted before the run aborts. A provider call
            // is not safely interruptible, and an apply that went through
            // but was never recorded would be re-created on the next run.
            let mut fatal: Option<ReconcileError> = None;

            for name in batch {
                if skip_set.contains(name) {
                    skipped.push(name.clone());
                    continue;
                }
                let Some(desc) = by_name.get(name.as_str()).copied() else {
                    fatal = Some(ReconcileError::DanglingReference {
                        from: "plan".to_string(),
                        missing: name.clone(),
                    });
                    break;
                };

                // Producers are settled: unresolved here is fatal.
                let resolved = match resolve_references(name, &desc.properties, &state) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                };
                let hash = content_hash(&resolved);
                let prior = state.get(name).cloned();

                if let Some(prior) = &prior {
                    if prior.ownership != desc.ownership {
                        let reason = ReconcileError::OwnershipConflict { name: name.clone() }
                            .to_string();
                        warn!(node = %name, %reason, "node failed before provider call");
                        failed.push((name.clone(), reason));
                        skip_set.extend(graph.transitive_dependents_of(name));
                        continue;
                    }
                    if prior.content_hash == hash {
                        debug!(node = %name, hash = %hash.short(), "unchanged, no-op");
                        noop.push(name.clone());
                        continue;
                    }
                }

                let provider = Arc::clone(&self.provider);
                let desc = desc.clone();
                let timeout = options.timeout;
                workers.spawn(async move {
                    let name = desc.logical_name.clone();
                    let result = apply_node(provider, desc, resolved, hash, prior, timeout).await;
                    (name, result)
                });
            }

            // Join barrier: the next batch resolves references only once
            // every worker here has succeeded, failed, or timed out.
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((name, Ok(record))) => {
                        info!(node = %name, provider_id = %record.provider_id, "applied");
                        state.insert(name.clone(), record);
                        applied.push(name);
                    }
                    Ok((name, Err(reason))) => {
                        warn!(node = %name, %reason, "apply failed, skipping dependents");
                        skip_set.extend(graph.transitive_dependents_of(&name));
                        failed.push((name, reason));
                    }
                    Err(e) => {
                        if fatal.is_none() {
                            fatal = Some(ReconcileError::Worker(e.to_string()));
                        }
                    }
                }
            }

            self.store.save(&state).await?;
            if let Some(err) = fatal {
                warn!(run_id = %run_id, batch = batch_idx, %err, "run aborted after recording finished siblings");
                return Err(err);
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            applied,
            noop,
            failed,
            skipped,
        };
        info!(
            run_id = %report.run_id,
            applied = report.applied.len(),
            noop = report.noop.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Read-only view of the persisted applied-resource map.
    pub async fn current_state(&self) -> ReconcileResult<StateMap> {
        Ok(self.store.load().await?)
    }
}

/// Apply one node through the provider, under a timeout.
///
/// Errors come back as display strings: they are per-node diagnostics for
/// the report, not run-level control flow.
async fn apply_node(
    provider: Arc<dyn Provider>,
    desc: ResourceDescriptor,
    resolved: Value,
    hash: ContentDigest,
    prior: Option<AppliedResource>,
    timeout: Duration,
) -> Result<AppliedResource, String> {
    let name = desc.logical_name.clone();
    let call = async {
        match desc.ownership {
            Ownership::External => {
                let provider_id = resolved
                    .get("provider_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProviderError::Failed("missing provider_id".to_string()))?;
                let outputs = provider.read(desc.kind, provider_id).await?;
                Ok::<AppliedResource, ProviderError>(AppliedResource {
                    logical_name: name.clone(),
                    provider_id: provider_id.to_string(),
                    outputs,
                    content_hash: hash.clone(),
                    ownership: Ownership::External,
                })
            }
            Ownership::Managed => match &prior {
                Some(prior) => {
                    let outputs = provider
                        .update(desc.kind, &prior.provider_id, &resolved)
                        .await?;
                    Ok(AppliedResource {
                        logical_name: name.clone(),
                        provider_id: prior.provider_id.clone(),
                        outputs,
                        content_hash: hash.clone(),
                        ownership: Ownership::Managed,
                    })
                }
                None => {
                    let created = provider.create(desc.kind, &resolved).await?;
                    Ok(AppliedResource {
                        logical_name: name.clone(),
                        provider_id: created.provider_id,
                        outputs: created.outputs,
                        content_hash: hash.clone(),
                        ownership: Ownership::Managed,
                    })
                }
            },
        }
    };

    // A cloud create/update is not safely interruptible mid-call, so the
    // timeout is the only thing that abandons one.
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(record)) => Ok(record),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(ProviderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
        .to_string()),
    }
}
