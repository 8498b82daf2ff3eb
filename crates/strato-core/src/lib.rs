//! Strato Core Library
//!
//! Dependency-graph reconciliation for small serverless HTTP APIs:
//!
//! - [`model`] — typed resource descriptors, references, set validation
//! - [`graph::DependencyGraph`] — validated DAG over declared resources
//! - [`schedule`] — topological frontier batching into a [`schedule::RunPlan`]
//! - [`reconcile::Reconciler`] — idempotent, batch-parallel apply with
//!   per-node failure isolation
//! - [`stack::ApiStack`] — the canonical role→function→alias→api→route
//!   chain, with alias-stable cutover via
//!   [`stack::ApiStack::publish_and_cutover`]
//! - [`provider::Provider`] — the boundary to the cloud backend

pub mod error;
pub mod fakes;
pub mod graph;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod schedule;
pub mod stack;
pub mod telemetry;

pub use error::{ReconcileError, ReconcileResult};
pub use graph::DependencyGraph;
pub use model::{
    content_hash, resolve_references, validate_set, AliasBinding, Reference, ResourceDescriptor,
    ResourceKind,
};
pub use provider::{Created, Provider, ProviderError};
pub use reconcile::{ApplyOptions, NodeStatus, Reconciler, RunReport};
pub use schedule::{schedule, RunPlan};
pub use stack::{ApiStack, DomainConfig, DomainMode, StackConfig};

pub use strato_state::{AppliedResource, ContentDigest, Ownership, StateMap, StateStore};
