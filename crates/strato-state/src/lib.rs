//! Strato-State: Durable State for Reconciliation Runs
//!
//! This crate provides the persistence layer for strato. It stores the
//! applied-resource map that makes re-running a reconciliation safe: each
//! entry records the provider-assigned id, the outputs other resources
//! reference, and the content hash used for no-op detection.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: durable, atomic load/save of the applied-resource map.
//!
//! ## Key Components
//!
//! - `ContentDigest`: SHA-256 digest over canonical resolved properties
//! - `AppliedResource`: per-resource record persisted between runs
//! - `StateStore`: the load/save contract, with a JSON-file implementation

mod digest;
mod error;
mod record;
pub mod fakes;
pub mod store;

pub use digest::ContentDigest;
pub use error::StateError;
pub use record::{AppliedResource, Ownership};
pub use store::{FileStateStore, StateMap, StateStore};

/// Result type for strato-state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
