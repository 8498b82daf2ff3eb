//! The state store contract and its JSON-file implementation.
//!
//! The store holds exactly one document: the map from logical name to
//! [`AppliedResource`]. It is read once at the start of a reconciliation
//! run and written once per successful node apply batch. All
//! implementations must make `save` atomic — a crash mid-write must never
//! leave a truncated state file behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StateError;
use crate::record::AppliedResource;
use crate::StateResult;

/// The persisted document: logical name → applied record.
pub type StateMap = BTreeMap<String, AppliedResource>;

/// Durable storage for the applied-resource map.
///
/// Backend-agnostic; a file works, so does an object store or a database.
/// In-memory fakes are provided for testing via the `fakes` module.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the full applied-resource map. An absent backing document is
    /// not an error — it means no resource has ever been applied.
    async fn load(&self) -> StateResult<StateMap>;

    /// Persist the full applied-resource map, atomically.
    async fn save(&self, state: &StateMap) -> StateResult<()>;
}

/// JSON-file-backed state store.
///
/// The whole map is one pretty-printed JSON document, written via a temp
/// file in the same directory and renamed into place.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> StateResult<StateMap> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting empty");
                return Ok(StateMap::new());
            }
            Err(e) => return Err(StateError::Io(e)),
        };
        let state: StateMap = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), entries = state.len(), "loaded state");
        Ok(state)
    }

    async fn save(&self, state: &StateMap) -> StateResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let entries = state.len();
        let path = self.path.clone();

        // Atomic write: temp file in the same directory, then rename. The
        // temp-file dance is blocking io, so it runs off the runtime.
        tokio::task::spawn_blocking(move || -> StateResult<()> {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;

            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(&json)?;
            tmp.persist(&path).map_err(|e| StateError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StateError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!(path = %self.path.display(), entries, "saved state");
        Ok(())
    }
}
