//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryStateStore`, which satisfies the [`StateStore`] contract
//! without touching the filesystem.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{StateMap, StateStore};
use crate::StateResult;

/// In-memory state store backed by a mutex-guarded [`StateMap`].
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<StateMap>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a pre-existing map (simulates a prior run).
    pub fn with_state(state: StateMap) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> StateResult<StateMap> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(&self, state: &StateMap) -> StateResult<()> {
        *self.state.lock().unwrap() = state.clone();
        Ok(())
    }
}
