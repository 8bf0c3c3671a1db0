use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use partline_core::{CallId, CallState};

use crate::{StateStore, StoreError};

/// Mutex-backed store for tests and single-process embedding. Implements
/// the same compare-and-set contract as the SQLite store.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<Mutex<HashMap<CallId, CallState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<CallId, CallState>) -> R) -> R {
        match self.entries.lock() {
            Ok(mut entries) => f(&mut entries),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, call_id: &CallId) -> Result<Option<CallState>, StoreError> {
        Ok(self.with_entries(|entries| entries.get(call_id).cloned()))
    }

    async fn put(&self, state: &CallState, expected_version: u64) -> Result<u64, StoreError> {
        self.with_entries(|entries| {
            let stored_version =
                entries.get(&state.call_id).map(|stored| stored.version).unwrap_or(0);
            if stored_version != expected_version {
                return Err(StoreError::Conflict {
                    call_id: state.call_id.clone(),
                    expected_version,
                });
            }
            let mut next = state.clone();
            next.version = expected_version + 1;
            let new_version = next.version;
            entries.insert(state.call_id.clone(), next);
            Ok(new_version)
        })
    }

    async fn delete(&self, call_id: &CallId) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.remove(call_id);
        });
        Ok(())
    }
}
