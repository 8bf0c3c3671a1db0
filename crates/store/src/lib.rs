//! Externalized call-state persistence. Each webhook turn is a stateless
//! invocation, so the full `CallState` lives in a store keyed by call id
//! and every write goes through a compare-and-set version check: two
//! concurrent turns for the same call can never both mutate from the same
//! base state. The losing writer sees `StoreError::Conflict` and its turn
//! is dropped as a duplicate.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use partline_core::{CallId, CallState};

pub use memory::InMemoryStateStore;
pub use sqlite::{connect, connect_with_settings, DbPool, SqliteStateStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("concurrent update conflict for call {call_id} at expected version {expected_version}")]
    Conflict { call_id: CallId, expected_version: u64 },
    #[error("state serialization failed: {0}")]
    Serialization(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Unavailable(error.to_string())
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the current state for a call, carrying its stored version.
    async fn get(&self, call_id: &CallId) -> Result<Option<CallState>, StoreError>;

    /// Compare-and-set write. `expected_version` must equal the stored
    /// version (0 for a call not yet stored); the state is persisted with
    /// `expected_version + 1`, which is returned. A mismatch yields
    /// `StoreError::Conflict` and leaves the stored state untouched.
    async fn put(&self, state: &CallState, expected_version: u64) -> Result<u64, StoreError>;

    async fn delete(&self, call_id: &CallId) -> Result<(), StoreError>;
}
