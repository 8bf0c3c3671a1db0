use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;

use partline_core::{CallId, CallState};

use crate::{StateStore, StoreError};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS call_state (
    call_id    TEXT PRIMARY KEY,
    version    INTEGER NOT NULL,
    status     TEXT NOT NULL,
    state_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_call_state_status_updated
    ON call_state (status, updated_at);
";

/// SQLite-backed state store. The version column carries the
/// compare-and-set discipline; the full state is stored as JSON so a
/// reload is field-for-field identical to what was persisted.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: DbPool,
}

impl SqliteStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Evicts terminal call states older than the TTL. The durable call
    /// record lives downstream, so this only trims the working set.
    /// Returns the number of evicted rows.
    pub async fn evict_terminal_older_than(&self, ttl_secs: u64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - TimeDelta::seconds(ttl_secs.min(i64::MAX as u64) as i64);
        let result = sqlx::query(
            "DELETE FROM call_state WHERE status != 'in_progress' AND updated_at < ?",
        )
        .bind(cutoff.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, call_id: &CallId) -> Result<Option<CallState>, StoreError> {
        let row = sqlx::query("SELECT state_json FROM call_state WHERE call_id = ?")
            .bind(&call_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                let state = serde_json::from_str(&json)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, state: &CallState, expected_version: u64) -> Result<u64, StoreError> {
        let new_version = expected_version + 1;
        let mut next = state.clone();
        next.version = new_version;
        let json = serde_json::to_string(&next)?;
        let status = match serde_json::to_value(next.status)? {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let updated_at = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        let affected = if expected_version == 0 {
            sqlx::query(
                "INSERT OR IGNORE INTO call_state (call_id, version, status, state_json, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&next.call_id.0)
            .bind(new_version as i64)
            .bind(&status)
            .bind(&json)
            .bind(&updated_at)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE call_state SET version = ?, status = ?, state_json = ?, updated_at = ?
                 WHERE call_id = ? AND version = ?",
            )
            .bind(new_version as i64)
            .bind(&status)
            .bind(&json)
            .bind(&updated_at)
            .bind(&next.call_id.0)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if affected == 0 {
            return Err(StoreError::Conflict {
                call_id: state.call_id.clone(),
                expected_version,
            });
        }
        Ok(new_version)
    }

    async fn delete(&self, call_id: &CallId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM call_state WHERE call_id = ?")
            .bind(&call_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use partline_core::{CallId, CallInit, CallState, CallStatus, PartRequest};

    use crate::sqlite::{connect_with_settings, SqliteStateStore};
    use crate::{StateStore, StoreError};

    async fn store_fixture() -> SqliteStateStore {
        // a single connection so the in-memory database is shared
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory sqlite");
        let store = SqliteStateStore::new(pool);
        store.init_schema().await.expect("schema");
        store
    }

    fn state_fixture(call_id: &str) -> CallState {
        CallState::from_init(CallInit {
            call_id: CallId(call_id.to_string()),
            quote_request_id: "QR-1".to_string(),
            supplier_id: "sup-1".to_string(),
            supplier_name: "Acme".to_string(),
            supplier_phone: "+15550100".to_string(),
            organization_id: "org-1".to_string(),
            caller_id: "user-1".to_string(),
            caller_team: "the procurement team".to_string(),
            callback_number: "+15550199".to_string(),
            parts: vec![PartRequest {
                part_number: "F-100".to_string(),
                description: "filter".to_string(),
                quantity: 1,
                budget_max_cents: Some(40_000),
            }],
            custom_context: Some("preferred supplier".to_string()),
            custom_instructions: None,
            max_negotiation_attempts: None,
        })
    }

    #[tokio::test]
    async fn round_trip_preserves_every_field() {
        let store = store_fixture().await;
        let mut state = state_fixture("call-1");
        let now = chrono::Utc::now();
        state.push_ai("opener", now);
        state.push_supplier("this is parts", now);

        let version = store.put(&state, 0).await.expect("put");
        state.version = version;

        let loaded = store.get(&state.call_id).await.expect("get").expect("present");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn version_mismatch_is_a_conflict_and_state_is_untouched() {
        let store = store_fixture().await;
        let state = state_fixture("call-2");

        store.put(&state, 0).await.expect("initial put");

        let mut racing = state.clone();
        racing.clarification_attempts = 9;
        let error = store.put(&racing, 0).await.expect_err("stale base version");
        assert!(matches!(error, StoreError::Conflict { expected_version: 0, .. }));

        let loaded = store.get(&state.call_id).await.expect("get").expect("present");
        assert_eq!(loaded.clarification_attempts, 0);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn sequential_versions_advance_one_at_a_time() {
        let store = store_fixture().await;
        let mut state = state_fixture("call-3");

        let v1 = store.put(&state, 0).await.expect("v1");
        state.version = v1;
        state.clarification_attempts = 1;
        let v2 = store.put(&state, v1).await.expect("v2");
        assert_eq!((v1, v2), (1, 2));
    }

    #[tokio::test]
    async fn ttl_eviction_only_touches_terminal_states() {
        let store = store_fixture().await;
        let mut active = state_fixture("call-active");
        store.put(&active, 0).await.expect("active put");

        let mut done = state_fixture("call-done");
        done.status = CallStatus::Completed;
        store.put(&done, 0).await.expect("done put");

        // ttl of zero makes every terminal row stale immediately
        let evicted = store.evict_terminal_older_than(0).await.expect("evict");
        assert_eq!(evicted, 1);
        assert!(store.get(&done.call_id).await.expect("get").is_none());
        active.version = 1;
        assert_eq!(store.get(&active.call_id).await.expect("get"), Some(active));
    }
}
