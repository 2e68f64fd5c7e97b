use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::store::connection::Database;
use crate::store::traits::KeyValueStore;

/// Durable store backed by a single `kv_store` table.
pub struct LibSqlStore {
    db: Database,
}

impl LibSqlStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for LibSqlStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.db.connection();
        let mut rows = conn
            .query("SELECT value FROM kv_store WHERE key = ?1", params![key])
            .await
            .map_err(|e| SyncError::StoreReadFailed(format!("{key}: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| SyncError::StoreReadFailed(format!("{key}: {e}")))?
        else {
            return Ok(None);
        };

        let raw: String = row
            .get(0)
            .map_err(|e| SyncError::StoreReadFailed(format!("{key}: {e}")))?;
        let value = serde_json::from_str(&raw)
            .map_err(|e| SyncError::StoreReadFailed(format!("{key}: corrupt value: {e}")))?;

        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let raw = serde_json::to_string(&value)?;
        let now = Utc::now().to_rfc3339();

        self.db
            .connection()
            .execute(
                r#"
                INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![key, raw, now],
            )
            .await
            .map_err(|e| SyncError::StoreWriteFailed(format!("{key}: {e}")))?;

        Ok(())
    }
}
