use libsql::{Builder, Connection};

use crate::config::StoreConfig;
use crate::error::Result;

use super::schema;

pub struct Database {
    conn: Connection,
    busy_timeout_ms: u64,
}

impl Database {
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let db = if config.url.starts_with("libsql://") || config.url.starts_with("https://") {
            Builder::new_remote(
                config.url.clone(),
                config.auth_token.clone().unwrap_or_default(),
            )
            .build()
            .await?
        } else if config.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        // A single shared connection keeps `:memory:` databases visible to every caller.
        let conn = db.connect()?;

        let database = Self {
            conn,
            busy_timeout_ms: config.busy_timeout_ms,
        };
        database.configure_database().await;
        schema::init_schema(&database.conn).await?;

        Ok(database)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn configure_database(&self) {
        let busy_timeout_sql = format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms);
        if let Err(error) = self.conn.execute_batch(&busy_timeout_sql).await {
            tracing::warn!(
                busy_timeout_ms = self.busy_timeout_ms,
                error = %error,
                "Failed to set SQLite busy_timeout"
            );
        }

        if let Err(error) = self.conn.execute_batch("PRAGMA journal_mode = WAL").await {
            tracing::warn!(error = %error, "Failed to set SQLite journal_mode");
        }
    }
}
