//! Durable session storage in SQLite.
//!
//! A single-row table holds the serialized session; `INSERT OR REPLACE`
//! keeps writes idempotent. Blocking rusqlite calls run on the blocking
//! thread pool.

use std::sync::Arc;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::debug;
use voltbridge_core::ports::SessionStore;
use voltbridge_domain::{Result as DomainResult, Session, VoltBridgeError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS session (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// SQLite-backed [`SessionStore`].
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SqliteSessionStore {
    /// Open (and create if needed) the session database.
    ///
    /// # Errors
    /// Returns `VoltBridgeError::Database` if the pool cannot be built or
    /// the schema cannot be applied.
    pub fn new(path: &str, pool_size: u32) -> DomainResult<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| VoltBridgeError::Database(format!("failed to open pool: {e}")))?;

        let conn = pool
            .get()
            .map_err(|e| VoltBridgeError::Database(format!("failed to get connection: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| VoltBridgeError::Database(format!("failed to apply schema: {e}")))?;

        debug!(path, "session store ready");
        Ok(Self { pool: Arc::new(pool) })
    }

    async fn with_conn<T, F>(&self, op: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> DomainResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| VoltBridgeError::Database(format!("failed to get connection: {e}")))?;
            op(&conn)
        })
        .await
        .map_err(|e| VoltBridgeError::Internal(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self) -> DomainResult<Option<Session>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT payload FROM session WHERE id = 1")
                .map_err(|e| VoltBridgeError::Database(e.to_string()))?;
            let payload: Option<String> = stmt
                .query_row([], |row| row.get(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(VoltBridgeError::Database(other.to_string())),
                })?;

            match payload {
                Some(json) => serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| VoltBridgeError::Database(format!("corrupt session row: {e}"))),
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(&self, session: &Session) -> DomainResult<()> {
        let payload = serde_json::to_string(session)
            .map_err(|e| VoltBridgeError::Internal(format!("failed to serialize session: {e}")))?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session (id, payload, updated_at) VALUES (1, ?1, ?2)",
                params![payload, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| VoltBridgeError::Database(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> DomainResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM session WHERE id = 1", [])
                .map_err(|e| VoltBridgeError::Database(e.to_string()))?;
            Ok(())
        })
        .await
    }
}
