//! SQLite backend for durable dialog and dedup state.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode};
use serde_json::Value;

use crate::{current_unix_timestamp_ms, StateStore, StoreError, DEFAULT_CLAIM_TTL_MS};

const STATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS state_values (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_unix_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS state_claims (
    key TEXT PRIMARY KEY,
    tag TEXT NOT NULL,
    expires_unix_ms INTEGER NOT NULL
);
";

/// Durable store backed by a single SQLite file. The connection sits
/// behind a mutex; claim writes rely on the primary-key constraint for
/// the first-writer-wins guarantee.
pub struct SqliteStateStore {
    connection: Mutex<Connection>,
    claim_ttl_ms: i64,
}

fn backend_error(error: rusqlite::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

impl SqliteStateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_claim_ttl_ms(path, DEFAULT_CLAIM_TTL_MS)
    }

    pub fn open_with_claim_ttl_ms(path: &Path, claim_ttl_ms: i64) -> Result<Self, StoreError> {
        let connection = Connection::open(path).map_err(backend_error)?;
        connection
            .execute_batch(STATE_SCHEMA)
            .map_err(backend_error)?;
        Ok(Self {
            connection: Mutex::new(connection),
            claim_ttl_ms,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))
    }

    fn insert_claim(
        connection: &Connection,
        key: &str,
        tag: &str,
        now: i64,
        ttl_ms: i64,
    ) -> Result<(), StoreError> {
        // Expired claims are swept inside the same transaction as the
        // insert so an overwrite of a stale key stays atomic.
        connection
            .execute(
                "DELETE FROM state_claims WHERE key = ?1 AND expires_unix_ms <= ?2",
                params![key, now],
            )
            .map_err(backend_error)?;
        let inserted = connection.execute(
            "INSERT INTO state_claims (key, tag, expires_unix_ms) VALUES (?1, ?2, ?3)",
            params![key, tag, now + ttl_ms],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict)
            }
            Err(error) => Err(backend_error(error)),
        }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn try_claim(&self, key: &str, tag: &str) -> Result<bool, StoreError> {
        let now = current_unix_timestamp_ms();
        let mut connection = self.lock()?;
        let transaction = connection.transaction().map_err(backend_error)?;
        let outcome = Self::insert_claim(&transaction, key, tag, now, self.claim_ttl_ms);
        match outcome {
            Ok(()) => {
                transaction.commit().map_err(backend_error)?;
                Ok(true)
            }
            Err(StoreError::Conflict) => {
                tracing::debug!(key, "claim already held");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT value FROM state_values WHERE key = ?1")
            .map_err(backend_error)?;
        let mut rows = statement.query(params![key]).map_err(backend_error)?;
        match rows.next().map_err(backend_error)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(backend_error)?;
                let value = serde_json::from_str(&raw)
                    .map_err(|error| StoreError::Serialization(error.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&value)
            .map_err(|error| StoreError::Serialization(error.to_string()))?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO state_values (key, value, updated_unix_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_unix_ms = ?3",
                params![key, raw, current_unix_timestamp_ms()],
            )
            .map_err(backend_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute("DELETE FROM state_values WHERE key = ?1", params![key])
            .map_err(backend_error)?;
        Ok(())
    }
}
