//! Key-value state store with a conditional first-writer-wins claim
//! primitive, used for dialog sessions and sign-in dedup records.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod memory;
mod sqlite;
#[cfg(test)]
mod tests;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Claims expire after the credential-prompt window so the claim table
/// stays bounded; an expired claim is treated as absent.
pub const DEFAULT_CLAIM_TTL_MS: i64 = 900_000;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is already claimed. `try_claim` maps this to `Ok(false)`;
    /// the variant exists so backends can report it distinctly from
    /// infrastructure failures.
    #[error("key already claimed")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store serialization error: {0}")]
    Serialization(String),
}

/// Trait contract for the persisted-state backends. Both the dedup
/// claims and the dialog session records go through this seam; the
/// concrete storage technology is an implementation choice.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Conditional write: returns `Ok(true)` only for the first caller
    /// to present `key` within the claim TTL. Later callers get
    /// `Ok(false)`. Errors are infrastructure failures, never conflicts.
    async fn try_claim(&self, key: &str, tag: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

pub(crate) fn current_unix_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
