//! In-memory backend for tests and single-node runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{current_unix_timestamp_ms, StateStore, StoreError, DEFAULT_CLAIM_TTL_MS};

#[derive(Debug)]
struct ClaimRecord {
    tag: String,
    expires_unix_ms: i64,
}

#[derive(Debug)]
struct MemoryState {
    values: HashMap<String, Value>,
    claims: HashMap<String, ClaimRecord>,
}

/// `Mutex<HashMap>`-backed store. The claim check-and-insert happens
/// under one lock acquisition, which is what makes it first-writer-wins.
pub struct MemoryStateStore {
    state: Mutex<MemoryState>,
    claim_ttl_ms: i64,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::with_claim_ttl_ms(DEFAULT_CLAIM_TTL_MS)
    }

    pub fn with_claim_ttl_ms(claim_ttl_ms: i64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                values: HashMap::new(),
                claims: HashMap::new(),
            }),
            claim_ttl_ms,
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_poisoned() -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn try_claim(&self, key: &str, tag: &str) -> Result<bool, StoreError> {
        let now = current_unix_timestamp_ms();
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        if let Some(existing) = state.claims.get(key) {
            if existing.expires_unix_ms > now {
                tracing::debug!(key, tag = existing.tag.as_str(), "claim already held");
                return Ok(false);
            }
        }
        state.claims.insert(
            key.to_string(),
            ClaimRecord {
                tag: tag.to_string(),
                expires_unix_ms: now + self.claim_ttl_ms,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.values.remove(key);
        Ok(())
    }
}
