//! Execution state persistence.
//!
//! The engine persists one JSON-serializable [`Execution`] record per run
//! through a narrow key-value contract ([`StateStore`]): get/set/delete by
//! key plus a prefix scan. The durable backend is the embedding
//! application's concern; [`MemoryStateStore`] covers tests and
//! single-process use.
//!
//! The engine saves after every node-visit step, so the persisted record is
//! at-or-behind the in-memory state by at most one step. A crash between
//! step completion and persistence replays that node on resume — attempts
//! advance and another history entry is appended; nothing de-duplicates the
//! node's side effects.

use crate::error::StoreError;
use crate::execution::Execution;
use amber_relay_core::{ExecutionId, WorkflowId};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Key prefix under which execution records are stored.
pub const STATE_KEY_PREFIX: &str = "workflow_state_";

/// Narrow key-value contract over the durable store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any existing value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Removes the value stored under `key`. Removing a missing key is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Returns all keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Creates, persists, loads, enumerates, and deletes execution records.
///
/// The manager never caches state; it only mirrors what the engine hands
/// it into the store.
pub struct StateManager {
    store: Arc<dyn StateStore>,
}

impl StateManager {
    /// Creates a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Synthesizes a fresh idle execution with a generated id.
    #[must_use]
    pub fn create_state(
        &self,
        workflow_id: WorkflowId,
        context_data: JsonValue,
        initial_variables: Option<Map<String, JsonValue>>,
    ) -> Execution {
        Execution::new(
            workflow_id,
            context_data,
            initial_variables.unwrap_or_default(),
        )
    }

    fn key(execution_id: &ExecutionId) -> String {
        format!("{STATE_KEY_PREFIX}{execution_id}")
    }

    /// Upserts the execution record, keyed by its execution id.
    ///
    /// # Errors
    ///
    /// Fails on serialization or backend errors.
    pub async fn save(&self, execution: &Execution) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(execution).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
        self.store.set(&Self::key(&execution.execution_id), bytes).await
    }

    /// Loads the execution record for `execution_id`, if present.
    ///
    /// # Errors
    ///
    /// Fails on deserialization or backend errors.
    pub async fn load(&self, execution_id: &ExecutionId) -> Result<Option<Execution>, StoreError> {
        let Some(bytes) = self.store.get(&Self::key(execution_id)).await? else {
            return Ok(None);
        };
        let execution =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
                message: e.to_string(),
            })?;
        Ok(Some(execution))
    }

    /// Deletes the execution record for `execution_id`.
    ///
    /// # Errors
    ///
    /// Fails on backend errors.
    pub async fn delete(&self, execution_id: &ExecutionId) -> Result<(), StoreError> {
        self.store.delete(&Self::key(execution_id)).await
    }

    /// Lists stored executions, optionally filtered by workflow id.
    ///
    /// # Errors
    ///
    /// Fails on deserialization or backend errors.
    pub async fn list(
        &self,
        workflow_id: Option<&WorkflowId>,
    ) -> Result<Vec<Execution>, StoreError> {
        let keys = self.store.keys_with_prefix(STATE_KEY_PREFIX).await?;
        let mut executions = Vec::new();

        for key in keys {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            let execution: Execution =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
                    message: e.to_string(),
                })?;
            if workflow_id.is_none_or(|id| &execution.workflow_id == id) {
                executions.push(execution);
            }
        }

        Ok(executions)
    }
}
