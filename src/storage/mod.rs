//! Durable key/value storage boundary.
//!
//! The session manager treats the durable copy as the source of truth
//! across page reloads; within one page life the in-memory cache is
//! authoritative. Hosts back this with whatever survives a reload.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StorageError;

/// Asynchronous durable string store.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory store. Durable only within the process; used as the default
/// backend and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
