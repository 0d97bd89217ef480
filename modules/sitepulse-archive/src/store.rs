//! String-addressed blob persistence.
//!
//! The snapshot layer only needs `put`/`get`/`delete` over byte values, so
//! the store is a small trait with a sled-backed implementation for the
//! process and an in-memory one for tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use sitepulse_common::error::SitepulseError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), SitepulseError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SitepulseError>;
    async fn delete(&self, key: &str) -> Result<(), SitepulseError>;
}

/// Embedded on-disk store. One database per snapshot directory, shared for
/// the lifetime of the run.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SitepulseError> {
        let db = sled::open(path)
            .map_err(|e| SitepulseError::SnapshotIo(format!("open failed: {e}")))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl BlobStore for SledStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), SitepulseError> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| SitepulseError::SnapshotIo(format!("put {key}: {e}")))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| SitepulseError::SnapshotIo(format!("flush {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SitepulseError> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| SitepulseError::SnapshotIo(format!("get {key}: {e}")))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<(), SitepulseError> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| SitepulseError::SnapshotIo(format!("delete {key}: {e}")))?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), SitepulseError> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SitepulseError> {
        Ok(self
            .entries
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), SitepulseError> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .remove(key);
        Ok(())
    }
}
