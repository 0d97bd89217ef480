//! Persistent retry queue for keywords that failed dispatch. Stored in the
//! blob store under `failed_keywords` and attempted first on the next run.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use sitepulse_archive::store::BlobStore;
use sitepulse_common::error::SitepulseError;

const RETRY_QUEUE_KEY: &str = "failed_keywords";

pub struct RetryQueue {
    store: Arc<dyn BlobStore>,
    lock: Mutex<()>,
}

impl RetryQueue {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Keywords left over from previous runs, oldest first.
    pub async fn load(&self) -> Result<Vec<String>, SitepulseError> {
        let _guard = self.lock.lock().await;
        match self.store.get(RETRY_QUEUE_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SitepulseError::SnapshotIo(format!("decode retry queue: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the queue with this run's leftovers.
    pub async fn save(&self, keywords: &[String]) -> Result<(), SitepulseError> {
        let _guard = self.lock.lock().await;
        let bytes = serde_json::to_vec(keywords)
            .map_err(|e| SitepulseError::SnapshotIo(format!("serialize retry queue: {e}")))?;
        self.store.put(RETRY_QUEUE_KEY, bytes).await?;
        info!(keywords = keywords.len(), "Retry queue persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepulse_archive::store::MemoryStore;

    #[tokio::test]
    async fn empty_store_yields_empty_queue() {
        let q = RetryQueue::new(Arc::new(MemoryStore::new()));
        assert!(q.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let q = RetryQueue::new(Arc::new(MemoryStore::new()));
        let keywords = vec!["chess".to_string(), "racing games".to_string()];
        q.save(&keywords).await.unwrap();
        assert_eq!(q.load().await.unwrap(), keywords);

        // A later save replaces, not appends.
        q.save(&["go".to_string()]).await.unwrap();
        assert_eq!(q.load().await.unwrap(), vec!["go".to_string()]);
    }
}
