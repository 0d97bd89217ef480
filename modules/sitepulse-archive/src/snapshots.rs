//! Per-domain encrypted URL snapshots with bounded history.
//!
//! Key layout:
//!   `snapshot:<domain>:<unix>`      encrypted URL list
//!   `snapshot_meta:<domain>:<unix>` metadata record
//!   `latest_snapshot:<domain>`      key of the newest snapshot
//!   `snapshot_index:<domain>`       metadata list, newest first, max 100
//!
//! Writes are not atomic across the four keys; the order is snapshot →
//! metadata → latest → index, so a crash can only orphan a snapshot blob,
//! never dangle the latest pointer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use sitepulse_common::error::SitepulseError;
use sitepulse_common::UrlRecord;

use crate::crypto::SnapshotCipher;
use crate::diff::ChangeSet;
use crate::store::BlobStore;

/// Entries kept per domain in the snapshot index and the change history.
const INDEX_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMeta {
    pub domain: String,
    pub timestamp: i64,
    pub url_count: usize,
    pub checksum: String,
    /// Blob key of the encrypted URL list.
    pub key: String,
}

pub struct SnapshotStore {
    store: Arc<dyn BlobStore>,
    cipher: SnapshotCipher,
    /// Per-domain write serialization; reads go straight to the store.
    domain_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn BlobStore>, cipher: SnapshotCipher) -> Self {
        Self {
            store,
            cipher,
            domain_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a snapshot of `urls` for `domain` at the current time.
    pub async fn save(
        &self,
        domain: &str,
        urls: &[UrlRecord],
    ) -> Result<SnapshotMeta, SitepulseError> {
        self.save_at(domain, urls, Utc::now().timestamp()).await
    }

    /// Persist with an explicit timestamp. Exposed for change-detection
    /// tooling and tests that need distinct history entries.
    pub async fn save_at(
        &self,
        domain: &str,
        urls: &[UrlRecord],
        timestamp: i64,
    ) -> Result<SnapshotMeta, SitepulseError> {
        let lock = self.domain_lock(domain).await;
        let _guard = lock.lock().await;

        let snapshot_key = format!("snapshot:{domain}:{timestamp}");
        let meta = SnapshotMeta {
            domain: domain.to_string(),
            timestamp,
            url_count: urls.len(),
            checksum: content_checksum(urls),
            key: snapshot_key.clone(),
        };

        let payload = serde_json::to_vec(urls)
            .map_err(|e| SitepulseError::SnapshotIo(format!("serialize urls: {e}")))?;
        let sealed = self.cipher.encrypt(&payload)?;

        // Write order matters; see module docs.
        self.store.put(&snapshot_key, sealed).await?;
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| SitepulseError::SnapshotIo(format!("serialize meta: {e}")))?;
        self.store
            .put(&format!("snapshot_meta:{domain}:{timestamp}"), meta_bytes)
            .await?;
        self.store
            .put(
                &format!("latest_snapshot:{domain}"),
                snapshot_key.clone().into_bytes(),
            )
            .await?;

        let mut index = self.read_index(domain).await?;
        index.insert(0, meta.clone());
        index.truncate(INDEX_LIMIT);
        self.write_index(domain, &index).await?;

        info!(domain, urls = urls.len(), checksum = %meta.checksum, "Snapshot saved");
        Ok(meta)
    }

    /// The most recent URL list for a domain, if any.
    pub async fn load(&self, domain: &str) -> Result<Option<Vec<UrlRecord>>, SitepulseError> {
        let Some(pointer) = self
            .store
            .get(&format!("latest_snapshot:{domain}"))
            .await?
        else {
            return Ok(None);
        };
        let key = String::from_utf8_lossy(&pointer).into_owned();
        self.load_key(&key).await
    }

    /// Snapshot metadata for a domain, newest first, at most `limit`.
    pub async fn history(
        &self,
        domain: &str,
        limit: usize,
    ) -> Result<Vec<SnapshotMeta>, SitepulseError> {
        let mut index = self.read_index(domain).await?;
        index.truncate(limit);
        Ok(index)
    }

    /// The snapshot closest in time to `target` (unix seconds).
    pub async fn snapshot_by_time(
        &self,
        domain: &str,
        target: i64,
    ) -> Result<Option<(SnapshotMeta, Vec<UrlRecord>)>, SitepulseError> {
        let index = self.read_index(domain).await?;
        let Some(best) = index
            .into_iter()
            .min_by_key(|m| (m.timestamp - target).abs())
        else {
            return Ok(None);
        };
        let urls = self.load_key(&best.key).await?.unwrap_or_default();
        Ok(Some((best, urls)))
    }

    /// Append a change set to the domain's change history (bounded like the
    /// snapshot index).
    pub async fn record_changes(&self, changes: &ChangeSet) -> Result<(), SitepulseError> {
        let key = format!("changes:{}", changes.domain);
        let mut history: Vec<ChangeSet> = match self.store.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SitepulseError::SnapshotIo(format!("decode change history: {e}")))?,
            None => Vec::new(),
        };
        history.insert(0, changes.clone());
        history.truncate(INDEX_LIMIT);
        let bytes = serde_json::to_vec(&history)
            .map_err(|e| SitepulseError::SnapshotIo(format!("serialize change history: {e}")))?;
        self.store.put(&key, bytes).await
    }

    pub async fn change_history(
        &self,
        domain: &str,
        limit: usize,
    ) -> Result<Vec<ChangeSet>, SitepulseError> {
        let key = format!("changes:{domain}");
        let mut history: Vec<ChangeSet> = match self.store.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SitepulseError::SnapshotIo(format!("decode change history: {e}")))?,
            None => Vec::new(),
        };
        history.truncate(limit);
        Ok(history)
    }

    async fn load_key(&self, key: &str) -> Result<Option<Vec<UrlRecord>>, SitepulseError> {
        let Some(sealed) = self.store.get(key).await? else {
            debug!(key, "Snapshot blob missing");
            return Ok(None);
        };
        let payload = self.cipher.decrypt(&sealed)?;
        let urls = serde_json::from_slice(&payload)
            .map_err(|e| SitepulseError::SnapshotIo(format!("decode urls: {e}")))?;
        Ok(Some(urls))
    }

    async fn read_index(&self, domain: &str) -> Result<Vec<SnapshotMeta>, SitepulseError> {
        match self.store.get(&format!("snapshot_index:{domain}")).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SitepulseError::SnapshotIo(format!("decode index: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(
        &self,
        domain: &str,
        index: &[SnapshotMeta],
    ) -> Result<(), SitepulseError> {
        let bytes = serde_json::to_vec(index)
            .map_err(|e| SitepulseError::SnapshotIo(format!("serialize index: {e}")))?;
        self.store
            .put(&format!("snapshot_index:{domain}"), bytes)
            .await
    }

    async fn domain_lock(&self, domain: &str) -> Arc<Mutex<()>> {
        let mut locks = self.domain_locks.lock().await;
        locks
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// MD5 over the sorted addresses. Addresses carry no whitespace (enforced at
/// validation), so the newline-joined form is canonical.
pub fn content_checksum(urls: &[UrlRecord]) -> String {
    let mut addresses: Vec<&str> = urls.iter().map(|u| u.address.as_str()).collect();
    addresses.sort_unstable();
    let joined = addresses.join("\n");
    format!("{:x}", md5::compute(joined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn records(addrs: &[&str]) -> Vec<UrlRecord> {
        addrs.iter().map(|a| UrlRecord::new(*a)).collect()
    }

    fn test_store() -> SnapshotStore {
        SnapshotStore::new(
            Arc::new(MemoryStore::new()),
            SnapshotCipher::new("unit-test-key-material").unwrap(),
        )
    }

    #[test]
    fn checksum_is_order_insensitive() {
        let a = records(&["https://a.test/g/x", "https://a.test/g/y"]);
        let b = records(&["https://a.test/g/y", "https://a.test/g/x"]);
        assert_eq!(content_checksum(&a), content_checksum(&b));
    }

    #[test]
    fn checksum_matches_known_value() {
        let urls = records(&["https://a.test/g/x", "https://a.test/g/y", "https://a.test/g/z"]);
        let expected = format!(
            "{:x}",
            md5::compute(b"https://a.test/g/x\nhttps://a.test/g/y\nhttps://a.test/g/z")
        );
        assert_eq!(content_checksum(&urls), expected);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = test_store();
        let urls = records(&["https://a.test/g/x", "https://a.test/g/y"]);
        let meta = store.save("a.test", &urls).await.unwrap();
        assert_eq!(meta.url_count, 2);
        assert_eq!(meta.checksum, content_checksum(&urls));

        let loaded = store.load("a.test").await.unwrap().unwrap();
        assert_eq!(loaded, urls);
        assert_eq!(content_checksum(&loaded), meta.checksum);
    }

    #[tokio::test]
    async fn latest_pointer_tracks_newest() {
        let store = test_store();
        store
            .save_at("a.test", &records(&["https://a.test/old"]), 1_000)
            .await
            .unwrap();
        store
            .save_at("a.test", &records(&["https://a.test/new"]), 2_000)
            .await
            .unwrap();

        let loaded = store.load("a.test").await.unwrap().unwrap();
        assert_eq!(loaded[0].address, "https://a.test/new");

        let history = store.history("a.test", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, 2_000);
        assert_eq!(history[1].timestamp, 1_000);
    }

    #[tokio::test]
    async fn index_is_bounded() {
        let store = test_store();
        let urls = records(&["https://a.test/g/x"]);
        for i in 0..105 {
            store.save_at("a.test", &urls, 1_000 + i).await.unwrap();
        }
        let history = store.history("a.test", 1_000).await.unwrap();
        assert_eq!(history.len(), 100);
        // Newest first; the oldest five were evicted.
        assert_eq!(history[0].timestamp, 1_104);
        assert_eq!(history[99].timestamp, 1_005);
    }

    #[tokio::test]
    async fn snapshot_by_time_picks_nearest() {
        let store = test_store();
        store
            .save_at("a.test", &records(&["https://a.test/1"]), 1_000)
            .await
            .unwrap();
        store
            .save_at("a.test", &records(&["https://a.test/2"]), 5_000)
            .await
            .unwrap();

        let (meta, urls) = store.snapshot_by_time("a.test", 2_500).await.unwrap().unwrap();
        assert_eq!(meta.timestamp, 1_000);
        assert_eq!(urls[0].address, "https://a.test/1");

        let (meta, _) = store.snapshot_by_time("a.test", 4_000).await.unwrap().unwrap();
        assert_eq!(meta.timestamp, 5_000);
    }

    #[tokio::test]
    async fn unknown_domain_is_empty() {
        let store = test_store();
        assert!(store.load("nowhere.test").await.unwrap().is_none());
        assert!(store.history("nowhere.test", 5).await.unwrap().is_empty());
        assert!(store
            .snapshot_by_time("nowhere.test", 0)
            .await
            .unwrap()
            .is_none());
    }
}
