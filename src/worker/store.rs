//! Named cache partitions: the in-process analog of the browser's Cache
//! Storage.
//!
//! Two partitions are live at a time (static assets and game-data API
//! responses), versioned by name suffix; activation deletes everything else.
//! The store is safe for concurrent readers and writers; entries live for the
//! process lifetime, matching the ephemeral contract of the original.

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::fetch::FetchResponse;

/// A stored response plus bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: SystemTime,
}

impl CachedResponse {
    /// Snapshot a response for storage; the original stays usable.
    pub fn from_response(response: &FetchResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: SystemTime::now(),
        }
    }

    /// Rebuild a response to hand back to the caller.
    pub fn to_response(&self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Per-partition entry counts, for the stats endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PartitionStats {
    pub name: String,
    pub entries: usize,
    pub bytes: usize,
}

/// The partitioned response store.
#[derive(Debug, Default)]
pub struct CacheStorage {
    partitions: RwLock<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a partition exists.
    pub async fn open(&self, name: &str) {
        self.partitions
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Store a response under a request URL, creating the partition if
    /// needed. Overwrites any previous entry for the URL.
    pub async fn put(&self, partition: &str, url: &str, response: CachedResponse) {
        self.partitions
            .write()
            .await
            .entry(partition.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }

    /// Look up a URL in one partition.
    pub async fn lookup(&self, partition: &str, url: &str) -> Option<CachedResponse> {
        self.partitions
            .read()
            .await
            .get(partition)
            .and_then(|p| p.get(url))
            .cloned()
    }

    /// Look up a URL across all partitions, like the browser's global
    /// `caches.match`.
    pub async fn match_any(&self, url: &str) -> Option<CachedResponse> {
        let partitions = self.partitions.read().await;
        partitions.values().find_map(|p| p.get(url)).cloned()
    }

    /// Names of all existing partitions.
    pub async fn partition_names(&self) -> Vec<String> {
        self.partitions.read().await.keys().cloned().collect()
    }

    /// Delete a whole partition. Returns whether it existed.
    pub async fn delete_partition(&self, name: &str) -> bool {
        self.partitions.write().await.remove(name).is_some()
    }

    /// Entry count of one partition (0 if absent).
    pub async fn partition_len(&self, name: &str) -> usize {
        self.partitions
            .read()
            .await
            .get(name)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Stats for every partition.
    pub async fn stats(&self) -> Vec<PartitionStats> {
        self.partitions
            .read()
            .await
            .iter()
            .map(|(name, entries)| PartitionStats {
                name: name.clone(),
                entries: entries.len(),
                bytes: entries.values().map(|r| r.body.len()).sum(),
            })
            .collect()
    }
}
