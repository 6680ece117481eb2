//! In-process record store.
//!
//! Mirrors the hash semantics of the Redis backend: puts merge bins into the
//! existing record and a TTL expires the whole record. Deadlines use
//! `tokio::time::Instant`, so tests running on a paused clock can expire
//! records by advancing time.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use super::backend::RecordStore;
use super::record::{Bins, Record, RecordKey};
use crate::error::Result;

#[derive(Debug, Clone)]
struct StoredRecord {
    bins: Bins,
    expires_at: Option<Instant>,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// A `RecordStore` held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<RecordKey, StoredRecord>,
    /// Artificial delay added to every call
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to exercise storage deadlines.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of live (unexpired) records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| !r.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Look up a live record, dropping it if it has expired.
    fn live(&self, key: &RecordKey) -> Option<Bins> {
        let now = Instant::now();
        let expired = match self.records.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.bins.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            trace!(key = %key, "Purging expired record");
            self.records.remove_if(key, |_, r| r.is_expired(now));
        }
        None
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, key: &RecordKey, bins: &Bins, ttl: Option<Duration>) -> Result<()> {
        self.simulate_latency().await;
        // A write with no bins creates nothing, as with a Redis hash
        if bins.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let mut entry = self.records.entry(key.clone()).or_insert_with(|| StoredRecord {
            bins: Bins::new(),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.bins.clear();
            entry.expires_at = None;
        }

        entry.bins.extend(bins.iter().map(|(name, value)| (name.clone(), *value)));
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        self.simulate_latency().await;
        Ok(self.live(key).map(Record::new))
    }

    async fn get_bins(&self, key: &RecordKey, bins: &[String]) -> Result<Option<Record>> {
        self.simulate_latency().await;
        Ok(self.live(key).map(|stored| {
            bins.iter()
                .filter_map(|name| stored.get(name).map(|value| (name.clone(), *value)))
                .collect()
        }))
    }

    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<Option<Record>>> {
        self.simulate_latency().await;
        Ok(keys.iter().map(|key| self.live(key).map(Record::new)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user_key: &str) -> RecordKey {
        RecordKey::new("test", "freq_date_in_bin", user_key)
    }

    fn bins(pairs: &[(&str, i64)]) -> Bins {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[tokio::test]
    async fn test_put_merges_and_overwrites_bins() {
        let store = MemoryStore::new();
        let k = key("user-id-0:Shoes");

        store.put(&k, &bins(&[("20240101", 1), ("20240102", 2)]), None).await.unwrap();
        store.put(&k, &bins(&[("20240102", 4), ("20240103", 0)]), None).await.unwrap();

        let record = store.get(&k).await.unwrap().unwrap();
        assert_eq!(record.bins(), &bins(&[("20240101", 1), ("20240102", 4), ("20240103", 0)]));
    }

    #[tokio::test]
    async fn test_put_without_bins_creates_no_record() {
        let store = MemoryStore::new();
        let k = key("user-id-0:Shoes");

        store.put(&k, &Bins::new(), Some(Duration::from_secs(60))).await.unwrap();
        assert!(store.get(&k).await.unwrap().is_none());
        assert!(store.is_empty());

        store.put(&k, &bins(&[("20240101", 1)]), None).await.unwrap();
        store.put(&k, &Bins::new(), Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap().unwrap().get_int("20240101"), Some(1));
    }

    #[tokio::test]
    async fn test_get_bins_returns_only_requested_fields() {
        let store = MemoryStore::new();
        let k = key("user-id-0:Shoes");
        store.put(&k, &bins(&[("20240101", 1), ("20240102", 2)]), None).await.unwrap();

        let wanted = vec!["20240102".to_string(), "20240105".to_string()];
        let record = store.get_bins(&k, &wanted).await.unwrap().unwrap();
        assert_eq!(record.bins(), &bins(&[("20240102", 2)]));

        assert!(store.get_bins(&key("nobody:Shoes"), &wanted).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_record() {
        let store = MemoryStore::new();
        let k = key("user-id-0:Shoes");
        store
            .put(&k, &bins(&[("FREQ", 2)]), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get(&k).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&k).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_without_ttl_keeps_existing_expiry() {
        let store = MemoryStore::new();
        let k = key("user-id-0:Shoes");
        store
            .put(&k, &bins(&[("FREQ", 2)]), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.put(&k, &bins(&[("FREQ", 3)]), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get(&k).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_after_expiry_starts_fresh_record() {
        let store = MemoryStore::new();
        let k = key("user-id-0:Shoes");
        store
            .put(&k, &bins(&[("a", 1)]), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        store.put(&k, &bins(&[("b", 2)]), None).await.unwrap();
        let record = store.get(&k).await.unwrap().unwrap();
        assert_eq!(record.bins(), &bins(&[("b", 2)]));
    }
}
