//! Deadline-enforcing gateway in front of a record store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::backend::RecordStore;
use super::record::{Bins, Record, RecordKey};
use crate::error::{FreqCapError, Result};

/// Default deadline for a single storage call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// The four storage operations the rest of the crate is allowed to use.
///
/// Every call is bounded by the configured deadline. Errors are returned to
/// the caller as-is; the gateway never retries.
#[derive(Clone)]
pub struct StorageGateway {
    /// The backing store, shared for the lifetime of the process
    store: Arc<dyn RecordStore>,
    /// Deadline applied to each call
    timeout: Duration,
}

impl StorageGateway {
    /// Create a gateway with the default deadline.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_timeout(store, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write bins to a record, optionally setting its time-to-live.
    pub async fn put_record(&self, key: &RecordKey, bins: &Bins, ttl: Option<Duration>) -> Result<()> {
        trace!(key = %key, bins = bins.len(), ttl = ?ttl, "put_record");
        self.deadline("put_record", self.store.put(key, bins, ttl)).await
    }

    /// Read the named bins of one record.
    pub async fn get_record_bins(&self, key: &RecordKey, bins: &[String]) -> Result<Option<Record>> {
        trace!(key = %key, bins = bins.len(), "get_record_bins");
        self.deadline("get_record_bins", self.store.get_bins(key, bins)).await
    }

    /// Batched read of many records, one slot per key in input order.
    pub async fn get_records(&self, keys: &[RecordKey]) -> Result<Vec<Option<Record>>> {
        trace!(keys = keys.len(), "get_records");
        let records = self.deadline("get_records", self.store.batch_get(keys)).await?;
        if records.len() != keys.len() {
            return Err(FreqCapError::Storage(format!(
                "batch read returned {} records for {} keys",
                records.len(),
                keys.len()
            )));
        }
        Ok(records)
    }

    /// Read every bin of one record.
    pub async fn get_record(&self, key: &RecordKey) -> Result<Option<Record>> {
        trace!(key = %key, "get_record");
        self.deadline("get_record", self.store.get(key)).await
    }

    async fn deadline<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FreqCapError::StorageTimeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn key(user_key: &str) -> RecordKey {
        RecordKey::new("test", "freq_compound_key", user_key)
    }

    fn bins(value: i64) -> Bins {
        Bins::from([("FREQ".to_string(), value)])
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let gateway = StorageGateway::new(Arc::new(MemoryStore::new()));

        gateway.put_record(&key("a"), &bins(3), None).await.unwrap();

        let record = gateway.get_record(&key("a")).await.unwrap().unwrap();
        assert_eq!(record.get_int("FREQ"), Some(3));
        assert!(gateway.get_record(&key("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_records_preserves_order_and_absence() {
        let gateway = StorageGateway::new(Arc::new(MemoryStore::new()));
        gateway.put_record(&key("a"), &bins(1), None).await.unwrap();
        gateway.put_record(&key("c"), &bins(3), None).await.unwrap();

        let records = gateway
            .get_records(&[key("a"), key("b"), key("c")])
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().and_then(|r| r.get_int("FREQ")), Some(1));
        assert!(records[1].is_none());
        assert_eq!(records[2].as_ref().and_then(|r| r.get_int("FREQ")), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(50));
        let gateway = StorageGateway::with_timeout(Arc::new(store), Duration::from_millis(10));

        let err = gateway.get_record(&key("a")).await.unwrap_err();
        match err {
            FreqCapError::StorageTimeout { operation, timeout } => {
                assert_eq!(operation, "get_record");
                assert_eq!(timeout, Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
