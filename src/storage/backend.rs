//! Record store trait for abstracting the key-value backends.

use std::time::Duration;

use async_trait::async_trait;

use super::record::{Bins, Record, RecordKey};
use crate::error::Result;

/// Trait for key-value store implementations.
///
/// This trait abstracts over the Redis-backed store and the in-process
/// `MemoryStore` so the gateway, encoders, and aggregator work with either.
/// A record that does not exist (never written or expired) is `Ok(None)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Merge `bins` into the record at `key`, creating it if needed.
    ///
    /// A bin that already exists is overwritten. When `ttl` is set the whole
    /// record expires that long after this write; otherwise any existing
    /// expiry is left untouched.
    async fn put(&self, key: &RecordKey, bins: &Bins, ttl: Option<Duration>) -> Result<()>;

    /// Read every bin of a record.
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Read only the named bins of a record.
    ///
    /// An existing record is returned with whichever of the requested bins
    /// it carries, possibly none.
    async fn get_bins(&self, key: &RecordKey, bins: &[String]) -> Result<Option<Record>>;

    /// Read many records at once. The result has one entry per key, in
    /// input order.
    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<Option<Record>>>;
}
