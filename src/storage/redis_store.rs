//! Redis-backed record store.
//!
//! Each record is a Redis hash whose fields are the record's bins. A whole
//! record TTL maps onto `EXPIRE`; Redis has no per-field expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use super::backend::RecordStore;
use super::record::{Bins, Record, RecordKey};
use crate::error::{FreqCapError, Result};

/// A `RecordStore` on top of a single multiplexed Redis connection.
///
/// The connection is opened once and cloned per call; clones share the same
/// underlying socket.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a `PING`.
    ///
    /// Any failure here, including the connect deadline passing, is reported
    /// as `StorageUnavailable`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url)
            .map_err(|e| FreqCapError::StorageUnavailable(format!("invalid Redis URL {}: {}", url, e)))?;

        let setup = async {
            let mut connection = client.get_multiplexed_async_connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut connection).await?;
            Ok::<_, redis::RedisError>((connection, pong))
        };

        let (connection, pong) = tokio::time::timeout(connect_timeout, setup)
            .await
            .map_err(|_| {
                FreqCapError::StorageUnavailable(format!(
                    "could not connect to {} within {:?}",
                    url, connect_timeout
                ))
            })?
            .map_err(|e| FreqCapError::StorageUnavailable(e.to_string()))?;

        debug!(reply = %pong, "Redis connection established");
        Ok(Self { connection })
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

/// Convert an `HGETALL` reply into a record; an empty hash means no record.
fn record_from_hash(hash: HashMap<String, i64>) -> Option<Record> {
    if hash.is_empty() {
        None
    } else {
        Some(hash.into_iter().collect())
    }
}

/// Build the `HSET` (+ `EXPIRE`) pipeline for a put.
fn put_pipeline(key: &RecordKey, bins: &Bins, ttl: Option<Duration>) -> redis::Pipeline {
    let storage_key = key.to_storage_key();
    let mut pipe = redis::pipe();
    pipe.atomic();

    let hset = pipe.cmd("HSET").arg(&storage_key);
    for (name, value) in bins {
        hset.arg(name).arg(*value);
    }
    hset.ignore();

    if let Some(ttl) = ttl {
        pipe.cmd("EXPIRE").arg(&storage_key).arg(ttl.as_secs().max(1)).ignore();
    }
    pipe
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn put(&self, key: &RecordKey, bins: &Bins, ttl: Option<Duration>) -> Result<()> {
        // HSET with no fields is a protocol error
        if bins.is_empty() {
            return Ok(());
        }
        let mut con = self.connection();
        put_pipeline(key, bins, ttl).query_async::<_, ()>(&mut con).await?;
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        let mut con = self.connection();
        let hash: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(key.to_storage_key())
            .query_async(&mut con)
            .await?;
        Ok(record_from_hash(hash))
    }

    async fn get_bins(&self, key: &RecordKey, bins: &[String]) -> Result<Option<Record>> {
        let storage_key = key.to_storage_key();
        let mut con = self.connection();

        if bins.is_empty() {
            let exists: bool = redis::cmd("EXISTS").arg(&storage_key).query_async(&mut con).await?;
            return Ok(exists.then(Record::default));
        }

        let (exists, values): (bool, Vec<Option<i64>>) = redis::pipe()
            .cmd("EXISTS")
            .arg(&storage_key)
            .cmd("HMGET")
            .arg(&storage_key)
            .arg(bins)
            .query_async(&mut con)
            .await?;

        if !exists {
            return Ok(None);
        }
        Ok(Some(
            bins.iter()
                .zip(values)
                .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
                .collect(),
        ))
    }

    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<Option<Record>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HGETALL").arg(key.to_storage_key());
        }

        let mut con = self.connection();
        let hashes: Vec<HashMap<String, i64>> = pipe.query_async(&mut con).await?;
        Ok(hashes.into_iter().map(record_from_hash).collect())
    }
}
