use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::time::timeout;

use crate::dedup::dedup_key;
use crate::shipment::Shipment;

// Commands against the seen-set are single-hash reads and pipelined writes;
// anything slower than this means the cache is in trouble and the cycle
// should fail fast rather than stall the loop.
const REDIS_TIMEOUT_MILLISECS: u64 = 1000;

/// Enumeration of errors for operations on the seen-set cache.
#[derive(Error, Debug)]
pub enum SeenSetError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis command timed out")]
    Timeout,
    #[error("cached shipment could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fast lookup cache of every shipment previously confirmed as ingested.
///
/// Entries are keyed by dedup key, so the ingestion loop can rebuild the set
/// of already-known identities at the start of each cycle.
#[async_trait]
pub trait SeenSet: Send + Sync {
    async fn get_all_shipments(&self) -> Result<Vec<Shipment>, SeenSetError>;

    /// Persist freshly ingested shipments so future cycles see them.
    async fn record_batch(&self, shipments: &[Shipment]) -> Result<(), SeenSetError>;
}

/// Seen-set on a single redis hash: field = dedup key, value = the shipment
/// serialized as JSON.
pub struct RedisSeenSet {
    client: redis::Client,
    key: String,
}

impl RedisSeenSet {
    pub fn new(addr: String, key: String) -> Result<Self, SeenSetError> {
        let client = redis::Client::open(addr)?;

        Ok(Self { client, key })
    }
}

#[async_trait]
impl SeenSet for RedisSeenSet {
    async fn get_all_shipments(&self) -> Result<Vec<Shipment>, SeenSetError> {
        let mut conn = self.client.get_async_connection().await?;

        let values = conn.hvals::<_, Vec<String>>(&self.key);
        let values = timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), values)
            .await
            .map_err(|_| SeenSetError::Timeout)??;

        values
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(SeenSetError::from))
            .collect()
    }

    async fn record_batch(&self, shipments: &[Shipment]) -> Result<(), SeenSetError> {
        if shipments.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for shipment in shipments {
            _ = pipe.hset(
                &self.key,
                dedup_key(shipment),
                serde_json::to_string(shipment)?,
            );
        }

        let mut conn = self.client.get_async_connection().await?;
        let query = pipe.query_async::<_, ()>(&mut conn);
        timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), query)
            .await
            .map_err(|_| SeenSetError::Timeout)??;

        Ok(())
    }
}

/// In-memory stand-in for the seen-set, with a switchable write failure.
#[derive(Default)]
pub struct MemorySeenSet {
    shipments: Mutex<HashMap<String, Shipment>>,
    fail_writes: AtomicBool,
}

impl MemorySeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.shipments.lock().expect("poisoned test cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SeenSet for MemorySeenSet {
    async fn get_all_shipments(&self) -> Result<Vec<Shipment>, SeenSetError> {
        let shipments = self.shipments.lock().expect("poisoned test cache lock");
        Ok(shipments.values().cloned().collect())
    }

    async fn record_batch(&self, shipments: &[Shipment]) -> Result<(), SeenSetError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SeenSetError::Timeout);
        }

        let mut known = self.shipments.lock().expect("poisoned test cache lock");
        for shipment in shipments {
            drop(known.insert(dedup_key(shipment), shipment.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_shipment;

    #[tokio::test]
    async fn memory_seen_set_is_keyed_by_dedup_key() {
        let seen = MemorySeenSet::new();
        let a = sample_shipment("in_transit", "Mars");

        // Recording the same shipment twice keeps a single entry
        seen.record_batch(&[a.clone(), a.clone()]).await.unwrap();
        assert_eq!(seen.len(), 1);

        seen.record_batch(&[sample_shipment("pending", "Titan")])
            .await
            .unwrap();

        let known = seen.get_all_shipments().await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains(&a));
    }
}
