use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::dedup::{collapse_snapshot, new_shipments};
use crate::fetch::{FetchError, ShipmentSource};
use crate::metrics_consts::{
    INGEST_CYCLES, INGEST_CYCLE_FAILURES, NEW_SHIPMENTS_PER_CYCLE, SHIPMENTS_INGESTED,
};
use crate::seen::{SeenSet, SeenSetError};
use crate::store::{DurableStore, StoreError};

/// Enumeration of errors a single ingestion cycle can surface. All of them
/// are recoverable: the loop logs the cycle away and retries on the next
/// interval.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    SeenSet(#[from] SeenSetError),
}

/// Drives periodic ingestion: fetch the source snapshot, diff it against the
/// seen-set, persist whatever is new.
///
/// Collaborators are constructed at startup and passed in; the ingester holds
/// the only handles that mutate shared state, so cycles never race each other.
pub struct Ingester {
    source: Box<dyn ShipmentSource>,
    durable: Arc<dyn DurableStore>,
    seen: Arc<dyn SeenSet>,
    collapse_intra_snapshot: bool,
}

impl Ingester {
    pub fn new(
        source: Box<dyn ShipmentSource>,
        durable: Arc<dyn DurableStore>,
        seen: Arc<dyn SeenSet>,
        collapse_intra_snapshot: bool,
    ) -> Self {
        Self {
            source,
            durable,
            seen,
            collapse_intra_snapshot,
        }
    }

    /// Run one fetch-diff-persist pass, returning how many new shipments were
    /// ingested. A failure anywhere leaves nothing behind that a later cycle
    /// cannot repair: the fetch is read-only, and the durable write lands
    /// before the seen-set write, so a cache failure only means the same
    /// shipments are re-discovered next time.
    pub async fn run_cycle(&self) -> Result<usize, IngestError> {
        let existing = self.seen.get_all_shipments().await?;

        let mut snapshot = self.source.get_data().await?;
        if self.collapse_intra_snapshot {
            snapshot = collapse_snapshot(snapshot);
        }

        let fresh = new_shipments(snapshot, &existing);
        if fresh.is_empty() {
            return Ok(0);
        }

        self.durable.bulk_insert(&fresh).await?;
        self.seen.record_batch(&fresh).await?;

        Ok(fresh.len())
    }

    /// Repeat ingestion cycles on a fixed interval until `stop` flips.
    ///
    /// The stop signal is checked once per iteration, before any work is
    /// done. Nothing flips it by default; the loop runs for the life of the
    /// process.
    pub async fn run(
        &self,
        fetch_interval: Duration,
        mut stop: watch::Receiver<bool>,
        liveness: HealthHandle,
    ) {
        let mut ticker = tokio::time::interval(fetch_interval);
        // A slow cycle delays the next one instead of bursting to catch up;
        // cycles must never overlap.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *stop.borrow() {
                info!("stop signal received, ending ingestion");
                break;
            }

            match self.run_cycle().await {
                Ok(count) => {
                    metrics::counter!(INGEST_CYCLES).increment(1);
                    metrics::counter!(SHIPMENTS_INGESTED).increment(count as u64);
                    metrics::histogram!(NEW_SHIPMENTS_PER_CYCLE).record(count as f64);
                    info!("ingestion cycle complete, {} new shipments", count);
                }
                Err(error) => {
                    metrics::counter!(INGEST_CYCLE_FAILURES).increment(1);
                    error!("ingestion cycle failed, retrying next interval: {}", error);
                }
            }

            liveness.report_healthy();
        }
    }
}
