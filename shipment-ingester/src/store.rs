use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PostgresConfig;
use crate::shipment::{Shipment, ShipmentRow};

/// Enumeration of errors for operations on the durable shipment store.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
}

/// System of record for ingested shipments.
///
/// Append-only from the ingestion path's perspective. The soft-delete and
/// restore lifecycle lives entirely on this side of the boundary and never
/// flows back through the pipeline.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError>;

    /// Insert a batch atomically: either every shipment lands or none do.
    async fn bulk_insert(&self, shipments: &[Shipment]) -> Result<(), StoreError>;

    /// Full scan, for reporting consumers. The ingestion path never reads it.
    async fn get_all(&self) -> Result<Vec<ShipmentRow>, StoreError>;

    /// Cheap reachability probe, used by the startup gate.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Block until the durable store answers a ping, retrying up to `attempts`
/// times with a fixed delay in between. The last error is returned once the
/// attempts are exhausted; callers treat that as fatal.
pub async fn wait_for_database(
    store: &dyn DurableStore,
    attempts: u32,
    delay: Duration,
) -> Result<(), StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.ping().await {
            Ok(()) => {
                info!("database server is up and running");
                return Ok(());
            }
            Err(error) if attempt >= attempts => return Err(error),
            Err(error) => {
                warn!(
                    "database server not reachable (attempt {}/{}): {}",
                    attempt, attempts, error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

const INSERT_SHIPMENT: &str = r#"
INSERT INTO shipments (
    time, weight_kg, volume_m3, eta_min, status,
    forecast_wind_velocity_mph, forecast_wind_direction,
    forecast_precipitation_chance, forecast_precipitation_kind,
    origin_solar_system, origin_planet, origin_country, origin_address,
    destination_solar_system, destination_planet, destination_country, destination_address
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
"#;

const SELECT_SHIPMENTS: &str = r#"
SELECT
    id, time, weight_kg, volume_m3, eta_min, status,
    forecast_wind_velocity_mph, forecast_wind_direction,
    forecast_precipitation_chance, forecast_precipitation_kind,
    origin_solar_system, origin_planet, origin_country, origin_address,
    destination_solar_system, destination_planet, destination_country, destination_address,
    created_at, is_deleted, is_restored, restored_at
FROM shipments
"#;

async fn insert_shipment<'c, E>(executor: E, shipment: &Shipment) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query(INSERT_SHIPMENT)
        .bind(shipment.time)
        .bind(shipment.weight_kg)
        .bind(shipment.volume_m3)
        .bind(shipment.eta_min)
        .bind(shipment.status.as_str())
        .bind(shipment.forecast.wind_velocity_mph)
        .bind(shipment.forecast.wind_direction.as_str())
        .bind(shipment.forecast.precipitation_chance)
        .bind(shipment.forecast.precipitation_kind.as_str())
        .bind(shipment.origin.solar_system.as_str())
        .bind(shipment.origin.planet.as_str())
        .bind(shipment.origin.country.as_str())
        .bind(shipment.origin.address.as_str())
        .bind(shipment.destination.solar_system.as_str())
        .bind(shipment.destination.planet.as_str())
        .bind(shipment.destination.country.as_str())
        .bind(shipment.destination.address.as_str())
        .execute(executor)
        .await?;

    Ok(())
}

pub struct PostgresShipmentStore {
    pool: PgPool,
}

impl PostgresShipmentStore {
    pub fn new(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(&config.url())
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DurableStore for PostgresShipmentStore {
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError> {
        insert_shipment(&self.pool, shipment)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "INSERT".to_owned(),
                error,
            })
    }

    async fn bulk_insert(&self, shipments: &[Shipment]) -> Result<(), StoreError> {
        // Dropping the transaction handle on any error path rolls the whole
        // batch back; only the commit below makes it visible.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        for shipment in shipments {
            insert_shipment(&mut *tx, shipment)
                .await
                .map_err(|error| StoreError::QueryError {
                    command: "INSERT".to_owned(),
                    error,
                })?;
        }

        tx.commit()
            .await
            .map_err(|error| StoreError::QueryError {
                command: "COMMIT".to_owned(),
                error,
            })
    }

    async fn get_all(&self) -> Result<Vec<ShipmentRow>, StoreError> {
        sqlx::query_as::<_, ShipmentRow>(SELECT_SHIPMENTS)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|error| StoreError::ConnectionError { error })
    }
}

/// In-memory stand-in for the durable store, with switchable failure modes.
#[derive(Default)]
pub struct MemoryShipmentStore {
    rows: Mutex<Vec<ShipmentRow>>,
    fail_writes: AtomicBool,
    fail_pings: AtomicBool,
    pings: AtomicUsize,
}

impl MemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pings(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn store_row(&self, shipment: &Shipment) {
        let mut rows = self.rows.lock().expect("poisoned test store lock");
        let id = rows.len() as i64 + 1;
        rows.push(ShipmentRow {
            id,
            time: shipment.time,
            weight_kg: shipment.weight_kg,
            volume_m3: shipment.volume_m3,
            eta_min: shipment.eta_min,
            status: shipment.status.clone(),
            forecast_wind_velocity_mph: shipment.forecast.wind_velocity_mph,
            forecast_wind_direction: shipment.forecast.wind_direction.clone(),
            forecast_precipitation_chance: shipment.forecast.precipitation_chance,
            forecast_precipitation_kind: shipment.forecast.precipitation_kind.clone(),
            origin_solar_system: shipment.origin.solar_system.clone(),
            origin_planet: shipment.origin.planet.clone(),
            origin_country: shipment.origin.country.clone(),
            origin_address: shipment.origin.address.clone(),
            destination_solar_system: shipment.destination.solar_system.clone(),
            destination_planet: shipment.destination.planet.clone(),
            destination_country: shipment.destination.country.clone(),
            destination_address: shipment.destination.address.clone(),
            created_at: Utc::now(),
            is_deleted: false,
            is_restored: false,
            restored_at: None,
        });
    }
}

#[async_trait]
impl DurableStore for MemoryShipmentStore {
    async fn insert(&self, shipment: &Shipment) -> Result<(), StoreError> {
        self.bulk_insert(std::slice::from_ref(shipment)).await
    }

    async fn bulk_insert(&self, shipments: &[Shipment]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::QueryError {
                command: "INSERT".to_owned(),
                error: sqlx::Error::PoolClosed,
            });
        }

        for shipment in shipments {
            self.store_row(shipment);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ShipmentRow>, StoreError> {
        Ok(self.rows.lock().expect("poisoned test store lock").clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        _ = self.pings.fetch_add(1, Ordering::SeqCst);
        if self.fail_pings.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError {
                error: sqlx::Error::PoolClosed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_shipment;

    #[tokio::test]
    async fn startup_gate_passes_once_the_database_answers() {
        let store = MemoryShipmentStore::new();

        wait_for_database(&store, 5, Duration::ZERO)
            .await
            .expect("gate should pass against a healthy store");
        assert_eq!(store.ping_count(), 1);
    }

    #[tokio::test]
    async fn startup_gate_gives_up_after_configured_attempts() {
        let store = MemoryShipmentStore::new();
        store.fail_pings(true);

        let result = wait_for_database(&store, 5, Duration::ZERO).await;
        assert!(result.is_err());
        assert_eq!(store.ping_count(), 5);
    }

    #[tokio::test]
    async fn memory_store_assigns_ids_and_lifecycle_defaults() {
        let store = MemoryShipmentStore::new();
        let a = sample_shipment("in_transit", "Mars");
        let b = sample_shipment("pending", "Titan");

        store.insert(&a).await.unwrap();
        store.bulk_insert(std::slice::from_ref(&b)).await.unwrap();

        let rows = store.get_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[1].id, 2);
        assert!(!rows[0].is_deleted);
        assert!(rows[0].restored_at.is_none());
        assert_eq!(rows[0].clone().into_shipment(), a);
        assert_eq!(rows[1].clone().into_shipment(), b);
    }
}
