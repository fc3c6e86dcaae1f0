use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::shipment::Shipment;

/// Enumeration of errors while pulling a snapshot from the shipment source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("shipment source request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("shipment source responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// Contract for the upstream shipment source.
///
/// `get_data` returns the full snapshot available at call time, never a
/// delta. A transport failure or an unparseable response surfaces as a
/// [`FetchError`] rather than a partial batch.
#[async_trait]
pub trait ShipmentSource: Send + Sync {
    async fn get_data(&self) -> Result<Vec<Shipment>, FetchError>;
}

pub struct HttpShipmentSource {
    client: reqwest::Client,
    url: String,
}

impl HttpShipmentSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl ShipmentSource for HttpShipmentSource {
    async fn get_data(&self) -> Result<Vec<Shipment>, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        Ok(response.json().await?)
    }
}

/// Source double serving a fixed snapshot, or failing on demand.
#[derive(Default)]
pub struct StaticSource {
    snapshot: Vec<Shipment>,
    unavailable: bool,
}

impl StaticSource {
    pub fn new(snapshot: Vec<Shipment>) -> Self {
        Self {
            snapshot,
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            snapshot: Vec::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl ShipmentSource for StaticSource {
    async fn get_data(&self) -> Result<Vec<Shipment>, FetchError> {
        if self.unavailable {
            return Err(FetchError::Status(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            ));
        }

        Ok(self.snapshot.clone())
    }
}
