use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One interplanetary cargo movement, as reported by the upstream source.
///
/// Only the fields below take part in a shipment's identity (see
/// [`crate::dedup::dedup_key`]). Store-assigned columns live on
/// [`ShipmentRow`] and are attached at persistence time; the pipeline never
/// mutates a fetched shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub time: DateTime<Utc>,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub eta_min: i64,
    pub status: String,
    pub forecast: Forecast,
    pub origin: Location,
    pub destination: Location,
}

/// Weather forecast attached to a shipment by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub wind_velocity_mph: f64,
    pub wind_direction: String,
    pub precipitation_chance: f64,
    pub precipitation_kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub solar_system: String,
    pub planet: String,
    pub country: String,
    pub address: String,
}

/// A shipment as stored in the `shipments` table: the identity fields
/// flattened into columns, plus everything the database assigns (`id`,
/// `created_at`) and the soft-delete lifecycle, which is managed outside the
/// ingestion path.
#[derive(Debug, Clone, FromRow)]
pub struct ShipmentRow {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub eta_min: i64,
    pub status: String,
    pub forecast_wind_velocity_mph: f64,
    pub forecast_wind_direction: String,
    pub forecast_precipitation_chance: f64,
    pub forecast_precipitation_kind: String,
    pub origin_solar_system: String,
    pub origin_planet: String,
    pub origin_country: String,
    pub origin_address: String,
    pub destination_solar_system: String,
    pub destination_planet: String,
    pub destination_country: String,
    pub destination_address: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub is_restored: bool,
    pub restored_at: Option<DateTime<Utc>>,
}

impl ShipmentRow {
    /// Strip the store-assigned columns, recovering the value type the
    /// pipeline works with.
    pub fn into_shipment(self) -> Shipment {
        Shipment {
            time: self.time,
            weight_kg: self.weight_kg,
            volume_m3: self.volume_m3,
            eta_min: self.eta_min,
            status: self.status,
            forecast: Forecast {
                wind_velocity_mph: self.forecast_wind_velocity_mph,
                wind_direction: self.forecast_wind_direction,
                precipitation_chance: self.forecast_precipitation_chance,
                precipitation_kind: self.forecast_precipitation_kind,
            },
            origin: Location {
                solar_system: self.origin_solar_system,
                planet: self.origin_planet,
                country: self.origin_country,
                address: self.origin_address,
            },
            destination: Location {
                solar_system: self.destination_solar_system,
                planet: self.destination_planet,
                country: self.destination_country,
                address: self.destination_address,
            },
        }
    }
}
