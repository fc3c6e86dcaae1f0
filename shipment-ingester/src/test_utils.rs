use chrono::{TimeZone, Utc};

use crate::shipment::{Forecast, Location, Shipment};

pub fn sample_location(planet: &str) -> Location {
    Location {
        solar_system: "Sol".to_string(),
        planet: planet.to_string(),
        country: "USA".to_string(),
        address: "1 Launchpad Way".to_string(),
    }
}

/// A fully-populated shipment, varied by the two fields tests care about.
pub fn sample_shipment(status: &str, destination_planet: &str) -> Shipment {
    Shipment {
        time: Utc.with_ymd_and_hms(3024, 4, 1, 12, 30, 0).unwrap(),
        weight_kg: 1250.5,
        volume_m3: 8.25,
        eta_min: 4320,
        status: status.to_string(),
        forecast: Forecast {
            wind_velocity_mph: 12.5,
            wind_direction: "NW".to_string(),
            precipitation_chance: 0.2,
            precipitation_kind: "methane rain".to_string(),
        },
        origin: sample_location("Earth"),
        destination: sample_location(destination_planet),
    }
}
