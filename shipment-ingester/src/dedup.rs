//! Content-based shipment identity and snapshot diffing.
//!
//! Everything in this module is pure: no I/O, no shared state, total over any
//! two sequences of well-formed shipments. The ingestion loop is the only
//! caller; the stores only ever see its output.

use std::collections::HashSet;

use crate::shipment::Shipment;

/// Separates fields inside a dedup key. Not expected to appear in any
/// upstream field value.
const KEY_DELIMITER: &str = "|";

/// Derive the content-based identity of a shipment.
///
/// Joins the string representation of every identity-relevant field, in fixed
/// order: time, weight, volume, eta, status, the four forecast fields, the
/// origin location, the destination location. Two shipments that agree on all
/// of these are the same shipment, regardless of when they were fetched or
/// what id the database later assigns.
pub fn dedup_key(shipment: &Shipment) -> String {
    [
        shipment.time.to_rfc3339(),
        shipment.weight_kg.to_string(),
        shipment.volume_m3.to_string(),
        shipment.eta_min.to_string(),
        shipment.status.clone(),
        shipment.forecast.wind_velocity_mph.to_string(),
        shipment.forecast.wind_direction.clone(),
        shipment.forecast.precipitation_chance.to_string(),
        shipment.forecast.precipitation_kind.clone(),
        shipment.origin.solar_system.clone(),
        shipment.origin.planet.clone(),
        shipment.origin.country.clone(),
        shipment.origin.address.clone(),
        shipment.destination.solar_system.clone(),
        shipment.destination.planet.clone(),
        shipment.destination.country.clone(),
        shipment.destination.address.clone(),
    ]
    .join(KEY_DELIMITER)
}

/// Return the shipments from `fetched` whose key is not represented in
/// `existing`, preserving their relative order.
///
/// Duplicate keys within `fetched` itself are not collapsed here, only
/// filtered against `existing`; callers wanting intra-snapshot dedup run
/// [`collapse_snapshot`] first.
pub fn new_shipments(fetched: Vec<Shipment>, existing: &[Shipment]) -> Vec<Shipment> {
    let seen: HashSet<String> = existing.iter().map(dedup_key).collect();

    fetched
        .into_iter()
        .filter(|shipment| !seen.contains(&dedup_key(shipment)))
        .collect()
}

/// Collapse duplicate keys within a single snapshot, keeping the first
/// occurrence of each and preserving order otherwise.
pub fn collapse_snapshot(snapshot: Vec<Shipment>) -> Vec<Shipment> {
    let mut kept = HashSet::new();

    snapshot
        .into_iter()
        .filter(|shipment| kept.insert(dedup_key(shipment)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shipment::ShipmentRow;
    use crate::test_utils::sample_shipment as shipment;
    use chrono::{TimeZone, Utc};

    #[test]
    fn key_is_deterministic_over_identity_fields() {
        let a = shipment("in_transit", "Mars");
        let b = shipment("in_transit", "Mars");
        assert_eq!(dedup_key(&a), dedup_key(&b));

        let c = shipment("delivered", "Mars");
        assert_ne!(dedup_key(&a), dedup_key(&c));

        let d = shipment("in_transit", "Titan");
        assert_ne!(dedup_key(&a), dedup_key(&d));
    }

    #[test]
    fn key_ignores_store_assigned_fields() {
        let template = shipment("in_transit", "Mars");
        let row = |id: i64, day: u32| ShipmentRow {
            id,
            time: template.time,
            weight_kg: template.weight_kg,
            volume_m3: template.volume_m3,
            eta_min: template.eta_min,
            status: template.status.clone(),
            forecast_wind_velocity_mph: template.forecast.wind_velocity_mph,
            forecast_wind_direction: template.forecast.wind_direction.clone(),
            forecast_precipitation_chance: template.forecast.precipitation_chance,
            forecast_precipitation_kind: template.forecast.precipitation_kind.clone(),
            origin_solar_system: template.origin.solar_system.clone(),
            origin_planet: template.origin.planet.clone(),
            origin_country: template.origin.country.clone(),
            origin_address: template.origin.address.clone(),
            destination_solar_system: template.destination.solar_system.clone(),
            destination_planet: template.destination.planet.clone(),
            destination_country: template.destination.country.clone(),
            destination_address: template.destination.address.clone(),
            created_at: Utc.with_ymd_and_hms(3024, 4, day, 0, 0, 0).unwrap(),
            is_deleted: false,
            is_restored: false,
            restored_at: None,
        };

        let first = row(1, 2).into_shipment();
        let second = row(99, 28).into_shipment();
        assert_eq!(dedup_key(&first), dedup_key(&second));
        assert_eq!(dedup_key(&first), dedup_key(&template));
    }

    #[test]
    fn diff_on_empty_existing_returns_everything_unchanged() {
        let fetched = vec![shipment("in_transit", "Mars"), shipment("pending", "Titan")];

        let result = new_shipments(fetched.clone(), &[]);
        assert_eq!(result, fetched);
    }

    #[test]
    fn diff_on_empty_fetched_returns_nothing() {
        let existing = vec![shipment("in_transit", "Mars")];
        assert!(new_shipments(Vec::new(), &existing).is_empty());
    }

    #[test]
    fn diff_filters_out_known_keys() {
        let a = shipment("in_transit", "Mars");
        let b = shipment("pending", "Titan");

        let result = new_shipments(vec![a.clone(), b.clone()], &[a]);
        assert_eq!(result, vec![b]);
    }

    #[test]
    fn diff_preserves_fetched_order() {
        let a = shipment("pending", "Mars");
        let b = shipment("pending", "Titan");
        let c = shipment("pending", "Europa");
        let d = shipment("pending", "Ganymede");

        let result = new_shipments(
            vec![a.clone(), b.clone(), c.clone(), d.clone()],
            &[b.clone()],
        );
        assert_eq!(result, vec![a, c, d]);
    }

    #[test]
    fn diff_is_idempotent_across_runs() {
        let fetched = vec![shipment("in_transit", "Mars"), shipment("pending", "Titan")];

        // First run against an empty seen-set ingests everything; once those
        // records are part of the existing set, the same snapshot yields nothing.
        let first_run = new_shipments(fetched.clone(), &[]);
        let second_run = new_shipments(fetched, &first_run);
        assert!(second_run.is_empty());
    }

    #[test]
    fn diff_keeps_intra_snapshot_duplicates() {
        let a = shipment("in_transit", "Mars");

        let result = new_shipments(vec![a.clone(), a.clone()], &[]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn collapse_keeps_first_occurrence_in_order() {
        let a = shipment("in_transit", "Mars");
        let b = shipment("pending", "Titan");

        let result = collapse_snapshot(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(result, vec![a, b]);
    }
}
