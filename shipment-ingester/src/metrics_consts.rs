pub const INGEST_CYCLES: &str = "ingest_cycles_total";
pub const INGEST_CYCLE_FAILURES: &str = "ingest_cycle_failures_total";
pub const SHIPMENTS_INGESTED: &str = "ingest_shipments_ingested_total";
pub const NEW_SHIPMENTS_PER_CYCLE: &str = "ingest_new_shipments_per_cycle";
