use axum::{routing, Router};
use health::HealthRegistry;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::metrics::track_metrics;

pub fn app(liveness: HealthRegistry, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route(
            "/_liveness",
            routing::get(move || std::future::ready(liveness.get_status())),
        )
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .layer(axum::middleware::from_fn(track_metrics))
}

pub async fn index() -> &'static str {
    "shipment ingester"
}
