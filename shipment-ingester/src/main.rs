use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use health::HealthRegistry;
use tokio::sync::watch;

use shipment_ingester::config::Config;
use shipment_ingester::fetch::HttpShipmentSource;
use shipment_ingester::ingest::Ingester;
use shipment_ingester::seen::RedisSeenSet;
use shipment_ingester::store::{wait_for_database, PostgresShipmentStore};
use shipment_ingester::{handlers, metrics};

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let durable = Arc::new(
        PostgresShipmentStore::new(&config.postgres).expect("failed to create postgres store"),
    );

    // Advisory reachability gate: the store may still go away once the loop
    // is running, but refusing to boot against a dead database beats looping
    // on guaranteed failures.
    if let Err(error) = wait_for_database(
        durable.as_ref(),
        config.startup_attempts,
        config.startup_retry_delay.0,
    )
    .await
    {
        tracing::error!("database server is not available, exiting: {}", error);
        std::process::exit(1);
    }

    let source = HttpShipmentSource::new(config.source_url.clone(), config.fetch_timeout.0)
        .expect("failed to create shipment source");
    let seen = Arc::new(
        RedisSeenSet::new(config.redis.url(), config.redis.seen_set_key.clone())
            .expect("failed to create redis seen-set"),
    );

    let liveness = HealthRegistry::new("liveness");
    let deadline = time::Duration::seconds((config.fetch_interval_secs as i64).saturating_mul(3));
    let worker_liveness = liveness.register("ingester", deadline);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            _ = stop_tx.send(true);
        }
    });

    let ingester = Ingester::new(
        Box::new(source),
        durable,
        seen,
        config.collapse_intra_snapshot,
    );
    let ingestion_loop = Box::pin(ingester.run(
        Duration::from_secs(config.fetch_interval_secs),
        stop_rx,
        worker_liveness,
    ));

    let recorder_handle = metrics::setup_metrics_recorder();
    let app = handlers::app(liveness, Some(recorder_handle));
    let http_server = Box::pin(listen(app, config.bind()));

    match select(http_server, ingestion_loop).await {
        Either::Left((listen_result, _)) => match listen_result {
            Ok(_) => {}
            Err(e) => tracing::error!("failed to start shipment-ingester http server, {}", e),
        },
        Either::Right((_, _)) => {
            tracing::info!("shipment-ingester ingestion loop exited")
        }
    };
}
