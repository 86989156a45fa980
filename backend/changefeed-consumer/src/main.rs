use anyhow::{Context, Result};
use changefeed_consumer::handlers::TodoAnalytics;
use changefeed_consumer::lifecycle::{self, start_with_retry};
use changefeed_consumer::metrics::ConsumerMetrics;
use changefeed_consumer::{
    http, Config, ConsumerService, KafkaSubscriber, MessageProcessor, Router, StatusTracker,
    TracingEmitter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Interval between sweeps of expired analytics dedup keys
const DEDUP_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,changefeed_consumer=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("=== Database Change Consumer Starting ===");

    let config = Config::from_env().context("Invalid consumer configuration")?;
    tracing::info!(
        brokers = %config.kafka.brokers,
        topic = %config.kafka.topic,
        group_id = %config.kafka.group_id,
        "Configuration loaded"
    );

    let metrics = ConsumerMetrics::new();
    let status = StatusTracker::new();

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        lifecycle::shutdown_signal().await;
        tracing::info!("Received termination signal, shutting down gracefully");
        let _ = shutdown_tx.send(true);
    });

    let status_server = if config.http_enabled {
        let server = http::status_server(status.clone(), config.http_port)
            .context("Failed to bind status HTTP server")?;
        let handle = server.handle();
        tokio::spawn(server);
        tracing::info!("Status server listening on 0.0.0.0:{}", config.http_port);
        Some(handle)
    } else {
        None
    };

    let kafka_config = config.kafka.clone();
    let subscriber = match start_with_retry(&config.startup_retry, &mut shutdown_rx, || {
        let kafka_config = kafka_config.clone();
        async move {
            let subscriber = KafkaSubscriber::connect(&kafka_config).await?;
            subscriber.subscribe()?;
            Ok(subscriber)
        }
    })
    .await
    {
        Ok(subscriber) => subscriber,
        Err(changefeed_consumer::ConsumerError::Interrupted) => {
            tracing::info!("Shutdown requested before the consumer started");
            if let Some(handle) = status_server {
                handle.stop(true).await;
            }
            return Ok(());
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start consumer service");
            return Err(e).context("Consumer startup failed");
        }
    };

    let analytics = TodoAnalytics::new(config.dedup_retention);
    let cleanup = analytics.guard().spawn_cleanup(DEDUP_CLEANUP_INTERVAL);

    let processor = MessageProcessor::new(
        Router::standard(&config.processor_id, analytics),
        Arc::new(TracingEmitter),
        config.processor_id.clone(),
        metrics.clone(),
    );
    let service = Arc::new(ConsumerService::new(
        subscriber,
        processor,
        status.clone(),
        metrics,
    ));

    tracing::info!("Consumer is running, waiting for database change events");
    lifecycle::supervise(service, shutdown_rx, config.shutdown_grace).await;

    cleanup.abort();
    if let Some(handle) = status_server {
        handle.stop(true).await;
    }

    tracing::info!("Consumer service stopped");
    Ok(())
}
