//! Networks coordinator service.
//!
//! Connects to Redpanda and Redis, then dispatches provisioning requests and
//! item outcomes until Ctrl+C or SIGTERM.

use anyhow::Context;
use netsaga_core::event_bus::EventBus;
use netsaga_core::subject::SubjectTable;
use netsaga_redis::RedisKeyValueStore;
use netsaga_redpanda::RedpandaEventBus;
use netsaga_runtime::AggregateStore;
use netsaga_runtime::metrics::MetricsServer;
use networks_coordinator::{Config, Dispatcher};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "networks_coordinator=info,netsaga_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting networks coordinator");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        consumer_group = %config.redpanda.consumer_group,
        key_prefix = %config.redis.key_prefix,
        resource = %config.resource.plural,
        "Configuration loaded"
    );

    // Kept alive for the lifetime of the process.
    let _metrics = if config.metrics.enabled {
        let mut server = MetricsServer::new(config.metrics.addr);
        server.start().context("Failed to start metrics server")?;
        Some(server)
    } else {
        None
    };

    info!("Connecting to Redpanda event bus...");
    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .build()?,
    );

    info!("Connecting to Redis...");
    let kv = RedisKeyValueStore::connect(&config.redis.url).await?;
    let store = AggregateStore::with_prefix(Arc::new(kv), config.redis.key_prefix.clone());

    let dispatcher = Arc::new(
        Dispatcher::new(bus, store, SubjectTable::new(&config.resource), config.retry_policy())
            .with_resubscribe_delay(config.resubscribe_delay()),
    );

    tokio::select! {
        () = dispatcher.run() => {},
        () = shutdown_signal() => {},
    }

    info!("Coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
