// notifier: Notification routing worker.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use notifier::router::SeverityRouter;
use notifier::worker::NotificationHandler;
use sr_bus::RedisStreamBus;
use sr_state::RedisStateStore;
use sr_types::streams;
use sr_worker::{StreamWorker, WorkerConfig};

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "notifier starting");
    let redis_url = env_str("REDIS_URL", "redis://127.0.0.1:6379");

    let bus = match RedisStreamBus::connect(&redis_url).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            eprintln!("FATAL: cannot reach stream store: {}", e);
            std::process::exit(1);
        }
    };
    let state = match RedisStateStore::connect(&redis_url).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("FATAL: cannot reach state store: {}", e);
            std::process::exit(1);
        }
    };

    let handler = Arc::new(NotificationHandler::new(
        Arc::new(SeverityRouter::new()),
        bus.clone(),
    ));

    let mut cfg = WorkerConfig::new(
        streams::MITIGATION_PLANS,
        env_str("CONSUMER_GROUP", "notifier"),
        "notifier",
    );
    if let Ok(consumer) = std::env::var("CONSUMER_NAME") {
        cfg.consumer = consumer;
    }
    cfg.batch_size = env_parse("CONSUMER_BATCH_SIZE", 50);
    cfg.block = Duration::from_millis(env_parse("CONSUMER_BLOCK_MS", 5_000));
    cfg.max_deliveries = env_parse("MAX_DELIVERIES", 5);
    cfg.retry_key_ttl = Duration::from_secs(env_parse("RETRY_KEY_TTL_SECONDS", 86_400));

    let worker = Arc::new(StreamWorker::new(bus, state, handler, cfg));
    if let Err(e) = worker.init().await {
        eprintln!("FATAL: cannot create consumer group: {}", e);
        std::process::exit(1);
    }

    let runner = worker.clone();
    let worker_task = tokio::spawn(async move {
        if let Err(e) = runner.start().await {
            error!(error = %e, "worker exited with error");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "signal handler failed"),
    }
    worker.stop();
    let _ = worker_task.await;
    info!("notifier stopped");
}
