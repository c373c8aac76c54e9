// planning: Planning gateway plus state and impact workers.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use planning::http;
use planning::impact::ImpactHandler;
use planning::state_worker::{InventoryStateHandler, ShipmentStateHandler};
use sr_bus::RedisStreamBus;
use sr_state::RedisStateStore;
use sr_types::streams;
use sr_worker::{MessageHandler, StreamWorker, WorkerConfig};

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn worker_config(stream: &str, group: &str, role: &str) -> WorkerConfig {
    let mut cfg = WorkerConfig::new(stream, group, role);
    cfg.batch_size = env_parse("CONSUMER_BATCH_SIZE", 50);
    cfg.block = Duration::from_millis(env_parse("CONSUMER_BLOCK_MS", 5_000));
    cfg.max_deliveries = env_parse("MAX_DELIVERIES", 5);
    cfg.retry_key_ttl = Duration::from_secs(env_parse("RETRY_KEY_TTL_SECONDS", 86_400));
    cfg
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "planning starting");
    let redis_url = env_str("REDIS_URL", "redis://127.0.0.1:6379");

    let bus_factory = || async {
        match RedisStreamBus::connect(&redis_url).await {
            Ok(bus) => Arc::new(bus),
            Err(e) => {
                eprintln!("FATAL: cannot reach stream store: {}", e);
                std::process::exit(1);
            }
        }
    };
    let state = match RedisStateStore::connect(&redis_url).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("FATAL: cannot reach state store: {}", e);
            std::process::exit(1);
        }
    };

    // Gateway.
    let gateway_bus = bus_factory().await;
    let router = http::build_router(gateway_bus);
    let bind = env_str("GATEWAY_BIND", "0.0.0.0:8082");
    if let Err(e) = http::serve(router, &bind).await {
        eprintln!("FATAL: cannot bind gateway on {}: {}", bind, e);
        std::process::exit(1);
    }

    // Three workers, each with its own bus connection (blocking reads do
    // not share well).
    let shipment_handler: Arc<dyn MessageHandler> =
        Arc::new(ShipmentStateHandler::new(state.clone()));
    let inventory_handler: Arc<dyn MessageHandler> =
        Arc::new(InventoryStateHandler::new(state.clone()));
    let impact_bus = bus_factory().await;
    let impact_handler: Arc<dyn MessageHandler> =
        Arc::new(ImpactHandler::new(state.clone(), impact_bus));

    let specs: Vec<(&str, &str, &str, Arc<dyn MessageHandler>)> = vec![
        (
            streams::SHIPMENT_PLANS,
            "planning-shipments",
            "planning-shipments",
            shipment_handler,
        ),
        (
            streams::INVENTORY_SNAPSHOTS,
            "planning-inventory",
            "planning-inventory",
            inventory_handler,
        ),
        (
            streams::MITIGATION_PLANS,
            "planning-impact",
            "planning-impact",
            impact_handler,
        ),
    ];

    let mut workers = Vec::new();
    let mut tasks = Vec::new();
    for (stream, group, role, handler) in specs {
        let worker = Arc::new(StreamWorker::new(
            bus_factory().await,
            state.clone(),
            handler,
            worker_config(stream, group, role),
        ));
        if let Err(e) = worker.init().await {
            eprintln!("FATAL: cannot create consumer group {}: {}", group, e);
            std::process::exit(1);
        }
        let runner = worker.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = runner.start().await {
                error!(error = %e, "worker exited with error");
            }
        }));
        workers.push(worker);
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "signal handler failed"),
    }
    for worker in &workers {
        worker.stop();
    }
    for task in tasks {
        let _ = task.await;
    }
    info!("planning stopped");
}
