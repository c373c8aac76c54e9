// ingestion: Raw-signal intake — HTTP gateway plus raw-stream worker.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use ingestion::config::IngestionConfig;
use ingestion::http;
use ingestion::service::IngestionService;
use ingestion::worker::RawSignalHandler;
use sr_bus::RedisStreamBus;
use sr_retry::RetryPolicy;
use sr_state::RedisStateStore;
use sr_types::streams;
use sr_worker::{StreamWorker, WorkerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ingestion starting");
    let cfg = IngestionConfig::from_env();

    let bus = match RedisStreamBus::connect_with_max_len(&cfg.redis_url, cfg.stream_max_len).await
    {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            eprintln!("FATAL: cannot reach stream store: {}", e);
            std::process::exit(1);
        }
    };
    let state = match RedisStateStore::connect_with_dedup_ttl(
        &cfg.redis_url,
        Duration::from_secs(cfg.dedup_ttl_seconds),
    )
    .await
    {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("FATAL: cannot reach state store: {}", e);
            std::process::exit(1);
        }
    };

    let service = Arc::new(IngestionService::new(
        Vec::new(),
        bus.clone(),
        state.clone(),
        RetryPolicy::new(
            cfg.max_publish_attempts,
            Duration::from_millis(cfg.publish_retry_base_delay_ms),
        ),
    ));

    // Gateway, on its own connection: the worker's blocking reads must
    // not stall gateway publishes.
    let gateway_bus =
        match RedisStreamBus::connect_with_max_len(&cfg.redis_url, cfg.stream_max_len).await {
            Ok(bus) => Arc::new(bus),
            Err(e) => {
                eprintln!("FATAL: cannot reach stream store: {}", e);
                std::process::exit(1);
            }
        };
    let router = http::build_router(
        gateway_bus,
        cfg.gateway_auth_token.clone(),
        cfg.gateway_max_concurrency,
        cfg.gateway_max_queue_size,
        cfg.max_request_bytes,
    );
    if let Err(e) = http::serve(router, &cfg.gateway_bind).await {
        eprintln!("FATAL: cannot bind gateway on {}: {}", cfg.gateway_bind, e);
        std::process::exit(1);
    }

    // Raw-signals worker.
    let mut worker_cfg = WorkerConfig::new(
        streams::RAW_INPUT_SIGNALS,
        cfg.consumer_group.clone(),
        "ingestion",
    );
    if let Some(consumer) = cfg.consumer_name.clone() {
        worker_cfg.consumer = consumer;
    }
    worker_cfg.batch_size = cfg.consumer_batch_size;
    worker_cfg.block = Duration::from_millis(cfg.consumer_block_ms);
    worker_cfg.max_deliveries = cfg.max_deliveries;
    worker_cfg.retry_key_ttl = Duration::from_secs(cfg.retry_key_ttl_seconds);

    let worker = Arc::new(StreamWorker::new(
        bus.clone(),
        state.clone(),
        Arc::new(RawSignalHandler::new(service)),
        worker_cfg,
    ));
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
    info!("ingestion stopped");
}
