// classifier: Classification worker plus the LLM adapter HTTP service.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use classifier::adapter;
use classifier::config::{ClassifierConfig, ClassifierMode};
use classifier::llm::{LlmClient, LlmClientConfig};
use classifier::rules::RuleBasedClassifier;
use classifier::worker::{ClassificationHandler, Classifier};
use classifier::LlmClassifier;
use sr_bus::RedisStreamBus;
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

    info!(version = env!("CARGO_PKG_VERSION"), "classifier starting");
    let cfg = match ClassifierConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            std::process::exit(1);
        }
    };

    let bus = match RedisStreamBus::connect(&cfg.redis_url).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            eprintln!("FATAL: cannot reach stream store: {}", e);
            std::process::exit(1);
        }
    };
    let state = match RedisStateStore::connect(&cfg.redis_url).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("FATAL: cannot reach state store: {}", e);
            std::process::exit(1);
        }
    };

    let rules = Arc::new(RuleBasedClassifier::new());
    let (primary, fallback): (Arc<dyn Classifier>, Option<Arc<dyn Classifier>>) = match cfg.mode {
        ClassifierMode::RuleBased => (rules.clone(), None),
        ClassifierMode::Llm => {
            // from_env already guarantees the endpoint in LLM mode.
            let endpoint = cfg.llm_endpoint.clone().unwrap_or_default();
            let client = match LlmClient::new(LlmClientConfig {
                base_url: endpoint,
                api_key: cfg.llm_api_key.clone(),
                model: cfg.llm_model.clone(),
                timeout: Duration::from_millis(cfg.llm_timeout_ms),
                max_attempts: cfg.llm_max_retries + 1,
                retry_base_delay: Duration::from_millis(cfg.llm_retry_base_delay_ms),
            }) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    eprintln!("FATAL: cannot build LLM client: {}", e);
                    std::process::exit(1);
                }
            };

            // The adapter HTTP surface only exists in LLM mode.
            let router = adapter::build_router(
                client.clone(),
                cfg.llm_max_concurrency,
                cfg.llm_max_queue_size,
            );
            if let Err(e) = adapter::serve(router, &cfg.adapter_bind).await {
                eprintln!("FATAL: cannot bind adapter on {}: {}", cfg.adapter_bind, e);
                std::process::exit(1);
            }

            (
                Arc::new(LlmClassifier::new(client)) as Arc<dyn Classifier>,
                Some(rules.clone() as Arc<dyn Classifier>),
            )
        }
    };

    let handler = Arc::new(ClassificationHandler::new(
        primary,
        fallback,
        bus.clone(),
        cfg.confidence_threshold,
    ));

    let mut worker_cfg = WorkerConfig::new(
        streams::EXTERNAL_SIGNALS,
        cfg.consumer_group.clone(),
        "classification",
    );
    if let Some(consumer) = cfg.consumer_name.clone() {
        worker_cfg.consumer = consumer;
    }
    worker_cfg.batch_size = cfg.consumer_batch_size;
    worker_cfg.block = Duration::from_millis(cfg.consumer_block_ms);
    worker_cfg.max_deliveries = cfg.max_deliveries;
    worker_cfg.retry_key_ttl = Duration::from_secs(cfg.retry_key_ttl_seconds);

    let worker = Arc::new(StreamWorker::new(bus, state, handler, worker_cfg));
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
    info!("classifier stopped");
}
