// connectors: Hosts polling connectors from the registry.
//
// Registry source: CONNECTORS_CONFIG_PATH (JSON file) when set, else the
// ENABLED_CONNECTORS env scheme. SIGHUP reloads the registry in place.

use std::sync::Arc;
use tracing::{info, warn};

use connectors::host::ConnectorHost;
use connectors::json_feed::JsonFeedFactory;
use sr_bus::RedisStreamBus;
use sr_connector::{config, factory, ConnectorConfig, ConnectorContext};
use sr_state::RedisStateStore;

fn load_registry() -> Result<Vec<ConnectorConfig>, config::RegistryError> {
    match std::env::var("CONNECTORS_CONFIG_PATH") {
        Ok(path) => config::load_from_file(std::path::Path::new(&path)),
        Err(_) => config::load_from_env(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "connectors starting");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned());

    factory::register("json-feed", Arc::new(JsonFeedFactory));
    info!(types = ?factory::list(), "connector types registered");

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

    let host = ConnectorHost::new(
        ConnectorContext {
            publisher: bus,
            state_store: state.clone(),
        },
        state.clone(),
        state,
    );

    match load_registry() {
        Ok(configs) => {
            info!(count = configs.len(), "registry loaded");
            host.apply(&configs).await;
        }
        Err(e) => {
            eprintln!("FATAL: cannot load connector registry: {}", e);
            std::process::exit(1);
        }
    }

    let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(e) => {
            eprintln!("FATAL: cannot install SIGHUP handler: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading registry");
                match load_registry() {
                    Ok(configs) => host.apply(&configs).await,
                    Err(e) => warn!(error = %e, "registry reload failed, keeping current set"),
                }
            }
        }
    }

    host.shutdown().await;
    info!("connectors stopped");
}
