//! Process-wide connector-type factory registry.
//!
//! Connector types register a factory under a type name; the host binary
//! instantiates connectors by looking up each registry entry's type. The
//! registry is explicit (`register`, `list`, `clear`) — no hidden
//! singletons beyond the map itself, which exists so config files can name
//! types as strings.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::config::ConnectorConfig;
use crate::poll::Connector;
use crate::ConnectorError;
use sr_bus::EventPublisher;
use sr_state::ConnectorStateStore;

/// Collaborators handed to factories.
#[derive(Clone)]
pub struct ConnectorContext {
    pub publisher: Arc<dyn EventPublisher>,
    pub state_store: Arc<dyn ConnectorStateStore>,
}

/// Builds connectors of one type from registry entries.
pub trait ConnectorFactory: Send + Sync {
    fn create(
        &self,
        cfg: &ConnectorConfig,
        ctx: &ConnectorContext,
    ) -> Result<Arc<dyn Connector>, ConnectorError>;
}

type FactoryMap = HashMap<String, Arc<dyn ConnectorFactory>>;

fn registry() -> &'static RwLock<FactoryMap> {
    static REGISTRY: OnceLock<RwLock<FactoryMap>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a factory under a type name, replacing any previous one.
pub fn register(type_name: &str, factory: Arc<dyn ConnectorFactory>) {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(type_name.to_owned(), factory);
}

/// Registered type names, sorted.
pub fn list() -> Vec<String> {
    let mut names: Vec<String> = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Remove every registration (tests).
pub fn clear() {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Instantiate a connector for a registry entry.
pub fn create(
    cfg: &ConnectorConfig,
    ctx: &ConnectorContext,
) -> Result<Arc<dyn Connector>, ConnectorError> {
    let factory = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&cfg.connector_type)
        .cloned();
    match factory {
        Some(factory) => factory.create(cfg, ctx),
        None => Err(ConnectorError::Config(format!(
            "unknown connector type '{}' (registered: {})",
            cfg.connector_type,
            list().join(", ")
        ))),
    }
}
