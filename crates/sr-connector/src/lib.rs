// sr-connector: Polling connector framework.
//
// A connector periodically fetches items from a provider, skips items
// whose change-detector version is unchanged, transforms the rest into raw
// signals, and publishes them to its output stream. Cursor state persists
// across restarts; a distributed single-writer lease keeps one instance
// polling per connector name; per-poll metrics feed the health surface.

pub mod config;
pub mod factory;
pub mod poll;
pub mod provider;
pub mod runner;

pub use config::{ConnectorConfig, ConnectorRetryConfig, RegistryError};
pub use factory::{ConnectorContext, ConnectorFactory};
pub use poll::{Connector, PollSummary, PollingConnector};
pub use provider::{default_item_key, SignalProvider};
pub use runner::ConnectorRunner;

/// Connector-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    State(#[from] sr_state::StateError),
    #[error(transparent)]
    Bus(#[from] sr_bus::BusError),
}
