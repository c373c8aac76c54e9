//! The generic polling connector.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::provider::SignalProvider;
use crate::ConnectorError;
use sr_bus::{publish_message, EventPublisher};
use sr_state::{ConnectorState, ConnectorStateStore};

/// Outcome of one poll. Always: `fetched = published + skipped_unchanged
/// + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub fetched: u64,
    pub published: u64,
    pub skipped_unchanged: u64,
    pub failed: u64,
}

/// A runnable connector, as the runner sees it.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    async fn poll(&self) -> Result<PollSummary, ConnectorError>;
}

/// Generic polling connector parameterized over a provider.
pub struct PollingConnector<P> {
    name: String,
    output_stream: String,
    provider: P,
    publisher: Arc<dyn EventPublisher>,
    state_store: Arc<dyn ConnectorStateStore>,
}

impl<P: SignalProvider> PollingConnector<P> {
    pub fn new(
        name: impl Into<String>,
        output_stream: impl Into<String>,
        provider: P,
        publisher: Arc<dyn EventPublisher>,
        state_store: Arc<dyn ConnectorStateStore>,
    ) -> PollingConnector<P> {
        PollingConnector {
            name: name.into(),
            output_stream: output_stream.into(),
            provider,
            publisher,
            state_store,
        }
    }

    fn stored_versions(state: &Option<ConnectorState>) -> HashMap<String, String> {
        state
            .as_ref()
            .and_then(|s| s.latest.get("item_versions"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<P: SignalProvider> Connector for PollingConnector<P> {
    fn name(&self) -> &str {
        &self.name
    }

    /// One poll: load state, fetch, skip unchanged items, transform and
    /// publish the rest, save state. Item-level errors count as `failed`
    /// and never abort the remaining items; a state-save failure is logged
    /// but does not fail the poll.
    async fn poll(&self) -> Result<PollSummary, ConnectorError> {
        let state = self.state_store.load(&self.name).await?;
        let mut versions = Self::stored_versions(&state);

        let items = self.provider.fetch().await?;
        let mut summary = PollSummary {
            fetched: items.len() as u64,
            ..PollSummary::default()
        };

        for item in &items {
            let key = self.provider.item_key(item);
            if let Some(version) = self.provider.item_version(item) {
                if versions.get(&key) == Some(&version) {
                    summary.skipped_unchanged += 1;
                    continue;
                }
                versions.insert(key.clone(), version);
            }

            let signal = match self.provider.transform(item) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(connector = %self.name, item = %key, error = %e, "transform failed");
                    summary.failed += 1;
                    continue;
                }
            };

            match publish_message(self.publisher.as_ref(), &self.output_stream, &signal).await {
                Ok(_) => summary.published += 1,
                Err(e) => {
                    warn!(connector = %self.name, item = %key, error = %e, "publish failed");
                    summary.failed += 1;
                }
            }
        }

        let new_state = ConnectorState::new(json!({ "item_versions": versions }));
        if let Err(e) = self.state_store.save(&self.name, &new_state).await {
            warn!(connector = %self.name, error = %e, "state save failed; next poll may republish");
        }

        debug!(
            connector = %self.name,
            fetched = summary.fetched,
            published = summary.published,
            skipped_unchanged = summary.skipped_unchanged,
            failed = summary.failed,
            "poll complete"
        );
        Ok(summary)
    }
}
