//! Signal sources polled by the ingestion cycle.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Failure polling a source. Sources are isolated: one failing source
/// never stops the others in the same cycle.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> SourceError {
        SourceError {
            message: message.into(),
        }
    }
}

/// An in-process producer of raw signals.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn poll(&self) -> Result<Vec<Value>, SourceError>;
}

/// A source over a fixed list, drained on first poll. Used by tests and
/// one-shot backfills.
pub struct StaticSource {
    name: String,
    events: Mutex<Vec<Value>>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, events: Vec<Value>) -> StaticSource {
        StaticSource {
            name: name.into(),
            events: Mutex::new(events),
        }
    }
}

#[async_trait]
impl SignalSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&self) -> Result<Vec<Value>, SourceError> {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(std::mem::take(&mut *events))
    }
}
