//! The provider seam a connector type plugs into.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::ConnectorError;

/// A source of raw items for a polling connector.
///
/// Implementations own the provider-specific fetch and mapping; the
/// framework owns change detection, cursor state, lease, and metrics.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    type Item: Serialize + Send + Sync;

    /// Fetch the current batch of items.
    async fn fetch(&self) -> Result<Vec<Self::Item>, ConnectorError>;

    /// Map one item into the raw signal JSON to publish.
    fn transform(&self, item: &Self::Item) -> Result<Value, ConnectorError>;

    /// Change-detector version string for an item. Equal versions across
    /// polls mean "no publish needed". `None` disables change detection.
    fn item_version(&self, _item: &Self::Item) -> Option<String> {
        None
    }

    /// Stable identity for an item, keying the stored version map.
    fn item_key(&self, item: &Self::Item) -> String {
        default_item_key(&serde_json::to_value(item).unwrap_or(Value::Null))
    }
}

/// Default item key: `item.id` when present, else the item's stable JSON
/// serialization (object keys are ordered, so equal items key equally).
pub fn default_item_key(item: &Value) -> String {
    if let Some(id) = item.get("id") {
        match id {
            Value::String(s) => return s.clone(),
            other if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    item.to_string()
}
