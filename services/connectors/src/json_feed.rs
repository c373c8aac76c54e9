//! Generic JSON-feed connector type.
//!
//! Fetches a JSON document over HTTP and publishes each item as a raw
//! signal. Per-provider parsing is deliberately out of scope: items pass
//! through as-is (plus an optional `source_type` stamp) and the ingestion
//! normalizer does the field mapping. Change detection hashes each item's
//! serialized form.
//!
//! `provider_config`: `{url, items_field?, auth_bearer?, source_type?}`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use sr_connector::{
    ConnectorConfig, ConnectorContext, ConnectorError, ConnectorFactory, Connector,
    PollingConnector, SignalProvider,
};
use sr_core::stable_content_hash;

pub struct JsonFeedProvider {
    http: reqwest::Client,
    url: String,
    items_field: Option<String>,
    auth_bearer: Option<String>,
    source_type: Option<String>,
}

impl JsonFeedProvider {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        items_field: Option<String>,
        auth_bearer: Option<String>,
        source_type: Option<String>,
    ) -> Result<JsonFeedProvider, ConnectorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Config(e.to_string()))?;
        Ok(JsonFeedProvider {
            http,
            url: url.into(),
            items_field,
            auth_bearer,
            source_type,
        })
    }

    fn items_from_body(&self, body: Value) -> Result<Vec<Value>, ConnectorError> {
        if let Some(field) = &self.items_field {
            return match body.get(field) {
                Some(Value::Array(items)) => Ok(items.clone()),
                _ => Err(ConnectorError::Fetch(format!(
                    "feed has no '{}' array",
                    field
                ))),
            };
        }
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(mut obj) => {
                for key in ["items", "entries", "results", "alerts"] {
                    if let Some(Value::Array(items)) = obj.remove(key) {
                        return Ok(items);
                    }
                }
                Err(ConnectorError::Fetch(
                    "feed body is neither an array nor a known wrapper".to_owned(),
                ))
            }
            _ => Err(ConnectorError::Fetch("feed body is not JSON items".to_owned())),
        }
    }
}

#[async_trait]
impl SignalProvider for JsonFeedProvider {
    type Item = Value;

    async fn fetch(&self) -> Result<Vec<Value>, ConnectorError> {
        let mut request = self.http.get(&self.url);
        if let Some(token) = &self.auth_bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Fetch(format!("feed HTTP {}", status)));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::Fetch(e.to_string()))?;
        self.items_from_body(body)
    }

    fn transform(&self, item: &Value) -> Result<Value, ConnectorError> {
        if !item.is_object() {
            return Err(ConnectorError::Transform("feed item is not an object".to_owned()));
        }
        let mut signal = item.clone();
        if let (Some(source_type), Some(obj)) = (&self.source_type, signal.as_object_mut()) {
            obj.entry("source_type".to_owned())
                .or_insert_with(|| Value::String(source_type.clone()));
            obj.entry("source_reference".to_owned())
                .or_insert_with(|| Value::String(self.url.clone()));
        }
        Ok(signal)
    }

    fn item_version(&self, item: &Value) -> Option<String> {
        Some(stable_content_hash(&[&item.to_string()]))
    }
}

/// Factory for `type = "json-feed"` registry entries.
pub struct JsonFeedFactory;

impl ConnectorFactory for JsonFeedFactory {
    fn create(
        &self,
        cfg: &ConnectorConfig,
        ctx: &ConnectorContext,
    ) -> Result<Arc<dyn Connector>, ConnectorError> {
        let url = cfg
            .provider_config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ConnectorError::Config(format!("connector '{}' needs provider_config.url", cfg.name))
            })?;
        let get_str = |key: &str| {
            cfg.provider_config
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        let provider = JsonFeedProvider::new(
            url,
            Duration::from_millis(cfg.request_timeout_ms),
            get_str("items_field"),
            get_str("auth_bearer"),
            get_str("source_type"),
        )?;
        Ok(Arc::new(PollingConnector::new(
            cfg.name.clone(),
            cfg.output_stream().to_owned(),
            provider,
            ctx.publisher.clone(),
            ctx.state_store.clone(),
        )))
    }
}
