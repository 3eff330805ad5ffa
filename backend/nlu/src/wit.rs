//! Wit.ai style HTTP decoder.
//!
//! Understands both the current response shape (`intents` + `entities`
//! keyed `name:role`) and the legacy `outcome`/`outcomes` shapes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lisa_core::{CoreError, NluClient, Outcome};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

pub struct WitClient {
    client: Client,
    token: String,
    base_url: String,
    api_version: String,
}

impl WitClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            base_url: "https://api.wit.ai".to_string(),
            api_version: "20240304".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }
}

#[async_trait]
impl NluClient for WitClient {
    fn name(&self) -> &str {
        "wit"
    }

    async fn decode(&self, text: &str, context: Option<&Value>) -> Result<Outcome> {
        let mut query = vec![("v", self.api_version.clone()), ("q", text.to_string())];
        if let Some(context) = context {
            query.push(("context", context.to_string()));
        }

        debug!(chars = text.len(), "Sending message to Wit");

        let response = self
            .client
            .get(format!("{}/message", self.base_url))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await
            .context("Wit HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CoreError::nlu("wit", format!("status {status}: {error_body}")).into());
        }

        let body: Value = response.json().await.context("Failed to parse Wit response")?;
        Ok(parse_response(&body)?)
    }
}

/// Convert a Wit response body into an [`Outcome`].
pub fn parse_response(body: &Value) -> Result<Outcome, CoreError> {
    let legacy = body
        .get("outcome")
        .or_else(|| body.get("outcomes").and_then(|o| o.get(0)));
    if let Some(outcome) = legacy {
        return serde_json::from_value(outcome.clone())
            .map_err(|e| CoreError::nlu("wit", format!("malformed outcome: {e}")));
    }

    let top = body.get("intents").and_then(|i| i.get(0));
    let mut entities = Map::new();
    if let Some(Value::Object(found)) = body.get("entities") {
        for (key, values) in found {
            let name = key.split_once(':').map_or(key.as_str(), |(name, _)| name);
            entities.insert(name.to_string(), values.clone());
        }
    }
    Ok(Outcome {
        intent: top
            .and_then(|i| i.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        confidence: top.and_then(|i| i.get("confidence")).and_then(Value::as_f64),
        entities,
    })
}
