use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::HostBridge;

/// Posts actions to `{base_url}/{resource_name}/{action}`, the way the NUI
/// page reaches its parent resource.
pub struct HttpHostBridge {
    client: Client,
    base_url: String,
    resource_name: String,
}

impl HttpHostBridge {
    pub fn new(base_url: &str, resource_name: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            resource_name: resource_name.to_string(),
        })
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.resource_name, action)
    }
}

#[async_trait]
impl HostBridge for HttpHostBridge {
    async fn send(&self, action: &str, payload: Value) -> Result<Value> {
        let url = self.url(action);
        debug!(%url, "sending host action");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(serde_json::to_vec(&payload)?)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("host rejected {}", action))?;

        let text = response.text().await.context("failed to read host response")?;
        Ok(parse_body(action, &text))
    }
}

fn parse_body(action: &str, text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }

    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            warn!(action, body = text, "failed to parse JSON response");
            json!({})
        }
    }
}
