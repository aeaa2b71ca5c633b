//! HTTP experiment tracker.
//!
//! Posts JSON to a tracking server:
//! - `POST {endpoint}/runs` with the [`RunSpec`]; an `id` field in the reply
//!   names the run, otherwise a local UUID is used
//! - `POST {endpoint}/runs/{id}/events` for every `log`
//! - `POST {endpoint}/runs/{id}/artifacts` with artifact metadata
//! - `POST {endpoint}/runs/{id}/finish` with the final status

use super::{ExperimentTracker, RunSpec, RunStatus, TrackerRun};
use crate::config::TrackerConfig;
use crate::error::HarnessError;
use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub struct HttpTracker {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpTracker {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, HarnessError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint, token))
    }

    pub(crate) fn with_client(client: reqwest::Client, endpoint: &str, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self, HarnessError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| HarnessError::config("tracker.endpoint is required for the http tracker"))?;
        let token = std::env::var(&config.api_key_env).ok();
        Self::new(endpoint, token, Duration::from_secs(config.timeout_secs))
    }
}

async fn post(
    client: &reqwest::Client,
    token: Option<&str>,
    url: &str,
    body: &serde_json::Value,
) -> Result<reqwest::Response, HarnessError> {
    debug!(url, "POST tracker event");
    let mut request = client.post(url).json(body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(HarnessError::tracker(format!(
            "{url} returned {}",
            response.status()
        )));
    }
    Ok(response)
}

#[async_trait]
impl ExperimentTracker for HttpTracker {
    async fn init(&self, spec: RunSpec) -> Result<Arc<dyn TrackerRun>, HarnessError> {
        let url = format!("{}/runs", self.endpoint);
        let response = post(&self.client, self.token.as_deref(), &url, &serde_json::to_value(&spec)?).await?;
        let reply: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        let id = reply
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Arc::new(HttpRun {
            client: self.client.clone(),
            run_url: format!("{}/runs/{}", self.endpoint, id),
            token: self.token.clone(),
            id,
            step: AtomicUsize::new(0),
        }))
    }
}

struct HttpRun {
    client: reqwest::Client,
    run_url: String,
    token: Option<String>,
    id: String,
    step: AtomicUsize,
}

#[async_trait]
impl TrackerRun for HttpRun {
    fn id(&self) -> &str {
        &self.id
    }

    async fn log(
        &self,
        entry: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), HarnessError> {
        let step = self.step.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "step": step,
            "timestamp": chrono::Utc::now(),
            "data": entry,
        });
        post(&self.client, self.token.as_deref(), &format!("{}/events", self.run_url), &body).await?;
        Ok(())
    }

    async fn log_artifact(&self, name: &str, path: &Path) -> Result<(), HarnessError> {
        let bytes = tokio::fs::read(path).await?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        let body = json!({
            "name": name,
            "path": path.display().to_string(),
            "size_bytes": bytes.len(),
            "sha256": digest,
        });
        post(&self.client, self.token.as_deref(), &format!("{}/artifacts", self.run_url), &body).await?;
        Ok(())
    }

    async fn finish(&self, status: RunStatus) -> Result<(), HarnessError> {
        let body = json!({ "status": status });
        post(&self.client, self.token.as_deref(), &format!("{}/finish", self.run_url), &body).await?;
        Ok(())
    }
}
