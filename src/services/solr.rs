// src/services/solr.rs

//! Solr core client.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use url::Url;

use crate::error::{AppError, Result};

/// The operations the uploader needs from a search index core.
#[async_trait]
pub trait IndexCore: Send + Sync {
    fn name(&self) -> &str;

    /// Health check; returns the reported status.
    async fn ping(&self) -> Result<String>;

    /// Post a document batch to the update endpoint.
    async fn post(&self, body: Vec<u8>, content_type: &str) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn optimize(&self) -> Result<()>;

    /// Discard everything posted since the last commit.
    async fn rollback(&self) -> Result<()>;

    /// Delete every document.
    async fn truncate(&self) -> Result<()>;
}

/// One core on a Solr host.
pub struct SolrCore {
    client: Client,
    name: String,
    update_url: Url,
    ping_url: Url,
}

impl SolrCore {
    pub fn new(client: Client, host: &str, core: &str) -> Result<Self> {
        let host = if host.ends_with('/') {
            Url::parse(host)?
        } else {
            Url::parse(&format!("{host}/"))?
        };
        let core_url = host.join(&format!("solr/{core}/"))?;
        let mut ping_url = core_url.join("admin/ping")?;
        ping_url.set_query(Some("wt=json"));

        Ok(Self {
            client,
            name: core.to_string(),
            update_url: core_url.join("update")?,
            ping_url,
        })
    }

    async fn send_update(&self, action: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .client
            .post(self.update_url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::index(action, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::index(
                action,
                format!("core {} returned {status}: {detail}", self.name),
            ));
        }
        Ok(())
    }

    async fn send_action(&self, action: &str, body: Value) -> Result<()> {
        log::info!("Sending {} to core {}", action, self.name);
        self.send_update(action, serde_json::to_vec(&body)?, "application/json")
            .await
    }
}

#[async_trait]
impl IndexCore for SolrCore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<String> {
        let response = self
            .client
            .get(self.ping_url.clone())
            .send()
            .await
            .map_err(|e| AppError::index("ping", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::index(
                "ping",
                format!("core {} returned {status}", self.name),
            ));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::index("ping", e))?;
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string())
    }

    async fn post(&self, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.send_update("update", body, content_type).await
    }

    async fn commit(&self) -> Result<()> {
        self.send_action("commit", json!({"commit": {}})).await
    }

    async fn optimize(&self) -> Result<()> {
        self.send_action("optimize", json!({"optimize": {}})).await
    }

    async fn rollback(&self) -> Result<()> {
        self.send_action("rollback", json!({"rollback": {}})).await
    }

    async fn truncate(&self) -> Result<()> {
        self.send_action("truncate", json!({"delete": {"query": "*:*"}}))
            .await
    }
}
