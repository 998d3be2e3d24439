//! Downstream data collaborators
//!
//! The relational store and the document-search service are external systems
//! consumed through narrow traits. HTTP-backed implementations call the data
//! API service; tests inject fakes.

use crate::error::OrchestrationError;
use crate::models::Status;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

/// Executes a SQL query against the relational collaborator. The service is
/// scoped to two known tables and independently rejects anything else.
#[async_trait]
pub trait RelationalExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Value>>;
}

/// Envelope returned by the document-search collaborator. An unsuccessful
/// status is passed through the pipeline unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEnvelope {
    pub status: Status,
    pub message: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<Value>,
    #[serde(default)]
    pub summary: String,
}

/// Ranked-passage retrieval with optional company/description hints to
/// narrow the search.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        company: Option<&str>,
        description: Option<&str>,
    ) -> Result<SearchEnvelope>;
}

/// Pooled HTTP client for the data API service backing both collaborators.
#[derive(Clone)]
pub struct DataApiClient {
    client: Client,
    base_url: String,
}

impl DataApiClient {
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("DATA_API_BASE_URL").ok()?;
        Some(Self::new(base_url))
    }

    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ExecutionError(format!(
                    "Data API request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        let body = response.json::<Value>().await.map_err(|e| {
            OrchestrationError::ExecutionError(format!("Invalid JSON response: {}", e))
        })?;

        if !status.is_success() {
            return Err(OrchestrationError::ExecutionError(format!(
                "Data API returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl RelationalExecutor for DataApiClient {
    async fn execute(&self, sql: &str) -> Result<Vec<Value>> {
        let body = self.post_json("/api/v1/query", &json!({ "sql": sql })).await?;

        match body.get("status").and_then(Value::as_str) {
            Some("success") => {}
            _ => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("query rejected");
                return Err(OrchestrationError::ExecutionError(message.to_string()));
            }
        }

        let rows = body
            .get("data")
            .and_then(|d| d.get("rows"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(rows)
    }
}

#[async_trait]
impl DocumentSearch for DataApiClient {
    async fn search(
        &self,
        query: &str,
        company: Option<&str>,
        description: Option<&str>,
    ) -> Result<SearchEnvelope> {
        let body = self
            .post_json(
                "/api/v1/documents/search",
                &json!({
                    "query": query,
                    "company": company,
                    "description": description,
                }),
            )
            .await?;

        let envelope: SearchEnvelope = serde_json::from_value(body)?;
        Ok(envelope)
    }
}
