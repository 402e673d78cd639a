//! API client for communicating with a tuning agent

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for a tuning agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// List entries, optionally under a key prefix
    pub async fn list_entries(&self, prefix: Option<&str>) -> Result<Vec<Entry>> {
        let mut url = self.base_url.join("api/v1/entries").context("Invalid path")?;
        if let Some(prefix) = prefix {
            url.query_pairs_mut().append_pair("prefix", prefix);
        }
        self.get(url.as_str()).await
    }

    pub async fn get_entry(&self, key: &str) -> Result<Entry> {
        self.get(&entry_path(key)).await
    }

    /// Write an entry as the remote side of the store
    pub async fn set_entry(&self, key: &str, value: EntryValue) -> Result<Entry> {
        self.put(&entry_path(key), &WriteRequest { value }).await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        self.get("healthz").await
    }

    pub async fn readiness(&self) -> Result<Readiness> {
        self.get("readyz").await
    }
}

fn entry_path(key: &str) -> String {
    format!("api/v1/entries/{}", key.trim_start_matches('/'))
}

// API response types

/// Entry payload as the agent serializes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryValue {
    Boolean(bool),
    Double(f64),
    String(String),
}

impl EntryValue {
    /// Parse command-line input: bool, then number, then string
    pub fn parse(input: &str) -> Self {
        if let Ok(b) = input.parse::<bool>() {
            EntryValue::Boolean(b)
        } else if let Ok(n) = input.parse::<f64>() {
            EntryValue::Double(n)
        } else {
            EntryValue::String(input.to_string())
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EntryValue::Boolean(_) => "boolean",
            EntryValue::Double(_) => "double",
            EntryValue::String(_) => "string",
        }
    }
}

impl std::fmt::Display for EntryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryValue::Boolean(b) => write!(f, "{}", b),
            EntryValue::Double(d) => write!(f, "{}", d),
            EntryValue::String(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: EntryValue,
    pub persistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub value: EntryValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
