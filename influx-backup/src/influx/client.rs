//! HTTP client for `/query`.

use super::query::SHOW_MEASUREMENTS;
use super::response::QueryResponse;
use crate::config::RunSettings;
use crate::utils::errors::{BackupError, Result};
use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response, Url};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Authenticated client bound to one InfluxDB server.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    query_url: Url,
    username: String,
    password: String,
}

impl InfluxClient {
    pub fn new(settings: &RunSettings) -> Result<Self> {
        let query_url = settings
            .base_url
            .join("query")
            .map_err(|e| BackupError::Config(format!("invalid query URL: {}", e)))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("influx-backup/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            query_url,
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    /// GET `/query?db=<db>&q=<q>` with basic auth.
    fn request(&self, database: &str, q: &str) -> RequestBuilder {
        self.http
            .get(self.query_url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", database), ("q", q)])
    }

    /// Run a query and decode the JSON response.
    ///
    /// Transport failures surface as `Http`; a non-2xx status or an `error`
    /// field anywhere in the response surfaces as `Query`.
    pub async fn query(&self, database: &str, q: &str) -> Result<QueryResponse> {
        debug!("Query on {}: {}", database, q);

        let resp = self.request(database, q).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let parsed = serde_json::from_str::<QueryResponse>(&body);

        if !status.is_success() {
            let detail = parsed
                .ok()
                .and_then(|r| r.error().map(str::to_string))
                .unwrap_or_else(|| body.trim().to_string());
            return Err(BackupError::Query(format!("HTTP {}: {}", status, detail)));
        }

        let response = parsed?;
        if let Some(err) = response.error() {
            return Err(BackupError::Query(err.to_string()));
        }

        Ok(response)
    }

    /// List measurement names in server order.
    pub async fn show_measurements(&self, database: &str) -> Result<Vec<String>> {
        let response = self.query(database, SHOW_MEASUREMENTS).await?;
        Ok(response.first_column())
    }

    /// Run a query and stream the raw response body into `dest`.
    ///
    /// Returns the number of bytes written. The body is not inspected. `dest`
    /// must not exist yet.
    pub async fn export(&self, database: &str, q: &str, dest: &Path) -> Result<u64> {
        debug!("Export on {} into {}: {}", database, dest.display(), q);

        let resp = self.request(database, q).send().await?;
        let resp = ensure_success(resp).await?;

        // create_new: an existing file means two measurements collided.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
            .map_err(|e| BackupError::io_at(dest, e))?;

        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| BackupError::io_at(dest, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| BackupError::io_at(dest, e))?;
        file.sync_all().await.map_err(|e| BackupError::io_at(dest, e))?;

        Ok(written)
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let error_text = resp
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(BackupError::Query(format!(
        "HTTP {}: {}",
        status,
        error_text.trim()
    )))
}
