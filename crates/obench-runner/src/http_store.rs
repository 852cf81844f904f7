//! `ResultStore` backed by a running obench-api server.

use std::time::Duration;

use async_trait::async_trait;
use obench_db::{HEADERS, ResultLogRow, ResultStore, StoreError, parse_rows};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Talks to the results endpoints of an obench-api server.
///
/// Every request names the same results file through the `file` query parameter.
#[derive(Debug, Clone)]
pub struct HttpResultStore {
    client: reqwest::Client,
    base_url: String,
    file: Option<String>,
}

#[derive(Serialize)]
struct AppendRequest {
    entries: Vec<Map<String, Value>>,
}

impl HttpResultStore {
    /// `file` must already be a valid results file name; `None` uses the server default.
    pub fn new(
        base_url: impl Into<String>,
        file: Option<String>,
        timeout: Duration,
    ) -> obench_db::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::remote_with_source("Failed to build HTTP client", e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            file,
        })
    }

    fn url(&self, path: &str) -> String {
        match &self.file {
            Some(file) => format!("{}{path}?file={file}", self.base_url),
            None => format!("{}{path}", self.base_url),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> obench_db::Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::remote_with_source(format!("Request to {url} failed"), e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::remote(format!("{url} returned {status}: {}", body.trim())))
    }
}

/// A row as the append endpoint expects it: one string per header.
fn entry_for(row: &ResultLogRow) -> Map<String, Value> {
    HEADERS
        .iter()
        .zip(row.to_record())
        .map(|(header, value)| (header.to_string(), Value::String(value)))
        .collect()
}

#[async_trait]
impl ResultStore for HttpResultStore {
    #[instrument(skip(self, rows), fields(url = %self.base_url, rows = rows.len()))]
    async fn append_rows(&self, rows: &[ResultLogRow]) -> obench_db::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let url = self.url("/api/results");
        let body = AppendRequest {
            entries: rows.iter().map(entry_for).collect(),
        };
        self.send(self.client.post(&url).json(&body), &url).await?;
        debug!(rows = rows.len(), "Appended rows to remote store");
        Ok(rows.len())
    }

    async fn read_all_rows(&self) -> obench_db::Result<Vec<ResultLogRow>> {
        let url = self.url("/api/results.csv");
        let response = self.send(self.client.get(&url), &url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::remote_with_source(format!("Failed to read {url}"), e))?;
        parse_rows(bytes.as_ref()).map_err(|e| StoreError::csv(url, e))
    }

    async fn clear(&self) -> obench_db::Result<()> {
        let url = self.url("/api/clear");
        self.send(self.client.post(&url), &url).await?;
        Ok(())
    }

    fn location(&self) -> String {
        self.url("/api/results")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_uses_header_names() {
        let row = ResultLogRow {
            model: "llama3:8b".into(),
            test_id: "add".into(),
            score: Some(8),
            ..ResultLogRow::default()
        };
        let entry = entry_for(&row);
        assert_eq!(entry.len(), HEADERS.len());
        assert_eq!(entry["model"], "llama3:8b");
        assert_eq!(entry["score"], "8");
        assert_eq!(entry["error"], "");
    }

    #[test]
    fn test_url_carries_file() {
        let store = HttpResultStore::new(
            "http://localhost:4567/",
            Some("results-ci.csv".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            store.location(),
            "http://localhost:4567/api/results?file=results-ci.csv"
        );
    }
}
