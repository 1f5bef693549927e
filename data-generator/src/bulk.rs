//! Bulk-ingestion client for the cluster's `_bulk` endpoint.
//!
//! Ingestion retries transient failures (429 and 5xx responses, connection
//! errors) a bounded number of times with backoff. This is the only place in
//! the workspace that retries anything: the load-test driver records failures
//! as observations instead.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const MAX_ATTEMPTS: usize = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("bulk request to {url} failed with status {status}: {snippet}")]
    Http {
        url: String,
        status: StatusCode,
        snippet: String,
    },

    #[error("bulk request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    #[error("bulk response reported item failures: {first_error}")]
    ItemsRejected { first_error: String },

    #[error("failed to read document file {path:?}")]
    DocumentFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// HTTP client for `_bulk` ingestion and small index maintenance calls.
#[derive(Clone)]
pub struct BulkClient {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Option<(String, String)>,
}

impl BulkClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        credentials: Option<(String, String)>,
    ) -> Self {
        Self {
            client,
            endpoint,
            credentials,
        }
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    /// Renders the NDJSON `_bulk` body for `docs`: alternating action and
    /// document lines, terminated by a newline.
    pub fn bulk_body(index: &str, docs: &[Value]) -> String {
        let mut body = String::new();
        for doc in docs {
            body.push_str(&format!("{{\"index\":{{\"_index\":\"{index}\"}}}}\n"));
            body.push_str(&doc.to_string());
            body.push('\n');
        }
        body
    }

    /// Indexes one batch of documents, retrying transient failures.
    pub async fn bulk_index(&self, index: &str, docs: &[Value]) -> Result<(), IngestError> {
        let url = self.endpoint.join("/_bulk?refresh=false")?;
        let body = Self::bulk_body(index, docs);

        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF_BASE * (1 << (attempt - 1)) as u32).await;
            }

            let response = self
                .post(url.clone())
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(body.clone())
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    debug!(attempt, error = %e, "bulk request error");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                debug!(attempt, %status, "bulk request throttled or failed upstream");
                last_error = format!("status {status}");
                continue;
            }

            if !status.is_success() {
                let snippet: String = response.text().await.unwrap_or_default().chars().take(200).collect();
                return Err(IngestError::Http {
                    url: url.to_string(),
                    status,
                    snippet,
                });
            }

            let result: Value = response.json().await?;
            if result["errors"].as_bool().unwrap_or(false) {
                let first_error = first_item_error(&result)
                    .unwrap_or_else(|| "unknown item error".to_owned());
                return Err(IngestError::ItemsRejected { first_error });
            }

            return Ok(());
        }

        Err(IngestError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    /// Makes the index's documents visible to search.
    pub async fn refresh(&self, index: &str) -> Result<(), IngestError> {
        let url = self.endpoint.join(&format!("/{index}/_refresh"))?;
        self.post(url).send().await?.error_for_status()?;
        Ok(())
    }

    /// Document count of `index`.
    pub async fn doc_count(&self, index: &str) -> Result<u64, IngestError> {
        let url = self.endpoint.join(&format!("/{index}/_count"))?;
        let builder = self.client.get(url);
        let builder = match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        };
        let result: Value = builder.send().await?.error_for_status()?.json().await?;
        Ok(result["count"].as_u64().unwrap_or(0))
    }
}

fn first_item_error(result: &Value) -> Option<String> {
    let items = result["items"].as_array()?;
    for item in items {
        let error = &item["index"]["error"];
        if !error.is_null() {
            warn!(%error, "bulk item rejected");
            return Some(error.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bulk_body_alternates_action_and_document_lines() {
        let docs = vec![json!({"a": 1}), json!({"b": 2})];
        let body = BulkClient::bulk_body("vpc_flow_logs", &docs);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"index":{"_index":"vpc_flow_logs"}}"#,
                r#"{"a":1}"#,
                r#"{"index":{"_index":"vpc_flow_logs"}}"#,
                r#"{"b":2}"#,
            ]
        );
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn bulk_body_of_no_documents_is_empty() {
        assert_eq!(BulkClient::bulk_body("idx", &[]), "");
    }
}
