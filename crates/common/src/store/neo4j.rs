//! Neo4j client over the HTTP transactional endpoint
//!
//! `POST {url}/db/{database}/tx/commit` with one statement per call.

use super::{GraphStore, Row};
use crate::config::GraphStoreConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Neo4j graph store client
pub struct Neo4jStore {
    client: reqwest::Client,
    commit_url: String,
    user: Option<String>,
    password: Option<String>,
    timeout_ms: u64,
    max_retries: u32,
}

impl Neo4jStore {
    /// Create a new client from configuration
    pub fn new(config: &GraphStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create graph store HTTP client: {}", e),
            })?;

        let commit_url = format!(
            "{}/db/{}/tx/commit",
            config.url.trim_end_matches('/'),
            config.database
        );

        Ok(Self {
            client,
            commit_url,
            user: config.user.clone(),
            password: config.password.clone(),
            timeout_ms: config.timeout_ms,
            max_retries: config.max_retries,
        })
    }

    /// Retry transport failures with exponential backoff; query errors
    /// reported by the server are returned immediately.
    async fn request_with_retry(&self, query: &str) -> Result<Vec<Row>> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(query).await {
                Ok(rows) => return Ok(rows),
                Err(AppError::HttpClient(e)) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Graph store request failed, retrying"
                    );
                    last_error = Some(if e.is_timeout() {
                        AppError::GraphStoreTimeout {
                            timeout_ms: self.timeout_ms,
                        }
                    } else {
                        AppError::HttpClient(e)
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::GraphStore {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, query: &str) -> Result<Vec<Row>> {
        let body = CommitRequest {
            statements: vec![Statement { statement: query }],
        };

        let mut request = self.client.post(&self.commit_url).json(&body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GraphStore {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let parsed: CommitResponse = response.json().await?;
        rows_from_response(parsed)
    }
}

/// Zip column names with row values; any server-side error fails the call
fn rows_from_response(response: CommitResponse) -> Result<Vec<Row>> {
    if let Some(err) = response.errors.first() {
        return Err(AppError::GraphStore {
            message: format!("{}: {}", err.code, err.message),
        });
    }

    let mut rows = Vec::new();
    for result in response.results {
        for data in result.data {
            let row: Row = result
                .columns
                .iter()
                .cloned()
                .zip(data.row)
                .collect();
            rows.push(row);
        }
    }
    Ok(rows)
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn execute(&self, query: &str) -> Result<Vec<Row>> {
        self.request_with_retry(query).await
    }

    fn backend(&self) -> &str {
        "neo4j"
    }
}
