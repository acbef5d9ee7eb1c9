//! ClickHouse adapter over the HTTP interface.
//!
//! Queries are POSTed as the request body with `FORMAT JSONEachRow` appended,
//! so every response line is one `{"trace_id": "..."}` object.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::{AnalyticsStore, DetectionQuery, StoreError, TraceIdRow};

/// Connection settings for [`ClickHouseStore`].
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// Base URL of the HTTP interface, e.g. `http://localhost:8123`.
    pub url: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl ClickHouseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: None,
            user: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Analytical store backed by a ClickHouse server.
#[derive(Debug, Clone)]
pub struct ClickHouseStore {
    http: Client,
    config: ClickHouseConfig,
}

impl ClickHouseStore {
    /// Build the HTTP client. Fails only if the TLS backend cannot initialize.
    pub fn connect(config: ClickHouseConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/", self.config.url.trim_end_matches('/'))
    }
}

/// Decode a `JSONEachRow` body. Blank lines are skipped.
pub(crate) fn decode_rows(body: &str) -> Result<Vec<TraceIdRow>, StoreError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<TraceIdRow>(line)
                .map_err(|e| StoreError::Decode(format!("{e}: {line}")))
        })
        .collect()
}

#[async_trait::async_trait]
impl AnalyticsStore for ClickHouseStore {
    async fn query_trace_ids(&self, query: &DetectionQuery) -> Result<Vec<TraceIdRow>, StoreError> {
        let mut req = self
            .http
            .post(self.endpoint())
            .body(format!("{}\nFORMAT JSONEachRow", query.sql));

        if let Some(db) = &self.config.database {
            req = req.query(&[("database", db.as_str())]);
        }
        if let Some(user) = &self.config.user {
            req = req.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.config.password {
            req = req.header("X-ClickHouse-Key", password);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows = decode_rows(&body)?;
        debug!(rows = rows.len(), "clickhouse detection query returned");
        Ok(rows)
    }
}
