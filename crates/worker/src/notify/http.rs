use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use tracewatch_core::TraceId;

use super::{CompletionNotifier, NotifyError};

/// Path of the analyze endpoint, relative to the API base URL.
pub const ANALYZE_PATH: &str = "/api/features/analyze";

#[derive(Debug, Clone)]
pub struct HttpNotifierConfig {
    pub base_url: String,
    /// Sent as `Authorization: Bearer <key>` when set.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl HttpNotifierConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    trace_id: &'a TraceId,
}

/// `POST <base>/api/features/analyze` with `{"trace_id": ...}`.
///
/// Any non-2xx status or transport error is a failure.
#[derive(Debug, Clone)]
pub struct HttpCompletionNotifier {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpCompletionNotifier {
    pub fn new(config: HttpNotifierConfig) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: analyze_url(&config.base_url),
            api_key: config.api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn analyze_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), ANALYZE_PATH)
}

#[async_trait::async_trait]
impl CompletionNotifier for HttpCompletionNotifier {
    async fn notify(&self, trace_id: &TraceId) -> Result<(), NotifyError> {
        let mut req = self.http.post(&self.url).json(&AnalyzeRequest { trace_id });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
