//! Analytical store boundary.
//!
//! The detector only needs one read: "which trace ids satisfy the conclusion
//! rule right now". Backends receive both the dialect text and the structured
//! parameters so a real store can execute the SQL while the in-memory store
//! evaluates the same rule natively.

pub mod clickhouse;
pub mod in_memory;

use serde::Deserialize;
use thiserror::Error;

use tracewatch_core::TraceId;

pub use clickhouse::{ClickHouseConfig, ClickHouseStore};
pub use in_memory::InMemoryAnalyticsStore;

/// A parameterized detection query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionQuery {
    /// Query text in the store's dialect.
    pub sql: String,
    /// Inactivity window in seconds.
    pub threshold_secs: u64,
    /// Maximum number of rows to return.
    pub limit: usize,
    /// Metadata key whose presence marks a trace as processed.
    pub processed_marker: String,
}

/// One result row: `{ "trace_id": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceIdRow {
    pub trace_id: TraceId,
}

/// Analytical store operation error.
///
/// Every variant is recoverable from the detector's point of view: a failed
/// query means "nothing concluded this cycle".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("query timed out: {0}")]
    Timeout(String),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Read-only query interface of the analytical store.
#[async_trait::async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Execute a detection query and return its rows.
    ///
    /// Implementations must honor `query.limit` and return distinct ids.
    async fn query_trace_ids(&self, query: &DetectionQuery) -> Result<Vec<TraceIdRow>, StoreError>;
}

#[async_trait::async_trait]
impl<T> AnalyticsStore for std::sync::Arc<T>
where
    T: AnalyticsStore + ?Sized,
{
    async fn query_trace_ids(&self, query: &DetectionQuery) -> Result<Vec<TraceIdRow>, StoreError> {
        (**self).query_trace_ids(query).await
    }
}
