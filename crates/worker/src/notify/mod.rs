//! Completion-notification boundary.
//!
//! The receiving API performs the "mark processed" mutation and must be
//! idempotent: the same trace may be notified by several cycles or several
//! worker processes.

pub mod http;

use thiserror::Error;

use tracewatch_core::TraceId;

pub use http::{ANALYZE_PATH, HttpCompletionNotifier, HttpNotifierConfig};

/// A single notification attempt failed.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Tells the external API that a trace has concluded.
#[async_trait::async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, trace_id: &TraceId) -> Result<(), NotifyError>;
}

#[async_trait::async_trait]
impl<T> CompletionNotifier for std::sync::Arc<T>
where
    T: CompletionNotifier + ?Sized,
{
    async fn notify(&self, trace_id: &TraceId) -> Result<(), NotifyError> {
        (**self).notify(trace_id).await
    }
}
