//! Fakes shared by unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use tracewatch_core::{ConclusionCandidate, TraceId};

use crate::notify::{CompletionNotifier, NotifyError};

/// Records every call; fails for the configured ids.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    failing: HashSet<String>,
    calls: Mutex<Vec<TraceId>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|id| id.to_string())
            .collect()
    }
}

#[async_trait::async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, trace_id: &TraceId) -> Result<(), NotifyError> {
        self.calls.lock().unwrap().push(trace_id.clone());
        if self.failing.contains(trace_id.as_str()) {
            return Err(NotifyError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub fn candidates(raw: &[&str]) -> Vec<ConclusionCandidate> {
    raw.iter()
        .map(|s| ConclusionCandidate::new(TraceId::new(*s).unwrap()))
        .collect()
}
