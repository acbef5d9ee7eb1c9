//! Traces and observations as read from the analytical store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::{ObservationId, TraceId};

/// A top-level unit of recorded activity.
///
/// A trace is only mutated by the external API (which sets the processed
/// marker); the worker treats it as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: TraceId,

    /// Creation / arrival time of the trace itself.
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: BTreeMap<String, JsonValue>,
}

impl Trace {
    pub fn new(id: TraceId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the processed marker is present (its value is irrelevant).
    pub fn is_processed(&self, marker_key: &str) -> bool {
        self.metadata.contains_key(marker_key)
    }
}

/// A timestamped sub-event belonging to exactly one trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub trace_id: TraceId,
    pub updated_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(id: ObservationId, trace_id: TraceId, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            trace_id,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn processed_marker_is_presence_only() {
        let id = TraceId::new("t").unwrap();
        let trace = Trace::new(id, Utc::now());
        assert!(!trace.is_processed("features_analyzed"));

        let trace = trace.with_metadata("features_analyzed", json!(null));
        assert!(trace.is_processed("features_analyzed"));
        assert!(!trace.is_processed("other"));
    }

    #[test]
    fn metadata_defaults_to_empty() {
        let trace: Trace =
            serde_json::from_value(json!({ "id": "t", "timestamp": "2024-01-01T00:00:00Z" }))
                .unwrap();
        assert!(trace.metadata.is_empty());
    }
}
