//! Conclusion detection: "no activity for N seconds" → candidate trace ids.
//!
//! Conclusion is inferred by re-evaluating a predicate over durable storage on
//! every cycle; there are no per-trace timers. A trace may therefore be
//! returned by several cycles (or several worker processes) until the
//! external API marks it processed.

use std::collections::HashSet;

use tracing::{debug, error};

use tracewatch_core::{ConclusionCandidate, TraceId};

use crate::store::{AnalyticsStore, DetectionQuery};

/// Default inactivity window.
pub const DEFAULT_THRESHOLD_SECS: u64 = 60;

/// Default cap on candidates per cycle.
pub const DEFAULT_BATCH_LIMIT: usize = 1000;

/// Default metadata key set by the analyze endpoint.
pub const DEFAULT_PROCESSED_MARKER: &str = "features_analyzed";

/// Parameters of the detection rule, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSettings {
    pub threshold_secs: u64,
    pub batch_limit: usize,
    /// Must match `[A-Za-z0-9_.-]+`; it is embedded in query text.
    pub processed_marker: String,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold_secs: DEFAULT_THRESHOLD_SECS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            processed_marker: DEFAULT_PROCESSED_MARKER.to_string(),
        }
    }
}

/// Build the detection query.
///
/// Per trace, take the newest observation update; keep traces whose newest
/// update and own timestamp are both older than the window and whose metadata
/// lacks the marker. Order is unspecified.
pub fn build_detection_query(settings: &DetectionSettings) -> DetectionQuery {
    let threshold = settings.threshold_secs;
    let limit = settings.batch_limit;
    let marker = &settings.processed_marker;

    let sql = format!(
        "SELECT DISTINCT t.id AS trace_id \
         FROM traces AS t FINAL \
         INNER JOIN ( \
             SELECT trace_id, max(updated_at) AS last_update \
             FROM observations \
             GROUP BY trace_id \
             HAVING last_update < now() - INTERVAL {threshold} SECOND \
         ) AS o ON t.id = o.trace_id \
         WHERE t.timestamp < now() - INTERVAL {threshold} SECOND \
         AND NOT mapContains(t.metadata, '{marker}') \
         LIMIT {limit}"
    );

    DetectionQuery {
        sql,
        threshold_secs: threshold,
        limit,
        processed_marker: marker.clone(),
    }
}

/// Finds traces that have gone quiet.
#[derive(Debug)]
pub struct ConclusionDetector<S> {
    store: S,
    query: DetectionQuery,
}

impl<S: AnalyticsStore> ConclusionDetector<S> {
    pub fn new(store: S, settings: &DetectionSettings) -> Self {
        Self {
            store,
            query: build_detection_query(settings),
        }
    }

    /// Return distinct candidates, at most `batch_limit` of them.
    ///
    /// A failed query is logged and reported as "nothing concluded"; the next
    /// scheduled cycle is the retry.
    pub async fn find(&self) -> Vec<ConclusionCandidate> {
        let rows = match self.store.query_trace_ids(&self.query).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "detection query failed: {err}");
                return Vec::new();
            }
        };

        let mut seen: HashSet<TraceId> = HashSet::with_capacity(rows.len());
        let candidates: Vec<ConclusionCandidate> = rows
            .into_iter()
            .map(|row| row.trace_id)
            .filter(|id| seen.insert(id.clone()))
            .take(self.query.limit)
            .map(ConclusionCandidate::new)
            .collect();

        debug!(found = candidates.len(), "detection query completed");
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAnalyticsStore, StoreError, TraceIdRow};
    use chrono::{Duration, Utc};
    use tracewatch_core::{Observation, ObservationId, Trace};
    use tracing_test::traced_test;

    #[test]
    fn query_embeds_threshold_and_limit_verbatim() {
        let q = build_detection_query(&DetectionSettings::default());
        assert!(q.sql.contains("INTERVAL 60 SECOND"));
        assert!(q.sql.contains("LIMIT 1000"));
        assert!(q.sql.contains("mapContains(t.metadata, 'features_analyzed')"));
        assert_eq!(q.threshold_secs, 60);
        assert_eq!(q.limit, 1000);
    }

    #[test]
    fn query_follows_custom_settings() {
        let q = build_detection_query(&DetectionSettings {
            threshold_secs: 300,
            batch_limit: 25,
            processed_marker: "done".to_string(),
        });
        assert!(q.sql.contains("INTERVAL 300 SECOND"));
        assert!(q.sql.contains("LIMIT 25"));
        assert!(q.sql.contains("'done'"));
        assert!(!q.sql.contains("INTERVAL 60 SECOND"));
    }

    #[test]
    fn query_has_required_primitives() {
        let sql = build_detection_query(&DetectionSettings::default()).sql;
        assert!(sql.contains("max(updated_at)"));
        assert!(sql.contains("GROUP BY trace_id"));
        assert!(sql.contains("INNER JOIN"));
        assert!(sql.contains("t.timestamp < now() - INTERVAL"));
    }

    #[tokio::test]
    async fn finds_quiet_traces_from_store() {
        let now = Utc::now();
        let store = InMemoryAnalyticsStore::new().with_fixed_now(now);
        for (id, obs_age) in [("quiet", 120), ("busy", 1)] {
            let trace_id = TraceId::new(id).unwrap();
            store
                .upsert_trace(Trace::new(trace_id.clone(), now - Duration::seconds(600)))
                .unwrap();
            store
                .add_observation(Observation::new(
                    ObservationId::new(format!("{id}-o")).unwrap(),
                    trace_id,
                    now - Duration::seconds(obs_age),
                ))
                .unwrap();
        }

        let detector = ConclusionDetector::new(store, &DetectionSettings::default());
        let found = detector.find().await;
        assert_eq!(
            found,
            vec![ConclusionCandidate::new(TraceId::new("quiet").unwrap())]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn query_failure_yields_empty_and_logs() {
        let store = InMemoryAnalyticsStore::new();
        store
            .fail_next(StoreError::Transport("connection refused".to_string()))
            .unwrap();

        let detector = ConclusionDetector::new(store, &DetectionSettings::default());
        assert!(detector.find().await.is_empty());
        assert!(logs_contain("detection query failed"));
        assert!(logs_contain("connection refused"));
    }

    struct DuplicatingStore;

    #[async_trait::async_trait]
    impl AnalyticsStore for DuplicatingStore {
        async fn query_trace_ids(
            &self,
            _query: &DetectionQuery,
        ) -> Result<Vec<TraceIdRow>, StoreError> {
            let row = |id: &str| TraceIdRow {
                trace_id: TraceId::new(id).unwrap(),
            };
            Ok(vec![row("a"), row("b"), row("a"), row("c"), row("d")])
        }
    }

    #[tokio::test]
    async fn dedupes_and_caps_even_if_store_does_not() {
        let detector = ConclusionDetector::new(
            DuplicatingStore,
            &DetectionSettings {
                batch_limit: 3,
                ..Default::default()
            },
        );
        let found: Vec<_> = detector
            .find()
            .await
            .into_iter()
            .map(|candidate| candidate.trace_id.into_inner())
            .collect();
        assert_eq!(found, vec!["a", "b", "c"]);
    }
}
