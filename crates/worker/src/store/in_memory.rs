use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

use tracewatch_core::{Observation, Trace, TraceId, is_candidate};

use super::{AnalyticsStore, DetectionQuery, StoreError, TraceIdRow};

/// In-memory analytical store.
///
/// Intended for tests/dev. Evaluates the structured query parameters with the
/// core eligibility rule; the SQL text is recorded but not parsed.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsStore {
    traces: RwLock<BTreeMap<TraceId, Trace>>,
    observations: RwLock<HashMap<TraceId, Vec<Observation>>>,
    fixed_now: Option<DateTime<Utc>>,
    fail_next: Mutex<Option<StoreError>>,
    queries: Mutex<Vec<DetectionQuery>>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate queries against a fixed clock instead of `Utc::now()`.
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    /// Insert or replace a trace.
    pub fn upsert_trace(&self, trace: Trace) -> Result<(), StoreError> {
        let mut traces = self.traces.write().map_err(|_| poisoned())?;
        traces.insert(trace.id.clone(), trace);
        Ok(())
    }

    pub fn add_observation(&self, observation: Observation) -> Result<(), StoreError> {
        let mut observations = self.observations.write().map_err(|_| poisoned())?;
        observations
            .entry(observation.trace_id.clone())
            .or_default()
            .push(observation);
        Ok(())
    }

    /// Set a metadata key on a stored trace (what the external API does).
    /// Returns `false` if the trace is unknown.
    pub fn mark(&self, trace_id: &TraceId, marker_key: &str) -> Result<bool, StoreError> {
        let mut traces = self.traces.write().map_err(|_| poisoned())?;
        let Some(trace) = traces.get_mut(trace_id) else {
            return Ok(false);
        };
        trace
            .metadata
            .insert(marker_key.to_string(), serde_json::Value::Bool(true));
        Ok(true)
    }

    /// Make the next query fail with `err`.
    pub fn fail_next(&self, err: StoreError) -> Result<(), StoreError> {
        *self.fail_next.lock().map_err(|_| poisoned())? = Some(err);
        Ok(())
    }

    /// Queries received so far, oldest first.
    pub fn queries(&self) -> Vec<DetectionQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn query_trace_ids(&self, query: &DetectionQuery) -> Result<Vec<TraceIdRow>, StoreError> {
        self.queries.lock().map_err(|_| poisoned())?.push(query.clone());

        let injected = self.fail_next.lock().map_err(|_| poisoned())?.take();
        if let Some(err) = injected {
            return Err(err);
        }

        let now = self.fixed_now.unwrap_or_else(Utc::now);
        let threshold = i64::try_from(query.threshold_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);

        let traces = self.traces.read().map_err(|_| poisoned())?;
        let observations = self.observations.read().map_err(|_| poisoned())?;

        let rows = traces
            .values()
            .filter(|trace| {
                let obs = observations.get(&trace.id).map(Vec::as_slice).unwrap_or(&[]);
                is_candidate(trace, obs, now, threshold, &query.processed_marker)
            })
            .take(query.limit)
            .map(|trace| TraceIdRow {
                trace_id: trace.id.clone(),
            })
            .collect();

        Ok(rows)
    }
}

fn poisoned() -> StoreError {
    StoreError::Transport("lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewatch_core::ObservationId;

    const MARKER: &str = "features_analyzed";

    fn query(threshold_secs: u64, limit: usize) -> DetectionQuery {
        DetectionQuery {
            sql: "SELECT 1".to_string(),
            threshold_secs,
            limit,
            processed_marker: MARKER.to_string(),
        }
    }

    fn seed(store: &InMemoryAnalyticsStore, id: &str, trace_age: i64, obs_age: i64, now: DateTime<Utc>) {
        let trace_id = TraceId::new(id).unwrap();
        store
            .upsert_trace(Trace::new(trace_id.clone(), now - Duration::seconds(trace_age)))
            .unwrap();
        store
            .add_observation(Observation::new(
                ObservationId::new(format!("{id}-obs")).unwrap(),
                trace_id,
                now - Duration::seconds(obs_age),
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn returns_only_concluded_unprocessed_traces() {
        let now = Utc::now();
        let store = InMemoryAnalyticsStore::new().with_fixed_now(now);
        seed(&store, "quiet", 300, 120, now);
        seed(&store, "active", 300, 5, now);
        seed(&store, "fresh", 10, 100, now);
        seed(&store, "done", 300, 120, now);
        assert!(store.mark(&TraceId::new("done").unwrap(), MARKER).unwrap());
        assert!(!store.mark(&TraceId::new("missing").unwrap(), MARKER).unwrap());

        let rows = store.query_trace_ids(&query(60, 1000)).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["quiet"]);
    }

    #[tokio::test]
    async fn honors_limit() {
        let now = Utc::now();
        let store = InMemoryAnalyticsStore::new().with_fixed_now(now);
        for i in 0..5 {
            seed(&store, &format!("t{i}"), 300, 120, now);
        }

        let rows = store.query_trace_ids(&query(60, 3)).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = InMemoryAnalyticsStore::new();
        store.fail_next(StoreError::Timeout("slow".to_string())).unwrap();

        assert!(matches!(
            store.query_trace_ids(&query(60, 10)).await,
            Err(StoreError::Timeout(_))
        ));
        assert!(store.query_trace_ids(&query(60, 10)).await.unwrap().is_empty());
        assert_eq!(store.queries().len(), 2);
    }

    #[tokio::test]
    async fn poisoned_lock_is_reported_not_swallowed() {
        let now = Utc::now();
        let store = InMemoryAnalyticsStore::new().with_fixed_now(now);
        let died: Result<(), _> = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.traces.write().unwrap();
            panic!("writer died")
        }));
        assert!(died.is_err());

        let trace = Trace::new(TraceId::new("t1").unwrap(), now);
        assert!(matches!(store.upsert_trace(trace), Err(StoreError::Transport(_))));
        assert!(store.mark(&TraceId::new("t1").unwrap(), MARKER).is_err());
        assert!(store.query_trace_ids(&query(60, 10)).await.is_err());
    }
}
