//! Sequential, failure-isolated delivery of completion notifications.
//!
//! Candidates are notified one at a time so a burst of concluded traces does
//! not become a burst of concurrent calls against the downstream API. Any
//! parallel variant needs an explicit concurrency cap to keep that guarantee.

use tracing::{debug, error, info};

use tracewatch_core::{ConclusionCandidate, CycleOutcome};

use crate::notify::CompletionNotifier;

/// Notifies each candidate exactly once per call, never retrying within it.
///
/// A failed candidate still lacks the processed marker, so the next cycle
/// detects and notifies it again.
#[derive(Debug)]
pub struct Notifier<N> {
    client: N,
}

impl<N: CompletionNotifier> Notifier<N> {
    pub fn new(client: N) -> Self {
        Self { client }
    }

    /// Notify every candidate and return the number of successful calls.
    pub async fn process(&self, candidates: &[ConclusionCandidate]) -> usize {
        self.dispatch(candidates).await.succeeded
    }

    /// Notify every candidate and return both counters.
    ///
    /// Empty input returns immediately with no calls and no logs.
    pub async fn dispatch(&self, candidates: &[ConclusionCandidate]) -> CycleOutcome {
        if candidates.is_empty() {
            return CycleOutcome::empty();
        }

        let mut outcome = CycleOutcome {
            found: candidates.len(),
            ..CycleOutcome::empty()
        };

        for ConclusionCandidate { trace_id } in candidates {
            match self.client.notify(trace_id).await {
                Ok(()) => {
                    outcome.succeeded += 1;
                    debug!(trace_id = %trace_id, "notification succeeded");
                }
                Err(err) => {
                    outcome.failed += 1;
                    error!(
                        trace_id = %trace_id,
                        error = %err,
                        "notification failed for {trace_id}: {err}"
                    );
                }
            }
        }

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "processed: {outcome}"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, candidates};
    use proptest::prelude::*;
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn empty_input_makes_no_calls() {
        let client = Arc::new(RecordingNotifier::new());
        let notifier = Notifier::new(client.clone());

        assert_eq!(notifier.process(&[]).await, 0);
        assert!(client.calls().is_empty());
        assert!(!logs_contain("processed:"));
    }

    #[tokio::test]
    #[traced_test]
    async fn middle_failure_does_not_abort_the_pass() {
        let client = Arc::new(RecordingNotifier::failing_for(&["trace-2"]));
        let notifier = Notifier::new(client.clone());

        let succeeded = notifier
            .process(&candidates(&["trace-1", "trace-2", "trace-3"]))
            .await;

        assert_eq!(succeeded, 2);
        assert_eq!(client.calls(), vec!["trace-1", "trace-2", "trace-3"]);
        assert!(logs_contain("processed: 2 succeeded, 1 failed"));
        logs_assert(|lines: &[&str]| {
            let failures: Vec<&&str> = lines
                .iter()
                .filter(|line| line.contains("notification failed"))
                .collect();
            match failures.as_slice() {
                [line] if line.contains("ERROR") && line.contains("failed for trace-2") => Ok(()),
                other => Err(format!("expected one ERROR line for trace-2, got {other:?}")),
            }
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn all_success_summary() {
        let client = Arc::new(RecordingNotifier::new());
        let notifier = Notifier::new(client.clone());

        let outcome = notifier.dispatch(&candidates(&["trace-1", "trace-2"])).await;

        assert_eq!(
            outcome,
            CycleOutcome {
                found: 2,
                succeeded: 2,
                failed: 0
            }
        );
        assert!(logs_contain("processed: 2 succeeded, 0 failed"));
    }

    #[tokio::test]
    async fn all_failures_return_zero() {
        let client = Arc::new(RecordingNotifier::failing_for(&["a", "b"]));
        let notifier = Notifier::new(client.clone());

        assert_eq!(notifier.process(&candidates(&["a", "b"])).await, 0);
        assert_eq!(client.calls().len(), 2);
    }

    proptest! {
        #[test]
        fn one_call_per_candidate_and_success_count_returned(
            outcomes in proptest::collection::vec(any::<bool>(), 0..40)
        ) {
            let names: Vec<String> = (0..outcomes.len()).map(|i| format!("t{i}")).collect();
            let failing: Vec<&str> = names
                .iter()
                .zip(&outcomes)
                .filter(|(_, ok)| !**ok)
                .map(|(n, _)| n.as_str())
                .collect();
            let client = Arc::new(RecordingNotifier::failing_for(&failing));
            let notifier = Notifier::new(client.clone());
            let batch = candidates(&names.iter().map(String::as_str).collect::<Vec<_>>());

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let succeeded = rt.block_on(notifier.process(&batch));

            prop_assert_eq!(client.calls(), names.clone());
            prop_assert_eq!(succeeded, outcomes.iter().filter(|ok| **ok).count());
            prop_assert!(succeeded <= batch.len());
        }
    }
}
