//! One detection → notification cycle.
//!
//! Per cycle: `IDLE → DETECTING → (NOTHING_FOUND → IDLE) | (NOTIFYING → IDLE)`.
//! Nothing carries over between cycles.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, trace};

use tracewatch_core::{CycleId, CycleOutcome};

use crate::detector::ConclusionDetector;
use crate::notifier::Notifier;
use crate::notify::CompletionNotifier;
use crate::scheduler::panic_message;
use crate::store::AnalyticsStore;

/// Composes the detector and the notifier into the scheduler's unit of work.
#[derive(Debug)]
pub struct ConclusionOrchestrator<S, N> {
    detector: ConclusionDetector<S>,
    notifier: Notifier<N>,
}

impl<S, N> ConclusionOrchestrator<S, N>
where
    S: AnalyticsStore,
    N: CompletionNotifier,
{
    pub fn new(detector: ConclusionDetector<S>, notifier: Notifier<N>) -> Self {
        Self { detector, notifier }
    }

    /// Run one cycle and return the number of successful notifications.
    ///
    /// Never fails: anything unexpected (including a panic in a collaborator)
    /// is logged and the cycle counts as a zero-result cycle.
    pub async fn run_cycle(&self) -> usize {
        self.run_cycle_with_outcome().await.succeeded
    }

    /// Like [`run_cycle`](Self::run_cycle), but returns all counters.
    pub async fn run_cycle_with_outcome(&self) -> CycleOutcome {
        let cycle_id = CycleId::new();
        let span = info_span!("conclusion_cycle", cycle_id = %cycle_id);

        let result = AssertUnwindSafe(self.cycle().instrument(span.clone()))
            .catch_unwind()
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                let _entered = span.enter();
                error!(
                    error = %panic_message(payload.as_ref()),
                    "conclusion cycle failed unexpectedly"
                );
                CycleOutcome::empty()
            }
        }
    }

    async fn cycle(&self) -> CycleOutcome {
        trace!("cycle starting");

        let candidates = self.detector.find().await;
        if candidates.is_empty() {
            debug!("no candidates; nothing to process");
            return CycleOutcome::empty();
        }

        info!(found = candidates.len(), "found {} candidates", candidates.len());
        self.notifier.dispatch(&candidates).await
    }
}
