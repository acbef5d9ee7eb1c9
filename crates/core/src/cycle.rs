//! Per-cycle, ephemeral values. Nothing here is persisted.

use serde::Serialize;

use crate::id::TraceId;

/// A trace selected by one detection cycle as concluded and not yet processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConclusionCandidate {
    pub trace_id: TraceId,
}

impl ConclusionCandidate {
    pub fn new(trace_id: TraceId) -> Self {
        Self { trace_id }
    }
}

/// Counts produced once per cycle, for logging only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl CycleOutcome {
    /// Outcome of a cycle that found nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl core::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_rendering() {
        let outcome = CycleOutcome {
            found: 2,
            succeeded: 2,
            failed: 0,
        };
        assert_eq!(outcome.to_string(), "2 succeeded, 0 failed");
        assert_eq!(CycleOutcome::empty().to_string(), "0 succeeded, 0 failed");
    }
}
