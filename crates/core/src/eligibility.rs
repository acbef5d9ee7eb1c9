//! The conclusion rule, stated over in-memory values.
//!
//! Real deployments evaluate this rule inside the analytical store (see the
//! worker's detection query). This function is the same rule for the
//! in-memory store and for tests.

use chrono::{DateTime, Duration, Utc};

use crate::trace::{Observation, Trace};

/// Whether `trace` is a conclusion candidate at `now`.
///
/// A trace qualifies iff it has at least one observation, the newest
/// observation update is strictly older than `now - threshold`, the trace's
/// own timestamp is strictly older than the same cutoff, and the processed
/// marker is absent. Observations belonging to other traces are ignored.
pub fn is_candidate<'a, I>(
    trace: &Trace,
    observations: I,
    now: DateTime<Utc>,
    threshold: Duration,
    marker_key: &str,
) -> bool
where
    I: IntoIterator<Item = &'a Observation>,
{
    if trace.is_processed(marker_key) {
        return false;
    }

    // A window reaching before the representable range excludes everything.
    let Some(cutoff) = now.checked_sub_signed(threshold) else {
        return false;
    };
    if trace.timestamp >= cutoff {
        return false;
    }

    let last_update = observations
        .into_iter()
        .filter(|o| o.trace_id == trace.id)
        .map(|o| o.updated_at)
        .max();

    match last_update {
        Some(last) => last < cutoff,
        None => false,
    }
}
