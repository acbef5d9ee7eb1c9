//! `tracewatch-core` — data model for trace conclusion detection.
//!
//! This crate contains **pure** types and rules (no I/O). Traces and
//! observations are owned by the analytical store; the worker only reads
//! aggregates of them and never writes a trace directly.

pub mod cycle;
pub mod eligibility;
pub mod error;
pub mod id;
pub mod trace;

pub use cycle::{ConclusionCandidate, CycleOutcome};
pub use eligibility::is_candidate;
pub use error::CoreError;
pub use id::{CycleId, ObservationId, TraceId};
pub use trace::{Observation, Trace};
