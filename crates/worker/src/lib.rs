//! `tracewatch-worker`
//!
//! **Responsibility:** infer that a trace has concluded (no new activity for
//! a configured window) and notify the external API once per cycle.
//!
//! There is no completion event to subscribe to, so conclusion is detected by
//! polling. Several worker processes may run the same cycle concurrently and
//! notify the same trace; the analyze endpoint's idempotency absorbs the
//! duplicates.

pub mod client;
pub mod config;
pub mod detector;
pub mod notifier;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod testing;

pub use client::SharedClient;
pub use config::{ConfigError, WorkerConfig};
pub use detector::{ConclusionDetector, DetectionSettings, build_detection_query};
pub use notifier::Notifier;
pub use notify::{CompletionNotifier, HttpCompletionNotifier, NotifyError};
pub use orchestrator::ConclusionOrchestrator;
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle, SchedulerStats};
pub use store::{AnalyticsStore, ClickHouseStore, DetectionQuery, InMemoryAnalyticsStore, StoreError};
