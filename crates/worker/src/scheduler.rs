//! Restart-safe recurring task runner.
//!
//! Domain-agnostic: it knows a callback and an interval, nothing else.
//!
//! - The first invocation fires immediately on `start`.
//! - Each following invocation starts `interval` after the previous one
//!   *ends* (not wall-clock aligned), so invocations never overlap and a slow
//!   cycle lowers the frequency instead of queueing work.
//! - Errors and panics from the task are logged and count as a completed
//!   cycle; the loop keeps going.
//! - `stop` is cooperative: an in-flight invocation finishes, no new one
//!   begins.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler {0} is already running")]
    AlreadyRunning(String),

    #[error("scheduler interval must be greater than zero")]
    ZeroInterval,
}

/// Counters since the handle's run started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub cycles_started: u64,
    pub cycles_failed: u64,
}

#[derive(Debug, Default)]
struct Control {
    stop_requested: AtomicBool,
    stop: Notify,
    in_flight: AtomicBool,
    cycles_started: AtomicU64,
    cycles_failed: AtomicU64,
}

/// Fixed-interval, non-overlapping runner for one task.
#[derive(Debug)]
pub struct Scheduler {
    name: String,
    interval: Duration,
    active: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run started by this scheduler is still looping.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Fails if a previous run has not fully stopped yet; once it has, the
    /// same scheduler can be started again. Dropping the returned handle
    /// detaches the loop.
    pub fn start<F, Fut, E>(&self, mut task: F) -> Result<SchedulerHandle, SchedulerError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if self.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning(self.name.clone()));
        }

        let control = Arc::new(Control::default());
        let guard = ActiveGuard(self.active.clone());
        let name = self.name.clone();
        let interval = self.interval;
        let loop_control = control.clone();

        let span = info_span!("scheduler", scheduler = %name);
        let join = tokio::spawn(
            async move {
                let _guard = guard;
                run_loop(&name, interval, &mut task, &loop_control).await;
            }
            .instrument(span),
        );

        Ok(SchedulerHandle {
            control,
            join: Some(join),
        })
    }
}

/// Resets the scheduler's active flag however the loop task ends.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_loop<F, Fut, E>(name: &str, interval: Duration, task: &mut F, control: &Control)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    info!(
        scheduler = name,
        interval_ms = interval.as_millis() as u64,
        "scheduler started"
    );

    loop {
        if control.stop_requested.load(Ordering::Acquire) {
            break;
        }

        control.in_flight.store(true, Ordering::Release);
        control.cycles_started.fetch_add(1, Ordering::Relaxed);

        {
            let result = AssertUnwindSafe(async { task().await })
                .catch_unwind()
                .await;

            control.in_flight.store(false, Ordering::Release);

            match result {
                Ok(Ok(())) => debug!(scheduler = name, "scheduled task completed"),
                Ok(Err(err)) => {
                    control.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    error!(scheduler = name, error = %err, "scheduled task failed");
                }
                Err(payload) => {
                    control.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        scheduler = name,
                        error = %panic_message(payload.as_ref()),
                        "scheduled task panicked"
                    );
                }
            }
        }

        tokio::select! {
            _ = control.stop.notified() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(scheduler = name, "scheduler stopped");
}

/// Handle to stop and join a running scheduler loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    control: Arc<Control>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request graceful stop without waiting.
    pub fn stop(&self) {
        self.control.stop_requested.store(true, Ordering::Release);
        // notify_one stores a permit, so a stop issued mid-invocation is
        // observed as soon as the invocation returns.
        self.control.stop.notify_one();
    }

    /// Request graceful stop and wait for the in-flight invocation (if any)
    /// and the loop to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                error!(error = %err, "scheduler loop ended abnormally");
            }
        }
    }

    /// Whether an invocation is running right now.
    pub fn is_in_flight(&self) -> bool {
        self.control.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_started: self.control.cycles_started.load(Ordering::Relaxed),
            cycles_failed: self.control.cycles_failed.load(Ordering::Relaxed),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
