//! Lazily-constructed, process-wide client with an explicit lifecycle.
//!
//! Passed to collaborators at construction instead of living in a global, so
//! tests can hand in a fake or a pre-built instance.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

/// Holds at most one `T`, built on first use.
///
/// Concurrent first uses wait on the same construction; a failed construction
/// is not cached, so the next use tries again.
#[derive(Debug)]
pub struct SharedClient<T> {
    name: &'static str,
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> SharedClient<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Wrap an already-built instance.
    pub fn from_instance(name: &'static str, instance: T) -> Self {
        Self {
            name,
            slot: Mutex::new(Some(Arc::new(instance))),
        }
    }

    /// Return the instance, constructing it with `init` if there is none.
    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let instance = Arc::new(init().await?);
        debug!(client = self.name, "shared client constructed");
        *slot = Some(instance.clone());
        Ok(instance)
    }

    /// The instance, if constructed.
    pub async fn get(&self) -> Option<Arc<T>> {
        self.slot.lock().await.clone()
    }

    /// Drop the held instance. Clones handed out earlier stay valid until
    /// their holders drop them; the next use constructs a fresh instance.
    pub async fn teardown(&self) -> bool {
        let had = self.slot.lock().await.take().is_some();
        if had {
            debug!(client = self.name, "shared client torn down");
        }
        had
    }
}
