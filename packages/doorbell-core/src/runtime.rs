//! Task spawning abstraction for runtime independence.
//!
//! Mirrors the teacher crate's `TaskSpawner`: background components (the
//! recorder flush loop, the reaper sweep, the heartbeat ticker, the live
//! streamer's sender) never call `tokio::spawn` directly. They go through
//! this trait so the composition root stays the only place that knows which
//! runtime is in use.

use std::future::Future;

/// Abstraction for spawning background tasks.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task that runs independently of the
    /// caller until completion or cancellation.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner; the only implementation the firmware binary needs.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new spawner bound to the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a spawner using the current runtime's handle.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_spawner_executes_task() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        spawner.spawn(async move {
            executed_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(executed.load(Ordering::SeqCst));
    }
}
