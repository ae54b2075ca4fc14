//! Bounded pool for CPU-bound jobs.
//!
//! Jobs run on the blocking thread pool, gated by a semaphore so block
//! hashing never monopolizes it; completions resume the awaiting task on the
//! async executor. Errors never cross the pool boundary as panics, only as
//! values in the job's return type.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task;

/// How many CPU jobs may run at once.
pub const THREADPOOL_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Run `job` on the CPU pool and resume with its result.
    pub async fn dispatch<T, F>(&self, job: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Shutdown)?;
        task::spawn_blocking(move || {
            let out = job();
            drop(permit);
            out
        })
        .await
        .map_err(|_| DispatchError::Shutdown)
    }

    /// Stop accepting new jobs. In-flight jobs finish; queued submissions
    /// resolve to [`DispatchError::Shutdown`].
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(THREADPOOL_CONCURRENCY)
    }
}
