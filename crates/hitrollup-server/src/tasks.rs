use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

/// A failed background task, reported on the pool's error channel.
#[derive(Debug)]
pub struct TaskError {
    pub name: String,
    pub error: anyhow::Error,
}

/// Bounded pool for fire-and-forget side tasks.
///
/// At most `workers` tasks run at once; the rest wait on the semaphore.
/// Failures are not propagated to the caller that spawned the task; they are
/// sent on the channel returned by [`TaskPool::take_errors`].
pub struct TaskPool {
    semaphore: Arc<Semaphore>,
    in_flight: Mutex<JoinSet<()>>,
    errors_tx: mpsc::UnboundedSender<TaskError>,
    errors_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskError>>>,
}

impl TaskPool {
    pub fn new(workers: usize) -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            in_flight: Mutex::new(JoinSet::new()),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The receiving end of the error channel. Only the first call gets it.
    pub fn take_errors(&self) -> Option<mpsc::UnboundedReceiver<TaskError>> {
        self.errors_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let semaphore = Arc::clone(&self.semaphore);
        let errors = self.errors_tx.clone();

        let mut in_flight = self.in_flight();
        // Reap finished tasks so the set does not grow without bound.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(task = %name, error = %e, "Task pool semaphore closed");
                    return;
                }
            };
            if let Err(error) = task.await {
                // Nobody listening is fine; the task already finished.
                let _ = errors.send(TaskError { name, error });
            }
        });
    }

    /// Number of spawned tasks that have not been reaped yet.
    pub fn pending(&self) -> usize {
        self.in_flight().len()
    }

    /// Wait for every task spawned so far to finish.
    pub async fn wait(&self) {
        let mut set = std::mem::take(&mut *self.in_flight());
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Background task panicked or was cancelled");
            }
        }
    }
}
