//! Dedicated worker threads for model inference.
//!
//! Each heavy model owns exactly one [`ModelWorker`]: a background thread
//! draining a serial job queue. All tensor work for that model runs on its
//! worker, regardless of which task submits it; the single thread is the
//! mutual-exclusion mechanism, so no lock is held around the forward pass
//! itself. Callers suspend on a oneshot channel until the worker posts the
//! result.
//!
//! No per-job timeout is enforced. A stalled call in the underlying runtime
//! blocks that model's queue indefinitely; this matches the accepted risk of
//! the field deployment.

use std::sync::Mutex;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-threaded serial executor bound to one model instance.
///
/// Closing is irreversible: after [`close`](Self::close) every submission
/// short-circuits to `None` without touching the queue.
pub struct ModelWorker {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ModelWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelWorker")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ModelWorker {
    /// Spawns the worker thread and returns a handle to its queue.
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>();
        let thread_name = format!("{}-worker", name);
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })
            .map_err(|e| error!(worker = %thread_name, "failed to spawn worker thread: {e}"))
            .ok();

        Self {
            name,
            sender: Mutex::new(handle.is_some().then_some(tx)),
            handle: Mutex::new(handle),
        }
    }

    /// Returns true once the worker has been closed.
    pub fn is_closed(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(_) => true,
        }
    }

    /// Runs a job on the worker thread and suspends until it completes.
    ///
    /// Returns `None` if the worker is closed (before or during the call).
    /// Jobs submitted from any thread are executed strictly in order.
    pub async fn run<T, F>(&self, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        // Readiness check and enqueue happen under the same lock so a
        // concurrent close cannot slip between them.
        {
            let guard = self.sender.lock().ok()?;
            let sender = guard.as_ref()?;
            let wrapped: Job = Box::new(move || {
                let _ = result_tx.send(job());
            });
            sender.send(wrapped).ok()?;
        }

        result_rx.await.ok()
    }

    /// Fire-and-forget submission, used for asynchronous model loading.
    ///
    /// Returns false if the worker is already closed.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(sender) => sender.send(Box::new(job)).is_ok(),
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Closes the worker: drains the queue, stops the thread, and makes all
    /// future submissions return `None`. Idempotent.
    pub fn close(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if sender.is_none() {
            return;
        }
        drop(sender);
        debug!(worker = %self.name, "worker queue closed");

        if let Ok(mut guard) = self.handle.lock()
            && let Some(handle) = guard.take()
            && handle.join().is_err()
        {
            error!(worker = %self.name, "worker thread panicked before join");
        }
    }
}

impl Drop for ModelWorker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jobs_run_serially_in_order() {
        let worker = ModelWorker::spawn("test");
        let mut results = Vec::new();
        for i in 0..5 {
            results.push(worker.run(move || i * 2).await);
        }
        assert_eq!(
            results,
            vec![Some(0), Some(2), Some(4), Some(6), Some(8)]
        );
    }

    #[tokio::test]
    async fn test_run_after_close_returns_none_without_hanging() {
        let worker = ModelWorker::spawn("test");
        worker.close();
        assert!(worker.is_closed());

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            worker.run(|| 42),
        )
        .await
        .expect("closed worker must not hang");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let worker = ModelWorker::spawn("test");
        worker.close();
        worker.close();
        assert!(worker.is_closed());
    }

    #[tokio::test]
    async fn test_pending_jobs_complete_before_close() {
        let worker = ModelWorker::spawn("test");
        assert!(worker.post(|| {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }));
        let result = worker.run(|| "done").await;
        worker.close();
        assert_eq!(result, Some("done"));
    }
}
