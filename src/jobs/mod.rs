//! Background job pool with poll-based completion.
//!
//! The engine never blocks the render thread: decode work is shipped to a
//! shared background pool and its completion is observed by polling a
//! [`Worker`] handle once per frame. Background jobs never touch cache or
//! survey state; they write only into their own result record, which the
//! foreground thread collects at the `Pending -> Done` transition.
//!
//! Cancellation is not supported; a dispatched job always runs to
//! completion. The tile that owns a worker stays pinned in the cache (via
//! the eviction veto) until the worker has been polled to completion.

use std::io;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Result of polling a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoll {
    /// The job has not finished yet; poll again next frame.
    Pending,
    /// The job has completed. Subsequent polls keep returning `Done`.
    Done,
}

/// Handle to a single-shot background job.
///
/// Obtained from [`JobPool::spawn`]. `poll` is safe to call repeatedly
/// and is idempotent once the job has completed.
pub struct Worker<T> {
    state: WorkerState<T>,
}

enum WorkerState<T> {
    Pending(oneshot::Receiver<T>),
    Done(Option<T>),
}

impl<T> Worker<T> {
    /// Check whether the job has completed, without blocking.
    pub fn poll(&mut self) -> WorkerPoll {
        match &mut self.state {
            WorkerState::Done(_) => WorkerPoll::Done,
            WorkerState::Pending(rx) => match rx.try_recv() {
                Ok(value) => {
                    self.state = WorkerState::Done(Some(value));
                    WorkerPoll::Done
                }
                Err(TryRecvError::Empty) => WorkerPoll::Pending,
                Err(TryRecvError::Closed) => {
                    // The job died without producing a value.
                    self.state = WorkerState::Done(None);
                    WorkerPoll::Done
                }
            },
        }
    }

    /// Take the job's result. Returns `None` until `poll` has returned
    /// [`WorkerPoll::Done`], and again after the result has been taken.
    pub fn take_result(&mut self) -> Option<T> {
        match &mut self.state {
            WorkerState::Done(value) => value.take(),
            WorkerState::Pending(_) => None,
        }
    }
}

/// Shared background executor for decode jobs and fetch futures.
///
/// Owns a tokio runtime. Blocking (CPU-bound) jobs run on the runtime's
/// blocking pool; the [`crate::fetch::HttpFetcher`] drives its request
/// futures on the same runtime.
pub struct JobPool {
    runtime: Runtime,
}

impl JobPool {
    /// Create a pool with the default thread count.
    pub fn new() -> io::Result<Self> {
        Self::with_threads(2)
    }

    /// Create a pool with an explicit async worker thread count. Blocking
    /// decode jobs run on tokio's separate blocking pool.
    pub fn with_threads(threads: usize) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("hipslayer-jobs")
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    /// Schedule `job` on the background pool and return a poll handle.
    pub fn spawn<T, F>(&self, job: F) -> Worker<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn_blocking(move || {
            // The receiver may have been dropped; the job result is then
            // simply discarded.
            let _ = tx.send(job());
        });
        Worker {
            state: WorkerState::Pending(rx),
        }
    }

    /// Handle for spawning async tasks on the pool's runtime.
    pub(crate) fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }
}
