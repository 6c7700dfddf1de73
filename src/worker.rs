//! Reference-counted single-worker executor for background refreshes.
//!
//! All load balancers in a process share one worker thread by default. The
//! thread runs a current-thread Tokio runtime and executes submitted tasks
//! strictly one after another, so refresh work never runs in parallel. The
//! thread is started by the first [`WorkerPool::acquire`] and stopped by the
//! [`WorkerPool::release`] that drops the reference count to zero.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;

const WORKER_THREAD_NAME: &str = "alternator-lb-refresh";

type Task = BoxFuture<'static, ()>;

static SHARED: LazyLock<Arc<WorkerPool>> = LazyLock::new(|| Arc::new(WorkerPool::new()));

#[derive(Default)]
struct PoolState {
    refs: usize,
    tx: Option<mpsc::UnboundedSender<Task>>,
}

/// Single-worker execution context shared by reference count.
#[derive(Default)]
pub struct WorkerPool {
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Creates a pool with no worker running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide pool.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    /// Takes a reference, starting the worker thread if none is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Worker`](crate::Error::Worker) if the runtime or thread
    /// cannot be created; the reference count is unchanged in that case.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();

        if state.tx.is_none() {
            state.tx = Some(spawn_worker()?);
            tracing::debug!("started refresh worker");
        }

        state.refs += 1;
        Ok(())
    }

    /// Drops a reference, stopping the worker when none remain.
    ///
    /// The worker finishes queued tasks and exits; it is not joined.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.refs = state.refs.saturating_sub(1);

        if state.refs == 0 && state.tx.take().is_some() {
            tracing::debug!("stopping refresh worker");
        }
    }

    /// Queues `task` on the worker.
    ///
    /// Returns `false` and drops the task if no worker is running.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.state.lock();

        match &state.tx {
            Some(tx) => tx.send(Box::pin(task)).is_ok(),
            None => false,
        }
    }

    /// Current number of references.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    /// Returns `true` while a worker thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().tx.is_some()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WorkerPool")
            .field("refs", &state.refs)
            .field("running", &state.tx.is_some())
            .finish()
    }
}

fn spawn_worker() -> Result<mpsc::UnboundedSender<Task>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

    // The runtime must never be dropped on the caller's thread: that panics
    // inside an async context.
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            runtime.block_on(async move {
                while let Some(task) = rx.recv().await {
                    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                        tracing::error!("refresh task panicked");
                    }
                }
            });
        })?;

    ready_rx
        .recv()
        .map_err(|_| std::io::Error::other("refresh worker exited during startup"))??;

    Ok(tx)
}
