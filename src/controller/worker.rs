//! # Worker Pool
//!
//! Workers drain the shared [`WorkQueue`] and run one sync per dequeued key.
//!
//! - Success forgets the key's failure history.
//! - Retryable failures re-queue the key with per-key exponential backoff.
//! - Ownership conflicts are logged and forgotten; a later watch event re-triggers them.
//! - A panicking sync is caught, logged and retried; the worker keeps running.
//!
//! Every dequeued key is released with `done`, including when the sync panics.

use crate::controller::queue::WorkQueue;
use crate::controller::sync::{SyncHandler, SyncOutcome};
use crate::observability::metrics;
use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Releases a key when dropped
struct DoneGuard<'a> {
    queue: &'a WorkQueue,
    key: &'a str,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

/// Pool of worker loops sharing one queue and one sync handler
#[derive(Debug)]
pub struct Reconciler {
    queue: Arc<WorkQueue>,
    handler: Arc<SyncHandler>,
    workers: usize,
}

impl Reconciler {
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>, handler: Arc<SyncHandler>, workers: usize) -> Self {
        Self {
            queue,
            handler,
            workers: workers.max(1),
        }
    }

    /// Run the workers until `shutdown` flips to true
    ///
    /// Workers only start once `caches_synced` resolves with `Ok`. In-flight syncs
    /// finish and the queue drains before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown is requested before the caches synced, or if
    /// `caches_synced` itself fails.
    pub async fn run<F>(self, caches_synced: F, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Waiting for informer caches to sync");
        tokio::select! {
            biased;
            synced = caches_synced => {
                if let Err(e) = synced {
                    self.queue.shut_down();
                    return Err(e.context("failed to wait for caches to sync"));
                }
            }
            () = wait_for_shutdown(&mut shutdown) => {
                self.queue.shut_down();
                return Err(anyhow::anyhow!("failed to wait for caches to sync"));
            }
        }

        info!("Starting {} workers", self.workers);
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            workers.spawn(async move {
                run_worker(id, &queue, &handler).await;
            });
        }

        wait_for_shutdown(&mut shutdown).await;
        info!("Shutting down workers");
        self.queue.shut_down();

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
        info!("All workers stopped");
        Ok(())
    }
}

/// Process keys until the queue is shut down and drained
pub async fn run_worker(id: usize, queue: &WorkQueue, handler: &SyncHandler) {
    debug!("Worker {} started", id);
    while let Some(key) = queue.get().await {
        process_key(queue, handler, &key).await;
    }
    debug!("Worker {} stopped", id);
}

/// Run one sync for `key` and record its result on the queue
pub async fn process_key(queue: &WorkQueue, handler: &SyncHandler, key: &str) {
    let _done = DoneGuard { queue, key };

    metrics::increment_reconciliations();
    let started = Instant::now();
    let result = AssertUnwindSafe(handler.sync(key)).catch_unwind().await;
    metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

    match result {
        Ok(Ok(outcome)) => {
            queue.forget(key);
            if outcome == SyncOutcome::Synced {
                debug!("Successfully synced '{}'", key);
            }
        }
        Ok(Err(e)) if e.is_retryable() => {
            metrics::increment_reconciliation_errors();
            metrics::increment_requeues_total(e.reason());
            let delay = queue.add_rate_limited(key);
            error!(
                "Error syncing '{}': {} (retry {} in {:?})",
                key,
                e,
                queue.num_requeues(key),
                delay
            );
        }
        Ok(Err(e)) => {
            metrics::increment_reconciliation_errors();
            queue.forget(key);
            warn!("Error syncing '{}', not retrying: {}", key, e);
        }
        Err(panic) => {
            metrics::increment_reconciliation_errors();
            metrics::increment_requeues_total("panic");
            let delay = queue.add_rate_limited(key);
            error!(
                "Sync of '{}' panicked: {} (retry in {:?})",
                key,
                panic_message(panic.as_ref()),
                delay
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}
