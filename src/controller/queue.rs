//! # Work Queue
//!
//! Deduplicating, rate-limited queue of reconcile keys shared by all workers.
//!
//! A key lives in at most one of three places:
//! - **queued**: ready to be handed out by [`WorkQueue::get`]
//! - **processing**: handed to a worker, not yet released with [`WorkQueue::done`]
//! - **waiting**: scheduled by [`WorkQueue::add_after`], not yet due
//!
//! Adding a key that is already queued is a no-op. Adding a key that is being
//! processed marks it dirty; it is queued again when the worker calls `done`, so a
//! change that arrives mid-sync triggers one follow-up pass instead of a concurrent one.

use crate::controller::backoff::ItemExponentialBackoff;
use crate::observability;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct QueueState {
    /// Keys ready to be handed out, in insertion order
    queue: VecDeque<String>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Keys scheduled for later, with the instant they become due
    waiting: HashMap<String, Instant>,
    shutting_down: bool,
}

impl QueueState {
    /// Returns true when the key was pushed onto the ready queue
    fn insert(&mut self, key: String) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) {
        let due: Vec<String> = self
            .waiting
            .iter()
            .filter(|(_, ready_at)| **ready_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            self.waiting.remove(&key);
            self.insert(key);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.waiting.values().min().copied()
    }
}

/// Rate-limited work queue
#[derive(Debug)]
pub struct WorkQueue {
    name: String,
    state: Mutex<QueueState>,
    limiter: Mutex<ItemExponentialBackoff>,
    notify: Notify,
}

impl WorkQueue {
    /// Create a queue whose rate limiter starts at `backoff_start` and caps at `backoff_max`
    #[must_use]
    pub fn new(name: impl Into<String>, backoff_start: Duration, backoff_max: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            limiter: Mutex::new(ItemExponentialBackoff::new(backoff_start, backoff_max)),
            notify: Notify::new(),
        }
    }

    /// Queue name, used in logs and metrics
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue `key` unless it is already pending
    pub fn add(&self, key: impl Into<String>) {
        let pushed = {
            let mut state = self.lock_state();
            let pushed = state.insert(key.into());
            self.record_depth(&state);
            pushed
        };
        if pushed {
            self.notify.notify_waiters();
        }
    }

    /// Make `key` visible after `delay`. An earlier pending deadline for the same key wins.
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        {
            let mut state = self.lock_state();
            if state.shutting_down {
                return;
            }
            let ready_at = Instant::now() + delay;
            state
                .waiting
                .entry(key.into())
                .and_modify(|existing| {
                    if ready_at < *existing {
                        *existing = ready_at;
                    }
                })
                .or_insert(ready_at);
        }
        // Sleeping workers must pick up the possibly earlier deadline
        self.notify.notify_waiters();
    }

    /// Re-add `key` after the backoff for its failure count.
    /// Returns the delay that was applied.
    pub fn add_rate_limited(&self, key: impl Into<String>) -> Duration {
        let key = key.into();
        let delay = self.lock_limiter().when(&key);
        self.add_after(key, delay);
        delay
    }

    /// Reset the failure count of `key`
    pub fn forget(&self, key: &str) {
        self.lock_limiter().forget(key);
    }

    /// Number of times `key` has been rate-limited since it was last forgotten
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock_limiter().num_requeues(key)
    }

    /// Wait for the next key and mark it as processing.
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            // Register interest before inspecting state so no wake-up is lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_deadline = {
                let mut state = self.lock_state();
                state.promote_due(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    self.record_depth(&state);
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
                state.next_deadline()
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = notified.as_mut() => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release `key` after processing. Re-queues it if it was added meanwhile.
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.lock_state();
            state.processing.remove(key);
            let requeued = state.dirty.contains(key) && !state.shutting_down;
            if requeued {
                state.queue.push_back(key.to_string());
            }
            self.record_depth(&state);
            requeued
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Stop accepting keys. Workers drain what is already queued, then `get` returns `None`.
    pub fn shut_down(&self) {
        {
            let mut state = self.lock_state();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.notify.notify_waiters();
    }

    /// Whether `shut_down` has been called
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock_state().shutting_down
    }

    /// Number of keys ready to be handed out
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Whether no key is ready to be handed out
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_depth(&self, state: &QueueState) {
        observability::metrics::set_queue_depth(&self.name, state.queue.len());
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_limiter(&self) -> MutexGuard<'_, ItemExponentialBackoff> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
