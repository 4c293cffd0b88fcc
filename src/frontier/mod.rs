//! Frontier: the deduplicating pending-request queue
//!
//! The frontier admits sources once (probabilistically), hands them to
//! fetch workers, and keeps the pending/completed accounting that the
//! orchestrator uses to detect phase exhaustion. Inactive sources are
//! deferred to a forward-list for the next phase instead of the live
//! queue.
//!
//! The seen and forwarded sets and both counters are the only state
//! mutated by more than one worker; everything else that flows through
//! the frontier is owned by exactly one worker at a time.

mod filter;

pub use filter::SeenFilter;

use crate::model::Source;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Default expected URL volume for one phase
const DEFAULT_CAPACITY: usize = 65_536;

/// Default false-positive tolerance of the seen set
const DEFAULT_FP_RATE: f64 = 0.01;

/// What happened to an enqueued source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted to the live queue
    Queued,
    /// Rejected: the URL was already seen or already forwarded
    Duplicate,
    /// Inactive source, deferred to the next phase's seed list
    Forwarded,
}

/// Deduplicating queue of pending sources plus completion counters
pub struct Frontier {
    queue: Mutex<VecDeque<Source>>,
    seen: Mutex<SeenFilter>,
    forward_seen: Mutex<SeenFilter>,
    forwarded: Mutex<Vec<Source>>,
    pending: AtomicU64,
    completed: AtomicU64,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_FP_RATE)
    }

    /// Sizes the dedup filters for an expected URL volume and
    /// false-positive tolerance.
    pub fn with_capacity(expected: usize, fp_rate: f64) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            seen: Mutex::new(SeenFilter::with_capacity(expected, fp_rate)),
            forward_seen: Mutex::new(SeenFilter::with_capacity(expected, fp_rate)),
            forwarded: Mutex::new(Vec::new()),
            pending: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Admits a source to the live queue, the forward-list, or neither.
    ///
    /// A source is queued iff it is active, its URL has not been seen
    /// (unless it declares `duplicate`), and its URL has not been
    /// forwarded. Inactive sources with a fresh URL go to the
    /// forward-list for the next phase.
    pub fn enqueue(&self, source: Source) -> Admission {
        if source.url.is_empty() {
            return Admission::Duplicate;
        }
        let key = source.url.as_bytes().to_vec();

        if self.forward_seen.lock().unwrap().contains(&key) {
            return Admission::Duplicate;
        }
        if !source.duplicate && self.seen.lock().unwrap().contains(&key) {
            return Admission::Duplicate;
        }

        if !source.active {
            self.forward_seen.lock().unwrap().insert(&key);
            self.forwarded.lock().unwrap().push(source);
            return Admission::Forwarded;
        }

        self.seen.lock().unwrap().insert(&key);
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.queue.lock().unwrap().push_back(source);
        self.notify.notify_one();
        Admission::Queued
    }

    /// Puts a dequeued source back at the head of the queue.
    ///
    /// Used for retry: the source already passed dedup and is already
    /// counted pending, so neither is touched.
    pub fn requeue(&self, source: Source) {
        self.queue.lock().unwrap().push_front(source);
        self.notify.notify_one();
    }

    /// Removes the next source, waiting up to `wait` for one to appear.
    ///
    /// Returns `None` on timeout; the caller distinguishes "temporarily
    /// idle" from "phase exhausted" via [`Frontier::is_drained`].
    pub async fn dequeue(&self, wait: Duration) -> Option<Source> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(source) = self.pop() {
                return Some(source);
            }
            let remaining = deadline.checked_duration_since(tokio::time::Instant::now())?;
            if timeout(remaining, notified).await.is_err() {
                // woke by deadline: one last look before reporting idle
                return self.pop();
            }
        }
    }

    fn pop(&self) -> Option<Source> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Counts one source as fully processed (parsed, or dropped after
    /// exhausting its retry budget).
    pub fn mark_completed(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of sources ever admitted to the live queue.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of sources fully processed.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Number of sources waiting in the live queue.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// True when the queue is empty and every admitted source has been
    /// processed. Sources being fetched or parsed right now keep
    /// `pending > completed`, so an in-flight document never reads as
    /// drained.
    pub fn is_drained(&self) -> bool {
        self.queue.lock().unwrap().is_empty() && self.pending() == self.completed()
    }

    /// Drains and discards every still-queued source, counting each as
    /// completed so the accounting stays conservative. Returns how many
    /// were discarded.
    pub fn reset(&self) -> usize {
        let drained: Vec<Source> = self.queue.lock().unwrap().drain(..).collect();
        let n = drained.len();
        self.completed.fetch_add(n as u64, Ordering::AcqRel);
        n
    }

    /// Hands over the sources deferred for the next phase.
    pub fn take_forwarded(&self) -> Vec<Source> {
        std::mem::take(&mut *self.forwarded.lock().unwrap())
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}
