//! Fetch pool: parallel workers draining the frontier
//!
//! Each worker loops dequeue → fetch → hand off to the parse queue.
//! Workers never decide phase boundaries themselves; they stop when the
//! orchestrator signals the cooperative stop flag. A failed fetch
//! spends the source's retry budget; once exhausted the source is
//! dropped and counted completed so the pending/completed invariant
//! cannot deadlock.

use crate::crawler::fetcher::{FetchedDocument, Fetcher};
use crate::frontier::Frontier;
use crate::model::Source;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long a worker waits on an empty frontier before re-checking the
/// stop flag
const DEQUEUE_WAIT: Duration = Duration::from_millis(200);

/// A running pool of fetch workers
pub struct FetchPool {
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl FetchPool {
    /// Spawns `n` workers fetching from `frontier` into `out`.
    pub fn start(
        n: usize,
        fetcher: Arc<dyn Fetcher>,
        frontier: Arc<Frontier>,
        out: mpsc::Sender<(Source, FetchedDocument)>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let workers = (0..n.max(1))
            .map(|id| {
                let fetcher = fetcher.clone();
                let frontier = frontier.clone();
                let out = out.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    worker_loop(id, fetcher, frontier, out, stop).await;
                })
            })
            .collect();

        Self { workers, stop }
    }

    /// Signals the stop flag and waits for every worker to exit.
    /// In-flight fetches finish; their documents still reach the parse
    /// queue.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::Release);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(
    id: usize,
    fetcher: Arc<dyn Fetcher>,
    frontier: Arc<Frontier>,
    out: mpsc::Sender<(Source, FetchedDocument)>,
    stop: Arc<AtomicBool>,
) {
    tracing::debug!(worker = id, "fetch worker started");

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        let Some(mut source) = frontier.dequeue(DEQUEUE_WAIT).await else {
            continue;
        };

        match fetcher.fetch(&source).await {
            Ok(document) => {
                tracing::debug!(worker = id, url = %document.url, "fetched");
                if out.send((source, document)).await.is_err() {
                    // parse stage is gone; keep the accounting honest
                    frontier.mark_completed();
                    break;
                }
            }
            Err(error) => {
                if error.is_retryable() && source.retries > 0 {
                    source.retries -= 1;
                    tracing::warn!(
                        url = %source.url,
                        retries_left = source.retries,
                        "fetch failed, re-enqueueing: {}",
                        error
                    );
                    frontier.requeue(source);
                } else {
                    tracing::warn!(url = %source.url, "dropping source: {}", error);
                    frontier.mark_completed();
                }
            }
        }
    }

    tracing::debug!(worker = id, "fetch worker stopped");
}
