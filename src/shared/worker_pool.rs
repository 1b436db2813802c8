//! Bounded-concurrency executor shared by the fetch and import jobs
//!
//! N workers pull from one `mpsc` receiver until it is exhausted or the batch
//! is cancelled. A failing item is logged and counted; it never stops the
//! other workers.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::error::{AppError, Result};

/// Outcome counters of one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Items whose processing function returned `Ok`
    pub processed: usize,
    /// Items whose processing function failed or timed out
    pub failed: usize,
    /// Items rejected by the filter stage
    pub skipped: usize,
}

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn report(&self) -> PoolReport {
        PoolReport {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

pub struct WorkerPool {
    name: &'static str,
    concurrency: usize,
    item_timeout: Option<Duration>,
}

impl WorkerPool {
    pub fn new(name: &'static str, concurrency: usize) -> Self {
        Self {
            name,
            concurrency: concurrency.max(1),
            item_timeout: None,
        }
    }

    /// Fail any single item that runs longer than `timeout`
    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    /// Apply `process` to every item of `source`. Each call gets a clone of
    /// `cancel` so long items can stop at a safe point.
    pub async fn process_items<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        source: mpsc::Receiver<T>,
        process: F,
    ) -> PoolReport
    where
        T: Display + Send + 'static,
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.process_filtered_items(cancel, source, |_: &T| true, process)
            .await
    }

    /// Two-stage variant: `filter` runs synchronously on every item and only
    /// accepted items reach `process`
    pub async fn process_filtered_items<T, P, F, Fut>(
        &self,
        cancel: &CancellationToken,
        source: mpsc::Receiver<T>,
        filter: P,
        process: F,
    ) -> PoolReport
    where
        T: Display + Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let source = Arc::new(Mutex::new(source));
        let filter = Arc::new(filter);
        let process = Arc::new(process);
        let counters = Arc::new(Counters::default());

        info!(
            "Starting {} pool with {} workers",
            self.name, self.concurrency
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            let source = Arc::clone(&source);
            let filter = Arc::clone(&filter);
            let process = Arc::clone(&process);
            let counters = Arc::clone(&counters);
            let cancel = cancel.clone();
            let name = self.name;
            let item_timeout = self.item_timeout;

            workers.spawn(async move {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        item = async { source.lock().await.recv().await } => item,
                    };

                    let Some(item) = next else {
                        break;
                    };

                    if !filter(&item) {
                        debug!("[{}#{}] skipped {}", name, worker_id, item);
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    let label = item.to_string();
                    let outcome = match item_timeout {
                        Some(limit) => {
                            match tokio::time::timeout(limit, process(item, cancel.clone())).await {
                                Ok(outcome) => outcome,
                                Err(_) => Err(AppError::Timeout(format!(
                                    "{} did not finish within {:?}",
                                    label, limit
                                ))),
                            }
                        }
                        None => process(item, cancel.clone()).await,
                    };

                    match outcome {
                        Ok(()) => {
                            counters.processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            error!("[{}#{}] failed to process {}: {}", name, worker_id, label, e);
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("{} worker terminated abnormally: {}", self.name, e);
            }
        }

        if cancel.is_cancelled() {
            warn!("{} pool stopped early: batch was cancelled", self.name);
        }

        let report = counters.report();
        info!(
            "{} pool finished: processed={}, failed={}, skipped={}",
            self.name, report.processed, report.failed, report.skipped
        );
        report
    }
}
