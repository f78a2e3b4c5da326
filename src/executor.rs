//! # executor: bounded-concurrency batch runner
//!
//! [`BatchExecutor::run`] applies one async, fallible function to every item of a
//! list and returns a [`BatchOutcome`] with exactly one outcome per item:
//! `results[i]` holds item `i`'s value when it succeeded, and `errors` holds
//! `(item, error)` for every item that did not.
//!
//! ## Scheduling
//! Items run as futures on the caller's task, gated by a counting semaphore
//! (`concurrency` permits, or one permit in sequential mode). Nothing is spawned,
//! so the per-item closure may borrow from its environment. Completion order is
//! unspecified; slot order always matches input order.
//!
//! ## Failure isolation
//! A failing item is recorded and its siblings keep running. With `fail_fast` the
//! first failure stops the batch instead.
//!
//! ## Cancellation
//! When the [`CancelSignal`] fires, or fail-fast trips, every in-flight future is
//! dropped. Git subprocesses are spawned with `kill_on_drop`, so dropping their
//! future terminates them. Items that never finished are reported as
//! [`FleetError::Cancelled`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use crate::config::DEFAULT_CONCURRENCY;
use crate::error::{FleetError, Result};
use crate::progress::{NoProgress, ProgressEvent, ProgressSink, TaskState};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub sequential: bool,
    pub fail_fast: bool,
    pub label: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            sequential: false,
            fail_fast: false,
            label: "batch".to_string(),
        }
    }
}

/// Sender half of a batch cancellation signal.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Receiver half; cloneable so several batches can observe one interrupt.
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

#[derive(Debug)]
pub struct BatchOutcome<T, R> {
    /// One slot per input item, `None` where the item failed.
    pub results: Vec<Option<R>>,
    /// Failed items in input order.
    pub errors: Vec<(T, FleetError)>,
}

impl<T, R> BatchOutcome<T, R> {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors
            .iter()
            .any(|(_, e)| matches!(e, FleetError::Cancelled))
    }
}

pub struct BatchExecutor {
    options: BatchOptions,
    progress: Arc<dyn ProgressSink>,
    cancel: Option<CancelSignal>,
}

impl BatchExecutor {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            progress: Arc::new(NoProgress),
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> BatchOutcome<T, R>
    where
        T: Clone + Display,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total = items.len();
        let label = self.options.label.clone();
        let permits = if self.options.sequential {
            1
        } else {
            self.options.concurrency.max(1)
        };

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut failures: Vec<Option<FleetError>> = (0..total).map(|_| None).collect();

        info!(batch = %label, total, permits, fail_fast = self.options.fail_fast, "[BATCH] Running");
        self.progress.emit(ProgressEvent::BatchStarted {
            label: label.clone(),
            total,
        });
        for (task_id, item) in items.iter().enumerate() {
            self.emit_task(task_id, item, TaskState::Pending);
        }

        let semaphore = Semaphore::new(permits);
        let semaphore = &semaphore;
        let f = &f;
        let mut in_flight: FuturesUnordered<_> = items
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, item)| async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(FleetError::Cancelled)),
                };
                self.emit_task(index, &item, TaskState::Processing);
                (index, f(item).await)
            })
            .collect();

        let mut cancel = self.cancel.clone();
        let mut completed = 0;
        loop {
            let next = match cancel.as_mut() {
                Some(signal) => tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        warn!(batch = %label, completed, total, "[BATCH] Cancellation requested, aborting in-flight items");
                        break;
                    }
                    next = in_flight.next() => next,
                },
                None => in_flight.next().await,
            };
            let Some((index, outcome)) = next else {
                break;
            };

            completed += 1;
            match outcome {
                Ok(value) => {
                    results[index] = Some(value);
                    self.emit_task(index, &items[index], TaskState::Done);
                }
                Err(e) => {
                    warn!(batch = %label, item = %items[index], error = %e, "[BATCH] Item failed");
                    failures[index] = Some(e);
                    self.emit_task(index, &items[index], TaskState::Failed);
                    if self.options.fail_fast {
                        warn!(batch = %label, "[BATCH] Fail-fast enabled, aborting remaining items");
                        self.progress.emit(ProgressEvent::Overall { completed, total });
                        break;
                    }
                }
            }
            self.progress.emit(ProgressEvent::Overall { completed, total });
        }

        // Dropping the remaining futures terminates their subprocesses.
        drop(in_flight);

        for index in 0..total {
            if results[index].is_none() && failures[index].is_none() {
                failures[index] = Some(FleetError::Cancelled);
                self.emit_task(index, &items[index], TaskState::Failed);
            }
        }

        let errors: Vec<(T, FleetError)> = items
            .into_iter()
            .zip(failures)
            .filter_map(|(item, failure)| failure.map(|e| (item, e)))
            .collect();

        let outcome = BatchOutcome { results, errors };
        self.progress.emit(ProgressEvent::BatchFinished {
            label: label.clone(),
            succeeded: outcome.succeeded(),
            failed: outcome.failed(),
        });
        info!(batch = %label, succeeded = outcome.succeeded(), failed = outcome.failed(), "[BATCH] Complete");
        outcome
    }

    fn emit_task<T: Display>(&self, task_id: usize, item: &T, state: TaskState) {
        self.progress.emit(ProgressEvent::Task {
            task_id,
            description: item.to_string(),
            state,
        });
    }
}
