//! Progress reporting for batches.
//!
//! The executor emits [`ProgressEvent`]s to a [`ProgressSink`]: one overall
//! counter per batch plus one sub-task per item moving through
//! `pending -> processing -> done | failed`. Rendering is the sink's business;
//! [`TerminalProgress`] draws indicatif bars, [`TracingProgress`] logs, and
//! [`NoProgress`] discards.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Processing,
    Done,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    BatchStarted { label: String, total: usize },
    Task {
        task_id: usize,
        description: String,
        state: TaskState,
    },
    Overall {
        completed: usize,
        total: usize,
    },
    BatchFinished {
        label: String,
        succeeded: usize,
        failed: usize,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Logs batch boundaries at info and item transitions at debug.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted { label, total } => {
                info!(batch = %label, total, "[BATCH] Started")
            }
            ProgressEvent::Task {
                task_id,
                description,
                state,
            } => {
                debug!(task_id, item = %description, %state, "[BATCH] Item transition")
            }
            ProgressEvent::Overall { completed, total } => {
                debug!(completed, total, "[BATCH] Progress")
            }
            ProgressEvent::BatchFinished {
                label,
                succeeded,
                failed,
            } => {
                info!(batch = %label, succeeded, failed, "[BATCH] Finished")
            }
        }
    }
}

/// indicatif rendering: an overall bar plus a spinner per in-flight item.
pub struct TerminalProgress {
    multi: MultiProgress,
    state: Mutex<TerminalState>,
}

#[derive(Default)]
struct TerminalState {
    overall: Option<ProgressBar>,
    tasks: HashMap<usize, ProgressBar>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(TerminalState::default()),
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn emit(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::BatchStarted { label, total } => {
                let bar = self.multi.add(ProgressBar::new(total as u64));
                let template = "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})";
                let style = ProgressStyle::with_template(template)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> ");
                bar.set_style(style);
                bar.set_message(label);
                state.overall = Some(bar);
            }
            ProgressEvent::Task {
                task_id,
                description,
                state: TaskState::Processing,
            } => {
                let spinner = self.multi.add(ProgressBar::new_spinner());
                spinner.set_style(
                    ProgressStyle::with_template("  {spinner} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.enable_steady_tick(std::time::Duration::from_millis(120));
                spinner.set_message(format!("{description}: processing"));
                state.tasks.insert(task_id, spinner);
            }
            ProgressEvent::Task {
                task_id,
                description,
                state: task_state @ (TaskState::Done | TaskState::Failed),
            } => {
                if let Some(spinner) = state.tasks.remove(&task_id) {
                    spinner.finish_and_clear();
                }
                if task_state == TaskState::Failed {
                    let _ = self.multi.println(format!("  x {description}: failed"));
                }
            }
            ProgressEvent::Task { .. } => {}
            ProgressEvent::Overall { completed, .. } => {
                if let Some(bar) = &state.overall {
                    bar.set_position(completed as u64);
                }
            }
            ProgressEvent::BatchFinished { .. } => {
                for (_, spinner) in state.tasks.drain() {
                    spinner.finish_and_clear();
                }
                if let Some(bar) = state.overall.take() {
                    bar.finish();
                }
            }
        }
    }
}
