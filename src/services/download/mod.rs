//! Download worker pool.
//!
//! Runs one pass over a set of tasks with bounded concurrency. Each task
//! checks the blacklist and the destination before every attempt, then walks
//! the download hosts under the retry state machine. UI concerns stay out:
//! progress is emitted as [`DownloadEvent`]s.

mod existing;
pub mod retry;
mod state;
mod stream;
mod types;

pub use existing::{is_already_satisfied, sweep_partial_files};
pub use retry::run_with_retries;
pub use state::{AttemptState, Transition};
pub use stream::{fetch_to_file, stream_to_file, DownloadFailure, FailureClass};
pub use types::{DownloadEvent, DownloadTask, RetryPolicy, RunSummary, StreamLimits, TaskOutcome};

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::services::context::ScraperContext;

/// Where download events go. Sending never fails the pipeline: a closed or
/// missing receiver just drops events.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<DownloadEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<DownloadEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Lossy send for high-frequency progress updates.
    fn emit_progress(&self, task_id: Uuid, bytes: u64, total: Option<u64>) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(DownloadEvent::Progress {
                task_id,
                bytes,
                total,
            });
        }
    }
}

/// Service running download passes for one creator.
pub struct DownloadService {
    ctx: Arc<ScraperContext>,
    events: EventSink,
}

impl DownloadService {
    pub fn new(ctx: Arc<ScraperContext>, events: EventSink) -> Self {
        Self { ctx, events }
    }

    pub fn context(&self) -> &Arc<ScraperContext> {
        &self.ctx
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Run every task once (with per-task retries), at most
    /// `max_concurrent_downloads` at a time. Completion order is arbitrary.
    pub async fn run_pass(&self, tasks: Vec<DownloadTask>) -> Vec<(DownloadTask, TaskOutcome)> {
        let workers = self.ctx.settings().max_concurrent_downloads.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join_set = JoinSet::new();
        let mut results = Vec::with_capacity(tasks.len());

        for task in tasks {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let ctx = self.ctx.clone();
            let events = self.events.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let outcome = run_task(&ctx, &task, &events).await;
                events
                    .emit(DownloadEvent::Finished {
                        task_id: task.task_id,
                        file_name: task.file_name.clone(),
                        outcome: outcome.clone(),
                    })
                    .await;
                (task, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::warn!("Download worker cancelled: {}", e),
            }
        }

        results
    }
}

/// Drive one task to an outcome for this pass.
pub async fn run_task(ctx: &ScraperContext, task: &DownloadTask, events: &EventSink) -> TaskOutcome {
    let target = ctx.target();
    let blacklist = ctx.blacklist();
    let policy = &ctx.options().retry;
    let host_count = target.host_count();
    let mut state = AttemptState::default();

    loop {
        if blacklist.contains(&task.remote_path) {
            return if state.attempts == 0 {
                TaskOutcome::SkippedBlacklisted
            } else {
                TaskOutcome::Blacklisted {
                    reason: "too many failures".to_string(),
                }
            };
        }
        if is_already_satisfied(&task.dest) {
            return TaskOutcome::AlreadyExists;
        }

        if state.attempts == 0 {
            events
                .emit(DownloadEvent::Started {
                    task_id: task.task_id,
                    file_name: task.file_name.clone(),
                })
                .await;
        }

        let url = target.download_url(&task.remote_path, &task.file_name, state.host_index);
        let task_id = task.task_id;
        let result = fetch_to_file(
            ctx.transport(),
            &url,
            &task.dest,
            &ctx.options().stream,
            |bytes, total| events.emit_progress(task_id, bytes, total),
        )
        .await;

        let failure = match result {
            Ok(bytes) => {
                blacklist.reset_failures(&task.remote_path);
                tracing::debug!("Downloaded {} ({} bytes)", task.file_name, bytes);
                return TaskOutcome::Downloaded { bytes };
            }
            Err(failure) => failure,
        };

        let class = failure.class();
        if failure.is_connection_level() {
            tracing::debug!(
                "{} via {}: {}",
                task.file_name,
                target.download_host(state.host_index),
                failure
            );
        } else {
            tracing::warn!(
                "{} via {}: {}",
                task.file_name,
                target.download_host(state.host_index),
                failure
            );
        }

        if class != FailureClass::OriginPermanent {
            match blacklist
                .record_failure(&task.remote_path, &task.file_name)
                .await
            {
                Ok(true) => {
                    return TaskOutcome::Blacklisted {
                        reason: failure.to_string(),
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to persist blacklist: {}", e),
            }
        }

        match state.advance(class, host_count, policy.max_retries) {
            Transition::NextHost => {}
            Transition::RetryAfterDelay => {
                tracing::info!(
                    "Retrying {} in {:?} (retry {}/{})",
                    task.file_name,
                    policy.retry_delay,
                    state.retry,
                    policy.max_retries
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Transition::GiveUp => {
                return TaskOutcome::Failed {
                    error: failure.to_string(),
                }
            }
            Transition::Blacklist => {
                if let Err(e) = blacklist
                    .force_blacklist(&task.remote_path, &task.file_name)
                    .await
                {
                    tracing::error!("Failed to persist blacklist: {}", e);
                }
                tracing::warn!("Blacklisted {} after {}", task.file_name, failure);
                return TaskOutcome::Blacklisted {
                    reason: failure.to_string(),
                };
            }
        }
    }
}
