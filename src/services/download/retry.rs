//! Multi-pass retry over the failed subset of a download run.

use super::{DownloadEvent, DownloadService, DownloadTask, RunSummary, TaskOutcome};
use crate::blacklist::BlacklistError;

/// Run passes until nothing fails or the pass ceiling is hit, then blacklist
/// whatever still fails and flush the blacklist.
pub async fn run_with_retries(
    service: &DownloadService,
    tasks: Vec<DownloadTask>,
) -> Result<RunSummary, BlacklistError> {
    let ctx = service.context().clone();
    let blacklist = ctx.blacklist();
    let policy = &ctx.options().retry;
    let max_passes = policy.max_passes.max(1);
    let mut summary = RunSummary::default();

    service
        .events()
        .emit(DownloadEvent::RunStarted { total: tasks.len() })
        .await;

    let mut pending = tasks;
    let mut pass = 1;
    while !pending.is_empty() {
        service
            .events()
            .emit(DownloadEvent::PassStarted {
                pass,
                max_passes,
                tasks: pending.len(),
            })
            .await;

        let mut failed = Vec::new();
        for (task, outcome) in service.run_pass(pending).await {
            match outcome {
                TaskOutcome::Failed { .. } if blacklist.contains(&task.remote_path) => {
                    summary.blacklisted += 1;
                }
                TaskOutcome::Failed { .. } => failed.push(task),
                other => summary.record(&other),
            }
        }

        if failed.is_empty() || pass >= max_passes {
            pending = failed;
            break;
        }

        tracing::info!(
            "{} downloads failed in pass {}/{}, retrying in {:?}",
            failed.len(),
            pass,
            max_passes,
            policy.pass_delay
        );
        tokio::time::sleep(policy.pass_delay).await;
        pending = failed.iter().map(DownloadTask::reminted).collect();
        pass += 1;
    }

    for task in &pending {
        tracing::warn!(
            "Giving up on {} after {} passes, blacklisting",
            task.file_name,
            max_passes
        );
        blacklist
            .force_blacklist(&task.remote_path, &task.file_name)
            .await?;
    }
    summary.failed = pending.len();

    blacklist.flush().await?;

    service
        .events()
        .emit(DownloadEvent::RunFinished {
            summary: summary.clone(),
        })
        .await;

    Ok(summary)
}
