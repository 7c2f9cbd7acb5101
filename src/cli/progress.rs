//! Multi-progress display for concurrent downloads.
//!
//! One bar per in-flight task, keyed by task ID, under a summary bar that
//! counts settled files. Events for tasks that never got a bar (already on
//! disk, skipped) only move the summary.

use std::collections::HashMap;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use uuid::Uuid;

use partyfetch::services::download::{DownloadEvent, TaskOutcome};
use partyfetch::utils::{format_size, truncate_filename};

use super::icons;

/// How long a finished bar stays visible before it is removed.
const FINISHED_BAR_GRACE: Duration = Duration::from_millis(1500);

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.cyan} {wide_msg} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")
        .unwrap()
        .progress_chars("━╸─")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.cyan} {wide_msg} {bytes}")
        .unwrap()
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {wide_msg}")
        .unwrap()
}

/// Progress bars for one creator run.
pub struct DownloadProgress {
    multi: MultiProgress,
    summary_bar: ProgressBar,
    bars: HashMap<Uuid, ProgressBar>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let summary_bar = multi.add(ProgressBar::new(0));
        summary_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        summary_bar.set_message("Downloading");

        Self {
            multi,
            summary_bar,
            bars: HashMap::new(),
        }
    }

    /// Apply one pipeline event to the display.
    pub fn handle(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::RunStarted { total } => {
                self.summary_bar.set_length(*total as u64);
                self.summary_bar
                    .enable_steady_tick(Duration::from_millis(100));
            }
            DownloadEvent::PassStarted {
                pass,
                max_passes,
                tasks,
            } => {
                if *pass > 1 {
                    self.summary_bar.set_message(format!(
                        "Retry pass {}/{} ({} files)",
                        pass, max_passes, tasks
                    ));
                }
            }
            DownloadEvent::Started { task_id, file_name } => {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(spinner_style());
                bar.set_message(truncate_filename(file_name, 40));
                bar.enable_steady_tick(Duration::from_millis(100));
                self.bars.insert(*task_id, bar);
            }
            DownloadEvent::Progress {
                task_id,
                bytes,
                total,
            } => {
                let Some(bar) = self.bars.get(task_id) else {
                    return;
                };
                if let Some(total) = total {
                    if bar.length() != Some(*total) {
                        bar.set_length(*total);
                        bar.set_style(bytes_style());
                    }
                }
                bar.set_position(*bytes);
            }
            DownloadEvent::Finished {
                task_id,
                file_name,
                outcome,
            } => {
                if !outcome.is_failed() {
                    self.summary_bar.inc(1);
                }
                if let Some(bar) = self.bars.remove(task_id) {
                    self.retire(bar, file_name, outcome);
                }
            }
            DownloadEvent::RunFinished { .. } => self.finish(),
        }
    }

    /// Show the outcome on the task's bar, then drop it after a short grace.
    fn retire(&self, bar: ProgressBar, file_name: &str, outcome: &TaskOutcome) {
        let name = truncate_filename(file_name, 40);
        let detail = match outcome {
            TaskOutcome::Downloaded { bytes } => style(format_size(*bytes)).dim(),
            TaskOutcome::Failed { error } => style(error.clone()).red(),
            TaskOutcome::Blacklisted { reason } => style(reason.clone()).yellow(),
            other => style(other.message()).dim(),
        };
        let line = format!("{} {} {}", icons::outcome(outcome), name, detail);

        bar.disable_steady_tick();
        bar.set_style(finished_style());
        bar.finish_with_message(line);

        let multi = self.multi.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FINISHED_BAR_GRACE).await;
            multi.remove(&bar);
        });
    }

    /// Clear every bar.
    pub fn finish(&mut self) {
        for (_, bar) in self.bars.drain() {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        self.summary_bar.finish_and_clear();
    }

    /// Print a line above the bars; it stays after they are cleared.
    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> DownloadProgress {
        let progress = DownloadProgress::new();
        progress
            .multi
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());
        progress
    }

    #[tokio::test]
    async fn test_progress_for_unknown_task_is_ignored() {
        let mut progress = hidden();
        progress.handle(&DownloadEvent::Progress {
            task_id: Uuid::new_v4(),
            bytes: 10,
            total: Some(20),
        });
        assert!(progress.bars.is_empty());
    }

    #[tokio::test]
    async fn test_bar_lifecycle_follows_task_id() {
        let mut progress = hidden();
        let id = Uuid::new_v4();
        progress.handle(&DownloadEvent::RunStarted { total: 2 });
        progress.handle(&DownloadEvent::Started {
            task_id: id,
            file_name: "a.jpg".to_string(),
        });
        progress.handle(&DownloadEvent::Progress {
            task_id: id,
            bytes: 5,
            total: Some(10),
        });
        assert_eq!(progress.bars[&id].length(), Some(10));
        assert_eq!(progress.bars[&id].position(), 5);

        progress.handle(&DownloadEvent::Finished {
            task_id: id,
            file_name: "a.jpg".to_string(),
            outcome: TaskOutcome::Downloaded { bytes: 10 },
        });
        assert!(progress.bars.is_empty());
        assert_eq!(progress.summary_bar.position(), 1);
    }

    #[tokio::test]
    async fn test_failed_outcome_does_not_advance_summary() {
        let mut progress = hidden();
        progress.handle(&DownloadEvent::RunStarted { total: 1 });
        progress.handle(&DownloadEvent::Finished {
            task_id: Uuid::new_v4(),
            file_name: "a.jpg".to_string(),
            outcome: TaskOutcome::Failed {
                error: "HTTP 503".to_string(),
            },
        });
        assert_eq!(progress.summary_bar.position(), 0);
    }
}
