//! Download service types and events.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Progress-reporting key, re-minted for every retry pass.
    pub task_id: Uuid,
    /// Remote relative path; also the blacklist key.
    pub remote_path: String,
    pub file_name: String,
    pub dest: PathBuf,
}

impl DownloadTask {
    pub fn new(remote_path: &str, file_name: &str, dest: PathBuf) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            remote_path: remote_path.to_string(),
            file_name: file_name.to_string(),
            dest,
        }
    }

    /// Same task under a fresh id.
    pub fn reminted(&self) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// Final result of one task within a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Downloaded { bytes: u64 },
    /// Destination (or a converted sibling) already on disk.
    AlreadyExists,
    /// Path was blacklisted before any attempt.
    SkippedBlacklisted,
    /// Path became blacklisted during this task.
    Blacklisted { reason: String },
    /// Retries exhausted for this pass.
    Failed { error: String },
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }

    /// Short message for progress output.
    pub fn message(&self) -> String {
        match self {
            TaskOutcome::Downloaded { bytes } => {
                format!("done ({})", crate::utils::format_size(*bytes))
            }
            TaskOutcome::AlreadyExists => "already exists".to_string(),
            TaskOutcome::SkippedBlacklisted => "skipped (blacklisted)".to_string(),
            TaskOutcome::Blacklisted { reason } => format!("blacklisted: {}", reason),
            TaskOutcome::Failed { error } => format!("failed: {}", error),
        }
    }
}

/// Events emitted during download operations.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A run over `total` files is starting.
    RunStarted { total: usize },
    /// A retry pass over `tasks` files is starting.
    PassStarted {
        pass: u32,
        max_passes: u32,
        tasks: usize,
    },
    /// A task began its first network attempt.
    Started { task_id: Uuid, file_name: String },
    /// Bytes written so far for a task.
    Progress {
        task_id: Uuid,
        bytes: u64,
        total: Option<u64>,
    },
    /// A task reached its outcome for this pass.
    Finished {
        task_id: Uuid,
        file_name: String,
        outcome: TaskOutcome,
    },
    /// All passes are done.
    RunFinished { summary: RunSummary },
}

/// Per-task retry bounds and retry-pass bounds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Full host cycles after the first, per task per pass.
    pub max_retries: u32,
    /// Wait before starting a new host cycle.
    pub retry_delay: Duration,
    pub max_passes: u32,
    pub pass_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
            max_passes: 3,
            pass_delay: Duration::from_secs(5),
        }
    }
}

/// Limits on one body transfer.
#[derive(Debug, Clone)]
pub struct StreamLimits {
    /// Abort if no bytes arrive for this long.
    pub stall_timeout: Duration,
    /// Abort the whole transfer after this long.
    pub overall_timeout: Duration,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(60),
            overall_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Counts for the end-of-run report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub already_present: usize,
    pub skipped_blacklisted: usize,
    pub blacklisted: usize,
    /// Still failing after the last pass (and blacklisted for that reason).
    pub failed: usize,
    pub bytes: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Downloaded { bytes } => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            TaskOutcome::AlreadyExists => self.already_present += 1,
            TaskOutcome::SkippedBlacklisted => self.skipped_blacklisted += 1,
            TaskOutcome::Blacklisted { .. } => self.blacklisted += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
        }
    }
}
