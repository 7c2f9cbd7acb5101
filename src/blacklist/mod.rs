//! Persisted, time-bounded blacklist of download targets.
//!
//! Paths that fail repeatedly (or fail with an origin error) are written to
//! `blacklist.json` in the creator's output directory and skipped until the
//! entry expires. Failure counters below the promotion threshold are kept in
//! memory only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BLACKLIST_FILE_NAME: &str = "blacklist.json";

#[derive(Debug, Clone)]
pub struct BlacklistPolicy {
    /// Failures within a run before a path is promoted.
    pub threshold: u32,
    /// Age after which entries are dropped on load.
    pub expiry: chrono::Duration,
}

impl Default for BlacklistPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            expiry: chrono::Duration::days(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub file_path: String,
    pub file_name: String,
    pub added_at: DateTime<Utc>,
    pub failure_count: u32,
}

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("Failed to write blacklist {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read blacklist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize blacklist: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct BlacklistState {
    entries: HashMap<String, BlacklistEntry>,
    failures: HashMap<String, u32>,
}

pub struct BlacklistStore {
    path: PathBuf,
    policy: BlacklistPolicy,
    state: Mutex<BlacklistState>,
    /// Serialises whole-file rewrites.
    write_lock: tokio::sync::Mutex<()>,
}

impl BlacklistStore {
    /// Load the blacklist stored in `dir`, dropping expired entries.
    pub async fn load(dir: &Path, policy: BlacklistPolicy) -> Result<Self, BlacklistError> {
        Self::load_at(dir, policy, Utc::now()).await
    }

    /// Load with an explicit clock, so expiry can be checked at any instant.
    pub async fn load_at(
        dir: &Path,
        policy: BlacklistPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, BlacklistError> {
        let path = dir.join(BLACKLIST_FILE_NAME);
        let loaded = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<BlacklistEntry>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unreadable blacklist {}: {}",
                        path.display(),
                        e
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(BlacklistError::Read { path, source }),
        };

        let total = loaded.len();
        let mut entries = HashMap::with_capacity(total);
        for entry in loaded {
            if entry.added_at + policy.expiry <= now {
                tracing::debug!("Blacklist entry expired: {}", entry.file_path);
                continue;
            }
            entries.entry(entry.file_path.clone()).or_insert(entry);
        }
        let dropped = total - entries.len();

        let store = Self {
            path,
            policy,
            state: Mutex::new(BlacklistState {
                entries,
                failures: HashMap::new(),
            }),
            write_lock: tokio::sync::Mutex::new(()),
        };

        if dropped > 0 {
            tracing::info!(
                "Dropped {} expired blacklist entries from {}",
                dropped,
                store.path.display()
            );
            store.flush().await?;
        }

        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, BlacklistState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &BlacklistPolicy {
        &self.policy
    }

    pub fn contains(&self, file_path: &str) -> bool {
        self.lock().entries.contains_key(file_path)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failure_count(&self, file_path: &str) -> u32 {
        self.lock().failures.get(file_path).copied().unwrap_or(0)
    }

    /// Count a failure; promote and persist once the threshold is reached.
    ///
    /// Returns `true` when this call blacklisted the path.
    pub async fn record_failure(
        &self,
        file_path: &str,
        file_name: &str,
    ) -> Result<bool, BlacklistError> {
        let promoted = {
            let mut state = self.lock();
            let count = state.failures.entry(file_path.to_string()).or_insert(0);
            *count += 1;
            let count = *count;

            if count >= self.policy.threshold && !state.entries.contains_key(file_path) {
                state.entries.insert(
                    file_path.to_string(),
                    BlacklistEntry {
                        file_path: file_path.to_string(),
                        file_name: file_name.to_string(),
                        added_at: Utc::now(),
                        failure_count: count,
                    },
                );
                true
            } else {
                false
            }
        };

        if promoted {
            tracing::warn!("Blacklisted {} after repeated failures", file_name);
            self.flush().await?;
        }
        Ok(promoted)
    }

    /// Blacklist immediately, regardless of the failure count.
    ///
    /// The stored count is at least the promotion threshold. Returns `true`
    /// if the path was not already blacklisted.
    pub async fn force_blacklist(
        &self,
        file_path: &str,
        file_name: &str,
    ) -> Result<bool, BlacklistError> {
        let inserted = {
            let mut state = self.lock();
            if state.entries.contains_key(file_path) {
                false
            } else {
                let observed = state.failures.get(file_path).copied().unwrap_or(0);
                state.entries.insert(
                    file_path.to_string(),
                    BlacklistEntry {
                        file_path: file_path.to_string(),
                        file_name: file_name.to_string(),
                        added_at: Utc::now(),
                        failure_count: observed.max(self.policy.threshold),
                    },
                );
                true
            }
        };

        if inserted {
            self.flush().await?;
        }
        Ok(inserted)
    }

    /// Forget the in-memory failure count after a successful download.
    pub fn reset_failures(&self, file_path: &str) {
        self.lock().failures.remove(file_path);
    }

    /// Entries sorted by the time they were added.
    pub fn entries(&self) -> Vec<BlacklistEntry> {
        let mut entries: Vec<_> = self.lock().entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        entries
    }

    pub fn expires_at(&self, entry: &BlacklistEntry) -> DateTime<Utc> {
        entry.added_at + self.policy.expiry
    }

    /// Remove one entry. The caller decides when to flush.
    pub fn remove(&self, file_path: &str) -> bool {
        let mut state = self.lock();
        state.failures.remove(file_path);
        state.entries.remove(file_path).is_some()
    }

    /// Remove every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        state.failures.clear();
        let removed = state.entries.len();
        state.entries.clear();
        removed
    }

    /// Rewrite `blacklist.json` from the in-memory entries.
    pub async fn flush(&self) -> Result<(), BlacklistError> {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string_pretty(&self.entries())?;

        let write_err = |source| BlacklistError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}
