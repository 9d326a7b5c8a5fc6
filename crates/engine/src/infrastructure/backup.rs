//! Timestamped configuration backups.
//!
//! Backups are verbatim copies of the live config file named
//! `aethelon_backup_<yyyyMMdd_HHmmss>.json` inside a `backups/` directory.
//! Every operation here is best-effort: failures are logged and reported as
//! `None`/`false`, never propagated.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::infrastructure::ports::ClockPort;

pub const BACKUP_PREFIX: &str = "aethelon_backup_";
pub const BACKUP_EXTENSION: &str = ".json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

pub const DEFAULT_MAX_BACKUPS: usize = 10;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

/// A backup file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Known only for backups created by this process
    pub reason: Option<String>,
    pub size_bytes: u64,
    /// Disambiguates backups taken within the same second
    sequence: u32,
}

/// Count and age limits, applied independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_backups: usize,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_backups: DEFAULT_MAX_BACKUPS,
            max_age: Duration::days(DEFAULT_MAX_AGE_DAYS),
        }
    }
}

pub struct BackupStore {
    config_path: PathBuf,
    backup_dir: PathBuf,
    retention: RetentionPolicy,
    clock: Arc<dyn ClockPort>,
}

impl BackupStore {
    pub fn new(
        config_path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            backup_dir: backup_dir.into(),
            retention: RetentionPolicy::default(),
            clock,
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy the live config file into the backup directory, then apply the
    /// retention policy.
    pub fn create_backup(&self, reason: &str) -> Option<BackupRecord> {
        if !self.config_path.exists() {
            tracing::warn!(
                path = %self.config_path.display(),
                reason,
                "Config file does not exist, skipping backup"
            );
            return None;
        }

        if let Err(e) = fs::create_dir_all(&self.backup_dir) {
            tracing::error!(
                error = %e,
                dir = %self.backup_dir.display(),
                "Failed to create backup directory"
            );
            return None;
        }

        let created_at = self.clock.now();
        let stamp = created_at.format(TIMESTAMP_FORMAT).to_string();
        let (path, sequence) = self.free_backup_path(&stamp);

        let size_bytes = match fs::copy(&self.config_path, &path) {
            Ok(size) => size,
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "Failed to create backup");
                return None;
            }
        };

        tracing::info!(path = %path.display(), reason, size_bytes, "Created config backup");

        let record = BackupRecord {
            path,
            // the filename only keeps second precision
            created_at: parse_timestamp(&stamp).unwrap_or(created_at),
            reason: Some(reason.to_string()),
            size_bytes,
            sequence,
        };

        self.cleanup_old_backups();
        Some(record)
    }

    fn free_backup_path(&self, stamp: &str) -> (PathBuf, u32) {
        let mut sequence = 0;
        loop {
            let name = if sequence == 0 {
                format!("{}{}{}", BACKUP_PREFIX, stamp, BACKUP_EXTENSION)
            } else {
                format!("{}{}_{}{}", BACKUP_PREFIX, stamp, sequence, BACKUP_EXTENSION)
            };
            let path = self.backup_dir.join(name);
            if !path.exists() {
                return (path, sequence);
            }
            sequence += 1;
        }
    }

    /// Overwrite the live config with a backup's bytes. The current file is
    /// backed up first; if that safety backup fails nothing is overwritten.
    pub fn restore_from_backup(&self, record: &BackupRecord) -> bool {
        // read before the safety backup: its cleanup pass may prune `record`
        let bytes = match fs::read(&record.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, path = %record.path.display(), "Failed to read backup");
                return false;
            }
        };

        if self.config_path.exists() && self.create_backup("pre-restore").is_none() {
            tracing::error!("Could not back up current config, aborting restore");
            return false;
        }

        if let Some(parent) = self.config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!(error = %e, "Failed to create config directory");
                return false;
            }
        }

        match fs::write(&self.config_path, bytes) {
            Ok(()) => {
                tracing::info!(backup = %record.path.display(), "Restored config from backup");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write restored config");
                false
            }
        }
    }

    /// All parseable backups, newest first.
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, "Failed to list backup directory");
                }
                return Vec::new();
            }
        };

        let mut records: Vec<BackupRecord> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let (created_at, sequence) = parse_backup_name(name.to_str()?)?;
                let size_bytes = entry.metadata().ok()?.len();
                Some(BackupRecord {
                    path: entry.path(),
                    created_at,
                    reason: None,
                    size_bytes,
                    sequence,
                })
            })
            .collect();

        records.sort_by(|a, b| {
            (b.created_at, b.sequence).cmp(&(a.created_at, a.sequence))
        });
        records
    }

    /// Delete backups beyond the newest `max_backups`, and independently any
    /// backup older than `max_age`. Returns how many were deleted.
    pub fn cleanup_old_backups(&self) -> usize {
        let cutoff = self.clock.now() - self.retention.max_age;
        let mut deleted = 0;

        for (index, record) in self.list_backups().into_iter().enumerate() {
            let over_count = index >= self.retention.max_backups;
            let too_old = record.created_at < cutoff;
            if !(over_count || too_old) {
                continue;
            }
            match fs::remove_file(&record.path) {
                Ok(()) => {
                    tracing::debug!(
                        path = %record.path.display(),
                        over_count,
                        too_old,
                        "Deleted old backup"
                    );
                    deleted += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %record.path.display(), "Failed to delete old backup");
                }
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up old config backups");
        }
        deleted
    }

    /// A backup is valid when it exists, has exactly the recorded size, and
    /// parses as JSON.
    pub fn validate_backup(&self, record: &BackupRecord) -> bool {
        let bytes = match fs::read(&record.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, path = %record.path.display(), "Backup unreadable");
                return false;
            }
        };
        if bytes.len() as u64 != record.size_bytes {
            tracing::warn!(
                path = %record.path.display(),
                expected = record.size_bytes,
                actual = bytes.len(),
                "Backup size mismatch"
            );
            return false;
        }
        if let Err(e) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            tracing::warn!(error = %e, path = %record.path.display(), "Backup is not valid JSON");
            return false;
        }
        true
    }
}

fn parse_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// `aethelon_backup_20240501_120000.json` or `..._120000_2.json`
fn parse_backup_name(name: &str) -> Option<(DateTime<Utc>, u32)> {
    let stem = name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_EXTENSION)?;
    if stem.len() < TIMESTAMP_LEN || !stem.is_char_boundary(TIMESTAMP_LEN) {
        return None;
    }
    let (stamp, rest) = stem.split_at(TIMESTAMP_LEN);
    let sequence = match rest {
        "" => 0,
        _ => rest.strip_prefix('_')?.parse().ok()?,
    };
    Some((parse_timestamp(stamp)?, sequence))
}
