use crate::concurrency::JournalLock;
use crate::guard::InventoryBackup;
use crate::CoreError;
use loadouts_schema::UserId;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Lock file inside a journal directory.
pub const LOCK_FILE: &str = ".lock";

/// On-disk mirror of in-memory inventory backups.
///
/// Every edit writes `<user>.json` before the live inventory is cleared and
/// removes it once the original is back. Entries that are still present at
/// startup belong to edits a crashed process never finished.
#[derive(Debug)]
pub struct BackupJournal {
    dir: PathBuf,
    _lock: JournalLock,
}

/// Read-only summary of a journal directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalReport {
    pub entries: Vec<UserId>,
    pub corrupt: Vec<PathBuf>,
}

impl BackupJournal {
    /// Open `dir`, creating it if needed, and take its lock.
    ///
    /// Fails when another process already holds the journal.
    pub fn open(dir: &Path) -> Result<Self, CoreError> {
        fs::create_dir_all(dir)?;
        let lock_path = dir.join(LOCK_FILE);
        let lock = JournalLock::try_acquire(&lock_path)?.ok_or_else(|| {
            CoreError::Journal(format!(
                "{} is in use by another process",
                dir.display()
            ))
        })?;
        debug!("backup journal opened at {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&self, backup: &InventoryBackup) -> Result<(), CoreError> {
        let content = serde_json::to_string_pretty(backup)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        let dest = self.entry_path(backup.user);
        tmp.persist(&dest).map_err(|e| CoreError::Io(e.error))?;
        fsync_dir(&self.dir)?;
        debug!("journaled inventory backup for {}", backup.user);
        Ok(())
    }

    pub fn clear(&self, user: UserId) -> Result<(), CoreError> {
        let path = self.entry_path(user);
        if path.exists() {
            fs::remove_file(&path)?;
            fsync_dir(&self.dir)?;
            debug!("cleared journal entry for {user}");
        }
        Ok(())
    }

    /// Load every leftover entry. Corrupt or unreadable ones are removed.
    pub fn list_orphans(&self) -> Result<Vec<InventoryBackup>, CoreError> {
        let mut orphans = Vec::new();
        for path in entry_files(&self.dir)? {
            match read_entry(&path) {
                Ok(backup) => orphans.push(backup),
                Err(e) => {
                    warn!("corrupt journal entry {}: {e}", path.display());
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("failed to remove {}: {e}", path.display());
                    }
                }
            }
        }
        orphans.sort_by(|a, b| a.taken_at.cmp(&b.taken_at));
        if !orphans.is_empty() {
            info!(
                "found {} inventory backups from an interrupted run",
                orphans.len()
            );
        }
        Ok(orphans)
    }

    /// Inspect a journal directory without locking or modifying it.
    pub fn inspect(dir: &Path) -> Result<JournalReport, CoreError> {
        let mut report = JournalReport::default();
        if !dir.exists() {
            return Ok(report);
        }
        for path in entry_files(dir)? {
            match read_entry(&path) {
                Ok(backup) => report.entries.push(backup.user),
                Err(_) => report.corrupt.push(path),
            }
        }
        Ok(report)
    }

    fn entry_path(&self, user: UserId) -> PathBuf {
        self.dir.join(format!("{user}.json"))
    }
}

fn entry_files(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_entry(path: &Path) -> Result<InventoryBackup, CoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn fsync_dir(dir: &Path) -> Result<(), CoreError> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}
