// audiobook-engine - Chapter download and playback engine for audiobooks
// Copyright (C) 2025 audiobook-engine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Chapter file deletion
//!
//! # Key Operations
//! - Safe delete with retry
//! - Rename-then-delete for filesystems that refuse to recreate a file
//!   under a name that was just deleted
//! - Post-delete verification
//!
//! Operations here are synchronous: they run under a download task's state
//! lock and touch a single local file.

use crate::error::{AudiobookError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum attempts for a delete operation
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Pause between delete attempts
const RETRY_DELAY: Duration = Duration::from_millis(25);

/// How downloaded chapter files are removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStrategy {
    /// Remove the file in place
    Direct,

    /// Rename to a random sibling name, delete that, then verify
    ///
    /// A chapter is often re-downloaded right after deletion under the same
    /// name; some filesystems fail that recreation when the old entry is
    /// still being torn down.
    RenameThenDelete,
}

impl Default for DeletionStrategy {
    fn default() -> Self {
        DeletionStrategy::RenameThenDelete
    }
}

/// File manager for chapter data
#[derive(Debug, Clone, Copy, Default)]
pub struct FileManager {
    strategy: DeletionStrategy,
}

impl FileManager {
    pub fn new(strategy: DeletionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DeletionStrategy {
        self.strategy
    }

    /// Safe delete operation with retry
    ///
    /// Deleting a file that does not exist succeeds.
    pub fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.safe_delete_once(path) {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(AudiobookError::FileIoError(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, attempt = attempts, "delete failed, retrying");
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    /// Try to delete file once
    fn safe_delete_once(&self, path: &Path) -> Result<()> {
        if !Self::file_exists(path) {
            return Ok(());
        }

        match self.strategy {
            DeletionStrategy::Direct => {
                fs::remove_file(path).map_err(|e| {
                    AudiobookError::FileIoError(format!("Delete failed: {}: {}", path.display(), e))
                })?;
            }
            DeletionStrategy::RenameThenDelete => {
                let doomed = Self::doomed_name(path);
                fs::rename(path, &doomed).map_err(|e| {
                    AudiobookError::FileIoError(format!(
                        "Rename before delete failed: {} -> {}: {}",
                        path.display(),
                        doomed.display(),
                        e
                    ))
                })?;
                fs::remove_file(&doomed).map_err(|e| {
                    AudiobookError::FileIoError(format!(
                        "Delete failed: {}: {}",
                        doomed.display(),
                        e
                    ))
                })?;
                if Self::file_exists(&doomed) {
                    return Err(AudiobookError::FileIoError(format!(
                        "File still exists after delete: {}",
                        doomed.display()
                    )));
                }
            }
        }

        debug!(path = %path.display(), strategy = ?self.strategy, "deleted file");
        Ok(())
    }

    /// Random sibling name used by rename-then-delete
    fn doomed_name(path: &Path) -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}.{:016x}.deleted", name, suffix))
    }

    /// Ensure directory exists, creating parent directories as needed
    pub fn ensure_directory_exists(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }

        fs::create_dir_all(path).map_err(|e| {
            AudiobookError::FileIoError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Check if file exists
    pub fn file_exists(path: &Path) -> bool {
        path.try_exists().unwrap_or(false)
    }

    /// Move a finished download into place
    pub fn promote(source: &Path, destination: &Path) -> Result<()> {
        fs::rename(source, destination).map_err(|e| {
            AudiobookError::FileIoError(format!(
                "Move failed: {} -> {}: {}",
                source.display(),
                destination.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftover_entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_direct_delete() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chapter-0000.audio");
        fs::write(&file, b"abc").unwrap();

        FileManager::new(DeletionStrategy::Direct).safe_delete(&file).unwrap();
        assert!(!file.exists());
        assert_eq!(leftover_entries(dir.path()), 0);
    }

    #[test]
    fn test_rename_then_delete_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chapter-0001.audio");
        fs::write(&file, b"abc").unwrap();

        FileManager::new(DeletionStrategy::RenameThenDelete)
            .safe_delete(&file)
            .unwrap();
        assert!(!file.exists());
        assert_eq!(leftover_entries(dir.path()), 0);

        // The same name can be reused immediately
        fs::write(&file, b"def").unwrap();
        assert!(file.exists());
    }

    #[test]
    fn test_delete_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.audio");
        FileManager::default().safe_delete(&file).unwrap();
    }

    #[test]
    fn test_doomed_name_is_sibling() {
        let doomed = FileManager::doomed_name(Path::new("/tmp/x/chapter.audio"));
        assert_eq!(doomed.parent(), Some(Path::new("/tmp/x")));
        assert!(doomed.to_string_lossy().ends_with(".deleted"));
    }

    #[test]
    fn test_delete_gives_up_after_spaced_retries() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be removed as a file
        let blocker = dir.path().join("chapter-0000.audio");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("inner"), b"x").unwrap();

        let started = std::time::Instant::now();
        let err = FileManager::new(DeletionStrategy::Direct)
            .safe_delete(&blocker)
            .unwrap_err();

        assert!(err.to_string().contains("after 3 attempts"));
        assert!(started.elapsed() >= RETRY_DELAY * (MAX_RETRY_ATTEMPTS - 1));
        assert!(blocker.exists());
    }
}
