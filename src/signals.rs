//! Filesystem build-status protocol.
//!
//! Two files are the only channel between the build tool and every host
//! process observing it:
//!
//! - the lock file exists while a build pass is in progress. The watch-mode
//!   build tool removes it when a pass completes and recreates it when the
//!   next pass starts.
//! - the error file holds diagnostics from the last failed build. Empty or
//!   absent means no recorded failure.
//!
//! Nothing here holds in-process state, so any number of processes may
//! observe the same pair.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct BuildSignals {
    lockfile: PathBuf,
    error_file: PathBuf,
}

impl BuildSignals {
    pub fn new(lockfile: impl Into<PathBuf>, error_file: impl Into<PathBuf>) -> Self {
        Self {
            lockfile: lockfile.into(),
            error_file: error_file.into(),
        }
    }

    pub fn lockfile(&self) -> &Path {
        &self.lockfile
    }

    pub fn error_file(&self) -> &Path {
        &self.error_file
    }

    /// Creates the lock file if missing, marking a build as in progress.
    pub fn lock(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.lockfile)?;
        Ok(())
    }

    /// Removes the lock file. Missing is fine.
    pub fn unlock(&self) -> Result<()> {
        match std::fs::remove_file(&self.lockfile) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Returns true while the lock file exists.
    pub fn in_progress(&self) -> bool {
        self.lockfile.exists()
    }

    /// Returns true if the error file is non-empty.
    pub fn has_error(&self) -> bool {
        std::fs::metadata(&self.error_file)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    /// Lines of the error file, or `None` when no failure is recorded.
    pub fn error_trace(&self) -> Result<Option<Vec<String>>> {
        let content = match std::fs::read_to_string(&self.error_file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(content.lines().map(str::to_string).collect()))
    }

    /// Deletes a non-empty error file left behind by an earlier run.
    ///
    /// Returns true if a stale failure was cleared.
    pub fn reset_error(&self) -> Result<bool> {
        if !self.has_error() {
            return Ok(false);
        }
        match std::fs::remove_file(&self.error_file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
