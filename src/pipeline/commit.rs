//! All-or-nothing replacement of a run's artifacts.
//!
//! Every artifact is first written to a `.partial` sibling. PERSIST then
//! moves the staged files over their targets through a [`Commit`], keeping
//! each previous file as a `.prev` sibling until the last-run record has
//! been written. If anything fails before that, the commit is dropped
//! unfinished and every target is put back.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::run_state::append_log;
use crate::error::Result;

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Where a run stages `target` before it commits.
pub fn staged_path(target: &Path) -> PathBuf {
    sibling(target, ".partial")
}

fn backup_path(target: &Path) -> PathBuf {
    sibling(target, ".prev")
}

/// Staged files owned by one run. Whatever still sits at a staged path
/// when this drops is deleted, so an abandoned or failed run leaves
/// nothing behind. Files already moved into place are unaffected.
#[derive(Debug, Default)]
pub struct Staging {
    paths: Vec<PathBuf>,
}

impl Staging {
    /// Register `target` and return the path to write it at.
    pub fn stage(&mut self, target: &Path) -> PathBuf {
        let path = staged_path(target);
        self.paths.push(path.clone());
        path
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed staged artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged artifact"),
            }
        }
    }
}

#[derive(Debug)]
struct Replaced {
    target: PathBuf,
    backup: Option<PathBuf>,
}

#[derive(Debug)]
struct LogMark {
    path: PathBuf,
    /// Length before the append; `None` if the log did not exist.
    len: Option<u64>,
}

/// An in-progress swap of staged artifacts onto their targets. Dropping it
/// without [`Commit::finish`] restores every previous file.
#[derive(Debug, Default)]
pub struct Commit {
    replaced: Vec<Replaced>,
    log: Option<LogMark>,
    finished: bool,
}

impl Commit {
    /// Move `staged` onto `target`, keeping any previous file aside.
    pub fn replace(&mut self, staged: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let backup = match fs::symlink_metadata(target) {
            Ok(meta) if meta.is_dir() => {
                let msg = format!("{} is a directory", target.display());
                return Err(io::Error::other(msg).into());
            }
            Ok(_) => {
                let backup = backup_path(target);
                fs::rename(target, &backup)?;
                Some(backup)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = fs::rename(staged, target) {
            if let Some(backup) = &backup {
                restore(backup, target);
            }
            return Err(e.into());
        }
        self.replaced.push(Replaced {
            target: target.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Append `line` to the run log. Rolled back by truncation.
    pub fn append_log(&mut self, path: &Path, line: &str) -> Result<()> {
        let len = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => {
                let msg = format!("{} is not a regular file", path.display());
                return Err(io::Error::other(msg).into());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        self.log = Some(LogMark {
            path: path.to_path_buf(),
            len,
        });
        append_log(path, line)
    }

    /// Keep the new artifacts and discard the previous ones.
    pub fn finish(mut self) {
        self.finished = true;
        for r in &self.replaced {
            if let Some(backup) = &r.backup {
                if let Err(e) = fs::remove_file(backup) {
                    warn!(path = %backup.display(), error = %e, "failed to remove previous artifact");
                }
            }
        }
    }

    fn rollback(&mut self) {
        if let Some(mark) = self.log.take() {
            let undone = match mark.len {
                Some(len) => OpenOptions::new()
                    .write(true)
                    .open(&mark.path)
                    .and_then(|f| f.set_len(len)),
                None => fs::remove_file(&mark.path),
            };
            if let Err(e) = undone {
                warn!(path = %mark.path.display(), error = %e, "failed to roll back run log");
            }
        }
        for r in self.replaced.drain(..).rev() {
            match &r.backup {
                Some(backup) => restore(backup, &r.target),
                None => {
                    if let Err(e) = fs::remove_file(&r.target) {
                        warn!(path = %r.target.display(), error = %e, "failed to remove uncommitted artifact");
                    }
                }
            }
        }
    }
}

impl Drop for Commit {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

fn restore(backup: &Path, target: &Path) {
    match fs::rename(backup, target) {
        Ok(()) => debug!(path = %target.display(), "restored previous artifact"),
        Err(e) => warn!(path = %target.display(), error = %e, "failed to restore previous artifact"),
    }
}
