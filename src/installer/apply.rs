//! Two-phase application of staged files onto a target directory.
//!
//! Phase one copies every file next to its destination as `<name>.sctools-new`.
//! Phase two renames the copies into place, moving any existing file aside as
//! `<name>.sctools-old`. A failure in either phase undoes everything done so far,
//! so the target is either fully updated or left as it was. Backups are deleted
//! only after the last rename succeeded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::InstallFailure;
use crate::utils::fs::{remove_file_if_exists, sibling_with_suffix};

const NEW_SUFFIX: &str = "sctools-new";
const OLD_SUFFIX: &str = "sctools-old";

#[derive(Debug)]
pub(crate) struct PendingFile {
    pub(crate) dest: PathBuf,
    pub(crate) new: PathBuf,
    pub(crate) old: PathBuf,
}

impl PendingFile {
    fn new(dest: PathBuf) -> Self {
        Self {
            new: sibling_with_suffix(&dest, NEW_SUFFIX),
            old: sibling_with_suffix(&dest, OLD_SUFFIX),
            dest,
        }
    }
}

/// Copies `files` (relative to `source_root`) onto `target_root` atomically as a set.
pub fn apply_files(source_root: &Path, files: &[PathBuf], target_root: &Path) -> Result<(), InstallFailure> {
    let mut created_dirs = Vec::new();
    let mut pending = Vec::with_capacity(files.len());

    for relative in files {
        let file = PendingFile::new(target_root.join(relative));
        let staged = stage_copy(&source_root.join(relative), &file, &mut created_dirs);
        // record before checking so a partially written temp is cleaned up too
        pending.push(file);
        if let Err(source) = staged {
            let path = pending.last().map(|f| f.dest.clone()).unwrap_or_default();
            discard_new(&pending);
            remove_created_dirs(&created_dirs);
            return Err(InstallFailure::File { path, source });
        }
    }

    if let Err((path, source)) = commit_renames(&pending) {
        remove_created_dirs(&created_dirs);
        return Err(InstallFailure::File { path, source });
    }

    for file in &pending {
        if let Err(e) = remove_file_if_exists(&file.old) {
            warn!(path = %file.old.display(), error = %e, "Failed to remove backup file");
        }
    }
    debug!(game_dir = %target_root.display(), files = pending.len(), "Files applied");
    Ok(())
}

fn stage_copy(src: &Path, file: &PendingFile, created_dirs: &mut Vec<PathBuf>) -> io::Result<()> {
    if let Some(parent) = file.dest.parent() {
        create_missing_dirs(parent, created_dirs)?;
    }
    fs::copy(src, &file.new)?;
    Ok(())
}

/// Creates `dir` one level at a time, outermost first, recording each new
/// directory as soon as it exists so a failure further down still rolls it back.
fn create_missing_dirs(dir: &Path, created_dirs: &mut Vec<PathBuf>) -> io::Result<()> {
    let missing: Vec<&Path> = dir.ancestors().take_while(|p| !p.exists()).collect();
    for level in missing.into_iter().rev() {
        match fs::create_dir(level) {
            Ok(()) => created_dirs.push(level.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && level.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Renames every `new` into place. On failure restores all earlier destinations
/// and discards the remaining temp copies.
pub(crate) fn commit_renames(pending: &[PendingFile]) -> Result<(), (PathBuf, io::Error)> {
    // (index, had_backup) for each destination already touched
    let mut done: Vec<(usize, bool)> = Vec::with_capacity(pending.len());

    for (index, file) in pending.iter().enumerate() {
        let had_backup = file.dest.exists();
        if had_backup {
            if let Err(e) = fs::rename(&file.dest, &file.old) {
                rollback(pending, &done);
                discard_new(&pending[index..]);
                return Err((file.dest.clone(), e));
            }
        }
        if let Err(e) = fs::rename(&file.new, &file.dest) {
            if had_backup {
                if let Err(restore) = fs::rename(&file.old, &file.dest) {
                    warn!(path = %file.dest.display(), error = %restore, "Failed to restore backup");
                }
            }
            rollback(pending, &done);
            discard_new(&pending[index..]);
            return Err((file.dest.clone(), e));
        }
        done.push((index, had_backup));
    }
    Ok(())
}

fn rollback(pending: &[PendingFile], done: &[(usize, bool)]) {
    for &(index, had_backup) in done.iter().rev() {
        let file = &pending[index];
        let restored = if had_backup {
            fs::rename(&file.old, &file.dest)
        } else {
            remove_file_if_exists(&file.dest)
        };
        if let Err(e) = restored {
            warn!(path = %file.dest.display(), error = %e, "Rollback step failed");
        }
    }
}

fn discard_new(pending: &[PendingFile]) {
    for file in pending {
        if let Err(e) = remove_file_if_exists(&file.new) {
            debug!(path = %file.new.display(), error = %e, "Failed to remove temp copy");
        }
    }
}

fn remove_created_dirs(created: &[PathBuf]) {
    for dir in created.iter().rev() {
        // only empty dirs; anything else was not ours
        let _ = fs::remove_dir(dir);
    }
}
