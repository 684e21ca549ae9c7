//! Zip extraction for downloaded packages.
//!
//! Entry names are resolved with [`zip::read::ZipFile::enclosed_name`], so an
//! archive cannot write outside the destination directory (absolute paths and
//! `..` components are rejected rather than skipped).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive entry escapes the destination: {0}")]
    UnsafePath(String),
}

/// Extracts every entry of `archive` below `dest`, returning the number of files written.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    };

    let file = File::open(archive).map_err(io_err(archive))?;
    let mut zip = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest).map_err(io_err(dest))?;

    let mut files = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut out = File::create(&out_path).map_err(io_err(&out_path))?;
        io::copy(&mut entry, &mut out).map_err(io_err(&out_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))
                .map_err(io_err(&out_path))?;
        }
        files += 1;
    }

    debug!(archive = %archive.display(), files, "Archive extracted");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_zip;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_nested_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pkg.zip");
        write_zip(&archive, &[("top/a.txt", b"a".as_slice()), ("top/sub/b.txt", b"b")]);

        let dest = temp.path().join("out");
        assert_eq!(extract_archive(&archive, &dest).unwrap(), 2);
        assert_eq!(fs::read(dest.join("top/sub/b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"x".as_slice())]);

        let err = extract_archive(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafePath(_)));
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_not_a_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();
        assert!(matches!(
            extract_archive(&archive, &temp.path().join("out")),
            Err(ArchiveError::Zip(_))
        ));
    }
}
