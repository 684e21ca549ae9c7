//! Extracting and validating a localization package before it touches the target.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use super::InstallFailure;
use super::layout::{GLOBAL_INI, LOCALIZATION_DIR, TargetLayout};
use crate::constants::SIGNATURE_EXTENSION;
use crate::utils::archive::extract_archive;

/// An extracted package. The staging directory is deleted on drop.
#[derive(Debug)]
pub struct StagedPackage {
    _staging: TempDir,
    layout: TargetLayout,
    files: Vec<PathBuf>,
}

impl StagedPackage {
    /// Root of the package content (wrapping directory already stripped).
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn core_module(&self) -> PathBuf {
        self.layout.core_module()
    }

    /// Files to apply, relative to [`root`](Self::root). Signatures are excluded.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Extracts `package` into a fresh staging directory and validates its structure.
pub fn stage_package(package: &Path) -> Result<StagedPackage, InstallFailure> {
    let staging = TempDir::new().map_err(|source| InstallFailure::File {
        path: std::env::temp_dir(),
        source,
    })?;
    extract_archive(package, staging.path())
        .map_err(|e| InstallFailure::Package(format!("{}: {e}", package.display())))?;

    let root = content_root(staging.path());
    let layout = TargetLayout::new(&root);
    validate(&layout)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry.map_err(|e| InstallFailure::Package(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_some_and(|ext| ext == SIGNATURE_EXTENSION) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(&root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    debug!(package = %package.display(), files = files.len(), "Package staged");

    Ok(StagedPackage {
        _staging: staging,
        layout,
        files,
    })
}

/// GitHub source archives wrap everything in `<repo>-<sha>/`; strip that single level.
fn content_root(staging: &Path) -> PathBuf {
    if TargetLayout::new(staging).localization_dir().is_dir() {
        return staging.to_path_buf();
    }
    let entries: Vec<_> = match fs::read_dir(staging) {
        Ok(rd) => rd.filter_map(Result::ok).collect(),
        Err(_) => return staging.to_path_buf(),
    };
    match entries.as_slice() {
        [only] if only.path().is_dir() => only.path(),
        _ => staging.to_path_buf(),
    }
}

fn validate(layout: &TargetLayout) -> Result<(), InstallFailure> {
    if !layout.core_module().is_file() {
        return Err(InstallFailure::Package("package has no localization core module".to_string()));
    }
    let localization = layout.localization_dir();
    if !localization.is_dir() {
        return Err(InstallFailure::Package(format!(
            "package has no {} directory",
            LOCALIZATION_DIR.join("/")
        )));
    }
    let has_strings = WalkDir::new(&localization)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file() && e.file_name().eq_ignore_ascii_case(GLOBAL_INI));
    if !has_strings {
        return Err(InstallFailure::Package(format!("package contains no {GLOBAL_INI}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{PackageBuilder, write_zip};

    #[test]
    fn test_wrapping_directory_is_stripped() {
        let temp = TempDir::new().unwrap();
        let zip = PackageBuilder::new().wrapped("repo-abc123").write(&temp.path().join("p.zip"));

        let staged = stage_package(&zip).unwrap();
        assert!(staged.core_module().is_file());
        assert!(staged.files().contains(&PathBuf::from("data/Localization/korean_(south_korea)/global.ini")));
    }

    #[test]
    fn test_unwrapped_package_is_accepted() {
        let temp = TempDir::new().unwrap();
        let zip = PackageBuilder::new().write(&temp.path().join("p.zip"));
        let staged = stage_package(&zip).unwrap();
        assert_eq!(staged.files().len(), 2);
    }

    #[test]
    fn test_signatures_are_not_applied() {
        let temp = TempDir::new().unwrap();
        let zip = PackageBuilder::new()
            .file("Bin64/dbghelp.dll.sig", b"sig")
            .write(&temp.path().join("p.zip"));
        let staged = stage_package(&zip).unwrap();
        assert!(staged.files().iter().all(|f| f.extension().is_none_or(|e| e != "sig")));
    }

    #[test]
    fn test_structure_validation() {
        let temp = TempDir::new().unwrap();

        let no_module = temp.path().join("no_module.zip");
        write_zip(&no_module, &[("data/Localization/a/global.ini", b"x".as_slice())]);
        assert!(matches!(stage_package(&no_module), Err(InstallFailure::Package(_))));

        let no_strings = temp.path().join("no_strings.zip");
        write_zip(
            &no_strings,
            &[("Bin64/dbghelp.dll", b"x".as_slice()), ("data/Localization/a/readme.txt", b"x")],
        );
        assert!(matches!(stage_package(&no_strings), Err(InstallFailure::Package(_))));

        let garbage = temp.path().join("garbage.zip");
        fs::write(&garbage, b"garbage").unwrap();
        assert!(matches!(stage_package(&garbage), Err(InstallFailure::Package(_))));
    }
}
