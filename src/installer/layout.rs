//! Files that make up an installed localization inside a game directory.

use std::path::{Path, PathBuf};

use super::InstallationState;

/// Localization content directory, relative to the game root.
pub const LOCALIZATION_DIR: [&str; 2] = ["data", "Localization"];
/// Core module that enables the localization.
pub const CORE_MODULE: [&str; 2] = ["Bin64", "dbghelp.dll"];
/// Core module renamed while the localization is disabled.
pub const DISABLED_CORE_MODULE: [&str; 2] = ["Bin64", "dbghelp.dll.disabled"];
/// Per-language string table a valid package must contain.
pub const GLOBAL_INI: &str = "global.ini";

fn join_all(root: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Paths of the localization files below a root (a game directory or a staged package).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn localization_dir(&self) -> PathBuf {
        join_all(&self.root, &LOCALIZATION_DIR)
    }

    pub fn core_module(&self) -> PathBuf {
        join_all(&self.root, &CORE_MODULE)
    }

    pub fn disabled_core_module(&self) -> PathBuf {
        join_all(&self.root, &DISABLED_CORE_MODULE)
    }

    /// Probes the filesystem; the installation record is never consulted.
    pub fn state(&self) -> InstallationState {
        if self.core_module().is_file() {
            InstallationState::Enabled
        } else if self.disabled_core_module().is_file() {
            InstallationState::Disabled
        } else {
            InstallationState::NotInstalled
        }
    }
}
