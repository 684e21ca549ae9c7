//! Applying and removing localization packages in a game directory.
//!
//! # State Machine
//!
//! ```text
//! NotInstalled --install ok--> Enabled <--revert--> Disabled
//! Enabled | Disabled --uninstall Success|Partial--> NotInstalled
//! uninstall Failed leaves the state unchanged
//! ```
//!
//! The state is always derived from the files on disk (see
//! [`layout::TargetLayout::state`]); installation records never decide it.
//!
//! # Install Pipeline
//!
//! 1. extract the zip into a temporary staging directory (zip-slip safe)
//! 2. strip a single wrapping directory, validate the package structure
//! 3. verify the core module signature when a trust anchor is configured
//! 4. two-phase apply (see [`apply`]); the target is untouched on any failure
//! 5. remove a leftover disabled core module
//!
//! All methods are synchronous. Async callers run them in `spawn_blocking`.

pub mod apply;
pub mod layout;
pub mod package;
pub mod target_lock;


use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::utils::fs::remove_file_if_exists;
use crate::verification::PackageVerifier;

pub use layout::TargetLayout;
pub use target_lock::TargetLock;

/// Derived installation state of a target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationState {
    NotInstalled,
    Enabled,
    Disabled,
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallationState::NotInstalled => "not installed",
            InstallationState::Enabled => "enabled",
            InstallationState::Disabled => "disabled",
        })
    }
}

/// Outcome of [`Installer::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Success,
    /// Archive unreadable or structurally invalid
    PackageError,
    /// Core module signature rejected
    VerifyError,
    /// Writing to the target failed; changes were rolled back
    FileError,
    UnknownError,
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallStatus::Success => "success",
            InstallStatus::PackageError => "the package is damaged or not a localization package",
            InstallStatus::VerifyError => "the package signature could not be verified",
            InstallStatus::FileError => "files in the game directory could not be written",
            InstallStatus::UnknownError => "an unexpected error occurred",
        })
    }
}

/// Outcome of [`Installer::uninstall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStatus {
    Success,
    /// Core module removed, some localization files remain
    Partial,
    /// Core module could not be removed; nothing else was touched
    Failed,
}

/// Why an install stopped. Mapped onto [`InstallStatus`] at the trait boundary.
#[derive(Error, Debug)]
pub enum InstallFailure {
    #[error("invalid package: {0}")]
    Package(String),

    #[error("verification failed: {0}")]
    Verify(String),

    #[error("failed to write {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Unknown(String),
}

impl InstallFailure {
    pub fn status(&self) -> InstallStatus {
        match self {
            InstallFailure::Package(_) => InstallStatus::PackageError,
            InstallFailure::Verify(_) => InstallStatus::VerifyError,
            InstallFailure::File { .. } => InstallStatus::FileError,
            InstallFailure::Unknown(_) => InstallStatus::UnknownError,
        }
    }
}

/// Capability to apply packages to a target directory.
pub trait Installer: Send + Sync {
    fn installation_state(&self, root: &Path) -> InstallationState;

    fn install(&self, package: &Path, root: &Path) -> InstallStatus;

    fn uninstall(&self, root: &Path) -> UninstallStatus;

    /// Toggles Enabled and Disabled by renaming the core module. No-op when not installed.
    fn revert_localization(&self, root: &Path) -> io::Result<InstallationState>;
}

/// Installer for Star Citizen localization packages.
#[derive(Debug, Clone, Default)]
pub struct LocalizationInstaller {
    verifier: Option<PackageVerifier>,
}

impl LocalizationInstaller {
    pub fn new(verifier: Option<PackageVerifier>) -> Self {
        Self { verifier }
    }

    pub fn try_install(&self, package: &Path, root: &Path) -> Result<(), InstallFailure> {
        if !root.is_dir() {
            return Err(InstallFailure::File {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "game directory does not exist"),
            });
        }

        let staged = package::stage_package(package)?;
        if let Some(verifier) = &self.verifier {
            verifier
                .check(&staged.core_module())
                .map_err(|e| InstallFailure::Verify(e.to_string()))?;
        }

        apply::apply_files(staged.root(), staged.files(), root)?;

        let disabled = TargetLayout::new(root).disabled_core_module();
        if let Err(e) = remove_file_if_exists(&disabled) {
            warn!(path = %disabled.display(), error = %e, "Failed to remove disabled core module");
        }
        Ok(())
    }
}

impl Installer for LocalizationInstaller {
    fn installation_state(&self, root: &Path) -> InstallationState {
        TargetLayout::new(root).state()
    }

    fn install(&self, package: &Path, root: &Path) -> InstallStatus {
        match self.try_install(package, root) {
            Ok(()) => {
                info!(game_dir = %root.display(), package = %package.display(), "Localization installed");
                InstallStatus::Success
            }
            Err(failure) => {
                warn!(game_dir = %root.display(), error = %failure, "Localization install failed");
                failure.status()
            }
        }
    }

    fn uninstall(&self, root: &Path) -> UninstallStatus {
        let layout = TargetLayout::new(root);
        for module in [layout.core_module(), layout.disabled_core_module()] {
            if let Err(e) = remove_file_if_exists(&module) {
                warn!(path = %module.display(), error = %e, "Failed to remove core module");
                return UninstallStatus::Failed;
            }
        }

        let localization = layout.localization_dir();
        match fs::remove_dir_all(&localization) {
            Ok(()) => UninstallStatus::Success,
            Err(e) if e.kind() == io::ErrorKind::NotFound => UninstallStatus::Success,
            Err(e) => {
                warn!(path = %localization.display(), error = %e, "Localization files remain");
                UninstallStatus::Partial
            }
        }
    }

    fn revert_localization(&self, root: &Path) -> io::Result<InstallationState> {
        let layout = TargetLayout::new(root);
        match layout.state() {
            InstallationState::Enabled => {
                fs::rename(layout.core_module(), layout.disabled_core_module())?;
                Ok(InstallationState::Disabled)
            }
            InstallationState::Disabled => {
                fs::rename(layout.disabled_core_module(), layout.core_module())?;
                Ok(InstallationState::Enabled)
            }
            InstallationState::NotInstalled => Ok(InstallationState::NotInstalled),
        }
    }
}
