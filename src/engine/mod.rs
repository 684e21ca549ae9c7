//! The engine context shared by every command.
//!
//! [`Engine`] owns the loaded configuration, the HTTP client, the installer and
//! the per-target serialization. It is built once in `main` (or a test) and
//! passed by reference; nothing in the crate reaches for global state.
//!
//! # Serialization
//!
//! Operations that change a game directory (install, uninstall, toggle) take two
//! locks, in this order:
//!
//! 1. an in-process async mutex keyed by the canonical target path
//! 2. a cross-process [`TargetLock`] file in `{data_dir}/locks/`
//!
//! Read-only operations (status, refresh) take neither.
//!
//! # Configuration Updates
//!
//! Mutations are applied to a copy of the configuration, saved, and only then
//! published. A failed save leaves the in-memory configuration unchanged.


use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{GlobalConfig, InstallationRecord, RepositoryConfig};
use crate::constants::{HTTP_CONNECT_TIMEOUT, USER_AGENT};
use crate::core::SctoolsError;
use crate::installer::target_lock::target_key;
use crate::installer::{
    InstallStatus, InstallationState, Installer, LocalizationInstaller, TargetLock, UninstallStatus,
};
use crate::models::{GameMode, Release};
use crate::repository::{
    AnySource, FolderSource, GitHubSource, PackageSelector, RepositoryKind, UpdateRepository,
};
use crate::upgrade::{ApplicationUpdater, UpdateStore, running_version};
use crate::utils::progress::ProgressSink;
use crate::verification::{PackageVerifier, TrustedCertificate};

/// Result of [`Engine::install`].
#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Installed(Release),
    /// The release is already installed and enabled; nothing was done.
    AlreadyInstalled(Release),
    Failed { release: Release, status: InstallStatus },
}

/// Snapshot of one game directory for `status`.
#[derive(Debug, Clone)]
pub struct TargetStatus {
    pub target_id: String,
    pub state: InstallationState,
    /// Name of the repository used when none is given.
    pub repository: String,
    pub records: Vec<InstallationRecord>,
}

impl TargetStatus {
    pub fn current_record(&self) -> Option<&InstallationRecord> {
        self.records
            .iter()
            .find(|r| r.repository.eq_ignore_ascii_case(&self.repository))
    }
}

/// Partial update of an installation record's settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub allow_prerelease: Option<bool>,
    pub monitor_for_updates: Option<bool>,
    pub monitor_refresh_minutes: Option<u32>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Engine {
    config: RwLock<GlobalConfig>,
    config_path: PathBuf,
    data_dir: PathBuf,
    client: reqwest::Client,
    verifier: Option<PackageVerifier>,
    installer: Arc<dyn Installer>,
    target_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Both target locks; released together on drop.
struct TargetGuard {
    _process: TargetLock,
    _local: OwnedMutexGuard<()>,
}

impl Engine {
    /// Loads the configuration from `config_path` (or the default location).
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = GlobalConfig::resolve_path(config_path)?;
        let config = GlobalConfig::load_or_default(&config_path).await?;
        Self::with_config(config, config_path)
    }

    pub fn with_config(config: GlobalConfig, config_path: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let verifier = match &config.trusted_key {
            Some(path) => Some(
                PackageVerifier::from_certificate(&TrustedCertificate::File(path.clone())).map_err(|e| {
                    SctoolsError::ConfigError {
                        message: format!("trusted_key {}: {e}", path.display()),
                    }
                })?,
            ),
            None => None,
        };
        let data_dir = config.data_dir(&config_path);
        debug!(config = %config_path.display(), data_dir = %data_dir.display(), "Engine initialized");

        Ok(Self {
            installer: Arc::new(LocalizationInstaller::new(verifier.clone())),
            verifier,
            config: RwLock::new(config),
            config_path,
            data_dir,
            client,
            target_locks: DashMap::new(),
        })
    }

    /// Replaces the installer, e.g. with a test double.
    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// A copy of the current configuration.
    pub async fn config(&self) -> GlobalConfig {
        self.config.read().await.clone()
    }

    /// Applies `change` to a copy of the configuration, saves it and publishes it.
    async fn mutate<T>(&self, change: impl FnOnce(&mut GlobalConfig) -> Result<T>) -> Result<T> {
        let mut guard = self.config.write().await;
        let mut next = guard.clone();
        let value = change(&mut next)?;
        next.save_to(&self.config_path).await?;
        *guard = next;
        Ok(value)
    }

    fn existing_target(target: &Path) -> Result<String> {
        if !target.is_dir() {
            return Err(SctoolsError::TargetNotFound {
                path: target.display().to_string(),
            }
            .into());
        }
        Ok(target_key(target))
    }

    async fn lock_target(&self, target_id: &str, target: &Path) -> Result<TargetGuard> {
        let mutex = self
            .target_locks
            .entry(target_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let local = mutex.lock_owned().await;
        let process = TargetLock::acquire(&self.data_dir.join("locks"), target).await?;
        Ok(TargetGuard {
            _process: process,
            _local: local,
        })
    }

    fn build_source(&self, config: &GlobalConfig, repository: &RepositoryConfig) -> Result<AnySource> {
        Ok(match repository.kind {
            RepositoryKind::Github => AnySource::GitHub(GitHubSource::new(
                self.client.clone(),
                &config.github_api_url,
                &repository.location,
                config.github_token.clone(),
            )?),
            RepositoryKind::Folder => AnySource::Folder(FolderSource::new(&repository.location)),
        })
    }

    /// Name of the repository to use for `target_id`: `explicit`, else the
    /// selected record's, else the first configured one.
    fn resolve_repository<'a>(
        config: &'a GlobalConfig,
        target_id: &str,
        explicit: Option<&str>,
    ) -> Result<&'a RepositoryConfig> {
        let name = explicit.map(str::to_string).or_else(|| {
            config
                .installations
                .selected(target_id)
                .map(|r| r.repository.clone())
        });
        let found = match &name {
            Some(name) => config.repository(name),
            None => config.repositories.first(),
        };
        found.ok_or_else(|| {
            SctoolsError::RepositoryNotFound {
                name: name.unwrap_or_else(|| "<none configured>".to_string()),
            }
            .into()
        })
    }

    /// Repository for `target`, primed with the record's prerelease flag and
    /// preferred version. Nothing is fetched yet.
    pub async fn repository_for_target(&self, target: &Path, repository: Option<&str>) -> Result<UpdateRepository> {
        let target_id = Self::existing_target(target)?;
        let config = self.config.read().await;
        let repo_config = Self::resolve_repository(&config, &target_id, repository)?;
        let source = self.build_source(&config, repo_config)?;

        let mut repo = UpdateRepository::new(
            repo_config.name.clone(),
            source,
            repo_config.mode,
            PackageSelector::SourceArchive,
        );
        if let Some(record) = config.installations.get(&target_id, &repo_config.name) {
            repo.set_allow_prerelease(record.allow_prerelease);
            repo.set_current_version(record.preferred_version().map(str::to_string));
        }
        Ok(repo)
    }

    pub fn installation_state(&self, target: &Path) -> InstallationState {
        self.installer.installation_state(target)
    }

    pub async fn status(&self, target: &Path) -> Result<TargetStatus> {
        let target_id = Self::existing_target(target)?;
        let config = self.config.read().await;
        let repository = Self::resolve_repository(&config, &target_id, None)?.name.clone();
        Ok(TargetStatus {
            state: self.installer.installation_state(target),
            repository,
            records: config.installations.for_target(&target_id).cloned().collect(),
            target_id,
        })
    }

    /// Fetches the release list of the target's repository.
    pub async fn refresh(
        &self,
        target: &Path,
        repository: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>> {
        let mut repo = self.repository_for_target(target, repository).await?;
        Ok(repo.fetch_releases(cancel).await?)
    }

    /// Records `version` as the chosen release of this target's repository.
    pub async fn select(
        &self,
        target: &Path,
        repository: Option<&str>,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<Release> {
        let mut repo = self.repository_for_target(target, repository).await?;
        repo.fetch_releases(cancel).await?;
        let release = find_release(&repo, version)?;

        let target_id = target_key(target);
        let name = repo.name().to_string();
        let tag = release.tag.clone();
        self.mutate(|config| {
            config.installations.select(&target_id, &name).last_version = Some(tag);
            Ok(())
        })
        .await?;
        info!(game_dir = %target.display(), repository = %name, version = %release.tag, "Version selected");
        Ok(release)
    }

    /// Whether installs check package signatures against `trusted_key`.
    pub fn verifies_packages(&self) -> bool {
        self.verifier.is_some()
    }

    /// Downloads and installs `version` (or the preferred/latest release).
    ///
    /// Cancellation is honoured until the installer starts; a cancelled install
    /// changes neither the target nor the configuration.
    pub async fn install(
        &self,
        target: &Path,
        repository: Option<&str>,
        version: Option<&str>,
        force: bool,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<InstallOutcome> {
        let target_id = Self::existing_target(target)?;
        let mut repo = self.repository_for_target(target, repository).await?;
        let _guard = self.lock_target(&target_id, target).await?;

        progress.phase(format!("Fetching releases from {}", repo.name()));
        repo.fetch_releases(cancel).await?;
        let release = match version {
            Some(version) => find_release(&repo, version)?,
            None => repo.select_current(None).ok_or_else(|| no_releases(&repo))?,
        };

        let already = {
            let config = self.config.read().await;
            config
                .installations
                .get(&target_id, repo.name())
                .is_some_and(|r| r.is_installed_version(&release.tag))
        };
        if already && !force && self.installer.installation_state(target) == InstallationState::Enabled {
            debug!(version = %release.tag, "Release already installed");
            return Ok(InstallOutcome::AlreadyInstalled(release));
        }

        if !self.verifies_packages() {
            warn!(
                game_dir = %target.display(),
                version = %release.tag,
                "No trusted_key configured, installing an unverified package"
            );
        }
        let download_dir = self.data_dir.join("downloads").join(uuid::Uuid::new_v4().to_string());
        let result = self
            .download_and_install(&repo, &release, target, &download_dir, cancel, progress)
            .await;
        if let Err(e) = tokio::fs::remove_dir_all(&download_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %download_dir.display(), error = %e, "Failed to remove download directory");
            }
        }

        let status = result?;
        if status != InstallStatus::Success {
            return Ok(InstallOutcome::Failed { release, status });
        }

        let name = repo.name().to_string();
        let tag = release.tag.clone();
        self.mutate(|config| {
            let record = config.installations.select(&target_id, &name);
            record.installed_version = Some(tag.clone());
            record.last_version = Some(tag);
            Ok(())
        })
        .await?;
        Ok(InstallOutcome::Installed(release))
    }

    async fn download_and_install(
        &self,
        repo: &UpdateRepository,
        release: &Release,
        target: &Path,
        download_dir: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<InstallStatus> {
        let package = repo.download(release, download_dir, cancel, progress).await?;
        if cancel.is_cancelled() {
            return Err(SctoolsError::Cancelled.into());
        }

        progress.phase(format!("Installing {}", release.tag));
        let installer = Arc::clone(&self.installer);
        let root = target.to_path_buf();
        let status = tokio::task::spawn_blocking(move || installer.install(&package, &root))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Installer task failed");
                InstallStatus::UnknownError
            });
        Ok(status)
    }

    /// Removes the localization. `purge` also deletes the installation record.
    pub async fn uninstall(&self, target: &Path, repository: Option<&str>, purge: bool) -> Result<UninstallStatus> {
        let target_id = Self::existing_target(target)?;
        let name = {
            let config = self.config.read().await;
            Self::resolve_repository(&config, &target_id, repository)?.name.clone()
        };
        let _guard = self.lock_target(&target_id, target).await?;

        let installer = Arc::clone(&self.installer);
        let root = target.to_path_buf();
        let status = tokio::task::spawn_blocking(move || installer.uninstall(&root))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Uninstall task failed");
                UninstallStatus::Failed
            });

        if status != UninstallStatus::Failed {
            self.mutate(|config| {
                if purge {
                    config.installations.remove(&target_id, &name);
                } else if let Some(record) = config.installations.get_mut(&target_id, &name) {
                    record.installed_version = None;
                }
                Ok(())
            })
            .await?;
        }
        info!(game_dir = %target.display(), repository = %name, status = ?status, purge, "Uninstall finished");
        Ok(status)
    }

    /// Switches between enabled and disabled. Installation records are not touched.
    pub async fn toggle(&self, target: &Path) -> Result<InstallationState> {
        let target_id = Self::existing_target(target)?;
        let _guard = self.lock_target(&target_id, target).await?;

        let installer = Arc::clone(&self.installer);
        let root = target.to_path_buf();
        let state = tokio::task::spawn_blocking(move || installer.revert_localization(&root))
            .await
            .context("Toggle task failed")?
            .with_context(|| format!("Failed to toggle localization in {}", target.display()))?;
        if state == InstallationState::NotInstalled {
            return Err(SctoolsError::NotInstalled {
                path: target.display().to_string(),
            }
            .into());
        }
        info!(game_dir = %target.display(), state = %state, "Localization toggled");
        Ok(state)
    }

    /// Applies `update` to the record of the target's repository, creating it if needed.
    pub async fn update_settings(
        &self,
        target: &Path,
        repository: Option<&str>,
        update: SettingsUpdate,
    ) -> Result<InstallationRecord> {
        let target_id = Self::existing_target(target)?;
        self.mutate(|config| {
            let name = Self::resolve_repository(config, &target_id, repository)?.name.clone();
            let record = config.installations.ensure(&target_id, &name);
            if let Some(allow) = update.allow_prerelease {
                record.allow_prerelease = allow;
            }
            if let Some(monitor) = update.monitor_for_updates {
                record.monitor_for_updates = monitor;
            }
            if let Some(minutes) = update.monitor_refresh_minutes {
                record
                    .set_refresh_minutes(minutes)
                    .map_err(|message| SctoolsError::ConfigError { message })?;
            }
            Ok(record.clone())
        })
        .await
    }

    pub async fn repositories(&self) -> Vec<RepositoryConfig> {
        self.config.read().await.repositories.clone()
    }

    pub async fn add_repository(&self, repository: RepositoryConfig) -> Result<()> {
        if repository.kind == RepositoryKind::Github {
            let config = self.config.read().await;
            self.build_source(&config, &repository)?;
        }
        let name = repository.name.clone();
        self.mutate(|config| config.add_repository(repository)).await?;
        info!(repository = %name, "Repository added");
        Ok(())
    }

    pub async fn remove_repository(&self, name: &str) -> Result<()> {
        self.mutate(|config| {
            if config.remove_repository(name) {
                Ok(())
            } else {
                Err(SctoolsError::RepositoryNotFound { name: name.to_string() }.into())
            }
        })
        .await
    }

    /// Makes `name` the repository used for `target` when none is given.
    pub async fn use_repository(&self, target: &Path, name: &str) -> Result<()> {
        let target_id = Self::existing_target(target)?;
        self.mutate(|config| {
            let canonical = config
                .repository(name)
                .ok_or_else(|| SctoolsError::RepositoryNotFound { name: name.to_string() })?
                .name
                .clone();
            config.installations.select(&target_id, &canonical);
            Ok(())
        })
        .await
    }

    /// Records with monitoring enabled, for [`crate::monitor`].
    pub async fn monitored_records(&self) -> Vec<InstallationRecord> {
        self.config
            .read()
            .await
            .installations
            .iter()
            .filter(|r| r.monitor_for_updates)
            .cloned()
            .collect()
    }

    /// Updater for the `sctools` application itself.
    pub async fn application_updater(&self) -> Result<ApplicationUpdater> {
        let config = self.config.read().await;
        let upgrade = &config.upgrade;
        let source = GitHubSource::new(
            self.client.clone(),
            &config.github_api_url,
            &upgrade.repository,
            config.github_token.clone(),
        )?;
        let asset_name = upgrade.resolved_asset_name();
        let mut repository = UpdateRepository::new(
            upgrade.repository.clone(),
            AnySource::GitHub(source),
            GameMode::Live,
            PackageSelector::Asset(asset_name.clone()),
        );
        repository.set_allow_prerelease(upgrade.allow_prerelease);

        let executable = std::env::current_exe().context("Cannot locate the running executable")?;
        Ok(ApplicationUpdater::new(
            repository,
            UpdateStore::new(&self.data_dir),
            running_version(),
            executable,
            asset_name,
        )
        .with_verifier(self.verifier.clone()))
    }
}

/// Release matching `version` by tag, then by parsed version.
fn find_release(repo: &UpdateRepository, version: &str) -> Result<Release> {
    let releases = repo.releases().unwrap_or_default();
    releases
        .iter()
        .find(|r| r.tag.eq_ignore_ascii_case(version.trim()))
        .or_else(|| releases.iter().find(|r| r.matches_hint(version)))
        .cloned()
        .ok_or_else(|| {
            SctoolsError::ReleaseNotFound {
                repository: repo.name().to_string(),
                version: version.to_string(),
            }
            .into()
        })
}

fn no_releases(repo: &UpdateRepository) -> anyhow::Error {
    SctoolsError::NoReleases {
        repository: repo.name().to_string(),
        mode: repo.mode().to_string(),
    }
    .into()
}
