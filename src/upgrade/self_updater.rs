//! [`ApplicationUpdater`] checks for and installs updates of the running
//! application.
//!
//! Installing a scheduled update verifies and extracts the package into a
//! staging directory, then hands off to a detached helper script that copies the
//! files over the application directory once this process has exited.

use anyhow::{Context, Result};
use chrono::Utc;
use semver::Version;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::relaunch::{RelaunchPlan, render_script, spawn_detached, write_script};
use super::schedule::{RelaunchResult, ScheduledUpdate, UpdateStore};
use super::status::InstallUpdateStatus;
use crate::constants::SIGNATURE_EXTENSION;
use crate::models::{Release, parse_tag_version};
use crate::repository::{AnySource, PackageSelector, ReleaseSource, RepositoryError, UpdateRepository};
use crate::utils::archive::extract_archive;
use crate::utils::fs::{remove_file_if_exists, sibling_with_suffix};
use crate::utils::progress::ProgressSink;
use crate::verification::{PackageVerifier, signature_path};

type Launcher = Arc<dyn Fn(&Path) -> io::Result<()> + Send + Sync>;

/// Self-update manager for the `sctools` binary.
///
/// Updating is split across two process lifetimes:
///
/// ```text
/// check_for_update -> download_update -> schedule_install_update   (this process)
/// startup: scheduled_update -> confirm -> install_scheduled_update (next process)
///     -> relaunch helper copies files -> `sctools update_status N`
/// ```
///
/// Scheduling only writes a marker, so a user can keep working and the update is
/// offered again on the next start. See [`super::startup`] for the startup half.
///
/// # Examples
///
/// ```rust,no_run
/// use sctools::engine::Engine;
/// use sctools::utils::ProgressSink;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let engine = Engine::load(None).await?;
/// let mut updater = engine.application_updater().await?;
/// let cancel = CancellationToken::new();
///
/// if let Some(release) = updater.check_for_update(&cancel).await? {
///     let package = updater.download_update(&release, &cancel, &ProgressSink::disabled()).await?;
///     updater.schedule_install_update(&release, &package)?;
///     println!("{} will be installed on the next start", release.tag);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ApplicationUpdater<S = AnySource> {
    repository: UpdateRepository<S>,
    store: UpdateStore,
    current_version: Version,
    executable: PathBuf,
    asset_name: String,
    verifier: Option<PackageVerifier>,
    /// Set by [`apply_scheduled_update_props`](Self::apply_scheduled_update_props).
    pending: Option<ScheduledUpdate>,
    launcher: Launcher,
}

impl<S: ReleaseSource> ApplicationUpdater<S> {
    /// `repository` should use [`PackageSelector::Asset`] with `asset_name`.
    pub fn new(
        repository: UpdateRepository<S>,
        store: UpdateStore,
        current_version: Version,
        executable: PathBuf,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            store,
            current_version,
            executable,
            asset_name: asset_name.into(),
            verifier: None,
            pending: None,
            launcher: Arc::new(spawn_detached),
        }
    }

    /// Require a valid detached signature on downloaded packages.
    pub fn with_verifier(mut self, verifier: Option<PackageVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replaces how the relaunch helper is started.
    pub fn with_launcher(mut self, launcher: impl Fn(&Path) -> io::Result<()> + Send + Sync + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    pub fn store(&self) -> &UpdateStore {
        &self.store
    }

    pub fn repository(&self) -> &UpdateRepository<S> {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut UpdateRepository<S> {
        &mut self.repository
    }

    /// Newest release above the running version, if any.
    pub async fn check_for_update(&mut self, cancel: &CancellationToken) -> Result<Option<Release>, RepositoryError> {
        let releases = self.repository.fetch_releases(cancel).await?;
        let newer = releases.into_iter().find(|r| r.version > self.current_version);
        match &newer {
            Some(release) => info!(current = %self.current_version, latest = %release.tag, "Application update available"),
            None => debug!(current = %self.current_version, "Application is up to date"),
        }
        Ok(newer)
    }

    /// Release named `version`, from the cached list or a fresh fetch.
    pub async fn find_release(
        &mut self,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Release>, RepositoryError> {
        if self.repository.releases().is_none() {
            self.repository.fetch_releases(cancel).await?;
        }
        Ok(self.repository.releases().and_then(|releases| {
            releases
                .iter()
                .find(|r| r.tag.eq_ignore_ascii_case(version.trim()) || r.matches_hint(version))
                .cloned()
        }))
    }

    /// Downloads the application package (and its `.sig` asset, when published).
    pub async fn download_update(
        &self,
        release: &Release,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<PathBuf, RepositoryError> {
        let dest = self.store.downloads_dir().join(&release.tag);
        let package = self.repository.download(release, &dest, cancel, progress).await?;

        let signature_asset = format!("{}.{SIGNATURE_EXTENSION}", self.asset_name);
        if release.asset_named(&signature_asset).is_some() {
            let selector = PackageSelector::Asset(signature_asset);
            let downloaded = self
                .repository
                .download_with(&selector, release, &dest, cancel, progress)
                .await?;
            let expected = signature_path(&package);
            if downloaded != expected {
                tokio::fs::rename(&downloaded, &expected)
                    .await
                    .map_err(RepositoryError::io(&expected))?;
            }
        }
        Ok(package)
    }

    /// Records `package` as the update to install on the next start.
    pub fn schedule_install_update(&self, release: &Release, package: &Path) -> Result<ScheduledUpdate> {
        let scheduled = ScheduledUpdate {
            version: release.tag.clone(),
            package_path: package.to_path_buf(),
            scheduled_at: Utc::now(),
        };
        self.store
            .write_scheduled(&scheduled)
            .with_context(|| format!("Failed to schedule update {}", release.tag))?;
        info!(version = %release.tag, package = %package.display(), "Application update scheduled");
        Ok(scheduled)
    }

    pub fn scheduled_update(&self) -> Option<ScheduledUpdate> {
        self.store.read_scheduled()
    }

    /// Drops the schedule and the downloaded package.
    pub fn cancel_scheduled_update(&mut self) -> Result<()> {
        let scheduled = self.pending.take().or_else(|| self.store.read_scheduled());
        if let Some(scheduled) = scheduled {
            remove_file_if_exists(&scheduled.package_path)
                .with_context(|| format!("Failed to remove {}", scheduled.package_path.display()))?;
            remove_file_if_exists(&signature_path(&scheduled.package_path))?;
            info!(version = %scheduled.version, "Scheduled application update cancelled");
        }
        self.store
            .clear_scheduled()
            .context("Failed to remove scheduled update marker")?;
        Ok(())
    }

    /// The scheduled version is what is already running.
    pub fn is_already_installed_version(&self, scheduled: &ScheduledUpdate) -> bool {
        match scheduled.parsed_version() {
            Some(version) => version == self.current_version,
            None => scheduled.version.trim_start_matches(['v', 'V']) == self.current_version.to_string(),
        }
    }

    /// Makes `scheduled` the update that [`install_scheduled_update`](Self::install_scheduled_update) acts on.
    pub fn apply_scheduled_update_props(&mut self, scheduled: &ScheduledUpdate) {
        self.repository.set_current_version(Some(scheduled.version.clone()));
        self.pending = Some(scheduled.clone());
    }

    /// Verifies, extracts and stages the scheduled package, then starts the
    /// relaunch helper. On `Success` the caller must exit promptly: the helper
    /// waits for this process before copying files.
    pub async fn install_scheduled_update(&self) -> InstallUpdateStatus {
        match self.try_install_scheduled_update().await {
            Ok(version) => {
                info!(version = %version, "Relaunch helper started, exiting to apply update");
                InstallUpdateStatus::Success
            }
            Err(status) => {
                warn!(status = status.code(), reason = %status, "Scheduled update not installed");
                status
            }
        }
    }

    async fn try_install_scheduled_update(&self) -> Result<String, InstallUpdateStatus> {
        let scheduled = self
            .pending
            .clone()
            .or_else(|| self.store.read_scheduled())
            .ok_or(InstallUpdateStatus::PackageMissing)?;
        if !scheduled.package_path.is_file() {
            return Err(InstallUpdateStatus::PackageMissing);
        }

        let staging = self.store.staging_dir();
        let verifier = self.verifier.clone();
        let package = scheduled.package_path.clone();
        let content_root = tokio::task::spawn_blocking(move || stage_update(&package, &staging, verifier.as_ref()))
            .await
            .map_err(|_| InstallUpdateStatus::UnknownError)??;

        let app_dir = self
            .executable
            .parent()
            .map(Path::to_path_buf)
            .ok_or(InstallUpdateStatus::UpdateLaunchError)?;
        let plan = RelaunchPlan {
            pid: std::process::id(),
            staging_dir: content_root,
            app_dir,
            executable: self.executable.clone(),
            result_path: self.store.result_path(),
            scheduled_path: self.store.scheduled_path(),
            cleanup_dir: self.store.staging_dir(),
        };
        let script = self.store.script_path();
        write_script(&script, &render_script(&plan)).map_err(|e| {
            warn!(path = %script.display(), error = %e, "Failed to write relaunch helper");
            InstallUpdateStatus::UpdateLaunchError
        })?;
        (self.launcher)(&script).map_err(|e| {
            warn!(error = %e, "Failed to start relaunch helper");
            InstallUpdateStatus::UpdateLaunchError
        })?;
        Ok(scheduled.version)
    }

    /// Deletes a helper script left behind by a previous update.
    pub fn remove_update_script(&self) {
        let script = self.store.script_path();
        if let Err(e) = remove_file_if_exists(&script) {
            warn!(path = %script.display(), error = %e, "Failed to remove relaunch helper");
        }
    }

    /// The helper's result from the last relaunch. Each result is returned once.
    pub fn take_relaunch_result(&self) -> Option<RelaunchResult> {
        self.store.take_result()
    }
}

/// Extracts `package` into a fresh `staging` directory and returns the directory
/// whose contents are the application files.
fn stage_update(
    package: &Path,
    staging: &Path,
    verifier: Option<&PackageVerifier>,
) -> Result<PathBuf, InstallUpdateStatus> {
    if let Some(verifier) = verifier {
        verifier.check(package).map_err(|e| {
            warn!(package = %package.display(), error = %e, "Update package rejected");
            InstallUpdateStatus::VerifyError
        })?;
    }

    let extract_failed = |e: &dyn std::fmt::Display| {
        warn!(package = %package.display(), error = %e, "Failed to extract update package");
        InstallUpdateStatus::ExtractFilesError
    };
    if staging.exists() {
        std::fs::remove_dir_all(staging).map_err(|e| extract_failed(&e))?;
    }
    // extract next to the staging dir first so a failed extraction leaves nothing staged
    let incoming = sibling_with_suffix(staging, "incoming");
    if incoming.exists() {
        std::fs::remove_dir_all(&incoming).map_err(|e| extract_failed(&e))?;
    }
    let count = match extract_archive(package, &incoming) {
        Ok(count) => count,
        Err(e) => {
            let _ = std::fs::remove_dir_all(&incoming);
            return Err(extract_failed(&e));
        }
    };
    if count == 0 {
        let _ = std::fs::remove_dir_all(&incoming);
        return Err(InstallUpdateStatus::ExtractFilesError);
    }
    std::fs::rename(&incoming, staging).map_err(|e| extract_failed(&e))?;
    debug!(files = count, staging = %staging.display(), "Update package staged");

    Ok(single_wrapping_dir(staging).unwrap_or_else(|| staging.to_path_buf()))
}

fn single_wrapping_dir(dir: &Path) -> Option<PathBuf> {
    let mut entries = std::fs::read_dir(dir).ok()?;
    let only = entries.next()?.ok()?;
    if entries.next().is_some() || !only.file_type().ok()?.is_dir() {
        return None;
    }
    Some(only.path())
}

/// Version of the running binary.
pub fn running_version() -> Version {
    parse_tag_version(env!("CARGO_PKG_VERSION")).unwrap_or_else(|| Version::new(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameMode;
    use crate::repository::FolderSource;
    use crate::test_utils::{app_repository, sign_file, test_signing_key};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ASSET: &str = "sctools-test.zip";

    struct Fixture {
        _temp: TempDir,
        feed: PathBuf,
        data: PathBuf,
        app: PathBuf,
        launched: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Fixture {
        fn new(tags: &[&str]) -> Self {
            let temp = TempDir::new().unwrap();
            let feed = temp.path().join("feed");
            app_repository(&feed, tags, ASSET);
            let data = temp.path().join("data");
            let app = temp.path().join("app");
            std::fs::create_dir_all(&app).unwrap();
            Self {
                feed,
                data,
                app,
                _temp: temp,
                launched: Arc::default(),
            }
        }

        fn updater(&self, current: &str) -> ApplicationUpdater<FolderSource> {
            let repository = UpdateRepository::new(
                "app",
                FolderSource::new(&self.feed),
                GameMode::Live,
                PackageSelector::Asset(ASSET.to_string()),
            );
            let launched = Arc::clone(&self.launched);
            ApplicationUpdater::new(
                repository,
                UpdateStore::new(&self.data),
                Version::parse(current).unwrap(),
                self.app.join("sctools"),
                ASSET,
            )
            .with_launcher(move |script| {
                launched.lock().unwrap().push(script.to_path_buf());
                Ok(())
            })
        }
    }

    async fn schedule_latest(updater: &mut ApplicationUpdater<FolderSource>) -> (Release, PathBuf) {
        let cancel = CancellationToken::new();
        let release = updater.check_for_update(&cancel).await.unwrap().unwrap();
        let package = updater
            .download_update(&release, &cancel, &ProgressSink::disabled())
            .await
            .unwrap();
        updater.schedule_install_update(&release, &package).unwrap();
        (release, package)
    }

    #[tokio::test]
    async fn test_check_for_update_compares_versions() {
        let fixture = Fixture::new(&["v1.0.0", "v1.2.0"]);
        let mut current = fixture.updater("1.2.0");
        assert!(current.check_for_update(&CancellationToken::new()).await.unwrap().is_none());

        let mut old = fixture.updater("1.0.0");
        let release = old.check_for_update(&CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(release.tag, "v1.2.0");
    }

    #[tokio::test]
    async fn test_schedule_and_install_stages_files() {
        let fixture = Fixture::new(&["v1.1.0"]);
        let mut updater = fixture.updater("1.0.0");
        let (release, package) = schedule_latest(&mut updater).await;
        assert!(package.is_file());

        let scheduled = updater.scheduled_update().unwrap();
        assert_eq!(scheduled.version, release.tag);
        assert!(!updater.is_already_installed_version(&scheduled));

        updater.apply_scheduled_update_props(&scheduled);
        assert_eq!(updater.repository().current_version(), Some("v1.1.0"));
        assert_eq!(updater.install_scheduled_update().await, InstallUpdateStatus::Success);

        let staged = updater.store().staging_dir().join("sctools");
        assert_eq!(std::fs::read_to_string(staged).unwrap(), "binary v1.1.0");
        let launched = fixture.launched.lock().unwrap();
        assert_eq!(launched.as_slice(), [updater.store().script_path()]);
        let script = std::fs::read_to_string(&launched[0]).unwrap();
        assert!(script.contains(&std::process::id().to_string()));
    }

    #[tokio::test]
    async fn test_missing_package_and_launch_failure() {
        let fixture = Fixture::new(&["v1.1.0"]);
        let mut updater = fixture.updater("1.0.0");
        assert_eq!(updater.install_scheduled_update().await, InstallUpdateStatus::PackageMissing);

        let (_, package) = schedule_latest(&mut updater).await;
        std::fs::remove_file(&package).unwrap();
        assert_eq!(updater.install_scheduled_update().await, InstallUpdateStatus::PackageMissing);

        let (_, _) = schedule_latest(&mut updater).await;
        let failing = updater.with_launcher(|_| Err(io::Error::other("no shell")));
        assert_eq!(failing.install_scheduled_update().await, InstallUpdateStatus::UpdateLaunchError);
    }

    #[tokio::test]
    async fn test_corrupt_package_is_extract_error() {
        let fixture = Fixture::new(&["v1.1.0"]);
        let mut updater = fixture.updater("1.0.0");
        let (_, package) = schedule_latest(&mut updater).await;
        std::fs::write(&package, b"not a zip").unwrap();

        assert_eq!(updater.install_scheduled_update().await, InstallUpdateStatus::ExtractFilesError);
        assert!(!updater.store().staging_dir().exists());
        assert!(fixture.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verifier_requires_signature() {
        let fixture = Fixture::new(&["v1.1.0"]);
        let key = test_signing_key(9);
        let verifier = PackageVerifier::from_key(key.verifying_key());

        let mut updater = fixture.updater("1.0.0").with_verifier(Some(verifier));
        let (_, package) = schedule_latest(&mut updater).await;
        assert_eq!(updater.install_scheduled_update().await, InstallUpdateStatus::VerifyError);

        sign_file(&key, &package);
        assert_eq!(updater.install_scheduled_update().await, InstallUpdateStatus::Success);
    }

    #[tokio::test]
    async fn test_cancel_removes_marker_and_package() {
        let fixture = Fixture::new(&["v1.1.0"]);
        let mut updater = fixture.updater("1.0.0");
        let (_, package) = schedule_latest(&mut updater).await;

        updater.cancel_scheduled_update().unwrap();
        assert!(updater.scheduled_update().is_none());
        assert!(!package.exists());
        // cancelling again is a no-op
        updater.cancel_scheduled_update().unwrap();
    }

    #[tokio::test]
    async fn test_already_installed_version_detection() {
        let fixture = Fixture::new(&["v1.1.0"]);
        let updater = fixture.updater("1.1.0");
        let scheduled = ScheduledUpdate {
            version: "v1.1.0".to_string(),
            package_path: PathBuf::from("/nowhere.zip"),
            scheduled_at: Utc::now(),
        };
        assert!(updater.is_already_installed_version(&scheduled));
    }

    #[tokio::test]
    async fn test_remove_update_script_and_result_marker() {
        let fixture = Fixture::new(&[]);
        let updater = fixture.updater("1.0.0");
        updater.remove_update_script();

        let script = updater.store().script_path();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::write(updater.store().result_path(), "{\"status\":0}").unwrap();

        updater.remove_update_script();
        assert!(!script.exists());
        assert_eq!(updater.take_relaunch_result(), Some(RelaunchResult { status: 0 }));
        assert_eq!(updater.take_relaunch_result(), None);
    }
}
