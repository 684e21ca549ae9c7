//! Update repositories: where releases come from and how packages are fetched.
//!
//! An [`UpdateRepository`] wraps a [`ReleaseSource`] (the feed transport) with the
//! state a caller cares about: the game mode and pre-release filter, the list
//! from the most recent successful fetch, and the version currently selected.
//!
//! Two sources exist:
//! - [`github::GitHubSource`] - `GET {api}/repos/{owner}/{repo}/releases`
//! - [`folder::FolderSource`] - a local directory holding `releases.json` in the
//!   same JSON shape, used for offline mirrors and tests
//!
//! Both are combined in [`AnySource`], which is what configuration produces.
//!
//! # Fetch Semantics
//!
//! - every feed entry is parsed on its own; entries that fail to parse, drafts and
//!   tags without a version are skipped
//! - the remaining releases are filtered by mode and pre-release flag and sorted
//!   newest first
//! - the cached list is only replaced when the whole fetch succeeds, so a
//!   cancelled or failed refresh leaves the previous list visible

pub mod download;
pub mod folder;
pub mod github;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::PARTIAL_DOWNLOAD_EXTENSION;
use crate::models::{GameMode, Release, ReleaseAsset, is_tag_for_mode, parse_tag_version};
use crate::utils::fs::sibling_with_suffix;
use crate::utils::progress::ProgressSink;

pub use folder::FolderSource;
pub use github::GitHubSource;

/// Failures while talking to a release feed.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Transport error, timeout or non-success HTTP status
    #[error("{operation} failed: {reason}")]
    Network { operation: String, reason: String },

    /// The feed body is not a JSON list of releases
    #[error("invalid release feed from {feed}: {reason}")]
    Parse { feed: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The release carries nothing this repository knows how to install
    #[error("release '{tag}' has no installable package")]
    NoPackage { tag: String },

    #[error("invalid repository location '{0}'")]
    InvalidLocation(String),

    /// An asset name that is not a plain file name
    #[error("release '{tag}' has an unsafe asset name '{name}'")]
    UnsafeAssetName { tag: String, name: String },
}

impl RepositoryError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io { path, source }
    }
}

/// Kind of feed behind a configured repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    #[default]
    #[serde(alias = "GitHub", alias = "Github")]
    Github,
    #[serde(alias = "Folder")]
    Folder,
}

/// One release as the feed publishes it (GitHub REST shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub zipball_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<FeedAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl FeedEntry {
    /// Converts to a [`Release`]; drafts and tags without a version yield `None`.
    pub fn into_release(self) -> Option<Release> {
        if self.draft {
            return None;
        }
        let version = parse_tag_version(&self.tag_name)?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.tag_name.clone());
        Some(Release {
            tag: self.tag_name,
            name,
            version,
            prerelease: self.prerelease,
            published_at: self.published_at,
            assets: self
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    download_url: a.browser_download_url,
                    size: a.size,
                })
                .collect(),
            source_archive_url: self.zipball_url,
        })
    }
}

/// Parses a feed body. A body that is not a JSON array fails; bad entries are skipped.
pub fn parse_feed(body: &str, feed: &str) -> Result<Vec<FeedEntry>, RepositoryError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RepositoryError::Parse {
            feed: feed.to_string(),
            reason: e.to_string(),
        })?;
    let serde_json::Value::Array(items) = value else {
        return Err(RepositoryError::Parse {
            feed: feed.to_string(),
            reason: "expected a JSON array of releases".to_string(),
        });
    };

    let total = items.len();
    let entries: Vec<FeedEntry> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<FeedEntry>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(feed, error = %e, "Skipping malformed release entry");
                None
            }
        })
        .collect();
    debug!(feed, total, parsed = entries.len(), "Release feed parsed");
    Ok(entries)
}

/// Keeps releases matching `mode` (and non-prereleases unless allowed), newest first.
pub fn filter_releases(
    releases: impl IntoIterator<Item = Release>,
    mode: GameMode,
    allow_prerelease: bool,
) -> Vec<Release> {
    let mut kept: Vec<Release> = releases
        .into_iter()
        .filter(|r| is_tag_for_mode(&r.tag, mode))
        .filter(|r| allow_prerelease || !r.prerelease)
        .collect();
    kept.sort_by(|a, b| b.cmp(a));
    kept
}

/// Which file of a release is the installable package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSelector {
    /// The zipball of the tagged source tree (localization repositories).
    SourceArchive,
    /// A release asset with this file name (application releases).
    Asset(String),
}

impl PackageSelector {
    /// Returns `(download url, local file name)` for `release`.
    pub fn resolve(&self, repository: &str, release: &Release) -> Result<(String, String), RepositoryError> {
        let missing = || RepositoryError::NoPackage {
            tag: release.tag.clone(),
        };
        match self {
            PackageSelector::SourceArchive => {
                let url = release.source_archive_url.clone().ok_or_else(missing)?;
                let stem = format!("{}-{}", repository, release.tag);
                let file_name: String = stem
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
                    .collect();
                Ok((url, format!("{file_name}.zip")))
            }
            PackageSelector::Asset(name) => {
                let asset = release.asset_named(name).ok_or_else(missing)?;
                if !is_plain_file_name(&asset.name) {
                    return Err(RepositoryError::UnsafeAssetName {
                        tag: release.tag.clone(),
                        name: asset.name.clone(),
                    });
                }
                Ok((asset.download_url.clone(), asset.name.clone()))
            }
        }
    }
}

/// True when `name` can be joined onto a directory without leaving it.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && !name.contains("..") && !name.contains(['/', '\\', ':'])
}

/// Transport behind an [`UpdateRepository`].
pub trait ReleaseSource: Send + Sync {
    /// Short human-readable location, used in logs and errors.
    fn describe(&self) -> String;

    /// Fetches and parses the raw feed.
    fn fetch_entries(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<FeedEntry>, RepositoryError>> + Send;

    /// Writes the package at `url` to `dest`, returning the number of bytes written.
    ///
    /// Must observe `cancel` between chunks. The caller owns cleanup of `dest`.
    fn fetch_package(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// The configured source variants.
#[derive(Debug, Clone)]
pub enum AnySource {
    GitHub(GitHubSource),
    Folder(FolderSource),
}

impl ReleaseSource for AnySource {
    fn describe(&self) -> String {
        match self {
            AnySource::GitHub(s) => s.describe(),
            AnySource::Folder(s) => s.describe(),
        }
    }

    async fn fetch_entries(&self, cancel: &CancellationToken) -> Result<Vec<FeedEntry>, RepositoryError> {
        match self {
            AnySource::GitHub(s) => s.fetch_entries(cancel).await,
            AnySource::Folder(s) => s.fetch_entries(cancel).await,
        }
    }

    async fn fetch_package(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<u64, RepositoryError> {
        match self {
            AnySource::GitHub(s) => s.fetch_package(url, dest, cancel, progress).await,
            AnySource::Folder(s) => s.fetch_package(url, dest, cancel, progress).await,
        }
    }
}

/// A named release feed plus the selection state derived from it.
#[derive(Debug, Clone)]
pub struct UpdateRepository<S = AnySource> {
    name: String,
    source: S,
    mode: GameMode,
    allow_prerelease: bool,
    selector: PackageSelector,
    releases: Option<Vec<Release>>,
    current_version: Option<String>,
}

impl<S: ReleaseSource> UpdateRepository<S> {
    pub fn new(name: impl Into<String>, source: S, mode: GameMode, selector: PackageSelector) -> Self {
        Self {
            name: name.into(),
            source,
            mode,
            allow_prerelease: false,
            selector,
            releases: None,
            current_version: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn allow_prerelease(&self) -> bool {
        self.allow_prerelease
    }

    /// Takes effect on the next fetch; the cached list is not re-filtered.
    pub fn set_allow_prerelease(&mut self, allow: bool) {
        self.allow_prerelease = allow;
    }

    pub fn current_version(&self) -> Option<&str> {
        self.current_version.as_deref()
    }

    pub fn set_current_version(&mut self, version: Option<String>) {
        self.current_version = version;
    }

    /// Releases from the most recent successful fetch, `None` before the first one.
    pub fn releases(&self) -> Option<&[Release]> {
        self.releases.as_deref()
    }

    pub fn latest(&self) -> Option<&Release> {
        self.releases.as_ref().and_then(|r| r.first())
    }

    /// Queries the feed and replaces the cached list on success.
    pub async fn fetch_releases(&mut self, cancel: &CancellationToken) -> Result<Vec<Release>, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }
        debug!(repository = %self.name, source = %self.source.describe(), "Fetching releases");

        let entries = self.source.fetch_entries(cancel).await?;
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let releases = filter_releases(
            entries.into_iter().filter_map(FeedEntry::into_release),
            self.mode,
            self.allow_prerelease,
        );
        info!(
            repository = %self.name,
            mode = %self.mode,
            count = releases.len(),
            "Releases fetched"
        );
        self.releases = Some(releases.clone());
        Ok(releases)
    }

    /// Release named by `hint` (or the current version), falling back to the latest one.
    pub fn select_current(&self, hint: Option<&str>) -> Option<Release> {
        let releases = self.releases.as_ref()?;
        let hint = hint.or(self.current_version.as_deref());
        hint.and_then(|h| releases.iter().find(|r| r.tag.eq_ignore_ascii_case(h.trim())))
            .or_else(|| hint.and_then(|h| releases.iter().find(|r| r.matches_hint(h))))
            .or_else(|| releases.first())
            .cloned()
    }

    /// Downloads the package of `release` into `dest_dir`.
    ///
    /// Data goes to `<file>.part` first and is renamed into place only after the
    /// whole body arrived. Cancellation or failure removes the partial file.
    pub async fn download(
        &self,
        release: &Release,
        dest_dir: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<PathBuf, RepositoryError> {
        self.download_with(&self.selector, release, dest_dir, cancel, progress).await
    }

    /// Like [`download`](Self::download) but for another file of the release.
    pub async fn download_with(
        &self,
        selector: &PackageSelector,
        release: &Release,
        dest_dir: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<PathBuf, RepositoryError> {
        let (url, file_name) = selector.resolve(&self.name, release)?;
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(RepositoryError::io(dest_dir))?;

        let target = dest_dir.join(&file_name);
        let part = sibling_with_suffix(&target, PARTIAL_DOWNLOAD_EXTENSION);
        debug!(repository = %self.name, tag = %release.tag, url = %url, "Downloading package");

        let result = match self.source.fetch_package(&url, &part, cancel, progress).await {
            Ok(_) if cancel.is_cancelled() => Err(RepositoryError::Cancelled),
            other => other,
        };
        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part, &target)
                    .await
                    .map_err(RepositoryError::io(&target))?;
                info!(repository = %self.name, tag = %release.tag, bytes, "Package downloaded");
                Ok(target)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&part).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        debug!(path = %part.display(), error = %remove_err, "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}
