//! Local directory feed.
//!
//! The directory holds `releases.json` in the GitHub REST shape. Package URLs
//! (`zipball_url`, asset `browser_download_url`) may be relative to the
//! directory, absolute paths, or `file://` URLs.

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::download::copy_file;
use super::{FeedEntry, ReleaseSource, RepositoryError, parse_feed};
use crate::utils::progress::ProgressSink;

/// Feed file name inside a folder repository.
pub const FOLDER_FEED_FILE: &str = "releases.json";

#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let location = location.strip_prefix("file://").unwrap_or(location);
        let path = Path::new(location);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ReleaseSource for FolderSource {
    fn describe(&self) -> String {
        format!("folder:{}", self.root.display())
    }

    async fn fetch_entries(&self, cancel: &CancellationToken) -> Result<Vec<FeedEntry>, RepositoryError> {
        let feed_path = self.root.join(FOLDER_FEED_FILE);
        debug!(path = %feed_path.display(), "Reading folder feed");
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            body = tokio::fs::read_to_string(&feed_path) => body.map_err(RepositoryError::io(&feed_path))?,
        };

        let mut entries = parse_feed(&body, &self.describe())?;
        for entry in &mut entries {
            if let Some(url) = entry.zipball_url.take() {
                entry.zipball_url = Some(self.resolve(&url).to_string_lossy().into_owned());
            }
            for asset in &mut entry.assets {
                asset.browser_download_url =
                    self.resolve(&asset.browser_download_url).to_string_lossy().into_owned();
            }
        }
        Ok(entries)
    }

    async fn fetch_package(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<u64, RepositoryError> {
        copy_file(&self.resolve(url), dest, cancel, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameMode;
    use crate::repository::{PackageSelector, UpdateRepository};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_folder_feed_resolves_relative_packages() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(FOLDER_FEED_FILE),
            r#"[{"tag_name": "1.0.0", "zipball_url": "packages/1.0.0.zip"}]"#,
        )
        .unwrap();
        std::fs::create_dir(temp.path().join("packages")).unwrap();
        std::fs::write(temp.path().join("packages/1.0.0.zip"), b"zip bytes").unwrap();

        let mut repository = UpdateRepository::new(
            "local",
            FolderSource::new(temp.path()),
            GameMode::Live,
            PackageSelector::SourceArchive,
        );
        let releases = repository.fetch_releases(&CancellationToken::new()).await.unwrap();
        assert_eq!(releases.len(), 1);

        let downloads = temp.path().join("downloads");
        let path = repository
            .download(&releases[0], &downloads, &CancellationToken::new(), &ProgressSink::disabled())
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"zip bytes");
    }

    #[tokio::test]
    async fn test_missing_feed_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = FolderSource::new(temp.path())
            .fetch_entries(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Io { .. }));
    }
}
