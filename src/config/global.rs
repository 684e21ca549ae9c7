//! Global configuration for SCTools.
//!
//! A single TOML file holds the configured repositories, the installation records
//! for every game directory, the self-update settings and the trust anchor.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.sctools/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\sctools\config.toml`
//!
//! The location can be overridden with `--config` or the `SCTOOLS_CONFIG`
//! environment variable. Runtime data (locks, downloads, the updater's markers)
//! lives next to the file unless `data_dir` points elsewhere.
//!
//! # File Format
//!
//! ```toml
//! trusted_key = "/home/me/.sctools/localization.pub"
//!
//! [[repositories]]
//! name = "h0useRus/StarCitizen-Localization"
//! kind = "github"
//! location = "h0useRus/StarCitizen-Localization"
//! mode = "LIVE"
//!
//! [[repositories]]
//! name = "offline"
//! kind = "folder"
//! location = "/srv/mirror/localization"
//! mode = "PTU"
//!
//! [[installations]]
//! target_id = "/games/StarCitizen/LIVE"
//! repository = "h0useRus/StarCitizen-Localization"
//! installed_version = "3.23.1-v0.6"
//! monitor_for_updates = true
//! monitor_refresh_minutes = 5
//! selected = true
//!
//! [upgrade]
//! check_on_startup = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::installations::Installations;
use crate::constants::{CONFIG_ENV_VAR, DEFAULT_GITHUB_API_URL, DEFAULT_MONITOR_REFRESH_MINUTES};
use crate::core::SctoolsError;
use crate::models::GameMode;
use crate::repository::RepositoryKind;
use crate::upgrade::config::UpgradeConfig;
use crate::utils::fs::atomic_write;

/// Localization repository shipped in the default configuration.
pub const DEFAULT_LOCALIZATION_REPOSITORY: &str = "h0useRus/StarCitizen-Localization";

/// A release feed the user can install localizations from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Unique display name, used by `--repository`.
    pub name: String,
    #[serde(default)]
    pub kind: RepositoryKind,
    /// `owner/repo` for GitHub, a directory path for folder feeds.
    pub location: String,
    #[serde(default)]
    pub mode: GameMode,
}

impl RepositoryConfig {
    pub fn github(slug: &str, mode: GameMode) -> Self {
        Self {
            name: slug.to_string(),
            kind: RepositoryKind::Github,
            location: slug.to_string(),
            mode,
        }
    }
}

fn default_repositories() -> Vec<RepositoryConfig> {
    vec![RepositoryConfig::github(DEFAULT_LOCALIZATION_REPOSITORY, GameMode::Live)]
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

fn is_default_github_api_url(url: &str) -> bool {
    url == DEFAULT_GITHUB_API_URL
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Path to the Ed25519 public key packages are verified against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_key: Option<PathBuf>,

    #[serde(default = "default_github_api_url", skip_serializing_if = "is_default_github_api_url")]
    pub github_api_url: String,

    /// Personal access token for the GitHub API (raises the rate limit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Runtime data directory; defaults to the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_repositories")]
    pub repositories: Vec<RepositoryConfig>,

    #[serde(default, skip_serializing_if = "Installations::is_empty")]
    pub installations: Installations,

    #[serde(default, skip_serializing_if = "UpgradeConfig::is_default")]
    pub upgrade: UpgradeConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            trusted_key: None,
            github_api_url: default_github_api_url(),
            github_token: None,
            data_dir: None,
            repositories: default_repositories(),
            installations: Installations::default(),
            upgrade: UpgradeConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Platform default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("sctools")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".sctools")
        };
        Ok(config_dir.join("config.toml"))
    }

    /// Explicit path, else `SCTOOLS_CONFIG`, else [`default_path`](Self::default_path).
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Self::default_path(),
        }
    }

    /// Loads `path`, or returns the defaults when the file does not exist yet.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from(path).await
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content).map_err(|e| SctoolsError::ConfigParseError {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
        for (target_id, minutes) in config.installations.normalize_refresh_intervals() {
            warn!(
                target_id = %target_id,
                minutes,
                default = DEFAULT_MONITOR_REFRESH_MINUTES,
                "Invalid monitor_refresh_minutes in config, using default"
            );
        }
        Ok(config)
    }

    /// Writes atomically; on Unix the file is made owner-only since it may hold a token.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            atomic_write(&target, content.as_bytes())?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o600))
                    .with_context(|| format!("Failed to set permissions on {}", target.display()))?;
            }
            Ok(())
        })
        .await
        .context("spawn_blocking panicked")??;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Directory for locks, downloads and updater state.
    pub fn data_dir(&self, config_path: &Path) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            config_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    /// Finds a repository by name, ignoring ASCII case.
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn add_repository(&mut self, repository: RepositoryConfig) -> Result<()> {
        if self.repository(&repository.name).is_some() {
            return Err(SctoolsError::ConfigError {
                message: format!("repository '{}' already exists", repository.name),
            }
            .into());
        }
        self.repositories.push(repository);
        Ok(())
    }

    /// Removes a repository; installation records referring to it are kept.
    pub fn remove_repository(&mut self, name: &str) -> bool {
        let before = self.repositories.len();
        self.repositories.retain(|r| !r.name.eq_ignore_ascii_case(name));
        before != self.repositories.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = GlobalConfig::load_or_default(&temp.path().join("config.toml")).await.unwrap();
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.repositories[0].name, DEFAULT_LOCALIZATION_REPOSITORY);
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
    }

    #[tokio::test]
    async fn test_save_load_round_trip_with_records() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");

        let mut config = GlobalConfig::default();
        config
            .add_repository(RepositoryConfig {
                name: "mirror".to_string(),
                kind: RepositoryKind::Folder,
                location: "/srv/mirror".to_string(),
                mode: GameMode::Ptu,
            })
            .unwrap();
        let record = config.installations.select("/games/LIVE", "mirror");
        record.installed_version = Some("1.0.0-PTU".to_string());
        record.monitor_for_updates = true;
        config.upgrade.check_on_startup = true;

        config.save_to(&path).await.unwrap();
        let loaded = GlobalConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_duplicate_repository_rejected() {
        let mut config = GlobalConfig::default();
        let dup = RepositoryConfig::github(&DEFAULT_LOCALIZATION_REPOSITORY.to_lowercase(), GameMode::Live);
        assert!(config.add_repository(dup).is_err());
        assert!(config.remove_repository(DEFAULT_LOCALIZATION_REPOSITORY));
        assert!(config.repositories.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "repositories = [[[").unwrap();
        let err = GlobalConfig::load_from(&path).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SctoolsError>(),
            Some(SctoolsError::ConfigParseError { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_refresh_interval_is_reset_on_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[[installations]]\ntarget_id = '/game'\nrepository = 'local'\nmonitor_for_updates = true\nmonitor_refresh_minutes = 0\n",
        )
        .unwrap();

        let config = GlobalConfig::load_from(&path).await.unwrap();
        let record = config.installations.get("/game", "local").unwrap();
        assert_eq!(record.monitor_refresh_minutes, DEFAULT_MONITOR_REFRESH_MINUTES);
    }

    #[test]
    fn test_data_dir_defaults_to_config_parent() {
        let config = GlobalConfig::default();
        assert_eq!(config.data_dir(Path::new("/home/u/.sctools/config.toml")), PathBuf::from("/home/u/.sctools"));
    }

    #[test]
    #[serial]
    fn test_resolve_path_precedence() {
        let explicit = PathBuf::from("/explicit/config.toml");
        // SAFETY: serialized with other env-mutating tests
        unsafe { std::env::set_var(CONFIG_ENV_VAR, "/from/env.toml") };
        assert_eq!(GlobalConfig::resolve_path(Some(&explicit)).unwrap(), explicit);
        assert_eq!(GlobalConfig::resolve_path(None).unwrap(), PathBuf::from("/from/env.toml"));
        unsafe { std::env::remove_var(CONFIG_ENV_VAR) };
        assert!(GlobalConfig::resolve_path(None).unwrap().ends_with("config.toml"));
    }
}
