use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_APP_REPOSITORY;

/// Self-update settings, stored under `[upgrade]` in `config.toml`.
///
/// ```toml
/// [upgrade]
/// repository = "sctools-dev/sctools"
/// asset_name = "sctools-linux-x86_64.zip"
/// check_on_startup = true
/// allow_prerelease = false
/// ```
///
/// Every field has a default, so an absent or partial `[upgrade]` table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// GitHub `owner/repo` publishing application releases.
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Release asset holding the packaged application. Defaults to the
    /// platform-specific name from [`default_asset_name`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,

    /// Look for a newer application release on every start.
    #[serde(default)]
    pub check_on_startup: bool,

    /// Offer pre-release builds of the application.
    #[serde(default)]
    pub allow_prerelease: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            asset_name: None,
            check_on_startup: false,
            allow_prerelease: false,
        }
    }
}

impl UpgradeConfig {
    pub fn resolved_asset_name(&self) -> String {
        self.asset_name.clone().unwrap_or_else(default_asset_name)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

fn default_repository() -> String {
    DEFAULT_APP_REPOSITORY.to_string()
}

/// `sctools-<os>-<arch>.zip`, e.g. `sctools-windows-x86_64.zip`.
pub fn default_asset_name() -> String {
    format!("sctools-{}-{}.zip", std::env::consts::OS, std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_uses_defaults() {
        let config: UpgradeConfig = toml::from_str("check_on_startup = true").unwrap();
        assert!(config.check_on_startup);
        assert_eq!(config.repository, DEFAULT_APP_REPOSITORY);
        assert!(config.resolved_asset_name().starts_with("sctools-"));
    }

    #[test]
    fn test_explicit_asset_name_wins() {
        let config = UpgradeConfig {
            asset_name: Some("custom.zip".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolved_asset_name(), "custom.zip");
        assert!(!config.is_default());
    }
}
