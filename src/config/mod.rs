//! Persistent configuration: repositories, installation records and updater settings.

pub mod global;
pub mod installations;

pub use global::{DEFAULT_LOCALIZATION_REPOSITORY, GlobalConfig, RepositoryConfig};
pub use installations::{InstallationRecord, Installations};
