//! Durable markers shared between the running process, the relaunch helper and
//! the next process.
//!
//! ```text
//! {data_dir}/updates/
//!   scheduled.json     ScheduledUpdate, written when an update is scheduled
//!   result.json        RelaunchResult, written by the helper before relaunching
//!   staging/           extracted application files waiting to be copied
//!   downloads/         downloaded application packages
//!   update.sh|cmd      the relaunch helper itself
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::parse_tag_version;
use crate::utils::fs::{atomic_write, remove_file_if_exists};

/// An application update waiting to be installed on the next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledUpdate {
    /// Release tag of the update.
    pub version: String,
    pub package_path: PathBuf,
    pub scheduled_at: DateTime<Utc>,
}

impl ScheduledUpdate {
    pub fn parsed_version(&self) -> Option<semver::Version> {
        parse_tag_version(&self.version)
    }
}

/// Written by the relaunch helper once it finished copying files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaunchResult {
    pub status: u8,
}

/// Locations of the updater's markers below `{data_dir}/updates`.
#[derive(Debug, Clone)]
pub struct UpdateStore {
    root: PathBuf,
}

impl UpdateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("updates"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scheduled_path(&self) -> PathBuf {
        self.root.join("scheduled.json")
    }

    pub fn result_path(&self) -> PathBuf {
        self.root.join("result.json")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn script_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.root.join("update.cmd")
        } else {
            self.root.join("update.sh")
        }
    }

    /// Reads the scheduled-update marker. Missing or unreadable markers yield `None`.
    pub fn read_scheduled(&self) -> Option<ScheduledUpdate> {
        let path = self.scheduled_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Cannot read scheduled update");
                }
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(scheduled) => Some(scheduled),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt scheduled update");
                None
            }
        }
    }

    pub fn write_scheduled(&self, scheduled: &ScheduledUpdate) -> Result<()> {
        let json = serde_json::to_vec_pretty(scheduled).context("Failed to serialize scheduled update")?;
        atomic_write(&self.scheduled_path(), &json)
    }

    pub fn clear_scheduled(&self) -> io::Result<()> {
        remove_file_if_exists(&self.scheduled_path())
    }

    /// Reads and deletes the helper's result marker.
    pub fn take_result(&self) -> Option<RelaunchResult> {
        let path = self.result_path();
        let content = std::fs::read_to_string(&path).ok()?;
        if let Err(e) = remove_file_if_exists(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove update result marker");
        }
        match serde_json::from_str::<RelaunchResult>(content.trim()) {
            Ok(result) => {
                debug!(status = result.status, "Consumed update result marker");
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt update result marker");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scheduled_marker_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = UpdateStore::new(temp.path());
        assert!(store.read_scheduled().is_none());

        let scheduled = ScheduledUpdate {
            version: "v1.4.0".to_string(),
            package_path: temp.path().join("pkg.zip"),
            scheduled_at: Utc::now(),
        };
        store.write_scheduled(&scheduled).unwrap();
        assert_eq!(store.read_scheduled(), Some(scheduled.clone()));
        assert_eq!(scheduled.parsed_version(), Some(semver::Version::new(1, 4, 0)));

        store.clear_scheduled().unwrap();
        store.clear_scheduled().unwrap();
        assert!(store.read_scheduled().is_none());
    }

    #[test]
    fn test_corrupt_marker_is_ignored() {
        let temp = TempDir::new().unwrap();
        let store = UpdateStore::new(temp.path());
        std::fs::create_dir_all(store.root()).unwrap();
        std::fs::write(store.scheduled_path(), "{ not json").unwrap();
        assert!(store.read_scheduled().is_none());
    }

    #[test]
    fn test_result_marker_is_consumed_once() {
        let temp = TempDir::new().unwrap();
        let store = UpdateStore::new(temp.path());
        std::fs::create_dir_all(store.root()).unwrap();
        // the helper writes a trailing newline
        std::fs::write(store.result_path(), "{\"status\":4}\n").unwrap();

        assert_eq!(store.take_result(), Some(RelaunchResult { status: 4 }));
        assert_eq!(store.take_result(), None);
        assert!(!store.result_path().exists());
    }
}
