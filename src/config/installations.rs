//! Per-target installation records.
//!
//! One record exists per (target, repository) pair. A record is created the first
//! time a repository is selected for a target, updated by install, uninstall and
//! settings changes, and removed only by an explicit purge. Exactly one record
//! per target may be marked `selected`; that repository is the one used when
//! no `--repository` is given.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MONITOR_REFRESH_MINUTES, MONITOR_REFRESH_CHOICES};

fn default_refresh_minutes() -> u32 {
    DEFAULT_MONITOR_REFRESH_MINUTES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    /// Canonical path of the game directory.
    pub target_id: String,
    /// Name of the configured repository.
    pub repository: String,
    /// Tag of the installed release; `None` when nothing is installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    /// Last version the user selected or installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_version: Option<String>,
    #[serde(default)]
    pub allow_prerelease: bool,
    #[serde(default)]
    pub monitor_for_updates: bool,
    #[serde(default = "default_refresh_minutes")]
    pub monitor_refresh_minutes: u32,
    /// Repository currently chosen for this target.
    #[serde(default)]
    pub selected: bool,
}

impl InstallationRecord {
    pub fn new(target_id: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            repository: repository.into(),
            installed_version: None,
            last_version: None,
            allow_prerelease: false,
            monitor_for_updates: false,
            monitor_refresh_minutes: DEFAULT_MONITOR_REFRESH_MINUTES,
            selected: false,
        }
    }

    /// Whether `version` is the installed one (tags compare case-insensitively).
    pub fn is_installed_version(&self, version: &str) -> bool {
        self.installed_version
            .as_deref()
            .is_some_and(|installed| installed.eq_ignore_ascii_case(version))
    }

    /// Something is installed and it differs from `current`.
    pub fn is_update_available(&self, current: &str) -> bool {
        self.installed_version.is_some() && !self.is_installed_version(current)
    }

    /// Version to preselect: the last chosen one, else the installed one.
    pub fn preferred_version(&self) -> Option<&str> {
        self.last_version.as_deref().or(self.installed_version.as_deref())
    }

    pub fn set_refresh_minutes(&mut self, minutes: u32) -> Result<(), String> {
        if !MONITOR_REFRESH_CHOICES.contains(&minutes) {
            return Err(format!(
                "refresh interval must be one of {MONITOR_REFRESH_CHOICES:?} minutes, got {minutes}"
            ));
        }
        self.monitor_refresh_minutes = minutes;
        Ok(())
    }

    fn matches(&self, target_id: &str, repository: &str) -> bool {
        self.target_id == target_id && self.repository.eq_ignore_ascii_case(repository)
    }
}

/// All records, serialized as `[[installations]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Installations(Vec<InstallationRecord>);

impl Installations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstallationRecord> {
        self.0.iter()
    }

    pub fn for_target<'a>(&'a self, target_id: &'a str) -> impl Iterator<Item = &'a InstallationRecord> {
        self.0.iter().filter(move |r| r.target_id == target_id)
    }

    pub fn get(&self, target_id: &str, repository: &str) -> Option<&InstallationRecord> {
        self.0.iter().find(|r| r.matches(target_id, repository))
    }

    pub fn get_mut(&mut self, target_id: &str, repository: &str) -> Option<&mut InstallationRecord> {
        self.0.iter_mut().find(|r| r.matches(target_id, repository))
    }

    /// Returns the record, creating it first if needed. A target's first record is selected.
    pub fn ensure(&mut self, target_id: &str, repository: &str) -> &mut InstallationRecord {
        let index = match self.0.iter().position(|r| r.matches(target_id, repository)) {
            Some(index) => index,
            None => {
                let mut record = InstallationRecord::new(target_id, repository);
                record.selected = self.selected(target_id).is_none();
                self.0.push(record);
                self.0.len() - 1
            }
        };
        &mut self.0[index]
    }

    pub fn selected(&self, target_id: &str) -> Option<&InstallationRecord> {
        self.0.iter().find(|r| r.target_id == target_id && r.selected)
    }

    /// Marks `repository` as the one chosen for `target_id`, creating its record if needed.
    pub fn select(&mut self, target_id: &str, repository: &str) -> &mut InstallationRecord {
        for record in self.0.iter_mut().filter(|r| r.target_id == target_id) {
            record.selected = false;
        }
        let record = self.ensure(target_id, repository);
        record.selected = true;
        record
    }

    /// Resets refresh intervals outside [`MONITOR_REFRESH_CHOICES`] to the default.
    /// Returns the records that were changed, as `(target_id, bad_minutes)`.
    pub fn normalize_refresh_intervals(&mut self) -> Vec<(String, u32)> {
        let mut fixed = Vec::new();
        for record in &mut self.0 {
            if !MONITOR_REFRESH_CHOICES.contains(&record.monitor_refresh_minutes) {
                fixed.push((record.target_id.clone(), record.monitor_refresh_minutes));
                record.monitor_refresh_minutes = DEFAULT_MONITOR_REFRESH_MINUTES;
            }
        }
        fixed
    }

    /// Removes the record; returns whether one existed.
    pub fn remove(&mut self, target_id: &str, repository: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|r| !r.matches(target_id, repository));
        before != self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_record_is_selected() {
        let mut records = Installations::default();
        records.ensure("/game", "a/one");
        records.ensure("/game", "b/two");
        assert_eq!(records.selected("/game").unwrap().repository, "a/one");

        records.select("/game", "b/two");
        assert_eq!(records.selected("/game").unwrap().repository, "b/two");
        assert_eq!(records.for_target("/game").filter(|r| r.selected).count(), 1);
    }

    #[test]
    fn test_selected_outlives_lookup_key() {
        let mut records = Installations::default();
        records.ensure("/game", "a/one");
        let selected = {
            let key = String::from("/game");
            records.selected(&key)
        };
        assert_eq!(selected.map(|r| r.repository.as_str()), Some("a/one"));
        assert!(records.selected("/other").is_none());
    }

    #[test]
    fn test_lookup_ignores_repository_case() {
        let mut records = Installations::default();
        records.ensure("/game", "Owner/Repo").installed_version = Some("1.0".to_string());
        assert!(records.get("/game", "owner/repo").is_some());
        assert!(records.get("/other", "owner/repo").is_none());
        assert!(records.remove("/game", "OWNER/REPO"));
        assert!(records.is_empty());
    }

    #[test]
    fn test_version_comparison() {
        let mut record = InstallationRecord::new("/game", "repo");
        assert!(!record.is_update_available("v1.0"));

        record.installed_version = Some("V1.0".to_string());
        assert!(record.is_installed_version("v1.0"));
        assert!(!record.is_update_available("v1.0"));
        assert!(record.is_update_available("v1.1"));
        assert_eq!(record.preferred_version(), Some("V1.0"));
    }

    #[test]
    fn test_out_of_range_intervals_are_reset() {
        let mut records = Installations::default();
        records.ensure("/game", "a/one").monitor_refresh_minutes = 0;
        records.ensure("/game", "b/two").monitor_refresh_minutes = 30;

        assert_eq!(records.normalize_refresh_intervals(), vec![("/game".to_string(), 0)]);
        assert_eq!(records.get("/game", "a/one").unwrap().monitor_refresh_minutes, 5);
        assert_eq!(records.get("/game", "b/two").unwrap().monitor_refresh_minutes, 30);
    }

    #[test]
    fn test_refresh_interval_choices() {
        let mut record = InstallationRecord::new("/game", "repo");
        assert_eq!(record.monitor_refresh_minutes, 5);
        assert!(record.set_refresh_minutes(15).is_ok());
        assert!(record.set_refresh_minutes(7).is_err());
        assert_eq!(record.monitor_refresh_minutes, 15);
    }
}
