//! Shared fixture for the integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use sctools::test_utils::folder_repository;
use sctools::upgrade::UpdateStore;

pub const GLOBAL_INI: &str = "data/Localization/korean_(south_korea)/global.ini";

/// A config file with one folder repository named `local` and an empty game directory.
pub struct TestEnv {
    pub temp: TempDir,
    pub game: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnv {
    pub fn new(tags: &[&str]) -> Self {
        Self::with_api_url(tags, None)
    }

    /// Like [`TestEnv::new`], with `github_api_url` pointing at a mock server and
    /// `sctools.zip` as the application asset.
    pub fn with_api_url(tags: &[&str], api_url: Option<&str>) -> Self {
        let temp = TempDir::new().unwrap();
        let feed = temp.path().join("feed");
        folder_repository(&feed, tags);
        let game = temp.path().join("game");
        std::fs::create_dir_all(&game).unwrap();

        let config_path = temp.path().join("home/config.toml");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        let mut config = String::new();
        if let Some(url) = api_url {
            config.push_str(&format!("github_api_url = '{url}'\n\n"));
        }
        config.push_str(&format!(
            "[[repositories]]\nname = 'local'\nkind = 'folder'\nlocation = '{}'\nmode = 'LIVE'\n",
            feed.display()
        ));
        if api_url.is_some() {
            config.push_str("\n[upgrade]\nasset_name = 'sctools.zip'\n");
        }
        std::fs::write(&config_path, config).unwrap();

        Self {
            temp,
            game,
            config_path,
        }
    }

    /// `sctools` with `--config`; progress bars off and stdin closed.
    pub fn cmd(&self) -> Command {
        self.cmd_with_prefix(&[])
    }

    /// `sctools update_status <code> ...`, the way the relaunch helper starts it.
    pub fn relaunched_cmd(&self, code: &str) -> Command {
        self.cmd_with_prefix(&["update_status", code])
    }

    fn cmd_with_prefix(&self, prefix: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("sctools").unwrap();
        cmd.args(prefix)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--no-progress")
            .env_remove("SCTOOLS_CONFIG")
            .env_remove("RUST_LOG")
            .write_stdin("");
        cmd
    }

    /// `sctools <args> --game-dir <game>`.
    pub fn target_cmd(&self, args: &[&str]) -> Command {
        let mut cmd = self.cmd();
        cmd.args(args).arg("--game-dir").arg(&self.game);
        cmd
    }

    pub fn data_dir(&self) -> &Path {
        self.config_path.parent().unwrap()
    }

    pub fn store(&self) -> UpdateStore {
        UpdateStore::new(self.data_dir())
    }

    pub fn config_text(&self) -> String {
        std::fs::read_to_string(&self.config_path).unwrap()
    }

    pub fn global_ini(&self) -> Option<String> {
        std::fs::read_to_string(self.game.join(GLOBAL_INI)).ok()
    }
}
