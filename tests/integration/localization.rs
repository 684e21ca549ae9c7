use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn test_install_status_toggle_uninstall() {
    let env = TestEnv::new(&["1.0.0", "1.1.0"]);

    env.target_cmd(&["install"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Installed")
                .and(predicate::str::contains("1.1.0"))
                .and(predicate::str::contains("unverified")),
        );
    assert_eq!(env.global_ini().as_deref(), Some("version=1.1.0"));
    assert!(env.config_text().contains("installed_version = \"1.1.0\""));

    env.target_cmd(&["status", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("enabled").and(predicate::str::contains("1.1.0")));

    env.target_cmd(&["toggle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
    env.target_cmd(&["status", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));

    env.target_cmd(&["uninstall"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Localization removed"));
    assert!(env.global_ini().is_none());
    env.target_cmd(&["status", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not installed"));
}

#[test]
fn test_reinstall_needs_force() {
    let env = TestEnv::new(&["1.0.0"]);
    env.target_cmd(&["install"]).assert().success();

    env.target_cmd(&["install"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already installed"));
    env.target_cmd(&["install", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed"));
}

#[test]
fn test_select_then_install_uses_selection() {
    let env = TestEnv::new(&["1.0.0", "1.1.0"]);

    env.target_cmd(&["select", "1.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected 1.0.0"));
    env.target_cmd(&["install"]).assert().success();
    assert_eq!(env.global_ini().as_deref(), Some("version=1.0.0"));

    env.target_cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update available").and(predicate::str::contains("1.1.0")));
}

#[test]
fn test_versions_lists_newest_first() {
    let env = TestEnv::new(&["1.0.0", "1.1.0"]);
    let output = env.target_cmd(&["versions", "--tags-only"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1.1.0\n1.0.0\n");
}

#[test]
fn test_unknown_version_fails() {
    let env = TestEnv::new(&["1.0.0"]);
    env.target_cmd(&["install", "9.9.9"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("9.9.9"));
    assert!(env.global_ini().is_none());
}

#[test]
fn test_missing_game_dir_fails() {
    let env = TestEnv::new(&["1.0.0"]);
    env.cmd()
        .args(["status", "--offline", "--game-dir"])
        .arg(env.temp.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Game directory not found"));
}

#[test]
fn test_settings_round_trip_through_config() {
    let env = TestEnv::new(&["1.0.0"]);
    env.target_cmd(&["settings", "--monitor", "true", "--interval", "15"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Settings saved").and(predicate::str::contains("15 min")));

    env.target_cmd(&["settings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Monitor:").and(predicate::str::contains("15 min")));

    env.target_cmd(&["settings", "--interval", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("7"));
}

#[test]
fn test_repo_add_list_remove() {
    let env = TestEnv::new(&["1.0.0"]);
    let mirror = env.temp.path().join("mirror");
    sctools::test_utils::folder_repository(&mirror, &["2.0.0"]);

    env.cmd()
        .args(["repo", "add", "mirror"])
        .arg(&mirror)
        .args(["--kind", "folder"])
        .assert()
        .success();
    env.cmd()
        .args(["repo", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mirror").and(predicate::str::contains("local")));

    env.target_cmd(&["install", "-r", "mirror"]).assert().success();
    assert_eq!(env.global_ini().as_deref(), Some("version=2.0.0"));

    env.cmd().args(["repo", "remove", "mirror"]).assert().success();
    env.cmd()
        .args(["repo", "remove", "mirror"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}

#[test]
fn test_monitor_once_reports_update() {
    let env = TestEnv::new(&["1.0.0", "1.1.0"]);
    env.target_cmd(&["install", "1.0.0"]).assert().success();
    env.target_cmd(&["settings", "--monitor", "true"]).assert().success();

    env.cmd()
        .args(["monitor", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update available").and(predicate::str::contains("1.1.0")));
}

#[test]
fn test_monitor_without_records() {
    let env = TestEnv::new(&["1.0.0"]);
    env.cmd()
        .args(["monitor", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No installations are monitored"));
}
