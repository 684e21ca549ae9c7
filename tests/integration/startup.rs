use chrono::Utc;
use predicates::prelude::*;

use sctools::upgrade::ScheduledUpdate;

use crate::common::TestEnv;

fn schedule(env: &TestEnv, version: &str) -> ScheduledUpdate {
    let package = env.data_dir().join("updates/downloads").join(version).join("sctools.zip");
    std::fs::create_dir_all(package.parent().unwrap()).unwrap();
    sctools::test_utils::write_zip(&package, &[("sctools", b"new binary".as_slice())]);
    let scheduled = ScheduledUpdate {
        version: version.to_string(),
        package_path: package,
        scheduled_at: Utc::now(),
    };
    env.store().write_scheduled(&scheduled).unwrap();
    scheduled
}

#[test]
fn test_failed_update_status_is_reported_and_command_runs() {
    let env = TestEnv::new(&["1.0.0"]);
    let mut cmd = env.relaunched_cmd("3");
    cmd.args(["install", "--game-dir"]).arg(&env.game);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("code 3"));
    assert_eq!(env.global_ini().as_deref(), Some("version=1.0.0"));
}

#[test]
fn test_successful_update_status_runs_the_command() {
    let env = TestEnv::new(&["1.0.0"]);
    let mut cmd = env.relaunched_cmd("0");
    cmd.args(["status", "--offline", "--game-dir"]).arg(&env.game);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Updated to").and(predicate::str::contains("not installed")));
}

#[test]
fn test_result_marker_is_consumed_once() {
    let env = TestEnv::new(&["1.0.0"]);
    std::fs::create_dir_all(env.store().root()).unwrap();
    std::fs::write(env.store().result_path(), "{\"status\":4}\n").unwrap();

    env.target_cmd(&["status", "--offline"])
        .assert()
        .success()
        .stderr(predicate::str::contains("code 4"));
    assert!(!env.store().result_path().exists());

    env.target_cmd(&["status", "--offline"])
        .assert()
        .success()
        .stderr(predicate::str::contains("code 4").not());
}

#[test]
fn test_leftover_helper_is_removed() {
    let env = TestEnv::new(&["1.0.0"]);
    std::fs::create_dir_all(env.store().root()).unwrap();
    std::fs::write(env.store().script_path(), "exit 0\n").unwrap();

    env.target_cmd(&["status", "--offline"]).assert().success();
    assert!(!env.store().script_path().exists());
}

#[test]
fn test_scheduled_update_declined_without_terminal() {
    let env = TestEnv::new(&["1.0.0"]);
    let scheduled = schedule(&env, "v99.0.0");

    env.target_cmd(&["status", "--offline"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("v99.0.0")
                .and(predicate::str::contains("Update postponed"))
                .and(predicate::str::contains("not installed")),
        );
    assert_eq!(env.store().read_scheduled(), Some(scheduled));
}

#[test]
fn test_schedule_for_running_version_is_dropped() {
    let env = TestEnv::new(&["1.0.0"]);
    let scheduled = schedule(&env, concat!("v", env!("CARGO_PKG_VERSION")));

    env.target_cmd(&["status", "--offline"]).assert().success();
    assert!(env.store().read_scheduled().is_none());
    assert!(!scheduled.package_path.exists());
}

#[test]
fn test_upgrade_cancel_removes_schedule() {
    let env = TestEnv::new(&["1.0.0"]);
    let scheduled = schedule(&env, "v99.0.0");

    env.cmd()
        .args(["upgrade", "--cancel"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled update cancelled"));
    assert!(env.store().read_scheduled().is_none());
    assert!(!scheduled.package_path.exists());
}
