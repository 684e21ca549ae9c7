use assert_cmd::Command;
use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use serde_json::json;
use std::process::Output;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::TestEnv;

const RELEASES_PATH: &str = "/repos/sctools-dev/sctools/releases";

fn package_bytes(temp: &std::path::Path) -> Vec<u8> {
    let path = temp.join("sctools-upload.zip");
    sctools::test_utils::write_zip(&path, &[("sctools", b"binary v99".as_slice())]);
    std::fs::read(path).unwrap()
}

async fn mock_releases(server: &MockServer, tags: &[&str]) {
    let url = server.uri();
    let body: Vec<_> = tags
        .iter()
        .map(|tag| {
            json!({
                "tag_name": tag,
                "name": format!("sctools {tag}"),
                "prerelease": false,
                "draft": false,
                "published_at": "2026-01-10T12:00:00Z",
                "zipball_url": format!("{url}/zipball/{tag}"),
                "assets": [{
                    "name": "sctools.zip",
                    "browser_download_url": format!("{url}/download/{tag}/sctools.zip"),
                    "size": 0
                }]
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Runs the binary off the runtime so the mock server keeps serving.
async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap()).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_check_reports_newer_release() {
    let server = MockServer::start().await;
    mock_releases(&server, &["v99.0.0", "v0.0.1"]).await;
    let env = TestEnv::with_api_url(&["1.0.0"], Some(&server.uri()));

    let mut cmd = env.cmd();
    cmd.args(["upgrade", "--check"]);
    run(cmd)
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Update available").and(predicate::str::contains("v99.0.0")));
    assert!(env.store().read_scheduled().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_check_up_to_date() {
    let server = MockServer::start().await;
    mock_releases(&server, &["v0.0.1"]).await;
    let env = TestEnv::with_api_url(&["1.0.0"], Some(&server.uri()));

    let mut cmd = env.cmd();
    cmd.args(["upgrade", "--check"]);
    run(cmd)
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_downloads_and_schedules() {
    let server = MockServer::start().await;
    mock_releases(&server, &["v99.0.0"]).await;
    let env = TestEnv::with_api_url(&["1.0.0"], Some(&server.uri()));
    Mock::given(method("GET"))
        .and(path("/download/v99.0.0/sctools.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(package_bytes(env.temp.path())))
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = env.cmd();
    cmd.arg("upgrade");
    run(cmd)
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("will be installed on the next start"));

    let scheduled = env.store().read_scheduled().expect("update scheduled");
    assert_eq!(scheduled.version, "v99.0.0");
    assert!(scheduled.package_path.exists());

    // the next start offers it; without a terminal the answer is no
    run(env.target_cmd(&["status", "--offline"]))
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Update postponed"));
    assert!(env.store().read_scheduled().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_unknown_version_fails() {
    let server = MockServer::start().await;
    mock_releases(&server, &["v99.0.0"]).await;
    let env = TestEnv::with_api_url(&["1.0.0"], Some(&server.uri()));

    let mut cmd = env.cmd();
    cmd.args(["upgrade", "v42.0.0"]);
    run(cmd)
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("v42.0.0"));
    assert!(env.store().read_scheduled().is_none());
}
