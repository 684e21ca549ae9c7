//! Background checks for new localization releases.
//!
//! Every installation record with `monitor_for_updates` gets its own loop that
//! refreshes the record's repository every `monitor_refresh_minutes` and emits a
//! [`MonitorEvent`] when the newest release is above the installed one. A
//! release is reported once per loop; later ticks stay quiet until a different
//! release shows up. Loops run in a [`JoinSet`] and stop when the token is
//! cancelled.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::InstallationRecord;
use crate::core::is_cancellation;
use crate::engine::Engine;
use crate::models::{Release, parse_tag_version};

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    UpdateAvailable {
        target_id: String,
        repository: String,
        installed: String,
        latest: Release,
    },
    CheckFailed {
        target_id: String,
        repository: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorOptions {
    /// Overrides every record's refresh interval.
    pub interval: Option<Duration>,
    /// Check each record once and return.
    pub once: bool,
}

/// Whether `latest` is above the installed tag. Unparseable installed tags
/// compare by tag text.
pub fn is_newer(latest: &Release, installed: &str) -> bool {
    match parse_tag_version(installed) {
        Some(version) => latest.version > version,
        None => !latest.tag.eq_ignore_ascii_case(installed),
    }
}

/// Refreshes the record's repository; returns the newest release if it is an update.
pub async fn check_record(
    engine: &Engine,
    record: &InstallationRecord,
    cancel: &CancellationToken,
) -> Result<Option<Release>> {
    let Some(installed) = record.installed_version.as_deref() else {
        return Ok(None);
    };
    let releases = engine
        .refresh(Path::new(&record.target_id), Some(&record.repository), cancel)
        .await?;
    Ok(releases.into_iter().next().filter(|latest| is_newer(latest, installed)))
}

/// Runs the monitor loops until `cancel` fires (or once, with [`MonitorOptions::once`]).
///
/// Returns the number of monitored records; zero means nothing is monitored.
pub async fn run_monitor(
    engine: Arc<Engine>,
    options: MonitorOptions,
    events: UnboundedSender<MonitorEvent>,
    cancel: CancellationToken,
) -> usize {
    let records = engine.monitored_records().await;
    let count = records.len();
    if count == 0 {
        debug!("No installations have monitoring enabled");
        return 0;
    }
    info!(records = count, "Update monitor started");

    let mut loops = JoinSet::new();
    for record in records {
        let engine = Arc::clone(&engine);
        let events = events.clone();
        let cancel = cancel.clone();
        loops.spawn(async move { monitor_loop(engine, record, options, events, cancel).await });
    }
    while let Some(result) = loops.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Monitor task failed");
        }
    }
    info!("Update monitor stopped");
    count
}

/// Tick period of a record's loop; never zero.
fn poll_period(options: &MonitorOptions, record: &InstallationRecord) -> Duration {
    match options.interval {
        Some(interval) => interval.max(Duration::from_millis(1)),
        None => Duration::from_secs(u64::from(record.monitor_refresh_minutes.max(1)) * 60),
    }
}

async fn monitor_loop(
    engine: Arc<Engine>,
    record: InstallationRecord,
    options: MonitorOptions,
    events: UnboundedSender<MonitorEvent>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(poll_period(&options, &record));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reported: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match check_record(&engine, &record, &cancel).await {
            Ok(Some(latest)) => {
                if reported.as_deref() != Some(latest.tag.as_str()) {
                    reported = Some(latest.tag.clone());
                    info!(target_id = %record.target_id, latest = %latest.tag, "Localization update available");
                    let _ = events.send(MonitorEvent::UpdateAvailable {
                        target_id: record.target_id.clone(),
                        repository: record.repository.clone(),
                        installed: record.installed_version.clone().unwrap_or_default(),
                        latest,
                    });
                }
            }
            Ok(None) => debug!(target_id = %record.target_id, "No localization update"),
            Err(e) if is_cancellation(&e) => break,
            Err(e) => {
                warn!(target_id = %record.target_id, error = %e, "Update check failed");
                let _ = events.send(MonitorEvent::CheckFailed {
                    target_id: record.target_id.clone(),
                    repository: record.repository.clone(),
                    error: format!("{e:#}"),
                });
            }
        }
        if options.once {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, RepositoryConfig};
    use crate::engine::SettingsUpdate;
    use crate::models::GameMode;
    use crate::repository::RepositoryKind;
    use crate::test_utils::{folder_repository, release};
    use crate::utils::progress::ProgressSink;
    use tempfile::TempDir;

    async fn monitored_engine(temp: &TempDir, installed: &str) -> (Arc<Engine>, std::path::PathBuf) {
        let feed = temp.path().join("feed");
        folder_repository(&feed, &[installed]);
        let game = temp.path().join("game");
        std::fs::create_dir_all(&game).unwrap();
        let config = GlobalConfig {
            repositories: vec![RepositoryConfig {
                name: "local".to_string(),
                kind: RepositoryKind::Folder,
                location: feed.to_string_lossy().into_owned(),
                mode: GameMode::Live,
            }],
            ..GlobalConfig::default()
        };
        let engine = Engine::with_config(config, temp.path().join("config.toml")).unwrap();
        engine
            .install(&game, None, None, false, &CancellationToken::new(), &ProgressSink::disabled())
            .await
            .unwrap();
        engine
            .update_settings(
                &game,
                None,
                SettingsUpdate {
                    monitor_for_updates: Some(true),
                    ..SettingsUpdate::default()
                },
            )
            .await
            .unwrap();
        (Arc::new(engine), feed)
    }

    #[test]
    fn test_poll_period_is_never_zero() {
        let mut record = InstallationRecord::new("/game", "local");
        record.monitor_refresh_minutes = 0;
        assert_eq!(poll_period(&MonitorOptions::default(), &record), Duration::from_secs(60));

        record.monitor_refresh_minutes = 15;
        assert_eq!(poll_period(&MonitorOptions::default(), &record), Duration::from_secs(900));

        let zero = MonitorOptions {
            interval: Some(Duration::ZERO),
            once: false,
        };
        assert!(!poll_period(&zero, &record).is_zero());
    }

    #[test]
    fn test_is_newer() {
        let latest = release("1.2.0", false);
        assert!(is_newer(&latest, "1.1.0"));
        assert!(!is_newer(&latest, "v1.2.0"));
        assert!(!is_newer(&latest, "2.0"));
        assert!(is_newer(&latest, "nightly"));
    }

    #[tokio::test]
    async fn test_once_reports_new_release() {
        let temp = TempDir::new().unwrap();
        let (engine, feed) = monitored_engine(&temp, "1.0.0").await;
        folder_repository(&feed, &["1.0.0", "1.1.0"]);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let options = MonitorOptions {
            once: true,
            ..MonitorOptions::default()
        };
        let count = run_monitor(engine, options, tx, CancellationToken::new()).await;
        assert_eq!(count, 1);

        match rx.recv().await.unwrap() {
            MonitorEvent::UpdateAvailable { installed, latest, .. } => {
                assert_eq!(installed, "1.0.0");
                assert_eq!(latest.tag, "1.1.0");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_up_to_date_is_quiet_and_unmonitored_skipped() {
        let temp = TempDir::new().unwrap();
        let (engine, _) = monitored_engine(&temp, "1.0.0").await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let options = MonitorOptions {
            once: true,
            ..MonitorOptions::default()
        };
        run_monitor(Arc::clone(&engine), options, tx.clone(), CancellationToken::new()).await;
        assert!(rx.try_recv().is_err());

        let empty = Engine::with_config(GlobalConfig::default(), temp.path().join("other.toml")).unwrap();
        assert_eq!(run_monitor(Arc::new(empty), options, tx, CancellationToken::new()).await, 0);
    }

    #[tokio::test]
    async fn test_failed_check_is_reported() {
        let temp = TempDir::new().unwrap();
        let (engine, feed) = monitored_engine(&temp, "1.0.0").await;
        std::fs::remove_file(feed.join("releases.json")).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let options = MonitorOptions {
            once: true,
            ..MonitorOptions::default()
        };
        run_monitor(engine, options, tx, CancellationToken::new()).await;
        assert!(matches!(rx.recv().await, Some(MonitorEvent::CheckFailed { .. })));
    }

    #[tokio::test]
    async fn test_cancel_stops_loops_and_dedupes() {
        let temp = TempDir::new().unwrap();
        let (engine, feed) = monitored_engine(&temp, "1.0.0").await;
        folder_repository(&feed, &["1.0.0", "1.1.0"]);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let options = MonitorOptions {
            interval: Some(Duration::from_millis(20)),
            once: false,
        };
        let handle = tokio::spawn(run_monitor(engine, options, tx, cancel.clone()));

        assert!(matches!(rx.recv().await, Some(MonitorEvent::UpdateAvailable { .. })));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 1);
        // later ticks saw the same release and stayed quiet
        assert!(rx.try_recv().is_err());
    }
}
