//! What happens to a pending application update when `sctools` starts.

use std::ffi::OsString;
use std::future::Future;
use tracing::{error, info};

use super::schedule::ScheduledUpdate;
use super::self_updater::ApplicationUpdater;
use super::status::InstallUpdateStatus;
use crate::constants::UPDATE_STATUS_ARG;
use crate::repository::ReleaseSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Nothing scheduled; continue normally.
    NoPendingUpdate,
    /// Relaunched by the helper after a successful copy.
    UpdateApplied,
    /// The helper (or a previous launch attempt) reported a non-zero code.
    PreviousUpdateFailed { code: String },
    /// The scheduled version is already running; the schedule was dropped.
    ScheduleCancelled,
    /// The user chose not to install now; the schedule is kept.
    Declined,
    /// The helper is running; the process must exit.
    RelaunchStarted { version: String },
    /// The helper could not be started.
    LaunchFailed(InstallUpdateStatus),
}

impl StartupOutcome {
    /// Whether the caller must exit so the helper can replace the binary.
    pub fn must_exit(&self) -> bool {
        matches!(self, StartupOutcome::RelaunchStarted { .. })
    }
}

/// Splits a leading `update_status <code>` pair off the arguments (after argv[0]).
///
/// Returns the code, if present, and the remaining arguments with argv[0] kept.
pub fn split_update_status_args(args: Vec<OsString>) -> (Option<String>, Vec<OsString>) {
    let is_status = args.get(1).is_some_and(|a| a == UPDATE_STATUS_ARG);
    if !is_status || args.len() < 3 {
        return (None, args);
    }
    let mut args = args;
    let code = args.remove(2).to_string_lossy().into_owned();
    args.remove(1);
    (Some(code), args)
}

/// Runs the startup half of the update protocol.
///
/// 1. remove a leftover helper script and consume the helper's result marker
/// 2. a non-zero `update_status` code (or result marker) is reported as a failure
/// 3. a schedule for the running version is dropped
/// 4. otherwise `confirm` decides whether to install the scheduled update now
pub async fn run_startup<S, F, Fut>(
    updater: &mut ApplicationUpdater<S>,
    update_status: Option<&str>,
    confirm: F,
) -> StartupOutcome
where
    S: ReleaseSource,
    F: FnOnce(ScheduledUpdate) -> Fut,
    Fut: Future<Output = bool>,
{
    updater.remove_update_script();
    let marker = updater.take_relaunch_result();

    let reported = update_status
        .map(str::to_string)
        .or_else(|| marker.map(|m| m.status.to_string()));
    if let Some(code) = reported {
        if code.trim() != InstallUpdateStatus::success_arg() {
            error!(code = %code, "Previous application update failed");
            return StartupOutcome::PreviousUpdateFailed { code };
        }
        if updater.scheduled_update().is_none() {
            info!(version = %updater.current_version(), "Application update applied");
            return StartupOutcome::UpdateApplied;
        }
    }

    let Some(scheduled) = updater.scheduled_update() else {
        return StartupOutcome::NoPendingUpdate;
    };
    if updater.is_already_installed_version(&scheduled) {
        if let Err(e) = updater.cancel_scheduled_update() {
            error!(error = %e, "Failed to drop stale update schedule");
        }
        return StartupOutcome::ScheduleCancelled;
    }

    updater.apply_scheduled_update_props(&scheduled);
    let version = scheduled.version.clone();
    if !confirm(scheduled).await {
        info!(version = %version, "Scheduled update postponed");
        return StartupOutcome::Declined;
    }
    match updater.install_scheduled_update().await {
        InstallUpdateStatus::Success => StartupOutcome::RelaunchStarted { version },
        status => StartupOutcome::LaunchFailed(status),
    }
}
