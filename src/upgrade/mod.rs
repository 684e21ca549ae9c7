//! Self-update of the `sctools` application from GitHub releases.
//!
//! The running binary is never replaced in place. An update goes through:
//!
//! ```text
//! 1. check      newest release above the running version (`[upgrade] repository`)
//! 2. download   the platform asset to {data_dir}/updates/downloads/<tag>/
//! 3. schedule   scheduled.json marker; offered again on every start until handled
//! 4. startup    confirm -> verify + extract to staging/ -> write update.sh|cmd
//! 5. relaunch   helper waits for exit, copies files, writes result.json and
//!               starts `sctools update_status <code>`
//! ```
//!
//! `update_status` codes are the numeric values of [`InstallUpdateStatus`]. A
//! non-zero code on startup is reported to the user exactly once; the schedule
//! stays in place so the update can be retried.
//!
//! With `trusted_key` configured, packages must come with a valid `.sig`
//! (published as `<asset>.sig` next to the asset), checked before extraction.

pub mod config;
pub mod relaunch;
pub mod schedule;
pub mod self_updater;
pub mod startup;
pub mod status;

pub use config::UpgradeConfig;
pub use schedule::{RelaunchResult, ScheduledUpdate, UpdateStore};
pub use self_updater::{ApplicationUpdater, running_version};
pub use startup::{StartupOutcome, run_startup, split_update_status_args};
pub use status::InstallUpdateStatus;
