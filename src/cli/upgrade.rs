use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use super::CliConfig;
use super::common::Progress;
use crate::core::SctoolsError;
use crate::engine::Engine;
use crate::upgrade::{ApplicationUpdater, InstallUpdateStatus};

/// Checks for, downloads and schedules new `sctools` releases.
///
/// A downloaded update is installed on the next start (after a prompt), or
/// right away with `--now`.
#[derive(Args, Debug)]
pub struct UpgradeCommand {
    /// Release to schedule instead of the newest one
    version: Option<String>,

    /// Only report whether an update is available
    #[arg(long, conflicts_with_all = ["cancel", "now"])]
    check: bool,

    /// Cancel the scheduled update and delete its package
    #[arg(long, conflicts_with = "now")]
    cancel: bool,

    /// Install the scheduled update now and restart
    #[arg(long)]
    now: bool,
}

impl UpgradeCommand {
    pub async fn execute(self, engine: &Engine, config: &CliConfig, cancel: &CancellationToken) -> Result<()> {
        let mut updater = engine.application_updater().await?;

        if self.cancel {
            let had_schedule = updater.scheduled_update().is_some();
            updater.cancel_scheduled_update()?;
            if had_schedule {
                println!("{}", "Scheduled update cancelled".green());
            } else {
                println!("No update is scheduled");
            }
            return Ok(());
        }

        if self.check {
            return check(&mut updater, cancel).await;
        }

        let scheduled = match updater.scheduled_update() {
            Some(scheduled) if self.version.is_none() => Some(scheduled),
            _ => self.download_and_schedule(&mut updater, config, cancel).await?,
        };
        let Some(scheduled) = scheduled else {
            return Ok(());
        };

        if !self.now {
            println!(
                "{} {} will be installed on the next start. Run {} to install it now.",
                "Update".green(),
                scheduled.version,
                "sctools upgrade --now".cyan()
            );
            return Ok(());
        }

        updater.apply_scheduled_update_props(&scheduled);
        match updater.install_scheduled_update().await {
            InstallUpdateStatus::Success => {
                println!(
                    "{} {}. sctools will restart when done.",
                    "Installing update".green(),
                    scheduled.version
                );
                Ok(())
            }
            status => {
                if status == InstallUpdateStatus::PackageMissing {
                    updater.cancel_scheduled_update()?;
                }
                Err(SctoolsError::UpdateLaunchFailed { code: status.code() }.into())
            }
        }
    }

    async fn download_and_schedule(
        &self,
        updater: &mut ApplicationUpdater,
        config: &CliConfig,
        cancel: &CancellationToken,
    ) -> Result<Option<crate::upgrade::ScheduledUpdate>> {
        let release = match &self.version {
            Some(version) => match updater.find_release(version, cancel).await? {
                Some(release) => release,
                None => bail!(SctoolsError::ReleaseNotFound {
                    repository: updater.repository().name().to_string(),
                    version: version.clone(),
                }),
            },
            None => match updater.check_for_update(cancel).await? {
                Some(release) => release,
                None => {
                    println!("{} {}", "sctools is up to date:".green(), updater.current_version());
                    return Ok(None);
                }
            },
        };

        let progress = Progress::start(config.progress_hidden());
        let package = updater.download_update(&release, cancel, progress.sink()).await;
        progress.finish().await;
        let package = package?;

        // replaces any previous schedule
        if updater.scheduled_update().is_some_and(|s| s.package_path != package) {
            updater.cancel_scheduled_update()?;
        }
        Ok(Some(updater.schedule_install_update(&release, &package)?))
    }
}

async fn check(updater: &mut ApplicationUpdater, cancel: &CancellationToken) -> Result<()> {
    match updater.check_for_update(cancel).await? {
        Some(release) => println!(
            "{} {} (running {})",
            "Update available:".green().bold(),
            release.tag,
            updater.current_version()
        ),
        None => println!("{} {}", "sctools is up to date:".green(), updater.current_version()),
    }
    if let Some(scheduled) = updater.scheduled_update() {
        println!("{} {}", "Scheduled:".bold(), scheduled.version);
    }
    Ok(())
}
