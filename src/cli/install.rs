use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use super::CliConfig;
use super::common::{Progress, TargetArgs};
use crate::core::SctoolsError;
use crate::engine::{Engine, InstallOutcome};

#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Release to install; defaults to the selected one, else the latest
    version: Option<String>,

    #[command(flatten)]
    target: TargetArgs,

    /// Reinstall even if this release is already installed
    #[arg(short, long)]
    force: bool,
}

impl InstallCommand {
    pub async fn execute(self, engine: &Engine, config: &CliConfig, cancel: &CancellationToken) -> Result<()> {
        let progress = Progress::start(config.progress_hidden());
        let result = engine
            .install(
                &self.target.game_dir,
                self.target.repository(),
                self.version.as_deref(),
                self.force,
                cancel,
                progress.sink(),
            )
            .await;
        progress.finish().await;

        match result? {
            InstallOutcome::Installed(release) => {
                if engine.verifies_packages() {
                    println!("{} {}", "Installed".green().bold(), release.tag);
                } else {
                    println!(
                        "{} {} {}",
                        "Installed".green().bold(),
                        release.tag,
                        "(unverified: no trusted_key configured)".yellow()
                    );
                }
                Ok(())
            }
            InstallOutcome::AlreadyInstalled(release) => {
                println!(
                    "{} is already installed. Use {} to reinstall.",
                    release.tag,
                    "--force".cyan()
                );
                Ok(())
            }
            InstallOutcome::Failed { status, .. } => Err(SctoolsError::InstallFailed {
                path: self.target.game_dir.display().to_string(),
                status: status.to_string(),
            }
            .into()),
        }
    }
}
