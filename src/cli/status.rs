use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use super::common::{TargetArgs, version_or_none};
use crate::core::is_cancellation;
use crate::engine::Engine;
use crate::installer::InstallationState;

#[derive(Args, Debug, Default)]
pub struct StatusCommand {
    #[command(flatten)]
    target: TargetArgs,

    /// Do not query the repository for newer releases
    #[arg(long)]
    offline: bool,
}

impl StatusCommand {
    pub async fn execute(self, engine: &Engine, cancel: &CancellationToken) -> Result<()> {
        let status = engine.status(&self.target.game_dir).await?;

        let state = match status.state {
            InstallationState::Enabled => status.state.to_string().green(),
            InstallationState::Disabled => status.state.to_string().yellow(),
            InstallationState::NotInstalled => status.state.to_string().dimmed(),
        };
        println!("{} {}", "Game directory:".bold(), status.target_id);
        println!("{} {}", "Localization:".bold(), state);

        let repository = self.target.repository().unwrap_or(&status.repository);
        println!("{} {}", "Repository:".bold(), repository);

        let record = status
            .records
            .iter()
            .find(|r| r.repository.eq_ignore_ascii_case(repository));
        let installed = record.and_then(|r| r.installed_version.as_deref());
        println!("{} {}", "Installed version:".bold(), version_or_none(installed));
        if let Some(record) = record {
            if record.last_version.is_some() && record.last_version.as_deref() != installed {
                println!("{} {}", "Selected version:".bold(), version_or_none(record.last_version.as_deref()));
            }
        }

        if self.offline {
            return Ok(());
        }
        match engine.refresh(&self.target.game_dir, self.target.repository(), cancel).await {
            Ok(releases) => match releases.first() {
                Some(latest) if record.is_some_and(|r| r.is_update_available(&latest.tag)) => {
                    println!("{} {}", "Update available:".green().bold(), latest.tag);
                }
                Some(latest) if installed.is_some() => {
                    println!("{} {}", "Latest release:".bold(), latest.tag);
                    println!("{}", "Localization is up to date".green());
                }
                Some(latest) => println!("{} {}", "Latest release:".bold(), latest.tag),
                None => println!("{}", "No releases available".dimmed()),
            },
            Err(e) if is_cancellation(&e) => return Err(e),
            Err(e) => println!("{} {e:#}", "Could not check for updates:".yellow()),
        }
        Ok(())
    }
}
