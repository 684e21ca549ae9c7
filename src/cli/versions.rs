use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use super::common::TargetArgs;
use crate::engine::Engine;

#[derive(Args, Debug)]
pub struct VersionsCommand {
    #[command(flatten)]
    target: TargetArgs,

    /// Print only the tags, one per line
    #[arg(long)]
    tags_only: bool,
}

impl VersionsCommand {
    pub async fn execute(self, engine: &Engine, cancel: &CancellationToken) -> Result<()> {
        let releases = engine
            .refresh(&self.target.game_dir, self.target.repository(), cancel)
            .await?;

        if self.tags_only {
            for release in &releases {
                println!("{}", release.tag);
            }
            return Ok(());
        }
        if releases.is_empty() {
            println!("{}", "No releases available".dimmed());
            return Ok(());
        }

        let status = engine.status(&self.target.game_dir).await?;
        let repository = self.target.repository().unwrap_or(&status.repository).to_string();
        let record = status
            .records
            .iter()
            .find(|r| r.repository.eq_ignore_ascii_case(&repository));

        println!("{} {}", "Releases of".bold(), repository.cyan());
        for release in &releases {
            let installed = record.is_some_and(|r| r.is_installed_version(&release.tag));
            let selected = record
                .and_then(|r| r.last_version.as_deref())
                .is_some_and(|v| v.eq_ignore_ascii_case(&release.tag));
            let marker = if installed {
                "*".green().bold()
            } else if selected {
                ">".cyan().bold()
            } else {
                " ".normal()
            };
            let date = release
                .published_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let pre = if release.prerelease { " (pre-release)".yellow().to_string() } else { String::new() };
            println!("{marker} {:<24} {:<10} {}{pre}", release.tag, date, release.name.dimmed());
        }
        Ok(())
    }
}
