use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::TargetArgs;
use crate::config::InstallationRecord;
use crate::constants::MONITOR_REFRESH_CHOICES;
use crate::engine::{Engine, SettingsUpdate};

#[derive(Args, Debug)]
pub struct SettingsCommand {
    #[command(flatten)]
    target: TargetArgs,

    /// Offer pre-release localizations
    #[arg(long, value_name = "BOOL")]
    prerelease: Option<bool>,

    /// Check for new releases in `sctools monitor`
    #[arg(long, value_name = "BOOL")]
    monitor: Option<bool>,

    /// Monitor refresh interval in minutes (1, 2, 5, 10, 15, 30 or 60)
    #[arg(long, value_name = "MINUTES")]
    interval: Option<u32>,
}

impl SettingsCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let update = SettingsUpdate {
            allow_prerelease: self.prerelease,
            monitor_for_updates: self.monitor,
            monitor_refresh_minutes: self.interval,
        };
        let record = engine
            .update_settings(&self.target.game_dir, self.target.repository(), update)
            .await?;
        if !update.is_empty() {
            println!("{}", "Settings saved".green());
        }
        print_record(&record);
        Ok(())
    }
}

fn print_record(record: &InstallationRecord) {
    let on_off = |value: bool| if value { "on".green() } else { "off".dimmed() };
    println!("{} {}", "Repository:".bold(), record.repository);
    println!("{} {}", "Pre-releases:".bold(), on_off(record.allow_prerelease));
    println!("{} {}", "Monitor:".bold(), on_off(record.monitor_for_updates));
    println!(
        "{} {} min {}",
        "Refresh interval:".bold(),
        record.monitor_refresh_minutes,
        format!("(choices: {MONITOR_REFRESH_CHOICES:?})").dimmed()
    );
}
