use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::monitor::{MonitorEvent, MonitorOptions, run_monitor};

#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// Check every monitored installation once and exit
    #[arg(long)]
    once: bool,

    /// Override every installation's refresh interval (minutes)
    #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..=1440))]
    interval: Option<u64>,
}

impl MonitorCommand {
    pub async fn execute(self, engine: Engine, cancel: &CancellationToken) -> Result<()> {
        let options = MonitorOptions {
            interval: self.interval.map(|m| Duration::from_secs(m.saturating_mul(60))),
            once: self.once,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = tokio::spawn(run_monitor(Arc::new(engine), options, tx, cancel.clone()));

        while let Some(event) = rx.recv().await {
            match event {
                MonitorEvent::UpdateAvailable { target_id, repository, installed, latest } => {
                    println!(
                        "{} {target_id}: {} {} -> {}",
                        "Update available".green().bold(),
                        repository.cyan(),
                        installed,
                        latest.tag.green()
                    );
                }
                MonitorEvent::CheckFailed { target_id, repository, error } => {
                    println!("{} {target_id} ({repository}): {error}", "Check failed".yellow());
                }
            }
        }

        if monitor.await? == 0 {
            println!(
                "No installations are monitored. Enable monitoring with {}.",
                "sctools settings --monitor true".cyan()
            );
        }
        Ok(())
    }
}
