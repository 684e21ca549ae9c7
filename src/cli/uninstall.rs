use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::TargetArgs;
use crate::core::SctoolsError;
use crate::engine::Engine;
use crate::installer::UninstallStatus;

#[derive(Args, Debug)]
pub struct UninstallCommand {
    #[command(flatten)]
    target: TargetArgs,

    /// Also forget the installation record and its settings
    #[arg(long)]
    purge: bool,
}

impl UninstallCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let status = engine
            .uninstall(&self.target.game_dir, self.target.repository(), self.purge)
            .await?;
        match status {
            UninstallStatus::Success => {
                println!("{}", "Localization removed".green());
                Ok(())
            }
            UninstallStatus::Partial => {
                println!(
                    "{} some files in data/Localization could not be deleted",
                    "Localization disabled,".yellow()
                );
                Ok(())
            }
            UninstallStatus::Failed => Err(SctoolsError::UninstallFailed {
                path: self.target.game_dir.display().to_string(),
            }
            .into()),
        }
    }
}
