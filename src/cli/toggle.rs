use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::engine::Engine;
use crate::installer::InstallationState;

#[derive(Args, Debug)]
pub struct ToggleCommand {
    /// Game channel directory
    #[arg(short = 'g', long = "game-dir", default_value = ".")]
    game_dir: std::path::PathBuf,
}

impl ToggleCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        match engine.toggle(&self.game_dir).await? {
            InstallationState::Enabled => println!("Localization {}", "enabled".green()),
            state => println!("Localization {}", state.to_string().yellow()),
        }
        Ok(())
    }
}
