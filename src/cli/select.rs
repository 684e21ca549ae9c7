use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use super::common::TargetArgs;
use crate::engine::Engine;

#[derive(Args, Debug)]
pub struct SelectCommand {
    /// Release tag or version, e.g. `3.23.1-v0.6`
    version: String,

    #[command(flatten)]
    target: TargetArgs,
}

impl SelectCommand {
    pub async fn execute(self, engine: &Engine, cancel: &CancellationToken) -> Result<()> {
        let release = engine
            .select(&self.target.game_dir, self.target.repository(), &self.version, cancel)
            .await?;
        println!("{} {}", "Selected".green(), release.tag);
        Ok(())
    }
}
