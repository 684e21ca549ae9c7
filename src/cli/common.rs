//! Pieces shared by the subcommands

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::utils::progress::{ProgressSink, spawn_renderer};

/// Game directory and repository a command works on.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Game channel directory (the one containing `Bin64`)
    #[arg(short = 'g', long = "game-dir", default_value = ".")]
    pub game_dir: PathBuf,

    /// Repository to use instead of the one selected for the game directory
    #[arg(short, long)]
    pub repository: Option<String>,
}

impl Default for TargetArgs {
    fn default() -> Self {
        Self {
            game_dir: PathBuf::from("."),
            repository: None,
        }
    }
}

impl TargetArgs {
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }
}

/// Asks a Yes/No question on stdout.
///
/// `assume_yes` answers "yes" without asking; without a terminal on stdin the
/// answer is "no".
pub async fn confirm(question: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    if !io::stdin().is_terminal() {
        println!("{} {}", question, "(no terminal, answering no)".dimmed());
        return false;
    }
    match ask(question).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::debug!(error = %e, "Prompt failed");
            false
        }
    }
}

async fn ask(question: &str) -> Result<bool> {
    print!("{} {} ", question, "[y/N]:".green());
    io::stdout().flush()?;

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut response = String::new();
    reader.read_line(&mut response).await?;
    let response = response.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

/// A progress sink with its terminal renderer.
pub struct Progress {
    sink: ProgressSink,
    renderer: JoinHandle<()>,
}

impl Progress {
    pub fn start(hidden: bool) -> Self {
        let (sink, rx) = ProgressSink::channel();
        Self {
            sink,
            renderer: spawn_renderer(rx, hidden),
        }
    }

    pub fn sink(&self) -> &ProgressSink {
        &self.sink
    }

    /// Drops the sink and waits for the bars to be cleared.
    pub async fn finish(self) {
        drop(self.sink);
        let _ = self.renderer.await;
    }
}

pub fn version_or_none(version: Option<&str>) -> String {
    version.map_or_else(|| "none".dimmed().to_string(), str::to_string)
}
