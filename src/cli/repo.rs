use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::RepositoryConfig;
use crate::engine::Engine;
use crate::models::GameMode;
use crate::repository::RepositoryKind;

#[derive(Args, Debug)]
pub struct RepoCommand {
    #[command(subcommand)]
    action: RepoAction,
}

#[derive(Subcommand, Debug)]
enum RepoAction {
    /// List configured repositories
    List,
    /// Add a repository
    Add {
        /// Unique name used with `--repository`
        name: String,
        /// `owner/repo` for GitHub, a directory for folder feeds
        location: String,
        #[arg(long, value_enum, default_value_t = KindArg::Github)]
        kind: KindArg,
        /// Game mode whose releases this repository offers
        #[arg(long, default_value_t = GameMode::Live)]
        mode: GameMode,
    },
    /// Remove a repository
    Remove { name: String },
    /// Make a repository the default for a game directory
    Use {
        name: String,
        #[arg(short = 'g', long = "game-dir", default_value = ".")]
        game_dir: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KindArg {
    Github,
    Folder,
}

impl From<KindArg> for RepositoryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Github => RepositoryKind::Github,
            KindArg::Folder => RepositoryKind::Folder,
        }
    }
}

impl RepoCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        match self.action {
            RepoAction::List => {
                let repositories = engine.repositories().await;
                if repositories.is_empty() {
                    println!("{}", "No repositories configured".dimmed());
                }
                for repo in repositories {
                    let kind = match repo.kind {
                        RepositoryKind::Github => "github",
                        RepositoryKind::Folder => "folder",
                    };
                    println!("{:<32} {:<7} {:<5} {}", repo.name.cyan(), kind, repo.mode, repo.location.dimmed());
                }
            }
            RepoAction::Add { name, location, kind, mode } => {
                let kind = RepositoryKind::from(kind);
                let location = match kind {
                    RepositoryKind::Folder => std::path::absolute(&location)
                        .with_context(|| format!("Invalid folder path: {location}"))?
                        .display()
                        .to_string(),
                    RepositoryKind::Github => location,
                };
                engine
                    .add_repository(RepositoryConfig { name: name.clone(), kind, location, mode })
                    .await?;
                println!("{} {}", "Added repository".green(), name);
            }
            RepoAction::Remove { name } => {
                engine.remove_repository(&name).await?;
                println!("{} {}", "Removed repository".green(), name);
            }
            RepoAction::Use { name, game_dir } => {
                engine.use_repository(&game_dir, &name).await?;
                println!("{} {} for {}", "Using".green(), name, game_dir.display());
            }
        }
        Ok(())
    }
}
