//! Command-line interface for SCTools.
//!
//! # Commands
//!
//! - `status` - installation state, records and available updates of a game directory
//! - `versions` - list releases of the current repository
//! - `select` - remember a release as the one to install
//! - `install` / `uninstall` / `toggle` - change the localization in a game directory
//! - `settings` - per-record prerelease and monitoring settings
//! - `repo` - manage configured repositories
//! - `monitor` - watch monitored installations for new releases
//! - `upgrade` - update the `sctools` application itself
//!
//! Every command that works on a game directory takes `--game-dir` (default:
//! the current directory) and `--repository` (default: the one selected for
//! that directory).
//!
//! # Startup
//!
//! Before any command runs, the application update protocol is executed (see
//! [`crate::upgrade::startup`]). A pending application update is offered with a
//! Yes/No prompt; without a terminal (or with `--yes`) the prompt is answered
//! automatically.
//!
//! # Cancellation
//!
//! Ctrl-C cancels the running fetch or download. A cancelled operation leaves
//! no partial state and `main` exits with status 130 without printing an error.

mod common;
mod install;
mod monitor;
mod repo;
mod select;
mod settings;
mod status;
mod toggle;
mod uninstall;
mod upgrade;
mod versions;


use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::constants::CONFIG_ENV_VAR;
use crate::core::{SctoolsError, user_friendly_error};
use crate::engine::Engine;
use crate::upgrade::{ApplicationUpdater, StartupOutcome, run_startup};
use crate::utils::progress::is_progress_disabled;

pub use common::TargetArgs;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// `RUST_LOG`-style directive; `RUST_LOG` itself takes precedence.
    pub log_level: String,
    pub no_progress: bool,
    /// Answer every prompt with "yes".
    pub assume_yes: bool,
}

impl CliConfig {
    /// Installs the global tracing subscriber writing to stderr. Later calls are no-ops.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Progress bars are hidden with `--no-progress`, `SCTOOLS_NO_PROGRESS` or without a terminal.
    pub fn progress_hidden(&self) -> bool {
        self.no_progress || is_progress_disabled() || !std::io::stderr().is_terminal()
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sctools",
    about = "Star Citizen localization manager",
    version,
    long_about = "Installs, updates and removes Star Citizen localization packages published as GitHub \
                  releases, and keeps sctools itself up to date."
)]
pub struct Cli {
    /// Defaults to `status` when omitted.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Show debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config.toml
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    /// Answer prompts with "yes"
    #[arg(short = 'y', long, global = true)]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the localization state of a game directory
    Status(status::StatusCommand),
    /// List available releases
    Versions(versions::VersionsCommand),
    /// Choose the release to install
    Select(select::SelectCommand),
    /// Download and install a localization release
    Install(install::InstallCommand),
    /// Remove the localization from a game directory
    Uninstall(uninstall::UninstallCommand),
    /// Enable or disable the installed localization
    Toggle(toggle::ToggleCommand),
    /// Show or change per-installation settings
    Settings(settings::SettingsCommand),
    /// Manage localization repositories
    Repo(repo::RepoCommand),
    /// Watch monitored installations for new releases
    Monitor(monitor::MonitorCommand),
    /// Update sctools itself
    Upgrade(upgrade::UpgradeCommand),
}

impl Cli {
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };
        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            assume_yes: self.yes,
        }
    }

    /// Runs the startup update protocol and then the command.
    ///
    /// `update_status` is the code from a leading `update_status <code>`
    /// argument pair, which the relaunch helper passes.
    pub async fn execute(self, update_status: Option<String>) -> Result<()> {
        let config = self.build_config();
        config.init_logging();

        let engine = Engine::load(self.config.as_deref()).await?;
        let cancel = CancellationToken::new();
        spawn_ctrl_c_handler(cancel.clone());

        if !handle_startup(&engine, update_status.as_deref(), &config, &cancel).await? {
            return Ok(());
        }

        let command = self.command.unwrap_or_else(|| Commands::Status(status::StatusCommand::default()));
        match command {
            Commands::Status(cmd) => cmd.execute(&engine, &cancel).await,
            Commands::Versions(cmd) => cmd.execute(&engine, &cancel).await,
            Commands::Select(cmd) => cmd.execute(&engine, &cancel).await,
            Commands::Install(cmd) => cmd.execute(&engine, &config, &cancel).await,
            Commands::Uninstall(cmd) => cmd.execute(&engine).await,
            Commands::Toggle(cmd) => cmd.execute(&engine).await,
            Commands::Settings(cmd) => cmd.execute(&engine).await,
            Commands::Repo(cmd) => cmd.execute(&engine).await,
            Commands::Monitor(cmd) => cmd.execute(engine, &cancel).await,
            Commands::Upgrade(cmd) => cmd.execute(&engine, &config, &cancel).await,
        }
    }
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// Returns `false` when the process must exit so the relaunch helper can run.
async fn handle_startup(
    engine: &Engine,
    update_status: Option<&str>,
    config: &CliConfig,
    cancel: &CancellationToken,
) -> Result<bool> {
    let mut updater = match engine.application_updater().await {
        Ok(updater) => updater,
        Err(e) => {
            warn!(error = %e, "Application updater unavailable");
            return Ok(true);
        }
    };

    let assume_yes = config.assume_yes;
    let outcome = run_startup(&mut updater, update_status, |scheduled| async move {
        let question = format!("A new sctools version {} is ready. Install it now?", scheduled.version);
        common::confirm(&question, assume_yes).await
    })
    .await;

    match outcome {
        StartupOutcome::NoPendingUpdate => {
            if engine.config().await.upgrade.check_on_startup {
                announce_update(&mut updater, cancel).await;
            }
            Ok(true)
        }
        StartupOutcome::ScheduleCancelled => Ok(true),
        StartupOutcome::UpdateApplied => {
            println!("{} sctools {}", "Updated to".green(), updater.current_version());
            Ok(true)
        }
        StartupOutcome::PreviousUpdateFailed { code } => {
            // reported once; no further update processing, the command still runs
            user_friendly_error(SctoolsError::UpdateFailed { code }.into()).display();
            Ok(true)
        }
        StartupOutcome::Declined => {
            println!(
                "{} Run {} to install it later.",
                "Update postponed.".yellow(),
                "sctools upgrade --now".cyan()
            );
            Ok(true)
        }
        StartupOutcome::RelaunchStarted { version } => {
            println!("{} {version}. sctools will restart when done.", "Installing update".green());
            Ok(false)
        }
        StartupOutcome::LaunchFailed(status) => {
            let error = SctoolsError::UpdateLaunchFailed { code: status.code() };
            user_friendly_error(error.into())
                .with_details(status.to_string())
                .display();
            Ok(true)
        }
    }
}

/// `check_on_startup`: mentions a newer release without downloading it.
async fn announce_update(updater: &mut ApplicationUpdater, cancel: &CancellationToken) {
    match updater.check_for_update(cancel).await {
        Ok(Some(release)) => println!(
            "{} {}. Run {} to download it.",
            "sctools update available:".green(),
            release.tag,
            "sctools upgrade".cyan()
        ),
        Ok(None) => {}
        Err(e) => debug!(error = %e, "Startup update check failed"),
    }
}
