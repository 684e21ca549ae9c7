//! `sctools` entry point.
//!
//! Strips the `update_status <code>` pair the relaunch helper prepends, parses
//! the remaining arguments and maps errors to exit codes: 130 for a cancelled
//! operation, 1 for everything else.

use clap::Parser;
use sctools::cli::Cli;
use sctools::core::{is_cancellation, user_friendly_error};
use sctools::upgrade::split_update_status_args;

#[tokio::main]
async fn main() {
    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let (update_status, args) = split_update_status_args(std::env::args_os().collect());
    let cli = Cli::parse_from(args);

    if let Err(e) = cli.execute(update_status).await {
        if is_cancellation(&e) {
            std::process::exit(130);
        }
        user_friendly_error(e).display();
        std::process::exit(1);
    }
}
