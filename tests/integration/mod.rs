//! End-to-end tests driving the compiled `sctools` binary.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **common**: temp config, folder feed and game directory fixture
//! - **localization**: install, status, toggle and uninstall against a folder feed
//! - **startup**: the application update protocol run before every command
//! - **upgrade**: `sctools upgrade` against a wiremock GitHub API

mod common;

mod localization;
mod startup;
mod upgrade;
