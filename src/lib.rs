//! SCTools - Star Citizen localization and self-update manager
//!
//! Installs, updates and removes localization packages for a Star Citizen game
//! directory, and keeps the `sctools` binary itself up to date. Both kinds of
//! content come from GitHub releases (or a local folder feed for offline use).
//!
//! # Architecture Overview
//!
//! The crate is split leaf-first:
//!
//! - [`models`] - immutable [`models::Release`] values and the [`models::GameMode`]
//!   tag classification rule
//! - [`verification`] - Ed25519 detached-signature checks for package files
//! - [`repository`] - release feeds (GitHub API or local folder), filtering and
//!   cancellable downloads
//! - [`installer`] - applies or reverts a localization package against a game
//!   directory with a rollback-capable two-phase commit
//! - [`upgrade`] - application self-update: scheduling, the relaunch helper and
//!   the startup protocol that resumes an interrupted update
//! - [`config`] - `~/.sctools/config.toml` with repositories and per-target
//!   installation records
//! - [`engine`] - the explicitly constructed context that ties the pieces together
//! - [`monitor`] - periodic background checks for new localization releases
//! - [`cli`] - the `sctools` command-line front end
//!
//! # Data Flow
//!
//! ```text
//! repository (fetch) -> releases -> filter/select -> download
//!     -> installer (verify + apply) -> installation record saved
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use sctools::engine::Engine;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Engine::load(None).await?;
//! let target = Path::new("C:/Games/StarCitizen/LIVE");
//! let releases = engine.refresh(target, None, &CancellationToken::new()).await?;
//! println!("{} releases available", releases.len());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod installer;
pub mod models;
pub mod monitor;
pub mod repository;
pub mod upgrade;
pub mod utils;
pub mod verification;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
