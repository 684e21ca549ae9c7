//! Error handling for SCTools
//!
//! Two layers, following the same split everywhere in the crate:
//! - [`SctoolsError`] - strongly-typed failures raised by the engine and CLI glue
//! - [`ErrorContext`] - wraps an error with a details line and an actionable suggestion
//!   for display in the terminal
//!
//! Module-specific enums ([`crate::repository::RepositoryError`],
//! [`crate::verification::VerifyError`]) stay local to their modules and are
//! translated here by [`user_friendly_error`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use sctools::core::{SctoolsError, user_friendly_error};
//!
//! let err = anyhow::Error::from(SctoolsError::RepositoryNotFound {
//!     name: "unknown/repo".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use crate::repository::RepositoryError;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Engine-level error type.
#[derive(Error, Debug)]
pub enum SctoolsError {
    /// Configuration is missing a value or contains an invalid one
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Config file could not be parsed
    #[error("Failed to parse {file}: {reason}")]
    ConfigParseError { file: String, reason: String },

    /// Repository name is not present in the configuration
    #[error("Repository '{name}' is not configured")]
    RepositoryNotFound { name: String },

    /// No release in the fetched list matches the requested version
    #[error("Release '{version}' not found in repository '{repository}'")]
    ReleaseNotFound { repository: String, version: String },

    /// The feed returned nothing installable for the current filters
    #[error("Repository '{repository}' has no releases for mode {mode}")]
    NoReleases { repository: String, mode: String },

    /// Target game directory does not exist
    #[error("Game directory not found: {path}")]
    TargetNotFound { path: String },

    /// Operation requires an installed localization
    #[error("No localization is installed in {path}")]
    NotInstalled { path: String },

    /// Installer reported a non-success status
    #[error("Installation into {path} failed: {status}")]
    InstallFailed { path: String, status: String },

    /// Uninstall could not remove the core module
    #[error("Uninstall from {path} failed: the localization module could not be removed")]
    UninstallFailed { path: String },

    /// The relaunch helper reported a failed application update
    #[error("Application update failed with code {code}")]
    UpdateFailed { code: String },

    /// The scheduled application update could not be started
    #[error("Failed to start the application update (code {code})")]
    UpdateLaunchFailed { code: u8 },

    /// Another process holds the lock for the target
    #[error("Timed out waiting for lock '{name}' after {timeout_secs}s")]
    LockTimeout { name: String, timeout_secs: u64 },

    /// The user interrupted the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Fallback for errors without a dedicated variant
    #[error("{message}")]
    Other { message: String },
}

impl Clone for SctoolsError {
    fn clone(&self) -> Self {
        match self {
            Self::ConfigError { message } => Self::ConfigError { message: message.clone() },
            Self::ConfigParseError { file, reason } => Self::ConfigParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::RepositoryNotFound { name } => Self::RepositoryNotFound { name: name.clone() },
            Self::ReleaseNotFound { repository, version } => Self::ReleaseNotFound {
                repository: repository.clone(),
                version: version.clone(),
            },
            Self::NoReleases { repository, mode } => Self::NoReleases {
                repository: repository.clone(),
                mode: mode.clone(),
            },
            Self::TargetNotFound { path } => Self::TargetNotFound { path: path.clone() },
            Self::NotInstalled { path } => Self::NotInstalled { path: path.clone() },
            Self::InstallFailed { path, status } => Self::InstallFailed {
                path: path.clone(),
                status: status.clone(),
            },
            Self::UninstallFailed { path } => Self::UninstallFailed { path: path.clone() },
            Self::UpdateFailed { code } => Self::UpdateFailed { code: code.clone() },
            Self::UpdateLaunchFailed { code } => Self::UpdateLaunchFailed { code: *code },
            Self::LockTimeout { name, timeout_secs } => Self::LockTimeout {
                name: name.clone(),
                timeout_secs: *timeout_secs,
            },
            Self::Cancelled => Self::Cancelled,
            // io::Error is not Clone; keep kind and message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other { message } => Self::Other { message: message.clone() },
        }
    }
}

/// An error together with optional details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: SctoolsError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: SctoolsError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion (printed in green).
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error (printed in yellow).
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details and suggestion to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Returns true when the error chain contains a cancellation.
///
/// Cancelled operations exit quietly, so callers check this before displaying anything.
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(cause.downcast_ref::<SctoolsError>(), Some(SctoolsError::Cancelled))
            || matches!(cause.downcast_ref::<RepositoryError>(), Some(RepositoryError::Cancelled))
    })
}

/// Converts any error into an [`ErrorContext`] with a suggestion where one is known.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(ctx) = cause.downcast_ref::<ErrorContext>() {
            return ErrorContext {
                error: ctx.error.clone(),
                suggestion: ctx.suggestion.clone(),
                details: ctx.details.clone(),
            };
        }
        if let Some(sctools_error) = cause.downcast_ref::<SctoolsError>() {
            return create_error_context(sctools_error.clone());
        }
        if let Some(repo_error) = cause.downcast_ref::<RepositoryError>() {
            return repository_error_context(repo_error);
        }
        if let Some(toml_error) = cause.downcast_ref::<toml::de::Error>() {
            return ErrorContext::new(SctoolsError::ConfigParseError {
                file: "config.toml".to_string(),
                reason: toml_error.to_string(),
            })
            .with_suggestion("Check the TOML syntax of your config file, or delete it to restore defaults");
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(SctoolsError::Other {
                message: format!("{error:#}"),
            })
            .with_suggestion("Close the game and launcher, then check that the game directory is writable")
            .with_details("The operating system denied access to a file");
        }
    }

    ErrorContext::new(SctoolsError::Other {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: SctoolsError) -> ErrorContext {
    match &error {
        SctoolsError::RepositoryNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("List configured repositories with 'sctools repo list' or add one with 'sctools repo add'"),
        SctoolsError::ReleaseNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'sctools versions' to see the available releases"),
        SctoolsError::NoReleases { .. } => ErrorContext::new(error)
            .with_suggestion("Try enabling pre-releases with 'sctools settings --prerelease true'")
            .with_details("Releases are filtered by the game mode of the repository and the pre-release setting"),
        SctoolsError::TargetNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Pass the game channel directory with --game-dir (for example .../StarCitizen/LIVE)"),
        SctoolsError::NotInstalled { .. } => ErrorContext::new(error)
            .with_suggestion("Install a localization first with 'sctools install'"),
        SctoolsError::InstallFailed { .. } => ErrorContext::new(error)
            .with_details("The game directory was left unchanged"),
        SctoolsError::UninstallFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Close the game and launcher, then try again"),
        SctoolsError::UpdateFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'sctools upgrade' to download the update again"),
        SctoolsError::LockTimeout { .. } => ErrorContext::new(error)
            .with_details("Another sctools process is working on the same game directory"),
        SctoolsError::ConfigParseError { .. } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax of your config file, or delete it to restore defaults"),
        _ => ErrorContext::new(error),
    }
}

fn repository_error_context(error: &RepositoryError) -> ErrorContext {
    let ctx = ErrorContext::new(SctoolsError::Other {
        message: error.to_string(),
    });
    match error {
        RepositoryError::Network { .. } => ctx
            .with_suggestion("Check your internet connection; set github_token in the config if you hit the API rate limit"),
        RepositoryError::Parse { .. } => {
            ctx.with_details("The release feed did not contain a JSON list of releases")
        }
        RepositoryError::NoPackage { .. } => {
            ctx.with_details("The release does not publish a package this repository can install")
        }
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_context_display_format() {
        let ctx = ErrorContext::new(SctoolsError::UpdateFailed {
            code: "3".to_string(),
        })
        .with_details("helper exited")
        .with_suggestion("retry");
        let rendered = ctx.to_string();
        assert!(rendered.contains("code 3"));
        assert!(rendered.contains("Details: helper exited"));
        assert!(rendered.contains("Suggestion: retry"));
    }

    #[test]
    fn test_user_friendly_error_finds_wrapped_error() {
        let err = Err::<(), _>(SctoolsError::RepositoryNotFound {
            name: "x/y".to_string(),
        })
        .context("while installing")
        .unwrap_err();
        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, SctoolsError::RepositoryNotFound { .. }));
        assert!(ctx.suggestion.unwrap().contains("repo list"));
    }

    #[test]
    fn test_is_cancellation() {
        let err = anyhow::Error::from(RepositoryError::Cancelled).context("refresh");
        assert!(is_cancellation(&err));
        assert!(is_cancellation(&anyhow::Error::from(SctoolsError::Cancelled)));
        assert!(!is_cancellation(&anyhow::anyhow!("boom")));
    }
}
