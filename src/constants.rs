//! Global constants used throughout the SCTools codebase.
//!
//! Timeout durations, retry parameters, file names and other values shared
//! across modules.

use std::time::Duration;

/// Default timeout for target lock acquisition (120 seconds).
///
/// An install holds the lock for the whole download, so this has to cover a
/// slow package download started by another process.
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
///
/// Doubles on each retry attempt up to [`MAX_BACKOFF_DELAY_MS`].
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Connect timeout for GitHub API requests.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Whole-request timeout for feed queries. Downloads are not bounded by this.
pub const HTTP_FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every GitHub request (the API rejects requests without one).
pub const USER_AGENT: &str = concat!("sctools/", env!("CARGO_PKG_VERSION"));

/// Default GitHub API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Releases requested per feed page.
pub const RELEASES_PER_PAGE: u32 = 100;

/// First startup argument written by the relaunch helper.
pub const UPDATE_STATUS_ARG: &str = "update_status";

/// Default monitor refresh interval in minutes.
pub const DEFAULT_MONITOR_REFRESH_MINUTES: u32 = 5;

/// Refresh intervals (minutes) offered for the update monitor.
pub const MONITOR_REFRESH_CHOICES: [u32; 7] = [1, 2, 5, 10, 15, 30, 60];

/// Suffix of a detached signature file.
pub const SIGNATURE_EXTENSION: &str = "sig";

/// Suffix of in-flight download files.
pub const PARTIAL_DOWNLOAD_EXTENSION: &str = "part";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "SCTOOLS_CONFIG";

/// Environment variable that hides progress bars.
pub const NO_PROGRESS_ENV_VAR: &str = "SCTOOLS_NO_PROGRESS";

/// Default GitHub repository publishing the `sctools` binary.
pub const DEFAULT_APP_REPOSITORY: &str = "sctools-dev/sctools";
