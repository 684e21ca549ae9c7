//! GitHub releases feed.

use reqwest::header::{ACCEPT, HeaderValue};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::download::{display_name, stream_response};
use super::{FeedEntry, ReleaseSource, RepositoryError, parse_feed};
use crate::constants::{HTTP_FEED_TIMEOUT, RELEASES_PER_PAGE};
use crate::utils::progress::{ProgressEvent, ProgressSink};

/// Warn when fewer API calls than this remain in the current rate-limit window.
const RATE_LIMIT_WARNING_THRESHOLD: u32 = 10;

#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
    /// `owner/repo`
    slug: String,
    token: Option<String>,
}

impl GitHubSource {
    /// Accepts `owner/repo` or a `https://github.com/owner/repo[.git]` URL.
    pub fn new(
        client: reqwest::Client,
        api_url: &str,
        location: &str,
        token: Option<String>,
    ) -> Result<Self, RepositoryError> {
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            slug: normalize_slug(location)?,
            token,
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases?per_page={}", self.api_url, self.slug, RELEASES_PER_PAGE)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, RepositoryError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            result = request.send() => result.map_err(|e| network(operation, e))?,
        };

        if let Some(remaining) = response.headers().get("x-ratelimit-remaining") {
            if let Some(remaining) = remaining.to_str().ok().and_then(|v| v.parse::<u32>().ok()) {
                if remaining < RATE_LIMIT_WARNING_THRESHOLD {
                    warn!(remaining, "GitHub rate limit low");
                }
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(RepositoryError::Network {
                operation: operation.to_string(),
                reason: format!("HTTP {status}"),
            });
        }
        Ok(response)
    }
}

fn network(operation: &str, error: reqwest::Error) -> RepositoryError {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    RepositoryError::Network {
        operation: operation.to_string(),
        reason,
    }
}

fn normalize_slug(location: &str) -> Result<String, RepositoryError> {
    let trimmed = location.trim();
    let path = ["https://github.com/", "http://github.com/", "github.com/"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Ok(format!("{owner}/{repo}"))
        }
        _ => Err(RepositoryError::InvalidLocation(location.to_string())),
    }
}

impl ReleaseSource for GitHubSource {
    fn describe(&self) -> String {
        format!("github:{}", self.slug)
    }

    async fn fetch_entries(&self, cancel: &CancellationToken) -> Result<Vec<FeedEntry>, RepositoryError> {
        let url = self.releases_url();
        debug!(url = %url, "Querying GitHub releases");
        let response = self
            .send(self.get(&url).timeout(HTTP_FEED_TIMEOUT), "fetch releases", cancel)
            .await?;

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            body = response.text() => body.map_err(|e| network("fetch releases", e))?,
        };
        parse_feed(&body, &self.slug)
    }

    async fn fetch_package(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<u64, RepositoryError> {
        let response = self.send(self.get(url), "download package", cancel).await?;
        progress.emit(ProgressEvent::DownloadStarted {
            name: display_name(dest),
            total: response.content_length(),
        });
        stream_response(response, dest, cancel, progress).await
    }
}
