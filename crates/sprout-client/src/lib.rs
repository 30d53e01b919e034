//! HTTP retrieval of repository archives.
//!
//! The primary path fetches the gzipped tarball from codeload with retries
//! (exponential backoff with jitter). When direct fetches are exhausted,
//! configured proxy candidates are tried in order, and as a last resort the
//! repository is reassembled file-by-file through the GitHub REST API
//! ([`ArchiveClient::fetch_via_api`]).

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::de::DeserializeOwned;
use tracing::debug;

use sprout_repo_url::RepoIdentity;
use sprout_types::Reporter;

pub use api::ArchiveSource;
pub use error::FetchError;

mod api;
mod error;

/// Characters escaped when a whole URL is embedded as a query value.
const COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?');

/// A builder for an [`ArchiveClient`].
#[derive(Debug, Clone)]
pub struct ArchiveClientBuilder {
    codeload_base: String,
    api_base: String,
    raw_base: String,
    proxies: Vec<String>,
    retries: usize,
    timeout: Duration,
    user_agent: String,
}

impl Default for ArchiveClientBuilder {
    fn default() -> Self {
        Self {
            codeload_base: "https://codeload.github.com".to_string(),
            api_base: "https://api.github.com".to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
            proxies: Vec::new(),
            retries: 3,
            timeout: Duration::from_secs(30),
            user_agent: "sprout".to_string(),
        }
    }
}

impl ArchiveClientBuilder {
    #[must_use]
    pub fn codeload_base(mut self, base: impl Into<String>) -> Self {
        self.codeload_base = base.into();
        self
    }

    #[must_use]
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    #[must_use]
    pub fn raw_base(mut self, base: impl Into<String>) -> Self {
        self.raw_base = base.into();
        self
    }

    /// Add a proxy candidate. A candidate either carries a `{url}`
    /// placeholder that is substituted with the percent-encoded target, or
    /// the encoded target is appended as a query value.
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxies.push(proxy.into());
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> ArchiveClient {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .build()
            .expect("failed to build HTTP client");
        ArchiveClient {
            client,
            codeload_base: self.codeload_base,
            api_base: self.api_base,
            raw_base: self.raw_base,
            proxies: self.proxies,
            retries: self.retries,
        }
    }
}

/// A client for retrieving repository archives and, when the archive path
/// is unavailable, individual files through the GitHub REST API.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    client: reqwest::Client,
    codeload_base: String,
    pub(crate) api_base: String,
    pub(crate) raw_base: String,
    proxies: Vec<String>,
    retries: usize,
}

impl ArchiveClient {
    pub fn builder() -> ArchiveClientBuilder {
        ArchiveClientBuilder::default()
    }

    /// The archive URL for an identity, relative to this client's codeload
    /// endpoint.
    pub fn archive_url(&self, repo: &RepoIdentity) -> String {
        format!(
            "{}/{}/{}/tar.gz/{}",
            self.codeload_base,
            repo.owner,
            repo.repo,
            repo.encoded_ref(),
        )
    }

    /// Fetch the gzipped tarball for a repository.
    pub async fn fetch_archive(
        &self,
        repo: &RepoIdentity,
        reporter: Option<&dyn Reporter>,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.archive_url(repo);
        self.get_bytes_any(&url, reporter)
            .await
            .map_err(|err| FetchError::ArchiveFetchFailed {
                url,
                reason: err.redacted_reason(),
            })
    }

    /// Try every transport for a URL: direct first, then each proxy
    /// candidate, deduplicated, each with its own retry budget.
    pub(crate) async fn get_bytes_any(
        &self,
        url: &str,
        reporter: Option<&dyn Reporter>,
    ) -> Result<Vec<u8>, FetchError> {
        let mut last_error = None;
        for candidate in self.candidates(url) {
            match self.get_bytes_with_retry(&candidate, reporter).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    debug!("Transport failed for {candidate}: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(FetchError::ArchiveFetchFailed {
            url: url.to_string(),
            reason: "no transport available".to_string(),
        }))
    }

    fn candidates(&self, url: &str) -> Vec<String> {
        let mut candidates = vec![url.to_string()];
        for proxy in &self.proxies {
            let candidate = apply_proxy(proxy, url);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    async fn get_bytes_with_retry(
        &self,
        url: &str,
        reporter: Option<&dyn Reporter>,
    ) -> Result<Vec<u8>, FetchError> {
        (|| self.get_bytes(url))
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(self.retries)
                    .with_jitter(),
            )
            .notify(|err: &FetchError, _: Duration| {
                let reason = err.redacted_reason();
                debug!("Retrying fetch of {url}: {reason}");
                if let Some(reporter) = reporter {
                    reporter.on_progress(&format!("Retrying fetch ({reason})"));
                }
            })
            .await
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub(crate) async fn get_json_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        reporter: Option<&dyn Reporter>,
    ) -> Result<T, FetchError> {
        let bytes = self.get_bytes_with_retry(url, reporter).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn apply_proxy(proxy: &str, target: &str) -> String {
    let encoded = utf8_percent_encode(target, COMPONENT).to_string();
    if proxy.contains("{url}") {
        proxy.replace("{url}", &encoded)
    } else if proxy.ends_with('=') {
        format!("{proxy}{encoded}")
    } else if proxy.contains('?') {
        format!("{proxy}&url={encoded}")
    } else {
        format!("{proxy}?url={encoded}")
    }
}
