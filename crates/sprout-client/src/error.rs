use thiserror::Error;

use sprout_vfs::VfsError;

#[derive(Debug, Error)]
pub enum FetchError {
    /// A generic request error happened while making a request. Refer to the
    /// error message for more details.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Every transport (direct, proxies, API walk) was exhausted.
    #[error("failed to fetch archive from {url}: {reason}")]
    ArchiveFetchFailed { url: String, reason: String },

    #[error("unexpected GitHub API payload: {0}")]
    BadJson(#[from] serde_json::Error),

    #[error("invalid base64 content for `{path}`")]
    BadContent { path: String },

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

impl FetchError {
    /// A reason string safe to surface in progress lines. Transport-level
    /// failures are collapsed to a stable phrase rather than leaking
    /// connection details.
    pub fn redacted_reason(&self) -> String {
        match self {
            Self::Request(err) if err.is_connect() || err.is_timeout() => {
                "network request blocked".to_string()
            }
            Self::Status { status, .. } => format!("HTTP {status}"),
            other => other.to_string(),
        }
    }
}
