//! Per-file fallback through the GitHub REST API, for hosts where the
//! archive endpoint is unreachable.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sprout_repo_url::{RepoIdentity, encode_path};
use sprout_types::Reporter;
use sprout_vfs::Vfs;

use crate::{ArchiveClient, FetchError};

/// Which transport ultimately produced the imported tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSource {
    /// The gzipped tarball.
    Archive,
    /// File-by-file traversal of the GitHub tree API.
    Api,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
}

impl ArchiveClient {
    /// Reassemble a repository tree file-by-file: list blobs through the
    /// tree API, then fetch each blob's raw content (falling back to the
    /// contents API per file). Files land in the VFS at
    /// `{dest_path}/{repo-relative path}`; paths containing `..` are
    /// skipped, and the identity's subdir filters the listing.
    ///
    /// Returns the absolute paths written.
    pub async fn fetch_via_api(
        &self,
        repo: &RepoIdentity,
        vfs: &mut Vfs,
        dest_path: &str,
        reporter: Option<&dyn Reporter>,
    ) -> Result<Vec<String>, FetchError> {
        let tree_url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base,
            repo.owner,
            repo.repo,
            repo.encoded_ref(),
        );
        let tree: TreeResponse = self.get_json_with_retry(&tree_url, reporter).await?;
        if tree.truncated {
            warn!("GitHub tree listing for {repo} is truncated");
            if let Some(reporter) = reporter {
                reporter.on_progress("GitHub tree listing truncated; importing a partial tree");
            }
        }

        let mut written = Vec::new();
        for entry in &tree.tree {
            if entry.kind != "blob" {
                continue;
            }
            if let Some(subdir) = &repo.subdir {
                if entry.path != *subdir && !entry.path.starts_with(&format!("{subdir}/")) {
                    continue;
                }
            }
            if entry.path.split('/').any(|segment| segment == "..") {
                debug!("Skipping tree entry with unsafe path: {}", entry.path);
                continue;
            }

            let contents = self.fetch_blob(repo, &entry.path, reporter).await?;
            let dest = if dest_path == "/" {
                format!("/{}", entry.path)
            } else {
                format!("{dest_path}/{}", entry.path)
            };
            vfs.write_file(&dest, contents)?;
            written.push(dest);
        }
        Ok(written)
    }

    /// Fetch one blob: raw content first (through the proxy chain), then the
    /// contents API with base64 decoding.
    async fn fetch_blob(
        &self,
        repo: &RepoIdentity,
        path: &str,
        reporter: Option<&dyn Reporter>,
    ) -> Result<Vec<u8>, FetchError> {
        let raw_url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            repo.owner,
            repo.repo,
            repo.encoded_ref(),
            encode_path(path),
        );
        match self.get_bytes_any(&raw_url, reporter).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                debug!("Raw fetch failed for {path} ({err}); trying the contents API");
                let contents_url = format!(
                    "{}/repos/{}/{}/contents/{}?ref={}",
                    self.api_base,
                    repo.owner,
                    repo.repo,
                    encode_path(path),
                    repo.encoded_ref(),
                );
                let response: ContentsResponse =
                    self.get_json_with_retry(&contents_url, reporter).await?;
                let compact: String = response
                    .content
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                BASE64.decode(compact).map_err(|_| FetchError::BadContent {
                    path: path.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> ArchiveClient {
        ArchiveClient::builder()
            .codeload_base(format!("{}/codeload", server.uri()))
            .api_base(format!("{}/api", server.uri()))
            .raw_base(format!("{}/raw", server.uri()))
            .retries(0)
            .build()
    }

    #[tokio::test]
    async fn fetch_archive_hits_codeload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/codeload/acme/demo/tar.gz/HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tarball".to_vec()))
            .mount(&server)
            .await;

        let repo = RepoIdentity::parse("acme/demo").unwrap();
        let client = client_for(&server);
        let bytes = client.fetch_archive(&repo, None).await.unwrap();
        assert_eq!(bytes, b"tarball");
    }

    #[tokio::test]
    async fn fetch_archive_falls_back_to_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/codeload/acme/demo/tar.gz/HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"proxied".to_vec()))
            .mount(&server)
            .await;

        let repo = RepoIdentity::parse("acme/demo").unwrap();
        let client = ArchiveClient::builder()
            .codeload_base(format!("{}/codeload", server.uri()))
            .proxy(format!("{}/proxy?url=", server.uri()))
            .retries(0)
            .build();
        let bytes = client.fetch_archive(&repo, None).await.unwrap();
        assert_eq!(bytes, b"proxied");
    }

    #[tokio::test]
    async fn fetch_archive_reports_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let repo = RepoIdentity::parse("acme/demo").unwrap();
        let client = client_for(&server);
        let err = client.fetch_archive(&repo, None).await.unwrap_err();
        assert!(matches!(err, FetchError::ArchiveFetchFailed { .. }));
    }

    #[tokio::test]
    async fn api_walk_writes_blobs_into_vfs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/repos/acme/demo/git/trees/HEAD"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree": [
                    {"path": "package.json", "type": "blob"},
                    {"path": "src", "type": "tree"},
                    {"path": "src/index.js", "type": "blob"},
                    {"path": "../escape.txt", "type": "blob"},
                ],
                "truncated": false,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/acme/demo/HEAD/package.json"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{}".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/acme/demo/HEAD/src/index.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        // base64("export {}") with a line break, as the contents API returns.
        Mock::given(method("GET"))
            .and(path("/api/repos/acme/demo/contents/src/index.js"))
            .and(query_param("ref", "HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "ZXhwb3J0\nIHt9",
                "encoding": "base64",
            })))
            .mount(&server)
            .await;

        let repo = RepoIdentity::parse("acme/demo").unwrap();
        let client = client_for(&server);
        let mut vfs = Vfs::new();
        let written = client
            .fetch_via_api(&repo, &mut vfs, "/project", None)
            .await
            .unwrap();
        assert_eq!(written, vec!["/project/package.json", "/project/src/index.js"]);
        assert_eq!(vfs.read_file("/project/src/index.js").unwrap(), b"export {}");
        assert!(!vfs.exists("/escape.txt"));
    }

    #[tokio::test]
    async fn api_walk_honors_subdir_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/repos/o/r/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree": [
                    {"path": "README.md", "type": "blob"},
                    {"path": "examples/demo/app.js", "type": "blob"},
                ],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw/o/r/main/examples/demo/app.js"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"app".to_vec()))
            .mount(&server)
            .await;

        let repo = RepoIdentity::parse("https://github.com/o/r/tree/main/examples/demo").unwrap();
        let client = client_for(&server);
        let mut vfs = Vfs::new();
        let written = client
            .fetch_via_api(&repo, &mut vfs, "/project", None)
            .await
            .unwrap();
        assert_eq!(written, vec!["/project/examples/demo/app.js"]);
        assert!(!vfs.exists("/project/README.md"));
    }
}
