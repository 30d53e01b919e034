#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sprout::ArchiveClient;

/// Build a gzipped tarball from `(path, contents)` pairs.
pub fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (entry_path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, entry_path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A client whose GitHub endpoints all point at the mock server.
pub fn client_for(server: &MockServer) -> ArchiveClient {
    ArchiveClient::builder()
        .codeload_base(format!("{}/codeload", server.uri()))
        .api_base(format!("{}/api", server.uri()))
        .raw_base(format!("{}/raw", server.uri()))
        .retries(0)
        .build()
}

/// Serve an archive for `owner/repo` at `git_ref`.
pub async fn mount_archive(server: &MockServer, owner: &str, repo: &str, git_ref: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/codeload/{owner}/{repo}/tar.gz/{git_ref}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

/// Total requests the mock server has seen.
pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}
