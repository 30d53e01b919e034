//! Parsing of user-supplied repository references into a [`RepoIdentity`].
//!
//! Accepted forms, all pointing at GitHub:
//!
//! - `https://github.com/owner/repo[.git]`
//! - `https://github.com/owner/repo/tree/ref[/sub/dir]`
//! - `git+https://github.com/owner/repo.git#ref`
//! - `github:owner/repo[#ref]`
//! - `owner/repo[#ref]`

use std::fmt::{Display, Formatter};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Characters escaped when a ref or path segment is embedded in a URL path.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error)]
pub enum RepoUrlError {
    #[error("empty repository URL")]
    Empty,
    #[error("unsupported host in `{0}`: only github.com is supported")]
    UnsupportedHost(String),
    #[error("invalid repository URL `{0}`: expected `owner/repo`")]
    MissingSegments(String),
    #[error("invalid repository URL `{0}`: {1}")]
    Malformed(String, #[source] url::ParseError),
}

/// The identity of a remote repository: who owns it, which ref to import,
/// and an optional subdirectory within the tree.
///
/// The ref is stored raw (never percent-encoded); it is encoded on demand
/// when embedded in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoIdentity {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    pub source_url: String,
    pub archive_url: String,
}

impl RepoIdentity {
    /// Parse a user-supplied repository reference.
    pub fn parse(input: &str) -> Result<Self, RepoUrlError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RepoUrlError::Empty);
        }
        let trimmed = trimmed.strip_prefix("git+").unwrap_or(trimmed);

        if let Some(rest) = trimmed.strip_prefix("github:") {
            return Self::from_shorthand(rest, trimmed);
        }
        if trimmed.contains("://") {
            return Self::from_url(trimmed);
        }
        Self::from_shorthand(trimmed, trimmed)
    }

    fn from_url(input: &str) -> Result<Self, RepoUrlError> {
        let url = Url::parse(input).map_err(|err| RepoUrlError::Malformed(input.to_string(), err))?;
        if url.host_str() != Some("github.com") {
            return Err(RepoUrlError::UnsupportedHost(input.to_string()));
        }

        let segments: Vec<String> = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .collect();
        let [owner, repo, rest @ ..] = segments.as_slice() else {
            return Err(RepoUrlError::MissingSegments(input.to_string()));
        };

        // Tree URLs carry the ref in segment 3 and the subdir in the tail.
        let (mut git_ref, subdir) = match rest {
            [tree, git_ref, subdir @ ..] if tree == "tree" => (
                Some(git_ref.clone()),
                (!subdir.is_empty()).then(|| subdir.join("/")),
            ),
            _ => (None, None),
        };
        if git_ref.is_none() {
            git_ref = url.fragment().map(str::to_string).filter(|s| !s.is_empty());
        }

        Ok(Self::from_parts(owner, repo, git_ref, subdir))
    }

    fn from_shorthand(rest: &str, input: &str) -> Result<Self, RepoUrlError> {
        let (path, git_ref) = match rest.split_once('#') {
            Some((path, git_ref)) if !git_ref.is_empty() => (path, Some(git_ref.to_string())),
            Some((path, _)) => (path, None),
            None => (rest, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        let [owner, repo] = segments.as_slice() else {
            return Err(RepoUrlError::MissingSegments(input.to_string()));
        };
        Ok(Self::from_parts(owner, repo, git_ref, None))
    }

    fn from_parts(owner: &str, repo: &str, git_ref: Option<String>, subdir: Option<String>) -> Self {
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        let git_ref = git_ref.unwrap_or_else(|| "HEAD".to_string());
        let source_url = format!("https://github.com/{owner}/{repo}");
        let archive_url = format!(
            "https://codeload.github.com/{owner}/{repo}/tar.gz/{}",
            utf8_percent_encode(&git_ref, SEGMENT),
        );
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref,
            subdir,
            source_url,
            archive_url,
        }
    }

    /// Whether the ref can move between fetches (a branch, tag, or `HEAD`).
    /// Only a 7–40 character hex string is treated as a pinned commit.
    pub fn is_mutable_ref(&self) -> bool {
        let len = self.git_ref.len();
        !((7..=40).contains(&len) && self.git_ref.chars().all(|c| c.is_ascii_hexdigit()))
    }

    /// The ref, escaped for embedding in a URL path segment.
    pub fn encoded_ref(&self) -> String {
        utf8_percent_encode(&self.git_ref, SEGMENT).to_string()
    }
}

impl Display for RepoIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.git_ref)?;
        if let Some(subdir) = &self.subdir {
            write!(f, ":{subdir}")?;
        }
        Ok(())
    }
}

/// Escape a repo-relative path for a raw-content URL, segment by segment.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_url() {
        let id = RepoIdentity::parse("https://github.com/acme/demo").unwrap();
        assert_eq!(id.owner, "acme");
        assert_eq!(id.repo, "demo");
        assert_eq!(id.git_ref, "HEAD");
        assert_eq!(id.subdir, None);
        assert_eq!(id.source_url, "https://github.com/acme/demo");
        assert_eq!(id.archive_url, "https://codeload.github.com/acme/demo/tar.gz/HEAD");
    }

    #[test]
    fn strips_git_suffix_and_prefix() {
        let id = RepoIdentity::parse("git+https://github.com/acme/demo.git#v1.2.3").unwrap();
        assert_eq!(id.repo, "demo");
        assert_eq!(id.git_ref, "v1.2.3");
        assert_eq!(id.source_url, "https://github.com/acme/demo");
    }

    #[test]
    fn parses_tree_url_with_subdir() {
        let id = RepoIdentity::parse("https://github.com/o/r/tree/main/examples/demo").unwrap();
        assert_eq!(id.git_ref, "main");
        assert_eq!(id.subdir.as_deref(), Some("examples/demo"));
    }

    #[test]
    fn parses_tree_url_without_subdir() {
        let id = RepoIdentity::parse("https://github.com/o/r/tree/feature%2Fbranch").unwrap();
        assert_eq!(id.git_ref, "feature/branch");
        assert_eq!(id.subdir, None);
        assert_eq!(
            id.archive_url,
            "https://codeload.github.com/o/r/tar.gz/feature%2Fbranch"
        );
    }

    #[test]
    fn parses_shorthand() {
        let id = RepoIdentity::parse("acme/demo").unwrap();
        assert_eq!((id.owner.as_str(), id.repo.as_str()), ("acme", "demo"));
        assert_eq!(id.git_ref, "HEAD");

        let id = RepoIdentity::parse("github:acme/demo.git#main").unwrap();
        assert_eq!(id.repo, "demo");
        assert_eq!(id.git_ref, "main");
    }

    #[test]
    fn trims_whitespace() {
        let id = RepoIdentity::parse("  acme/demo  ").unwrap();
        assert_eq!(id.owner, "acme");
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(matches!(RepoIdentity::parse(""), Err(RepoUrlError::Empty)));
        assert!(matches!(RepoIdentity::parse("   "), Err(RepoUrlError::Empty)));
        assert!(matches!(
            RepoIdentity::parse("https://gitlab.com/o/r"),
            Err(RepoUrlError::UnsupportedHost(_))
        ));
        assert!(matches!(
            RepoIdentity::parse("https://github.com/only-owner"),
            Err(RepoUrlError::MissingSegments(_))
        ));
        assert!(matches!(
            RepoIdentity::parse("just-one-segment"),
            Err(RepoUrlError::MissingSegments(_))
        ));
    }

    #[test]
    fn mutable_ref_detection() {
        let pinned = RepoIdentity::parse("o/r#843b753e9e8cb74e83cac55598719b39a4d5ef1f").unwrap();
        assert!(!pinned.is_mutable_ref());
        let short = RepoIdentity::parse("o/r#843b753").unwrap();
        assert!(!short.is_mutable_ref());
        let branch = RepoIdentity::parse("o/r#main").unwrap();
        assert!(branch.is_mutable_ref());
        let head = RepoIdentity::parse("o/r").unwrap();
        assert!(head.is_mutable_ref());
        // Too short to be a commit, even though it is hex.
        let tiny = RepoIdentity::parse("o/r#abc").unwrap();
        assert!(tiny.is_mutable_ref());
    }

    #[test]
    fn encodes_path_segments_independently() {
        assert_eq!(encode_path("src/my file.js"), "src/my%20file.js");
        assert_eq!(encode_path("a#b/c"), "a%23b/c");
    }
}
