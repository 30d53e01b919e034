//! Cache key derivation.
//!
//! The key has three parts: a namespace, a version segment (bumping it
//! orphans every prior entry), and a digest pair of the trimmed repo URL
//! and the canonical JSON of the options fingerprint.

use serde::Serialize;

use sprout_cache_key::digest;
use sprout_repo_url::RepoIdentity;

/// The persistent-store namespace for bootstrap snapshots.
pub const NAMESPACE: &str = "project-snapshot";

pub(crate) const CACHE_VERSION: u32 = 1;

/// The bootstrap option values that participate in the cache key, with
/// defaults already applied. Changing any field must produce a different
/// key; options without semantic effect (reporters, stores) never appear
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintOptions {
    pub dest_path: String,
    pub skip_install: bool,
    pub include_dev: bool,
    pub include_optional: bool,
    pub include_workspaces: bool,
    pub prefer_published_workspace_packages: bool,
    pub transform: bool,
    pub transform_project_sources: bool,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            dest_path: "/project".to_string(),
            skip_install: false,
            include_dev: false,
            include_optional: false,
            include_workspaces: true,
            prefer_published_workspace_packages: false,
            transform: true,
            transform_project_sources: true,
        }
    }
}

/// The canonical option tuple whose JSON feeds the key digest.
///
/// Field order is the wire order; adding, removing, or reordering fields
/// invalidates existing keys just as a version bump would.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsFingerprint {
    source_url: String,
    #[serde(rename = "ref")]
    git_ref: String,
    subdir: String,
    dest_path: String,
    skip_install: bool,
    include_dev: bool,
    include_optional: bool,
    include_workspaces: bool,
    prefer_published_workspace_packages: bool,
    transform: bool,
    transform_project_sources: bool,

    /// Drives the TTL default, not the key.
    #[serde(skip)]
    pub(crate) mutable_ref: bool,
}

impl OptionsFingerprint {
    /// Build the fingerprint for a repo URL. A URL that fails to parse
    /// still fingerprints (the trimmed input stands in for the source URL,
    /// with `HEAD` and no subdir) so that unparsable inputs cache — and
    /// miss — consistently.
    pub fn new(repo_url: &str, options: &FingerprintOptions) -> Self {
        let (source_url, git_ref, subdir, mutable_ref) = match RepoIdentity::parse(repo_url) {
            Ok(identity) => (
                identity.source_url.clone(),
                identity.git_ref.clone(),
                identity.subdir.clone().unwrap_or_default(),
                identity.is_mutable_ref(),
            ),
            Err(_) => (
                repo_url.trim().to_string(),
                "HEAD".to_string(),
                String::new(),
                true,
            ),
        };
        Self {
            source_url,
            git_ref,
            subdir,
            dest_path: options.dest_path.clone(),
            skip_install: options.skip_install,
            include_dev: options.include_dev,
            include_optional: options.include_optional,
            include_workspaces: options.include_workspaces,
            prefer_published_workspace_packages: options.prefer_published_workspace_packages,
            transform: options.transform,
            transform_project_sources: options.transform_project_sources,
            mutable_ref,
        }
    }
}

/// The store key for a repo URL + fingerprint pair, scoped to
/// [`NAMESPACE`].
pub fn snapshot_key(repo_url: &str, fingerprint: &OptionsFingerprint) -> String {
    let fingerprint_json =
        serde_json::to_string(fingerprint).expect("fingerprint serialization is infallible");
    format!(
        "v{CACHE_VERSION}/bootstrap/{}|{}",
        digest(repo_url.trim()),
        digest(&fingerprint_json),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_for_identical_inputs() {
        let options = FingerprintOptions::default();
        let a = snapshot_key("acme/demo", &OptionsFingerprint::new("acme/demo", &options));
        let b = snapshot_key("acme/demo", &OptionsFingerprint::new("acme/demo", &options));
        assert_eq!(a, b);
    }

    #[test]
    fn key_changes_with_any_fingerprint_field() {
        let base = FingerprintOptions::default();
        let key = |options: &FingerprintOptions| {
            snapshot_key("acme/demo", &OptionsFingerprint::new("acme/demo", options))
        };
        let baseline = key(&base);

        let variants = [
            FingerprintOptions {
                include_dev: true,
                ..base.clone()
            },
            FingerprintOptions {
                skip_install: true,
                ..base.clone()
            },
            FingerprintOptions {
                dest_path: "/elsewhere".to_string(),
                ..base.clone()
            },
            FingerprintOptions {
                transform: false,
                ..base.clone()
            },
            FingerprintOptions {
                include_workspaces: false,
                ..base.clone()
            },
        ];
        for variant in variants {
            assert_ne!(baseline, key(&variant));
        }
    }

    #[test]
    fn key_changes_with_ref_and_subdir() {
        let options = FingerprintOptions::default();
        let a = snapshot_key(
            "https://github.com/o/r/tree/main",
            &OptionsFingerprint::new("https://github.com/o/r/tree/main", &options),
        );
        let b = snapshot_key(
            "https://github.com/o/r/tree/dev",
            &OptionsFingerprint::new("https://github.com/o/r/tree/dev", &options),
        );
        let c = snapshot_key(
            "https://github.com/o/r/tree/main/sub",
            &OptionsFingerprint::new("https://github.com/o/r/tree/main/sub", &options),
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unparsable_urls_fingerprint_consistently() {
        let options = FingerprintOptions::default();
        let fingerprint = OptionsFingerprint::new("https://gitlab.com/o/r", &options);
        assert!(fingerprint.mutable_ref);
        let a = snapshot_key("https://gitlab.com/o/r", &fingerprint);
        let b = snapshot_key(
            "https://gitlab.com/o/r",
            &OptionsFingerprint::new("https://gitlab.com/o/r", &options),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn pinned_commit_is_not_mutable() {
        let options = FingerprintOptions::default();
        let fingerprint = OptionsFingerprint::new(
            "o/r#843b753e9e8cb74e83cac55598719b39a4d5ef1f",
            &options,
        );
        assert!(!fingerprint.mutable_ref);
    }

    #[test]
    fn key_carries_namespace_version() {
        let options = FingerprintOptions::default();
        let key = snapshot_key("acme/demo", &OptionsFingerprint::new("acme/demo", &options));
        assert!(key.starts_with("v1/bootstrap/"));
        assert!(key.contains('|'));
    }
}
