//! Bootstrap options and their resolution.
//!
//! Several booleans default to `true`, so the public surface keeps them as
//! `Option<bool>` ("unset" vs. "explicitly off"). Defaults are applied in
//! exactly one place — [`BootstrapOptions::resolve`] — and the resolved
//! values feed both coordinator dispatch and the cache fingerprint, which
//! keeps the two in agreement.

use sprout_snapshot_cache::{CacheMode, FingerprintOptions};
use sprout_types::{InstallOptions, Reporter};

pub(crate) const DEFAULT_DEST_PATH: &str = "/project";

/// Options for [`crate::bootstrap`].
#[derive(Default)]
pub struct BootstrapOptions<'a> {
    /// Root directory for extraction. Defaults to `/project`.
    pub dest_path: Option<String>,
    pub skip_install: bool,
    pub include_dev: bool,
    pub include_optional: bool,
    /// Defaults to `true`.
    pub include_workspaces: Option<bool>,
    /// Defaults to `false`.
    pub prefer_published_workspace_packages: Option<bool>,
    /// Defaults to `true`.
    pub transform: Option<bool>,
    /// Defaults to `true`.
    pub transform_project_sources: Option<bool>,
    /// Master cache switch; the environment can still disable the cache.
    pub enable_project_snapshot_cache: Option<bool>,
    pub project_snapshot_cache_mode: Option<CacheMode>,
    pub project_snapshot_cache_ttl_ms: Option<u64>,
    pub project_snapshot_cache_max_entries: Option<i64>,
    pub project_snapshot_cache_max_bytes: Option<i64>,
    pub project_snapshot_cache_max_entry_bytes: Option<i64>,
    pub reporter: Option<&'a dyn Reporter>,
}

/// Option values with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedOptions {
    pub(crate) dest_path: String,
    pub(crate) skip_install: bool,
    pub(crate) include_dev: bool,
    pub(crate) include_optional: bool,
    pub(crate) include_workspaces: bool,
    pub(crate) prefer_published_workspace_packages: bool,
    pub(crate) transform: bool,
    pub(crate) transform_project_sources: bool,
}

impl BootstrapOptions<'_> {
    pub(crate) fn resolve(&self) -> ResolvedOptions {
        ResolvedOptions {
            dest_path: self
                .dest_path
                .clone()
                .unwrap_or_else(|| DEFAULT_DEST_PATH.to_string()),
            skip_install: self.skip_install,
            include_dev: self.include_dev,
            include_optional: self.include_optional,
            include_workspaces: self.include_workspaces.unwrap_or(true),
            prefer_published_workspace_packages: self
                .prefer_published_workspace_packages
                .unwrap_or(false),
            transform: self.transform.unwrap_or(true),
            transform_project_sources: self.transform_project_sources.unwrap_or(true),
        }
    }
}

impl ResolvedOptions {
    pub(crate) fn fingerprint_options(&self) -> FingerprintOptions {
        FingerprintOptions {
            dest_path: self.dest_path.clone(),
            skip_install: self.skip_install,
            include_dev: self.include_dev,
            include_optional: self.include_optional,
            include_workspaces: self.include_workspaces,
            prefer_published_workspace_packages: self.prefer_published_workspace_packages,
            transform: self.transform,
            transform_project_sources: self.transform_project_sources,
        }
    }

    pub(crate) fn install_options(&self) -> InstallOptions {
        InstallOptions {
            include_dev: self.include_dev,
            include_optional: self.include_optional,
            include_workspaces: self.include_workspaces,
            prefer_published_workspace_packages: self.prefer_published_workspace_packages,
        }
    }
}
