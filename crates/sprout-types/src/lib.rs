//! Shared types at the seams of the bootstrap pipeline: progress reporting,
//! the package-manager interface, and the source-transformer interface.
//!
//! The pipeline treats the installer and transformer as black boxes; only
//! the types in this crate are observed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sprout_vfs::{Vfs, VfsError};

#[cfg(feature = "test-util")]
pub mod test_util;

/// The user-visible progress channel. Implementations must not fail; the
/// pipeline never handles errors from a reporter.
pub trait Reporter: Send + Sync {
    fn on_progress(&self, message: &str);
}

/// Options forwarded to the package manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub include_dev: bool,
    pub include_optional: bool,
    pub include_workspaces: bool,
    pub prefer_published_workspace_packages: bool,
}

/// A single resolved dependency, as reported by the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

/// The outcome of a dependency install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    /// Top-level package names that were added.
    pub added: Vec<String>,
    /// Every materialized package, keyed by name.
    pub installed: BTreeMap<String, ResolvedPackage>,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no package manifest found at `{0}`")]
    ManifestMissing(String),
    #[error("failed to parse package manifest: {0}")]
    ManifestInvalid(#[from] serde_json::Error),
    #[error("failed to resolve `{name}`: {reason}")]
    Resolution { name: String, reason: String },
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// The package manager. Resolves the dependency graph declared by the
/// project manifest and materializes packages into `node_modules`.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(
        &self,
        vfs: &mut Vfs,
        project_path: &str,
        options: &InstallOptions,
        reporter: Option<&dyn Reporter>,
    ) -> Result<InstallResult, InstallError>;
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transformer failed on `{path}`: {reason}")]
    File { path: String, reason: String },
    #[error("transformer is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// The module-syntax rewriter, applied per file after install. Opaque to
/// the pipeline; failures degrade to warnings.
#[async_trait]
pub trait SourceTransformer: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn init(&self) -> Result<(), TransformError>;

    /// Rewrite the project's sources in place, returning the number of
    /// files changed.
    async fn transform_package(
        &self,
        vfs: &mut Vfs,
        project_path: &str,
        reporter: Option<&dyn Reporter>,
    ) -> Result<usize, TransformError>;
}
