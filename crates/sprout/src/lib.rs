//! Paste URL → runnable project.
//!
//! `sprout` imports a remote repository into an in-memory virtual
//! filesystem, installs its declared dependencies through a pluggable
//! package manager, optionally rewrites module syntax, and caches the
//! whole result as a layered content-addressed snapshot so the next
//! bootstrap of the same URL restores instantly.
//!
//! ```no_run
//! use sprout::{ArchiveClient, BootstrapContext, BootstrapOptions, Vfs};
//!
//! # async fn example() -> Result<(), sprout::BootstrapError> {
//! let client = ArchiveClient::builder().build();
//! let context = BootstrapContext {
//!     client: &client,
//!     installer: None,
//!     transformer: None,
//!     store: None,
//! };
//! let mut vfs = Vfs::new();
//! let result = sprout::bootstrap(
//!     &mut vfs,
//!     "https://github.com/acme/demo",
//!     &BootstrapOptions::default(),
//!     &context,
//! )
//! .await?;
//! assert_eq!(result.project_path, "/project");
//! # Ok(())
//! # }
//! ```

pub use sprout_client::{ArchiveClient, ArchiveClientBuilder, ArchiveSource, FetchError};
pub use sprout_repo_url::{RepoIdentity, RepoUrlError};
pub use sprout_snapshot_cache::{
    CacheMode, FsStore, MemoryStore, SnapshotReadOutcome, SnapshotSource, SnapshotStore,
    clear_snapshots, memory_cache_stats, reset_memory_cache,
};
pub use sprout_types::{
    InstallOptions, InstallResult, Installer, Reporter, ResolvedPackage, SourceTransformer,
};
pub use sprout_vfs::{FileEntry, FileType, Metadata, Vfs, VfsError, VfsSnapshot};

pub use crate::bootstrap::{
    BootstrapContext, BootstrapError, BootstrapResult, CacheStats, ImportOptions, ImportResult,
    bootstrap, import_repo, read_snapshot, write_snapshot,
};
pub use crate::options::BootstrapOptions;

mod bootstrap;
mod options;

/// Parse a user-supplied repository reference into a [`RepoIdentity`].
pub fn parse_repo_url(input: &str) -> Result<RepoIdentity, RepoUrlError> {
    RepoIdentity::parse(input)
}
