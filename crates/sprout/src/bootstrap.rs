//! The bootstrap coordinator: cache read, import, preflight, install,
//! transform, cache write.

use thiserror::Error;
use tracing::{debug, warn};

use sprout_client::{ArchiveClient, ArchiveSource, FetchError};
use sprout_extract::{ExtractError, ExtractOptions, extract};
use sprout_preflight::PreflightOptions;
use sprout_repo_url::{RepoIdentity, RepoUrlError};
use sprout_snapshot_cache::{
    SnapshotCacheOptions, SnapshotReadOutcome, SnapshotResult, SnapshotSource, SnapshotStore,
};
use sprout_types::{InstallError, InstallResult, Installer, Reporter, SourceTransformer};
use sprout_vfs::{Vfs, VfsError};

use crate::options::BootstrapOptions;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Url(#[from] RepoUrlError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("subdirectory `{subdir}` not found in {url}")]
    SubdirNotFound { subdir: String, url: String },
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// The external collaborators a bootstrap runs against. The package
/// manager, transformer, and persistent store are all optional; absent
/// collaborators degrade the corresponding stage to a no-op.
pub struct BootstrapContext<'a> {
    pub client: &'a ArchiveClient,
    pub installer: Option<&'a dyn Installer>,
    pub transformer: Option<&'a dyn SourceTransformer>,
    pub store: Option<&'a dyn SnapshotStore>,
}

/// How a bootstrap interacted with the snapshot cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub snapshot_read_source: Option<SnapshotSource>,
    pub snapshot_written: bool,
    pub archive_source: Option<ArchiveSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResult {
    pub repo: RepoIdentity,
    pub root_path: String,
    pub project_path: String,
    pub extracted_files: Vec<String>,
    pub install_result: Option<InstallResult>,
    pub transformed_project_files: Option<usize>,
    pub cache: CacheStats,
}

impl BootstrapResult {
    fn from_parts(result: SnapshotResult, cache: CacheStats) -> Self {
        Self {
            repo: result.repo,
            root_path: result.root_path,
            project_path: result.project_path,
            extracted_files: result.extracted_files,
            install_result: result.install_result,
            transformed_project_files: result.transformed_project_files,
            cache,
        }
    }

    /// The serializable core that snapshots carry.
    pub fn to_snapshot_result(&self) -> SnapshotResult {
        SnapshotResult {
            repo: self.repo.clone(),
            root_path: self.root_path.clone(),
            project_path: self.project_path.clone(),
            extracted_files: self.extracted_files.clone(),
            install_result: self.install_result.clone(),
            transformed_project_files: self.transformed_project_files,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportResult {
    pub repo: RepoIdentity,
    pub root_path: String,
    pub project_path: String,
    pub extracted_files: Vec<String>,
    pub archive_source: ArchiveSource,
}

#[derive(Default)]
pub struct ImportOptions<'a> {
    /// Defaults to `/project`.
    pub dest_path: Option<String>,
    pub reporter: Option<&'a dyn Reporter>,
}

fn progress(reporter: Option<&dyn Reporter>, message: &str) {
    if let Some(reporter) = reporter {
        reporter.on_progress(message);
    }
}

/// Import a repository into the VFS: fetch the archive and extract it, or
/// reassemble the tree through the GitHub API when the archive path is
/// exhausted.
pub async fn import_repo(
    vfs: &mut Vfs,
    repo_url: &str,
    options: &ImportOptions<'_>,
    client: &ArchiveClient,
) -> Result<ImportResult, BootstrapError> {
    let repo = RepoIdentity::parse(repo_url)?;
    let dest_path = options
        .dest_path
        .clone()
        .unwrap_or_else(|| crate::options::DEFAULT_DEST_PATH.to_string());

    progress(options.reporter, &format!("Importing {repo}"));
    let (extracted_files, archive_source) = match client.fetch_archive(&repo, options.reporter).await
    {
        Ok(bytes) => {
            let files = extract(
                &bytes,
                vfs,
                &dest_path,
                &ExtractOptions {
                    strip_components: 1,
                    reporter: options.reporter,
                },
            )?;
            (files, ArchiveSource::Archive)
        }
        Err(err) => {
            warn!("Archive fetch for {repo} failed: {err}");
            progress(
                options.reporter,
                "Archive fetch failed; retrieving files through the GitHub API",
            );
            let files = client
                .fetch_via_api(&repo, vfs, &dest_path, options.reporter)
                .await?;
            (files, ArchiveSource::Api)
        }
    };

    let project_path = match &repo.subdir {
        Some(subdir) => {
            let candidate = format!("{dest_path}/{subdir}");
            if !vfs.stat(&candidate).map(|m| m.is_dir()).unwrap_or(false) {
                return Err(BootstrapError::SubdirNotFound {
                    subdir: subdir.clone(),
                    url: repo.source_url.clone(),
                });
            }
            candidate
        }
        None => dest_path.clone(),
    };

    progress(
        options.reporter,
        &format!("Imported {} files from {repo}", extracted_files.len()),
    );
    Ok(ImportResult {
        repo,
        root_path: dest_path,
        project_path,
        extracted_files,
        archive_source,
    })
}

/// Run the full pipeline for a repo URL against the given collaborators.
pub async fn bootstrap(
    vfs: &mut Vfs,
    repo_url: &str,
    options: &BootstrapOptions<'_>,
    context: &BootstrapContext<'_>,
) -> Result<BootstrapResult, BootstrapError> {
    let resolved = options.resolve();
    let fingerprint_options = resolved.fingerprint_options();
    let cache_options = snapshot_cache_options(options, context.store);

    // Step 1: cache read.
    if let Some(SnapshotReadOutcome { source, result }) =
        sprout_snapshot_cache::read_snapshot(vfs, repo_url, &cache_options, &fingerprint_options)
    {
        progress(
            options.reporter,
            &format!("Restored project from snapshot cache ({source})"),
        );
        return Ok(BootstrapResult::from_parts(
            result,
            CacheStats {
                snapshot_read_source: Some(source),
                snapshot_written: false,
                archive_source: None,
            },
        ));
    }

    // Step 2: import.
    let import = import_repo(
        vfs,
        repo_url,
        &ImportOptions {
            dest_path: Some(resolved.dest_path.clone()),
            reporter: options.reporter,
        },
        context.client,
    )
    .await?;

    // Step 3: install gate. A closed gate skips steps 4 and 5; the
    // report-only preflight below runs either way.
    let manifest_path = format!("{}/package.json", import.project_path);
    let mut install_result = None;
    let mut post_preflight_options = PreflightOptions {
        auto_fix: false,
        include_workspaces: options.include_workspaces,
        prefer_published_workspace_packages: options.prefer_published_workspace_packages,
        reporter: options.reporter,
    };
    if resolved.skip_install {
        debug!("Skipping dependency install by request");
    } else if !vfs.exists(&manifest_path) {
        debug!("No manifest at {manifest_path}; skipping dependency install");
    } else if let Some(installer) = context.installer {
        // Step 4: pre-install preflight, with auto-fix. Caller-set options
        // win over suggested overrides.
        let report = sprout_preflight::run(
            vfs,
            &import.project_path,
            &PreflightOptions {
                auto_fix: true,
                include_workspaces: options.include_workspaces,
                prefer_published_workspace_packages: options.prefer_published_workspace_packages,
                reporter: options.reporter,
            },
        );
        let mut install_options = resolved.install_options();
        if let Some(value) = report.install_overrides.include_workspaces {
            install_options.include_workspaces = value;
        }
        if let Some(value) = report.install_overrides.prefer_published_workspace_packages {
            install_options.prefer_published_workspace_packages = value;
        }

        // Step 5: install.
        install_result = Some(
            installer
                .install(vfs, &import.project_path, &install_options, options.reporter)
                .await?,
        );

        post_preflight_options.include_workspaces = Some(install_options.include_workspaces);
        post_preflight_options.prefer_published_workspace_packages =
            Some(install_options.prefer_published_workspace_packages);
    } else {
        debug!("No package manager configured; skipping dependency install");
    }

    // Step 6: post-install preflight, report-only.
    sprout_preflight::run(vfs, &import.project_path, &post_preflight_options);

    // Step 7: transform, degraded on failure.
    let mut transformed_project_files = None;
    if resolved.transform && resolved.transform_project_sources {
        if let Some(transformer) = context.transformer {
            if !transformer.is_ready() {
                if let Err(err) = transformer.init().await {
                    warn!("Transformer failed to initialize: {err}");
                    progress(
                        options.reporter,
                        &format!("Source transform unavailable ({err}); continuing"),
                    );
                }
            }
            if transformer.is_ready() {
                match transformer
                    .transform_package(vfs, &import.project_path, options.reporter)
                    .await
                {
                    Ok(count) => transformed_project_files = Some(count),
                    Err(err) => {
                        warn!("Source transform failed: {err}");
                        progress(
                            options.reporter,
                            &format!("Source transform failed ({err}); continuing"),
                        );
                    }
                }
            }
        }
    }

    // Step 8: cache write, degraded on failure.
    let snapshot_result = SnapshotResult {
        repo: import.repo.clone(),
        root_path: import.root_path.clone(),
        project_path: import.project_path.clone(),
        extracted_files: import.extracted_files.clone(),
        install_result: install_result.clone(),
        transformed_project_files,
    };
    let snapshot_written = sprout_snapshot_cache::write_snapshot(
        vfs,
        repo_url,
        &cache_options,
        &fingerprint_options,
        &snapshot_result,
    );

    Ok(BootstrapResult {
        repo: import.repo,
        root_path: import.root_path,
        project_path: import.project_path,
        extracted_files: import.extracted_files,
        install_result,
        transformed_project_files,
        cache: CacheStats {
            snapshot_read_source: None,
            snapshot_written,
            archive_source: Some(import.archive_source),
        },
    })
}

/// Restore a cached bootstrap into `vfs` without running the pipeline.
pub fn read_snapshot(
    vfs: &mut Vfs,
    repo_url: &str,
    options: &BootstrapOptions<'_>,
    store: Option<&dyn SnapshotStore>,
) -> Option<SnapshotReadOutcome> {
    let fingerprint_options = options.resolve().fingerprint_options();
    sprout_snapshot_cache::read_snapshot(
        vfs,
        repo_url,
        &snapshot_cache_options(options, store),
        &fingerprint_options,
    )
}

/// Capture `vfs` plus a bootstrap result into the snapshot cache.
pub fn write_snapshot(
    vfs: &Vfs,
    repo_url: &str,
    options: &BootstrapOptions<'_>,
    store: Option<&dyn SnapshotStore>,
    result: &BootstrapResult,
) -> bool {
    let fingerprint_options = options.resolve().fingerprint_options();
    sprout_snapshot_cache::write_snapshot(
        vfs,
        repo_url,
        &snapshot_cache_options(options, store),
        &fingerprint_options,
        &result.to_snapshot_result(),
    )
}

fn snapshot_cache_options<'a>(
    options: &'a BootstrapOptions<'a>,
    store: Option<&'a dyn SnapshotStore>,
) -> SnapshotCacheOptions<'a> {
    SnapshotCacheOptions {
        enabled: options.enable_project_snapshot_cache,
        mode: options.project_snapshot_cache_mode,
        ttl_ms: options.project_snapshot_cache_ttl_ms,
        max_entries: options.project_snapshot_cache_max_entries,
        max_bytes: options.project_snapshot_cache_max_bytes,
        max_entry_bytes: options.project_snapshot_cache_max_entry_bytes,
        store,
        reporter: options.reporter,
    }
}
