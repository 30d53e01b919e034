//! A layered cache for bootstrap results: an in-memory LRU over encoded
//! records in front of a pluggable persistent byte store, keyed by the
//! repo URL and an options fingerprint.
//!
//! Read path: memory (fresh entries only, touched to most-recently-used),
//! then the persistent store (validated, promoted into memory when it fits
//! the per-entry budget). Either hit rehydrates the caller's VFS. Write
//! path: encode + gzip once, insert into memory, write content-addressed to
//! the store. Corrupt or stale records are silent misses.

use std::sync::Arc;

use jiff::Timestamp;
use tracing::{debug, warn};

use sprout_types::Reporter;
use sprout_vfs::Vfs;

pub use config::{
    CacheMode, DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_ENTRY_BYTES, ENV_ENABLE,
    ENV_MAX_BYTES, ENV_MAX_ENTRIES, ENV_MAX_ENTRY_BYTES, ENV_MODE, ENV_TTL_MS, MUTABLE_TTL_MS,
    PINNED_TTL_MS,
};
pub use key::{FingerprintOptions, NAMESPACE, OptionsFingerprint, snapshot_key};
pub use memory::{MemoryCacheStats, memory_cache_stats, reset_memory_cache};
pub use record::SnapshotResult;
pub use store::{FsStore, MemoryStore, SnapshotStore, StoreReadRequest, StoreWriteRequest};

mod config;
mod key;
mod memory;
mod record;
mod store;

/// Which tier satisfied a snapshot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Memory,
    Persistent,
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

#[derive(Debug)]
pub struct SnapshotReadOutcome {
    pub source: SnapshotSource,
    pub result: SnapshotResult,
}

/// Per-call cache configuration. `None` fields defer to environment
/// overrides, then defaults.
#[derive(Default)]
pub struct SnapshotCacheOptions<'a> {
    pub enabled: Option<bool>,
    pub mode: Option<CacheMode>,
    pub ttl_ms: Option<u64>,
    pub max_entries: Option<i64>,
    pub max_bytes: Option<i64>,
    pub max_entry_bytes: Option<i64>,
    pub store: Option<&'a dyn SnapshotStore>,
    pub reporter: Option<&'a dyn Reporter>,
}

fn now_ms() -> i64 {
    Timestamp::now().as_millisecond()
}

/// Drop every cached snapshot: the whole in-memory tier and, when a store
/// is given, the persistent namespace.
pub fn clear_snapshots(store: Option<&dyn SnapshotStore>) {
    memory::reset_memory_cache();
    if let Some(store) = store {
        store.clear(Some(NAMESPACE));
    }
}

/// Attempt to restore a cached bootstrap into `vfs`.
///
/// Returns `None` when the cache is disabled, the mode skips reads, any
/// limit is non-positive, or no fresh valid entry exists.
pub fn read_snapshot(
    vfs: &mut Vfs,
    repo_url: &str,
    options: &SnapshotCacheOptions<'_>,
    fingerprint_options: &FingerprintOptions,
) -> Option<SnapshotReadOutcome> {
    let fingerprint = OptionsFingerprint::new(repo_url, fingerprint_options);
    let config = config::resolve(
        options.enabled,
        options.mode,
        options.ttl_ms,
        options.max_entries,
        options.max_bytes,
        options.max_entry_bytes,
        fingerprint.mutable_ref,
    );
    if !config.enabled || config.mode != CacheMode::Default || !config.limits_usable() {
        return None;
    }

    let key = snapshot_key(repo_url, &fingerprint);
    let memory_key = format!("{NAMESPACE}:{key}");
    let now = now_ms();

    if let Some(bytes) = memory::lookup(&memory_key, config.ttl_ms, now) {
        if let Some(record) = record::decode(&bytes) {
            if let Err(err) = vfs.apply_snapshot(&record.snapshot) {
                warn!("Failed to rehydrate snapshot from memory: {err}");
            } else {
                return Some(SnapshotReadOutcome {
                    source: SnapshotSource::Memory,
                    result: record.result,
                });
            }
        }
    }

    let store = options.store?;
    let bytes = store.read(&StoreReadRequest {
        namespace: NAMESPACE,
        key: &key,
        max_entries: config.max_entries as usize,
        max_bytes: config.max_bytes as u64,
    })?;
    let record = record::decode(&bytes)?;
    let age = now.saturating_sub(record.stored_at);
    if config.ttl_ms != 0 && age > config.ttl_ms as i64 {
        debug!("Persistent snapshot for {repo_url} is stale ({age} ms old)");
        return None;
    }
    if bytes.len() as i64 <= config.max_entry_bytes {
        memory::insert(
            &memory_key,
            Arc::new(bytes),
            record.stored_at,
            config.max_entries as usize,
            config.max_bytes as u64,
        );
    }
    if let Err(err) = vfs.apply_snapshot(&record.snapshot) {
        warn!("Failed to rehydrate snapshot from the persistent store: {err}");
        return None;
    }
    Some(SnapshotReadOutcome {
        source: SnapshotSource::Persistent,
        result: record.result,
    })
}

/// Capture `vfs` plus a bootstrap result into the cache.
///
/// Returns whether a snapshot was cached. Persistent-store failures degrade
/// to a warning; the in-memory entry still counts.
pub fn write_snapshot(
    vfs: &Vfs,
    repo_url: &str,
    options: &SnapshotCacheOptions<'_>,
    fingerprint_options: &FingerprintOptions,
    result: &SnapshotResult,
) -> bool {
    let fingerprint = OptionsFingerprint::new(repo_url, fingerprint_options);
    let config = config::resolve(
        options.enabled,
        options.mode,
        options.ttl_ms,
        options.max_entries,
        options.max_bytes,
        options.max_entry_bytes,
        fingerprint.mutable_ref,
    );
    if !config.enabled || config.mode == CacheMode::Bypass || !config.limits_usable() {
        return false;
    }

    let record = record::SnapshotRecord {
        version: key::CACHE_VERSION,
        stored_at: now_ms(),
        result: result.clone(),
        snapshot: vfs.to_snapshot(),
    };
    let encoded = match record::encode(&record) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!("Failed to encode snapshot for {repo_url}: {err}");
            return false;
        }
    };
    if encoded.is_empty()
        || encoded.len() as i64 > config.max_entry_bytes
        || encoded.len() as i64 > config.max_bytes
    {
        debug!(
            "Skipping snapshot write for {repo_url}: {} bytes exceeds the budget",
            encoded.len()
        );
        return false;
    }

    let key = snapshot_key(repo_url, &fingerprint);
    let memory_key = format!("{NAMESPACE}:{key}");
    memory::insert(
        &memory_key,
        Arc::new(encoded.clone()),
        record.stored_at,
        config.max_entries as usize,
        config.max_bytes as u64,
    );

    if let Some(store) = options.store {
        let written = store.write(
            &StoreWriteRequest {
                namespace: NAMESPACE,
                key: &key,
                max_entries: config.max_entries as usize,
                max_bytes: config.max_bytes as u64,
                content_addressed: true,
            },
            &encoded,
        );
        if !written {
            warn!("Failed to persist snapshot for {repo_url}");
            if let Some(reporter) = options.reporter {
                reporter.on_progress("Failed to persist project snapshot; kept in memory only");
            }
        }
    }
    true
}
