//! The persistent tier: a pluggable key/value byte store with per-namespace
//! quotas and an optional content-addressed layout.
//!
//! Store failures are never surfaced as errors — a broken or missing
//! backend reads as a miss and writes as `false`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use fs_err as fs;
use tracing::debug;

use sprout_cache_key::digest;

pub struct StoreReadRequest<'a> {
    pub namespace: &'a str,
    pub key: &'a str,
    pub max_entries: usize,
    pub max_bytes: u64,
}

pub struct StoreWriteRequest<'a> {
    pub namespace: &'a str,
    pub key: &'a str,
    pub max_entries: usize,
    pub max_bytes: u64,
    /// Store the blob under its own digest and alias the key to it,
    /// sharing storage across callers that produce identical bytes.
    pub content_addressed: bool,
}

pub trait SnapshotStore: Send + Sync {
    fn read(&self, request: &StoreReadRequest<'_>) -> Option<Vec<u8>>;

    /// Returns whether the entry was durably written.
    fn write(&self, request: &StoreWriteRequest<'_>, bytes: &[u8]) -> bool;

    /// Drop one namespace, or everything.
    fn clear(&self, namespace: Option<&str>);
}

/// A filesystem-backed store.
///
/// Layout per namespace: `keys/{digest(key)}.bin` holds a directly-stored
/// blob; `keys/{digest(key)}.ref` holds the digest of a shared blob under
/// `cas/`. LRU order is file modification time; reads rewrite the alias
/// file to refresh it.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn keys_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace).join("keys")
    }

    fn cas_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace).join("cas")
    }

    fn enforce_limits(&self, namespace: &str, max_entries: usize, max_bytes: u64) {
        let keys_dir = self.keys_dir(namespace);
        let Ok(dir) = fs::read_dir(&keys_dir) else {
            return;
        };

        struct KeyFile {
            path: PathBuf,
            mtime: SystemTime,
            blob: Option<String>,
            direct_size: u64,
        }

        let mut key_files = Vec::new();
        let mut blob_sizes: HashMap<String, u64> = HashMap::new();
        let mut blob_refs: HashMap<String, usize> = HashMap::new();
        for entry in dir.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let is_alias = path.extension().is_some_and(|ext| ext == "ref");
            let blob = if is_alias {
                let Ok(alias) = fs::read_to_string(&path) else {
                    continue;
                };
                let alias = alias.trim().to_string();
                let size = fs::metadata(self.cas_dir(namespace).join(&alias))
                    .map(|m| m.len())
                    .unwrap_or(0);
                blob_sizes.insert(alias.clone(), size);
                *blob_refs.entry(alias.clone()).or_default() += 1;
                Some(alias)
            } else {
                None
            };
            key_files.push(KeyFile {
                path,
                mtime,
                blob,
                direct_size: if is_alias { 0 } else { metadata.len() },
            });
        }
        key_files.sort_by_key(|file| file.mtime);

        let mut total: u64 = key_files.iter().map(|file| file.direct_size).sum::<u64>()
            + blob_sizes.values().sum::<u64>();
        let mut remaining = key_files.len();

        for file in key_files {
            if remaining <= max_entries && total <= max_bytes {
                break;
            }
            let _ = fs::remove_file(&file.path);
            remaining -= 1;
            if let Some(blob) = file.blob {
                let count = blob_refs.entry(blob.clone()).or_default();
                *count = count.saturating_sub(1);
                if *count == 0 {
                    let _ = fs::remove_file(self.cas_dir(namespace).join(&blob));
                    total = total.saturating_sub(blob_sizes.get(&blob).copied().unwrap_or(0));
                }
            } else {
                total = total.saturating_sub(file.direct_size);
            }
        }
    }
}

impl SnapshotStore for FsStore {
    fn read(&self, request: &StoreReadRequest<'_>) -> Option<Vec<u8>> {
        let keys_dir = self.keys_dir(request.namespace);
        let name = digest(request.key);

        let direct = keys_dir.join(format!("{name}.bin"));
        if let Ok(bytes) = fs::read(&direct) {
            return Some(bytes);
        }

        let alias_path = keys_dir.join(format!("{name}.ref"));
        let alias = fs::read_to_string(&alias_path).ok()?;
        let alias = alias.trim().to_string();
        let bytes = fs::read(self.cas_dir(request.namespace).join(&alias)).ok()?;
        // Refresh the alias so LRU enforcement sees the access.
        let _ = fs::write(&alias_path, &alias);
        Some(bytes)
    }

    fn write(&self, request: &StoreWriteRequest<'_>, bytes: &[u8]) -> bool {
        let keys_dir = self.keys_dir(request.namespace);
        if let Err(err) = fs::create_dir_all(&keys_dir) {
            debug!("Snapshot store unavailable: {err}");
            return false;
        }
        let name = digest(request.key);

        let result = if request.content_addressed {
            let cas_dir = self.cas_dir(request.namespace);
            fs::create_dir_all(&cas_dir)
                .and_then(|()| {
                    let blob_digest = digest(bytes);
                    let blob_path = cas_dir.join(&blob_digest);
                    if !blob_path.exists() {
                        fs::write(&blob_path, bytes)?;
                    }
                    let _ = fs::remove_file(keys_dir.join(format!("{name}.bin")));
                    fs::write(keys_dir.join(format!("{name}.ref")), blob_digest)
                })
        } else {
            let _ = fs::remove_file(keys_dir.join(format!("{name}.ref")));
            fs::write(keys_dir.join(format!("{name}.bin")), bytes)
        };
        if let Err(err) = result {
            debug!("Failed to write snapshot store entry: {err}");
            return false;
        }

        self.enforce_limits(request.namespace, request.max_entries, request.max_bytes);
        true
    }

    fn clear(&self, namespace: Option<&str>) {
        let target = match namespace {
            Some(namespace) => self.root.join(namespace),
            None => self.root.clone(),
        };
        let _ = fs::remove_dir_all(target);
    }
}

/// An in-memory store for tests and stateless hosts. Ignores quotas and
/// content addressing.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self, request: &StoreReadRequest<'_>) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(&(request.namespace.to_string(), request.key.to_string()))
            .cloned()
    }

    fn write(&self, request: &StoreWriteRequest<'_>, bytes: &[u8]) -> bool {
        self.entries.lock().unwrap().insert(
            (request.namespace.to_string(), request.key.to_string()),
            bytes.to_vec(),
        );
        true
    }

    fn clear(&self, namespace: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        match namespace {
            Some(namespace) => entries.retain(|(ns, _), _| ns != namespace),
            None => entries.clear(),
        }
    }
}
