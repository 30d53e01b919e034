//! The in-memory tier: a process-wide LRU over encoded cache records.
//!
//! Ordering is by insertion: an access re-inserts the entry at the tail,
//! and eviction pops from the head until both the entry and byte budgets
//! hold. The map and its byte counter are module-scoped state; tests reset
//! them through [`reset_memory_cache`].

use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use indexmap::IndexMap;

static MEMORY: LazyLock<Mutex<MemoryCache>> = LazyLock::new(|| {
    Mutex::new(MemoryCache {
        entries: IndexMap::new(),
        total_bytes: 0,
    })
});

struct MemoryCache {
    entries: IndexMap<String, MemoryEntry>,
    total_bytes: u64,
}

#[derive(Clone)]
struct MemoryEntry {
    bytes: Arc<Vec<u8>>,
    stored_at: i64,
}

/// Entry count and byte total of the in-memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

fn lock() -> std::sync::MutexGuard<'static, MemoryCache> {
    MEMORY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch a fresh entry, moving it to most-recently-used. A stale entry is
/// dropped on the spot. `ttl_ms == 0` means entries never expire.
pub(crate) fn lookup(key: &str, ttl_ms: u64, now_ms: i64) -> Option<Arc<Vec<u8>>> {
    let mut cache = lock();
    let entry = cache.entries.get(key)?.clone();
    let age = now_ms.saturating_sub(entry.stored_at);
    if ttl_ms != 0 && age > ttl_ms as i64 {
        cache.remove(key);
        return None;
    }
    // Touch: re-insert at the tail.
    cache.entries.shift_remove(key);
    cache.entries.insert(key.to_string(), entry.clone());
    Some(entry.bytes)
}

pub(crate) fn insert(
    key: &str,
    bytes: Arc<Vec<u8>>,
    stored_at: i64,
    max_entries: usize,
    max_bytes: u64,
) {
    let mut cache = lock();
    cache.remove(key);
    cache.total_bytes += bytes.len() as u64;
    cache
        .entries
        .insert(key.to_string(), MemoryEntry { bytes, stored_at });

    while !cache.entries.is_empty()
        && (cache.entries.len() > max_entries || cache.total_bytes > max_bytes)
    {
        if let Some((_, evicted)) = cache.entries.shift_remove_index(0) {
            cache.total_bytes = cache.total_bytes.saturating_sub(evicted.bytes.len() as u64);
        }
    }
}

impl MemoryCache {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.shift_remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(entry.bytes.len() as u64);
        }
    }
}

/// Drop every in-memory entry. Test hook.
pub fn reset_memory_cache() {
    let mut cache = lock();
    cache.entries.clear();
    cache.total_bytes = 0;
}

pub fn memory_cache_stats() -> MemoryCacheStats {
    let cache = lock();
    MemoryCacheStats {
        entries: cache.entries.len(),
        total_bytes: cache.total_bytes,
    }
}
