//! Cache mode, limits, and their environment overrides.
//!
//! Precedence everywhere: caller option, then environment variable, then
//! default. The enable switch is the exception: the environment can turn
//! the cache off entirely, even for callers that asked for it.

use std::str::FromStr;

/// `0` or `false` (case-insensitive) disables the cache entirely.
pub const ENV_ENABLE: &str = "ENABLE_PROJECT_SNAPSHOT_CACHE";
pub const ENV_MODE: &str = "PROJECT_SNAPSHOT_CACHE_MODE";
pub const ENV_TTL_MS: &str = "PROJECT_SNAPSHOT_CACHE_TTL_MS";
pub const ENV_MAX_ENTRIES: &str = "PROJECT_SNAPSHOT_CACHE_MAX_ENTRIES";
pub const ENV_MAX_BYTES: &str = "PROJECT_SNAPSHOT_CACHE_MAX_BYTES";
pub const ENV_MAX_ENTRY_BYTES: &str = "PROJECT_SNAPSHOT_CACHE_MAX_ENTRY_BYTES";

pub const DEFAULT_MAX_ENTRIES: i64 = 12;
pub const DEFAULT_MAX_BYTES: i64 = 768 * 1024 * 1024;
pub const DEFAULT_MAX_ENTRY_BYTES: i64 = 256 * 1024 * 1024;

/// TTL for refs pinned to a commit.
pub const PINNED_TTL_MS: u64 = 30 * 60 * 1000;
/// TTL for branches, tags, and `HEAD`, which can move between fetches.
pub const MUTABLE_TTL_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Read and write.
    #[default]
    Default,
    /// Skip the read, write a fresh snapshot.
    Refresh,
    /// Skip both.
    Bypass,
}

impl FromStr for CacheMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "refresh" => Ok(Self::Refresh),
            "bypass" => Ok(Self::Bypass),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedConfig {
    pub(crate) enabled: bool,
    pub(crate) mode: CacheMode,
    pub(crate) ttl_ms: u64,
    pub(crate) max_entries: i64,
    pub(crate) max_bytes: i64,
    pub(crate) max_entry_bytes: i64,
}

impl ResolvedConfig {
    pub(crate) fn limits_usable(&self) -> bool {
        self.max_entries > 0 && self.max_bytes > 0 && self.max_entry_bytes > 0
    }
}

pub(crate) fn resolve(
    enabled: Option<bool>,
    mode: Option<CacheMode>,
    ttl_ms: Option<u64>,
    max_entries: Option<i64>,
    max_bytes: Option<i64>,
    max_entry_bytes: Option<i64>,
    mutable_ref: bool,
) -> ResolvedConfig {
    let default_ttl = if mutable_ref { MUTABLE_TTL_MS } else { PINNED_TTL_MS };
    ResolvedConfig {
        enabled: enabled.unwrap_or(true) && env_enabled(),
        mode: mode
            .or_else(|| std::env::var(ENV_MODE).ok().and_then(|s| s.parse().ok()))
            .unwrap_or_default(),
        ttl_ms: ttl_ms
            .or_else(|| env_number(ENV_TTL_MS).map(|n| n.max(0) as u64))
            .unwrap_or(default_ttl),
        max_entries: max_entries
            .or_else(|| env_number(ENV_MAX_ENTRIES))
            .unwrap_or(DEFAULT_MAX_ENTRIES),
        max_bytes: max_bytes
            .or_else(|| env_number(ENV_MAX_BYTES))
            .unwrap_or(DEFAULT_MAX_BYTES),
        max_entry_bytes: max_entry_bytes
            .or_else(|| env_number(ENV_MAX_ENTRY_BYTES))
            .unwrap_or(DEFAULT_MAX_ENTRY_BYTES),
    }
}

fn env_enabled() -> bool {
    match std::env::var(ENV_ENABLE) {
        Ok(value) => {
            let value = value.trim().to_ascii_lowercase();
            value != "0" && value != "false"
        }
        Err(_) => true,
    }
}

/// Numeric overrides are parsed as finite numbers; anything else falls back
/// to the default.
fn env_number(name: &str) -> Option<i64> {
    let raw = std::env::var(name).ok()?;
    let parsed: f64 = raw.trim().parse().ok()?;
    parsed.is_finite().then_some(parsed as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("REFRESH".parse::<CacheMode>(), Ok(CacheMode::Refresh));
        assert_eq!("bypass".parse::<CacheMode>(), Ok(CacheMode::Bypass));
        assert!("unknown".parse::<CacheMode>().is_err());
    }

    #[test]
    fn env_disables_even_when_caller_enables() {
        temp_env::with_var(ENV_ENABLE, Some("false"), || {
            let config = resolve(Some(true), None, None, None, None, None, true);
            assert!(!config.enabled);
        });
        temp_env::with_var(ENV_ENABLE, Some("0"), || {
            let config = resolve(None, None, None, None, None, None, true);
            assert!(!config.enabled);
        });
    }

    #[test]
    fn caller_limits_override_environment() {
        temp_env::with_var(ENV_MAX_ENTRIES, Some("3"), || {
            let config = resolve(None, None, None, Some(7), None, None, true);
            assert_eq!(config.max_entries, 7);
            let config = resolve(None, None, None, None, None, None, true);
            assert_eq!(config.max_entries, 3);
        });
    }

    #[test]
    fn unparsable_env_numbers_fall_back() {
        temp_env::with_var(ENV_TTL_MS, Some("not-a-number"), || {
            let config = resolve(None, None, None, None, None, None, false);
            assert_eq!(config.ttl_ms, PINNED_TTL_MS);
        });
        temp_env::with_var(ENV_TTL_MS, Some("NaN"), || {
            let config = resolve(None, None, None, None, None, None, true);
            assert_eq!(config.ttl_ms, MUTABLE_TTL_MS);
        });
    }

    #[test]
    fn ttl_defaults_follow_ref_mutability() {
        let pinned = resolve(None, None, None, None, None, None, false);
        assert_eq!(pinned.ttl_ms, PINNED_TTL_MS);
        let mutable = resolve(None, None, None, None, None, None, true);
        assert_eq!(mutable.ttl_ms, MUTABLE_TTL_MS);
    }
}
