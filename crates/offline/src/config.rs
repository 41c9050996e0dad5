//! Runtime configuration, read from the environment.

use std::path::PathBuf;

use anyhow::Context;

/// Default number of rejected replays after which a queued action is dropped.
pub const DEFAULT_MAX_REPLAY_ATTEMPTS: u32 = 5;

/// Where the local cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub cache: CacheLocation,
    /// Rejections a queued action survives before it is dropped (and logged).
    pub max_replay_attempts: u32,
    /// Connectivity assumed at startup, before the environment reports anything.
    pub start_online: bool,
}

impl SyncConfig {
    /// Load from `SHOPSYNC_CACHE_PATH`, `SHOPSYNC_MAX_REPLAY_ATTEMPTS` and
    /// `SHOPSYNC_START_ONLINE`, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let cache = match std::env::var("SHOPSYNC_CACHE_PATH") {
            Ok(path) if path == ":memory:" => CacheLocation::InMemory,
            Ok(path) => CacheLocation::File(PathBuf::from(path)),
            Err(_) => CacheLocation::File(default_cache_path()?),
        };

        let max_replay_attempts = match std::env::var("SHOPSYNC_MAX_REPLAY_ATTEMPTS") {
            Ok(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("SHOPSYNC_MAX_REPLAY_ATTEMPTS is not a number: {raw:?}"))?
                .max(1),
            Err(_) => DEFAULT_MAX_REPLAY_ATTEMPTS,
        };

        let start_online = std::env::var("SHOPSYNC_START_ONLINE")
            .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            cache,
            max_replay_attempts,
            start_online,
        })
    }

    /// In-memory cache, online at start. Used by tests and the demo.
    pub fn in_memory() -> Self {
        Self {
            cache: CacheLocation::InMemory,
            max_replay_attempts: DEFAULT_MAX_REPLAY_ATTEMPTS,
            start_online: true,
        }
    }

    pub fn with_max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = attempts.max(1);
        self
    }

    pub fn starting_offline(mut self) -> Self {
        self.start_online = false;
        self
    }
}

/// Resolve the default cache database path:
/// `{app_data_dir}/shopsync/cache.db`.
fn default_cache_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|mut h| {
            h.push(".local");
            h.push("share");
            h
        }))
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("shopsync");
    path.push("cache.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_attempts() {
        let config = SyncConfig::in_memory().with_max_replay_attempts(0).starting_offline();
        assert_eq!(config.max_replay_attempts, 1);
        assert!(!config.start_online);
        assert_eq!(config.cache, CacheLocation::InMemory);
    }
}
