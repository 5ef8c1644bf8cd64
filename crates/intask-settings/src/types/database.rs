//! Store and connection pool settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// `SQLite` store and pool configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Database file. Relative paths resolve against the settings directory.
    pub path: String,
    /// Maximum pooled connections.
    pub pool_max: u32,
    /// Idle connections kept open.
    pub pool_min: u32,
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u32,
    /// Page cache per connection, in KiB.
    pub cache_size_kib: i64,
    /// How long a request waits for a free pooled connection, in milliseconds.
    pub connection_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "intask.db".to_string(),
            pool_max: 20,
            pool_min: 4,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
            connection_timeout_ms: 5000,
        }
    }
}

impl DatabaseSettings {
    /// Absolute database path, resolving a relative `path` against `base`.
    pub fn resolve_path(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}
