//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each type implements [`Default`] with production values and is
//! marked `#[serde(default)]`, so a partial file only overrides what it names.

mod database;
mod logging;

pub use database::*;
pub use logging::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "database": { "path": "/var/lib/intask/intask.db", "poolMax": 32 },
///   "logging": { "level": "debug", "json": true }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InTaskSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name, used as the log target prefix.
    pub name: String,
    /// Store and connection pool.
    pub database: DatabaseSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for InTaskSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "intask".to_string(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl InTaskSettings {
    /// Reject combinations the individual fields cannot express.
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;
        if db.pool_max == 0 {
            return Err(SettingsError::Inconsistent("poolMax must be at least 1".into()));
        }
        if db.pool_min > db.pool_max {
            return Err(SettingsError::Inconsistent(format!(
                "poolMin {} exceeds poolMax {}",
                db.pool_min, db.pool_max
            )));
        }
        if db.path.trim().is_empty() {
            return Err(SettingsError::Inconsistent("database path is empty".into()));
        }
        Ok(())
    }
}
