//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`InTaskSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `INTASK_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! The settings file is `$INTASK_SETTINGS` when set, otherwise
//! `~/.intask/settings.json`.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{InTaskSettings, LogLevel};

/// Env var naming an explicit settings file.
pub const SETTINGS_ENV: &str = "INTASK_SETTINGS";

/// Directory holding the settings file and, by default, the database.
pub fn settings_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".intask")
}

/// Resolve the path to the settings file.
pub fn settings_path() -> PathBuf {
    read_env_string(SETTINGS_ENV)
        .map_or_else(|| settings_dir().join("settings.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<InTaskSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<InTaskSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file(path: &Path) -> Result<InTaskSettings> {
    let defaults = serde_json::to_value(InTaskSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored, keeping the file/default value.
pub fn apply_env_overrides(settings: &mut InTaskSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`, so tests need not touch the
/// process environment.
pub fn apply_overrides(settings: &mut InTaskSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = env.string("INTASK_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = env.u32("INTASK_POOL_MAX", 1, 1024) {
        settings.database.pool_max = v;
    }
    if let Some(v) = env.u32("INTASK_POOL_MIN", 0, 1024) {
        settings.database.pool_min = v;
    }
    if let Some(v) = env.u32("INTASK_BUSY_TIMEOUT_MS", 0, 600_000) {
        settings.database.busy_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.log_level("INTASK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("INTASK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, min, max, "invalid u32 env var, ignoring");
        }
        result
    }

    fn log_level(&self, name: &str) -> Option<LogLevel> {
        let val = (self.lookup)(name)?;
        let result = LogLevel::parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid log level env var, ignoring");
        }
        result
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "database": {"poolMax": 20, "path": "intask.db"}
        });
        let source = serde_json::json!({
            "database": {"poolMax": 40}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["database"]["poolMax"], 40);
        assert_eq!(merged["database"]["path"], "intask.db");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.database.pool_max, 20);
        assert_eq!(settings.logging.level, LogLevel::Info);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"database": {"poolMax": 12}, "logging": {"json": true}}"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.database.pool_max, 12);
        assert_eq!(settings.database.pool_min, 4);
        assert!(settings.logging.json);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Malformed(_)));
    }

    #[test]
    fn unreadable_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        match load_file(dir.path()).unwrap_err() {
            SettingsError::Read { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("expected a read error, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_inverted_pool_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"database": {"poolMax": 2, "poolMin": 3}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Inconsistent(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = InTaskSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("INTASK_DB_PATH", "/data/tasks.db"),
                ("INTASK_POOL_MAX", "64"),
                ("INTASK_POOL_MIN", "8"),
                ("INTASK_BUSY_TIMEOUT_MS", "1000"),
                ("INTASK_LOG_LEVEL", "debug"),
                ("INTASK_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.database.path, "/data/tasks.db");
        assert_eq!(settings.database.pool_max, 64);
        assert_eq!(settings.database.pool_min, 8);
        assert_eq!(settings.database.busy_timeout_ms, 1000);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = InTaskSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("INTASK_DB_PATH", ""),
                ("INTASK_POOL_MAX", "0"),
                ("INTASK_POOL_MIN", "lots"),
                ("INTASK_LOG_LEVEL", "chatty"),
                ("INTASK_LOG_JSON", "perhaps"),
            ]),
        );
        let defaults = InTaskSettings::default();
        assert_eq!(settings.database.path, defaults.database.path);
        assert_eq!(settings.database.pool_max, defaults.database.pool_max);
        assert_eq!(settings.database.pool_min, defaults.database.pool_min);
        assert_eq!(settings.logging.level, defaults.logging.level);
        assert!(!settings.logging.json);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "Yes"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("20", 1, 1024), Some(20));
        assert_eq!(parse_u32_range("1024", 1, 1024), Some(1024));
        assert_eq!(parse_u32_range("0", 1, 1024), None);
        assert_eq!(parse_u32_range("2000", 1, 1024), None);
        assert_eq!(parse_u32_range("-5", 0, 1024), None);
    }
}
