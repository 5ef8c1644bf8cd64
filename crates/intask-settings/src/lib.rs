//! # intask-settings
//!
//! Layered configuration for the inTask store and binary.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`InTaskSettings::default()`]
//! 2. **User file**: `~/.intask/settings.json` or `$INTASK_SETTINGS`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `INTASK_*` overrides (highest priority)
//!
//! Settings are loaded once at startup and handed to whoever needs them;
//! there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_dir, settings_path};
pub use types::*;
