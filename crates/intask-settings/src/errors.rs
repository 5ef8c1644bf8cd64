//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The file is not JSON, or a field has the wrong type.
    #[error("malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The merged settings break a cross-field rule.
    #[error("inconsistent settings: {0}")]
    Inconsistent(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/intask/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/intask/settings.json: denied");
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        let json_err = serde_json::from_str::<u32>("\"twenty\"").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Malformed(_)));
    }
}
