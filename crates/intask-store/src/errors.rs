//! Error types for the store.
//!
//! [`StoreError`] is returned by every store operation. Each variant maps to
//! an HTTP-like status and a machine-readable name through
//! [`StoreError::status`] and [`StoreError::name`], which the API layer hands
//! to its clients unchanged. Store faults keep their cause for logging but
//! never expose it through [`StoreError::public_message`].

use intask_core::{ConditionError, PositionError, TransitionError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A request condition was missing or malformed.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// A business rule rejected the request.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested activity status does not follow from the current one.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The element is not visible to the user, or does not exist.
    #[error("permission denied")]
    PermissionDenied,

    /// An update named no field the entity allows to change.
    #[error("no updatable field in request body")]
    WrongBody,

    /// A delete or move was blocked by child elements.
    #[error("element still has children: {0}")]
    HasElements(String),

    /// The position engine could not place the element.
    #[error("position conflict: {0}")]
    Conflict(#[from] PositionError),

    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Build a [`StoreError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP-like status: 400 for request and business errors, 500 for store
    /// faults.
    pub fn status(&self) -> u16 {
        if self.is_store_fault() { 500 } else { 400 }
    }

    /// Machine-readable error name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Condition(_) | Self::Validation(_) | Self::Transition(_) => "ValidationError",
            Self::PermissionDenied => "PermissionDenied",
            Self::WrongBody => "WrongBody",
            Self::HasElements(_) => "HasElements",
            Self::Conflict(_) => "Conflict",
            Self::Sqlite(_) | Self::Pool(_) | Self::Serde(_) | Self::Migration { .. } => {
                "DatabaseError"
            }
        }
    }

    /// Message safe to show to the end caller.
    pub fn public_message(&self) -> String {
        if self.is_store_fault() {
            self.name().to_string()
        } else {
            self.to_string()
        }
    }

    /// Whether this is an underlying store fault rather than a rejected
    /// request.
    pub fn is_store_fault(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(_) | Self::Pool(_) | Self::Serde(_) | Self::Migration { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_error_is_a_validation_error() {
        let err: StoreError = ConditionError::Missing("group_id".into()).into();
        assert_eq!(err.status(), 400);
        assert_eq!(err.name(), "ValidationError");
        assert_eq!(err.public_message(), "WrongMustCondition:group_id");
    }

    #[test]
    fn permission_denied_reveals_nothing() {
        let err = StoreError::PermissionDenied;
        assert_eq!(err.status(), 400);
        assert_eq!(err.name(), "PermissionDenied");
        assert_eq!(err.public_message(), "permission denied");
    }

    #[test]
    fn business_errors_are_400() {
        for err in [
            StoreError::WrongBody,
            StoreError::HasElements("abcd1234".into()),
            StoreError::validation("start precedes open activity"),
            StoreError::Conflict(PositionError::ReferenceNotFound("x".into())),
        ] {
            assert_eq!(err.status(), 400, "{err}");
        }
    }

    #[test]
    fn names_match_taxonomy() {
        assert_eq!(StoreError::WrongBody.name(), "WrongBody");
        assert_eq!(StoreError::HasElements("g".into()).name(), "HasElements");
        assert_eq!(
            StoreError::Conflict(PositionError::ScopeFull { len: 1 }).name(),
            "Conflict"
        );
        let transition = TransitionError {
            from: "started".into(),
            to: "continued".into(),
        };
        assert_eq!(StoreError::from(transition).name(), "ValidationError");
    }

    #[test]
    fn sqlite_error_hides_cause() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.status(), 500);
        assert_eq!(err.name(), "DatabaseError");
        assert_eq!(err.public_message(), "DatabaseError");
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn migration_error_display() {
        let err = StoreError::Migration {
            message: "v001 failed: table already exists".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration error: v001 failed: table already exists"
        );
        assert!(err.is_store_fault());
    }

    #[test]
    fn from_rusqlite_error() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
