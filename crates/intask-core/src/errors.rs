//! Error types for the storage-independent core.
//!
//! The store crate folds each of these into its own error taxonomy; they are
//! kept separate here so the pure algorithms stay testable without a database.

use thiserror::Error;

/// A request condition was missing or malformed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// A required condition is absent or empty.
    #[error("WrongMustCondition:{0}")]
    Missing(String),

    /// An optional condition is present but explicitly `false`.
    #[error("WrongCondition:{0}")]
    Wrong(String),

    /// A condition is present but cannot be interpreted.
    #[error("invalid <{parameter}>: {reason}")]
    Malformed {
        /// Condition name.
        parameter: String,
        /// What was wrong with the value.
        reason: String,
    },
}

impl ConditionError {
    /// Name of the offending condition.
    pub fn parameter(&self) -> &str {
        match self {
            Self::Missing(name) | Self::Wrong(name) => name,
            Self::Malformed { parameter, .. } => parameter,
        }
    }

    pub(crate) fn malformed(parameter: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}

/// The position engine could not place an element.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PositionError {
    /// The target scope (group or parent task) does not exist.
    #[error("scope not found: {0}")]
    ScopeNotFound(String),

    /// The sibling used as a before/after reference is not in the scope.
    #[error("reference sibling not found in scope: {0}")]
    ReferenceNotFound(String),

    /// The scope holds more siblings than renumbering can space out.
    #[error("scope has too many siblings to renumber: {len}")]
    ScopeFull {
        /// Number of siblings in the scope.
        len: usize,
    },

    /// A stored key has a non-positive term.
    #[error("invalid order key {p}/{q}")]
    InvalidKey {
        /// Numerator.
        p: i64,
        /// Denominator.
        q: i64,
    },
}

/// A requested activity status does not follow from the current one.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cannot move activity status from {from} to {to}")]
pub struct TransitionError {
    /// Current status label (`none` when the task has no activity yet).
    pub from: String,
    /// Requested status label.
    pub to: String,
}
