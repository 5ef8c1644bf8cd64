//! # intask-core
//!
//! Storage-independent building blocks shared by the inTask crates:
//!
//! - **[`position`]**: rational `p/q` order keys and the sibling position engine
//! - **[`access`]**: membership access levels and per-group thresholds
//! - **[`status`]**: activity statuses and the allowed status transitions
//! - **[`conditions`]**: the request condition bag handed over by the API layer
//! - **[`ids`]**: 8-char element keys, parent references and timestamps

#![deny(unsafe_code)]

pub mod access;
pub mod conditions;
pub mod errors;
pub mod ids;
pub mod position;
pub mod status;

pub use access::{Access, ElementType, Operation, Subject, Thresholds};
pub use conditions::Conditions;
pub use errors::{ConditionError, PositionError, TransitionError};
pub use ids::Parent;
pub use position::{OrderKey, Placement, PositionPlan, Sibling};
pub use status::ActivityStatus;
