//! `SQLite` backend for the store.
//!
//! # Architecture
//!
//! - **[`connection`]**: `r2d2` connection pool with WAL mode, foreign keys and
//!   performance pragmas applied to every connection.
//! - **[`migrations`]**: Version-tracked schema, embedded at compile time.
//! - **[`query`]**: Named filter predicates with bound parameters.
//! - **[`visibility`]**: Recursive group visibility closure.
//! - **[`row_types`]**: Row structs for `rusqlite` row mapping.
//! - **[`repositories`]**: Stateless repository structs. Each method takes a
//!   `&Connection` and runs inside the caller's transaction.

pub mod connection;
pub mod migrations;
pub mod query;
pub mod repositories;
pub mod row_types;
pub mod visibility;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, close, new_file,
    new_in_memory, verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
pub use row_types::{ActivityRecord, ActivityRow, GroupRow, TaskRow, UserRow};
