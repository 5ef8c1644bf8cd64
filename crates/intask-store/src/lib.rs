//! # intask-store
//!
//! Groups, tasks and activities persisted in `SQLite`:
//!
//! - **Position keys**: every group membership and task membership carries a
//!   rational `p/q` key, placed by the position engine inside the writing
//!   transaction
//! - **Visibility**: recursive closure over the group hierarchy, applied to
//!   every read and write
//! - **Lifecycle managers**: one transaction per request, returning the rows
//!   the caller shows
//! - **Activity timeline**: open/close/pause rules tying activities to task
//!   status
//! - **Migrations**: version-tracked SQL schema

#![deny(unsafe_code)]

pub mod errors;
pub mod manager;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use manager::{
    ActivityManager, GroupManager, InTask, RenumberReport, StoreHealth, TaskManager, UserManager,
};
pub use sqlite::{ConnectionConfig, ConnectionPool, close, new_file, new_in_memory};
