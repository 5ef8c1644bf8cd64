//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`.
//! Multi-row operations (placing a group, moving a task across groups,
//! opening an activity) are written as single methods that the manager calls
//! inside one transaction, so they either apply fully or not at all.
//!
//! Repositories do not check visibility. That is the managers' job.

pub mod activity;
pub mod group;
pub mod position;
pub mod task;
pub mod user;
