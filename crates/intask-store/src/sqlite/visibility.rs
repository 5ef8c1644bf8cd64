//! Recursive visibility closure over the group hierarchy.
//!
//! A user sees a group through a membership row of their own or of the
//! public user (`user_id = 0`) whose `user_type` does not exceed the group's
//! `reading` threshold. Visibility then flows down to child groups, carrying
//! the membership's `user_type` along and stopping wherever a child's
//! `reading` threshold is stricter. The closure is a `WITH RECURSIVE ...
//! UNION` query, which stops once no new `(group, user_type)` pair appears.
//!
//! An operation is allowed on a group in the closure when all threshold
//! columns of its [`Access`] are `>= user_type` for at least one path.
//!
//! Every statement built here binds the user id as `?1`.

use std::collections::BTreeSet;

use intask_core::Access;
use intask_core::access::PUBLIC_USER;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::errors::{Result, StoreError};

/// Common table expressions `visible(group_id, user_type)` and
/// `allowed(group_id)` for `access`, ready to prefix a `SELECT`.
pub fn allowed_cte(access: Access) -> String {
    let checks: Vec<String> = access
        .threshold_columns()
        .iter()
        .map(|col| format!("g.{col} >= v.user_type"))
        .collect();
    format!(
        "WITH RECURSIVE visible(group_id, user_type) AS (
             SELECT gl.group_id, gl.user_type
             FROM groups_list AS gl
             JOIN groups AS g ON g.id = gl.group_id
             WHERE (gl.user_id = {PUBLIC_USER} OR gl.user_id = ?1)
               AND g.reading >= gl.user_type
             UNION
             SELECT g.id, v.user_type
             FROM groups AS g
             JOIN visible AS v ON g.parent = v.group_id
             WHERE g.reading >= v.user_type
         ),
         allowed(group_id) AS (
             SELECT DISTINCT v.group_id
             FROM visible AS v
             JOIN groups AS g ON g.id = v.group_id
             WHERE {}
         )",
        checks.join(" AND ")
    )
}

/// Set of group ids `user_id` may perform `access` on.
pub fn visible_groups(conn: &Connection, user_id: i64, access: Access) -> Result<BTreeSet<String>> {
    let sql = format!("{} SELECT group_id FROM allowed", allowed_cte(access));
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    debug!(user_id, ?access, count = ids.len(), "resolved visible groups");
    Ok(ids)
}

/// Whether `user_id` may perform `access` on `group_id`.
pub fn can_access(conn: &Connection, user_id: i64, group_id: &str, access: Access) -> Result<bool> {
    let sql = format!(
        "{} SELECT 1 FROM allowed WHERE group_id = ?2",
        allowed_cte(access)
    );
    let found = conn
        .query_row(&sql, params![user_id, group_id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Fail with [`StoreError::PermissionDenied`] unless `user_id` may perform
/// `access` on `group_id`.
///
/// A group that does not exist is reported the same way.
pub fn require(conn: &Connection, user_id: i64, group_id: &str, access: Access) -> Result<()> {
    if can_access(conn, user_id, group_id, access)? {
        Ok(())
    } else {
        debug!(user_id, group_id, ?access, "access denied");
        Err(StoreError::PermissionDenied)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
