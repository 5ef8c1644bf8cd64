//! Groups and group memberships.
//!
//! Group order keys live on the membership rows: each member orders the
//! groups they belong to within their own `(user, parent)` scope.

use intask_core::access::OWNER_LEVEL;
use intask_core::ids::{generate_id, now_timestamp};
use intask_core::{Access, OrderKey, Parent, Placement, Thresholds};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::position::{PositionRepo, Scope};
use crate::errors::{Result, StoreError};
use crate::sqlite::query::{Page, Predicates, params_with};
use crate::sqlite::row_types::GroupRow;
use crate::sqlite::visibility::allowed_cte;

/// Fields of a group to create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewGroup {
    /// Parent group, `None` for top level.
    pub parent: Option<String>,
    /// Display name.
    pub name: String,
    /// 1 for personal groups.
    pub group_type: i64,
    /// Access thresholds, column defaults when `None`.
    pub thresholds: Option<Thresholds>,
}

/// Filters for [`GroupRepo::list`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupFilter {
    /// Only these groups.
    pub ids: Option<Vec<String>>,
    /// Only children of this parent.
    pub parent: Option<Parent>,
    /// Only groups this other user is a member of.
    pub member: Option<i64>,
    /// Only groups of this type.
    pub group_type: Option<i64>,
    /// Substring of the name.
    pub like: Option<String>,
    /// Listing window.
    pub page: Page,
}

/// Outcome of [`GroupRepo::delete`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DeletedGroup {
    /// Group key.
    pub id: String,
    /// The caller only left the group; it still exists for other members.
    pub left: bool,
    /// Activities removed with the group.
    pub activities: Vec<String>,
}

/// A membership row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Membership {
    /// Access level.
    pub user_type: i64,
    /// Order key in the member's scope.
    pub key: OrderKey,
}

/// Group repository.
pub struct GroupRepo;

impl GroupRepo {
    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// A group as seen by `user_id`, without visibility filtering.
    pub fn get(conn: &Connection, user_id: i64, id: &str) -> Result<Option<GroupRow>> {
        let sql = format!(
            "SELECT {}
             FROM groups AS g
             LEFT JOIN groups_list AS gl ON gl.group_id = g.id AND gl.user_id = ?1
             WHERE g.id = ?2",
            GroupRow::COLUMNS
        );
        let row = conn
            .query_row(&sql, params![user_id, id], GroupRow::from_row)
            .optional()?;
        Ok(row)
    }

    /// Groups visible to `user_id`, ordered by parent and then by the
    /// caller's order key. Groups seen without an own membership sort last
    /// within their parent.
    pub fn list(conn: &Connection, user_id: i64, filter: &GroupFilter) -> Result<Vec<GroupRow>> {
        let mut preds = Predicates::starting_at(2);
        if let Some(ids) = &filter.ids {
            let _ = preds.in_list("ids", "g.id", ids.clone());
        }
        if let Some(parent) = &filter.parent {
            let _ = preds.is("parent", "g.parent", parent.as_id().map(str::to_string));
        }
        if let Some(member) = filter.member {
            let _ = preds.push("member", member, |p| {
                format!(
                    "EXISTS (SELECT 1 FROM groups_list AS m \
                     WHERE m.group_id = g.id AND m.user_id = {p})"
                )
            });
        }
        if let Some(group_type) = filter.group_type {
            let _ = preds.eq("group_type", "g.group_type", group_type);
        }
        if let Some(like) = &filter.like {
            let _ = preds.contains_text("like", &["g.name"], like);
        }
        let window = filter.page.clause(&mut preds);

        let sql = format!(
            "{cte}
             SELECT {columns}
             FROM groups AS g
             JOIN allowed AS a ON a.group_id = g.id
             LEFT JOIN groups_list AS gl ON gl.group_id = g.id AND gl.user_id = ?1
             WHERE 1 {filters}
             ORDER BY g.parent IS NOT NULL, g.parent, gl.p IS NULL, CAST(gl.p AS REAL) / gl.q, g.id
             {window}",
            cte = allowed_cte(Access::GROUP_READ),
            columns = GroupRow::COLUMNS,
            filters = preds.and_clause(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let params = params_with(&[&user_id], &preds);
        let rows = stmt
            .query_map(params.as_slice(), GroupRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(user_id, filters = ?preds.names(), count = rows.len(), "listed groups");
        Ok(rows)
    }

    /// The membership of `user_id` in `group_id`.
    pub fn membership(
        conn: &Connection,
        group_id: &str,
        user_id: i64,
    ) -> Result<Option<Membership>> {
        let row: Option<(i64, i64, i64)> = conn
            .query_row(
                "SELECT user_type, p, q FROM groups_list WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((user_type, p, q)) => Ok(Some(Membership {
                user_type,
                key: OrderKey::new(p, q)?,
            })),
            None => Ok(None),
        }
    }

    /// The parent of a group: `None` when the group does not exist,
    /// `Some(None)` at top level.
    pub fn parent_of(conn: &Connection, id: &str) -> Result<Option<Option<String>>> {
        let parent = conn
            .query_row("SELECT parent FROM groups WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(parent)
    }

    /// Owner of a group.
    pub fn owner_of(conn: &Connection, id: &str) -> Result<Option<i64>> {
        let owner = conn
            .query_row("SELECT owner FROM groups WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(owner)
    }

    /// Whether `candidate` is `ancestor` itself or lies below it.
    pub fn is_within(conn: &Connection, ancestor: &str, candidate: &str) -> Result<bool> {
        let found = conn
            .query_row(
                "WITH RECURSIVE below(id) AS (
                     SELECT ?1
                     UNION
                     SELECT g.id FROM groups AS g JOIN below AS b ON g.parent = b.id
                 )
                 SELECT 1 FROM below WHERE id = ?2",
                params![ancestor, candidate],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of ancestors above a group, `None` if it does not exist.
    pub fn depth(conn: &Connection, id: &str) -> Result<Option<i64>> {
        let depth = conn.query_row(
            "WITH RECURSIVE up(id, parent, depth) AS (
                 SELECT id, parent, 0 FROM groups WHERE id = ?1
                 UNION
                 SELECT g.id, g.parent, up.depth + 1
                 FROM groups AS g JOIN up ON g.id = up.parent
             )
             SELECT MAX(depth) FROM up",
            params![id],
            |row| row.get(0),
        )?;
        Ok(depth)
    }

    /// Number of child groups of `id` visible to `user_id`.
    pub fn child_count(conn: &Connection, user_id: i64, id: &str) -> Result<i64> {
        let sql = format!(
            "{} SELECT COUNT(*) FROM groups AS g JOIN allowed AS a ON a.group_id = g.id
             WHERE g.parent = ?2",
            allowed_cte(Access::GROUP_READ)
        );
        Ok(conn.query_row(&sql, params![user_id, id], |row| row.get(0))?)
    }

    /// Why a group cannot be deleted, if anything blocks it.
    pub fn blocking_elements(conn: &Connection, id: &str) -> Result<Option<String>> {
        let (tasks, groups): (i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM tasks_list WHERE group_id = ?1),
                    (SELECT COUNT(*) FROM groups WHERE parent = ?1)",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match (tasks, groups) {
            (0, 0) => None,
            (0, n) => Some(format!("group {id} has {n} child groups")),
            (n, _) => Some(format!("group {id} has {n} tasks")),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Create a group owned by `user_id` with an owner membership placed in
    /// the user's scope under the parent. Returns the new key.
    pub fn add_group(
        conn: &Connection,
        user_id: i64,
        group: &NewGroup,
        placement: &Placement,
    ) -> Result<String> {
        let parent = group.parent.as_deref();
        let key = PositionRepo::place(conn, Scope::Groups { user_id, parent }, None, placement)?;
        let id = generate_id();
        let t = group.thresholds.unwrap_or_default();

        let _ = conn.execute(
            "INSERT INTO groups (id, parent, name, group_type, owner,
               creating, reading, updating, deleting,
               el_creating, el_reading, el_updating, el_deleting, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id,
                parent,
                group.name,
                group.group_type,
                user_id,
                t.creating,
                t.reading,
                t.updating,
                t.deleting,
                t.el_creating,
                t.el_reading,
                t.el_updating,
                t.el_deleting,
                now_timestamp(),
            ],
        )?;
        let _ = conn.execute(
            "INSERT INTO groups_list (group_id, user_id, user_type, p, q) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, user_id, OWNER_LEVEL, key.p, key.q],
        )?;
        info!(user_id, group_id = %id, key = %key, "group created");
        Ok(id)
    }

    /// Give `user_id` a membership in `group_id`, placed in their own scope.
    ///
    /// An existing membership only has its `user_type` changed.
    pub fn add_member(
        conn: &Connection,
        group_id: &str,
        user_id: i64,
        user_type: i64,
        placement: &Placement,
    ) -> Result<()> {
        if Self::membership(conn, group_id, user_id)?.is_some() {
            let _ = conn.execute(
                "UPDATE groups_list SET user_type = ?1 WHERE group_id = ?2 AND user_id = ?3",
                params![user_type, group_id, user_id],
            )?;
            return Ok(());
        }
        let parent = Self::parent_of(conn, group_id)?
            .ok_or(StoreError::PermissionDenied)?;
        let scope = Scope::Groups {
            user_id,
            parent: parent.as_deref(),
        };
        let key = PositionRepo::place(conn, scope, None, placement)?;
        let _ = conn.execute(
            "INSERT INTO groups_list (group_id, user_id, user_type, p, q) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![group_id, user_id, user_type, key.p, key.q],
        )?;
        info!(user_id, group_id, user_type, "member added");
        Ok(())
    }

    /// Rename a group.
    pub fn rename(conn: &Connection, id: &str, name: &str) -> Result<()> {
        let _ = conn.execute(
            "UPDATE groups SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        Ok(())
    }

    /// Move a group within the caller's list, optionally under a new parent.
    ///
    /// Other members keep their relative order; when the parent changes the
    /// group goes to the tail of their new scope. Returns whether the parent
    /// changed.
    pub fn reorder(
        conn: &Connection,
        user_id: i64,
        id: &str,
        new_parent: Option<&Parent>,
        placement: &Placement,
    ) -> Result<bool> {
        let current = Self::parent_of(conn, id)?.ok_or(StoreError::PermissionDenied)?;
        if Self::membership(conn, id, user_id)?.is_none() {
            return Err(StoreError::PermissionDenied);
        }

        let target = match new_parent {
            Some(parent) => parent.as_id().map(str::to_string),
            None => current.clone(),
        };
        let parent_changed = target != current;

        if parent_changed {
            if let Some(target) = target.as_deref() {
                if Self::is_within(conn, id, target)? {
                    return Err(StoreError::validation(format!(
                        "group {id} cannot move under its own descendant {target}"
                    )));
                }
            }
            let _ = conn.execute(
                "UPDATE groups SET parent = ?1 WHERE id = ?2",
                params![target, id],
            )?;

            let others: Vec<i64> = conn
                .prepare("SELECT user_id FROM groups_list WHERE group_id = ?1 AND user_id <> ?2")?
                .query_map(params![id, user_id], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            for other in others {
                let scope = Scope::Groups {
                    user_id: other,
                    parent: target.as_deref(),
                };
                let key = PositionRepo::place(conn, scope, Some(id), &Placement::Tail)?;
                PositionRepo::write_key(conn, scope, id, key)?;
            }
        }

        let scope = Scope::Groups {
            user_id,
            parent: target.as_deref(),
        };
        let key = PositionRepo::place(conn, scope, Some(id), placement)?;
        PositionRepo::write_key(conn, scope, id, key)?;
        info!(user_id, group_id = id, parent_changed, key = %key, "group reordered");
        Ok(parent_changed)
    }

    /// Delete a group owned by `user_id`, or leave it otherwise.
    ///
    /// The owner may only delete a group without tasks and child groups;
    /// activities still filed under it are removed with it.
    pub fn delete(conn: &Connection, user_id: i64, id: &str) -> Result<DeletedGroup> {
        let owner = Self::owner_of(conn, id)?.ok_or(StoreError::PermissionDenied)?;

        if owner != user_id {
            let removed = conn.execute(
                "DELETE FROM groups_list WHERE group_id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            if removed == 0 {
                return Err(StoreError::PermissionDenied);
            }
            info!(user_id, group_id = id, "left group");
            return Ok(DeletedGroup {
                id: id.to_string(),
                left: true,
                activities: Vec::new(),
            });
        }

        if let Some(reason) = Self::blocking_elements(conn, id)? {
            return Err(StoreError::HasElements(reason));
        }

        let activities: Vec<String> = conn
            .prepare("SELECT id FROM activity_list WHERE group_id = ?1 ORDER BY id")?
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let _ = conn.execute(
            "DELETE FROM activity WHERE id IN (SELECT id FROM activity_list WHERE group_id = ?1)",
            params![id],
        )?;
        let _ = conn.execute("DELETE FROM groups WHERE id = ?1", params![id])?;
        info!(user_id, group_id = id, activities = activities.len(), "group deleted");

        Ok(DeletedGroup {
            id: id.to_string(),
            left: false,
            activities,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
