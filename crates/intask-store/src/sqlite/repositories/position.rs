//! Order keys of group memberships and task memberships.
//!
//! Loads a scope's siblings, runs the position engine and persists any
//! renumbering it asks for. The caller writes the placed element's own key
//! (the row may not exist yet when creating).

use intask_core::position::{self, renumber};
use intask_core::{OrderKey, Placement, PositionError, Sibling};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::errors::Result;

/// A sibling-ordering context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    /// A user's groups under one parent group.
    Groups {
        /// Member whose list is ordered.
        user_id: i64,
        /// Parent group, `None` for top level.
        parent: Option<&'a str>,
    },
    /// Tasks of one group under one parent task.
    Tasks {
        /// Group holding the tasks.
        group_id: &'a str,
        /// Parent task, `None` for top level.
        parent: Option<&'a str>,
    },
}

impl std::fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Groups { user_id, parent } => {
                write!(f, "groups of user {user_id} under {}", parent.unwrap_or("root"))
            }
            Self::Tasks { group_id, parent } => {
                write!(f, "tasks of group {group_id} under {}", parent.unwrap_or("root"))
            }
        }
    }
}

/// Position repository.
pub struct PositionRepo;

impl PositionRepo {
    /// Current siblings of a scope, in key order.
    pub fn siblings(conn: &Connection, scope: Scope<'_>) -> Result<Vec<Sibling>> {
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, i64, i64)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        };
        let raw = match scope {
            Scope::Groups { user_id, parent } => conn
                .prepare(
                    "SELECT gl.group_id, gl.p, gl.q
                     FROM groups_list AS gl
                     JOIN groups AS g ON g.id = gl.group_id
                     WHERE gl.user_id = ?1 AND g.parent IS ?2",
                )?
                .query_map(params![user_id, parent], map)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            Scope::Tasks { group_id, parent } => conn
                .prepare(
                    "SELECT tl.task_id, tl.p, tl.q
                     FROM tasks_list AS tl
                     JOIN tasks AS t ON t.id = tl.task_id
                     WHERE tl.group_id = ?1 AND t.parent IS ?2",
                )?
                .query_map(params![group_id, parent], map)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        let mut siblings = raw
            .into_iter()
            .map(|(id, p, q)| Ok(Sibling::new(id, OrderKey::new(p, q)?)))
            .collect::<std::result::Result<Vec<_>, PositionError>>()?;
        siblings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(siblings)
    }

    /// Compute a key for `moving` (or a new element when `None`) in `scope`.
    ///
    /// When the engine renumbers the scope, the other siblings' keys are
    /// rewritten here.
    pub fn place(
        conn: &Connection,
        scope: Scope<'_>,
        moving: Option<&str>,
        placement: &Placement,
    ) -> Result<OrderKey> {
        Self::ensure_scope(conn, scope)?;
        let siblings = Self::siblings(conn, scope)?;
        let plan = position::place(&siblings, moving, placement)?;

        if plan.is_renumbered() {
            info!(%scope, siblings = plan.renumbered.len(), "renumbering scope");
            for sibling in &plan.renumbered {
                Self::write_key(conn, scope, &sibling.id, sibling.key)?;
            }
        }
        debug!(%scope, key = %plan.key, ?placement, "placed element");
        Ok(plan.key)
    }

    /// Store the key of one element of `scope`.
    pub fn write_key(conn: &Connection, scope: Scope<'_>, id: &str, key: OrderKey) -> Result<()> {
        let _ = match scope {
            Scope::Groups { user_id, .. } => conn.execute(
                "UPDATE groups_list SET p = ?1, q = ?2 WHERE group_id = ?3 AND user_id = ?4",
                params![key.p, key.q, id, user_id],
            )?,
            Scope::Tasks { .. } => conn.execute(
                "UPDATE tasks_list SET p = ?1, q = ?2 WHERE task_id = ?3",
                params![key.p, key.q, id],
            )?,
        };
        Ok(())
    }

    /// Reassign evenly spaced keys to every sibling of `scope`.
    ///
    /// Returns the number of rewritten rows.
    pub fn renumber_scope(conn: &Connection, scope: Scope<'_>) -> Result<usize> {
        let siblings = Self::siblings(conn, scope)?;
        let renumbered = renumber(&siblings)?;
        for sibling in &renumbered {
            Self::write_key(conn, scope, &sibling.id, sibling.key)?;
        }
        Ok(renumbered.len())
    }

    /// Every non-empty group scope, as `(user_id, parent)`.
    pub fn group_scopes(conn: &Connection) -> Result<Vec<(i64, Option<String>)>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT gl.user_id, g.parent
             FROM groups_list AS gl
             JOIN groups AS g ON g.id = gl.group_id
             ORDER BY gl.user_id, g.parent",
        )?;
        let scopes = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scopes)
    }

    /// Every non-empty task scope, as `(group_id, parent)`.
    pub fn task_scopes(conn: &Connection) -> Result<Vec<(String, Option<String>)>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT tl.group_id, t.parent
             FROM tasks_list AS tl
             JOIN tasks AS t ON t.id = tl.task_id
             ORDER BY tl.group_id, t.parent",
        )?;
        let scopes = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scopes)
    }

    /// Number of sibling pairs sharing an equal key, across all scopes.
    pub fn duplicate_keys(conn: &Connection) -> Result<i64> {
        let groups: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM groups_list AS a
             JOIN groups AS ga ON ga.id = a.group_id
             JOIN groups_list AS b ON b.user_id = a.user_id AND a.group_id < b.group_id
             JOIN groups AS gb ON gb.id = b.group_id AND gb.parent IS ga.parent
             WHERE a.p * b.q = b.p * a.q",
            [],
            |row| row.get(0),
        )?;
        let tasks: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM tasks_list AS a
             JOIN tasks AS ta ON ta.id = a.task_id
             JOIN tasks_list AS b ON b.group_id = a.group_id AND a.task_id < b.task_id
             JOIN tasks AS tb ON tb.id = b.task_id AND tb.parent IS ta.parent
             WHERE a.p * b.q = b.p * a.q",
            [],
            |row| row.get(0),
        )?;
        Ok(groups + tasks)
    }

    /// A parent scope must exist: the parent group, or the parent task inside
    /// the same group.
    fn ensure_scope(conn: &Connection, scope: Scope<'_>) -> Result<()> {
        let found = match scope {
            Scope::Groups { parent: None, .. } | Scope::Tasks { parent: None, .. } => return Ok(()),
            Scope::Groups {
                parent: Some(parent),
                ..
            } => conn
                .query_row("SELECT 1 FROM groups WHERE id = ?1", params![parent], |_| Ok(()))
                .optional()?,
            Scope::Tasks {
                group_id,
                parent: Some(parent),
            } => conn
                .query_row(
                    "SELECT 1 FROM tasks_list WHERE task_id = ?1 AND group_id = ?2",
                    params![parent, group_id],
                    |_| Ok(()),
                )
                .optional()?,
        };
        match found {
            Some(()) => Ok(()),
            None => Err(PositionError::ScopeNotFound(scope.to_string()).into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use assert_matches::assert_matches;
    use intask_core::position::MAX_TERM;

    use super::*;
    use crate::errors::StoreError;
    use crate::sqlite::repositories::test_support::{key_of_task, setup_db};

    fn seed_tasks(conn: &Connection, keys: &[(&str, i64, i64)]) {
        conn.execute(
            "INSERT INTO groups (id, owner, created_at) VALUES ('groupAAA', 1, 't')",
            [],
        )
        .unwrap();
        for (i, (id, p, q)) in keys.iter().enumerate() {
            conn.execute(
                "INSERT INTO tasks (id, tid, owner, created_at) VALUES (?1, ?2, 1, 't')",
                params![id, i64::try_from(i).unwrap() + 1],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO tasks_list (task_id, group_id, p, q) VALUES (?1, 'groupAAA', ?2, ?3)",
                params![id, p, q],
            )
            .unwrap();
        }
    }

    const TOP: Scope<'static> = Scope::Tasks {
        group_id: "groupAAA",
        parent: None,
    };

    #[test]
    fn siblings_come_back_in_key_order() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskCCCC", 3, 1), ("taskAAAA", 1, 2), ("taskBBBB", 1, 1)]);
        let ids: Vec<String> = PositionRepo::siblings(&conn, TOP)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["taskAAAA", "taskBBBB", "taskCCCC"]);
    }

    #[test]
    fn place_between_neighbours() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 1, 1), ("taskBBBB", 2, 1)]);
        let key =
            PositionRepo::place(&conn, TOP, None, &Placement::After("taskAAAA".into())).unwrap();
        assert_eq!((key.p, key.q), (3, 2));
    }

    #[test]
    fn renumbering_is_persisted() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 1, MAX_TERM), ("taskBBBB", 1, 1)]);
        let key = PositionRepo::place(&conn, TOP, None, &Placement::Head).unwrap();

        assert_eq!(key_of_task(&conn, "taskAAAA"), (1, 1));
        assert_eq!(key_of_task(&conn, "taskBBBB"), (2, 1));
        assert_eq!((key.p, key.q), (1, 2));
    }

    #[test]
    fn unknown_reference_is_a_conflict() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 1, 1)]);
        let err = PositionRepo::place(&conn, TOP, None, &Placement::Before("nothere1".into()))
            .unwrap_err();
        assert_matches!(err, StoreError::Conflict(PositionError::ReferenceNotFound(_)));
        assert_eq!(err.name(), "Conflict");
    }

    #[test]
    fn parent_outside_the_group_is_a_missing_scope() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 1, 1)]);
        let scope = Scope::Tasks {
            group_id: "groupAAA",
            parent: Some("nothere1"),
        };
        let err = PositionRepo::place(&conn, scope, None, &Placement::Tail).unwrap_err();
        assert_matches!(err, StoreError::Conflict(PositionError::ScopeNotFound(_)));
    }

    #[test]
    fn renumber_scope_spaces_keys_evenly() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 2, 7), ("taskBBBB", 5, 9), ("taskCCCC", 9, 2)]);
        assert_eq!(PositionRepo::renumber_scope(&conn, TOP).unwrap(), 3);
        assert_eq!(key_of_task(&conn, "taskAAAA"), (1, 1));
        assert_eq!(key_of_task(&conn, "taskBBBB"), (2, 1));
        assert_eq!(key_of_task(&conn, "taskCCCC"), (3, 1));
    }

    #[test]
    fn duplicate_keys_are_counted() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 1, 2), ("taskBBBB", 2, 4), ("taskCCCC", 1, 1)]);
        assert_eq!(PositionRepo::duplicate_keys(&conn).unwrap(), 1);
        PositionRepo::renumber_scope(&conn, TOP).unwrap();
        assert_eq!(PositionRepo::duplicate_keys(&conn).unwrap(), 0);
    }

    #[test]
    fn task_scopes_are_listed() {
        let conn = setup_db();
        seed_tasks(&conn, &[("taskAAAA", 1, 1)]);
        assert_eq!(
            PositionRepo::task_scopes(&conn).unwrap(),
            vec![("groupAAA".to_string(), None)]
        );
    }
}
