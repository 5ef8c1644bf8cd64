//! Tasks and task memberships.
//!
//! Every task sits in exactly one group through its `tasks_list` row, which
//! also carries the task's order key among the tasks of that group sharing
//! its parent.

use intask_core::ids::{generate_id, now_timestamp};
use intask_core::{Access, ActivityStatus, ElementType, Parent, Placement};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info};

use super::activity::{ActivityRepo, NewActivity};
use super::position::{PositionRepo, Scope};
use crate::errors::{Result, StoreError};
use crate::sqlite::query::{Page, Predicates, params_with};
use crate::sqlite::row_types::TaskRow;
use crate::sqlite::visibility::allowed_cte;

/// Fields of a task to create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Group holding the task.
    pub group_id: String,
    /// Parent task in the same group.
    pub parent: Option<String>,
    /// Display name.
    pub name: String,
    /// Free text.
    pub note: String,
    /// Only one activity at a time across members.
    pub singular: bool,
    /// Start of the task's first activity.
    pub start: String,
}

/// Where a task lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskLocation {
    /// Group holding the task.
    pub group_id: String,
    /// Parent task.
    pub parent: Option<String>,
    /// Creating user.
    pub owner: i64,
    /// Singular flag.
    pub singular: bool,
}

/// Filters for [`TaskRepo::list`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Only these tasks.
    pub ids: Option<Vec<String>>,
    /// Only tasks of this group.
    pub group_id: Option<String>,
    /// Only children of this parent.
    pub parent: Option<Parent>,
    /// Only tasks in groups this other user is a member of.
    pub member: Option<i64>,
    /// Substring of the name or note.
    pub like: Option<String>,
    /// Listing window.
    pub page: Page,
}

/// Changeable task fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskChanges {
    /// New name.
    pub name: Option<String>,
    /// New note.
    pub note: Option<String>,
    /// New singular flag.
    pub singular: Option<bool>,
}

impl TaskChanges {
    /// Whether nothing would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.note.is_none() && self.singular.is_none()
    }

    /// Whether linked activity rows display a changed field.
    pub fn touches_activities(&self) -> bool {
        self.name.is_some() || self.singular.is_some()
    }
}

/// Keys created by [`TaskRepo::add_task`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedTask {
    /// Task key.
    pub id: String,
    /// The task's first activity.
    pub activity_id: String,
}

/// Outcome of [`TaskRepo::reorder`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskMove {
    /// The task moved to another group.
    pub group_changed: bool,
    /// The task got another parent.
    pub parent_changed: bool,
    /// Activities closed and reopened by a group change.
    pub activities: Vec<String>,
}

/// Outcome of [`TaskRepo::delete`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletedTask {
    /// Task key.
    pub id: String,
    /// Activities deleted with it.
    pub activities: Vec<String>,
}

/// Task repository.
pub struct TaskRepo;

impl TaskRepo {
    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Tasks visible to `user_id`, with the user's current status and
    /// tracked duration, in scope order.
    pub fn list(conn: &Connection, user_id: i64, filter: &TaskFilter) -> Result<Vec<TaskRow>> {
        let mut preds = Predicates::starting_at(2);
        if let Some(ids) = &filter.ids {
            let _ = preds.in_list("ids", "t.id", ids.clone());
        }
        if let Some(group_id) = &filter.group_id {
            let _ = preds.eq("group_id", "tl.group_id", group_id.clone());
        }
        if let Some(parent) = &filter.parent {
            let _ = preds.is("parent", "t.parent", parent.as_id().map(str::to_string));
        }
        if let Some(member) = filter.member {
            let _ = preds.push("member", member, |p| {
                format!(
                    "EXISTS (SELECT 1 FROM groups_list AS m \
                     WHERE m.group_id = tl.group_id AND m.user_id = {p})"
                )
            });
        }
        if let Some(like) = &filter.like {
            let _ = preds.contains_text("like", &["t.name", "t.note"], like);
        }
        let window = filter.page.clause(&mut preds);

        let sql = format!(
            "{cte}
             SELECT t.id, t.tid, tl.group_id, t.parent, t.name, t.note, t.singular, t.owner,
                    tl.p, tl.q,
                    (SELECT COUNT(*) FROM tasks AS c WHERE c.parent = t.id) AS havechild,
                    cur.status, cur.start,
                    COALESCE((
                        SELECT CAST(ROUND(SUM(julianday(d.ends) - julianday(d.start)) * 86400000.0) AS INTEGER)
                        FROM activity AS d JOIN activity_list AS dl ON dl.id = d.id
                        WHERE d.task_id = t.id AND dl.user_id = ?1
                          AND d.status IN (1, 2, 5, 6) AND d.ends IS NOT NULL
                    ), 0) AS duration
             FROM tasks AS t
             JOIN tasks_list AS tl ON tl.task_id = t.id
             JOIN allowed AS ok ON ok.group_id = tl.group_id
             LEFT JOIN (
                 SELECT a.task_id, a.status, a.start,
                        ROW_NUMBER() OVER (
                            PARTITION BY a.task_id
                            ORDER BY a.ends IS NULL DESC, a.start DESC, a.part DESC
                        ) AS rn
                 FROM activity AS a JOIN activity_list AS l ON l.id = a.id
                 WHERE l.user_id = ?1 AND a.task_id IS NOT NULL
             ) AS cur ON cur.task_id = t.id AND cur.rn = 1
             WHERE 1 {filters}
             ORDER BY tl.group_id, t.parent IS NOT NULL, t.parent, CAST(tl.p AS REAL) / tl.q, t.id
             {window}",
            cte = allowed_cte(Access::ELEMENT_READ),
            filters = preds.and_clause(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let params = params_with(&[&user_id], &preds);
        let rows = stmt
            .query_map(params.as_slice(), TaskRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(user_id, filters = ?preds.names(), count = rows.len(), "listed tasks");
        Ok(rows)
    }

    /// Tasks with the given ids visible to `user_id`.
    pub fn rows(conn: &Connection, user_id: i64, ids: &[String]) -> Result<Vec<TaskRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = TaskFilter {
            ids: Some(ids.to_vec()),
            ..TaskFilter::default()
        };
        Self::list(conn, user_id, &filter)
    }

    /// Where a task lives, `None` if it does not exist.
    pub fn location(conn: &Connection, id: &str) -> Result<Option<TaskLocation>> {
        let loc = conn
            .query_row(
                "SELECT tl.group_id, t.parent, t.owner, t.singular
                 FROM tasks AS t JOIN tasks_list AS tl ON tl.task_id = t.id
                 WHERE t.id = ?1",
                params![id],
                |row| {
                    Ok(TaskLocation {
                        group_id: row.get(0)?,
                        parent: row.get(1)?,
                        owner: row.get(2)?,
                        singular: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(loc)
    }

    /// Next per-owner sequence number.
    pub fn next_tid(conn: &Connection, owner: i64) -> Result<i64> {
        let tid: i64 = conn.query_row(
            "SELECT COALESCE(MAX(tid), 0) + 1 FROM tasks WHERE owner = ?1",
            params![owner],
            |row| row.get(0),
        )?;
        Ok(tid)
    }

    /// Number of direct child tasks.
    pub fn child_count(conn: &Connection, id: &str) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE parent = ?1",
            params![id],
            |row| row.get(0),
        )?)
    }

    /// Whether `candidate` is `ancestor` itself or lies below it.
    pub fn is_within(conn: &Connection, ancestor: &str, candidate: &str) -> Result<bool> {
        let found = conn
            .query_row(
                "WITH RECURSIVE below(id) AS (
                     SELECT ?1
                     UNION
                     SELECT t.id FROM tasks AS t JOIN below AS b ON t.parent = b.id
                 )
                 SELECT 1 FROM below WHERE id = ?2",
                params![ancestor, candidate],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Create a task owned by `user_id` together with its first activity.
    pub fn add_task(
        conn: &Connection,
        user_id: i64,
        task: &NewTask,
        placement: &Placement,
    ) -> Result<CreatedTask> {
        let scope = Scope::Tasks {
            group_id: &task.group_id,
            parent: task.parent.as_deref(),
        };
        let key = PositionRepo::place(conn, scope, None, placement)?;
        let id = generate_id();
        let tid = Self::next_tid(conn, user_id)?;

        let _ = conn.execute(
            "INSERT INTO tasks (id, tid, parent, name, note, singular, owner, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                tid,
                task.parent,
                task.name,
                task.note,
                task.singular,
                user_id,
                now_timestamp(),
            ],
        )?;
        let _ = conn.execute(
            "INSERT INTO tasks_list (task_id, group_id, p, q) VALUES (?1, ?2, ?3, ?4)",
            params![id, task.group_id, key.p, key.q],
        )?;

        let activity_id = ActivityRepo::add_activity(
            conn,
            &NewActivity {
                task_id: Some(id.clone()),
                group_id: task.group_id.clone(),
                user_id,
                type_el: ElementType::ACTIVITY,
                name: task.name.clone(),
                note: String::new(),
                status: ActivityStatus::Created,
                productive: true,
                part: 1,
                start: task.start.clone(),
                ends: None,
            },
        )?;
        info!(user_id, task_id = %id, group_id = %task.group_id, tid, key = %key, "task created");
        Ok(CreatedTask { id, activity_id })
    }

    /// Apply changed fields. Fails with [`StoreError::WrongBody`] when there
    /// are none.
    pub fn update(conn: &Connection, id: &str, changes: &TaskChanges) -> Result<()> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(name) = &changes.name {
            sets.push(format!("name = ?{}", values.len() + 1));
            values.push(Box::new(name.clone()));
        }
        if let Some(note) = &changes.note {
            sets.push(format!("note = ?{}", values.len() + 1));
            values.push(Box::new(note.clone()));
        }
        if let Some(singular) = changes.singular {
            sets.push(format!("singular = ?{}", values.len() + 1));
            values.push(Box::new(singular));
        }
        if sets.is_empty() {
            return Err(StoreError::WrongBody);
        }

        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len() + 1
        );
        values.push(Box::new(id.to_string()));
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref() as &dyn ToSql).collect();
        let _ = conn.execute(&sql, refs.as_slice())?;
        info!(task_id = id, fields = sets.len(), "task updated");
        Ok(())
    }

    /// Move a task within its group, under another parent, or to another
    /// group.
    ///
    /// A task with children cannot change group. Without an explicit parent
    /// a task moved to another group lands at its top level. Open
    /// activities of a task that changes group are closed at `now` and
    /// reopened in the new group.
    pub fn reorder(
        conn: &Connection,
        id: &str,
        target_group: Option<&str>,
        new_parent: Option<&Parent>,
        placement: &Placement,
        now: &str,
    ) -> Result<TaskMove> {
        let loc = Self::location(conn, id)?.ok_or(StoreError::PermissionDenied)?;
        let group = target_group.unwrap_or(loc.group_id.as_str());
        let group_changed = group != loc.group_id;
        let parent = match new_parent {
            Some(parent) => parent.as_id().map(str::to_string),
            None if group_changed => None,
            None => loc.parent.clone(),
        };
        let parent_changed = parent != loc.parent;

        if group_changed && Self::child_count(conn, id)? > 0 {
            return Err(StoreError::HasElements(format!(
                "task {id} has child tasks and cannot leave group {}",
                loc.group_id
            )));
        }
        if let Some(parent) = parent.as_deref() {
            if Self::is_within(conn, id, parent)? {
                return Err(StoreError::validation(format!(
                    "task {id} cannot move under its own descendant {parent}"
                )));
            }
        }

        let scope = Scope::Tasks {
            group_id: group,
            parent: parent.as_deref(),
        };
        let key = PositionRepo::place(conn, scope, Some(id), placement)?;
        if parent_changed {
            let _ = conn.execute(
                "UPDATE tasks SET parent = ?1 WHERE id = ?2",
                params![parent, id],
            )?;
        }
        let _ = conn.execute(
            "UPDATE tasks_list SET group_id = ?1, p = ?2, q = ?3 WHERE task_id = ?4",
            params![group, key.p, key.q, id],
        )?;

        let activities = if group_changed {
            ActivityRepo::transfer_open(conn, id, group, now)?
        } else {
            Vec::new()
        };
        info!(
            task_id = id,
            group_id = group,
            group_changed,
            parent_changed,
            key = %key,
            "task reordered"
        );

        Ok(TaskMove {
            group_changed,
            parent_changed,
            activities,
        })
    }

    /// Delete a task without child tasks, and all its activities.
    pub fn delete(conn: &Connection, id: &str) -> Result<DeletedTask> {
        let children = Self::child_count(conn, id)?;
        if children > 0 {
            return Err(StoreError::HasElements(format!(
                "task {id} has {children} child tasks"
            )));
        }

        let activities: Vec<String> = conn
            .prepare("SELECT id FROM activity WHERE task_id = ?1 ORDER BY start, part")?
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let _ = conn.execute("DELETE FROM activity WHERE task_id = ?1", params![id])?;
        let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::PermissionDenied);
        }
        info!(task_id = id, activities = activities.len(), "task deleted");

        Ok(DeletedTask {
            id: id.to_string(),
            activities,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
