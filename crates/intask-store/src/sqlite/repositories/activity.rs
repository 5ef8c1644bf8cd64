//! Activities: the time-tracking timeline of each member.
//!
//! A member has at most one open activity (`ends IS NULL`) per task. Opening
//! a new one closes the previous open activity at the new start, so the
//! activities of a task form a contiguous timeline. Starting a task while
//! another one runs pauses the other: its running activity is closed and a
//! `Suspended` one is opened at the same instant.

use std::collections::BTreeSet;

use intask_core::ids::generate_id;
use intask_core::{Access, ActivityStatus, ElementType};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};
use crate::sqlite::query::{Page, Predicates, params_with};
use crate::sqlite::row_types::{ActivityRecord, ActivityRow};
use crate::sqlite::visibility::allowed_cte;

/// A row to insert with [`ActivityRepo::add_activity`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewActivity {
    /// Linked task, `None` for free time.
    pub task_id: Option<String>,
    /// Group to file the activity under.
    pub group_id: String,
    /// Member the activity belongs to.
    pub user_id: i64,
    /// Element kind.
    pub type_el: ElementType,
    /// Own name, shown for free time.
    pub name: String,
    /// Free text.
    pub note: String,
    /// Status.
    pub status: ActivityStatus,
    /// Counts as productive time.
    pub productive: bool,
    /// Sequence number within the task.
    pub part: i64,
    /// Start timestamp.
    pub start: String,
    /// End timestamp, `None` to leave it open.
    pub ends: Option<String>,
}

/// Request of [`ActivityRepo::create_activity`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartActivity {
    /// Member opening the activity.
    pub user_id: i64,
    /// Group to file it under.
    pub group_id: String,
    /// Linked task, `None` for free time.
    pub task_id: Option<String>,
    /// Element kind.
    pub type_el: ElementType,
    /// Requested status; inherited from the open activity when `None`.
    pub status: Option<ActivityStatus>,
    /// Start timestamp.
    pub start: String,
    /// Own name.
    pub name: String,
    /// Free text.
    pub note: String,
    /// Counts as productive time.
    pub productive: bool,
}

/// Everything [`ActivityRepo::create_activity`] touched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActivityChange {
    /// The new activity.
    pub id: String,
    /// Activities closed or opened on the way, in order.
    pub changed: Vec<String>,
    /// Tasks whose current status changed.
    pub tasks: Vec<String>,
}

/// Outcome of [`ActivityRepo::delete`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletedActivity {
    /// Deleted activity.
    pub id: String,
    /// Activities reopened to keep the task current, and runs paused so
    /// the reopened one is the only running activity.
    pub changed: Vec<String>,
    /// Other tasks whose current status changed.
    pub tasks: Vec<String>,
}

/// Filters for [`ActivityRepo::list`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    /// Only these activities.
    pub ids: Option<Vec<String>>,
    /// Only activities filed under this group.
    pub group_id: Option<String>,
    /// Only activities of these tasks.
    pub task_ids: Option<Vec<String>>,
    /// Only activities of this member.
    pub user_id: Option<i64>,
    /// Only kinds sharing a bit with this mask.
    pub type_el: Option<i64>,
    /// Substring of the name or note.
    pub like: Option<String>,
    /// Listing window.
    pub page: Page,
}

/// Which neighbour of an activity on its timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Activity repository.
pub struct ActivityRepo;

impl ActivityRepo {
    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Activities visible to `user_id`: running ones first, then newest
    /// first.
    pub fn list(
        conn: &Connection,
        user_id: i64,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRow>> {
        let mut preds = Predicates::starting_at(2);
        if let Some(ids) = &filter.ids {
            let _ = preds.in_list("ids", "al.id", ids.clone());
        }
        if let Some(group_id) = &filter.group_id {
            let _ = preds.eq("group_id", "al.group_id", group_id.clone());
        }
        if let Some(task_ids) = &filter.task_ids {
            let _ = preds.in_list("task_ids", "act.task_id", task_ids.clone());
        }
        if let Some(member) = filter.user_id {
            let _ = preds.eq("user_id", "al.user_id", member);
        }
        if let Some(mask) = filter.type_el {
            let _ = preds.bits_any("type_el", "al.type_el", mask);
        }
        if let Some(like) = &filter.like {
            let _ = preds.contains_text("like", &["COALESCE(t.name, act.name)", "act.note"], like);
        }
        let window = filter.page.clause(&mut preds);

        let sql = format!(
            "{cte}
             SELECT {columns}
             FROM {from}
             JOIN allowed AS ok ON ok.group_id = al.group_id
             WHERE 1 {filters}
             ORDER BY (act.ends IS NULL AND act.status IN (1, 5)) DESC, act.start DESC, act.part DESC, al.id
             {window}",
            cte = allowed_cte(Access::ELEMENT_READ),
            columns = ActivityRow::COLUMNS,
            from = ActivityRow::FROM,
            filters = preds.and_clause(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let params = params_with(&[&user_id], &preds);
        let rows = stmt
            .query_map(params.as_slice(), ActivityRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(user_id, filters = ?preds.names(), count = rows.len(), "listed activities");
        Ok(rows)
    }

    /// Activities with the given ids visible to `user_id`.
    pub fn rows(conn: &Connection, user_id: i64, ids: &[String]) -> Result<Vec<ActivityRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = ActivityFilter {
            ids: Some(ids.to_vec()),
            ..ActivityFilter::default()
        };
        Self::list(conn, user_id, &filter)
    }

    /// One stored activity, without visibility filtering.
    pub fn record(conn: &Connection, id: &str) -> Result<Option<ActivityRecord>> {
        Ok(Self::fetch(conn, "act.id = ?1", &[&id])?.into_iter().next())
    }

    /// The member's current activity for a task: the open one, else the
    /// latest.
    pub fn current_for_task(
        conn: &Connection,
        task_id: &str,
        user_id: i64,
    ) -> Result<Option<ActivityRecord>> {
        let found = Self::fetch(
            conn,
            "act.task_id = ?1 AND al.user_id = ?2
             ORDER BY act.ends IS NULL DESC, act.start DESC, act.part DESC LIMIT 1",
            &[&task_id, &user_id],
        )?;
        Ok(found.into_iter().next())
    }

    /// Open activities of a task, for one member or for everybody.
    pub fn open_for_task(
        conn: &Connection,
        task_id: &str,
        user_id: Option<i64>,
    ) -> Result<Vec<ActivityRecord>> {
        Self::fetch(
            conn,
            "act.task_id = ?1 AND act.ends IS NULL AND (?2 IS NULL OR al.user_id = ?2)
             ORDER BY act.start",
            &[&task_id, &user_id],
        )
    }

    /// The member's open running activities, except those of `except_task`.
    pub fn open_running(
        conn: &Connection,
        user_id: i64,
        except_task: Option<&str>,
    ) -> Result<Vec<ActivityRecord>> {
        Self::fetch(
            conn,
            "al.user_id = ?1 AND act.ends IS NULL AND act.status IN (1, 5)
             AND (?2 IS NULL OR act.task_id IS NOT ?2)
             ORDER BY act.start",
            &[&user_id, &except_task],
        )
    }

    /// Id of the earliest activity of a task.
    pub fn earliest_for_task(conn: &Connection, task_id: &str) -> Result<Option<String>> {
        let id = conn
            .query_row(
                "SELECT id FROM activity WHERE task_id = ?1 ORDER BY start, part, id LIMIT 1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Id of the member's latest activity.
    pub fn last_element(conn: &Connection, user_id: i64) -> Result<Option<String>> {
        let id = conn
            .query_row(
                "SELECT act.id FROM activity AS act JOIN activity_list AS al ON al.id = act.id
                 WHERE al.user_id = ?1
                 ORDER BY act.start DESC, act.part DESC, act.id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Id of the activity bounding how far `id` may be moved back: the
    /// nearest earlier activity on the same timeline, or for a singular task
    /// the nearest earlier running activity of anybody.
    pub fn move_bound(conn: &Connection, id: &str) -> Result<Option<String>> {
        let Some(rec) = Self::record(conn, id)? else {
            return Ok(None);
        };
        let bound = conn
            .query_row(
                "SELECT act.id
                 FROM activity AS act
                 JOIN activity_list AS al ON al.id = act.id
                 LEFT JOIN tasks AS t ON t.id = act.task_id
                 WHERE act.task_id IS ?1 AND act.id <> ?2
                   AND (al.user_id = ?3 OR (t.singular = 1 AND act.status IN (1, 5)))
                   AND (act.start, act.part, act.id) < (?4, ?5, ?2)
                 ORDER BY act.start DESC, act.part DESC, act.id DESC LIMIT 1",
                params![rec.task_id, rec.id, rec.user_id, rec.start, rec.part],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bound)
    }

    /// Next `part` for a member's activity on a task.
    pub fn next_part(conn: &Connection, task_id: &str, user_id: i64) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity AS act JOIN activity_list AS al ON al.id = act.id
             WHERE act.task_id = ?1 AND al.user_id = ?2",
            params![task_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count + 1)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Insert an activity and its membership row. Returns the new key.
    pub fn add_activity(conn: &Connection, new: &NewActivity) -> Result<String> {
        let id = generate_id();
        let _ = conn.execute(
            "INSERT INTO activity (id, task_id, name, note, part, status, owner, productive, start, ends)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                new.task_id,
                new.name,
                new.note,
                new.part,
                new.status.code(),
                new.user_id,
                new.productive,
                new.start,
                new.ends,
            ],
        )?;
        let _ = conn.execute(
            "INSERT INTO activity_list (id, group_id, user_id, type_el) VALUES (?1, ?2, ?3, ?4)",
            params![id, new.group_id, new.user_id, new.type_el.bits()],
        )?;
        debug!(
            activity_id = %id,
            task_id = ?new.task_id,
            status = new.status.label(),
            "activity added"
        );
        Ok(id)
    }

    /// Open an activity, closing and pausing whatever it supersedes.
    ///
    /// The requested status must follow from the task's current status. A
    /// running status pauses the member's other running tasks. The task's
    /// open activity (every member's, for a singular task) is closed at the
    /// new start. Starts before an activity being closed are rejected.
    pub fn create_activity(conn: &Connection, req: &StartActivity) -> Result<ActivityChange> {
        if req.type_el.requires_task() && req.task_id.is_none() {
            return Err(StoreError::validation("task activity without task_id"));
        }
        let task_id = req.task_id.as_deref();
        let user_id = req.user_id;
        let start = req.start.as_str();

        let current = match task_id {
            Some(task) => Self::current_for_task(conn, task, user_id)?,
            None => None,
        };
        if let (Some(status), Some(_)) = (req.status, task_id) {
            status.check_transition(current.as_ref().map(|c| c.status))?;
        }
        let status = req
            .status
            .or_else(|| current.as_ref().filter(|c| c.is_open()).map(|c| c.status))
            .unwrap_or(ActivityStatus::Created);

        let mut changed = Vec::new();
        let mut tasks = BTreeSet::new();

        if status.is_running() {
            for other in Self::open_running(conn, user_id, task_id)? {
                ensure_not_before(start, &other)?;
                Self::pause(conn, &other, start, &mut changed, &mut tasks)?;
            }
        }

        let part = match task_id {
            Some(task) => {
                let singular: bool = conn
                    .query_row("SELECT singular FROM tasks WHERE id = ?1", params![task], |row| {
                        row.get(0)
                    })
                    .optional()?
                    .ok_or(StoreError::PermissionDenied)?;
                let scope = if singular { None } else { Some(user_id) };
                for open in Self::open_for_task(conn, task, scope)? {
                    ensure_not_before(start, &open)?;
                    Self::close(conn, &open.id, start)?;
                    changed.push(open.id);
                }
                let _ = tasks.insert(task.to_string());
                Self::next_part(conn, task, user_id)?
            }
            None => 0,
        };

        let id = Self::add_activity(
            conn,
            &NewActivity {
                task_id: req.task_id.clone(),
                group_id: req.group_id.clone(),
                user_id,
                type_el: req.type_el,
                name: req.name.clone(),
                note: req.note.clone(),
                status,
                productive: req.productive,
                part,
                start: start.to_string(),
                ends: status.is_ended().then(|| start.to_string()),
            },
        )?;
        info!(
            user_id,
            activity_id = %id,
            task_id = ?task_id,
            status = status.label(),
            changed = changed.len(),
            "activity created"
        );

        Ok(ActivityChange {
            id,
            changed,
            tasks: tasks.into_iter().collect(),
        })
    }

    /// Delete an activity.
    ///
    /// With `check_one` the earliest activity of a task is protected; it
    /// goes with the task. Deleting the open activity reopens its
    /// predecessor on the same timeline. A reopened running predecessor
    /// pauses the member's other running tasks, as opening it would.
    pub fn delete(conn: &Connection, id: &str, check_one: bool) -> Result<DeletedActivity> {
        let rec = Self::record(conn, id)?.ok_or(StoreError::PermissionDenied)?;
        if let Some(task) = &rec.task_id {
            if check_one && Self::earliest_for_task(conn, task)?.as_deref() == Some(id) {
                return Err(StoreError::validation(
                    "the first activity of a task goes with the task",
                ));
            }
        }

        let predecessor = if rec.is_open() && rec.task_id.is_some() {
            Self::neighbour(conn, &rec, Side::Before)?
        } else {
            None
        };
        let _ = conn.execute("DELETE FROM activity WHERE id = ?1", params![id])?;

        let mut changed = Vec::new();
        let mut tasks = BTreeSet::new();
        if let Some(prev) = predecessor.filter(|p| !p.status.is_ended()) {
            let _ =
                conn.execute("UPDATE activity SET ends = NULL WHERE id = ?1", params![prev.id])?;
            if prev.status.is_running() {
                for other in Self::open_running(conn, prev.user_id, prev.task_id.as_deref())? {
                    let at = if other.start > rec.start { &other.start } else { &rec.start };
                    Self::pause(conn, &other, at, &mut changed, &mut tasks)?;
                }
            }
            changed.push(prev.id);
        }
        info!(activity_id = id, changed = changed.len(), "activity deleted");

        Ok(DeletedActivity {
            id: id.to_string(),
            changed,
            tasks: tasks.into_iter().collect(),
        })
    }

    /// Move an activity in time by changing its start and/or ends.
    ///
    /// Adjacent activities on the same timeline that touched the old
    /// boundaries are moved along. Returns every changed activity.
    pub fn reorder(
        conn: &Connection,
        id: &str,
        start: Option<&str>,
        ends: Option<&str>,
    ) -> Result<Vec<String>> {
        if start.is_none() && ends.is_none() {
            return Err(StoreError::validation("NeedStartOrEnds"));
        }
        let rec = Self::record(conn, id)?.ok_or(StoreError::PermissionDenied)?;
        if ends.is_some() && rec.is_open() {
            return Err(StoreError::validation("an open activity has no end to move"));
        }

        let new_start = start.unwrap_or(rec.start.as_str());
        let new_ends = ends.or(rec.ends.as_deref());
        if new_ends.is_some_and(|e| e < new_start) {
            return Err(StoreError::validation("ends precedes start"));
        }

        let prev = Self::neighbour(conn, &rec, Side::Before)?;
        let next = Self::neighbour(conn, &rec, Side::After)?;
        let mut changed = vec![rec.id.clone()];

        if let Some(prev) = prev {
            if new_start < prev.start.as_str() {
                return Err(StoreError::validation("start precedes the previous activity"));
            }
            if prev.ends.as_deref() == Some(rec.start.as_str()) {
                if new_start != rec.start {
                    Self::close(conn, &prev.id, new_start)?;
                    changed.push(prev.id);
                }
            } else if prev.ends.as_deref().is_none_or(|e| e > new_start) {
                return Err(StoreError::validation("start overlaps the previous activity"));
            }
        }

        if let Some(next) = next {
            let boundary = new_ends.unwrap_or(new_start);
            if rec.ends.as_deref() == Some(next.start.as_str()) {
                if next.ends.as_deref().is_some_and(|e| e < boundary) {
                    return Err(StoreError::validation("ends passes the next activity"));
                }
                if new_ends != rec.ends.as_deref() {
                    let _ = conn.execute(
                        "UPDATE activity SET start = ?1 WHERE id = ?2",
                        params![boundary, next.id],
                    )?;
                    changed.push(next.id);
                }
            } else if boundary > next.start.as_str() {
                return Err(StoreError::validation("ends overlaps the next activity"));
            }
        }

        let _ = conn.execute(
            "UPDATE activity SET start = ?1, ends = ?2 WHERE id = ?3",
            params![new_start, new_ends, id],
        )?;
        info!(
            activity_id = id,
            start = new_start,
            ends = ?new_ends,
            changed = changed.len(),
            "activity moved"
        );
        Ok(changed)
    }

    /// Change name and/or note. Returns whether a row was updated.
    pub fn update(
        conn: &Connection,
        id: &str,
        name: Option<&str>,
        note: Option<&str>,
    ) -> Result<bool> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(name) = name {
            sets.push(format!("name = ?{}", values.len() + 1));
            values.push(Box::new(name.to_string()));
        }
        if let Some(note) = note {
            sets.push(format!("note = ?{}", values.len() + 1));
            values.push(Box::new(note.to_string()));
        }
        if sets.is_empty() {
            return Err(StoreError::WrongBody);
        }
        let sql = format!(
            "UPDATE activity SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len() + 1
        );
        values.push(Box::new(id.to_string()));
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref() as &dyn ToSql).collect();
        Ok(conn.execute(&sql, refs.as_slice())? > 0)
    }

    /// Close every open activity of a task and reopen it in `group_id`,
    /// keeping status and member. Closing happens at `now`, or at the
    /// activity's start when that is later. Returns closed and opened ids.
    pub fn transfer_open(
        conn: &Connection,
        task_id: &str,
        group_id: &str,
        now: &str,
    ) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        for open in Self::open_for_task(conn, task_id, None)? {
            let at = if open.start.as_str() > now { open.start.clone() } else { now.to_string() };
            Self::close(conn, &open.id, &at)?;

            let id = generate_id();
            let _ = conn.execute(
                "INSERT INTO activity (id, task_id, name, note, part, status, owner, productive, start, ends)
                 SELECT ?1, task_id, name, note, ?2, status, owner, productive, ?3, NULL
                 FROM activity WHERE id = ?4",
                params![id, Self::next_part(conn, task_id, open.user_id)?, at, open.id],
            )?;
            let _ = conn.execute(
                "INSERT INTO activity_list (id, group_id, user_id, type_el) VALUES (?1, ?2, ?3, ?4)",
                params![id, group_id, open.user_id, open.type_el],
            )?;
            changed.push(open.id);
            changed.push(id);
        }
        if !changed.is_empty() {
            info!(
                task_id,
                group_id,
                moved = changed.len() / 2,
                "open activities moved to new group"
            );
        }
        Ok(changed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────

    /// Close a running activity at `at` and open a `Suspended` one for its
    /// task at the same instant.
    fn pause(
        conn: &Connection,
        running: &ActivityRecord,
        at: &str,
        changed: &mut Vec<String>,
        tasks: &mut BTreeSet<String>,
    ) -> Result<()> {
        Self::close(conn, &running.id, at)?;
        changed.push(running.id.clone());
        let Some(task_id) = &running.task_id else {
            return Ok(());
        };
        let paused = Self::add_activity(
            conn,
            &NewActivity {
                task_id: Some(task_id.clone()),
                group_id: running.group_id.clone(),
                user_id: running.user_id,
                type_el: ElementType(running.type_el),
                name: String::new(),
                note: String::new(),
                status: ActivityStatus::Suspended,
                productive: false,
                part: Self::next_part(conn, task_id, running.user_id)?,
                start: at.to_string(),
                ends: None,
            },
        )?;
        info!(
            user_id = running.user_id,
            task_id = %task_id,
            activity_id = %paused,
            "paused running task"
        );
        changed.push(paused);
        let _ = tasks.insert(task_id.clone());
        Ok(())
    }

    fn close(conn: &Connection, id: &str, ends: &str) -> Result<()> {
        let _ = conn.execute("UPDATE activity SET ends = ?1 WHERE id = ?2", params![ends, id])?;
        Ok(())
    }

    /// The adjacent activity on the same member's timeline for the same task.
    fn neighbour(
        conn: &Connection,
        rec: &ActivityRecord,
        side: Side,
    ) -> Result<Option<ActivityRecord>> {
        let clause = match side {
            Side::Before => {
                "al.user_id = ?1 AND act.task_id IS ?2 AND act.id <> ?3
                 AND (act.start, act.part, act.id) < (?4, ?5, ?3)
                 ORDER BY act.start DESC, act.part DESC, act.id DESC LIMIT 1"
            }
            Side::After => {
                "al.user_id = ?1 AND act.task_id IS ?2 AND act.id <> ?3
                 AND (act.start, act.part, act.id) > (?4, ?5, ?3)
                 ORDER BY act.start, act.part, act.id LIMIT 1"
            }
        };
        let found = Self::fetch(
            conn,
            clause,
            &[&rec.user_id, &rec.task_id, &rec.id, &rec.start, &rec.part],
        )?;
        Ok(found.into_iter().next())
    }

    fn fetch(
        conn: &Connection,
        clause: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<ActivityRecord>> {
        let sql = format!(
            "SELECT {} FROM activity AS act JOIN activity_list AS al ON al.id = act.id WHERE {clause}",
            ActivityRecord::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, ActivityRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn ensure_not_before(start: &str, open: &ActivityRecord) -> Result<()> {
    if start < open.start.as_str() {
        return Err(StoreError::validation(format!(
            "start {start} precedes open activity {} started {}",
            open.id, open.start
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
