//! Activity timeline: open, edit, move in time, delete, and the bounds a
//! client needs before dragging an activity.

use intask_core::{Access, Conditions};
use rusqlite::Connection;
use serde::Serialize;

use super::params::{CreateActivity, MoveActivity, Restriction, activity_filter};
use super::{read, write};
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::repositories::activity::{ActivityRepo, StartActivity};
use crate::sqlite::repositories::task::TaskRepo;
use crate::sqlite::row_types::{ActivityRecord, ActivityRow, TaskRow};
use crate::sqlite::visibility::require;

/// Rows touched by an activity operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityChanged {
    /// The activity the request named.
    pub id: String,
    /// Current state of every activity the operation wrote, newest first.
    pub activity: Vec<ActivityRow>,
    /// Tasks whose current status may have changed.
    pub tasks: Vec<TaskRow>,
}

/// Activity operations.
pub struct ActivityManager<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> ActivityManager<'a> {
    pub(crate) fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    /// Activities visible to the user.
    pub fn list(&self, cond: &Conditions) -> Result<Vec<ActivityRow>> {
        let user_id = cond.main_user()?;
        let filter = activity_filter(cond)?;
        read(self.pool, "activity.list", |conn| ActivityRepo::list(conn, user_id, &filter))
    }

    /// Open an activity for the user, pausing or closing what it supersedes.
    pub fn create(&self, cond: &Conditions) -> Result<ActivityChanged> {
        let user_id = cond.main_user()?;
        let params = CreateActivity::from_conditions(cond)?;
        write(self.pool, "activity.create", |conn| {
            require(conn, user_id, &params.group_id, Access::ELEMENT_CREATE)?;
            if let Some(task_id) = &params.task_id {
                let loc = TaskRepo::location(conn, task_id)?.ok_or(StoreError::PermissionDenied)?;
                if loc.group_id != params.group_id {
                    return Err(StoreError::validation(format!(
                        "task {task_id} is not in group {}",
                        params.group_id
                    )));
                }
            }

            let change = ActivityRepo::create_activity(
                conn,
                &StartActivity {
                    user_id,
                    group_id: params.group_id.clone(),
                    task_id: params.task_id.clone(),
                    type_el: params.type_el,
                    status: params.status,
                    start: params.start.clone(),
                    name: params.name.clone(),
                    note: params.note.clone(),
                    productive: params.productive,
                },
            )?;
            let mut written = change.changed;
            written.push(change.id.clone());
            changed(conn, user_id, change.id, &written, &change.tasks)
        })
    }

    /// Change name or note.
    pub fn update(&self, cond: &Conditions) -> Result<ActivityChanged> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        let name = cond.optional_str("name")?;
        let note = cond.optional_str("note")?;
        write(self.pool, "activity.update", |conn| {
            let rec = locate(conn, user_id, &id, Access::ELEMENT_UPDATE)?;
            let _ = ActivityRepo::update(conn, &id, name.as_deref(), note.as_deref())?;
            let tasks: Vec<String> = rec.task_id.into_iter().collect();
            changed(conn, user_id, id.clone(), &[id.clone()], &tasks)
        })
    }

    /// Move an activity of the user's own timeline in time.
    pub fn reorder(&self, cond: &Conditions) -> Result<ActivityChanged> {
        let user_id = cond.main_user()?;
        let moved = MoveActivity::from_conditions(cond)?;
        write(self.pool, "activity.reorder", |conn| {
            let rec = locate(conn, user_id, &moved.id, Access::ELEMENT_UPDATE)?;
            if rec.user_id != user_id {
                return Err(StoreError::PermissionDenied);
            }
            let written = ActivityRepo::reorder(
                conn,
                &moved.id,
                moved.start.as_deref(),
                moved.ends.as_deref(),
            )?;
            let tasks: Vec<String> = rec.task_id.into_iter().collect();
            changed(conn, user_id, moved.id.clone(), &written, &tasks)
        })
    }

    /// Delete an activity. The first activity of a task is kept unless
    /// `check_one` is false.
    pub fn delete(&self, cond: &Conditions) -> Result<ActivityChanged> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        let check_one = cond.flag("check_one")?.unwrap_or(true);
        write(self.pool, "activity.delete", |conn| {
            let rec = locate(conn, user_id, &id, Access::ELEMENT_DELETE)?;
            let deleted = ActivityRepo::delete(conn, &id, check_one)?;
            let mut tasks: Vec<String> = rec.task_id.into_iter().collect();
            tasks.extend(deleted.tasks);
            changed(conn, user_id, deleted.id, &deleted.changed, &tasks)
        })
    }

    /// The activity bounding a drag: the user's latest activity, or the
    /// nearest earlier one that `id` may not pass.
    pub fn restrictions(&self, cond: &Conditions) -> Result<Option<ActivityRow>> {
        let user_id = cond.main_user()?;
        let restriction = Restriction::from_conditions(cond)?;
        read(self.pool, "activity.restrictions", |conn| {
            let bound = match &restriction {
                Restriction::LastElement => ActivityRepo::last_element(conn, user_id)?,
                Restriction::Move(id) => {
                    let _ = locate(conn, user_id, id, Access::ELEMENT_READ)?;
                    ActivityRepo::move_bound(conn, id)?
                }
            };
            let rows = match bound {
                Some(id) => ActivityRepo::rows(conn, user_id, &[id])?,
                None => Vec::new(),
            };
            Ok(rows.into_iter().next())
        })
    }
}

/// The stored activity, if `access` is allowed on its group.
fn locate(conn: &Connection, user_id: i64, id: &str, access: Access) -> Result<ActivityRecord> {
    let rec = ActivityRepo::record(conn, id)?.ok_or(StoreError::PermissionDenied)?;
    require(conn, user_id, &rec.group_id, access)?;
    Ok(rec)
}

fn changed(
    conn: &Connection,
    user_id: i64,
    id: String,
    activities: &[String],
    tasks: &[String],
) -> Result<ActivityChanged> {
    Ok(ActivityChanged {
        id,
        activity: ActivityRepo::rows(conn, user_id, activities)?,
        tasks: TaskRepo::rows(conn, user_id, tasks)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
