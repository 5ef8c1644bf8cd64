//! Task lifecycle: create, edit, move across parents and groups, delete.

use intask_core::ids::now_timestamp;
use intask_core::{Access, Conditions, Parent};
use rusqlite::Connection;
use serde::Serialize;

use super::params::{CreateTask, MoveTask, task_changes, task_filter};
use super::{read, write};
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::repositories::activity::{ActivityFilter, ActivityRepo};
use crate::sqlite::repositories::task::{DeletedTask, NewTask, TaskFilter, TaskLocation, TaskRepo};
use crate::sqlite::row_types::{ActivityRow, TaskRow};
use crate::sqlite::visibility::require;

/// Result of [`TaskManager::create`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskCreated {
    /// The new task.
    pub task: TaskRow,
    /// Its first activity.
    pub activity: Vec<ActivityRow>,
}

/// Result of [`TaskManager::update`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskUpdated {
    /// The updated task.
    pub task: TaskRow,
    /// Activities showing the task's name, when name or singular changed.
    pub activity: Vec<ActivityRow>,
}

/// Result of [`TaskManager::reorder`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskMoved {
    /// Moved task.
    pub id: String,
    /// Whether the task changed group.
    pub group_changed: bool,
    /// Whether the task changed parent.
    pub parent_changed: bool,
    /// Tasks of the destination scope, in order.
    pub tasks: Vec<TaskRow>,
    /// Activities closed and reopened by a group change.
    pub activity: Vec<ActivityRow>,
}

/// Task operations.
pub struct TaskManager<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> TaskManager<'a> {
    pub(crate) fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    /// Tasks visible to the user.
    pub fn list(&self, cond: &Conditions) -> Result<Vec<TaskRow>> {
        let user_id = cond.main_user()?;
        let filter = task_filter(cond)?;
        read(self.pool, "task.list", |conn| TaskRepo::list(conn, user_id, &filter))
    }

    /// Create a task and its first activity.
    pub fn create(&self, cond: &Conditions) -> Result<TaskCreated> {
        let user_id = cond.main_user()?;
        let params = CreateTask::from_conditions(cond)?;
        write(self.pool, "task.create", |conn| {
            require(conn, user_id, &params.group_id, Access::ELEMENT_CREATE)?;
            let created = TaskRepo::add_task(
                conn,
                user_id,
                &NewTask {
                    group_id: params.group_id.clone(),
                    parent: params.parent.clone(),
                    name: params.name.clone(),
                    note: params.note.clone(),
                    singular: params.singular,
                    start: params.start.clone(),
                },
                &params.placement,
            )?;
            Ok(TaskCreated {
                task: one_task(conn, user_id, &created.id)?,
                activity: ActivityRepo::rows(conn, user_id, &[created.activity_id])?,
            })
        })
    }

    /// Change name, note or singular.
    pub fn update(&self, cond: &Conditions) -> Result<TaskUpdated> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        let changes = task_changes(cond)?;
        write(self.pool, "task.update", |conn| {
            let _ = locate(conn, user_id, &id, Access::ELEMENT_UPDATE)?;
            TaskRepo::update(conn, &id, &changes)?;
            let activity = if changes.touches_activities() {
                let filter = ActivityFilter {
                    task_ids: Some(vec![id.clone()]),
                    ..ActivityFilter::default()
                };
                ActivityRepo::list(conn, user_id, &filter)?
            } else {
                Vec::new()
            };
            Ok(TaskUpdated {
                task: one_task(conn, user_id, &id)?,
                activity,
            })
        })
    }

    /// Move a task among its siblings, under another parent or into another
    /// group the user may create elements in.
    pub fn reorder(&self, cond: &Conditions) -> Result<TaskMoved> {
        let user_id = cond.main_user()?;
        let moved = MoveTask::from_conditions(cond)?;
        write(self.pool, "task.reorder", |conn| {
            let loc = locate(conn, user_id, &moved.id, Access::ELEMENT_UPDATE)?;
            if let Some(target) = moved.group_id.as_deref().filter(|g| *g != loc.group_id) {
                require(conn, user_id, target, Access::ELEMENT_CREATE)?;
            }
            let outcome = TaskRepo::reorder(
                conn,
                &moved.id,
                moved.group_id.as_deref(),
                moved.parent.as_ref(),
                &moved.placement,
                &now_timestamp(),
            )?;

            let loc = TaskRepo::location(conn, &moved.id)?.ok_or(StoreError::PermissionDenied)?;
            let filter = TaskFilter {
                group_id: Some(loc.group_id),
                parent: Some(Parent::from_column(loc.parent)),
                ..TaskFilter::default()
            };
            Ok(TaskMoved {
                id: moved.id.clone(),
                group_changed: outcome.group_changed,
                parent_changed: outcome.parent_changed,
                tasks: TaskRepo::list(conn, user_id, &filter)?,
                activity: ActivityRepo::rows(conn, user_id, &outcome.activities)?,
            })
        })
    }

    /// Delete a task without child tasks, with all its activities.
    pub fn delete(&self, cond: &Conditions) -> Result<DeletedTask> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        write(self.pool, "task.delete", |conn| {
            let _ = locate(conn, user_id, &id, Access::ELEMENT_DELETE)?;
            TaskRepo::delete(conn, &id)
        })
    }
}

/// The task's location, if `access` is allowed on its group.
fn locate(conn: &Connection, user_id: i64, id: &str, access: Access) -> Result<TaskLocation> {
    let loc = TaskRepo::location(conn, id)?.ok_or(StoreError::PermissionDenied)?;
    require(conn, user_id, &loc.group_id, access)?;
    Ok(loc)
}

fn one_task(conn: &Connection, user_id: i64, id: &str) -> Result<TaskRow> {
    TaskRepo::rows(conn, user_id, &[id.to_string()])?
        .into_iter()
        .next()
        .ok_or(StoreError::PermissionDenied)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use assert_matches::assert_matches;
    use intask_core::ActivityStatus;

    use super::*;
    use crate::manager::test_support::store;
    use crate::manager::InTask;

    const T0: &str = "2019-03-01T09:00:00.000Z";

    fn as_user(user_id: i64) -> Conditions {
        Conditions::for_user(user_id)
    }

    fn personal(store: &InTask, user_id: i64) -> String {
        let groups = store
            .groups()
            .list(&as_user(user_id).with("like", "personal"))
            .unwrap();
        groups[0].id.clone()
    }

    fn new_task(store: &InTask, group: &str, name: &str) -> TaskCreated {
        store
            .tasks()
            .create(&as_user(1).with("group_id", group).with("name", name).with("start", T0))
            .unwrap()
    }

    #[test]
    fn create_returns_task_with_first_activity() {
        let store = store();
        let group = personal(&store, 1);
        let created = new_task(&store, &group, "write");

        assert_eq!(created.task.name, "write");
        assert_eq!(created.task.tid, 1);
        assert_eq!(created.task.status, Some(ActivityStatus::Created));
        assert_eq!(created.activity.len(), 1);
        assert_eq!(created.activity[0].name, "write");
        assert_eq!(created.activity[0].start, T0);
    }

    #[test]
    fn create_in_foreign_group_is_denied() {
        let store = store();
        let group = personal(&store, 2);
        let err = store
            .tasks()
            .create(&as_user(1).with("group_id", group.as_str()).with("name", "x"))
            .unwrap_err();
        assert_matches!(err, StoreError::PermissionDenied);
    }

    #[test]
    fn rename_returns_mirroring_activities() {
        let store = store();
        let group = personal(&store, 1);
        let created = new_task(&store, &group, "write");

        let updated = store
            .tasks()
            .update(&as_user(1).with("id", created.task.id.as_str()).with("name", "draft"))
            .unwrap();
        assert_eq!(updated.task.name, "draft");
        assert_eq!(updated.activity.len(), 1);
        assert_eq!(updated.activity[0].name, "draft");

        let noted = store
            .tasks()
            .update(&as_user(1).with("id", created.task.id.as_str()).with("note", "n"))
            .unwrap();
        assert!(noted.activity.is_empty());

        let err = store
            .tasks()
            .update(&as_user(1).with("id", created.task.id.as_str()).with("color", "red"))
            .unwrap_err();
        assert_matches!(err, StoreError::WrongBody);
    }

    #[test]
    fn reorder_within_group_lists_scope() {
        let store = store();
        let group = personal(&store, 1);
        let a = new_task(&store, &group, "a");
        let b = new_task(&store, &group, "b");

        let moved = store
            .tasks()
            .reorder(
                &as_user(1)
                    .with("id", b.task.id.as_str())
                    .with("position", a.task.id.as_str())
                    .with("is_before", true),
            )
            .unwrap();
        assert!(!moved.group_changed);
        let order: Vec<&str> = moved.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn move_to_group_without_create_rights_changes_nothing() {
        let store = store();
        let mine = personal(&store, 1);
        let theirs = personal(&store, 2);
        let task = new_task(&store, &mine, "a");

        let err = store
            .tasks()
            .reorder(
                &as_user(1).with("id", task.task.id.as_str()).with("group_id", theirs.as_str()),
            )
            .unwrap_err();
        assert_matches!(err, StoreError::PermissionDenied);

        let after = store
            .tasks()
            .list(&as_user(1).with("id", task.task.id.as_str()))
            .unwrap();
        assert_eq!(after[0].group_id, mine);
        assert_eq!((after[0].p, after[0].q), (task.task.p, task.task.q));
    }

    #[test]
    fn move_to_other_group_transfers_open_activity() {
        let store = store();
        let mine = personal(&store, 1);
        let work = store.groups().create(&as_user(1).with("name", "work")).unwrap();
        let task = new_task(&store, &mine, "a");

        let moved = store
            .tasks()
            .reorder(
                &as_user(1).with("id", task.task.id.as_str()).with("group_id", work.id.as_str()),
            )
            .unwrap();
        assert!(moved.group_changed);
        assert_eq!(moved.tasks.len(), 1);
        assert_eq!(moved.activity.len(), 2);
        let open: Vec<&ActivityRow> = moved.activity.iter().filter(|a| a.ends.is_none()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].group_id, work.id);
    }

    #[test]
    fn delete_parent_task_has_elements() {
        let store = store();
        let group = personal(&store, 1);
        let parent = new_task(&store, &group, "parent");
        store
            .tasks()
            .create(
                &as_user(1)
                    .with("group_id", group.as_str())
                    .with("parent_id", parent.task.id.as_str())
                    .with("name", "child"),
            )
            .unwrap();

        let err = store
            .tasks()
            .delete(&as_user(1).with("id", parent.task.id.as_str()))
            .unwrap_err();
        assert_matches!(err, StoreError::HasElements(_));
        let still = store
            .tasks()
            .list(&as_user(1).with("group_id", group.as_str()).with("limit", 10))
            .unwrap();
        assert_eq!(still.len(), 2);
    }

    #[test]
    fn delete_removes_activities() {
        let store = store();
        let group = personal(&store, 1);
        let task = new_task(&store, &group, "a");
        let deleted = store
            .tasks()
            .delete(&as_user(1).with("id", task.task.id.as_str()))
            .unwrap();
        assert_eq!(deleted.activities, vec![task.activity[0].id.clone()]);
    }
}
