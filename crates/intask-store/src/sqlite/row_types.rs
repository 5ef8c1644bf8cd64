//! Row structs returned to callers and their `rusqlite` mappers.
//!
//! Listing rows are denormalized: a group row carries the caller's
//! membership, a task row the caller's current activity status and tracked
//! duration, an activity row the task name and the member's avatar.

use intask_core::{ActivityStatus, OrderKey, Thresholds};
use rusqlite::Row;
use serde::Serialize;

/// A group as seen by one user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupRow {
    /// Group key.
    pub id: String,
    /// Parent group, `None` at top level.
    pub parent: Option<String>,
    /// Display name.
    pub name: String,
    /// 1 for a user's personal group, 0 otherwise.
    pub group_type: i64,
    /// Creating user.
    pub owner: i64,
    /// Caller's own membership level, `None` when visible only through a
    /// public membership or an ancestor.
    pub user_type: Option<i64>,
    /// Access thresholds.
    #[serde(flatten)]
    pub thresholds: Thresholds,
    /// Caller's order key, `None` without an own membership.
    pub p: Option<i64>,
    /// See `p`.
    pub q: Option<i64>,
}

impl GroupRow {
    /// Columns expected by [`GroupRow::from_row`], for `g` = groups and
    /// `gl` = the caller's membership.
    pub const COLUMNS: &'static str =
        "g.id, g.parent, g.name, g.group_type, g.owner, gl.user_type, \
         g.creating, g.reading, g.updating, g.deleting, \
         g.el_creating, g.el_reading, g.el_updating, g.el_deleting, gl.p, gl.q";

    /// Map a row selected with [`GroupRow::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            parent: row.get("parent")?,
            name: row.get("name")?,
            group_type: row.get("group_type")?,
            owner: row.get("owner")?,
            user_type: row.get("user_type")?,
            thresholds: Thresholds {
                creating: row.get("creating")?,
                reading: row.get("reading")?,
                updating: row.get("updating")?,
                deleting: row.get("deleting")?,
                el_creating: row.get("el_creating")?,
                el_reading: row.get("el_reading")?,
                el_updating: row.get("el_updating")?,
                el_deleting: row.get("el_deleting")?,
            },
            p: row.get("p")?,
            q: row.get("q")?,
        })
    }

    /// The caller's order key, if they hold a membership.
    pub fn key(&self) -> Option<OrderKey> {
        Some(OrderKey {
            p: self.p?,
            q: self.q?,
        })
    }
}

/// A task with the caller's current activity state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskRow {
    /// Task key.
    pub id: String,
    /// Per-owner sequence number.
    pub tid: i64,
    /// Group holding the task.
    pub group_id: String,
    /// Parent task, `None` at top level of the group.
    pub parent: Option<String>,
    /// Display name.
    pub name: String,
    /// Free text.
    pub note: String,
    /// Only one activity is meaningful at a time.
    pub singular: bool,
    /// Creating user.
    pub owner: i64,
    /// Order key numerator.
    pub p: i64,
    /// Order key denominator.
    pub q: i64,
    /// Number of direct child tasks.
    pub havechild: i64,
    /// Status of the caller's current activity for the task.
    pub status: Option<ActivityStatus>,
    /// Start of that activity.
    pub start: Option<String>,
    /// Milliseconds tracked by the caller in running statuses.
    pub duration: i64,
}

impl TaskRow {
    /// Map a row produced by the task listing query.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            tid: row.get("tid")?,
            group_id: row.get("group_id")?,
            parent: row.get("parent")?,
            name: row.get("name")?,
            note: row.get("note")?,
            singular: row.get("singular")?,
            owner: row.get("owner")?,
            p: row.get("p")?,
            q: row.get("q")?,
            havechild: row.get("havechild")?,
            status: status_column(row, "status")?,
            start: row.get("start")?,
            duration: row.get("duration")?,
        })
    }

    /// Order key within the task's scope.
    pub fn key(&self) -> OrderKey {
        OrderKey {
            p: self.p,
            q: self.q,
        }
    }
}

/// An activity with its membership and display fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityRow {
    /// Activity key.
    pub id: String,
    /// Group holding the activity.
    pub group_id: String,
    /// Member the activity belongs to.
    pub user_id: i64,
    /// Element kind bitmask.
    pub type_el: i64,
    /// Linked task, `None` for free time.
    pub task_id: Option<String>,
    /// Task name for linked activities, own name otherwise.
    pub name: String,
    /// Linked task is singular.
    pub singular: Option<bool>,
    /// Free text.
    pub note: String,
    /// Counts as productive time.
    pub productive: bool,
    /// Sequence number within the task for this member.
    pub part: i64,
    /// Status.
    pub status: ActivityStatus,
    /// Creating user.
    pub owner: i64,
    /// Start timestamp.
    pub start: String,
    /// End timestamp, `None` while open.
    pub ends: Option<String>,
    /// Member's avatar URL.
    pub avatar: Option<String>,
}

impl ActivityRow {
    /// Columns expected by [`ActivityRow::from_row`], for `al` =
    /// `activity_list`, `act` = activity, `t` = tasks, `uf` = `users_photo`.
    pub const COLUMNS: &'static str = "al.id, al.group_id, al.user_id, al.type_el, act.task_id, \
         COALESCE(t.name, act.name) AS name, t.singular, act.note, act.productive, act.part, \
         act.status, act.owner, act.start, act.ends, uf.url AS avatar";

    /// Joins backing [`ActivityRow::COLUMNS`].
    pub const FROM: &'static str = "activity_list AS al \
         JOIN activity AS act ON act.id = al.id \
         LEFT JOIN tasks AS t ON t.id = act.task_id \
         LEFT JOIN users_photo AS uf ON uf.user_id = al.user_id AND uf.is_avatar = 1";

    /// Map a row selected with [`ActivityRow::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            group_id: row.get("group_id")?,
            user_id: row.get("user_id")?,
            type_el: row.get("type_el")?,
            task_id: row.get("task_id")?,
            name: row.get("name")?,
            singular: row.get("singular")?,
            note: row.get("note")?,
            productive: row.get("productive")?,
            part: row.get("part")?,
            status: status_column(row, "status")?
                .unwrap_or(ActivityStatus::Created),
            owner: row.get("owner")?,
            start: row.get("start")?,
            ends: row.get("ends")?,
            avatar: row.get("avatar")?,
        })
    }
}

/// A stored activity with the fields the status machine works on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityRecord {
    /// Activity key.
    pub id: String,
    /// Linked task.
    pub task_id: Option<String>,
    /// Group holding the activity.
    pub group_id: String,
    /// Member the activity belongs to.
    pub user_id: i64,
    /// Element kind bitmask.
    pub type_el: i64,
    /// Status.
    pub status: ActivityStatus,
    /// Sequence number within the task.
    pub part: i64,
    /// Start timestamp.
    pub start: String,
    /// End timestamp, `None` while open.
    pub ends: Option<String>,
}

impl ActivityRecord {
    /// Columns expected by [`ActivityRecord::from_row`].
    pub const COLUMNS: &'static str =
        "act.id, act.task_id, al.group_id, al.user_id, al.type_el, \
         act.status, act.part, act.start, act.ends";

    /// Map a row selected with [`ActivityRecord::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            group_id: row.get("group_id")?,
            user_id: row.get("user_id")?,
            type_el: row.get("type_el")?,
            status: status_column(row, "status")?.unwrap_or(ActivityStatus::Created),
            part: row.get("part")?,
            start: row.get("start")?,
            ends: row.get("ends")?,
        })
    }

    /// Whether the activity has no end yet.
    pub fn is_open(&self) -> bool {
        self.ends.is_none()
    }
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserRow {
    /// User id.
    pub id: i64,
    /// Login email.
    pub email: Option<String>,
    /// Display name.
    pub username: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Registration timestamp.
    pub created_at: String,
}

impl UserRow {
    /// Map a `users` row joined with the avatar as `avatar`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            username: row.get("username")?,
            avatar: row.get("avatar")?,
            created_at: row.get("created_at")?,
        })
    }
}

fn status_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<ActivityStatus>> {
    let code: Option<i64> = row.get(column)?;
    code.map(|c| {
        ActivityStatus::from_code(c).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Integer,
                format!("unknown activity status {c}").into(),
            )
        })
    })
    .transpose()
}
