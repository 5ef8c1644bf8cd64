//! Typed request parameters, read out of a [`Conditions`] bag.
//!
//! Field names follow the API layer: `id`, `parent_id`, `group_id`,
//! `task_id`, `user_id` (co-member filter), `like`, `limit`, `offset`,
//! `is_start`, `position`, `is_before`, `check_one`, `user_type`.

use intask_core::ids::now_timestamp;
use intask_core::{ActivityStatus, ConditionError, Conditions, ElementType, Parent, Placement};

use crate::errors::Result;
use crate::sqlite::query::Page;
use crate::sqlite::repositories::activity::ActivityFilter;
use crate::sqlite::repositories::group::GroupFilter;
use crate::sqlite::repositories::task::{TaskChanges, TaskFilter};

/// Page size of a group listing when the request names none.
pub const DEFAULT_GROUP_LIMIT: i64 = 30;

fn malformed(parameter: &str, reason: &str) -> ConditionError {
    ConditionError::Malformed {
        parameter: parameter.to_string(),
        reason: reason.to_string(),
    }
}

/// Page for listings that must be bounded unless one row is selected.
fn bounded_page(cond: &Conditions, ids: Option<&Vec<String>>) -> Result<Page> {
    let limit = cond.limit(None)?;
    let single = ids.is_some_and(|ids| ids.len() == 1);
    if limit.is_none() && !single {
        return Err(ConditionError::Missing("limit".to_string()).into());
    }
    Ok(Page::new(limit, cond.offset()?))
}

/// Placement from `position` / `is_before`.
fn move_placement(cond: &Conditions) -> Result<Placement> {
    let position = cond.optional_id("position")?;
    let is_before = cond.flag("is_before")?.unwrap_or(false);
    Ok(Placement::for_move(position, is_before))
}

/// Placement of a new element from `is_start`.
fn create_placement(cond: &Conditions) -> Result<Placement> {
    Ok(Placement::for_create(cond.flag("is_start")?.unwrap_or(false)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Groups
// ─────────────────────────────────────────────────────────────────────────────

/// Group listing filter.
pub fn group_filter(cond: &Conditions) -> Result<GroupFilter> {
    Ok(GroupFilter {
        ids: cond.optional_id_list("id")?,
        parent: cond.optional_parent("parent_id")?,
        member: cond.optional_i64("user_id")?,
        group_type: cond.optional_i64("group_type")?,
        like: cond.optional_str("like")?,
        page: Page::new(cond.limit(Some(DEFAULT_GROUP_LIMIT))?, cond.offset()?),
    })
}

/// Parameters of a group to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateGroup {
    /// Parent group, `None` for top level.
    pub parent: Option<String>,
    /// Display name.
    pub name: String,
    /// Group kind.
    pub group_type: i64,
    /// Where to put it in the creator's list.
    pub placement: Placement,
}

impl CreateGroup {
    /// Kind given to groups created by users.
    pub const DEFAULT_TYPE: i64 = 2;

    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        let parent = cond
            .optional_parent("parent_id")?
            .and_then(|p| p.as_id().map(str::to_string));
        Ok(Self {
            parent,
            name: cond.optional_str("name")?.unwrap_or_default(),
            group_type: cond.optional_i64("group_type")?.unwrap_or(Self::DEFAULT_TYPE),
            placement: create_placement(cond)?,
        })
    }
}

/// Parameters of a group move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveGroup {
    /// Group to move.
    pub id: String,
    /// New parent, `None` to keep the current one.
    pub parent: Option<Parent>,
    /// Where to put it among its new siblings.
    pub placement: Placement,
}

impl MoveGroup {
    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        Ok(Self {
            id: cond.require_id("id")?,
            parent: cond.optional_parent("parent_id")?,
            placement: move_placement(cond)?,
        })
    }
}

/// Parameters of sharing a group with another user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareGroup {
    /// Group to share.
    pub id: String,
    /// User receiving the membership.
    pub member: i64,
    /// Access level to grant, `None` for the caller's own.
    pub user_type: Option<i64>,
}

impl ShareGroup {
    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        let member = cond.require_i64("user_id")?;
        if member <= 0 {
            return Err(malformed("user_id", "must be positive").into());
        }
        let user_type = cond.optional_i64("user_type")?;
        if user_type.is_some_and(|level| level < 1) {
            return Err(malformed("user_type", "must be at least 1").into());
        }
        Ok(Self {
            id: cond.require_id("id")?,
            member,
            user_type,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Task listing filter. `limit` is required unless a single `id` is asked.
pub fn task_filter(cond: &Conditions) -> Result<TaskFilter> {
    let ids = cond.optional_id_list("id")?;
    let page = bounded_page(cond, ids.as_ref())?;
    Ok(TaskFilter {
        ids,
        group_id: cond.optional_id("group_id")?,
        parent: cond.optional_parent("parent_id")?,
        member: cond.optional_i64("user_id")?,
        like: cond.optional_str("like")?,
        page,
    })
}

/// Parameters of a task to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTask {
    /// Group to create it in.
    pub group_id: String,
    /// Parent task, `None` for top level.
    pub parent: Option<String>,
    /// Display name.
    pub name: String,
    /// Free text.
    pub note: String,
    /// Only one activity at a time across members.
    pub singular: bool,
    /// Start of the first activity.
    pub start: String,
    /// Where to put it among its siblings.
    pub placement: Placement,
}

impl CreateTask {
    /// Read from a condition bag. `start` defaults to now.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        let parent = cond
            .optional_parent("parent_id")?
            .and_then(|p| p.as_id().map(str::to_string));
        Ok(Self {
            group_id: cond.require_id("group_id")?,
            parent,
            name: cond.optional_str("name")?.unwrap_or_default(),
            note: cond.optional_str("note")?.unwrap_or_default(),
            singular: cond.flag("singular")?.unwrap_or(false),
            start: cond
                .optional_timestamp("start")?
                .unwrap_or_else(now_timestamp),
            placement: create_placement(cond)?,
        })
    }
}

/// Allow-listed task fields.
pub fn task_changes(cond: &Conditions) -> Result<TaskChanges> {
    Ok(TaskChanges {
        name: cond.optional_str("name")?,
        note: cond.optional_str("note")?,
        singular: cond.flag("singular")?,
    })
}

/// Parameters of a task move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveTask {
    /// Task to move.
    pub id: String,
    /// Target group, `None` to stay.
    pub group_id: Option<String>,
    /// New parent, `None` to keep the current one.
    pub parent: Option<Parent>,
    /// Where to put it among its new siblings.
    pub placement: Placement,
}

impl MoveTask {
    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        Ok(Self {
            id: cond.require_id("id")?,
            group_id: cond.optional_id("group_id")?,
            parent: cond.optional_parent("parent_id")?,
            placement: move_placement(cond)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Activities
// ─────────────────────────────────────────────────────────────────────────────

/// Activity listing filter. `limit` is required unless a single `id` is
/// asked.
pub fn activity_filter(cond: &Conditions) -> Result<ActivityFilter> {
    let ids = cond.optional_id_list("id")?;
    let page = bounded_page(cond, ids.as_ref())?;
    Ok(ActivityFilter {
        ids,
        group_id: cond.optional_id("group_id")?,
        task_ids: cond.optional_id_list("task_id")?,
        user_id: cond.optional_i64("user_id")?,
        type_el: cond.optional_i64("type_el")?,
        like: cond.optional_str("like")?,
        page,
    })
}

/// Parameters of an activity to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateActivity {
    /// Group to file it under.
    pub group_id: String,
    /// Element kind.
    pub type_el: ElementType,
    /// Linked task, required for task activities.
    pub task_id: Option<String>,
    /// Requested status, inherited from the open activity when absent.
    pub status: Option<ActivityStatus>,
    /// When it starts.
    pub start: String,
    /// Own name, shown for free time.
    pub name: String,
    /// Free text.
    pub note: String,
    /// Counts as productive time.
    pub productive: bool,
}

impl CreateActivity {
    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        let type_el = ElementType(cond.require_i64("type_el")?);
        if !type_el.is_activity_kind() {
            return Err(malformed("type_el", "not an activity kind").into());
        }
        let task_id = if type_el.requires_task() {
            Some(cond.require_id("task_id")?)
        } else {
            cond.optional_id("task_id")?
        };
        let status = cond
            .optional_i64("status")?
            .map(|code| {
                ActivityStatus::from_code(code).ok_or_else(|| malformed("status", "unknown status"))
            })
            .transpose()?;
        Ok(Self {
            group_id: cond.require_id("group_id")?,
            type_el,
            task_id,
            status,
            start: cond.require_timestamp("start")?,
            name: cond.optional_str("name")?.unwrap_or_default(),
            note: cond.optional_str("note")?.unwrap_or_default(),
            productive: cond.flag("productive")?.unwrap_or(true),
        })
    }
}

/// Parameters of an activity move in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveActivity {
    /// Activity to move.
    pub id: String,
    /// New start.
    pub start: Option<String>,
    /// New end.
    pub ends: Option<String>,
}

impl MoveActivity {
    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        Ok(Self {
            id: cond.require_id("id")?,
            start: cond.optional_timestamp("start")?,
            ends: cond.optional_timestamp("ends")?,
        })
    }
}

/// Which move bound to look up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Restriction {
    /// The member's latest activity.
    LastElement,
    /// The activity bounding how far `id` may move back.
    Move(String),
}

impl Restriction {
    /// Read from a condition bag.
    pub fn from_conditions(cond: &Conditions) -> Result<Self> {
        match cond.require_str("type")?.as_str() {
            "last_element" => Ok(Self::LastElement),
            "move" => Ok(Self::Move(cond.require_id("id")?)),
            _ => Err(malformed("type", "expected move or last_element").into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
