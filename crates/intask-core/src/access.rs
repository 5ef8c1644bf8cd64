//! Access levels, per-group thresholds and element kinds.
//!
//! A membership grants a `user_type` on a group; lower values are more
//! privileged. An operation is allowed when every threshold column that guards
//! it is `>= user_type`. Group metadata and the elements (tasks, activities)
//! contained in a group are guarded by separate sets of columns.

use serde::{Deserialize, Serialize};

/// Membership `user_id` that makes a group visible to everybody.
pub const PUBLIC_USER: i64 = 0;

/// `user_type` granted to the creator of a group.
pub const OWNER_LEVEL: i64 = 1;

/// What the caller wants to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// List or fetch.
    Read,
    /// Add something inside the group.
    Create,
    /// Change fields or position.
    Update,
    /// Remove.
    Delete,
}

/// What the operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// The group row itself (name, parent, child groups).
    Group,
    /// Tasks and activities held by the group.
    Element,
}

/// An operation on a subject, mapped to the threshold columns guarding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    /// Group metadata or contained elements.
    pub subject: Subject,
    /// Requested operation.
    pub operation: Operation,
}

impl Access {
    /// See a group in listings.
    pub const GROUP_READ: Self = Self::new(Subject::Group, Operation::Read);
    /// Create a child group.
    pub const GROUP_CREATE: Self = Self::new(Subject::Group, Operation::Create);
    /// Rename or reorder a group.
    pub const GROUP_UPDATE: Self = Self::new(Subject::Group, Operation::Update);
    /// Delete a group.
    pub const GROUP_DELETE: Self = Self::new(Subject::Group, Operation::Delete);
    /// See tasks and activities.
    pub const ELEMENT_READ: Self = Self::new(Subject::Element, Operation::Read);
    /// Add tasks and activities.
    pub const ELEMENT_CREATE: Self = Self::new(Subject::Element, Operation::Create);
    /// Edit or move tasks and activities.
    pub const ELEMENT_UPDATE: Self = Self::new(Subject::Element, Operation::Update);
    /// Delete tasks and activities.
    pub const ELEMENT_DELETE: Self = Self::new(Subject::Element, Operation::Delete);

    /// Combine a subject and an operation.
    pub const fn new(subject: Subject, operation: Operation) -> Self {
        Self { subject, operation }
    }

    /// `groups` columns that must all be `>= user_type`.
    ///
    /// The group must always be readable; writes add their own column.
    pub const fn threshold_columns(self) -> &'static [&'static str] {
        match (self.subject, self.operation) {
            (Subject::Group, Operation::Read) => &["reading"],
            (Subject::Group, Operation::Create) => &["reading", "creating"],
            (Subject::Group, Operation::Update) => &["reading", "updating"],
            (Subject::Group, Operation::Delete) => &["reading", "deleting"],
            (Subject::Element, Operation::Read) => &["reading", "el_reading"],
            (Subject::Element, Operation::Create) => &["reading", "el_creating"],
            (Subject::Element, Operation::Update) => &["reading", "el_updating"],
            (Subject::Element, Operation::Delete) => &["reading", "el_deleting"],
        }
    }
}

/// The eight per-group thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Create child groups.
    pub creating: i64,
    /// See the group.
    pub reading: i64,
    /// Rename or move the group.
    pub updating: i64,
    /// Delete the group.
    pub deleting: i64,
    /// Add elements.
    pub el_creating: i64,
    /// See elements.
    pub el_reading: i64,
    /// Edit or move elements.
    pub el_updating: i64,
    /// Delete elements.
    pub el_deleting: i64,
}

impl Default for Thresholds {
    /// Only owners may do anything.
    fn default() -> Self {
        Self::uniform(OWNER_LEVEL)
    }
}

impl Thresholds {
    /// Every threshold set to `level`.
    pub const fn uniform(level: i64) -> Self {
        Self {
            creating: level,
            reading: level,
            updating: level,
            deleting: level,
            el_creating: level,
            el_reading: level,
            el_updating: level,
            el_deleting: level,
        }
    }

    /// Value of a threshold column by name.
    pub fn column(&self, name: &str) -> Option<i64> {
        Some(match name {
            "creating" => self.creating,
            "reading" => self.reading,
            "updating" => self.updating,
            "deleting" => self.deleting,
            "el_creating" => self.el_creating,
            "el_reading" => self.el_reading,
            "el_updating" => self.el_updating,
            "el_deleting" => self.el_deleting,
            _ => return None,
        })
    }

    /// Whether a membership with `user_type` may perform `access`.
    pub fn permits(&self, user_type: i64, access: Access) -> bool {
        access
            .threshold_columns()
            .iter()
            .all(|col| self.column(col).is_some_and(|t| t >= user_type))
    }
}

/// Bitmask describing what kind of element a membership row holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementType(pub i64);

impl ElementType {
    /// Activity not linked to a task.
    pub const FREE_TIME: Self = Self(1);
    /// Activity linked to a task (requires `task_id`).
    pub const ACTIVITY: Self = Self(2);
    /// Task.
    pub const TASK: Self = Self(4);
    /// Group.
    pub const GROUP: Self = Self(8);
    /// User.
    pub const USER: Self = Self(16);

    /// Raw bits.
    pub const fn bits(self) -> i64 {
        self.0
    }

    /// Whether any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether this activity kind must reference a task.
    pub const fn requires_task(self) -> bool {
        self.intersects(Self::ACTIVITY)
    }

    /// Whether the value is one of the kinds an activity row may carry.
    pub const fn is_activity_kind(self) -> bool {
        self.0 == Self::FREE_TIME.0 || self.0 == Self::ACTIVITY.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_writes_also_need_group_read() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            let cols = Access::new(Subject::Element, op).threshold_columns();
            assert_eq!(cols[0], "reading");
            assert_eq!(cols.len(), 2);
        }
    }

    #[test]
    fn owner_passes_default_thresholds() {
        let t = Thresholds::default();
        assert!(t.permits(OWNER_LEVEL, Access::GROUP_DELETE));
        assert!(t.permits(OWNER_LEVEL, Access::ELEMENT_CREATE));
        assert!(!t.permits(2, Access::GROUP_READ));
    }

    #[test]
    fn stricter_write_threshold_blocks_readers() {
        let t = Thresholds {
            reading: 3,
            el_reading: 3,
            el_creating: 1,
            ..Thresholds::default()
        };
        assert!(t.permits(3, Access::ELEMENT_READ));
        assert!(!t.permits(3, Access::ELEMENT_CREATE));
        assert!(t.permits(1, Access::ELEMENT_CREATE));
    }

    #[test]
    fn unknown_column_is_none() {
        assert_eq!(Thresholds::default().column("owner"), None);
        assert_eq!(Thresholds::uniform(4).column("el_deleting"), Some(4));
    }

    #[test]
    fn element_type_bits() {
        assert!(ElementType::ACTIVITY.requires_task());
        assert!(!ElementType::FREE_TIME.requires_task());
        assert!(ElementType(3).intersects(ElementType::FREE_TIME));
        assert!(!ElementType::TASK.is_activity_kind());
        assert!(ElementType::FREE_TIME.is_activity_kind());
    }
}
