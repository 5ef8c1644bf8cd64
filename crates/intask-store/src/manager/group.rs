//! Group lifecycle: create, rename, move, share, delete or leave.

use intask_core::{Access, Conditions, Parent, Placement};
use serde::Serialize;

use super::params::{CreateGroup, MoveGroup, ShareGroup, group_filter};
use super::{read, write};
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::repositories::group::{DeletedGroup, GroupFilter, GroupRepo, NewGroup};
use crate::sqlite::repositories::user::UserRepo;
use crate::sqlite::row_types::GroupRow;
use crate::sqlite::visibility::require;

/// Result of [`GroupManager::reorder`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupMove {
    /// Moved group.
    pub id: String,
    /// Whether the group got a new parent.
    pub parent_changed: bool,
    /// The caller's groups under the group's (new) parent, in order.
    pub groups: Vec<GroupRow>,
}

/// Group operations.
pub struct GroupManager<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> GroupManager<'a> {
    pub(crate) fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    /// Groups visible to the user.
    pub fn list(&self, cond: &Conditions) -> Result<Vec<GroupRow>> {
        let user_id = cond.main_user()?;
        let filter = group_filter(cond)?;
        read(self.pool, "group.list", |conn| GroupRepo::list(conn, user_id, &filter))
    }

    /// Create a group, at top level or under a group the user may create
    /// groups in.
    pub fn create(&self, cond: &Conditions) -> Result<GroupRow> {
        let user_id = cond.main_user()?;
        let params = CreateGroup::from_conditions(cond)?;
        write(self.pool, "group.create", |conn| {
            if let Some(parent) = &params.parent {
                require(conn, user_id, parent, Access::GROUP_CREATE)?;
            }
            let id = GroupRepo::add_group(
                conn,
                user_id,
                &NewGroup {
                    parent: params.parent.clone(),
                    name: params.name.clone(),
                    group_type: params.group_type,
                    thresholds: None,
                },
                &params.placement,
            )?;
            GroupRepo::get(conn, user_id, &id)?.ok_or(StoreError::PermissionDenied)
        })
    }

    /// Change the name, the only field a group allows to change.
    pub fn update(&self, cond: &Conditions) -> Result<GroupRow> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        let name = cond.optional_str("name")?;
        write(self.pool, "group.update", |conn| {
            require(conn, user_id, &id, Access::GROUP_UPDATE)?;
            let name = name.as_deref().ok_or(StoreError::WrongBody)?;
            GroupRepo::rename(conn, &id, name)?;
            GroupRepo::get(conn, user_id, &id)?.ok_or(StoreError::PermissionDenied)
        })
    }

    /// Move a group in the user's list, optionally under another parent.
    ///
    /// Reparenting needs update rights on the group and create rights on the
    /// new parent.
    pub fn reorder(&self, cond: &Conditions) -> Result<GroupMove> {
        let user_id = cond.main_user()?;
        let moved = MoveGroup::from_conditions(cond)?;
        write(self.pool, "group.reorder", |conn| {
            require(conn, user_id, &moved.id, Access::GROUP_READ)?;
            if let Some(parent) = &moved.parent {
                require(conn, user_id, &moved.id, Access::GROUP_UPDATE)?;
                if let Some(target) = parent.as_id() {
                    require(conn, user_id, target, Access::GROUP_CREATE)?;
                }
            }
            let parent_changed = GroupRepo::reorder(
                conn,
                user_id,
                &moved.id,
                moved.parent.as_ref(),
                &moved.placement,
            )?;

            let parent =
                GroupRepo::parent_of(conn, &moved.id)?.ok_or(StoreError::PermissionDenied)?;
            let filter = GroupFilter {
                parent: Some(Parent::from_column(parent)),
                ..GroupFilter::default()
            };
            Ok(GroupMove {
                id: moved.id.clone(),
                parent_changed,
                groups: GroupRepo::list(conn, user_id, &filter)?,
            })
        })
    }

    /// Give another user a membership in a group, at the tail of their own
    /// list. Returns the group as the new member sees it.
    ///
    /// The caller needs a direct membership with update rights and cannot
    /// grant a level more privileged than their own. Sharing again only
    /// changes the level.
    pub fn share(&self, cond: &Conditions) -> Result<GroupRow> {
        let user_id = cond.main_user()?;
        let share = ShareGroup::from_conditions(cond)?;
        if share.member == user_id {
            return Err(StoreError::validation("a group cannot be shared with its sharer"));
        }
        write(self.pool, "group.share", |conn| {
            require(conn, user_id, &share.id, Access::GROUP_UPDATE)?;
            let own = GroupRepo::membership(conn, &share.id, user_id)?
                .ok_or(StoreError::PermissionDenied)?
                .user_type;
            let user_type = share.user_type.unwrap_or(own);
            if user_type < own {
                return Err(StoreError::PermissionDenied);
            }
            if UserRepo::get(conn, share.member)?.is_none() {
                return Err(StoreError::validation(format!("unknown user {}", share.member)));
            }
            GroupRepo::add_member(conn, &share.id, share.member, user_type, &Placement::Tail)?;
            GroupRepo::get(conn, share.member, &share.id)?.ok_or(StoreError::PermissionDenied)
        })
    }

    /// Delete an owned group, or leave a group owned by someone else.
    pub fn delete(&self, cond: &Conditions) -> Result<DeletedGroup> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        write(self.pool, "group.delete", |conn| {
            require(conn, user_id, &id, Access::GROUP_READ)?;
            if GroupRepo::owner_of(conn, &id)? == Some(user_id) {
                require(conn, user_id, &id, Access::GROUP_DELETE)?;
            }
            GroupRepo::delete(conn, user_id, &id)
        })
    }

    /// Nesting depth of a group, zero at top level.
    pub fn depth(&self, cond: &Conditions) -> Result<i64> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        read(self.pool, "group.depth", |conn| {
            require(conn, user_id, &id, Access::GROUP_READ)?;
            GroupRepo::depth(conn, &id)?.ok_or(StoreError::PermissionDenied)
        })
    }

    /// Number of child groups the user can see.
    pub fn child_count(&self, cond: &Conditions) -> Result<i64> {
        let user_id = cond.main_user()?;
        let id = cond.require_id("id")?;
        read(self.pool, "group.child_count", |conn| {
            require(conn, user_id, &id, Access::GROUP_READ)?;
            GroupRepo::child_count(conn, user_id, &id)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use assert_matches::assert_matches;
    use intask_core::PositionError;

    use super::*;
    use crate::manager::test_support::store;

    fn as_user(user_id: i64) -> Conditions {
        Conditions::for_user(user_id)
    }

    fn names(rows: &[GroupRow]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn create_appends_to_tail_unless_start() {
        let store = store();
        let groups = store.groups();
        groups.create(&as_user(1).with("name", "work")).unwrap();
        groups.create(&as_user(1).with("name", "home").with("is_start", true)).unwrap();

        let top = groups.list(&as_user(1).with("parent_id", "0")).unwrap();
        assert_eq!(names(&top), vec!["home", "personal", "work"]);
    }

    #[test]
    fn update_without_name_is_wrong_body() {
        let store = store();
        let work = store.groups().create(&as_user(1).with("name", "work")).unwrap();
        let err = store
            .groups()
            .update(&as_user(1).with("id", work.id.as_str()).with("note", "x"))
            .unwrap_err();
        assert_matches!(err, StoreError::WrongBody);

        let renamed = store
            .groups()
            .update(&as_user(1).with("id", work.id.as_str()).with("name", "office"))
            .unwrap();
        assert_eq!(renamed.name, "office");
    }

    #[test]
    fn stranger_is_denied_everywhere() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        let id = work.id.as_str();

        assert_matches!(
            groups.update(&as_user(2).with("id", id).with("name", "x")),
            Err(StoreError::PermissionDenied)
        );
        assert_matches!(
            groups.delete(&as_user(2).with("id", id)),
            Err(StoreError::PermissionDenied)
        );
        assert_matches!(
            groups.reorder(&as_user(2).with("id", id)),
            Err(StoreError::PermissionDenied)
        );
        assert_matches!(
            groups.depth(&as_user(2).with("id", id)),
            Err(StoreError::PermissionDenied)
        );
        assert_matches!(
            groups.create(&as_user(2).with("name", "sub").with("parent_id", id)),
            Err(StoreError::PermissionDenied)
        );
        assert!(groups.list(&as_user(2).with("id", id)).unwrap().is_empty());
    }

    #[test]
    fn reparent_reports_change_and_new_siblings() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        let home = groups.create(&as_user(1).with("name", "home")).unwrap();

        let moved = groups
            .reorder(&as_user(1).with("id", home.id.as_str()).with("parent_id", work.id.as_str()))
            .unwrap();
        assert!(moved.parent_changed);
        assert_eq!(names(&moved.groups), vec!["home"]);
        assert_eq!(groups.depth(&as_user(1).with("id", home.id.as_str())).unwrap(), 1);
        assert_eq!(groups.child_count(&as_user(1).with("id", work.id.as_str())).unwrap(), 1);

        let err = groups
            .reorder(&as_user(1).with("id", work.id.as_str()).with("parent_id", home.id.as_str()))
            .unwrap_err();
        assert_eq!(err.name(), "ValidationError");
    }

    #[test]
    fn reorder_before_sibling() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        let home = groups.create(&as_user(1).with("name", "home")).unwrap();

        let moved = groups
            .reorder(
                &as_user(1)
                    .with("id", home.id.as_str())
                    .with("position", work.id.as_str())
                    .with("is_before", true),
            )
            .unwrap();
        assert!(!moved.parent_changed);
        assert_eq!(names(&moved.groups), vec!["personal", "home", "work"]);
    }

    #[test]
    fn unknown_reference_is_a_conflict() {
        let store = store();
        let work = store.groups().create(&as_user(1).with("name", "work")).unwrap();
        let err = store
            .groups()
            .reorder(&as_user(1).with("id", work.id.as_str()).with("position", "zzzz9999"))
            .unwrap_err();
        assert_matches!(err, StoreError::Conflict(PositionError::ReferenceNotFound(_)));
    }

    #[test]
    fn delete_with_child_group_has_elements() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        groups
            .create(&as_user(1).with("name", "sub").with("parent_id", work.id.as_str()))
            .unwrap();

        let err = groups.delete(&as_user(1).with("id", work.id.as_str())).unwrap_err();
        assert_matches!(err, StoreError::HasElements(_));
        assert_eq!(groups.list(&as_user(1)).unwrap().len(), 3);
    }

    #[test]
    fn shared_group_reaches_the_member() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        let id = work.id.as_str();

        let seen = groups.share(&as_user(1).with("id", id).with("user_id", 2)).unwrap();
        assert_eq!(seen.user_type, Some(1));
        assert_eq!(names(&groups.list(&as_user(2).with("id", id)).unwrap()), vec!["work"]);
        store
            .tasks()
            .create(&as_user(2).with("group_id", id).with("name", "joint"))
            .unwrap();

        let top = groups.list(&as_user(2).with("parent_id", "0")).unwrap();
        assert_eq!(names(&top), vec!["personal", "work"]);
    }

    #[test]
    fn share_cannot_raise_privilege() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        let id = work.id.as_str();
        {
            let conn = store.pool().get().unwrap();
            conn.execute("UPDATE groups SET reading = 2, updating = 2 WHERE id = ?1", [id])
                .unwrap();
        }
        groups
            .share(&as_user(1).with("id", id).with("user_id", 2).with("user_type", 2))
            .unwrap();

        assert_matches!(
            groups.share(&as_user(2).with("id", id).with("user_id", 3).with("user_type", 1)),
            Err(StoreError::PermissionDenied)
        );
        let granted = groups.share(&as_user(2).with("id", id).with("user_id", 3)).unwrap();
        assert_eq!(granted.user_type, Some(2));
    }

    #[test]
    fn share_rejects_bad_targets() {
        let store = store();
        let groups = store.groups();
        let work = groups.create(&as_user(1).with("name", "work")).unwrap();
        let id = work.id.as_str();

        let unknown = groups.share(&as_user(1).with("id", id).with("user_id", 99)).unwrap_err();
        assert_eq!(unknown.name(), "ValidationError");
        let oneself = groups.share(&as_user(1).with("id", id).with("user_id", 1)).unwrap_err();
        assert_eq!(oneself.name(), "ValidationError");
        assert_matches!(
            groups.share(&as_user(2).with("id", id).with("user_id", 3)),
            Err(StoreError::PermissionDenied)
        );
    }
}
