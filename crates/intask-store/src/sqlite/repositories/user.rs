//! Users and their avatars.

use intask_core::ids::now_timestamp;
use intask_core::Placement;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use super::group::{GroupRepo, NewGroup};
use crate::errors::Result;
use crate::sqlite::row_types::UserRow;

/// Name of the group every user gets on registration.
pub const PERSONAL_GROUP_NAME: &str = "personal";

/// `group_type` of a personal group.
pub const PERSONAL_GROUP_TYPE: i64 = 1;

/// Outcome of [`UserRepo::get_or_create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnsuredUser {
    /// The user row.
    pub user: UserRow,
    /// Personal group id, set only when the user was created now.
    pub personal_group: Option<String>,
}

/// User repository.
pub struct UserRepo;

impl UserRepo {
    /// Get a user by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
        let user = conn
            .query_row(
                "SELECT u.id, u.email, u.username, u.created_at, uf.url AS avatar
                 FROM users AS u
                 LEFT JOIN users_photo AS uf ON uf.user_id = u.id AND uf.is_avatar = 1
                 WHERE u.id = ?1",
                params![id],
                UserRow::from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Insert a user row.
    pub fn create(conn: &Connection, id: i64, email: Option<&str>, username: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO users (id, email, username, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, username, now_timestamp()],
        )?;
        Ok(())
    }

    /// Return the user, creating it together with its personal group when it
    /// does not exist yet.
    pub fn get_or_create(conn: &Connection, id: i64, email: Option<&str>) -> Result<EnsuredUser> {
        if let Some(user) = Self::get(conn, id)? {
            return Ok(EnsuredUser {
                user,
                personal_group: None,
            });
        }

        let username = email
            .and_then(|e| e.split('@').next())
            .unwrap_or_default();
        Self::create(conn, id, email, username)?;
        let group_id = GroupRepo::add_group(
            conn,
            id,
            &NewGroup {
                parent: None,
                name: PERSONAL_GROUP_NAME.to_string(),
                group_type: PERSONAL_GROUP_TYPE,
                thresholds: None,
            },
            &Placement::Head,
        )?;
        info!(user_id = id, group_id = %group_id, "created user with personal group");

        let user = Self::get(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(EnsuredUser {
            user,
            personal_group: Some(group_id),
        })
    }

    /// Make `url` the user's avatar, replacing any previous one.
    pub fn set_avatar(conn: &Connection, user_id: i64, url: &str) -> Result<()> {
        let _ = conn.execute(
            "UPDATE users_photo SET is_avatar = 0 WHERE user_id = ?1 AND is_avatar = 1",
            params![user_id],
        )?;
        let _ = conn.execute(
            "INSERT INTO users_photo (user_id, url, is_avatar) VALUES (?1, ?2, 1)",
            params![user_id, url],
        )?;
        Ok(())
    }
}
