//! User bootstrap and profile.

use intask_core::Conditions;

use super::{read, write};
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::repositories::user::{EnsuredUser, UserRepo};
use crate::sqlite::row_types::UserRow;

/// User operations.
pub struct UserManager<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> UserManager<'a> {
    pub(crate) fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    /// The authenticated user, created with a personal group on first call.
    pub fn get_or_create(&self, cond: &Conditions) -> Result<EnsuredUser> {
        let user_id = cond.main_user()?;
        let email = cond.optional_str("email")?;
        write(self.pool, "user.get_or_create", |conn| {
            UserRepo::get_or_create(conn, user_id, email.as_deref())
        })
    }

    /// The authenticated user.
    pub fn get(&self, cond: &Conditions) -> Result<UserRow> {
        let user_id = cond.main_user()?;
        read(self.pool, "user.get", |conn| {
            UserRepo::get(conn, user_id)?.ok_or(StoreError::PermissionDenied)
        })
    }

    /// Replace the user's avatar with `url`.
    pub fn set_avatar(&self, cond: &Conditions) -> Result<UserRow> {
        let user_id = cond.main_user()?;
        let url = cond.require_str("url")?;
        write(self.pool, "user.set_avatar", |conn| {
            let user = UserRepo::get(conn, user_id)?.ok_or(StoreError::PermissionDenied)?;
            UserRepo::set_avatar(conn, user.id, &url)?;
            UserRepo::get(conn, user_id)?.ok_or(StoreError::PermissionDenied)
        })
    }
}
