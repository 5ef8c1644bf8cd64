//! Entity lifecycle managers and the [`InTask`] facade.
//!
//! A manager turns one request (a [`Conditions`](intask_core::Conditions)
//! bag) into one transaction: it checks visibility, calls the repositories
//! and reads back the rows the caller shows. Writes take the database write
//! lock up front (`BEGIN IMMEDIATE`), so concurrent writers in one scope
//! never compute keys from the same snapshot. A failed operation drops its
//! transaction, which rolls everything back.

pub mod activity;
pub mod group;
pub mod params;
pub mod task;
pub mod user;

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{ConnectionPool, verify_pragmas};
use crate::sqlite::migrations::{current_version, latest_version, run_migrations};
use crate::sqlite::repositories::position::{PositionRepo, Scope};

pub use activity::ActivityManager;
pub use group::GroupManager;
pub use task::TaskManager;
pub use user::UserManager;

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

/// Run `f` in an immediate transaction on a pooled connection and commit
/// when it succeeds.
pub(crate) fn write<T>(
    pool: &ConnectionPool,
    op: &'static str,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            debug!(op, "committed");
            Ok(value)
        }
        Err(err) => {
            log_rollback(op, &err);
            Err(err)
        }
    }
}

/// Run `f` in a deferred transaction, so every statement sees one snapshot.
pub(crate) fn read<T>(
    pool: &ConnectionPool,
    op: &'static str,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let conn = pool.get()?;
    let tx = conn.unchecked_transaction()?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            log_rollback(op, &err);
            Err(err)
        }
    }
}

fn log_rollback(op: &'static str, err: &StoreError) {
    if err.is_store_fault() {
        error!(op, error = %err, "rolled back");
    } else {
        warn!(op, error = %err, name = err.name(), "rejected");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Facade
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point of the store: owns the pool and hands out managers.
#[derive(Clone)]
pub struct InTask {
    pool: ConnectionPool,
}

/// Result of [`InTask::check`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    /// `SQLite` journal mode.
    pub journal_mode: String,
    /// Whether foreign keys are enforced.
    pub foreign_keys: bool,
    /// Applied schema version.
    pub schema_version: u32,
    /// Newest schema version this build knows.
    pub latest_version: u32,
    /// Sibling pairs sharing a key.
    pub duplicate_keys: i64,
}

impl StoreHealth {
    /// Whether nothing needs attention.
    pub fn is_healthy(&self) -> bool {
        self.foreign_keys && self.schema_version == self.latest_version && self.duplicate_keys == 0
    }
}

/// Result of [`InTask::renumber`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RenumberReport {
    /// Scopes visited.
    pub scopes: usize,
    /// Keys rewritten.
    pub rows: usize,
}

impl InTask {
    /// Wrap a pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Consume the facade, returning the pool for teardown.
    pub fn into_pool(self) -> ConnectionPool {
        self.pool
    }

    /// Group lifecycle.
    pub fn groups(&self) -> GroupManager<'_> {
        GroupManager::new(&self.pool)
    }

    /// Task lifecycle.
    pub fn tasks(&self) -> TaskManager<'_> {
        TaskManager::new(&self.pool)
    }

    /// Activity timeline.
    pub fn activity(&self) -> ActivityManager<'_> {
        ActivityManager::new(&self.pool)
    }

    /// Users.
    pub fn users(&self) -> UserManager<'_> {
        UserManager::new(&self.pool)
    }

    /// Apply pending schema migrations. Returns how many ran.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.pool.get()?;
        run_migrations(&conn)
    }

    /// Inspect pragmas, schema version and key uniqueness.
    pub fn check(&self) -> Result<StoreHealth> {
        read(&self.pool, "store.check", |conn| {
            let pragmas = verify_pragmas(conn)?;
            let health = StoreHealth {
                journal_mode: pragmas.journal_mode,
                foreign_keys: pragmas.foreign_keys_enabled,
                schema_version: current_version(conn)?,
                latest_version: latest_version(),
                duplicate_keys: PositionRepo::duplicate_keys(conn)?,
            };
            debug!(?health, "store checked");
            Ok(health)
        })
    }

    /// Give every group and task scope fresh evenly spaced keys.
    pub fn renumber(&self) -> Result<RenumberReport> {
        write(&self.pool, "store.renumber", |conn| {
            let mut report = RenumberReport::default();
            for (user_id, parent) in PositionRepo::group_scopes(conn)? {
                let scope = Scope::Groups {
                    user_id,
                    parent: parent.as_deref(),
                };
                report.rows += PositionRepo::renumber_scope(conn, scope)?;
                report.scopes += 1;
            }
            for (group_id, parent) in PositionRepo::task_scopes(conn)? {
                let scope = Scope::Tasks {
                    group_id: &group_id,
                    parent: parent.as_deref(),
                };
                report.rows += PositionRepo::renumber_scope(conn, scope)?;
                report.scopes += 1;
            }
            info!(scopes = report.scopes, rows = report.rows, "renumbered all scopes");
            Ok(report)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use intask_core::Conditions;

    use super::InTask;
    use crate::sqlite::connection::{ConnectionConfig, new_in_memory};

    /// Migrated in-memory store with users 1, 2 and 3, each with a personal
    /// group.
    pub fn store() -> InTask {
        let store = InTask::new(new_in_memory(&ConnectionConfig::default()).unwrap());
        let _ = store.migrate().unwrap();
        for (id, email) in
            [(1, "ann@example.com"), (2, "bob@example.com"), (3, "cid@example.com")]
        {
            let _ = store
                .users()
                .get_or_create(&Conditions::for_user(id).with("email", email))
                .unwrap();
        }
        store
    }
}
