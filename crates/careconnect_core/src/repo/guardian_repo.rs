//! Guardian record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `guardians` table.
//! - Resolve guardians by id or by owning user account.
//!
//! # Invariants
//! - One guardian record per `user_id` (`UNIQUE` in storage).
//! - A guardian that is the only guardian of some child cannot be deleted;
//!   the check and the cascading delete run in one `IMMEDIATE` transaction.

use crate::db::{bool_to_int, now_epoch_ms};
use crate::model::guardian::{Guardian, GuardianId, UserId};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::support::{
    ensure_connection_ready, read_bool, read_uuid, RowDecodeError, TableSpec,
};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const GUARDIAN_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    relationship,
    emergency_contact,
    pickup_authorized,
    created_at,
    updated_at
FROM guardians";

const GUARDIAN_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "guardians",
        columns: &[
            "id",
            "user_id",
            "relationship",
            "emergency_contact",
            "pickup_authorized",
            "created_at",
            "updated_at",
        ],
    },
    TableSpec {
        name: "child_guardians",
        columns: &["child_id", "guardian_id"],
    },
];

/// Repository interface for guardian records.
pub trait GuardianRepository {
    fn create_guardian(&self, guardian: &Guardian) -> RepoResult<Guardian>;
    fn get_guardian(&self, id: GuardianId) -> RepoResult<Option<Guardian>>;
    fn guardian_exists(&self, id: GuardianId) -> RepoResult<bool>;
    fn find_by_user_id(&self, user_id: UserId) -> RepoResult<Option<Guardian>>;
    fn update_guardian(&self, guardian: &Guardian) -> RepoResult<Guardian>;
    fn list_guardians(&self) -> RepoResult<Vec<Guardian>>;
    /// Deletes a guardian and its relationship rows, unless that would leave
    /// a child with no guardian at all.
    fn delete_guardian(&self, id: GuardianId) -> RepoResult<()>;
}

/// SQLite-backed guardian repository.
pub struct SqliteGuardianRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGuardianRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready::<RepoError>(conn, GUARDIAN_TABLES)?;
        Ok(Self { conn })
    }
}

impl GuardianRepository for SqliteGuardianRepository<'_> {
    fn create_guardian(&self, guardian: &Guardian) -> RepoResult<Guardian> {
        guardian.validate()?;
        let now = now_epoch_ms();
        self.conn
            .execute(
                "INSERT INTO guardians (
                    id,
                    user_id,
                    relationship,
                    emergency_contact,
                    pickup_authorized,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
                params![
                    guardian.id.to_string(),
                    guardian.user_id.to_string(),
                    guardian.relationship.trim(),
                    guardian.emergency_contact.as_deref(),
                    bool_to_int(guardian.pickup_authorized),
                    now,
                ],
            )
            .map_err(|err| map_user_conflict(err, guardian.user_id))?;
        load_required_guardian(self.conn, guardian.id)
    }

    fn get_guardian(&self, id: GuardianId) -> RepoResult<Option<Guardian>> {
        query_one_guardian(self.conn, "id", id)
    }

    fn guardian_exists(&self, id: GuardianId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM guardians WHERE id = ?1;",
                [id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn find_by_user_id(&self, user_id: UserId) -> RepoResult<Option<Guardian>> {
        query_one_guardian(self.conn, "user_id", user_id)
    }

    fn update_guardian(&self, guardian: &Guardian) -> RepoResult<Guardian> {
        guardian.validate()?;
        let changed = self
            .conn
            .execute(
                "UPDATE guardians
                 SET
                    user_id = ?2,
                    relationship = ?3,
                    emergency_contact = ?4,
                    pickup_authorized = ?5,
                    updated_at = ?6
                 WHERE id = ?1;",
                params![
                    guardian.id.to_string(),
                    guardian.user_id.to_string(),
                    guardian.relationship.trim(),
                    guardian.emergency_contact.as_deref(),
                    bool_to_int(guardian.pickup_authorized),
                    now_epoch_ms(),
                ],
            )
            .map_err(|err| map_user_conflict(err, guardian.user_id))?;
        if changed == 0 {
            return Err(RepoError::GuardianNotFound(guardian.id));
        }
        load_required_guardian(self.conn, guardian.id)
    }

    fn list_guardians(&self) -> RepoResult<Vec<Guardian>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GUARDIAN_SELECT_SQL} ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut guardians = Vec::new();
        while let Some(row) = rows.next()? {
            guardians.push(parse_guardian_row(row)?);
        }
        Ok(guardians)
    }

    fn delete_guardian(&self, id: GuardianId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM guardians WHERE id = ?1;",
                [id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(RepoError::GuardianNotFound(id));
        }

        let orphaned_child: Option<String> = tx
            .query_row(
                "SELECT link.child_id
                 FROM child_guardians link
                 WHERE link.guardian_id = ?1
                   AND (
                     SELECT COUNT(*)
                     FROM child_guardians other
                     WHERE other.child_id = link.child_id
                   ) = 1
                 ORDER BY link.created_at ASC
                 LIMIT 1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(child_id) = orphaned_child {
            let child_id = Uuid::parse_str(&child_id).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid uuid `{child_id}` in child_guardians.child_id"
                ))
            })?;
            warn!(
                "event=guardian_delete module=repo status=rejected guardian_id={id} child_id={child_id} reason=sole_guardian"
            );
            return Err(RepoError::SoleGuardianOfChild {
                guardian_id: id,
                child_id,
            });
        }

        let unlinked = tx.execute(
            "DELETE FROM child_guardians WHERE guardian_id = ?1;",
            [id.to_string()],
        )?;
        tx.execute("DELETE FROM guardians WHERE id = ?1;", [id.to_string()])?;
        tx.commit()?;

        info!(
            "event=guardian_delete module=repo status=ok guardian_id={id} unlinked_children={unlinked}"
        );
        Ok(())
    }
}

fn query_one_guardian(
    conn: &Connection,
    column: &'static str,
    value: Uuid,
) -> RepoResult<Option<Guardian>> {
    let mut stmt = conn.prepare(&format!("{GUARDIAN_SELECT_SQL} WHERE {column} = ?1;"))?;
    let mut rows = stmt.query([value.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_guardian_row(row)?));
    }
    Ok(None)
}

fn load_required_guardian(conn: &Connection, id: GuardianId) -> RepoResult<Guardian> {
    query_one_guardian(conn, "id", id)?.ok_or(RepoError::GuardianNotFound(id))
}

fn map_user_conflict(err: rusqlite::Error, user_id: UserId) -> RepoError {
    let is_user_conflict = match &err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            message.contains("guardians.user_id")
        }
        _ => false,
    };
    if is_user_conflict {
        RepoError::DuplicateUser(user_id)
    } else {
        err.into()
    }
}

fn parse_guardian_row(row: &Row<'_>) -> Result<Guardian, RowDecodeError> {
    Ok(Guardian {
        id: read_uuid(row, "id")?,
        user_id: read_uuid(row, "user_id")?,
        relationship: row.get("relationship")?,
        emergency_contact: row.get("emergency_contact")?,
        pickup_authorized: read_bool(row, "pickup_authorized")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
