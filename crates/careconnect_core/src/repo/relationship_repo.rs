//! Child–guardian relationship store and SQLite implementation.
//!
//! # Responsibility
//! - Own every write to `child_guardians`.
//! - Expose each invariant-checked mutation as one atomic call, so callers
//!   never hold a read across a separate write.
//!
//! # Invariants
//! - Mutations run inside `BEGIN IMMEDIATE`: the write lock is taken before
//!   the first read, so concurrent writers on other connections serialize.
//! - At most one row per `(child_id, guardian_id)`; at most one primary row
//!   per child. Both are also enforced by unique indexes in storage.
//! - A child's last relationship row is never deleted through this store.
//! - Reads return rows in insertion order.

use crate::db::{bool_to_int, is_unique_violation, now_epoch_ms, DbError};
use crate::model::child::ChildId;
use crate::model::guardian::GuardianId;
use crate::model::relationship::GuardianRelationship;
use crate::repo::support::{
    ensure_connection_ready, read_bool, read_uuid, ConnectionNotReady, RowDecodeError, TableSpec,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RELATIONSHIP_SELECT_SQL: &str = "SELECT
    id,
    child_id,
    guardian_id,
    is_primary,
    created_at,
    updated_at
FROM child_guardians";

const INSERTION_ORDER_SQL: &str = "ORDER BY created_at ASC, rowid ASC";

const RELATIONSHIP_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "child_guardians",
        columns: &[
            "id",
            "child_id",
            "guardian_id",
            "is_primary",
            "created_at",
            "updated_at",
        ],
    },
    TableSpec {
        name: "children",
        columns: &["id"],
    },
    TableSpec {
        name: "guardians",
        columns: &["id"],
    },
];

pub type RelationshipRepoResult<T> = Result<T, RelationshipRepoError>;

/// Outcome of an atomic relationship-store operation that did not commit.
#[derive(Debug)]
pub enum RelationshipRepoError {
    Db(DbError),
    ChildNotFound(ChildId),
    GuardianNotFound(GuardianId),
    /// A row for this pair already exists.
    AlreadyLinked {
        child_id: ChildId,
        guardian_id: GuardianId,
    },
    /// Another row of this child is already primary.
    PrimaryAlreadyAssigned { child_id: ChildId },
    RelationshipNotFound {
        child_id: ChildId,
        guardian_id: GuardianId,
    },
    /// The row is the child's only remaining relationship.
    LastGuardian { child_id: ChildId },
    NotReady(ConnectionNotReady),
    InvalidData(String),
}

impl RelationshipRepoError {
    /// Returns `true` when another connection held the write lock past the
    /// busy timeout; the operation had no effect and may be retried.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RelationshipRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ChildNotFound(id) => write!(f, "child not found: {id}"),
            Self::GuardianNotFound(id) => write!(f, "guardian not found: {id}"),
            Self::AlreadyLinked {
                child_id,
                guardian_id,
            } => write!(
                f,
                "guardian {guardian_id} is already associated with child {child_id}"
            ),
            Self::PrimaryAlreadyAssigned { child_id } => {
                write!(f, "child {child_id} already has a primary guardian")
            }
            Self::RelationshipNotFound {
                child_id,
                guardian_id,
            } => write!(
                f,
                "no relationship between child {child_id} and guardian {guardian_id}"
            ),
            Self::LastGuardian { child_id } => {
                write!(f, "cannot remove the last guardian from child {child_id}")
            }
            Self::NotReady(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid relationship data: {message}"),
        }
    }
}

impl Error for RelationshipRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotReady(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RelationshipRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RelationshipRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConnectionNotReady> for RelationshipRepoError {
    fn from(value: ConnectionNotReady) -> Self {
        Self::NotReady(value)
    }
}

impl From<RowDecodeError> for RelationshipRepoError {
    fn from(value: RowDecodeError) -> Self {
        match value {
            RowDecodeError::Sqlite(err) => err.into(),
            RowDecodeError::Invalid(message) => Self::InvalidData(message),
        }
    }
}

/// Result of an atomic primary transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryTransfer {
    /// Target row, primary after the call.
    pub relationship: GuardianRelationship,
    /// Guardian that was primary before the call, if any and if different.
    pub demoted_guardian_id: Option<GuardianId>,
    /// `false` when the target already was primary and nothing was written.
    pub changed: bool,
}

/// Repository interface for child–guardian relationship rows.
///
/// Every mutating method checks its invariant and writes in one atomic unit.
pub trait GuardianRelationshipRepository {
    /// Inserts `(child_id, guardian_id)` after checking, in order: child
    /// exists, guardian exists, pair absent, and (when `is_primary`) no other
    /// primary row for the child.
    fn insert_if_absent_and_primary_free(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
        is_primary: bool,
    ) -> RelationshipRepoResult<GuardianRelationship>;

    /// Deletes the pair's row unless it is the child's last one. Returns the
    /// deleted row.
    fn delete_unless_last(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<GuardianRelationship>;

    /// Demotes the child's current primary (if another guardian) and promotes
    /// the pair's row.
    fn transfer_primary(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<PrimaryTransfer>;

    fn find(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<Option<GuardianRelationship>>;
    fn list_for_child(&self, child_id: ChildId) -> RelationshipRepoResult<Vec<GuardianRelationship>>;
    fn list_for_guardian(
        &self,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<Vec<GuardianRelationship>>;
    fn primary_for_child(
        &self,
        child_id: ChildId,
    ) -> RelationshipRepoResult<Option<GuardianRelationship>>;
    fn count_for_child(&self, child_id: ChildId) -> RelationshipRepoResult<u64>;
}

/// SQLite-backed relationship repository.
pub struct SqliteRelationshipRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRelationshipRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RelationshipRepoResult<Self> {
        ensure_connection_ready::<RelationshipRepoError>(conn, RELATIONSHIP_TABLES)?;
        Ok(Self { conn })
    }
}

impl GuardianRelationshipRepository for SqliteRelationshipRepository<'_> {
    fn insert_if_absent_and_primary_free(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
        is_primary: bool,
    ) -> RelationshipRepoResult<GuardianRelationship> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if !row_exists(&tx, "SELECT 1 FROM children WHERE id = ?1;", child_id)? {
            return Err(RelationshipRepoError::ChildNotFound(child_id));
        }
        if !row_exists(&tx, "SELECT 1 FROM guardians WHERE id = ?1;", guardian_id)? {
            return Err(RelationshipRepoError::GuardianNotFound(guardian_id));
        }
        if find_pair(&tx, child_id, guardian_id)?.is_some() {
            return Err(RelationshipRepoError::AlreadyLinked {
                child_id,
                guardian_id,
            });
        }
        if is_primary && find_primary(&tx, child_id)?.is_some() {
            return Err(RelationshipRepoError::PrimaryAlreadyAssigned { child_id });
        }

        let now = now_epoch_ms();
        let relationship = GuardianRelationship {
            id: Uuid::new_v4(),
            child_id,
            guardian_id,
            is_primary,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO child_guardians (
                id,
                child_id,
                guardian_id,
                is_primary,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
            params![
                relationship.id.to_string(),
                child_id.to_string(),
                guardian_id.to_string(),
                bool_to_int(is_primary),
                now,
            ],
        )
        .map_err(|err| map_insert_conflict(err, child_id, guardian_id))?;
        tx.commit()?;
        Ok(relationship)
    }

    fn delete_unless_last(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<GuardianRelationship> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let relationship = find_pair(&tx, child_id, guardian_id)?.ok_or(
            RelationshipRepoError::RelationshipNotFound {
                child_id,
                guardian_id,
            },
        )?;
        if count_rows(&tx, child_id)? <= 1 {
            return Err(RelationshipRepoError::LastGuardian { child_id });
        }

        tx.execute(
            "DELETE FROM child_guardians WHERE id = ?1;",
            [relationship.id.to_string()],
        )?;
        tx.commit()?;
        Ok(relationship)
    }

    fn transfer_primary(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<PrimaryTransfer> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let target = find_pair(&tx, child_id, guardian_id)?.ok_or(
            RelationshipRepoError::RelationshipNotFound {
                child_id,
                guardian_id,
            },
        )?;
        if target.is_primary {
            return Ok(PrimaryTransfer {
                relationship: target,
                demoted_guardian_id: None,
                changed: false,
            });
        }

        let now = now_epoch_ms();
        let current = find_primary(&tx, child_id)?;
        if let Some(current) = current.as_ref() {
            tx.execute(
                "UPDATE child_guardians
                 SET is_primary = 0,
                     updated_at = ?2
                 WHERE id = ?1;",
                params![current.id.to_string(), now],
            )?;
        }
        tx.execute(
            "UPDATE child_guardians
             SET is_primary = 1,
                 updated_at = ?2
             WHERE id = ?1;",
            params![target.id.to_string(), now],
        )?;
        tx.commit()?;

        Ok(PrimaryTransfer {
            relationship: GuardianRelationship {
                is_primary: true,
                updated_at: now,
                ..target
            },
            demoted_guardian_id: current.map(|row| row.guardian_id),
            changed: true,
        })
    }

    fn find(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<Option<GuardianRelationship>> {
        find_pair(self.conn, child_id, guardian_id)
    }

    fn list_for_child(&self, child_id: ChildId) -> RelationshipRepoResult<Vec<GuardianRelationship>> {
        list_rows(
            self.conn,
            &format!("{RELATIONSHIP_SELECT_SQL} WHERE child_id = ?1 {INSERTION_ORDER_SQL};"),
            child_id,
        )
    }

    fn list_for_guardian(
        &self,
        guardian_id: GuardianId,
    ) -> RelationshipRepoResult<Vec<GuardianRelationship>> {
        list_rows(
            self.conn,
            &format!("{RELATIONSHIP_SELECT_SQL} WHERE guardian_id = ?1 {INSERTION_ORDER_SQL};"),
            guardian_id,
        )
    }

    fn primary_for_child(
        &self,
        child_id: ChildId,
    ) -> RelationshipRepoResult<Option<GuardianRelationship>> {
        find_primary(self.conn, child_id)
    }

    fn count_for_child(&self, child_id: ChildId) -> RelationshipRepoResult<u64> {
        count_rows(self.conn, child_id)
    }
}

fn row_exists(conn: &Connection, sql: &str, id: Uuid) -> RelationshipRepoResult<bool> {
    let found = conn
        .query_row(sql, [id.to_string()], |row| row.get::<_, i64>(0))
        .optional()?;
    Ok(found.is_some())
}

fn find_pair(
    conn: &Connection,
    child_id: ChildId,
    guardian_id: GuardianId,
) -> RelationshipRepoResult<Option<GuardianRelationship>> {
    let mut stmt = conn.prepare(&format!(
        "{RELATIONSHIP_SELECT_SQL} WHERE child_id = ?1 AND guardian_id = ?2;"
    ))?;
    let mut rows = stmt.query([child_id.to_string(), guardian_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_relationship_row(row)?));
    }
    Ok(None)
}

fn find_primary(
    conn: &Connection,
    child_id: ChildId,
) -> RelationshipRepoResult<Option<GuardianRelationship>> {
    let mut stmt = conn.prepare(&format!(
        "{RELATIONSHIP_SELECT_SQL} WHERE child_id = ?1 AND is_primary = 1;"
    ))?;
    let mut rows = stmt.query([child_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_relationship_row(row)?));
    }
    Ok(None)
}

fn count_rows(conn: &Connection, child_id: ChildId) -> RelationshipRepoResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM child_guardians WHERE child_id = ?1;",
        [child_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn list_rows(
    conn: &Connection,
    sql: &str,
    id: Uuid,
) -> RelationshipRepoResult<Vec<GuardianRelationship>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_relationship_row(row)?);
    }
    Ok(items)
}

/// Maps unique-index hits to the invariant they protect. Only reachable when
/// a row appears between the in-transaction check and the insert.
fn map_insert_conflict(
    err: rusqlite::Error,
    child_id: ChildId,
    guardian_id: GuardianId,
) -> RelationshipRepoError {
    if !is_unique_violation(&err) {
        return err.into();
    }
    let message = match &err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.as_str(),
        _ => "",
    };
    if message.contains("child_guardians.guardian_id") {
        RelationshipRepoError::AlreadyLinked {
            child_id,
            guardian_id,
        }
    } else if message.contains("child_guardians.child_id") {
        RelationshipRepoError::PrimaryAlreadyAssigned { child_id }
    } else {
        err.into()
    }
}

fn parse_relationship_row(row: &Row<'_>) -> Result<GuardianRelationship, RowDecodeError> {
    Ok(GuardianRelationship {
        id: read_uuid(row, "id")?,
        child_id: read_uuid(row, "child_id")?,
        guardian_id: read_uuid(row, "guardian_id")?,
        is_primary: read_bool(row, "is_primary")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
