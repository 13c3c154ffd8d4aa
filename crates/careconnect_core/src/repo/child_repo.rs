//! Child record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `children` table.
//! - Answer existence checks used by the relationship manager.
//!
//! # Invariants
//! - Write paths call `Child::validate()` before SQL mutations.
//! - Deleting a child deletes all of its relationship rows in the same
//!   statement (`ON DELETE CASCADE`).

use crate::db::now_epoch_ms;
use crate::model::child::{Child, ChildId};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::support::{ensure_connection_ready, read_uuid, RowDecodeError, TableSpec};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CHILD_SELECT_SQL: &str = "SELECT
    id,
    first_name,
    last_name,
    date_of_birth,
    gender,
    special_needs,
    emergency_contact,
    created_at,
    updated_at
FROM children";

const CHILD_TABLES: &[TableSpec] = &[TableSpec {
    name: "children",
    columns: &[
        "id",
        "first_name",
        "last_name",
        "date_of_birth",
        "gender",
        "special_needs",
        "emergency_contact",
        "created_at",
        "updated_at",
    ],
}];

/// Repository interface for child records.
pub trait ChildRepository {
    /// Inserts a child and returns the stored record with timestamps set.
    fn create_child(&self, child: &Child) -> RepoResult<Child>;
    fn get_child(&self, id: ChildId) -> RepoResult<Option<Child>>;
    fn child_exists(&self, id: ChildId) -> RepoResult<bool>;
    /// Replaces demographic fields; `created_at` is preserved.
    fn update_child(&self, child: &Child) -> RepoResult<Child>;
    /// Lists children ordered by last name, first name.
    fn list_children(&self) -> RepoResult<Vec<Child>>;
    /// Deletes a child together with its relationship rows.
    fn delete_child(&self, id: ChildId) -> RepoResult<()>;
}

/// SQLite-backed child repository.
pub struct SqliteChildRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChildRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready::<RepoError>(conn, CHILD_TABLES)?;
        Ok(Self { conn })
    }
}

impl ChildRepository for SqliteChildRepository<'_> {
    fn create_child(&self, child: &Child) -> RepoResult<Child> {
        child.validate()?;
        let now = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO children (
                id,
                first_name,
                last_name,
                date_of_birth,
                gender,
                special_needs,
                emergency_contact,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8);",
            params![
                child.id.to_string(),
                child.first_name.trim(),
                child.last_name.trim(),
                child.date_of_birth,
                child.gender.as_deref(),
                child.special_needs.as_deref(),
                child.emergency_contact.as_deref(),
                now,
            ],
        )?;
        load_required_child(self.conn, child.id)
    }

    fn get_child(&self, id: ChildId) -> RepoResult<Option<Child>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CHILD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_child_row(row)?));
        }
        Ok(None)
    }

    fn child_exists(&self, id: ChildId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM children WHERE id = ?1;",
                [id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn update_child(&self, child: &Child) -> RepoResult<Child> {
        child.validate()?;
        let changed = self.conn.execute(
            "UPDATE children
             SET
                first_name = ?2,
                last_name = ?3,
                date_of_birth = ?4,
                gender = ?5,
                special_needs = ?6,
                emergency_contact = ?7,
                updated_at = ?8
             WHERE id = ?1;",
            params![
                child.id.to_string(),
                child.first_name.trim(),
                child.last_name.trim(),
                child.date_of_birth,
                child.gender.as_deref(),
                child.special_needs.as_deref(),
                child.emergency_contact.as_deref(),
                now_epoch_ms(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::ChildNotFound(child.id));
        }
        load_required_child(self.conn, child.id)
    }

    fn list_children(&self) -> RepoResult<Vec<Child>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CHILD_SELECT_SQL} ORDER BY last_name ASC, first_name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            children.push(parse_child_row(row)?);
        }
        Ok(children)
    }

    fn delete_child(&self, id: ChildId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM children WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::ChildNotFound(id));
        }
        info!("event=child_delete module=repo status=ok child_id={id}");
        Ok(())
    }
}

fn load_required_child(conn: &Connection, id: ChildId) -> RepoResult<Child> {
    let mut stmt = conn.prepare(&format!("{CHILD_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(parse_child_row(row)?);
    }
    Err(RepoError::ChildNotFound(id))
}

fn parse_child_row(row: &Row<'_>) -> Result<Child, RowDecodeError> {
    Ok(Child {
        id: read_uuid(row, "id")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        date_of_birth: row.get("date_of_birth")?,
        gender: row.get("gender")?,
        special_needs: row.get("special_needs")?,
        emergency_contact: row.get("emergency_contact")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
