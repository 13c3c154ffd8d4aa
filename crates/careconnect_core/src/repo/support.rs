//! Shared SQLite helpers for repository implementations.
//!
//! # Responsibility
//! - Verify a connection is migrated before a repository is built on it.
//! - Decode uuid/bool columns with column-qualified error messages.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{int_to_bool, DbError};
use rusqlite::{Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Table and column names a repository requires.
pub(crate) struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Reason a connection cannot back a repository yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotReady {
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for ConnectionNotReady {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for ConnectionNotReady {}

/// Failure while turning one SQLite row into a domain record.
#[derive(Debug)]
pub enum RowDecodeError {
    Sqlite(rusqlite::Error),
    Invalid(String),
}

impl From<rusqlite::Error> for RowDecodeError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

pub(crate) fn ensure_connection_ready<E>(conn: &Connection, tables: &[TableSpec]) -> Result<(), E>
where
    E: From<DbError> + From<rusqlite::Error> + From<ConnectionNotReady>,
{
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(ConnectionNotReady::UninitializedConnection {
            expected_version,
            actual_version,
        }
        .into());
    }

    for table in tables {
        if !table_exists(conn, table.name)? {
            return Err(ConnectionNotReady::MissingRequiredTable(table.name).into());
        }
        let present = table_columns(conn, table.name)?;
        if let Some(column) = table
            .columns
            .iter()
            .copied()
            .find(|column| !present.iter().any(|name| name.as_str() == *column))
        {
            return Err(ConnectionNotReady::MissingRequiredColumn {
                table: table.name,
                column,
            }
            .into());
        }
    }

    Ok(())
}

pub(crate) fn read_uuid(row: &Row<'_>, column: &'static str) -> Result<Uuid, RowDecodeError> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| RowDecodeError::Invalid(format!("invalid uuid `{text}` in {column}")))
}

pub(crate) fn read_bool(row: &Row<'_>, column: &'static str) -> Result<bool, RowDecodeError> {
    let value: i64 = row.get(column)?;
    int_to_bool(value)
        .ok_or_else(|| RowDecodeError::Invalid(format!("invalid bool value `{value}` in {column}")))
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
