//! Error type shared by the child and guardian record stores.

use crate::db::DbError;
use crate::model::child::{ChildId, ChildValidationError};
use crate::model::guardian::{GuardianId, GuardianValidationError, UserId};
use crate::repo::support::{ConnectionNotReady, RowDecodeError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Record-store error for child/guardian persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    ChildValidation(ChildValidationError),
    GuardianValidation(GuardianValidationError),
    Db(DbError),
    ChildNotFound(ChildId),
    GuardianNotFound(GuardianId),
    /// A guardian record already exists for this user account.
    DuplicateUser(UserId),
    /// Deleting the guardian would leave `child_id` without any guardian.
    SoleGuardianOfChild {
        guardian_id: GuardianId,
        child_id: ChildId,
    },
    NotReady(ConnectionNotReady),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChildValidation(err) => write!(f, "{err}"),
            Self::GuardianValidation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::ChildNotFound(id) => write!(f, "child not found: {id}"),
            Self::GuardianNotFound(id) => write!(f, "guardian not found: {id}"),
            Self::DuplicateUser(id) => write!(f, "guardian already exists for user: {id}"),
            Self::SoleGuardianOfChild {
                guardian_id,
                child_id,
            } => write!(
                f,
                "guardian {guardian_id} is the only guardian of child {child_id}"
            ),
            Self::NotReady(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ChildValidation(err) => Some(err),
            Self::GuardianValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotReady(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChildValidationError> for RepoError {
    fn from(value: ChildValidationError) -> Self {
        Self::ChildValidation(value)
    }
}

impl From<GuardianValidationError> for RepoError {
    fn from(value: GuardianValidationError) -> Self {
        Self::GuardianValidation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConnectionNotReady> for RepoError {
    fn from(value: ConnectionNotReady) -> Self {
        Self::NotReady(value)
    }
}

impl From<RowDecodeError> for RepoError {
    fn from(value: RowDecodeError) -> Self {
        match value {
            RowDecodeError::Sqlite(err) => err.into(),
            RowDecodeError::Invalid(message) => Self::InvalidData(message),
        }
    }
}
