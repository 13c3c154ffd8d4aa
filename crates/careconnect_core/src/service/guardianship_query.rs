//! Read-only guardianship projections.
//!
//! # Responsibility
//! - Resolve relationship rows into full child/guardian records.
//!
//! # Invariants
//! - Unknown ids yield empty results, never `NotFound`.
//! - Results keep relationship insertion order.
//! - A row whose record is gone (deleted between the two reads) is skipped.

use crate::model::child::{Child, ChildId};
use crate::model::guardian::{Guardian, GuardianId};
use crate::model::relationship::GuardianRelationship;
use crate::repo::child_repo::ChildRepository;
use crate::repo::error::RepoError;
use crate::repo::guardian_repo::GuardianRepository;
use crate::repo::relationship_repo::{GuardianRelationshipRepository, RelationshipRepoError};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum QueryError {
    Relationship(RelationshipRepoError),
    Record(RepoError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relationship(err) => write!(f, "{err}"),
            Self::Record(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Relationship(err) => Some(err),
            Self::Record(err) => Some(err),
        }
    }
}

impl From<RelationshipRepoError> for QueryError {
    fn from(value: RelationshipRepoError) -> Self {
        Self::Relationship(value)
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Record(value)
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Guardianship read facade over the three stores.
pub struct GuardianshipQuery<R, G, C>
where
    R: GuardianRelationshipRepository,
    G: GuardianRepository,
    C: ChildRepository,
{
    relationships: R,
    guardians: G,
    children: C,
}

impl<R, G, C> GuardianshipQuery<R, G, C>
where
    R: GuardianRelationshipRepository,
    G: GuardianRepository,
    C: ChildRepository,
{
    pub fn new(relationships: R, guardians: G, children: C) -> Self {
        Self {
            relationships,
            guardians,
            children,
        }
    }

    pub fn relationships_for_child(
        &self,
        child_id: ChildId,
    ) -> QueryResult<Vec<GuardianRelationship>> {
        Ok(self.relationships.list_for_child(child_id)?)
    }

    pub fn guardian_ids_for_child(&self, child_id: ChildId) -> QueryResult<Vec<GuardianId>> {
        Ok(self
            .relationships
            .list_for_child(child_id)?
            .into_iter()
            .map(|row| row.guardian_id)
            .collect())
    }

    pub fn guardians_for_child(&self, child_id: ChildId) -> QueryResult<Vec<Guardian>> {
        let mut guardians = Vec::new();
        for row in self.relationships.list_for_child(child_id)? {
            match self.guardians.get_guardian(row.guardian_id)? {
                Some(guardian) => guardians.push(guardian),
                None => skip_row(&row),
            }
        }
        Ok(guardians)
    }

    pub fn children_for_guardian(&self, guardian_id: GuardianId) -> QueryResult<Vec<Child>> {
        let mut children = Vec::new();
        for row in self.relationships.list_for_guardian(guardian_id)? {
            match self.children.get_child(row.child_id)? {
                Some(child) => children.push(child),
                None => skip_row(&row),
            }
        }
        Ok(children)
    }

    pub fn primary_guardian_id(&self, child_id: ChildId) -> QueryResult<Option<GuardianId>> {
        Ok(self
            .relationships
            .primary_for_child(child_id)?
            .map(|row| row.guardian_id))
    }

    pub fn primary_guardian(&self, child_id: ChildId) -> QueryResult<Option<Guardian>> {
        match self.primary_guardian_id(child_id)? {
            Some(guardian_id) => Ok(self.guardians.get_guardian(guardian_id)?),
            None => Ok(None),
        }
    }
}

fn skip_row(row: &GuardianRelationship) {
    debug!(
        "event=guardianship_query module=service status=skipped relationship_id={} child_id={} guardian_id={}",
        row.id, row.child_id, row.guardian_id
    );
}
