//! Relationship change notifications.
//!
//! Observers are told about committed changes only. A panicking or slow
//! observer cannot roll back a write that already succeeded.

use crate::model::child::ChildId;
use crate::model::guardian::GuardianId;
use crate::model::relationship::GuardianRelationship;

/// Committed change to a child's guardian set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipEvent {
    GuardianAssigned(GuardianRelationship),
    /// Carries the row as it was before deletion.
    GuardianRemoved(GuardianRelationship),
    PrimaryTransferred {
        child_id: ChildId,
        previous: Option<GuardianId>,
        current: GuardianId,
    },
}

impl RelationshipEvent {
    pub fn child_id(&self) -> ChildId {
        match self {
            Self::GuardianAssigned(row) | Self::GuardianRemoved(row) => row.child_id,
            Self::PrimaryTransferred { child_id, .. } => *child_id,
        }
    }
}

/// Receives relationship events after the owning transaction commits.
pub trait RelationshipObserver: Send + Sync {
    fn on_event(&self, event: &RelationshipEvent);
}
