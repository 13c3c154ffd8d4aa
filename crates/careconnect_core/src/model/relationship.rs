//! Child–guardian relationship row.
//!
//! # Invariants
//! - `child_id` and `guardian_id` are immutable after creation.
//! - At most one row per `(child_id, guardian_id)`.
//! - At most one row per child has `is_primary = true`.

use crate::model::child::ChildId;
use crate::model::guardian::GuardianId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of one relationship row.
pub type RelationshipId = Uuid;

/// One child–guardian association, carrying the primary flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianRelationship {
    pub id: RelationshipId,
    pub child_id: ChildId,
    pub guardian_id: GuardianId,
    pub is_primary: bool,
    pub created_at: i64,
    pub updated_at: i64,
}
