//! Guardian domain model.
//!
//! # Responsibility
//! - Define the guardian record linked to children through relationship rows.
//! - Validate contact/authorization fields before persistence.
//!
//! # Invariants
//! - `user_id` points at exactly one owning user account; one guardian per user.
//! - `relationship` is non-blank and at most 50 characters.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a guardian record.
pub type GuardianId = Uuid;

/// Identifier of the user account owning a guardian record.
pub type UserId = Uuid;

const RELATIONSHIP_MAX_CHARS: usize = 50;
const EMERGENCY_CONTACT_MAX_CHARS: usize = 500;

/// Legal guardian of one or more children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: GuardianId,
    pub user_id: UserId,
    /// Relationship to the child, e.g. `Mother` or `Grandparent`.
    pub relationship: String,
    pub emergency_contact: Option<String>,
    pub pickup_authorized: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Guardian {
    /// Creates a guardian for `user_id` with a generated id.
    pub fn new(user_id: UserId, relationship: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            relationship: relationship.into(),
            emergency_contact: None,
            pickup_authorized: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> Result<(), GuardianValidationError> {
        let relationship = self.relationship.trim();
        if relationship.is_empty() {
            return Err(GuardianValidationError::MissingRelationship);
        }
        if relationship.chars().count() > RELATIONSHIP_MAX_CHARS {
            return Err(GuardianValidationError::RelationshipTooLong {
                max_chars: RELATIONSHIP_MAX_CHARS,
            });
        }
        if let Some(contact) = self.emergency_contact.as_deref() {
            if contact.chars().count() > EMERGENCY_CONTACT_MAX_CHARS {
                return Err(GuardianValidationError::EmergencyContactTooLong {
                    max_chars: EMERGENCY_CONTACT_MAX_CHARS,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardianValidationError {
    MissingRelationship,
    RelationshipTooLong { max_chars: usize },
    EmergencyContactTooLong { max_chars: usize },
}

impl Display for GuardianValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRelationship => write!(f, "guardian relationship is required"),
            Self::RelationshipTooLong { max_chars } => write!(
                f,
                "guardian relationship must not exceed {max_chars} characters"
            ),
            Self::EmergencyContactTooLong { max_chars } => write!(
                f,
                "guardian emergency contact must not exceed {max_chars} characters"
            ),
        }
    }
}

impl Error for GuardianValidationError {}
