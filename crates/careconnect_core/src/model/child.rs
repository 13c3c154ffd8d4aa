//! Child domain model.
//!
//! # Responsibility
//! - Define the child record referenced by guardian relationships.
//! - Validate demographic fields before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another child.
//! - First and last name are non-blank after trim.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a child record.
pub type ChildId = Uuid;

const NAME_MAX_CHARS: usize = 100;
const GENDER_MAX_CHARS: usize = 10;
const SPECIAL_NEEDS_MAX_CHARS: usize = 1000;
const EMERGENCY_CONTACT_MAX_CHARS: usize = 500;

/// Child enrolled in care.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub id: ChildId,
    pub first_name: String,
    pub last_name: String,
    /// Unix epoch milliseconds.
    pub date_of_birth: i64,
    pub gender: Option<String>,
    pub special_needs: Option<String>,
    pub emergency_contact: Option<String>,
    /// Epoch ms, assigned by the store on insert.
    pub created_at: i64,
    /// Epoch ms, refreshed by the store on every update.
    pub updated_at: i64,
}

impl Child {
    /// Creates a child with a generated id and no optional details.
    ///
    /// Timestamps stay `0` until the record is persisted.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        date_of_birth: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth,
            gender: None,
            special_needs: None,
            emergency_contact: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Checks field-level constraints.
    pub fn validate(&self) -> Result<(), ChildValidationError> {
        check_required("first_name", &self.first_name)?;
        check_required("last_name", &self.last_name)?;
        check_length("first_name", Some(&self.first_name), NAME_MAX_CHARS)?;
        check_length("last_name", Some(&self.last_name), NAME_MAX_CHARS)?;
        check_length("gender", self.gender.as_deref(), GENDER_MAX_CHARS)?;
        check_length(
            "special_needs",
            self.special_needs.as_deref(),
            SPECIAL_NEEDS_MAX_CHARS,
        )?;
        check_length(
            "emergency_contact",
            self.emergency_contact.as_deref(),
            EMERGENCY_CONTACT_MAX_CHARS,
        )?;
        Ok(())
    }

    /// Display name in `first last` form.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Field-level validation failure for [`Child`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildValidationError {
    MissingField(&'static str),
    FieldTooLong { field: &'static str, max_chars: usize },
}

impl Display for ChildValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "child {field} is required"),
            Self::FieldTooLong { field, max_chars } => {
                write!(f, "child {field} must not exceed {max_chars} characters")
            }
        }
    }
}

impl Error for ChildValidationError {}

fn check_required(field: &'static str, value: &str) -> Result<(), ChildValidationError> {
    if value.trim().is_empty() {
        return Err(ChildValidationError::MissingField(field));
    }
    Ok(())
}

fn check_length(
    field: &'static str,
    value: Option<&str>,
    max_chars: usize,
) -> Result<(), ChildValidationError> {
    match value {
        Some(value) if value.chars().count() > max_chars => {
            Err(ChildValidationError::FieldTooLong { field, max_chars })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Child, ChildValidationError};

    #[test]
    fn new_child_is_valid() {
        let child = Child::new("Ada", "Lovelace", 1_600_000_000_000);
        assert!(child.validate().is_ok());
        assert_eq!(child.full_name(), "Ada Lovelace");
    }

    #[test]
    fn blank_first_name_is_rejected() {
        let child = Child::new("   ", "Lovelace", 0);
        assert_eq!(
            child.validate(),
            Err(ChildValidationError::MissingField("first_name"))
        );
    }

    #[test]
    fn oversized_gender_is_rejected() {
        let mut child = Child::new("Ada", "Lovelace", 0);
        child.gender = Some("x".repeat(11));
        assert_eq!(
            child.validate(),
            Err(ChildValidationError::FieldTooLong {
                field: "gender",
                max_chars: 10
            })
        );
    }
}
