//! Domain records for the guardianship core.
//!
//! # Responsibility
//! - Define child, guardian and relationship records shared by stores and
//!   services.
//! - Own field-level validation rules for child and guardian writes.
//!
//! # Invariants
//! - Every record is identified by a stable uuid that is never reused.
//! - Relationship rows reference children and guardians by id only; full
//!   objects are resolved on demand by the query facade.

pub mod child;
pub mod guardian;
pub mod relationship;
