//! Repository layer: record stores and the relationship store.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Child/guardian writes enforce model `validate()` before persistence.
//! - Relationship writes are only reachable through atomic check-and-write
//!   calls; there is no raw insert/update/delete on `child_guardians`.
//! - Repository APIs return semantic errors (`NotFound`, conflicts) in
//!   addition to DB transport errors.

pub mod child_repo;
pub mod error;
pub mod guardian_repo;
pub mod relationship_repo;
mod support;

pub use support::{ConnectionNotReady, RowDecodeError};
