//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into guardianship use cases.
//! - Keep hosts (CLI, HTTP layers) decoupled from storage details.

pub mod events;
pub mod guardianship_query;
pub mod relationship_manager;
