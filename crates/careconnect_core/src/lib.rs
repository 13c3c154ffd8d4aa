//! Guardianship core for CareConnect.
//! Owns the child–guardian relationship rules and their SQLite storage.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_options, DbError, DbOptions};
pub use logging::{default_log_level, init_from_config, init_logging, LogSettings, LoggingError};
pub use model::child::{Child, ChildId, ChildValidationError};
pub use model::guardian::{Guardian, GuardianId, GuardianValidationError, UserId};
pub use model::relationship::{GuardianRelationship, RelationshipId};
pub use repo::child_repo::{ChildRepository, SqliteChildRepository};
pub use repo::error::{RepoError, RepoResult};
pub use repo::guardian_repo::{GuardianRepository, SqliteGuardianRepository};
pub use repo::relationship_repo::{
    GuardianRelationshipRepository, PrimaryTransfer, RelationshipRepoError,
    RelationshipRepoResult, SqliteRelationshipRepository,
};
pub use service::events::{RelationshipEvent, RelationshipObserver};
pub use service::guardianship_query::{GuardianshipQuery, QueryError, QueryResult};
pub use service::relationship_manager::{
    ConflictReason, EntityKind, ErrorKind, InvalidStateReason, RelationshipError,
    RelationshipManager, RetryPolicy,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
