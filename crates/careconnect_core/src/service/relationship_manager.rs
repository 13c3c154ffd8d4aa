//! Guardian assignment use-case service.
//!
//! # Responsibility
//! - Add, remove and promote guardians of a child.
//! - Translate store outcomes into the caller-facing error taxonomy.
//! - Retry units of work that lost a write-lock race, then notify observers.
//!
//! # Invariants
//! - Every operation is delegated to one atomic store call; the manager never
//!   reads state and writes it back in separate steps.
//! - A child keeps at least one guardian once it has one.
//! - A child has at most one primary guardian.
//! - Failures are returned as-is after mapping; nothing is swallowed.

use crate::model::child::ChildId;
use crate::model::guardian::GuardianId;
use crate::model::relationship::GuardianRelationship;
use crate::repo::relationship_repo::{
    GuardianRelationshipRepository, RelationshipRepoError, RelationshipRepoResult,
};
use crate::service::events::{RelationshipEvent, RelationshipObserver};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Bounded retry for writes that hit `SQLITE_BUSY`/`SQLITE_LOCKED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Entity named by a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Child,
    Guardian,
    Relationship,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Child => "child",
            Self::Guardian => "guardian",
            Self::Relationship => "relationship",
        };
        f.write_str(name)
    }
}

/// Coarse classification an outer layer maps to a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    AlreadyLinked {
        child_id: ChildId,
        guardian_id: GuardianId,
    },
}

impl Display for ConflictReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyLinked {
                child_id,
                guardian_id,
            } => write!(
                f,
                "guardian {guardian_id} is already associated with child {child_id}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidStateReason {
    PrimaryAlreadyAssigned { child_id: ChildId },
    LastGuardian { child_id: ChildId },
}

impl Display for InvalidStateReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryAlreadyAssigned { child_id } => {
                write!(f, "child {child_id} already has a primary guardian")
            }
            Self::LastGuardian { child_id } => {
                write!(f, "cannot remove the last guardian from child {child_id}")
            }
        }
    }
}

/// Errors from guardian assignment operations.
#[derive(Debug)]
pub enum RelationshipError {
    /// `id` is the entity uuid, or `<child_id>:<guardian_id>` for a relationship.
    NotFound { entity: EntityKind, id: String },
    Conflict(ConflictReason),
    InvalidState(InvalidStateReason),
    /// Storage failure, including lock contention that outlived all retries.
    Store(RelationshipRepoError),
}

impl RelationshipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    fn log_reason(&self) -> &'static str {
        match self {
            Self::NotFound { entity, .. } => match entity {
                EntityKind::Child => "child_not_found",
                EntityKind::Guardian => "guardian_not_found",
                EntityKind::Relationship => "relationship_not_found",
            },
            Self::Conflict(ConflictReason::AlreadyLinked { .. }) => "already_linked",
            Self::InvalidState(InvalidStateReason::PrimaryAlreadyAssigned { .. }) => {
                "primary_already_assigned"
            }
            Self::InvalidState(InvalidStateReason::LastGuardian { .. }) => "last_guardian",
            Self::Store(err) if err.is_busy() => "busy",
            Self::Store(_) => "store",
        }
    }
}

impl Display for RelationshipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(reason) => write!(f, "{reason}"),
            Self::InvalidState(reason) => write!(f, "{reason}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RelationshipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RelationshipRepoError> for RelationshipError {
    fn from(value: RelationshipRepoError) -> Self {
        match value {
            RelationshipRepoError::ChildNotFound(id) => Self::NotFound {
                entity: EntityKind::Child,
                id: id.to_string(),
            },
            RelationshipRepoError::GuardianNotFound(id) => Self::NotFound {
                entity: EntityKind::Guardian,
                id: id.to_string(),
            },
            RelationshipRepoError::RelationshipNotFound {
                child_id,
                guardian_id,
            } => Self::NotFound {
                entity: EntityKind::Relationship,
                id: format!("{child_id}:{guardian_id}"),
            },
            RelationshipRepoError::AlreadyLinked {
                child_id,
                guardian_id,
            } => Self::Conflict(ConflictReason::AlreadyLinked {
                child_id,
                guardian_id,
            }),
            RelationshipRepoError::PrimaryAlreadyAssigned { child_id } => {
                Self::InvalidState(InvalidStateReason::PrimaryAlreadyAssigned { child_id })
            }
            RelationshipRepoError::LastGuardian { child_id } => {
                Self::InvalidState(InvalidStateReason::LastGuardian { child_id })
            }
            other => Self::Store(other),
        }
    }
}

/// Guardian assignment service facade.
pub struct RelationshipManager<R: GuardianRelationshipRepository> {
    repo: R,
    retry: RetryPolicy,
    observers: Vec<Arc<dyn RelationshipObserver>>,
}

impl<R: GuardianRelationshipRepository> RelationshipManager<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            retry: RetryPolicy::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RelationshipObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Links a guardian to a child, optionally as primary.
    ///
    /// A primary add never demotes an existing primary; use [`Self::set_primary`].
    ///
    /// # Errors
    /// - `NotFound` naming the child (checked first) or the guardian.
    /// - `Conflict(AlreadyLinked)` when the pair already exists.
    /// - `InvalidState(PrimaryAlreadyAssigned)` for a primary add when the
    ///   child already has a primary.
    pub fn add_guardian(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
        is_primary: bool,
    ) -> Result<GuardianRelationship, RelationshipError> {
        let relationship = self
            .run("guardian_assign", || {
                self.repo
                    .insert_if_absent_and_primary_free(child_id, guardian_id, is_primary)
            })
            .map_err(|err| {
                reject("guardian_assign", child_id, guardian_id, RelationshipError::from(err))
            })?;

        info!(
            "event=guardian_assign module=service status=ok child_id={child_id} guardian_id={guardian_id} is_primary={is_primary}"
        );
        self.notify(RelationshipEvent::GuardianAssigned(relationship.clone()));
        Ok(relationship)
    }

    /// Unlinks a guardian from a child.
    ///
    /// Removing the primary guardian leaves the child without a primary; no
    /// replacement is chosen.
    ///
    /// # Errors
    /// - `NotFound(Relationship)` when the pair is not linked.
    /// - `InvalidState(LastGuardian)` when it is the child's only guardian.
    pub fn remove_guardian(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> Result<(), RelationshipError> {
        let removed = self
            .run("guardian_remove", || {
                self.repo.delete_unless_last(child_id, guardian_id)
            })
            .map_err(|err| {
                reject("guardian_remove", child_id, guardian_id, RelationshipError::from(err))
            })?;

        info!(
            "event=guardian_remove module=service status=ok child_id={child_id} guardian_id={guardian_id} was_primary={}",
            removed.is_primary
        );
        self.notify(RelationshipEvent::GuardianRemoved(removed));
        Ok(())
    }

    /// Makes an already-linked guardian the child's primary, demoting the
    /// previous primary in the same unit of work.
    ///
    /// Idempotent: promoting the current primary returns its row unchanged.
    ///
    /// # Errors
    /// - `NotFound(Relationship)` when the pair is not linked.
    pub fn set_primary(
        &self,
        child_id: ChildId,
        guardian_id: GuardianId,
    ) -> Result<GuardianRelationship, RelationshipError> {
        let transfer = self
            .run("primary_transfer", || {
                self.repo.transfer_primary(child_id, guardian_id)
            })
            .map_err(|err| {
                reject("primary_transfer", child_id, guardian_id, RelationshipError::from(err))
            })?;

        if !transfer.changed {
            debug!(
                "event=primary_transfer module=service status=noop child_id={child_id} guardian_id={guardian_id}"
            );
            return Ok(transfer.relationship);
        }

        info!(
            "event=primary_transfer module=service status=ok child_id={child_id} guardian_id={guardian_id} demoted={}",
            transfer
                .demoted_guardian_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        self.notify(RelationshipEvent::PrimaryTransferred {
            child_id,
            previous: transfer.demoted_guardian_id,
            current: guardian_id,
        });
        Ok(transfer.relationship)
    }

    fn run<T>(
        &self,
        event: &'static str,
        mut unit_of_work: impl FnMut() -> RelationshipRepoResult<T>,
    ) -> RelationshipRepoResult<T> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match unit_of_work() {
                Err(err) if err.is_busy() && attempt < max_attempts => {
                    warn!(
                        "event={event} module=service status=retry attempt={attempt} max_attempts={max_attempts}"
                    );
                    std::thread::sleep(self.retry.backoff * attempt);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn notify(&self, event: RelationshipEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

fn reject(
    event: &'static str,
    child_id: ChildId,
    guardian_id: GuardianId,
    err: RelationshipError,
) -> RelationshipError {
    let reason = err.log_reason();
    if err.kind() == ErrorKind::Internal {
        error!(
            "event={event} module=service status=error child_id={child_id} guardian_id={guardian_id} reason={reason}"
        );
    } else {
        warn!(
            "event={event} module=service status=rejected child_id={child_id} guardian_id={guardian_id} reason={reason}"
        );
    }
    err
}

#[cfg(test)]
mod tests {
    use super::{
        ConflictReason, EntityKind, ErrorKind, InvalidStateReason, RelationshipError,
        RelationshipManager, RetryPolicy,
    };
    use crate::db::DbError;
    use crate::model::child::ChildId;
    use crate::model::guardian::GuardianId;
    use crate::model::relationship::GuardianRelationship;
    use crate::repo::relationship_repo::{
        GuardianRelationshipRepository, PrimaryTransfer, RelationshipRepoError,
        RelationshipRepoResult,
    };
    use std::cell::Cell;
    use std::time::Duration;
    use uuid::Uuid;

    /// Fails with `SQLITE_BUSY` for the first `busy_for` inserts.
    struct ContendedRepo {
        busy_for: u32,
        calls: Cell<u32>,
    }

    fn busy() -> RelationshipRepoError {
        RelationshipRepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        )))
    }

    impl GuardianRelationshipRepository for ContendedRepo {
        fn insert_if_absent_and_primary_free(
            &self,
            child_id: ChildId,
            guardian_id: GuardianId,
            is_primary: bool,
        ) -> RelationshipRepoResult<GuardianRelationship> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if call <= self.busy_for {
                return Err(busy());
            }
            Ok(GuardianRelationship {
                id: Uuid::new_v4(),
                child_id,
                guardian_id,
                is_primary,
                created_at: 1,
                updated_at: 1,
            })
        }

        fn delete_unless_last(
            &self,
            child_id: ChildId,
            _guardian_id: GuardianId,
        ) -> RelationshipRepoResult<GuardianRelationship> {
            Err(RelationshipRepoError::LastGuardian { child_id })
        }

        fn transfer_primary(
            &self,
            child_id: ChildId,
            guardian_id: GuardianId,
        ) -> RelationshipRepoResult<PrimaryTransfer> {
            Err(RelationshipRepoError::RelationshipNotFound {
                child_id,
                guardian_id,
            })
        }

        fn find(
            &self,
            _child_id: ChildId,
            _guardian_id: GuardianId,
        ) -> RelationshipRepoResult<Option<GuardianRelationship>> {
            Ok(None)
        }

        fn list_for_child(&self, _child_id: ChildId) -> RelationshipRepoResult<Vec<GuardianRelationship>> {
            Ok(Vec::new())
        }

        fn list_for_guardian(
            &self,
            _guardian_id: GuardianId,
        ) -> RelationshipRepoResult<Vec<GuardianRelationship>> {
            Ok(Vec::new())
        }

        fn primary_for_child(
            &self,
            _child_id: ChildId,
        ) -> RelationshipRepoResult<Option<GuardianRelationship>> {
            Ok(None)
        }

        fn count_for_child(&self, _child_id: ChildId) -> RelationshipRepoResult<u64> {
            Ok(0)
        }
    }

    fn manager(busy_for: u32, max_attempts: u32) -> RelationshipManager<ContendedRepo> {
        RelationshipManager::new(ContendedRepo {
            busy_for,
            calls: Cell::new(0),
        })
        .with_retry_policy(RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        })
    }

    #[test]
    fn busy_store_is_retried_until_success() {
        let manager = manager(2, 3);
        manager
            .add_guardian(Uuid::new_v4(), Uuid::new_v4(), false)
            .unwrap();
        assert_eq!(manager.repo.calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_surface_as_internal_store_error() {
        let manager = manager(5, 2);
        let err = manager
            .add_guardian(Uuid::new_v4(), Uuid::new_v4(), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, RelationshipError::Store(ref inner) if inner.is_busy()));
        assert_eq!(manager.repo.calls.get(), 2);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let manager = manager(1, 0);
        assert!(manager
            .add_guardian(Uuid::new_v4(), Uuid::new_v4(), false)
            .is_err());
        assert_eq!(manager.repo.calls.get(), 1);
    }

    #[test]
    fn semantic_failures_are_not_retried() {
        let manager = manager(0, 3);
        let child_id = Uuid::new_v4();
        let err = manager.remove_guardian(child_id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(
            err,
            RelationshipError::InvalidState(InvalidStateReason::LastGuardian { child_id: id }) if id == child_id
        ));
    }

    #[test]
    fn store_outcomes_map_to_taxonomy() {
        let child_id = Uuid::new_v4();
        let guardian_id = Uuid::new_v4();

        let err = RelationshipError::from(RelationshipRepoError::ChildNotFound(child_id));
        assert!(matches!(
            err,
            RelationshipError::NotFound { entity: EntityKind::Child, ref id } if *id == child_id.to_string()
        ));

        let err = RelationshipError::from(RelationshipRepoError::RelationshipNotFound {
            child_id,
            guardian_id,
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            format!("relationship not found: {child_id}:{guardian_id}")
        );

        let err = RelationshipError::from(RelationshipRepoError::AlreadyLinked {
            child_id,
            guardian_id,
        });
        assert!(matches!(
            err,
            RelationshipError::Conflict(ConflictReason::AlreadyLinked { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn invalid_state_messages_are_distinct() {
        let child_id = Uuid::new_v4();
        let primary = RelationshipError::InvalidState(InvalidStateReason::PrimaryAlreadyAssigned {
            child_id,
        })
        .to_string();
        let last =
            RelationshipError::InvalidState(InvalidStateReason::LastGuardian { child_id }).to_string();
        assert_eq!(primary, format!("child {child_id} already has a primary guardian"));
        assert_eq!(last, format!("cannot remove the last guardian from child {child_id}"));
    }
}
