use careconnect_core::db::open_db_in_memory;
use careconnect_core::{
    Child, ChildId, ChildRepository, ConflictReason, EntityKind, ErrorKind, Guardian, GuardianId,
    GuardianRelationshipRepository, GuardianRepository, InvalidStateReason, RelationshipError,
    RelationshipEvent, RelationshipManager, RelationshipObserver, SqliteChildRepository,
    SqliteGuardianRepository, SqliteRelationshipRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn seed(conn: &Connection, guardian_count: usize) -> (ChildId, Vec<GuardianId>) {
    let children = SqliteChildRepository::try_new(conn).unwrap();
    let guardians = SqliteGuardianRepository::try_new(conn).unwrap();

    let child = children
        .create_child(&Child::new("Ada", "Lovelace", 1_552_521_600_000))
        .unwrap();
    let guardian_ids = (0..guardian_count)
        .map(|index| {
            guardians
                .create_guardian(&Guardian::new(Uuid::new_v4(), format!("Guardian {index}")))
                .unwrap()
                .id
        })
        .collect();
    (child.id, guardian_ids)
}

fn manager(conn: &Connection) -> RelationshipManager<SqliteRelationshipRepository<'_>> {
    RelationshipManager::new(SqliteRelationshipRepository::try_new(conn).unwrap())
}

fn store(conn: &Connection) -> SqliteRelationshipRepository<'_> {
    SqliteRelationshipRepository::try_new(conn).unwrap()
}

fn primary_count(conn: &Connection, child_id: ChildId) -> usize {
    store(conn)
        .list_for_child(child_id)
        .unwrap()
        .iter()
        .filter(|row| row.is_primary)
        .count()
}

#[test]
fn second_primary_add_is_rejected_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);

    let row = manager.add_guardian(child, g[0], true).unwrap();
    assert!(row.is_primary);
    assert_eq!(row.child_id, child);
    assert_eq!(row.guardian_id, g[0]);
    assert_eq!(row.created_at, row.updated_at);

    let err = manager.add_guardian(child, g[1], true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(matches!(
        err,
        RelationshipError::InvalidState(InvalidStateReason::PrimaryAlreadyAssigned { child_id })
            if child_id == child
    ));
    assert_eq!(store(&conn).count_for_child(child).unwrap(), 1);
    assert_eq!(
        store(&conn).primary_for_child(child).unwrap().map(|row| row.guardian_id),
        Some(g[0])
    );
}

#[test]
fn non_primary_adds_leave_child_without_primary() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);

    manager.add_guardian(child, g[0], false).unwrap();
    manager.add_guardian(child, g[1], false).unwrap();

    assert!(store(&conn).primary_for_child(child).unwrap().is_none());
    let ids: Vec<GuardianId> = store(&conn)
        .list_for_child(child)
        .unwrap()
        .into_iter()
        .map(|row| row.guardian_id)
        .collect();
    assert_eq!(ids, g);
}

#[test]
fn removing_primary_keeps_other_guardian_without_promotion() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);

    manager.add_guardian(child, g[0], true).unwrap();
    manager.add_guardian(child, g[1], false).unwrap();

    manager.remove_guardian(child, g[0]).unwrap();

    let remaining = store(&conn).list_for_child(child).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].guardian_id, g[1]);
    assert!(!remaining[0].is_primary);
    assert!(store(&conn).primary_for_child(child).unwrap().is_none());
}

#[test]
fn removing_last_guardian_is_rejected_and_row_survives() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 1);
    let manager = manager(&conn);

    manager.add_guardian(child, g[0], true).unwrap();

    for _ in 0..2 {
        let err = manager.remove_guardian(child, g[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(
            err.to_string(),
            format!("cannot remove the last guardian from child {child}")
        );
        assert!(store(&conn).find(child, g[0]).unwrap().is_some());
    }
}

#[test]
fn add_to_unknown_child_names_the_child() {
    let conn = open_db_in_memory().unwrap();
    let (_, g) = seed(&conn, 1);
    let manager = manager(&conn);
    let unknown = Uuid::new_v4();

    let err = manager.add_guardian(unknown, g[0], false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(
        err,
        RelationshipError::NotFound { entity: EntityKind::Child, ref id } if *id == unknown.to_string()
    ));
}

#[test]
fn child_is_checked_before_guardian() {
    let conn = open_db_in_memory().unwrap();
    let manager = manager(&conn);

    let err = manager
        .add_guardian(Uuid::new_v4(), Uuid::new_v4(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        RelationshipError::NotFound {
            entity: EntityKind::Child,
            ..
        }
    ));
}

#[test]
fn add_with_unknown_guardian_names_the_guardian() {
    let conn = open_db_in_memory().unwrap();
    let (child, _) = seed(&conn, 0);
    let manager = manager(&conn);
    let unknown = Uuid::new_v4();

    let err = manager.add_guardian(child, unknown, true).unwrap_err();
    assert_eq!(err.to_string(), format!("guardian not found: {unknown}"));
    assert_eq!(store(&conn).count_for_child(child).unwrap(), 0);
}

#[test]
fn duplicate_pair_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 1);
    let manager = manager(&conn);

    manager.add_guardian(child, g[0], false).unwrap();
    for is_primary in [false, true] {
        let err = manager.add_guardian(child, g[0], is_primary).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(
            err,
            RelationshipError::Conflict(ConflictReason::AlreadyLinked { guardian_id, .. })
                if guardian_id == g[0]
        ));
    }
    assert_eq!(store(&conn).count_for_child(child).unwrap(), 1);
}

#[test]
fn remove_and_promote_unknown_pair_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);
    manager.add_guardian(child, g[0], false).unwrap();

    let expected_id = format!("{child}:{}", g[1]);
    let remove_err = manager.remove_guardian(child, g[1]).unwrap_err();
    let promote_err = manager.set_primary(child, g[1]).unwrap_err();
    for err in [remove_err, promote_err] {
        assert!(matches!(
            err,
            RelationshipError::NotFound { entity: EntityKind::Relationship, ref id } if *id == expected_id
        ));
    }
}

#[test]
fn set_primary_transfers_from_previous_primary() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);
    manager.add_guardian(child, g[0], true).unwrap();
    let before = manager.add_guardian(child, g[1], false).unwrap();

    let promoted = manager.set_primary(child, g[1]).unwrap();

    assert!(promoted.is_primary);
    assert_eq!(promoted.id, before.id);
    assert_eq!(promoted.created_at, before.created_at);
    assert!(promoted.updated_at >= before.updated_at);
    assert_eq!(
        store(&conn).primary_for_child(child).unwrap().map(|row| row.guardian_id),
        Some(g[1])
    );
    assert!(!store(&conn).find(child, g[0]).unwrap().unwrap().is_primary);
    assert_eq!(primary_count(&conn, child), 1);
}

#[test]
fn set_primary_without_previous_primary() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);
    manager.add_guardian(child, g[0], false).unwrap();
    manager.add_guardian(child, g[1], false).unwrap();

    manager.set_primary(child, g[0]).unwrap();
    assert_eq!(primary_count(&conn, child), 1);
    assert!(store(&conn).find(child, g[0]).unwrap().unwrap().is_primary);
}

#[test]
fn set_primary_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let manager = manager(&conn);
    manager.add_guardian(child, g[0], true).unwrap();
    manager.add_guardian(child, g[1], false).unwrap();

    let first = manager.set_primary(child, g[1]).unwrap();
    let state_after_first = store(&conn).list_for_child(child).unwrap();
    let second = manager.set_primary(child, g[1]).unwrap();
    let state_after_second = store(&conn).list_for_child(child).unwrap();

    assert_eq!(first, second);
    assert_eq!(state_after_first, state_after_second);
}

#[test]
fn invariants_hold_across_mixed_operations() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 4);
    let manager = manager(&conn);

    let _ = manager.add_guardian(child, g[0], true);
    let _ = manager.add_guardian(child, g[1], true);
    let _ = manager.add_guardian(child, g[1], false);
    let _ = manager.add_guardian(child, g[1], false);
    let _ = manager.set_primary(child, g[1]);
    let _ = manager.add_guardian(child, g[2], true);
    let _ = manager.add_guardian(child, g[3], false);
    let _ = manager.remove_guardian(child, g[1]);
    let _ = manager.set_primary(child, g[3]);
    let _ = manager.remove_guardian(child, g[0]);
    let _ = manager.remove_guardian(child, g[3]);
    let _ = manager.remove_guardian(child, g[2]);

    let rows = store(&conn).list_for_child(child).unwrap();
    let mut pairs: Vec<GuardianId> = rows.iter().map(|row| row.guardian_id).collect();
    pairs.sort();
    pairs.dedup();
    assert_eq!(pairs.len(), rows.len());
    assert!(primary_count(&conn, child) <= 1);
    assert_eq!(rows.len(), 1);
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<RelationshipEvent>>,
}

impl RelationshipObserver for RecordingObserver {
    fn on_event(&self, event: &RelationshipEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn observers_see_committed_changes_only() {
    let conn = open_db_in_memory().unwrap();
    let (child, g) = seed(&conn, 2);
    let recorder = Arc::new(RecordingObserver::default());
    let manager = manager(&conn).with_observer(recorder.clone());

    let assigned = manager.add_guardian(child, g[0], true).unwrap();
    manager.add_guardian(child, g[1], false).unwrap();
    assert!(manager.add_guardian(child, g[1], true).is_err());
    manager.set_primary(child, g[1]).unwrap();
    manager.set_primary(child, g[1]).unwrap();
    manager.remove_guardian(child, g[0]).unwrap();
    assert!(manager.remove_guardian(child, g[1]).is_err());

    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], RelationshipEvent::GuardianAssigned(assigned));
    assert_eq!(
        events[2],
        RelationshipEvent::PrimaryTransferred {
            child_id: child,
            previous: Some(g[0]),
            current: g[1],
        }
    );
    match &events[3] {
        RelationshipEvent::GuardianRemoved(row) => {
            assert_eq!(row.guardian_id, g[0]);
            assert!(!row.is_primary);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(events.iter().all(|event| event.child_id() == child));
}
