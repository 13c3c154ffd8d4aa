use careconnect_core::db::open_db_in_memory;
use careconnect_core::{
    Child, ChildRepository, ChildValidationError, Guardian, GuardianRelationshipRepository,
    GuardianRepository, RepoError, SqliteChildRepository, SqliteGuardianRepository,
    SqliteRelationshipRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

const DOB_2019_03_14: i64 = 1_552_521_600_000;

#[test]
fn child_create_get_update_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChildRepository::try_new(&conn).unwrap();

    let mut child = Child::new("  Ada ", "Lovelace", DOB_2019_03_14);
    child.special_needs = Some("peanut allergy".to_string());
    let stored = repo.create_child(&child).unwrap();
    assert_eq!(stored.first_name, "Ada");
    assert!(stored.created_at > 0);
    assert_eq!(stored.created_at, stored.updated_at);

    let mut changed = stored.clone();
    changed.gender = Some("F".to_string());
    let updated = repo.update_child(&changed).unwrap();
    assert_eq!(updated.gender.as_deref(), Some("F"));
    assert_eq!(updated.created_at, stored.created_at);
    assert!(updated.updated_at >= stored.updated_at);

    let loaded = repo.get_child(child.id).unwrap().unwrap();
    assert_eq!(loaded, updated);
    assert!(repo.child_exists(child.id).unwrap());
    assert!(!repo.child_exists(Uuid::new_v4()).unwrap());
}

#[test]
fn child_validation_runs_before_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChildRepository::try_new(&conn).unwrap();

    let err = repo
        .create_child(&Child::new(" ", "Lovelace", DOB_2019_03_14))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::ChildValidation(ChildValidationError::MissingField("first_name"))
    ));
    assert!(repo.list_children().unwrap().is_empty());
}

#[test]
fn update_unknown_child_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChildRepository::try_new(&conn).unwrap();

    let child = Child::new("Ada", "Lovelace", DOB_2019_03_14);
    assert!(matches!(
        repo.update_child(&child),
        Err(RepoError::ChildNotFound(id)) if id == child.id
    ));
    assert!(matches!(
        repo.delete_child(child.id),
        Err(RepoError::ChildNotFound(_))
    ));
}

#[test]
fn children_are_listed_by_last_then_first_name() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChildRepository::try_new(&conn).unwrap();

    for (first, last) in [("Grace", "Hopper"), ("Charles", "Babbage"), ("Ada", "Babbage")] {
        repo.create_child(&Child::new(first, last, DOB_2019_03_14))
            .unwrap();
    }

    let names: Vec<String> = repo
        .list_children()
        .unwrap()
        .iter()
        .map(Child::full_name)
        .collect();
    assert_eq!(names, ["Ada Babbage", "Charles Babbage", "Grace Hopper"]);
}

#[test]
fn guardian_per_user_is_unique() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteGuardianRepository::try_new(&conn).unwrap();
    let user_id = Uuid::new_v4();

    let first = repo.create_guardian(&Guardian::new(user_id, "Mother")).unwrap();
    assert_eq!(repo.find_by_user_id(user_id).unwrap(), Some(first.clone()));

    let err = repo
        .create_guardian(&Guardian::new(user_id, "Aunt"))
        .unwrap_err();
    assert!(matches!(err, RepoError::DuplicateUser(id) if id == user_id));
    assert_eq!(repo.list_guardians().unwrap(), vec![first]);
}

#[test]
fn guardian_update_persists_pickup_flag() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteGuardianRepository::try_new(&conn).unwrap();

    let mut guardian = repo
        .create_guardian(&Guardian::new(Uuid::new_v4(), "Grandparent"))
        .unwrap();
    assert!(!guardian.pickup_authorized);

    guardian.pickup_authorized = true;
    guardian.emergency_contact = Some("+1 555 0100".to_string());
    repo.update_guardian(&guardian).unwrap();

    let loaded = repo.get_guardian(guardian.id).unwrap().unwrap();
    assert!(loaded.pickup_authorized);
    assert_eq!(loaded.emergency_contact.as_deref(), Some("+1 555 0100"));
    assert!(repo.guardian_exists(guardian.id).unwrap());
}

#[test]
fn deleting_child_cascades_to_relationships() {
    let conn = open_db_in_memory().unwrap();
    let (children, guardians, relationships) = stores(&conn);

    let child = children
        .create_child(&Child::new("Ada", "Lovelace", DOB_2019_03_14))
        .unwrap();
    let guardian = guardians
        .create_guardian(&Guardian::new(Uuid::new_v4(), "Mother"))
        .unwrap();
    relationships
        .insert_if_absent_and_primary_free(child.id, guardian.id, true)
        .unwrap();

    children.delete_child(child.id).unwrap();

    assert_eq!(relationships.count_for_child(child.id).unwrap(), 0);
    assert!(relationships
        .list_for_guardian(guardian.id)
        .unwrap()
        .is_empty());
    assert!(guardians.guardian_exists(guardian.id).unwrap());
}

#[test]
fn deleting_sole_guardian_of_child_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let (children, guardians, relationships) = stores(&conn);

    let child = children
        .create_child(&Child::new("Ada", "Lovelace", DOB_2019_03_14))
        .unwrap();
    let guardian = guardians
        .create_guardian(&Guardian::new(Uuid::new_v4(), "Mother"))
        .unwrap();
    relationships
        .insert_if_absent_and_primary_free(child.id, guardian.id, false)
        .unwrap();

    let err = guardians.delete_guardian(guardian.id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::SoleGuardianOfChild { guardian_id, child_id }
            if guardian_id == guardian.id && child_id == child.id
    ));
    assert!(guardians.guardian_exists(guardian.id).unwrap());
    assert_eq!(relationships.count_for_child(child.id).unwrap(), 1);
}

#[test]
fn deleting_shared_guardian_removes_its_links_only() {
    let conn = open_db_in_memory().unwrap();
    let (children, guardians, relationships) = stores(&conn);

    let child = children
        .create_child(&Child::new("Ada", "Lovelace", DOB_2019_03_14))
        .unwrap();
    let mother = guardians
        .create_guardian(&Guardian::new(Uuid::new_v4(), "Mother"))
        .unwrap();
    let father = guardians
        .create_guardian(&Guardian::new(Uuid::new_v4(), "Father"))
        .unwrap();
    relationships
        .insert_if_absent_and_primary_free(child.id, mother.id, true)
        .unwrap();
    relationships
        .insert_if_absent_and_primary_free(child.id, father.id, false)
        .unwrap();

    guardians.delete_guardian(mother.id).unwrap();

    let remaining = relationships.list_for_child(child.id).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].guardian_id, father.id);
    assert!(relationships.primary_for_child(child.id).unwrap().is_none());
    assert!(matches!(
        guardians.delete_guardian(mother.id),
        Err(RepoError::GuardianNotFound(_))
    ));
}

#[test]
fn repositories_reject_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    assert!(matches!(
        SqliteChildRepository::try_new(&conn),
        Err(RepoError::NotReady(_))
    ));
    assert!(matches!(
        SqliteGuardianRepository::try_new(&conn),
        Err(RepoError::NotReady(_))
    ));
    assert!(SqliteRelationshipRepository::try_new(&conn).is_err());
}

fn stores(
    conn: &Connection,
) -> (
    SqliteChildRepository<'_>,
    SqliteGuardianRepository<'_>,
    SqliteRelationshipRepository<'_>,
) {
    (
        SqliteChildRepository::try_new(conn).unwrap(),
        SqliteGuardianRepository::try_new(conn).unwrap(),
        SqliteRelationshipRepository::try_new(conn).unwrap(),
    )
}
