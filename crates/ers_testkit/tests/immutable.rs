//! Freezing, dumping and loading storages.

use ers_core::{EntityRelationshipStorage, ErsError, RamErsSettings, ValueExt};
use ers_testkit::scenarios::{
    populate_users, StorageSnapshot, GROUP_TYPE, USER_COUNT, USER_LINK, USER_PROPERTIES,
    USER_TYPE,
};
use ers_testkit::StorageKind;

fn snapshot(storage: &EntityRelationshipStorage) -> StorageSnapshot {
    storage
        .transactional(true, |txn| StorageSnapshot::capture(txn))
        .unwrap()
}

fn assert_user_queries(storage: &EntityRelationshipStorage, label: &str) {
    storage
        .transactional(true, |txn| {
            assert_eq!(txn.all(USER_TYPE)?.size()?, 100, "{label}");
            let age = |v: i32| v.compressed();
            assert_eq!(txn.find_eq_or_gt(USER_TYPE, "age", age(20))?.size()?, 100, "{label}");
            assert_eq!(txn.find_gt(USER_TYPE, "age", age(20))?.size()?, 90, "{label}");
            assert_eq!(
                txn.find_eq_or_lt(USER_TYPE, "height", 180i32.compressed())?.size()?,
                100,
                "{label}"
            );
            let names: Vec<_> = txn.get_property_names(USER_TYPE)?.into_iter().collect();
            assert_eq!(names, USER_PROPERTIES, "{label}");

            let group = txn.all(GROUP_TYPE)?.first()?;
            let links = match group {
                Some(group) => group.get_links(USER_LINK)?.ids()?,
                None => Vec::new(),
            };
            assert_eq!(links, txn.all(USER_TYPE)?.ids()?, "{label}");
            Ok(())
        })
        .unwrap();
}

#[test]
fn every_backend_freezes_to_the_same_state() {
    for kind in StorageKind::all() {
        let storage = kind.open();
        populate_users(&storage, USER_COUNT).unwrap();
        let expected = snapshot(&storage);

        let frozen = storage.as_immutable("users").unwrap();
        assert!(frozen.is_immutable(), "{kind}");
        assert!(frozen.is_in_ram(), "{kind}");
        assert_eq!(snapshot(&frozen), expected, "{kind}");
        assert_user_queries(&frozen, &kind.to_string());
    }
}

#[test]
fn frozen_storages_reject_every_mutation() {
    let storage = EntityRelationshipStorage::ram();
    let scenario = populate_users(&storage, 3).unwrap();
    let frozen = storage.as_immutable("users").unwrap();

    let txn = frozen.begin_transaction(false).unwrap();
    assert!(matches!(txn.new_entity(USER_TYPE), Err(ErsError::Immutable)));
    assert!(matches!(txn.delete_entity(scenario.users[0]), Err(ErsError::Immutable)));
    assert!(matches!(txn.drop_all(), Err(ErsError::Immutable)));
    let user = txn.get_entity_or_none(scenario.users[0]).unwrap().unwrap();
    assert!(matches!(user.set("login", "x"), Err(ErsError::Immutable)));
    assert!(matches!(user.delete_blob("avatar"), Err(ErsError::Immutable)));
    assert!(matches!(user.delete(), Err(ErsError::Immutable)));
    let group = txn.get_entity_unsafe(scenario.group);
    assert!(matches!(
        group.delete_link(USER_LINK, scenario.users[1]),
        Err(ErsError::Immutable)
    ));
    assert!(matches!(
        txn.all(USER_TYPE).unwrap().delete_all(),
        Err(ErsError::Immutable)
    ));
    txn.commit().unwrap();

    // The source storage stays writable.
    storage
        .transactional(false, |txn| txn.new_entity(USER_TYPE).map(|_| ()))
        .unwrap();
    assert_eq!(snapshot(&frozen).entity_count(), 4);
}

#[test]
fn freezing_a_frozen_storage_keeps_its_state() {
    let storage = EntityRelationshipStorage::ram();
    populate_users(&storage, 5).unwrap();
    let frozen = storage.as_immutable("users").unwrap();
    let again = frozen.as_immutable("other").unwrap();
    assert!(again.is_immutable());
    assert_eq!(snapshot(&again), snapshot(&frozen));
}

#[test]
fn dump_and_load_reproduce_queries() {
    for kind in StorageKind::all() {
        let storage = kind.open();
        populate_users(&storage, USER_COUNT).unwrap();
        let frozen = storage.as_immutable("users").unwrap();

        let mut dump = Vec::new();
        frozen.dump(&mut dump).unwrap();
        let loaded = EntityRelationshipStorage::load(dump.as_slice(), RamErsSettings::default())
            .unwrap();
        assert!(loaded.is_immutable(), "{kind}");
        assert_eq!(snapshot(&loaded), snapshot(&frozen), "{kind}");
        assert_user_queries(&loaded, &format!("{kind} (loaded)"));
    }
}

#[test]
fn mutable_storages_cannot_be_dumped() {
    let storage = EntityRelationshipStorage::ram();
    assert!(matches!(
        storage.dump(Vec::new()),
        Err(ErsError::Unsupported { .. })
    ));
}

#[test]
fn dump_directory_is_written_and_reused() {
    let temp = tempfile::tempdir().unwrap();
    let settings = RamErsSettings::new().immutable_dumps_path(temp.path());

    let storage = EntityRelationshipStorage::ram_with(settings.clone());
    populate_users(&storage, USER_COUNT).unwrap();
    assert!(EntityRelationshipStorage::try_load(&settings, "jdk").unwrap().is_none());

    let frozen = storage.as_immutable("jdk").unwrap();
    assert!(temp.path().join("jdk").is_file());
    let expected = snapshot(&frozen);

    // A later process finds the dump without rebuilding anything.
    let loaded = EntityRelationshipStorage::try_load(&settings, "jdk")
        .unwrap()
        .unwrap();
    assert_eq!(snapshot(&loaded), expected);
    assert_user_queries(&loaded, "try_load");

    // Freezing under an existing id reuses the dump.
    let empty = EntityRelationshipStorage::ram_with(settings.clone());
    let reused = empty.as_immutable("jdk").unwrap();
    assert_eq!(snapshot(&reused), expected);
}

#[test]
fn corrupted_dumps_are_rejected() {
    let storage = EntityRelationshipStorage::ram();
    populate_users(&storage, 10).unwrap();
    let mut dump = Vec::new();
    storage.as_immutable("users").unwrap().dump(&mut dump).unwrap();

    let middle = dump.len() / 2;
    dump[middle] ^= 0x40;
    let result = EntityRelationshipStorage::load(dump.as_slice(), RamErsSettings::default());
    assert!(matches!(result, Err(ErsError::InvalidDump { .. })));

    let result = EntityRelationshipStorage::load(&b"ERSD"[..], RamErsSettings::default());
    assert!(matches!(result, Err(ErsError::InvalidDump { .. })));
}

#[test]
fn corrupted_dump_files_fail_try_load() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("broken"), b"not a dump").unwrap();
    let settings = RamErsSettings::new().immutable_dumps_path(temp.path());
    assert!(matches!(
        EntityRelationshipStorage::try_load(&settings, "broken"),
        Err(ErsError::InvalidDump { .. })
    ));
}

#[test]
fn storage_ids_cannot_leave_the_dump_directory() {
    let temp = tempfile::tempdir().unwrap();
    let dumps = temp.path().join("dumps");
    let settings = RamErsSettings::new().immutable_dumps_path(&dumps);
    let storage = EntityRelationshipStorage::ram_with(settings.clone());
    populate_users(&storage, 10).unwrap();

    for id in ["../escaped", "nested/id", ".."] {
        assert!(
            matches!(storage.as_immutable(id), Err(ErsError::InvalidSettings { .. })),
            "{id}"
        );
        assert!(
            matches!(
                EntityRelationshipStorage::try_load(&settings, id),
                Err(ErsError::InvalidSettings { .. })
            ),
            "{id}"
        );
    }
    assert!(!temp.path().join("escaped").exists());
}
