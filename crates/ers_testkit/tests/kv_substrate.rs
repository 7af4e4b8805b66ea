//! The key-value substrate contract, checked on every engine.

use ers_kv::{open_kv_storage, Cursor, KeyValueStorage, KvEngine, KvError, KvSettings};
use tempfile::TempDir;

struct Engine {
    engine: KvEngine,
    storage: Box<dyn KeyValueStorage>,
    _dir: TempDir,
}

fn settings() -> KvSettings {
    KvSettings::default().lmdb_map_size(16 << 20)
}

fn engines() -> Vec<Engine> {
    KvEngine::ALL
        .into_iter()
        .filter(|engine| engine.is_available())
        .map(|engine| {
            let dir = TempDir::new().unwrap();
            let storage = open_kv_storage(engine, Some(dir.path()), &settings()).unwrap();
            Engine {
                engine,
                storage,
                _dir: dir,
            }
        })
        .collect()
}

fn fill(storage: &dyn KeyValueStorage, map: &str, keys: &[&[u8]]) {
    let mut txn = storage.begin_transaction().unwrap();
    let named = txn.named_map(map, true).unwrap().unwrap();
    for key in keys {
        txn.put(&named, key, &[key.len() as u8]).unwrap();
    }
    txn.commit().unwrap();
}

#[test]
fn cursors_position_relative_to_the_seek_key() {
    for Engine { engine, storage, .. } in engines() {
        fill(storage.as_ref(), "keys", &[b"b", b"d", b"f"]);
        let mut txn = storage.begin_readonly_transaction().unwrap();
        let map = txn.named_map("keys", false).unwrap().unwrap();

        let mut cursor = txn.navigate_to(&map, Some(b"c".as_slice())).unwrap();
        assert!(cursor.move_next().unwrap(), "{engine}");
        assert_eq!(cursor.key().unwrap(), b"d", "{engine}");
        drop(cursor);

        let mut cursor = txn.navigate_to(&map, Some(b"c".as_slice())).unwrap();
        assert!(cursor.move_prev().unwrap(), "{engine}");
        assert_eq!(cursor.key().unwrap(), b"b", "{engine}");
        drop(cursor);

        let mut cursor = txn.navigate_to(&map, Some(b"d".as_slice())).unwrap();
        assert!(cursor.move_next().unwrap(), "{engine}");
        assert_eq!(cursor.key().unwrap(), b"d", "{engine}");
        assert!(cursor.move_next().unwrap(), "{engine}");
        assert_eq!(cursor.key().unwrap(), b"f", "{engine}");
        assert!(!cursor.move_next().unwrap(), "{engine}");
        drop(cursor);

        let mut cursor = txn.navigate_to(&map, None).unwrap();
        assert!(cursor.move_prev().unwrap(), "{engine}");
        assert_eq!(cursor.key().unwrap(), b"f", "{engine}");
        assert_eq!(cursor.value().unwrap(), [1], "{engine}");
        drop(cursor);

        let mut cursor = txn.navigate_to(&map, None).unwrap();
        assert!(cursor.move_next().unwrap(), "{engine}");
        assert_eq!(cursor.key().unwrap(), b"b", "{engine}");
        drop(cursor);

        txn.abort().unwrap();
    }
}

#[test]
fn closed_cursors_fail_fast() {
    for Engine { engine, storage, .. } in engines() {
        fill(storage.as_ref(), "keys", &[b"a"]);
        let mut txn = storage.begin_readonly_transaction().unwrap();
        let map = txn.named_map("keys", false).unwrap().unwrap();
        let mut cursor = txn.navigate_to(&map, None).unwrap();
        assert!(matches!(cursor.key(), Err(KvError::CursorNotPositioned)), "{engine}");
        assert!(cursor.move_next().unwrap(), "{engine}");
        cursor.close();
        assert!(matches!(cursor.move_next(), Err(KvError::CursorClosed)), "{engine}");
        assert!(matches!(cursor.key(), Err(KvError::CursorClosed)), "{engine}");
        drop(cursor);
        txn.abort().unwrap();
    }
}

#[test]
fn finished_and_readonly_transactions_reject_use() {
    for Engine { engine, storage, .. } in engines() {
        fill(storage.as_ref(), "keys", &[b"a"]);

        let mut txn = storage.begin_readonly_transaction().unwrap();
        let map = txn.named_map("keys", false).unwrap().unwrap();
        assert!(matches!(txn.put(&map, b"b", b"2"), Err(KvError::ReadOnly)), "{engine}");
        assert!(txn.named_map("fresh", true).is_err(), "{engine}");
        txn.commit().unwrap();
        assert!(txn.is_finished(), "{engine}");
        assert!(
            matches!(txn.get(&map, b"a"), Err(KvError::TransactionFinished)),
            "{engine}"
        );
    }
}

#[test]
fn writes_are_isolated_until_commit() {
    for Engine { engine, storage, .. } in engines() {
        fill(storage.as_ref(), "keys", &[b"a"]);
        let mut writer = storage.begin_transaction().unwrap();
        let map = writer.named_map("keys", false).unwrap().unwrap();
        assert!(writer.put(&map, b"b", b"2").unwrap(), "{engine}");
        assert!(!writer.put(&map, b"b", b"3").unwrap(), "{engine}");
        assert_eq!(writer.get(&map, b"b").unwrap(), Some(b"3".to_vec()), "{engine}");

        let mut reader = storage.begin_readonly_transaction().unwrap();
        let read_map = reader.named_map("keys", false).unwrap().unwrap();
        assert_eq!(reader.get(&read_map, b"b").unwrap(), None, "{engine}");
        reader.abort().unwrap();
        drop(reader);

        writer.commit().unwrap();
        drop(writer);
        assert_eq!(storage.get("keys", b"b").unwrap(), Some(b"3".to_vec()), "{engine}");
        assert_eq!(storage.map_size("keys").unwrap(), 2, "{engine}");
    }
}

#[test]
fn maps_are_listed_cleared_and_scanned() {
    for Engine { engine, storage, .. } in engines() {
        fill(storage.as_ref(), "ers.1.p.name", &[b"x1", b"x2", b"y1"]);
        fill(storage.as_ref(), "ers.types", &[b"User"]);

        let mut txn = storage.begin_transaction().unwrap();
        let mut names = txn.map_names().unwrap();
        names.sort();
        assert_eq!(names, ["ers.1.p.name", "ers.types"], "{engine}");

        let map = txn.named_map("ers.1.p.name", false).unwrap().unwrap();
        let prefixed: Vec<_> = txn
            .scan_prefix(&map, b"x")
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(prefixed, [b"x1".to_vec(), b"x2".to_vec()], "{engine}");
        let reversed: Vec<_> = txn.scan_reversed(&map).map(|entry| entry.unwrap().0).collect();
        assert_eq!(reversed, [b"y1".to_vec(), b"x2".to_vec(), b"x1".to_vec()], "{engine}");

        assert!(txn.delete(&map, b"x1").unwrap(), "{engine}");
        assert!(!txn.delete(&map, b"x1").unwrap(), "{engine}");
        let types = txn.named_map("ers.types", false).unwrap().unwrap();
        txn.clear_map(&types).unwrap();
        assert_eq!(txn.map_size(&types).unwrap(), 0, "{engine}");
        assert!(txn.named_map("missing", false).unwrap().is_none(), "{engine}");
        txn.commit().unwrap();

        assert_eq!(storage.all("ers.1.p.name").unwrap().len(), 2, "{engine}");
    }
}

#[test]
fn persistent_engines_survive_reopen() {
    for engine in KvEngine::ALL
        .into_iter()
        .filter(|engine| engine.is_available() && engine.is_persistent())
    {
        let dir = TempDir::new().unwrap();
        {
            let storage = open_kv_storage(engine, Some(dir.path()), &settings()).unwrap();
            fill(storage.as_ref(), "keys", &[b"k"]);
            storage.close().unwrap();
        }
        let storage = open_kv_storage(engine, Some(dir.path()), &settings()).unwrap();
        assert_eq!(storage.get("keys", b"k").unwrap(), Some(vec![1]), "{engine}");
    }
}
