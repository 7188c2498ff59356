//! Whole-lifecycle behavior through the public API.

mod common;

use baykv_core::{
    CloseFlags, Database, DatabaseType, DbFlags, EnvFlags, Environment, Error, ReadFlags,
    Transaction, TxnFlags, WriteFlags,
};
use std::path::Path;

#[test]
fn hoge_fuga_without_environment() {
    let home = common::home();
    let file = home.path().join("t.db");

    let db = Database::open(
        None,
        None,
        Some(&file),
        None,
        DatabaseType::OrderedTree,
        DbFlags::CREATE,
        0,
    )
    .unwrap();
    db.put(None, b"hoge", b"fuga", WriteFlags::empty()).unwrap();
    assert_eq!(db.get(None, b"hoge", ReadFlags::empty()).unwrap(), b"fuga");
    db.close(CloseFlags::empty()).unwrap();

    let db = Database::open(
        None,
        None,
        Some(&file),
        None,
        DatabaseType::OrderedTree,
        DbFlags::READONLY,
        0,
    )
    .unwrap();
    let cursor = db.cursor(None, ReadFlags::empty()).unwrap();
    assert_eq!(cursor.first().unwrap(), (b"hoge".to_vec(), b"fuga".to_vec()));
    assert!(matches!(cursor.next(), Err(Error::NotFound)));
    cursor.close().unwrap();
    db.close(CloseFlags::empty()).unwrap();
}

#[test]
fn round_trip_including_empty_values() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "rt.db", DbFlags::empty());

    db.put(None, b"empty", b"", WriteFlags::empty()).unwrap();
    db.put(None, b"bin", &[0, 255, 0, 1], WriteFlags::empty()).unwrap();
    db.put(None, b"", b"empty key", WriteFlags::empty()).unwrap();

    assert!(db.get(None, b"empty", ReadFlags::empty()).unwrap().is_empty());
    assert_eq!(db.get(None, b"bin", ReadFlags::empty()).unwrap(), [0, 255, 0, 1]);
    assert_eq!(db.get(None, b"", ReadFlags::empty()).unwrap(), b"empty key");
}

#[test]
fn missing_and_deleted_keys() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "del.db", DbFlags::empty());

    assert!(matches!(
        db.get(None, b"never", ReadFlags::empty()),
        Err(Error::NotFound)
    ));
    db.put(None, b"k", b"v", WriteFlags::empty()).unwrap();
    db.del(None, b"k", WriteFlags::empty()).unwrap();
    assert!(matches!(
        db.get(None, b"k", ReadFlags::empty()),
        Err(Error::NotFound)
    ));
    assert!(matches!(
        db.del(None, b"k", WriteFlags::empty()),
        Err(Error::NotFound)
    ));
}

#[test]
fn no_overwrite() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "now.db", DbFlags::empty());

    db.put(None, b"k", b"1", WriteFlags::NO_OVERWRITE).unwrap();
    assert!(matches!(
        db.put(None, b"k", b"2", WriteFlags::NO_OVERWRITE),
        Err(Error::KeyExists)
    ));
    assert_eq!(db.get(None, b"k", ReadFlags::empty()).unwrap(), b"1");
}

#[test]
fn cursor_order_ignores_insertion_order() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "order.db", DbFlags::empty());
    for key in [b"c", b"a", b"b"] {
        db.put(None, key, b"x", WriteFlags::empty()).unwrap();
    }

    let cursor = db.cursor(None, ReadFlags::empty()).unwrap();
    assert_eq!(cursor.first().unwrap().0, b"a");
    assert_eq!(cursor.next().unwrap().0, b"b");
    assert_eq!(cursor.next().unwrap().0, b"c");
    assert!(matches!(cursor.next(), Err(Error::NotFound)));

    assert_eq!(cursor.last().unwrap().0, b"c");
    assert_eq!(cursor.prev().unwrap().0, b"b");
}

#[test]
fn cursor_delete_then_next() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "cdel.db", DbFlags::empty());
    for key in [b"a", b"b", b"c"] {
        db.put(None, key, key, WriteFlags::empty()).unwrap();
    }

    let cursor = db.cursor(None, ReadFlags::empty()).unwrap();
    assert!(matches!(cursor.current(), Err(Error::InvalidState(_))));
    assert!(matches!(cursor.del(), Err(Error::InvalidState(_))));

    cursor.seek_exact(b"b").unwrap();
    cursor.del().unwrap();
    assert!(matches!(cursor.current(), Err(Error::KeyEmpty)));
    assert_eq!(cursor.next().unwrap().0, b"c");
    assert!(matches!(
        db.get(None, b"b", ReadFlags::empty()),
        Err(Error::NotFound)
    ));
}

#[test]
fn double_close_everywhere() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "dc.db", DbFlags::empty());
    let cursor = db.cursor(None, ReadFlags::empty()).unwrap();

    cursor.close().unwrap();
    cursor.close().unwrap();
    db.close(CloseFlags::empty()).unwrap();
    db.close(CloseFlags::empty()).unwrap();
    env.close(CloseFlags::empty()).unwrap();
    env.close(CloseFlags::empty()).unwrap();

    assert!(!cursor.valid() && !db.valid() && !env.valid());
}

#[test]
fn abort_rolls_back() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "abort.db", DbFlags::empty());

    let txn = env.begin(None, TxnFlags::empty()).unwrap();
    db.put(Some(&txn), b"k", b"v", WriteFlags::empty()).unwrap();
    txn.abort().unwrap();
    assert!(matches!(
        db.get(None, b"k", ReadFlags::empty()),
        Err(Error::NotFound)
    ));
}

#[test]
fn committed_data_survives_reopen() {
    let home = common::home();
    {
        let env = common::env(home.path(), EnvFlags::empty());
        let db = common::tree(&env, "durable.db", DbFlags::empty());
        let txn = env.begin(None, TxnFlags::empty()).unwrap();
        db.put(Some(&txn), b"kept", b"1", WriteFlags::empty()).unwrap();
        txn.commit(TxnFlags::SYNC).unwrap();

        let lost = env.begin(None, TxnFlags::empty()).unwrap();
        db.put(Some(&lost), b"lost", b"2", WriteFlags::empty()).unwrap();
        // dropped unresolved: aborted
    }

    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "durable.db", DbFlags::empty());
    assert_eq!(db.get(None, b"kept", ReadFlags::empty()).unwrap(), b"1");
    assert!(matches!(
        db.get(None, b"lost", ReadFlags::empty()),
        Err(Error::NotFound)
    ));
}

#[test]
fn nested_transactions() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let db = common::tree(&env, "nested.db", DbFlags::empty());

    let parent = env.begin(None, TxnFlags::empty()).unwrap();
    let kept = env.begin(Some(&parent), TxnFlags::empty()).unwrap();
    db.put(Some(&kept), b"kept", b"1", WriteFlags::empty()).unwrap();
    kept.commit(TxnFlags::empty()).unwrap();

    let discarded = env.begin(Some(&parent), TxnFlags::empty()).unwrap();
    db.put(Some(&discarded), b"discarded", b"2", WriteFlags::empty())
        .unwrap();
    discarded.abort().unwrap();

    let pending = env.begin(Some(&parent), TxnFlags::empty()).unwrap();
    db.put(Some(&pending), b"pending", b"3", WriteFlags::empty())
        .unwrap();
    parent.commit(TxnFlags::empty()).unwrap();
    assert!(!pending.valid());

    assert_eq!(db.get(None, b"kept", ReadFlags::empty()).unwrap(), b"1");
    assert_eq!(db.get(None, b"pending", ReadFlags::empty()).unwrap(), b"3");
    assert!(matches!(
        db.get(None, b"discarded", ReadFlags::empty()),
        Err(Error::NotFound)
    ));
}

#[test]
fn table_created_in_a_transaction_stays_private_until_commit() {
    let home = common::home();
    let open = |env: &Environment, txn: Option<&Transaction>, flags: DbFlags| {
        Database::open(
            Some(env),
            txn,
            Some(Path::new("staged.db")),
            None,
            DatabaseType::OrderedTree,
            flags,
            0,
        )
    };

    {
        let env = common::env(home.path(), EnvFlags::empty());
        let txn = env.begin(None, TxnFlags::empty()).unwrap();
        let db = open(&env, Some(&txn), DbFlags::CREATE).unwrap();

        assert!(matches!(
            db.put(None, b"outside", b"x", WriteFlags::empty()),
            Err(Error::LockNotGranted)
        ));
        assert!(matches!(
            db.get(None, b"inside", ReadFlags::empty()),
            Err(Error::LockNotGranted)
        ));
        assert!(matches!(
            open(&env, None, DbFlags::empty()),
            Err(Error::LockNotGranted)
        ));

        db.put(Some(&txn), b"inside", b"1", WriteFlags::empty()).unwrap();
        txn.commit(TxnFlags::empty()).unwrap();
        db.put(None, b"after", b"2", WriteFlags::empty()).unwrap();
        env.close(CloseFlags::empty()).unwrap();
    }

    let env = common::env(home.path(), EnvFlags::empty());
    let db = open(&env, None, DbFlags::empty()).unwrap();
    assert_eq!(db.get(None, b"inside", ReadFlags::empty()).unwrap(), b"1");
    assert_eq!(db.get(None, b"after", ReadFlags::empty()).unwrap(), b"2");
}

#[test]
fn named_tables_and_unknown_type() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());

    let open = |table: &str, kind: DatabaseType, flags: DbFlags| {
        Database::open(
            Some(&env),
            None,
            Some(std::path::Path::new("multi.db")),
            Some(table),
            kind,
            flags,
            0,
        )
    };
    let users = open("users", DatabaseType::Hash, DbFlags::CREATE).unwrap();
    let logs = open("logs", DatabaseType::Sequential, DbFlags::CREATE).unwrap();
    users.put(None, b"alice", b"1", WriteFlags::empty()).unwrap();
    logs.append(None, b"started").unwrap();

    let again = open("users", DatabaseType::Unknown, DbFlags::empty()).unwrap();
    assert_eq!(again.db_type().unwrap(), DatabaseType::Hash);
    assert_eq!(again.get(None, b"alice", ReadFlags::empty()).unwrap(), b"1");

    assert!(matches!(
        open("users", DatabaseType::OrderedTree, DbFlags::empty()),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        open("fresh", DatabaseType::Unknown, DbFlags::CREATE),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        open("jobs", DatabaseType::Queue, DbFlags::CREATE),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn in_memory_database() {
    let home = common::home();
    let env = common::env(home.path(), EnvFlags::empty());
    let open = || {
        Database::open(
            Some(&env),
            None,
            None,
            Some("scratch"),
            DatabaseType::OrderedTree,
            DbFlags::CREATE,
            0,
        )
        .unwrap()
    };

    let a = open();
    let b = open();
    a.put(None, b"k", b"v", WriteFlags::empty()).unwrap();
    assert_eq!(b.get(None, b"k", ReadFlags::empty()).unwrap(), b"v");
}
