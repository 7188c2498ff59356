//! Benchmark utilities.

use baykv_core::{Database, DatabaseType, DbFlags, EnvFlags, Environment};
use rand::Rng;
use std::path::Path;
use tempfile::TempDir;

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct keys that sort in generation order.
pub fn sequential_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count as u64).map(|i| i.to_be_bytes().to_vec()).collect()
}

/// A scratch environment with one ordered-tree database.
///
/// The `TempDir` must outlive the handles.
pub fn scratch(file: &str, env_flags: EnvFlags) -> (TempDir, Environment, Database) {
    let home = tempfile::tempdir().unwrap();
    let env = Environment::open(home.path(), EnvFlags::CREATE | env_flags, 0).unwrap();
    let db = Database::open(
        Some(&env),
        None,
        Some(Path::new(file)),
        None,
        DatabaseType::OrderedTree,
        DbFlags::CREATE,
        0,
    )
    .unwrap();
    (home, env, db)
}

/// Fill `db` with `count` records of `value_size` random bytes.
pub fn populate(db: &Database, count: usize, value_size: usize) -> Vec<Vec<u8>> {
    let keys = sequential_keys(count);
    for key in &keys {
        db.put(None, key, &random_data(value_size), baykv_core::WriteFlags::empty())
            .unwrap();
    }
    keys
}
