//! Shared fixtures for integration tests.

#![allow(dead_code)]

use baykv_core::{Database, DatabaseType, DbFlags, EnvFlags, Environment};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber honoring `RUST_LOG`, once per binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A fresh home directory.
pub fn home() -> TempDir {
    init_tracing();
    tempfile::tempdir().unwrap()
}

/// Opens an environment in `home` with `CREATE` plus `flags`.
pub fn env(home: &Path, flags: EnvFlags) -> Environment {
    Environment::open(home, EnvFlags::CREATE | flags, 0).unwrap()
}

/// Opens (creating) the default table of `file` as an ordered tree.
pub fn tree(env: &Environment, file: &str, flags: DbFlags) -> Database {
    Database::open(
        Some(env),
        None,
        Some(Path::new(file)),
        None,
        DatabaseType::OrderedTree,
        DbFlags::CREATE | flags,
        0,
    )
    .unwrap()
}
