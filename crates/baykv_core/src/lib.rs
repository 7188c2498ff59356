//! # baykv
//!
//! Key-value client for the baykv embedded storage engine.
//!
//! Handles follow the engine's resource hierarchy:
//!
//! ```text
//! Environment ─┬─ Transaction (nested under a parent, optionally)
//!              └─ Database ── Cursor
//! ```
//!
//! Every handle closes exactly once. Closing an already closed handle
//! succeeds and does nothing; any other call on it fails with
//! [`Error::InvalidState`]. Keys and values cross the API as plain byte
//! slices, and every read returns a freshly owned `Vec<u8>`.
//!
//! Passing `None` for the environment uses a process-wide default; passing
//! `None` for the transaction makes each write its own unit.
//!
//! ## Example
//!
//! ```rust
//! use baykv_core::{Database, DatabaseType, DbFlags, EnvFlags, Environment, ReadFlags, TxnFlags, WriteFlags};
//! use std::path::Path;
//!
//! let home = tempfile::tempdir()?;
//! let env = Environment::open(home.path(), EnvFlags::CREATE, 0)?;
//! let db = Database::open(
//!     Some(&env),
//!     None,
//!     Some(Path::new("t.db")),
//!     None,
//!     DatabaseType::OrderedTree,
//!     DbFlags::CREATE,
//!     0,
//! )?;
//!
//! let txn = env.begin(None, TxnFlags::empty())?;
//! db.put(Some(&txn), b"hoge", b"fuga", WriteFlags::empty())?;
//! txn.commit(TxnFlags::empty())?;
//!
//! let cursor = db.cursor(None, ReadFlags::empty())?;
//! assert_eq!(cursor.first()?, (b"hoge".to_vec(), b"fuga".to_vec()));
//! cursor.close()?;
//!
//! db.close(Default::default())?;
//! env.close(Default::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod db;
pub mod descriptor;
mod env;
mod error;
pub mod flags;
mod handle;
mod txn;

pub use cursor::{Cursor, Iter, Record};
pub use db::Database;
pub use env::Environment;
pub use error::{Error, Result};
pub use flags::{from_raw, CloseFlags, DbFlags, EnvFlags, ReadFlags, TxnFlags, WriteFlags};
pub use txn::Transaction;

pub use baykv_engine::{DatabaseType, EnvConfig, RecordNumber, StatsSnapshot, TxnId};
