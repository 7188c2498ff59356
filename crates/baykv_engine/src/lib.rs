//! # baykv engine
//!
//! Embedded storage engine behind the baykv client.
//!
//! Each database file is an append-only log of framed records. Opening a
//! file replays the log into in-memory ordered tables; writes append to the
//! log before they touch memory. On top of that sit:
//!
//! - environments with a home directory, a region recording clean shutdown,
//!   and a process-default environment for handles opened without one
//! - nested transactions with record locks, deadlock detection and
//!   snapshot reads
//! - cursors that track a key position across concurrent changes
//! - key/value [`Descriptor`]s with explicit ownership
//!
//! ## Example
//!
//! ```rust
//! use baykv_engine::{DatabaseType, DbFlags, Descriptor, EngineDb, ReadFlags, WriteFlags};
//!
//! let mut db = EngineDb::create(None).unwrap();
//! db.open(None, None, None, DatabaseType::OrderedTree, DbFlags::CREATE, 0).unwrap();
//! db.put(None, &Descriptor::user(b"hoge"), &Descriptor::user(b"fuga"), WriteFlags::empty())
//!     .unwrap();
//! let value = db.get(None, &Descriptor::user(b"hoge"), ReadFlags::empty()).unwrap();
//! assert_eq!(value.as_slice(), b"fuga");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod db;
mod descriptor;
mod env;
mod error;
mod file;
mod flags;
mod lock;
mod region;
mod stats;
mod table;
mod txn;
mod types;
pub mod wal;

pub use config::EnvConfig;
pub use cursor::{CursorOp, EngineCursor};
pub use db::EngineDb;
pub use descriptor::{Descriptor, Ownership};
pub use env::EngineEnv;
pub use error::{codes, EngineError, EngineResult};
pub use flags::{CloseFlags, DbFlags, EnvFlags, ReadFlags, TxnFlags, WriteFlags};
pub use stats::{EngineStats, StatsSnapshot};
pub use txn::{EngineTxn, TxnStatus};
pub use types::{DatabaseType, RecordNumber, TxnId};
