//! Databases.

use crate::cursor::Cursor;
use crate::descriptor::{copy_into, from_descriptor, to_descriptor};
use crate::env::Environment;
use crate::error::Result;
use crate::flags::{check_db, CloseFlags, DbFlags, EnvFlags, ReadFlags, WriteFlags};
use crate::handle::Handle;
use crate::txn::{with_txn, Transaction};
use baykv_engine::{DatabaseType, EngineDb, RecordNumber, StatsSnapshot};
use std::path::Path;

/// An open table.
///
/// Usable from threads other than the opening one only when both the
/// database and its environment were opened with `THREAD`.
///
/// # Example
///
/// ```rust
/// use baykv_core::{Database, DatabaseType, DbFlags, ReadFlags, WriteFlags};
///
/// let db = Database::open(None, None, None, None, DatabaseType::OrderedTree, DbFlags::CREATE, 0)?;
/// db.put(None, b"hoge", b"fuga", WriteFlags::empty())?;
/// assert_eq!(db.get(None, b"hoge", ReadFlags::empty())?, b"fuga");
/// db.close(Default::default())?;
/// # Ok::<(), baykv_core::Error>(())
/// ```
#[derive(Debug)]
pub struct Database {
    handle: Handle<EngineDb>,
    free_threaded: bool,
}

impl Database {
    /// Opens `table` inside `file`.
    ///
    /// - `env == None` uses the process-default environment, where relative
    ///   paths resolve against the working directory
    /// - `txn == None` makes creation its own unit; otherwise a created
    ///   table exists only if `txn` commits
    /// - `file == None` opens an in-memory file shared within the environment
    /// - `table == None` selects the file's default table
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for illegal flag combinations, a type mismatch,
    ///   creating with `Unknown`, or a named `Queue` table
    /// - `NotFound` if the file or table is missing without `CREATE`
    /// - `KeyExists` if `EXCLUSIVE` and the table exists
    /// - `VersionMismatch`/`OldVersion` for files of another format
    pub fn open(
        env: Option<&Environment>,
        txn: Option<&Transaction>,
        file: Option<&Path>,
        table: Option<&str>,
        db_type: DatabaseType,
        flags: DbFlags,
        mode: u32,
    ) -> Result<Self> {
        check_db(flags)?;
        // the process-default environment is always free-threaded
        let (mut db, env_threaded) = match env {
            Some(env) => env.with_engine(|env| {
                let threaded = env.flags()?.contains(EnvFlags::THREAD);
                Ok((EngineDb::create(Some(env))?, threaded))
            })?,
            None => (EngineDb::create(None)?, true),
        };

        let opened = with_txn(txn, |txn| {
            Ok(db.open(txn, file, table, db_type, flags, mode)?)
        });
        if let Err(err) = opened {
            if let Err(close_err) = db.close(CloseFlags::NOSYNC) {
                tracing::warn!(%close_err, "closing partially opened database failed");
            }
            return Err(err);
        }

        let free_threaded = env_threaded && flags.contains(DbFlags::THREAD);
        Ok(Self {
            handle: Handle::new("database", db, free_threaded),
            free_threaded,
        })
    }

    /// Returns true until the database is closed.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.handle.is_live()
    }

    /// Closes the database. Closing twice is a no-op. Open cursors fail
    /// with `InvalidState` afterwards.
    ///
    /// # Errors
    ///
    /// A sync failure; the database is closed regardless.
    pub fn close(&self, flags: CloseFlags) -> Result<()> {
        self.handle.close_with(|db| Ok(db.close(flags)?))
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// - `KeyExists` with `NO_OVERWRITE` if the key is present
    /// - `PermissionDenied` on a `READONLY` database
    /// - `Deadlock`/`LockNotGranted` on lock conflicts
    pub fn put(
        &self,
        txn: Option<&Transaction>,
        key: &[u8],
        value: &[u8],
        flags: WriteFlags,
    ) -> Result<()> {
        self.handle.with(|db| {
            with_txn(txn, |txn| {
                Ok(db.put(txn, &to_descriptor(key), &to_descriptor(value), flags)?)
            })
        })
    }

    /// Returns a copy of the value stored under `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent; `InvalidArgument` for
    /// `READ_UNCOMMITTED` when neither the environment nor the database
    /// permits it.
    pub fn get(&self, txn: Option<&Transaction>, key: &[u8], flags: ReadFlags) -> Result<Vec<u8>> {
        self.handle.with(|db| {
            with_txn(txn, |txn| {
                let value = db.get(txn, &to_descriptor(key), flags)?;
                Ok(from_descriptor(value))
            })
        })
    }

    /// Copies the value stored under `key` into `buf` and returns its
    /// length.
    ///
    /// # Errors
    ///
    /// As [`Database::get`], plus `BufferTooSmall` if `buf` cannot hold the
    /// value.
    pub fn get_into(
        &self,
        txn: Option<&Transaction>,
        key: &[u8],
        buf: &mut [u8],
        flags: ReadFlags,
    ) -> Result<usize> {
        self.handle.with(|db| {
            with_txn(txn, |txn| {
                let value = db.get(txn, &to_descriptor(key), flags)?;
                copy_into(value, buf)
            })
        })
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn del(&self, txn: Option<&Transaction>, key: &[u8], flags: WriteFlags) -> Result<()> {
        self.handle.with(|db| {
            with_txn(txn, |txn| Ok(db.del(txn, &to_descriptor(key), flags)?))
        })
    }

    /// Appends `value` to a `Sequential` or `Queue` table and returns its
    /// record number.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on other table types.
    pub fn append(&self, txn: Option<&Transaction>, value: &[u8]) -> Result<RecordNumber> {
        self.handle.with(|db| {
            with_txn(txn, |txn| Ok(db.append(txn, &to_descriptor(value))?))
        })
    }

    /// Opens a cursor over the table, scoped to `txn` when given.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the database is closed or `txn` resolved.
    pub fn cursor(&self, txn: Option<&Transaction>, flags: ReadFlags) -> Result<Cursor<'_>> {
        let cursor = self
            .handle
            .with(|db| with_txn(txn, |txn| Ok(db.cursor(txn, flags)?)))?;
        Ok(Cursor::new(cursor, self.free_threaded))
    }

    /// Returns the table's type, resolved if it was opened as `Unknown`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed.
    pub fn db_type(&self) -> Result<DatabaseType> {
        self.handle.with(|db| Ok(db.db_type()?))
    }

    /// Returns the flags the database was opened with.
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed.
    pub fn flags(&self) -> Result<DbFlags> {
        self.handle.with(|db| Ok(db.flags()?))
    }

    /// Returns counters of the owning environment.
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed.
    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.handle.with(|db| Ok(db.stats()))
    }
}
