//! Database handles.
//!
//! A database is one table inside one file. Handles on the same table share
//! the file's in-memory contents; each handle carries its own open flags.

use crate::cursor::EngineCursor;
use crate::descriptor::Descriptor;
use crate::env::{EngineEnv, EnvShared};
use crate::error::{EngineError, EngineResult};
use crate::file::{CreateLog, DbFile};
use crate::flags::{CloseFlags, DbFlags, EnvFlags, ReadFlags, TxnFlags, WriteFlags};
use crate::lock::LockKey;
use crate::stats::StatsSnapshot;
use crate::table::{Entries, Overlay, ReadView};
use crate::txn::{EngineTxn, TxnShared, TxnState};
use crate::types::{DatabaseType, OrderKey, RecordNumber, TableRef, TxnId};
use parking_lot::MutexGuard;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single-key mutation.
#[derive(Debug)]
pub(crate) enum WriteOp {
    Put { value: Vec<u8>, no_overwrite: bool },
    Delete { must_exist: bool },
}

/// State of an open database, shared with its cursors.
#[derive(Debug)]
pub(crate) struct DbShared {
    pub(crate) env: Arc<EnvShared>,
    file: Arc<DbFile>,
    table: TableRef,
    kind: DatabaseType,
    flags: DbFlags,
    closed: AtomicBool,
}

impl DbShared {
    fn open(
        env: &Arc<EnvShared>,
        txn: Option<&TxnShared>,
        path: Option<&Path>,
        table: Option<&str>,
        kind: DatabaseType,
        flags: DbFlags,
        mode: u32,
    ) -> EngineResult<Self> {
        env.ensure_open()?;
        if let Some(txn) = txn {
            env.check_owns(txn)?;
            if !txn.is_active() {
                return Err(EngineError::invalid_state(format!(
                    "{} is no longer active",
                    txn.id()
                )));
            }
        }

        let name = match table {
            Some("") => return Err(EngineError::invalid_argument("empty table name")),
            Some(_) if kind == DatabaseType::Queue => {
                return Err(EngineError::invalid_argument(
                    "queue tables cannot be named sub-tables",
                ))
            }
            Some(name) => name,
            None => "",
        };
        let read_only = flags.contains(DbFlags::READONLY);
        if read_only && flags.intersects(DbFlags::CREATE | DbFlags::TRUNCATE) {
            return Err(EngineError::invalid_argument(
                "READONLY cannot be combined with CREATE or TRUNCATE",
            ));
        }

        let mode = env.config.resolve_mode(mode);
        let file = env.open_file(path, flags.contains(DbFlags::CREATE), read_only, mode)?;

        let autocommit = autocommits(env, flags);
        let family = txn.map(TxnShared::root);
        let create_log = match family {
            Some(owner) => CreateLog::Deferred { owner },
            None if autocommit => CreateLog::Immediate {
                txid: env.next_id(),
                sync: env.config.sync_on_commit,
            },
            None => CreateLog::Immediate {
                txid: TxnId::NONE,
                sync: false,
            },
        };
        let (kind, created) = file.open_table(name, kind, flags, family, create_log)?;
        if created {
            if let Some(txn) = txn {
                txn.record_created(&file, name, kind);
            }
        }

        let shared = Self {
            env: Arc::clone(env),
            table: TableRef::new(file.uid(), name),
            file,
            kind,
            flags,
            closed: AtomicBool::new(false),
        };
        if flags.contains(DbFlags::TRUNCATE) && !created {
            shared.truncate(txn)?;
        }

        tracing::debug!(table = %shared.table, %kind, created, ?flags, "database opened");
        Ok(shared)
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        self.env.ensure_open()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::invalid_state("database is closed"));
        }
        Ok(())
    }

    /// Fails while the table belongs to another family's uncommitted create.
    pub(crate) fn ensure_visible(&self, txn: Option<&TxnShared>) -> EngineResult<()> {
        self.file
            .ensure_visible(&self.table.name, txn.map(TxnShared::root))
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        if self.flags.contains(DbFlags::READONLY) {
            return Err(EngineError::permission_denied("database opened read-only"));
        }
        Ok(())
    }

    /// Maps a caller key to its position in the table ordering.
    pub(crate) fn order_key(&self, key: &[u8]) -> EngineResult<OrderKey> {
        if self.kind.is_record_number() && RecordNumber::from_key(key).is_none() {
            return Err(EngineError::invalid_argument(format!(
                "{} keys are non-zero {}-byte record numbers",
                self.kind,
                RecordNumber::KEY_LEN
            )));
        }
        Ok(OrderKey::new(self.kind, key))
    }

    /// Whether a read should observe other transactions' uncommitted writes.
    pub(crate) fn dirty(&self, txn: Option<&TxnShared>, flags: ReadFlags) -> EngineResult<bool> {
        let requested = flags.contains(ReadFlags::READ_UNCOMMITTED)
            || txn.is_some_and(|t| t.flags().contains(TxnFlags::READ_UNCOMMITTED));
        if !requested {
            return Ok(false);
        }
        if !self.env.flags().contains(EnvFlags::READ_UNCOMMITTED)
            && !self.flags.contains(DbFlags::READ_UNCOMMITTED)
        {
            return Err(EngineError::invalid_argument(
                "READ_UNCOMMITTED not enabled for this environment or database",
            ));
        }
        Ok(true)
    }

    /// Runs `f` against the table as `txn` sees it.
    pub(crate) fn with_view<R>(
        &self,
        txn: Option<&TxnShared>,
        dirty: bool,
        f: impl FnOnce(&ReadView<'_>) -> R,
    ) -> EngineResult<R> {
        self.ensure_open()?;
        self.ensure_visible(txn)?;
        let snapshot = match txn {
            Some(txn) => {
                self.env.check_owns(txn)?;
                txn.reads_snapshot(self.flags)?
            }
            None => false,
        };

        let others = if dirty && !snapshot {
            self.env
                .uncommitted_overlays(&self.table, txn.map(TxnShared::root))
        } else {
            Vec::new()
        };

        match txn {
            None => {
                let base = self.file.entries(&self.table.name)?;
                let view = ReadView::new(others.iter().collect(), &base);
                Ok(f(&view))
            }
            Some(txn) => {
                let mut chain = txn.lock_chain();
                if let Some(state) = chain.first() {
                    state.ensure_active()?;
                }
                let base = self.base_entries(&mut chain, snapshot)?;
                let overlays: Vec<&Overlay> = chain
                    .iter()
                    .filter_map(|state| state.overlay(&self.table))
                    .chain(others.iter())
                    .collect();
                let view = ReadView::new(overlays, &base);
                Ok(f(&view))
            }
        }
    }

    /// Committed entries, or the family's snapshot of them.
    fn base_entries(
        &self,
        chain: &mut [MutexGuard<'_, TxnState>],
        snapshot: bool,
    ) -> EngineResult<Entries> {
        match chain.last_mut() {
            Some(root) if snapshot => {
                root.snapshot(&self.table, || self.file.entries(&self.table.name))
            }
            _ => self.file.entries(&self.table.name),
        }
    }

    /// Applies one write, inside `txn` or as its own unit.
    pub(crate) fn write(
        &self,
        txn: Option<&TxnShared>,
        key: OrderKey,
        op: WriteOp,
    ) -> EngineResult<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.ensure_visible(txn)?;

        let lock = LockKey {
            table: self.table.clone(),
            key: key.clone(),
        };
        match txn {
            Some(txn) => self.write_in(txn, lock, op),
            None => {
                let locker = self.env.next_id();
                self.env
                    .locks
                    .acquire(locker, &lock, self.env.lock_wait(), &self.env.stats)?;
                let result = self.write_unscoped(locker, lock.key, op);
                self.env.locks.release_all(locker);
                result
            }
        }
    }

    fn write_in(&self, txn: &TxnShared, lock: LockKey, op: WriteOp) -> EngineResult<()> {
        self.env.check_owns(txn)?;
        let snapshot = txn.reads_snapshot(self.flags)?;
        if !txn.is_active() {
            return Err(EngineError::invalid_state(format!(
                "{} is no longer active",
                txn.id()
            )));
        }

        self.env
            .locks
            .acquire(txn.root(), &lock, txn.lock_wait(), &self.env.stats)?;
        let key = lock.key;

        let mut chain = txn.lock_chain();
        if let Some(state) = chain.first() {
            state.ensure_active()?;
        }
        let base = self.base_entries(&mut chain, snapshot)?;
        if snapshot {
            let current = self
                .file
                .read_table(&self.table.name, |t| t.get(&key).map(<[u8]>::to_vec))?;
            if current.as_deref() != base.get(&key).map(Vec::as_slice) {
                self.env.stats.record_deadlock();
                return Err(EngineError::Deadlock(format!(
                    "{} changed in {} after {} took its snapshot",
                    String::from_utf8_lossy(key.key()),
                    self.table,
                    txn.id()
                )));
            }
        }

        let exists = {
            let overlays: Vec<&Overlay> = chain
                .iter()
                .filter_map(|state| state.overlay(&self.table))
                .collect();
            ReadView::new(overlays, &base).get(&key).is_some()
        };
        let write = self.resolve(op, exists)?;

        if let Some(state) = chain.first_mut() {
            state.stage(&self.file, &self.table, key, write);
        }
        Ok(())
    }

    fn write_unscoped(&self, locker: TxnId, key: OrderKey, op: WriteOp) -> EngineResult<()> {
        let exists = self
            .file
            .read_table(&self.table.name, |t| t.get(&key).is_some())?;
        let write = self.resolve(op, exists)?;

        let autocommit = autocommits(&self.env, self.flags);
        let txid = if autocommit { locker } else { TxnId::NONE };
        let sync = autocommit && self.env.config.sync_on_commit;

        let mut overlay = BTreeMap::new();
        overlay.insert(key, write);
        self.file
            .apply_batch(txid, vec![(Arc::clone(&self.table.name), overlay)], sync)
    }

    /// Checks `op` against whether the key exists and records it.
    fn resolve(&self, op: WriteOp, exists: bool) -> EngineResult<Option<Vec<u8>>> {
        match op {
            WriteOp::Put {
                no_overwrite: true, ..
            } if exists => Err(EngineError::KeyExists),
            WriteOp::Put { value, .. } => {
                self.env.stats.record_write(value.len() as u64);
                Ok(Some(value))
            }
            WriteOp::Delete { must_exist: true } if !exists => Err(EngineError::NotFound),
            WriteOp::Delete { .. } => {
                self.env.stats.record_delete();
                Ok(None)
            }
        }
    }

    /// Empties the table, inside `txn` when given.
    fn truncate(&self, txn: Option<&TxnShared>) -> EngineResult<()> {
        self.ensure_writable()?;
        match txn {
            Some(txn) => {
                for key in self.file.keys(&self.table.name)? {
                    let lock = LockKey {
                        table: self.table.clone(),
                        key,
                    };
                    self.write_in(txn, lock, WriteOp::Delete { must_exist: false })?;
                }
                Ok(())
            }
            None => {
                let autocommit = autocommits(&self.env, self.flags);
                let txid = if autocommit {
                    self.env.next_id()
                } else {
                    TxnId::NONE
                };
                self.file.truncate_table(
                    &self.table.name,
                    txid,
                    autocommit && self.env.config.sync_on_commit,
                )
            }
        }
    }

    fn close(&self, flags: CloseFlags) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(table = %self.table, "database closed");
        if flags.contains(CloseFlags::NOSYNC)
            || self.flags.contains(DbFlags::READONLY)
            || self.file.is_read_only()
            || self.env.ensure_open().is_err()
        {
            return Ok(());
        }
        self.file.sync()
    }
}

fn autocommits(env: &EnvShared, flags: DbFlags) -> bool {
    env.flags().contains(EnvFlags::AUTO_COMMIT) || flags.contains(DbFlags::AUTO_COMMIT)
}

fn txn_shared(txn: Option<&EngineTxn>) -> Option<&TxnShared> {
    txn.map(|t| &**t.shared())
}

/// A database handle.
///
/// Created unopened with [`EngineDb::create`] and bound to a table with
/// [`EngineDb::open`].
#[derive(Debug)]
pub struct EngineDb {
    env: Arc<EnvShared>,
    shared: Option<Arc<DbShared>>,
}

impl EngineDb {
    /// Creates an unopened handle in `env`, or in the process-default
    /// environment when `env` is `None`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if `env` is not open.
    pub fn create(env: Option<&EngineEnv>) -> EngineResult<Self> {
        let env = match env {
            Some(env) => Arc::clone(env.shared()?),
            None => EnvShared::default_env(),
        };
        env.stats.record_database_open();
        Ok(Self { env, shared: None })
    }

    /// Opens `table` in `file` (the default table when `table` is `None`,
    /// an in-memory file when `file` is `None`).
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file or table is missing and `CREATE` is not set
    /// - `KeyExists` if `EXCLUSIVE` is set and the table exists
    /// - `InvalidArgument` for a type mismatch, an unknown type on create, or
    ///   a named `Queue` table
    /// - `InvalidState` if the handle is already open
    pub fn open(
        &mut self,
        txn: Option<&EngineTxn>,
        file: Option<&Path>,
        table: Option<&str>,
        kind: DatabaseType,
        flags: DbFlags,
        mode: u32,
    ) -> EngineResult<()> {
        if self.shared.is_some() {
            return Err(EngineError::invalid_state("database already open"));
        }
        let shared = DbShared::open(
            &self.env,
            txn_shared(txn),
            file,
            table,
            kind,
            flags,
            mode,
        )?;
        self.shared = Some(Arc::new(shared));
        Ok(())
    }

    /// Closes the handle. Closing an unopened handle does nothing.
    ///
    /// # Errors
    ///
    /// Returns a sync failure; the handle is closed regardless.
    pub fn close(mut self, flags: CloseFlags) -> EngineResult<()> {
        match self.shared.take() {
            Some(shared) => shared.close(flags),
            None => Ok(()),
        }
    }

    fn shared(&self) -> EngineResult<&Arc<DbShared>> {
        let shared = self
            .shared
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("database not open"))?;
        shared.ensure_open()?;
        Ok(shared)
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// `KeyExists` with `NO_OVERWRITE` when the key is present;
    /// `PermissionDenied` on a read-only handle; lock errors inside a
    /// transaction.
    pub fn put(
        &self,
        txn: Option<&EngineTxn>,
        key: &Descriptor<'_>,
        value: &Descriptor<'_>,
        flags: WriteFlags,
    ) -> EngineResult<()> {
        let shared = self.shared()?;
        let key = shared.order_key(key.as_slice())?;
        shared.write(
            txn_shared(txn),
            key,
            WriteOp::Put {
                value: value.as_slice().to_vec(),
                no_overwrite: flags.contains(WriteFlags::NO_OVERWRITE),
            },
        )
    }

    /// Reads the value stored under `key` into an engine buffer.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent; `InvalidArgument` for a dirty read
    /// the environment and database do not permit.
    pub fn get(
        &self,
        txn: Option<&EngineTxn>,
        key: &Descriptor<'_>,
        flags: ReadFlags,
    ) -> EngineResult<Descriptor<'static>> {
        let shared = self.shared()?;
        let key = shared.order_key(key.as_slice())?;
        let txn = txn_shared(txn);
        let dirty = shared.dirty(txn, flags)?;
        let value = shared
            .with_view(txn, dirty, |view| view.get(&key).map(Descriptor::engine_copy))?
            .ok_or(EngineError::NotFound)?;
        shared.env.stats.record_read(value.len() as u64);
        Ok(value)
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent; `InvalidArgument` for write flags
    /// that make no sense on a delete.
    pub fn del(
        &self,
        txn: Option<&EngineTxn>,
        key: &Descriptor<'_>,
        flags: WriteFlags,
    ) -> EngineResult<()> {
        if flags.contains(WriteFlags::NO_OVERWRITE) {
            return Err(EngineError::invalid_argument(
                "NO_OVERWRITE is not a delete flag",
            ));
        }
        let shared = self.shared()?;
        let key = shared.order_key(key.as_slice())?;
        shared.write(txn_shared(txn), key, WriteOp::Delete { must_exist: true })
    }

    /// Stores `value` under the next record number of a `Sequential` or
    /// `Queue` table and returns that number.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on other table types.
    pub fn append(
        &self,
        txn: Option<&EngineTxn>,
        value: &Descriptor<'_>,
    ) -> EngineResult<RecordNumber> {
        let shared = self.shared()?;
        if !shared.kind.is_record_number() {
            return Err(EngineError::invalid_argument(format!(
                "append needs a record-number table, not {}",
                shared.kind
            )));
        }
        shared.ensure_writable()?;
        shared.ensure_visible(txn_shared(txn))?;
        let recno = shared.file.allocate_recno(&shared.table.name)?;
        let key = OrderKey::new(shared.kind, &recno.to_key());
        shared.write(
            txn_shared(txn),
            key,
            WriteOp::Put {
                value: value.as_slice().to_vec(),
                no_overwrite: true,
            },
        )?;
        Ok(recno)
    }

    /// Opens a cursor over the table.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle or `txn` is not live.
    pub fn cursor(&self, txn: Option<&EngineTxn>, flags: ReadFlags) -> EngineResult<EngineCursor> {
        let shared = self.shared()?;
        let txn = txn.map(|t| Arc::clone(t.shared()));
        if let Some(txn) = &txn {
            shared.env.check_owns(txn)?;
            if !txn.is_active() {
                return Err(EngineError::invalid_state(format!(
                    "{} is no longer active",
                    txn.id()
                )));
            }
        }
        let dirty = shared.dirty(txn.as_deref(), flags)?;
        Ok(EngineCursor::new(Arc::clone(shared), txn, dirty))
    }

    /// Returns the table's type, resolved when opened as `Unknown`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle is not open.
    pub fn db_type(&self) -> EngineResult<DatabaseType> {
        Ok(self.shared()?.kind)
    }

    /// Returns the flags the handle was opened with.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle is not open.
    pub fn flags(&self) -> EngineResult<DbFlags> {
        Ok(self.shared()?.flags)
    }

    /// Returns statistics of the owning environment.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.env.stats.snapshot()
    }
}

impl Drop for EngineDb {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            if let Err(err) = shared.close(CloseFlags::empty()) {
                tracing::warn!(%err, "database close on drop failed");
            }
        }
        self.env.stats.record_database_close();
    }
}
