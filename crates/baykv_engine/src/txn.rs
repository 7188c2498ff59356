//! Transactions.
//!
//! Writes made under a transaction are staged in per-table overlays and
//! reach the log only when the root transaction commits. A child
//! transaction commits by merging its overlays into its parent; aborting
//! anything discards its overlays. Locks belong to the root and are held
//! until it resolves.

use crate::env::EnvShared;
use crate::error::{EngineError, EngineResult};
use crate::file::{DbFile, TableBatch};
use crate::flags::{DbFlags, TxnFlags};
use crate::lock::LockWait;
use crate::table::{Entries, Overlay};
use crate::types::{DatabaseType, OrderKey, TableRef, TxnId};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

#[derive(Debug)]
struct CreatedTable {
    file: Arc<DbFile>,
    name: String,
    kind: DatabaseType,
}

/// One file's share of a root commit.
#[derive(Debug, Default)]
struct FileBatch {
    creates: Vec<(String, DatabaseType)>,
    tables: Vec<TableBatch>,
}

/// Mutable part of a transaction.
#[derive(Debug)]
pub(crate) struct TxnState {
    id: TxnId,
    status: TxnStatus,
    writes: HashMap<TableRef, Overlay>,
    files: HashMap<u64, Arc<DbFile>>,
    created: Vec<CreatedTable>,
    children: Vec<Arc<TxnShared>>,
    snapshots: HashMap<TableRef, Entries>,
}

impl TxnState {
    fn new(id: TxnId) -> Self {
        Self {
            id,
            status: TxnStatus::Active,
            writes: HashMap::new(),
            files: HashMap::new(),
            created: Vec::new(),
            children: Vec::new(),
            snapshots: HashMap::new(),
        }
    }

    pub(crate) fn ensure_active(&self) -> EngineResult<()> {
        match self.status {
            TxnStatus::Active => Ok(()),
            TxnStatus::Committed => Err(EngineError::invalid_state(format!(
                "{} already committed",
                self.id
            ))),
            TxnStatus::Aborted => Err(EngineError::invalid_state(format!(
                "{} already aborted",
                self.id
            ))),
        }
    }

    pub(crate) fn overlay(&self, table: &TableRef) -> Option<&Overlay> {
        self.writes.get(table)
    }

    /// Stages a put (`Some`) or delete (`None`).
    pub(crate) fn stage(
        &mut self,
        file: &Arc<DbFile>,
        table: &TableRef,
        key: OrderKey,
        write: Option<Vec<u8>>,
    ) {
        self.writes
            .entry(table.clone())
            .or_default()
            .insert(key, write);
        self.files
            .entry(file.uid())
            .or_insert_with(|| Arc::clone(file));
    }

    /// Returns the snapshot of `table`, taking it on first use.
    pub(crate) fn snapshot(
        &mut self,
        table: &TableRef,
        current: impl FnOnce() -> EngineResult<Entries>,
    ) -> EngineResult<Entries> {
        if let Some(entries) = self.snapshots.get(table) {
            return Ok(Arc::clone(entries));
        }
        let entries = current()?;
        self.snapshots.insert(table.clone(), Arc::clone(&entries));
        Ok(entries)
    }
}

/// A transaction as seen by the engine.
#[derive(Debug)]
pub(crate) struct TxnShared {
    id: TxnId,
    root: TxnId,
    flags: TxnFlags,
    env: Arc<EnvShared>,
    parent: Option<Arc<TxnShared>>,
    state: Mutex<TxnState>,
}

impl TxnShared {
    pub(crate) fn begin(
        env: &Arc<EnvShared>,
        parent: Option<&Arc<TxnShared>>,
        flags: TxnFlags,
    ) -> EngineResult<Arc<Self>> {
        env.ensure_open()?;
        let id = env.next_id();

        let txn = match parent {
            Some(parent) => {
                env.check_owns(parent)?;
                let mut parent_state = parent.state.lock();
                parent_state.ensure_active()?;
                let inherited = parent.flags
                    & (TxnFlags::READ_UNCOMMITTED | TxnFlags::SNAPSHOT | TxnFlags::NOWAIT);
                let txn = Arc::new(Self {
                    id,
                    root: parent.root,
                    flags: flags | inherited,
                    env: Arc::clone(env),
                    parent: Some(Arc::clone(parent)),
                    state: Mutex::new(TxnState::new(id)),
                });
                parent_state.children.push(Arc::clone(&txn));
                txn
            }
            None => {
                let txn = Arc::new(Self {
                    id,
                    root: id,
                    flags,
                    env: Arc::clone(env),
                    parent: None,
                    state: Mutex::new(TxnState::new(id)),
                });
                env.register_txn(&txn);
                txn
            }
        };

        env.stats.record_transaction_begin();
        tracing::debug!(txn = %id, parent = ?parent.map(|p| p.id), ?flags, "transaction begun");
        Ok(txn)
    }

    pub(crate) fn id(&self) -> TxnId {
        self.id
    }

    /// Id of the outermost ancestor; owns all locks of the family.
    pub(crate) fn root(&self) -> TxnId {
        self.root
    }

    pub(crate) fn flags(&self) -> TxnFlags {
        self.flags
    }

    pub(crate) fn env(&self) -> &Arc<EnvShared> {
        &self.env
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().status == TxnStatus::Active
    }

    pub(crate) fn status(&self) -> TxnStatus {
        self.state.lock().status
    }

    pub(crate) fn lock_wait(&self) -> LockWait {
        if self.flags.contains(TxnFlags::NOWAIT) {
            LockWait::NoWait
        } else {
            self.env.lock_wait()
        }
    }

    /// Whether reads of a database with `db_flags` go through a snapshot.
    pub(crate) fn reads_snapshot(&self, db_flags: DbFlags) -> EngineResult<bool> {
        if !self.flags.contains(TxnFlags::SNAPSHOT) {
            return Ok(false);
        }
        if !db_flags.contains(DbFlags::MULTIVERSION) {
            return Err(EngineError::invalid_argument(
                "snapshot transactions require a MULTIVERSION database",
            ));
        }
        Ok(true)
    }

    /// Locks this transaction and every ancestor, innermost first.
    pub(crate) fn lock_chain(&self) -> Vec<MutexGuard<'_, TxnState>> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(txn) = current {
            chain.push(txn.state.lock());
            current = txn.parent.as_deref();
        }
        chain
    }

    /// Remembers a table this transaction created, so that commit logs it
    /// and abort forgets it.
    pub(crate) fn record_created(&self, file: &Arc<DbFile>, name: &str, kind: DatabaseType) {
        let mut state = self.state.lock();
        state.created.push(CreatedTable {
            file: Arc::clone(file),
            name: name.to_owned(),
            kind,
        });
        state
            .files
            .entry(file.uid())
            .or_insert_with(|| Arc::clone(file));
    }

    /// Appends copies of this family's overlays for `table`, descendants
    /// before ancestors.
    pub(crate) fn collect_overlays(&self, table: &TableRef, out: &mut Vec<Overlay>) {
        let (children, own) = {
            let state = self.state.lock();
            if state.status != TxnStatus::Active {
                return;
            }
            (state.children.clone(), state.writes.get(table).cloned())
        };
        for child in children {
            child.collect_overlays(table, out);
        }
        if let Some(overlay) = own {
            out.push(overlay);
        }
    }

    /// Commits the transaction, committing unresolved children first.
    ///
    /// A failed commit leaves the transaction aborted.
    pub(crate) fn commit(&self, flags: TxnFlags) -> EngineResult<()> {
        let children = {
            let mut state = self.state.lock();
            state.ensure_active()?;
            std::mem::take(&mut state.children)
        };

        for child in children {
            if !child.is_active() {
                continue;
            }
            if let Err(err) = child.commit(flags) {
                tracing::warn!(txn = %self.id, child = %child.id, %err, "child commit failed; aborting");
                if let Err(abort_err) = self.abort() {
                    tracing::debug!(txn = %self.id, %abort_err, "abort after failed child commit");
                }
                return Err(err);
            }
        }

        match &self.parent {
            Some(parent) => self.merge_into(parent),
            None => self.commit_root(flags),
        }
    }

    fn merge_into(&self, parent: &TxnShared) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        let mut parent_state = parent.state.lock();
        if let Err(err) = parent_state.ensure_active() {
            drop(parent_state);
            drop(state);
            if let Err(abort_err) = self.abort() {
                tracing::debug!(txn = %self.id, %abort_err, "abort after resolved parent");
            }
            return Err(err);
        }

        for (table, overlay) in state.writes.drain() {
            parent_state.writes.entry(table).or_default().extend(overlay);
        }
        parent_state.files.extend(state.files.drain());
        parent_state.created.append(&mut state.created);
        state.status = TxnStatus::Committed;

        self.env.stats.record_transaction_commit();
        tracing::debug!(txn = %self.id, parent = %parent.id, "transaction merged into parent");
        Ok(())
    }

    /// Commits a root transaction in two passes over its files, in file id
    /// order. The first logs every file's records while keeping room for a
    /// commit record; only when all of them are in does the second write the
    /// commit records and apply the writes. A first-pass failure rolls back
    /// every file.
    fn commit_root(&self, flags: TxnFlags) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ensure_active()?;

        let effective = flags | self.flags;
        let sync = !effective.contains(TxnFlags::NOSYNC)
            && (effective.contains(TxnFlags::SYNC) || self.env.config.sync_on_commit);

        let writes = std::mem::take(&mut state.writes);
        let files = std::mem::take(&mut state.files);
        let created = std::mem::take(&mut state.created);
        state.snapshots.clear();

        let mut batches: BTreeMap<u64, FileBatch> = BTreeMap::new();
        for table in &created {
            batches
                .entry(table.file.uid())
                .or_default()
                .creates
                .push((table.name.clone(), table.kind));
        }
        for (table, overlay) in writes {
            batches
                .entry(table.file)
                .or_default()
                .tables
                .push((table.name, overlay));
        }

        let mut staged: Vec<(Arc<DbFile>, FileBatch)> = Vec::new();
        for (uid, batch) in batches {
            let Some(file) = files.get(&uid) else {
                continue;
            };
            match file.stage(self.id, &batch.creates, &batch.tables) {
                Ok(true) => staged.push((Arc::clone(file), batch)),
                Ok(false) => {}
                Err(err) => {
                    for (file, _) in &staged {
                        file.abort_staged(self.id);
                    }
                    state.status = TxnStatus::Aborted;
                    drop(state);
                    return Err(self.rolled_back(&created, err));
                }
            }
        }

        let count = staged.len();
        let mut outcome: EngineResult<()> = Ok(());
        for (done, (file, batch)) in staged.into_iter().enumerate() {
            if outcome.is_err() {
                file.abort_staged(self.id);
                continue;
            }
            if let Err(err) = file.commit_staged(self.id, &batch.creates, batch.tables, sync) {
                if done == 0 {
                    file.abort_staged(self.id);
                    outcome = Err(err);
                    continue;
                }
                tracing::error!(
                    txn = %self.id,
                    committed = done,
                    files = count,
                    %err,
                    "commit record lost after other files committed"
                );
                outcome = Err(EngineError::run_recovery(format!(
                    "{} committed in {done} of {count} files: {err}",
                    self.id
                )));
            }
        }

        match outcome {
            Ok(()) => {
                state.status = TxnStatus::Committed;
                drop(state);
                self.release();
                self.env.stats.record_transaction_commit();
                tracing::debug!(txn = %self.id, files = count, sync, "transaction committed");
                Ok(())
            }
            Err(err) => {
                state.status = TxnStatus::Aborted;
                drop(state);
                Err(self.rolled_back(&created, err))
            }
        }
    }

    /// Finishes a failed root commit: forgets the tables it created and
    /// frees its locks.
    fn rolled_back(&self, created: &[CreatedTable], err: EngineError) -> EngineError {
        for table in created {
            table.file.remove_table(&table.name, self.root);
        }
        self.release();
        self.env.stats.record_transaction_abort();
        tracing::warn!(txn = %self.id, %err, "commit failed; transaction rolled back");
        err
    }

    /// Aborts the transaction and every unresolved child.
    pub(crate) fn abort(&self) -> EngineResult<()> {
        let children = {
            let mut state = self.state.lock();
            state.ensure_active()?;
            std::mem::take(&mut state.children)
        };
        for child in children {
            if child.is_active() {
                if let Err(err) = child.abort() {
                    tracing::debug!(txn = %child.id, %err, "child already resolved");
                }
            }
        }

        let created = {
            let mut state = self.state.lock();
            state.ensure_active()?;
            state.status = TxnStatus::Aborted;
            state.writes.clear();
            state.files.clear();
            state.snapshots.clear();
            std::mem::take(&mut state.created)
        };
        for table in created {
            table.file.remove_table(&table.name, self.root);
        }

        if self.parent.is_none() {
            self.release();
        }
        self.env.stats.record_transaction_abort();
        tracing::debug!(txn = %self.id, "transaction aborted");
        Ok(())
    }

    fn release(&self) {
        self.env.locks.release_all(self.id);
        self.env.unregister_txn(self.id);
    }
}

/// A transaction handle.
///
/// Dropping an unresolved handle aborts the transaction.
#[derive(Debug)]
pub struct EngineTxn {
    shared: Arc<TxnShared>,
}

impl EngineTxn {
    pub(crate) fn new(shared: Arc<TxnShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<TxnShared> {
        &self.shared
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.shared.id()
    }

    /// Returns the flags the transaction was begun with, inherited ones
    /// included.
    #[must_use]
    pub fn flags(&self) -> TxnFlags {
        self.shared.flags()
    }

    /// Returns true until the transaction commits or aborts.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TxnStatus {
        self.shared.status()
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already resolved. Any other error means the
    /// transaction was rolled back.
    pub fn commit(self, flags: TxnFlags) -> EngineResult<()> {
        self.shared.commit(flags)
    }

    /// Aborts the transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already resolved.
    pub fn abort(self) -> EngineResult<()> {
        self.shared.abort()
    }
}

impl Drop for EngineTxn {
    fn drop(&mut self) {
        if self.shared.is_active() {
            tracing::warn!(txn = %self.shared.id(), "transaction dropped unresolved; aborting");
            if let Err(err) = self.shared.abort() {
                tracing::debug!(txn = %self.shared.id(), %err, "abort on drop failed");
            }
        }
    }
}
