//! Open database files.
//!
//! A [`DbFile`] is one log plus the tables rebuilt from it. An environment
//! keeps at most one `DbFile` per path alive; every database handle on that
//! path shares it.

use crate::error::{EngineError, EngineResult};
use crate::flags::DbFlags;
use crate::table::{Entries, Overlay, Table};
use crate::types::{DatabaseType, OrderKey, RecordNumber, TxnId};
use crate::wal::{LogFile, LogRecord};
use baykv_storage::{FileBackend, FileOptions, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Registry key of an open file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum FileKey {
    /// On-disk file, by normalized path.
    Path(PathBuf),
    /// The environment's in-memory file.
    Memory,
}

/// How a newly created table is logged.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CreateLog {
    /// Log now under `txid`, followed by a commit unless `txid` is NONE.
    Immediate { txid: TxnId, sync: bool },
    /// Log when the creating transaction commits. Until then only the
    /// family rooted at `owner` sees the table.
    Deferred { owner: TxnId },
}

/// One table's uncommitted writes, ready to be applied.
pub(crate) type TableBatch = (Arc<str>, Overlay);

#[derive(Debug)]
pub(crate) struct DbFile {
    uid: u64,
    log: Mutex<LogFile>,
    tables: RwLock<HashMap<String, Table>>,
    read_only: bool,
}

impl DbFile {
    /// Opens (or creates) the file and replays its log. Without a path the
    /// file lives in memory, bounded by `memory_limit`.
    pub(crate) fn open(
        uid: u64,
        path: Option<&Path>,
        create: bool,
        read_only: bool,
        mode: u32,
        memory_limit: Option<u64>,
    ) -> EngineResult<Self> {
        let backend: Box<dyn StorageBackend> = match path {
            Some(path) => {
                let options = FileOptions {
                    create: create && !read_only,
                    read_only,
                    mode,
                };
                Box::new(FileBackend::open_with(path, options)?)
            }
            None => Box::new(match memory_limit {
                Some(limit) => InMemoryBackend::with_limit(limit),
                None => InMemoryBackend::new(),
            }),
        };
        let mut log = LogFile::open(backend)?;
        let scan = log.scan()?;

        let mut tables = HashMap::new();
        let uncommitted = replay(scan.records, &mut tables);

        if !log.is_read_only() {
            if scan.torn {
                tracing::warn!(
                    path = ?path,
                    valid_end = scan.valid_end,
                    "discarding torn record at end of log"
                );
                log.truncate(scan.valid_end)?;
            }
            if !uncommitted.is_empty() {
                tracing::info!(
                    path = ?path,
                    count = uncommitted.len(),
                    "rolling back transactions left unresolved"
                );
                let aborts: Vec<LogRecord> = uncommitted
                    .into_iter()
                    .map(|txid| LogRecord::Abort { txid })
                    .collect();
                log.append(&aborts)?;
                log.sync()?;
            }
        }

        tracing::debug!(path = ?path, tables = tables.len(), "database file opened");
        Ok(Self {
            uid,
            log: Mutex::new(log),
            tables: RwLock::new(tables),
            read_only,
        })
    }

    pub(crate) fn uid(&self) -> u64 {
        self.uid
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Opens `name` for a caller in `family`, creating it when allowed.
    ///
    /// Returns the table's actual type and whether it was created.
    pub(crate) fn open_table(
        &self,
        name: &str,
        kind: DatabaseType,
        flags: DbFlags,
        family: Option<TxnId>,
        log: CreateLog,
    ) -> EngineResult<(DatabaseType, bool)> {
        let mut log_file = self.log.lock();
        let mut tables = self.tables.write();

        if let Some(table) = tables.get(name) {
            if !table.visible_to(family) {
                return Err(uncommitted_table(name, table));
            }
            if flags.contains(DbFlags::EXCLUSIVE) {
                return Err(EngineError::KeyExists);
            }
            let existing = table.kind();
            if kind != DatabaseType::Unknown && kind != existing {
                return Err(EngineError::invalid_argument(format!(
                    "table {name:?} is {existing}, not {kind}"
                )));
            }
            return Ok((existing, false));
        }

        if !flags.contains(DbFlags::CREATE) {
            return Err(EngineError::NotFound);
        }
        if kind == DatabaseType::Unknown {
            return Err(EngineError::invalid_argument(
                "cannot create a table of unknown type",
            ));
        }
        if self.read_only {
            return Err(EngineError::permission_denied("file opened read-only"));
        }

        let table = match log {
            CreateLog::Immediate { txid, sync } => {
                let mut records = vec![LogRecord::Create {
                    txid,
                    table: name.to_owned(),
                    kind,
                }];
                if !txid.is_none() {
                    records.push(LogRecord::Commit { txid });
                }
                log_file.append(&records)?;
                if sync {
                    log_file.sync()?;
                }
                Table::new(kind)
            }
            CreateLog::Deferred { owner } => Table::provisional(kind, owner),
        };

        tables.insert(name.to_owned(), table);
        Ok((kind, true))
    }

    /// Fails unless a caller in `family` may use `name`.
    pub(crate) fn ensure_visible(&self, name: &str, family: Option<TxnId>) -> EngineResult<()> {
        let tables = self.tables.read();
        let table = tables.get(name).ok_or_else(|| table_gone(name))?;
        if table.visible_to(family) {
            Ok(())
        } else {
            Err(uncommitted_table(name, table))
        }
    }

    /// Forgets a table `owner` created, once its family rolls back.
    pub(crate) fn remove_table(&self, name: &str, owner: TxnId) {
        let mut tables = self.tables.write();
        if tables.get(name).and_then(Table::creator) == Some(owner) {
            tables.remove(name);
        }
    }

    /// Runs `f` against a table under the read lock.
    pub(crate) fn read_table<R>(&self, name: &str, f: impl FnOnce(&Table) -> R) -> EngineResult<R> {
        let tables = self.tables.read();
        let table = tables.get(name).ok_or_else(|| table_gone(name))?;
        Ok(f(table))
    }

    /// Returns the table's committed entries.
    pub(crate) fn entries(&self, name: &str) -> EngineResult<Entries> {
        self.read_table(name, |t| Arc::clone(t.entries()))
    }

    /// Every committed key of a table.
    pub(crate) fn keys(&self, name: &str) -> EngineResult<Vec<OrderKey>> {
        self.read_table(name, |t| t.entries().keys().cloned().collect())
    }

    pub(crate) fn allocate_recno(&self, name: &str) -> EngineResult<RecordNumber> {
        let mut tables = self.tables.write();
        let table = tables.get_mut(name).ok_or_else(|| table_gone(name))?;
        table
            .allocate_recno()
            .ok_or_else(|| EngineError::invalid_state("record numbers exhausted"))
    }

    /// Logs and applies a batch of writes outside any transaction family.
    ///
    /// The batch is appended as one write, followed by a commit record unless
    /// `txid` is NONE, and only then applied to the in-memory tables.
    pub(crate) fn apply_batch(
        &self,
        txid: TxnId,
        batch: Vec<TableBatch>,
        sync: bool,
    ) -> EngineResult<()> {
        let mut records = batch_records(txid, &[], &batch);
        if records.is_empty() {
            return Ok(());
        }
        if !txid.is_none() {
            records.push(LogRecord::Commit { txid });
        }

        let mut log = self.log.lock();
        if log.is_read_only() {
            return Err(EngineError::permission_denied("file opened read-only"));
        }
        log.append(&records)?;
        if sync {
            log.sync()?;
        }
        self.install(&[], batch);
        Ok(())
    }

    /// Logs `txid`'s creates and writes without their commit record, leaving
    /// room for it. Returns false when there was nothing to log.
    pub(crate) fn stage(
        &self,
        txid: TxnId,
        creates: &[(String, DatabaseType)],
        batch: &[TableBatch],
    ) -> EngineResult<bool> {
        let records = batch_records(txid, creates, batch);
        if records.is_empty() {
            return Ok(false);
        }

        let mut log = self.log.lock();
        if log.is_read_only() {
            return Err(EngineError::permission_denied("file opened read-only"));
        }
        log.append_reserving(&records, &[LogRecord::Commit { txid }])?;
        Ok(true)
    }

    /// Logs the commit record of a staged batch, then applies the batch.
    pub(crate) fn commit_staged(
        &self,
        txid: TxnId,
        creates: &[(String, DatabaseType)],
        batch: Vec<TableBatch>,
        sync: bool,
    ) -> EngineResult<()> {
        let mut log = self.log.lock();
        log.append(&[LogRecord::Commit { txid }])?;
        if sync {
            log.sync()?;
        }
        self.install(creates, batch);
        Ok(())
    }

    /// Marks a staged batch as rolled back. Replay rolls back a batch with
    /// no outcome anyway, so a failure here is only logged.
    pub(crate) fn abort_staged(&self, txid: TxnId) {
        if let Err(err) = self.log.lock().append(&[LogRecord::Abort { txid }]) {
            tracing::warn!(%txid, %err, "could not log rollback of staged batch");
        }
    }

    fn install(&self, creates: &[(String, DatabaseType)], batch: Vec<TableBatch>) {
        let mut tables = self.tables.write();
        for (name, _) in creates {
            if let Some(table) = tables.get_mut(name) {
                table.settle();
            }
        }
        for (table, overlay) in batch {
            let Some(target) = tables.get_mut(&*table) else {
                tracing::warn!(table = %table, "writes to a dropped table discarded");
                continue;
            };
            for (key, write) in overlay {
                match write {
                    Some(value) => target.put(key, value),
                    None => target.delete(&key),
                }
            }
        }
    }

    /// Empties a table outside any transaction.
    pub(crate) fn truncate_table(&self, name: &str, txid: TxnId, sync: bool) -> EngineResult<()> {
        let mut log = self.log.lock();
        let mut records = vec![LogRecord::Truncate {
            txid,
            table: name.to_owned(),
        }];
        if !txid.is_none() {
            records.push(LogRecord::Commit { txid });
        }
        log.append(&records)?;
        if sync {
            log.sync()?;
        }

        let mut tables = self.tables.write();
        let table = tables.get_mut(name).ok_or_else(|| table_gone(name))?;
        table.clear();
        Ok(())
    }

    /// Forces the log to disk.
    pub(crate) fn sync(&self) -> EngineResult<()> {
        self.log.lock().sync()
    }

    /// Returns the type of `name`, if it exists.
    #[cfg(test)]
    pub(crate) fn table_kind(&self, name: &str) -> Option<DatabaseType> {
        self.tables.read().get(name).map(Table::kind)
    }
}

fn table_gone(name: &str) -> EngineError {
    EngineError::invalid_state(format!("table {name:?} no longer exists"))
}

fn uncommitted_table(name: &str, table: &Table) -> EngineError {
    tracing::debug!(table = name, creator = ?table.creator(), "table not yet committed");
    EngineError::LockNotGranted
}

/// Log records for `creates` followed by every write in `batch`.
fn batch_records(
    txid: TxnId,
    creates: &[(String, DatabaseType)],
    batch: &[TableBatch],
) -> Vec<LogRecord> {
    let mut records: Vec<LogRecord> = creates
        .iter()
        .map(|(table, kind)| LogRecord::Create {
            txid,
            table: table.clone(),
            kind: *kind,
        })
        .collect();
    for (table, overlay) in batch {
        for (key, write) in overlay {
            records.push(match write {
                Some(value) => LogRecord::Put {
                    txid,
                    table: table.to_string(),
                    key: key.key().to_vec(),
                    value: value.clone(),
                },
                None => LogRecord::Delete {
                    txid,
                    table: table.to_string(),
                    key: key.key().to_vec(),
                },
            });
        }
    }
    records
}

/// Rebuilds tables from log records and returns the transactions that
/// neither committed nor aborted.
fn replay(records: Vec<LogRecord>, tables: &mut HashMap<String, Table>) -> Vec<TxnId> {
    let mut pending: BTreeMap<TxnId, Vec<LogRecord>> = BTreeMap::new();

    for record in records {
        match record {
            LogRecord::Commit { txid } => {
                for op in pending.remove(&txid).unwrap_or_default() {
                    apply(op, tables);
                }
            }
            LogRecord::Abort { txid } => {
                pending.remove(&txid);
            }
            op if op.txid().is_none() => apply(op, tables),
            op => pending.entry(op.txid()).or_default().push(op),
        }
    }

    pending.into_keys().collect()
}

fn apply(record: LogRecord, tables: &mut HashMap<String, Table>) {
    match record {
        LogRecord::Create { table, kind, .. } => {
            tables.entry(table).or_insert_with(|| Table::new(kind));
        }
        LogRecord::Put {
            table, key, value, ..
        } => {
            if let Some(target) = tables.get_mut(&table) {
                let key = OrderKey::new(target.kind(), &key);
                target.put(key, value);
            } else {
                tracing::warn!(table = %table, "log write for unknown table skipped");
            }
        }
        LogRecord::Delete { table, key, .. } => {
            if let Some(target) = tables.get_mut(&table) {
                let key = OrderKey::new(target.kind(), &key);
                target.delete(&key);
            }
        }
        LogRecord::Truncate { table, .. } => {
            if let Some(target) = tables.get_mut(&table) {
                target.clear();
            }
        }
        LogRecord::Commit { .. } | LogRecord::Abort { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(k: &str) -> OrderKey {
        OrderKey::new(DatabaseType::OrderedTree, k.as_bytes())
    }

    fn put_batch(table: &str, pairs: &[(&str, Option<&str>)]) -> Vec<TableBatch> {
        let overlay: Overlay = pairs
            .iter()
            .map(|(k, v)| (key(k), v.map(|v| v.as_bytes().to_vec())))
            .collect();
        vec![(Arc::from(table), overlay)]
    }

    fn create(file: &DbFile, name: &str) {
        file.open_table(
            name,
            DatabaseType::OrderedTree,
            DbFlags::CREATE,
            None,
            CreateLog::Immediate {
                txid: TxnId::NONE,
                sync: false,
            },
        )
        .unwrap();
    }

    fn value(file: &DbFile, table: &str, k: &str) -> Option<Vec<u8>> {
        file.read_table(table, |t| t.get(&key(k)).map(<[u8]>::to_vec))
            .unwrap()
    }

    #[test]
    fn committed_writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        {
            let file = DbFile::open(1, Some(&path), true, false, 0o644, None).unwrap();
            create(&file, "");
            file.apply_batch(TxnId::NONE, put_batch("", &[("hoge", Some("fuga"))]), false)
                .unwrap();
            file.apply_batch(TxnId::new(7), put_batch("", &[("x", Some("1"))]), true)
                .unwrap();
        }

        let file = DbFile::open(2, Some(&path), false, true, 0o644, None).unwrap();
        assert_eq!(value(&file, "", "hoge").as_deref(), Some(&b"fuga"[..]));
        assert_eq!(value(&file, "", "x").as_deref(), Some(&b"1"[..]));
    }

    #[test]
    fn uncommitted_records_are_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        {
            let file = DbFile::open(1, Some(&path), true, false, 0o644, None).unwrap();
            create(&file, "");
            // a transaction whose commit record never made it
            let mut log = file.log.lock();
            log.append(&[LogRecord::Put {
                txid: TxnId::new(3),
                table: String::new(),
                key: b"ghost".to_vec(),
                value: b"boo".to_vec(),
            }])
            .unwrap();
        }

        let file = DbFile::open(2, Some(&path), false, false, 0o644, None).unwrap();
        assert_eq!(value(&file, "", "ghost"), None);

        // the rollback is now explicit in the log
        let scan = file.log.lock().scan().unwrap();
        assert_eq!(
            scan.records.last(),
            Some(&LogRecord::Abort {
                txid: TxnId::new(3)
            })
        );
    }

    #[test]
    fn deferred_create_is_logged_with_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let owner = TxnId::new(5);
        let creates = [("named".to_owned(), DatabaseType::Hash)];

        {
            let file = DbFile::open(1, Some(&path), true, false, 0o644, None).unwrap();
            let (kind, created) = file
                .open_table(
                    "named",
                    DatabaseType::Hash,
                    DbFlags::CREATE,
                    Some(owner),
                    CreateLog::Deferred { owner },
                )
                .unwrap();
            assert_eq!(kind, DatabaseType::Hash);
            assert!(created);

            let batch = put_batch("named", &[("k", Some("v"))]);
            assert!(file.stage(owner, &creates, &batch).unwrap());
            file.commit_staged(owner, &creates, batch, false).unwrap();
            file.ensure_visible("named", None).unwrap();
        }

        let file = DbFile::open(2, Some(&path), false, true, 0o644, None).unwrap();
        assert_eq!(file.table_kind("named"), Some(DatabaseType::Hash));
        assert_eq!(value(&file, "named", "k").as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn provisional_table_is_hidden_from_other_families() {
        let file = DbFile::open(1, None, true, false, 0o644, None).unwrap();
        let owner = TxnId::new(9);
        file.open_table(
            "t",
            DatabaseType::OrderedTree,
            DbFlags::CREATE,
            Some(owner),
            CreateLog::Deferred { owner },
        )
        .unwrap();

        file.ensure_visible("t", Some(owner)).unwrap();
        assert!(matches!(
            file.ensure_visible("t", None),
            Err(EngineError::LockNotGranted)
        ));
        assert!(matches!(
            file.open_table(
                "t",
                DatabaseType::Unknown,
                DbFlags::empty(),
                Some(TxnId::new(10)),
                CreateLog::Deferred {
                    owner: TxnId::new(10)
                },
            ),
            Err(EngineError::LockNotGranted)
        ));

        // only the creator can take it away
        file.remove_table("t", TxnId::new(10));
        assert!(file.table_kind("t").is_some());
        file.remove_table("t", owner);
        assert!(file.table_kind("t").is_none());
    }

    #[test]
    fn aborted_stage_is_not_replayed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let txid = TxnId::new(3);

        {
            let file = DbFile::open(1, Some(&path), true, false, 0o644, None).unwrap();
            create(&file, "");
            assert!(file
                .stage(txid, &[], &put_batch("", &[("gone", Some("1"))]))
                .unwrap());
            file.abort_staged(txid);
            assert!(!file.stage(txid, &[], &[]).unwrap());
        }

        let file = DbFile::open(2, Some(&path), false, true, 0o644, None).unwrap();
        assert_eq!(value(&file, "", "gone"), None);
    }

    #[test]
    fn open_table_rules() {
        let file = DbFile::open(1, None, true, false, 0o644, None).unwrap();
        let immediate = CreateLog::Immediate {
            txid: TxnId::NONE,
            sync: false,
        };

        assert!(matches!(
            file.open_table("t", DatabaseType::OrderedTree, DbFlags::empty(), None, immediate),
            Err(EngineError::NotFound)
        ));
        assert!(matches!(
            file.open_table("t", DatabaseType::Unknown, DbFlags::CREATE, None, immediate),
            Err(EngineError::InvalidArgument(_))
        ));

        create(&file, "t");
        assert!(matches!(
            file.open_table(
                "t",
                DatabaseType::OrderedTree,
                DbFlags::CREATE | DbFlags::EXCLUSIVE,
                None,
                immediate
            ),
            Err(EngineError::KeyExists)
        ));
        assert!(matches!(
            file.open_table("t", DatabaseType::Hash, DbFlags::empty(), None, immediate),
            Err(EngineError::InvalidArgument(_))
        ));
        let (kind, created) = file
            .open_table("t", DatabaseType::Unknown, DbFlags::empty(), None, immediate)
            .unwrap();
        assert_eq!(kind, DatabaseType::OrderedTree);
        assert!(!created);
    }

    #[test]
    fn truncate_clears_table() {
        let file = DbFile::open(1, None, true, false, 0o644, None).unwrap();
        create(&file, "");
        file.apply_batch(
            TxnId::NONE,
            put_batch("", &[("a", Some("1")), ("b", Some("2"))]),
            false,
        )
        .unwrap();

        file.truncate_table("", TxnId::NONE, false).unwrap();
        assert!(file.keys("").unwrap().is_empty());
    }

    #[test]
    fn missing_file_without_create() {
        let dir = tempdir().unwrap();
        let absent = dir.path().join("absent.db");
        let result = DbFile::open(1, Some(&absent), false, false, 0o644, None);
        assert!(matches!(result, Err(EngineError::NotFound)));
    }

    #[test]
    fn deletes_in_batch() {
        let file = DbFile::open(1, None, true, false, 0o644, None).unwrap();
        create(&file, "");
        file.apply_batch(TxnId::NONE, put_batch("", &[("a", Some("1"))]), false)
            .unwrap();
        file.apply_batch(TxnId::new(2), put_batch("", &[("a", None)]), false)
            .unwrap();
        assert_eq!(value(&file, "", "a"), None);
        assert_eq!(file.entries("").unwrap().len(), 0);
    }
}
