//! Environments.
//!
//! An environment owns everything databases and transactions share: the
//! registry of open files, the lock manager, the table of active
//! transactions, statistics, and (for environments with a home directory)
//! the attached region.

use crate::config::EnvConfig;
use crate::error::{EngineError, EngineResult};
use crate::file::{DbFile, FileKey};
use crate::flags::{CloseFlags, EnvFlags, TxnFlags};
use crate::lock::{LockManager, LockWait};
use crate::region::Region;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::table::Overlay;
use crate::txn::{EngineTxn, TxnShared};
use crate::types::{TableRef, TxnId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// State shared by every handle opened against one environment.
#[derive(Debug)]
pub(crate) struct EnvShared {
    home: Option<PathBuf>,
    flags: EnvFlags,
    pub(crate) config: EnvConfig,
    closed: AtomicBool,
    files: Mutex<HashMap<FileKey, Weak<DbFile>>>,
    pub(crate) locks: LockManager,
    txns: Mutex<HashMap<TxnId, Weak<TxnShared>>>,
    next_id: AtomicU64,
    pub(crate) stats: EngineStats,
    region: Mutex<Option<Region>>,
}

static DEFAULT_ENV: OnceLock<Arc<EnvShared>> = OnceLock::new();

impl EnvShared {
    fn new(
        home: Option<PathBuf>,
        flags: EnvFlags,
        config: EnvConfig,
        region: Option<Region>,
    ) -> Self {
        Self {
            home,
            flags,
            config,
            closed: AtomicBool::new(false),
            files: Mutex::new(HashMap::new()),
            locks: LockManager::new(),
            txns: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats: EngineStats::new(),
            region: Mutex::new(region),
        }
    }

    /// The process-default environment used by databases opened without
    /// one. It has no home (paths resolve against the working directory)
    /// and is never closed.
    pub(crate) fn default_env() -> Arc<Self> {
        Arc::clone(DEFAULT_ENV.get_or_init(|| {
            Arc::new(Self::new(None, EnvFlags::THREAD, EnvConfig::default(), None))
        }))
    }

    pub(crate) fn flags(&self) -> EnvFlags {
        self.flags
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::invalid_state("environment is closed"));
        }
        Ok(())
    }

    /// Allocates a transaction, locker or file id.
    pub(crate) fn next_id(&self) -> TxnId {
        TxnId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Lock wait policy for requests made outside a transaction.
    pub(crate) fn lock_wait(&self) -> LockWait {
        LockWait::Timeout(self.config.lock_timeout)
    }

    /// Rejects transactions begun in another environment.
    pub(crate) fn check_owns(self: &Arc<Self>, txn: &TxnShared) -> EngineResult<()> {
        if !Arc::ptr_eq(self, txn.env()) {
            return Err(EngineError::invalid_argument(
                "transaction belongs to a different environment",
            ));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.home {
            Some(home) if path.is_relative() => home.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Opens a database file, sharing it with handles that already have it.
    ///
    /// `path == None` selects the environment's in-memory file.
    pub(crate) fn open_file(
        &self,
        path: Option<&Path>,
        create: bool,
        read_only: bool,
        mode: u32,
    ) -> EngineResult<Arc<DbFile>> {
        let resolved = path.map(|p| self.resolve(p));
        let key = match &resolved {
            Some(p) => FileKey::Path(normalize(p)),
            None => FileKey::Memory,
        };

        let mut files = self.files.lock();
        files.retain(|_, file| file.strong_count() > 0);

        if let Some(existing) = files.get(&key).and_then(Weak::upgrade) {
            if existing.is_read_only() && !read_only {
                return Err(EngineError::invalid_state(
                    "file is already open read-only in this environment",
                ));
            }
            return Ok(existing);
        }

        let uid = self.next_id().as_u64();
        let file = Arc::new(DbFile::open(
            uid,
            resolved.as_deref(),
            create,
            read_only && resolved.is_some(),
            mode,
            self.config.memory_limit,
        )?);
        files.insert(key, Arc::downgrade(&file));
        Ok(file)
    }

    pub(crate) fn register_txn(&self, txn: &Arc<TxnShared>) {
        self.txns.lock().insert(txn.id(), Arc::downgrade(txn));
    }

    pub(crate) fn unregister_txn(&self, id: TxnId) {
        self.txns.lock().remove(&id);
    }

    /// Copies the uncommitted writes other transactions hold on `table`.
    ///
    /// Each transaction is locked on its own, never while the caller holds
    /// a transaction lock.
    pub(crate) fn uncommitted_overlays(
        &self,
        table: &TableRef,
        exclude_root: Option<TxnId>,
    ) -> Vec<Overlay> {
        let roots: Vec<Arc<TxnShared>> = self
            .txns
            .lock()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude_root)
            .filter_map(|(_, txn)| txn.upgrade())
            .collect();

        let mut overlays = Vec::new();
        for root in roots {
            root.collect_overlays(table, &mut overlays);
        }
        overlays
    }

    /// Closes the environment: aborts active transactions, syncs open files
    /// and detaches from the region. Later calls are no-ops.
    pub(crate) fn close(&self, flags: CloseFlags) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let active: Vec<Arc<TxnShared>> = self
            .txns
            .lock()
            .drain()
            .filter_map(|(_, txn)| txn.upgrade())
            .collect();
        for txn in active {
            tracing::warn!(txn = %txn.id(), "aborting transaction left active at environment close");
            if let Err(err) = txn.abort() {
                tracing::warn!(txn = %txn.id(), %err, "abort during environment close failed");
            }
        }

        let mut result = Ok(());
        if !flags.contains(CloseFlags::NOSYNC) {
            let files: Vec<Arc<DbFile>> = self
                .files
                .lock()
                .values()
                .filter_map(Weak::upgrade)
                .collect();
            for file in files.iter().filter(|f| !f.is_read_only()) {
                if let Err(err) = file.sync() {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }

        if let Some(region) = self.region.lock().take() {
            let detached = region.close();
            if result.is_ok() {
                result = detached;
            }
        }

        tracing::info!(home = ?self.home, "environment closed");
        result
    }
}

fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// An environment handle.
///
/// Created unopened with [`EngineEnv::create`], then attached to a home
/// directory with [`EngineEnv::open`].
#[derive(Debug)]
pub struct EngineEnv {
    config: EnvConfig,
    shared: Option<Arc<EnvShared>>,
}

impl EngineEnv {
    /// Creates an unopened environment handle.
    #[must_use]
    pub fn create(config: EnvConfig) -> Self {
        Self {
            config,
            shared: None,
        }
    }

    /// Attaches the handle to `home`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `home` (or its region) is missing and `CREATE` is not set
    /// - `RunRecovery` after an unclean shutdown without `RECOVER`
    /// - `VersionMismatch` if the region was written by another format
    /// - `InvalidState` if the handle is already open
    pub fn open(&mut self, home: &Path, flags: EnvFlags, mode: u32) -> EngineResult<()> {
        if self.shared.is_some() {
            return Err(EngineError::invalid_state("environment already open"));
        }

        let mode = self.config.resolve_mode(mode);
        let region = Region::open(home, flags, mode)?;
        let home = fs::canonicalize(region.home()).unwrap_or_else(|_| region.home().to_path_buf());

        tracing::info!(home = %home.display(), ?flags, "environment opened");
        self.shared = Some(Arc::new(EnvShared::new(
            Some(home),
            flags,
            self.config.clone(),
            Some(region),
        )));
        Ok(())
    }

    /// Closes the environment. Closing an unopened handle does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first sync or region error encountered; the environment
    /// is closed regardless.
    pub fn close(self, flags: CloseFlags) -> EngineResult<()> {
        match &self.shared {
            Some(shared) => shared.close(flags),
            None => Ok(()),
        }
    }

    /// Begins a transaction, nested under `parent` if given.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the environment is closed or `parent` is resolved;
    /// `InvalidArgument` if `parent` belongs to another environment.
    pub fn begin(&self, parent: Option<&EngineTxn>, flags: TxnFlags) -> EngineResult<EngineTxn> {
        let shared = self.shared()?;
        let txn = TxnShared::begin(shared, parent.map(EngineTxn::shared), flags)?;
        Ok(EngineTxn::new(txn))
    }

    /// Returns true once [`EngineEnv::open`] has succeeded.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_some()
    }

    /// Returns the resolved home directory.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle is not open.
    pub fn home(&self) -> EngineResult<PathBuf> {
        let shared = self.shared()?;
        shared
            .home
            .clone()
            .ok_or_else(|| EngineError::invalid_state("environment has no home"))
    }

    /// Returns the flags the environment was opened with.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle is not open.
    pub fn flags(&self) -> EngineResult<EnvFlags> {
        Ok(self.shared()?.flags)
    }

    /// Returns the environment's statistics.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle is not open.
    pub fn stats(&self) -> EngineResult<StatsSnapshot> {
        Ok(self.shared()?.stats.snapshot())
    }

    pub(crate) fn shared(&self) -> EngineResult<&Arc<EnvShared>> {
        let shared = self
            .shared
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("environment not open"))?;
        shared.ensure_open()?;
        Ok(shared)
    }
}

impl Drop for EngineEnv {
    fn drop(&mut self) {
        if let Some(shared) = &self.shared {
            if let Err(err) = shared.close(CloseFlags::empty()) {
                tracing::warn!(%err, "environment close on drop failed");
            }
        }
    }
}
