//! Environments.

use crate::error::Result;
use crate::flags::{CloseFlags, EnvFlags, TxnFlags};
use crate::handle::Handle;
use crate::txn::Transaction;
use baykv_engine::{EngineEnv, EnvConfig, StatsSnapshot};
use std::path::{Path, PathBuf};

/// A shared context that databases and transactions are opened against.
///
/// Databases opened with no environment use a process-wide default one.
///
/// # Example
///
/// ```rust,no_run
/// use baykv_core::{EnvFlags, Environment, TxnFlags};
///
/// let env = Environment::open("/tmp/baykv-home", EnvFlags::CREATE | EnvFlags::THREAD, 0)?;
/// let txn = env.begin(None, TxnFlags::empty())?;
/// txn.commit(TxnFlags::empty())?;
/// env.close(Default::default())?;
/// # Ok::<(), baykv_core::Error>(())
/// ```
#[derive(Debug)]
pub struct Environment {
    handle: Handle<EngineEnv>,
}

impl Environment {
    /// Opens the environment in `home` with default configuration.
    ///
    /// `mode` is applied to created files; `0` means the configured default.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `home` is missing and `CREATE` is not set
    /// - `RunRecoveryRequired` after an unclean shutdown without `RECOVER`
    /// - `VersionMismatch` if the region was written by another format
    /// - `PermissionDenied` if `home` cannot be written
    pub fn open(home: impl AsRef<Path>, flags: EnvFlags, mode: u32) -> Result<Self> {
        Self::open_with_config(home, flags, mode, EnvConfig::default())
    }

    /// Opens the environment with explicit configuration.
    ///
    /// # Errors
    ///
    /// As [`Environment::open`].
    pub fn open_with_config(
        home: impl AsRef<Path>,
        flags: EnvFlags,
        mode: u32,
        config: EnvConfig,
    ) -> Result<Self> {
        let mut env = EngineEnv::create(config);
        // an unopened engine handle is released by its drop
        env.open(home.as_ref(), flags, mode)?;
        Ok(Self {
            handle: Handle::new("environment", env, flags.contains(EnvFlags::THREAD)),
        })
    }

    /// Returns true until the environment is closed.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.handle.is_live()
    }

    /// Closes the environment. Closing twice is a no-op.
    ///
    /// Transactions still active are aborted; databases and cursors opened
    /// against the environment fail with `InvalidState` afterwards.
    ///
    /// # Errors
    ///
    /// A sync or region failure; the environment is closed regardless.
    pub fn close(&self, flags: CloseFlags) -> Result<()> {
        self.handle.close_with(|env| Ok(env.close(flags)?))
    }

    /// Begins a transaction, nested under `parent` when given.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for illegal flags or a parent from another
    /// environment; `InvalidState` if the environment is closed or `parent`
    /// already resolved.
    pub fn begin(&self, parent: Option<&Transaction>, flags: TxnFlags) -> Result<Transaction> {
        crate::flags::check_begin(flags)?;
        self.handle.with(|env| {
            let threaded = env.flags()?.contains(EnvFlags::THREAD);
            let txn = crate::txn::with_txn(parent, |parent| Ok(env.begin(parent, flags)?))?;
            Ok(Transaction::new(txn, threaded))
        })
    }

    /// Returns the resolved home directory.
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed.
    pub fn home(&self) -> Result<PathBuf> {
        self.handle.with(|env| Ok(env.home()?))
    }

    /// Returns the flags the environment was opened with.
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed.
    pub fn flags(&self) -> Result<EnvFlags> {
        self.handle.with(|env| Ok(env.flags()?))
    }

    /// Returns handle, operation and transaction counters.
    ///
    /// # Errors
    ///
    /// `InvalidState` if closed.
    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.handle.with(|env| Ok(env.stats()?))
    }

    pub(crate) fn with_engine<R>(&self, f: impl FnOnce(&EngineEnv) -> Result<R>) -> Result<R> {
        self.handle.with(f)
    }
}
