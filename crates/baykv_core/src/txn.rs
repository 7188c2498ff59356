//! Transactions.

use crate::error::Result;
use crate::flags::TxnFlags;
use crate::handle::Handle;
use baykv_engine::{EngineTxn, TxnId};

/// A transaction scope.
///
/// Begun with [`Environment::begin`](crate::Environment::begin) and
/// resolved exactly once with [`Transaction::commit`] or
/// [`Transaction::abort`]. A transaction dropped unresolved is aborted.
/// Operations under one transaction are serialized. The handle may move
/// between threads only when its environment was opened with `THREAD`.
#[derive(Debug)]
pub struct Transaction {
    handle: Handle<EngineTxn>,
    id: TxnId,
}

impl Transaction {
    pub(crate) fn new(txn: EngineTxn, free_threaded: bool) -> Self {
        let id = txn.id();
        Self {
            handle: Handle::new("transaction", txn, free_threaded),
            id,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns true until the transaction commits or aborts, including
    /// through its parent.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.handle.with(|txn| Ok(txn.is_active())).unwrap_or(false)
    }

    /// Commits the transaction. Unresolved child transactions commit first.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if already resolved
    /// - `InvalidArgument` for flags other than `SYNC`/`NOSYNC`; the
    ///   transaction stays active
    /// - anything else means the commit failed and was rolled back
    pub fn commit(&self, flags: TxnFlags) -> Result<()> {
        crate::flags::check_commit(flags)?;
        self.handle.consume(|txn| {
            tracing::debug!(txn = %txn.id(), "committing");
            Ok(txn.commit(flags)?)
        })
    }

    /// Aborts the transaction and every unresolved child.
    ///
    /// # Errors
    ///
    /// `InvalidState` if already resolved.
    pub fn abort(&self) -> Result<()> {
        self.handle.consume(|txn| Ok(txn.abort()?))
    }
}

/// Runs `f` with the engine transaction behind `txn`, holding it
/// exclusively for the duration.
pub(crate) fn with_txn<R>(
    txn: Option<&Transaction>,
    f: impl FnOnce(Option<&EngineTxn>) -> Result<R>,
) -> Result<R> {
    match txn {
        None => f(None),
        Some(txn) => txn.handle.with_mut(|inner| f(Some(&*inner))),
    }
}
