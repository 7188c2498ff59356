//! Environment statistics.
//!
//! Every environment owns one [`EngineStats`]. Handle counters let callers
//! verify that each handle is released exactly once, including handles that
//! were created but failed to open.

use std::sync::atomic::{AtomicU64, Ordering};

/// Environment statistics and counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Handle counters
    databases_opened: AtomicU64,
    databases_closed: AtomicU64,
    cursors_opened: AtomicU64,
    cursors_closed: AtomicU64,

    // Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,

    // Transaction counters
    transactions_begun: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,

    // Lock counters
    lock_waits: AtomicU64,
    lock_timeouts: AtomicU64,
    deadlocks: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_database_open(&self) {
        self.databases_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_database_close(&self) {
        self.databases_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cursor_open(&self) {
        self.cursors_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cursor_close(&self) {
        self.cursors_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_begin(&self) {
        self.transactions_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            databases_opened: self.databases_opened.load(Ordering::Relaxed),
            databases_closed: self.databases_closed.load(Ordering::Relaxed),
            cursors_opened: self.cursors_opened.load(Ordering::Relaxed),
            cursors_closed: self.cursors_closed.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            transactions_begun: self.transactions_begun.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of environment statistics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Database handles created.
    pub databases_opened: u64,
    /// Database handles released.
    pub databases_closed: u64,
    /// Cursors opened.
    pub cursors_opened: u64,
    /// Cursors released.
    pub cursors_closed: u64,
    /// Point reads served.
    pub reads: u64,
    /// Puts accepted.
    pub writes: u64,
    /// Deletes accepted.
    pub deletes: u64,
    /// Value bytes returned by reads.
    pub bytes_read: u64,
    /// Key and value bytes accepted by puts.
    pub bytes_written: u64,
    /// Transactions begun, nested ones included.
    pub transactions_begun: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted, including failed commits.
    pub transactions_aborted: u64,
    /// Lock requests that had to wait.
    pub lock_waits: u64,
    /// Lock requests that gave up.
    pub lock_timeouts: u64,
    /// Lock requests refused to break a deadlock.
    pub deadlocks: u64,
}

impl StatsSnapshot {
    /// Database handles created but not yet released.
    #[must_use]
    pub const fn live_databases(&self) -> u64 {
        self.databases_opened.saturating_sub(self.databases_closed)
    }

    /// Cursors opened but not yet released.
    #[must_use]
    pub const fn live_cursors(&self) -> u64 {
        self.cursors_opened.saturating_sub(self.cursors_closed)
    }

    /// Database handles and cursors not yet released.
    #[must_use]
    pub const fn live_handles(&self) -> u64 {
        self.live_databases() + self.live_cursors()
    }

    /// Transactions begun and not yet resolved.
    #[must_use]
    pub const fn active_transactions(&self) -> u64 {
        self.transactions_begun
            .saturating_sub(self.transactions_committed + self.transactions_aborted)
    }
}
