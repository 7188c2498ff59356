//! Record lock manager.
//!
//! Write locks are exclusive per (table, key) and owned by a locker id: the
//! root transaction id for transactional writes, or a throwaway id for a
//! single unscoped write. A waiter that would close a cycle in the
//! waits-for graph is refused with `Deadlock` instead of blocking.

use crate::error::{EngineError, EngineResult};
use crate::stats::EngineStats;
use crate::types::{OrderKey, TableRef, TxnId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// A lockable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LockKey {
    pub(crate) table: TableRef,
    pub(crate) key: OrderKey,
}

/// How long a conflicting request may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockWait {
    /// Fail immediately with `LockNotGranted`.
    NoWait,
    /// Wait up to the bound; `None` waits until granted or deadlocked.
    Timeout(Option<Duration>),
}

#[derive(Debug, Default)]
struct LockTable {
    owners: HashMap<LockKey, TxnId>,
    held: HashMap<TxnId, Vec<LockKey>>,
    waits_for: HashMap<TxnId, TxnId>,
}

impl LockTable {
    /// Would `waiter` waiting on `holder` close a cycle?
    fn would_deadlock(&self, waiter: TxnId, holder: TxnId) -> bool {
        let mut seen = HashSet::new();
        let mut current = holder;
        while seen.insert(current) {
            match self.waits_for.get(&current) {
                Some(next) if *next == waiter => return true,
                Some(next) => current = *next,
                None => return false,
            }
        }
        false
    }

    fn grant(&mut self, locker: TxnId, key: LockKey) {
        self.owners.insert(key.clone(), locker);
        self.held.entry(locker).or_default().push(key);
    }
}

/// Grants, queues and releases record locks for one environment.
#[derive(Debug, Default)]
pub(crate) struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl LockManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquires the write lock on `key` for `locker`, blocking per `wait`.
    ///
    /// Re-acquiring a held lock succeeds immediately.
    pub(crate) fn acquire(
        &self,
        locker: TxnId,
        key: &LockKey,
        wait: LockWait,
        stats: &EngineStats,
    ) -> EngineResult<()> {
        let deadline = match wait {
            LockWait::Timeout(Some(timeout)) => Some(Instant::now() + timeout),
            _ => None,
        };

        let mut table = self.table.lock();
        loop {
            let holder = match table.owners.get(key) {
                None => {
                    table.grant(locker, key.clone());
                    return Ok(());
                }
                Some(owner) if *owner == locker => return Ok(()),
                Some(owner) => *owner,
            };

            if wait == LockWait::NoWait {
                stats.record_lock_timeout();
                return Err(EngineError::LockNotGranted);
            }
            if table.would_deadlock(locker, holder) {
                stats.record_deadlock();
                tracing::debug!(%locker, %holder, table = %key.table, "deadlock detected");
                return Err(EngineError::Deadlock(format!(
                    "{locker} waiting on {holder} would close a cycle"
                )));
            }

            table.waits_for.insert(locker, holder);
            stats.record_lock_wait();
            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut table, deadline).timed_out(),
                None => {
                    self.released.wait(&mut table);
                    false
                }
            };
            table.waits_for.remove(&locker);

            if timed_out && table.owners.get(key).is_some_and(|owner| *owner != locker) {
                stats.record_lock_timeout();
                return Err(EngineError::LockNotGranted);
            }
        }
    }

    /// Returns the current owner of `key`, if any.
    #[cfg(test)]
    pub(crate) fn holder(&self, key: &LockKey) -> Option<TxnId> {
        self.table.lock().owners.get(key).copied()
    }

    /// Releases every lock `locker` holds and wakes all waiters.
    pub(crate) fn release_all(&self, locker: TxnId) {
        let mut table = self.table.lock();
        if let Some(keys) = table.held.remove(&locker) {
            for key in keys {
                table.owners.remove(&key);
            }
        }
        table.waits_for.remove(&locker);
        drop(table);
        self.released.notify_all();
    }

    /// Number of locks currently granted.
    #[cfg(test)]
    pub(crate) fn granted(&self) -> usize {
        self.table.lock().owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DatabaseType;
    use std::sync::Arc;
    use std::thread;

    fn lock_key(k: &str) -> LockKey {
        LockKey {
            table: TableRef::new(1, ""),
            key: OrderKey::new(DatabaseType::OrderedTree, k.as_bytes()),
        }
    }

    #[test]
    fn grant_and_reacquire() {
        let locks = LockManager::new();
        let stats = EngineStats::new();
        let t1 = TxnId::new(1);

        locks.acquire(t1, &lock_key("a"), LockWait::NoWait, &stats).unwrap();
        locks.acquire(t1, &lock_key("a"), LockWait::NoWait, &stats).unwrap();
        assert_eq!(locks.holder(&lock_key("a")), Some(t1));
        assert_eq!(locks.granted(), 1);

        locks.release_all(t1);
        assert_eq!(locks.holder(&lock_key("a")), None);
        assert_eq!(locks.granted(), 0);
    }

    #[test]
    fn nowait_conflict_fails() {
        let locks = LockManager::new();
        let stats = EngineStats::new();
        locks
            .acquire(TxnId::new(1), &lock_key("a"), LockWait::NoWait, &stats)
            .unwrap();

        let result = locks.acquire(TxnId::new(2), &lock_key("a"), LockWait::NoWait, &stats);
        assert!(matches!(result, Err(EngineError::LockNotGranted)));
    }

    #[test]
    fn timeout_conflict_fails() {
        let locks = LockManager::new();
        let stats = EngineStats::new();
        locks
            .acquire(TxnId::new(1), &lock_key("a"), LockWait::NoWait, &stats)
            .unwrap();

        let wait = LockWait::Timeout(Some(Duration::from_millis(20)));
        let result = locks.acquire(TxnId::new(2), &lock_key("a"), wait, &stats);
        assert!(matches!(result, Err(EngineError::LockNotGranted)));
        assert_eq!(stats.snapshot().lock_timeouts, 1);
    }

    #[test]
    fn waiter_granted_after_release() {
        let locks = Arc::new(LockManager::new());
        let stats = Arc::new(EngineStats::new());
        locks
            .acquire(TxnId::new(1), &lock_key("a"), LockWait::NoWait, &stats)
            .unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                locks.acquire(
                    TxnId::new(2),
                    &lock_key("a"),
                    LockWait::Timeout(None),
                    &stats,
                )
            })
        };

        while stats.snapshot().lock_waits == 0 {
            thread::yield_now();
        }
        locks.release_all(TxnId::new(1));

        waiter.join().unwrap().unwrap();
        assert_eq!(locks.holder(&lock_key("a")), Some(TxnId::new(2)));
    }

    #[test]
    fn cycle_is_refused() {
        let locks = Arc::new(LockManager::new());
        let stats = Arc::new(EngineStats::new());
        let (t1, t2) = (TxnId::new(1), TxnId::new(2));
        locks.acquire(t1, &lock_key("a"), LockWait::NoWait, &stats).unwrap();
        locks.acquire(t2, &lock_key("b"), LockWait::NoWait, &stats).unwrap();

        // t1 waits on t2 for "b"
        let waiter = {
            let locks = Arc::clone(&locks);
            let stats = Arc::clone(&stats);
            thread::spawn(move || locks.acquire(t1, &lock_key("b"), LockWait::Timeout(None), &stats))
        };
        while stats.snapshot().lock_waits == 0 {
            thread::yield_now();
        }

        // t2 asking for "a" closes the cycle
        let result = locks.acquire(t2, &lock_key("a"), LockWait::Timeout(None), &stats);
        assert!(matches!(result, Err(EngineError::Deadlock(_))));
        assert_eq!(stats.snapshot().deadlocks, 1);

        locks.release_all(t2);
        waiter.join().unwrap().unwrap();
        assert_eq!(locks.holder(&lock_key("b")), Some(t1));
    }
}
