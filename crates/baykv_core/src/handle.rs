//! Close-once ownership of engine resources.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::fmt;
use std::thread::{self, ThreadId};

/// Owns one engine resource until it is closed.
///
/// The slot is `Some` while the handle is live. Closing takes the resource
/// out under the write lock, so concurrent closes release it exactly once
/// and every caller observes success.
pub(crate) struct Handle<T> {
    kind: &'static str,
    slot: RwLock<Option<T>>,
    owner: ThreadId,
    free_threaded: bool,
}

impl<T> Handle<T> {
    /// Wraps a live resource. Unless `free_threaded`, only the creating
    /// thread may operate on it.
    pub(crate) fn new(kind: &'static str, resource: T, free_threaded: bool) -> Self {
        tracing::debug!(kind, free_threaded, "handle opened");
        Self {
            kind,
            slot: RwLock::new(Some(resource)),
            owner: thread::current().id(),
            free_threaded,
        }
    }

    /// Returns true until the handle is closed.
    pub(crate) fn is_live(&self) -> bool {
        self.slot.read().is_some()
    }

    fn check_thread(&self) -> Result<()> {
        if self.free_threaded || thread::current().id() == self.owner {
            return Ok(());
        }
        Err(Error::invalid_argument(format!(
            "{} used from another thread without THREAD",
            self.kind
        )))
    }

    fn closed(&self) -> Error {
        Error::invalid_state(format!("{} is closed", self.kind))
    }

    /// Runs `f` with shared access to the live resource.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> Result<R>) -> Result<R> {
        self.check_thread()?;
        let slot = self.slot.read();
        let resource = slot.as_ref().ok_or_else(|| self.closed())?;
        f(resource)
    }

    /// Runs `f` with exclusive access to the live resource.
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        self.check_thread()?;
        let mut slot = self.slot.write();
        let resource = slot.as_mut().ok_or_else(|| self.closed())?;
        f(resource)
    }

    /// Takes the resource out and hands it to `f`. A closed handle succeeds
    /// without calling `f`.
    pub(crate) fn close_with(&self, f: impl FnOnce(T) -> Result<()>) -> Result<()> {
        let Some(resource) = self.slot.write().take() else {
            return Ok(());
        };
        tracing::debug!(kind = self.kind, "handle closed");
        f(resource)
    }

    /// Like [`Handle::close_with`], but a closed handle is an error.
    pub(crate) fn consume<R>(&self, f: impl FnOnce(T) -> Result<R>) -> Result<R> {
        self.check_thread()?;
        let resource = self.slot.write().take().ok_or_else(|| self.closed())?;
        tracing::debug!(kind = self.kind, "handle consumed");
        f(resource)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind)
            .field("live", &self.is_live())
            .field("free_threaded", &self.free_threaded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn closed_handle_rejects_use() {
        let handle = Handle::new("thing", 7u32, false);
        assert_eq!(handle.with(|v| Ok(*v)).unwrap(), 7);

        handle.close_with(|_| Ok(())).unwrap();
        assert!(!handle.is_live());
        assert!(matches!(
            handle.with(|v| Ok(*v)),
            Err(Error::InvalidState(_))
        ));
        handle.close_with(|_| panic!("released twice")).unwrap();
    }

    #[test]
    fn consume_twice_fails() {
        let handle = Handle::new("thing", 1u32, true);
        assert_eq!(handle.consume(|v| Ok(v + 1)).unwrap(), 2);
        assert!(matches!(
            handle.consume(|v| Ok(v)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn concurrent_close_releases_once() {
        let handle = Arc::new(Handle::new("thing", (), true));
        let released = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                let released = Arc::clone(&released);
                thread::spawn(move || {
                    handle.close_with(|()| {
                        released.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn owner_thread_enforced() {
        let pinned = Arc::new(Handle::new("pinned", 0u8, false));
        let free = Arc::new(Handle::new("free", 0u8, true));

        let (p, f) = (Arc::clone(&pinned), Arc::clone(&free));
        thread::spawn(move || {
            assert!(matches!(
                p.with(|_| Ok(())),
                Err(Error::InvalidArgument(_))
            ));
            f.with_mut(|v| {
                *v += 1;
                Ok(())
            })
            .unwrap();
            p.close_with(|_| Ok(())).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(free.with(|v| Ok(*v)).unwrap(), 1);
        assert!(!pinned.is_live());
    }
}
