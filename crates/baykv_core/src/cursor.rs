//! Cursors.

use crate::descriptor::{from_descriptor, to_descriptor};
use crate::error::{Error, Result};
use crate::flags::WriteFlags;
use crate::handle::Handle;
use crate::Database;
use baykv_engine::{CursorOp, EngineCursor};
use std::marker::PhantomData;

/// A key/value pair copied out of the table.
pub type Record = (Vec<u8>, Vec<u8>);

/// A position over a database's key ordering.
///
/// Borrowing the [`Database`] keeps the cursor from outliving it. A cursor
/// opened under a transaction stops working once that transaction resolves.
#[derive(Debug)]
pub struct Cursor<'db> {
    handle: Handle<EngineCursor>,
    _db: PhantomData<&'db Database>,
}

impl<'db> Cursor<'db> {
    pub(crate) fn new(cursor: EngineCursor, free_threaded: bool) -> Self {
        Self {
            handle: Handle::new("cursor", cursor, free_threaded),
            _db: PhantomData,
        }
    }

    fn fetch(&self, op: CursorOp<'_>) -> Result<Record> {
        self.handle.with_mut(|cursor| {
            let (key, value) = cursor.get(op)?;
            Ok((from_descriptor(key), from_descriptor(value)))
        })
    }

    /// Moves to the first record.
    ///
    /// # Errors
    ///
    /// `NotFound` on an empty table.
    pub fn first(&self) -> Result<Record> {
        self.fetch(CursorOp::First)
    }

    /// Moves to the next record; from an unpositioned cursor, the first.
    ///
    /// # Errors
    ///
    /// `NotFound` past the last record.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Result<Record> {
        self.fetch(CursorOp::Next)
    }

    /// Moves to the last record.
    ///
    /// # Errors
    ///
    /// `NotFound` on an empty table.
    pub fn last(&self) -> Result<Record> {
        self.fetch(CursorOp::Last)
    }

    /// Moves to the previous record; from an unpositioned cursor, the last.
    ///
    /// # Errors
    ///
    /// `NotFound` before the first record.
    pub fn prev(&self) -> Result<Record> {
        self.fetch(CursorOp::Prev)
    }

    /// Moves to the first record whose key is at or after `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if every key is smaller.
    pub fn seek(&self, key: &[u8]) -> Result<Record> {
        self.fetch(CursorOp::SetRange(to_descriptor(key)))
    }

    /// Moves to the record with exactly `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent; the position is unchanged.
    pub fn seek_exact(&self, key: &[u8]) -> Result<Record> {
        self.fetch(CursorOp::Set(to_descriptor(key)))
    }

    /// Returns the record at the current position.
    ///
    /// # Errors
    ///
    /// `InvalidState` if unpositioned; `KeyEmpty` if the record was deleted.
    pub fn current(&self) -> Result<Record> {
        self.fetch(CursorOp::Current)
    }

    /// Deletes the record at the current position. The cursor stays put, so
    /// a following [`Cursor::next`] moves past the gap.
    ///
    /// # Errors
    ///
    /// `InvalidState` if unpositioned; `KeyEmpty` if already deleted.
    pub fn del(&self) -> Result<()> {
        self.handle
            .with_mut(|cursor| Ok(cursor.del(WriteFlags::empty())?))
    }

    /// Returns true until the cursor is closed.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.handle.is_live()
    }

    /// Closes the cursor. Closing twice is a no-op, and the database and
    /// other cursors are unaffected.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the other handles.
    pub fn close(&self) -> Result<()> {
        self.handle.close_with(|cursor| {
            cursor.close();
            Ok(())
        })
    }

    /// Iterates forward from the current position (from the first record
    /// when unpositioned).
    pub fn iter(&self) -> Iter<'_, 'db> {
        Iter {
            cursor: self,
            done: false,
        }
    }
}

/// Forward iterator over a [`Cursor`].
///
/// Ends at the last record; any other error is yielded once and ends the
/// iteration.
#[derive(Debug)]
pub struct Iter<'c, 'db> {
    cursor: &'c Cursor<'db>,
    done: bool,
}

impl Iterator for Iter<'_, '_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next() {
            Ok(record) => Some(Ok(record)),
            Err(Error::NotFound) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<'c, 'db> IntoIterator for &'c Cursor<'db> {
    type Item = Result<Record>;
    type IntoIter = Iter<'c, 'db>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::flags::{DbFlags, EnvFlags, ReadFlags, WriteFlags};
    use crate::{Database, DatabaseType, Environment};
    use std::path::Path;
    use tempfile::tempdir;

    fn fixture(dir: &Path, kind: DatabaseType) -> (Environment, Database) {
        let env = Environment::open(dir, EnvFlags::CREATE, 0).unwrap();
        let db = Database::open(
            Some(&env),
            None,
            Some(Path::new("cursor.db")),
            None,
            kind,
            DbFlags::CREATE,
            0,
        )
        .unwrap();
        (env, db)
    }

    #[test]
    fn iter_collects_in_order() {
        let dir = tempdir().unwrap();
        let (_env, db) = fixture(dir.path(), DatabaseType::OrderedTree);
        for k in [b"c", b"a", b"b"] {
            db.put(None, k, k, WriteFlags::empty()).unwrap();
        }

        let cursor = db.cursor(None, ReadFlags::empty()).unwrap();
        let keys: Vec<Vec<u8>> = cursor.iter().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(cursor.iter().next().is_none());
    }

    #[test]
    fn seek_variants() {
        let dir = tempdir().unwrap();
        let (_env, db) = fixture(dir.path(), DatabaseType::OrderedTree);
        for k in [&b"ant"[..], b"bee", b"cat"] {
            db.put(None, k, b"", WriteFlags::empty()).unwrap();
        }

        let cursor = db.cursor(None, ReadFlags::empty()).unwrap();
        assert_eq!(cursor.seek(b"b").unwrap().0, b"bee");
        assert!(matches!(cursor.seek_exact(b"b"), Err(Error::NotFound)));
        assert_eq!(cursor.current().unwrap().0, b"bee");
        assert_eq!(cursor.seek_exact(b"cat").unwrap(), (b"cat".to_vec(), Vec::new()));
        assert!(matches!(cursor.seek(b"dog"), Err(Error::NotFound)));
    }

    #[test]
    fn close_is_idempotent_and_isolated() {
        let dir = tempdir().unwrap();
        let (_env, db) = fixture(dir.path(), DatabaseType::Hash);
        db.put(None, b"k", b"v", WriteFlags::empty()).unwrap();

        let a = db.cursor(None, ReadFlags::empty()).unwrap();
        let b = db.cursor(None, ReadFlags::empty()).unwrap();
        a.close().unwrap();
        a.close().unwrap();
        assert!(!a.valid());
        assert!(matches!(a.first(), Err(Error::InvalidState(_))));

        assert_eq!(b.first().unwrap(), (b"k".to_vec(), b"v".to_vec()));
        assert_eq!(db.get(None, b"k", ReadFlags::empty()).unwrap(), b"v");
    }
}
