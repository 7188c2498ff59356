//! Cursors.
//!
//! A cursor remembers the key it last returned, not a slot in a page, so it
//! survives concurrent inserts and deletes: moving from a deleted position
//! continues from where the record used to be.

use crate::db::{DbShared, WriteOp};
use crate::descriptor::Descriptor;
use crate::error::{EngineError, EngineResult};
use crate::flags::WriteFlags;
use crate::table::Direction;
use crate::txn::TxnShared;
use crate::types::OrderKey;
use std::ops::Bound;
use std::sync::Arc;

/// A cursor movement.
#[derive(Debug)]
pub enum CursorOp<'k> {
    /// The first record.
    First,
    /// The last record.
    Last,
    /// The record after the current one; the first when unpositioned.
    Next,
    /// The record before the current one; the last when unpositioned.
    Prev,
    /// The record at the current position.
    Current,
    /// The record with exactly this key.
    Set(Descriptor<'k>),
    /// The first record whose key is at or after this key.
    SetRange(Descriptor<'k>),
}

/// A position over one table.
#[derive(Debug)]
pub struct EngineCursor {
    db: Arc<DbShared>,
    txn: Option<Arc<TxnShared>>,
    dirty: bool,
    position: Option<OrderKey>,
}

impl EngineCursor {
    pub(crate) fn new(db: Arc<DbShared>, txn: Option<Arc<TxnShared>>, dirty: bool) -> Self {
        db.env.stats.record_cursor_open();
        Self {
            db,
            txn,
            dirty,
            position: None,
        }
    }

    /// Returns true once a movement has found a record.
    #[must_use]
    pub fn is_positioned(&self) -> bool {
        self.position.is_some()
    }

    /// Moves per `op` and returns the record there.
    ///
    /// # Errors
    ///
    /// - `NotFound` past either end or on a missing key; the position is
    ///   left unchanged
    /// - `InvalidState` for `Current` on an unpositioned cursor
    /// - `KeyEmpty` for `Current` when the record was deleted
    pub fn get(
        &mut self,
        op: CursorOp<'_>,
    ) -> EngineResult<(Descriptor<'static>, Descriptor<'static>)> {
        self.db.ensure_open()?;

        let found = match op {
            CursorOp::First => self.step(Bound::Unbounded, Direction::Forward)?,
            CursorOp::Last => self.step(Bound::Unbounded, Direction::Backward)?,
            CursorOp::Next => {
                let from = self.position.clone().map_or(Bound::Unbounded, Bound::Excluded);
                self.step(from, Direction::Forward)?
            }
            CursorOp::Prev => {
                let from = self.position.clone().map_or(Bound::Unbounded, Bound::Excluded);
                self.step(from, Direction::Backward)?
            }
            CursorOp::Current => {
                let position = self
                    .position
                    .clone()
                    .ok_or_else(|| EngineError::invalid_state("cursor is not positioned"))?;
                let value = self
                    .db
                    .with_view(self.txn.as_deref(), self.dirty, |view| {
                        view.get(&position).map(<[u8]>::to_vec)
                    })?
                    .ok_or(EngineError::KeyEmpty)?;
                Some((position, value))
            }
            CursorOp::Set(key) => {
                let key = self.db.order_key(key.as_slice())?;
                self.db
                    .with_view(self.txn.as_deref(), self.dirty, |view| {
                        view.get(&key).map(<[u8]>::to_vec)
                    })?
                    .map(|value| (key, value))
            }
            CursorOp::SetRange(key) => {
                let key = self.db.order_key(key.as_slice())?;
                self.step(Bound::Included(key), Direction::Forward)?
            }
        };

        let (key, value) = found.ok_or(EngineError::NotFound)?;
        self.db.env.stats.record_read(value.len() as u64);
        let out = (
            Descriptor::engine_copy(key.key()),
            Descriptor::engine_copy(&value),
        );
        self.position = Some(key);
        Ok(out)
    }

    fn step(
        &self,
        from: Bound<OrderKey>,
        direction: Direction,
    ) -> EngineResult<Option<(OrderKey, Vec<u8>)>> {
        self.db
            .with_view(self.txn.as_deref(), self.dirty, |view| {
                view.step(from.as_ref(), direction)
            })
    }

    /// Deletes the record at the current position without moving.
    ///
    /// # Errors
    ///
    /// `InvalidState` on an unpositioned cursor; `KeyEmpty` if the record
    /// is already gone.
    pub fn del(&mut self, flags: WriteFlags) -> EngineResult<()> {
        if flags.contains(WriteFlags::NO_OVERWRITE) {
            return Err(EngineError::invalid_argument(
                "NO_OVERWRITE is not a delete flag",
            ));
        }
        let position = self
            .position
            .clone()
            .ok_or_else(|| EngineError::invalid_state("cursor is not positioned"))?;
        self.db
            .write(
                self.txn.as_deref(),
                position,
                WriteOp::Delete { must_exist: true },
            )
            .map_err(|err| match err {
                EngineError::NotFound => EngineError::KeyEmpty,
                other => other,
            })
    }

    /// Closes the cursor.
    pub fn close(self) {}
}

impl Drop for EngineCursor {
    fn drop(&mut self) {
        self.db.env.stats.record_cursor_close();
    }
}
