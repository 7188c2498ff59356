//! In-memory table contents and merged read views.

use crate::types::{DatabaseType, OrderKey, RecordNumber, TxnId};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Committed contents of a table.
///
/// Shared copy-on-write: snapshot readers hold an `Arc` while writers clone
/// on first mutation.
pub(crate) type Entries = Arc<BTreeMap<OrderKey, Vec<u8>>>;

/// Uncommitted writes against one table. `None` marks a delete.
pub(crate) type Overlay = BTreeMap<OrderKey, Option<Vec<u8>>>;

/// A table inside a database file.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    kind: DatabaseType,
    entries: Entries,
    next_recno: u32,
    /// Root of the transaction family that created the table, until that
    /// family commits.
    creator: Option<TxnId>,
}

impl Table {
    pub(crate) fn new(kind: DatabaseType) -> Self {
        Self {
            kind,
            entries: Arc::new(BTreeMap::new()),
            next_recno: 1,
            creator: None,
        }
    }

    /// A table only `creator`'s family may see until it commits.
    pub(crate) fn provisional(kind: DatabaseType, creator: TxnId) -> Self {
        Self {
            creator: Some(creator),
            ..Self::new(kind)
        }
    }

    pub(crate) fn kind(&self) -> DatabaseType {
        self.kind
    }

    pub(crate) fn creator(&self) -> Option<TxnId> {
        self.creator
    }

    /// Whether a caller in `family` (None outside any transaction) may use
    /// the table.
    pub(crate) fn visible_to(&self, family: Option<TxnId>) -> bool {
        self.creator.is_none() || self.creator == family
    }

    pub(crate) fn settle(&mut self) {
        self.creator = None;
    }

    pub(crate) fn entries(&self) -> &Entries {
        &self.entries
    }

    pub(crate) fn get(&self, key: &OrderKey) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub(crate) fn put(&mut self, key: OrderKey, value: Vec<u8>) {
        if self.kind.is_record_number() {
            if let Some(n) = RecordNumber::from_key(key.key()) {
                self.next_recno = self.next_recno.max(n.get().saturating_add(1));
            }
        }
        Arc::make_mut(&mut self.entries).insert(key, value);
    }

    pub(crate) fn delete(&mut self, key: &OrderKey) {
        if self.entries.contains_key(key) {
            Arc::make_mut(&mut self.entries).remove(key);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries = Arc::new(BTreeMap::new());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Hands out the next record number. Numbers are never handed out
    /// twice, even if the record that took one is later aborted.
    pub(crate) fn allocate_recno(&mut self) -> Option<RecordNumber> {
        let n = RecordNumber::new(self.next_recno)?;
        self.next_recno = self.next_recno.checked_add(1)?;
        Some(n)
    }
}

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

/// Committed entries seen through a stack of uncommitted overlays.
///
/// Overlays are consulted first to last; the first one that mentions a key
/// decides it.
pub(crate) struct ReadView<'a> {
    overlays: Vec<&'a Overlay>,
    base: &'a BTreeMap<OrderKey, Vec<u8>>,
}

impl<'a> ReadView<'a> {
    pub(crate) fn new(overlays: Vec<&'a Overlay>, base: &'a BTreeMap<OrderKey, Vec<u8>>) -> Self {
        Self { overlays, base }
    }

    pub(crate) fn get(&self, key: &OrderKey) -> Option<&'a [u8]> {
        for overlay in self.overlays.iter().copied() {
            if let Some(write) = overlay.get(key) {
                return write.as_deref();
            }
        }
        self.base.get(key).map(Vec::as_slice)
    }

    /// Returns the nearest live entry strictly past `from` (or at it, for
    /// `Bound::Included`) in `direction`.
    pub(crate) fn step(
        &self,
        from: Bound<&OrderKey>,
        direction: Direction,
    ) -> Option<(OrderKey, Vec<u8>)> {
        let mut bound: Bound<OrderKey> = from.cloned();

        loop {
            let candidate = self.nearest_key(bound.as_ref(), direction)?;
            if let Some(value) = self.get(&candidate) {
                return Some((candidate, value.to_vec()));
            }
            // deleted by an overlay
            bound = Bound::Excluded(candidate);
        }
    }

    fn nearest_key(&self, from: Bound<&OrderKey>, direction: Direction) -> Option<OrderKey> {
        let range = match direction {
            Direction::Forward => (from, Bound::Unbounded),
            Direction::Backward => (Bound::Unbounded, from),
        };

        let mut best = edge(self.base.range::<OrderKey, _>(range).map(|(k, _)| k), direction);
        for overlay in self.overlays.iter().copied() {
            let found = edge(overlay.range::<OrderKey, _>(range).map(|(k, _)| k), direction);
            best = closer(best, found, direction);
        }
        best.cloned()
    }
}

fn edge<'k>(
    mut keys: impl DoubleEndedIterator<Item = &'k OrderKey>,
    direction: Direction,
) -> Option<&'k OrderKey> {
    match direction {
        Direction::Forward => keys.next(),
        Direction::Backward => keys.next_back(),
    }
}

fn closer<'k>(
    a: Option<&'k OrderKey>,
    b: Option<&'k OrderKey>,
    direction: Direction,
) -> Option<&'k OrderKey> {
    match (a, b) {
        (Some(x), Some(y)) => Some(match direction {
            Direction::Forward => x.min(y),
            Direction::Backward => x.max(y),
        }),
        (x, None) => x,
        (None, y) => y,
    }
}
