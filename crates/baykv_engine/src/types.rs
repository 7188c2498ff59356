//! Core type definitions for the engine.

use crate::wal::compute_crc32;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a transaction or lock owner.
///
/// Identifiers are allocated from one counter per environment and never
/// reused within it. `TxnId::NONE` tags records written outside any
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Identifier carried by unscoped, immediately applied records.
    pub const NONE: Self = Self(0);

    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for [`TxnId::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Access method of a table, fixed when the table is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatabaseType {
    /// Keys kept in lexicographic byte order.
    OrderedTree = 1,
    /// Keys kept in a stable hash order.
    Hash = 2,
    /// Keys are record numbers; traversal is in record-number order.
    Sequential = 3,
    /// Record-number table that may only live in a file's default table.
    Queue = 4,
    /// Accept whatever type an existing table has.
    Unknown = 5,
}

impl DatabaseType {
    /// Converts a stored byte to a type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::OrderedTree),
            2 => Some(Self::Hash),
            3 => Some(Self::Sequential),
            4 => Some(Self::Queue),
            5 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Converts the type to its stored byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true if keys are [`RecordNumber`]s.
    #[must_use]
    pub const fn is_record_number(self) -> bool {
        matches!(self, Self::Sequential | Self::Queue)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OrderedTree => "ordered-tree",
            Self::Hash => "hash",
            Self::Sequential => "sequential",
            Self::Queue => "queue",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A logical record number in a `Sequential` or `Queue` table.
///
/// Record numbers start at 1. On the wire they are 4-byte big-endian keys,
/// which makes byte order and numeric order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordNumber(u32);

impl RecordNumber {
    /// Encoded key length.
    pub const KEY_LEN: usize = 4;

    /// Creates a record number, rejecting zero.
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        if n == 0 {
            None
        } else {
            Some(Self(n))
        }
    }

    /// Returns the raw number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Encodes the number as a table key.
    #[must_use]
    pub const fn to_key(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Decodes a table key; `None` if it is not a valid record number.
    #[must_use]
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = key.try_into().ok()?;
        Self::new(u32::from_be_bytes(bytes))
    }
}

impl fmt::Display for RecordNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a key inside a table's ordering.
///
/// Hash tables order by `(crc32(key), key)`; every other type uses a zero
/// bucket, so the order is plain byte order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct OrderKey {
    bucket: u32,
    key: Vec<u8>,
}

impl OrderKey {
    pub(crate) fn new(kind: DatabaseType, key: &[u8]) -> Self {
        let bucket = match kind {
            DatabaseType::Hash => compute_crc32(key),
            _ => 0,
        };
        Self {
            bucket,
            key: key.to_vec(),
        }
    }

    pub(crate) fn key(&self) -> &[u8] {
        &self.key
    }
}

/// Identity of one table inside one open file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TableRef {
    pub(crate) file: u64,
    pub(crate) name: Arc<str>,
}

impl TableRef {
    pub(crate) fn new(file: u64, name: &str) -> Self {
        Self {
            file,
            name: Arc::from(name),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "file:{}/<default>", self.file)
        } else {
            write!(f, "file:{}/{}", self.file, self.name)
        }
    }
}
