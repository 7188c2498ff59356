//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store underneath one database file.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` pushes appended data to the OS, `sync` makes it durable
/// - Backends must be `Send + Sync` so engine state can be shared across threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size
    /// or an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it landed at. A failed append
    /// leaves the size unchanged.
    ///
    /// # Errors
    ///
    /// `ReadOnly`, `NoSpace` for a bounded store, or an I/O error.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes pending writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes every appended byte durable. A no-op for read-only and
    /// in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the sync.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// The engine uses this to cut a torn record off the end of a log.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size,
    /// the backend is read-only, or the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Returns true if mutations are rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Returns the size the store may not grow past, if it is bounded.
    fn capacity(&self) -> Option<u64> {
        None
    }
}
