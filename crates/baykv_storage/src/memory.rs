//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A byte store held in process memory.
///
/// Backs database files opened without a path. An optional capacity bound
/// stands in for a full disk: an append that would grow the store past it
/// fails with [`StorageError::NoSpace`] and leaves the contents unchanged.
///
/// # Example
///
/// ```rust
/// use baykv_storage::{InMemoryBackend, StorageBackend, StorageError};
///
/// let mut backend = InMemoryBackend::with_limit(8);
/// assert_eq!(backend.append(b"12345").unwrap(), 0);
/// assert!(matches!(backend.append(b"6789"), Err(StorageError::NoSpace { .. })));
/// assert_eq!(backend.size().unwrap(), 5);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
    limit: Option<u64>,
}

impl InMemoryBackend {
    /// An empty, unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: u64) -> Self {
        Self {
            bytes: RwLock::new(Vec::new()),
            limit: Some(limit),
        }
    }

    /// A store preloaded with `bytes`, e.g. a hand-built or damaged log.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
            limit: None,
        }
    }

    /// Returns the capacity bound, if any.
    #[must_use]
    pub const fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Copies the current contents out.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .filter(|range| range.end <= bytes.len());

        match range {
            Some(range) => Ok(bytes[range].to_vec()),
            None => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        if let Some(limit) = self.limit {
            let needed = offset.saturating_add(data.len() as u64);
            if needed > limit {
                return Err(StorageError::NoSpace { needed, limit });
            }
        }
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn capacity(&self) -> Option<u64> {
        self.limit
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        match usize::try_from(new_size) {
            Ok(keep) if new_size <= size => {
                bytes.truncate(keep);
                Ok(())
            }
            _ => Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            }),
        }
    }
}
