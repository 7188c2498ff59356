//! Database files on disk.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Options controlling how a [`FileBackend`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Open without write access; mutations fail with [`StorageError::ReadOnly`].
    pub read_only: bool,
    /// Unix permission bits for a newly created file.
    pub mode: u32,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            create: true,
            read_only: false,
            mode: 0o644,
        }
    }
}

impl FileOptions {
    /// Options for opening an existing file read-only.
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            create: false,
            read_only: true,
            mode: 0o644,
        }
    }

    /// Sets whether a missing file is created.
    #[must_use]
    pub const fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    /// Sets the permission bits used when the file is created.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// A database file on disk.
///
/// `flush` hands appended bytes to the OS and `sync` forces them to stable
/// storage. The logical size is tracked alongside the handle so reads never
/// see bytes past the last completed append. On unix, reads are positional
/// and run concurrently under the shared lock; elsewhere they seek under
/// the exclusive one.
///
/// # Example
///
/// ```no_run
/// use baykv_storage::{FileBackend, FileOptions, StorageBackend};
/// use std::path::Path;
///
/// let options = FileOptions::default().mode(0o600);
/// let mut backend = FileBackend::open_with(Path::new("t.db"), options).unwrap();
/// backend.append(b"hoge").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    file: RwLock<File>,
    size: RwLock<u64>,
    read_only: bool,
}

impl FileBackend {
    /// Opens `path` read-write, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, FileOptions::default())
    }

    /// Opens `path` as `options` describe.
    ///
    /// A missing file with `create == false` surfaces as an
    /// [`std::io::ErrorKind::NotFound`] I/O error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or created.
    pub fn open_with(path: &Path, options: FileOptions) -> StorageResult<Self> {
        let mut open = OpenOptions::new();
        open.read(true);
        if !options.read_only {
            open.write(true).create(options.create).truncate(false);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open.mode(options.mode);
        }

        let file = open.open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: RwLock::new(file),
            size: RwLock::new(size),
            read_only: options.read_only,
        })
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }

    #[cfg(unix)]
    fn read_into(&self, offset: u64, buffer: &mut [u8]) -> StorageResult<()> {
        use std::os::unix::fs::FileExt;
        self.file.read().read_exact_at(buffer, offset)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn read_into(&self, offset: u64, buffer: &mut [u8]) -> StorageResult<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        if !matches!(offset.checked_add(len as u64), Some(end) if end <= size) {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let mut buffer = vec![0u8; len];
        if len > 0 {
            self.read_into(offset, &mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.ensure_writable()?;
        let mut file = self.file.write();
        let mut size = self.size.write();
        let offset = *size;
        if data.is_empty() {
            return Ok(offset);
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if !self.read_only {
            self.file.write().flush()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if !self.read_only {
            self.file.write().sync_data()?;
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        let file = self.file.write();
        let mut size = self.size.write();
        if new_size > *size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: *size,
            });
        }

        // the shortened length must be durable before new records land
        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
