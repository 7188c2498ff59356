//! Log file access: header, appends, and recovery scans.

use crate::error::{EngineError, EngineResult};
use crate::wal::record::{compute_crc32, LogRecord, LogRecordType, RECORD_MAGIC, RECORD_VERSION};
use baykv_storage::{StorageBackend, StorageError};

/// Magic bytes at the start of every database file.
pub const FILE_MAGIC: [u8; 4] = *b"BYKV";

/// Database file format version written by this build.
pub const FILE_VERSION: u16 = 2;

/// magic (4) + version (2) + reserved (2)
pub const FILE_HEADER_SIZE: u64 = 8;

/// magic (4) + version (2) + type (1) + length (4) = 11 bytes
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Result of scanning a log from its first record.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Complete records in log order.
    pub records: Vec<LogRecord>,
    /// Offset just past the last complete record.
    pub valid_end: u64,
    /// Whether an incomplete record follows `valid_end`.
    pub torn: bool,
}

/// An append-only database log over a storage backend.
pub struct LogFile {
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("read_only", &self.backend.is_read_only())
            .finish_non_exhaustive()
    }
}

impl LogFile {
    /// Opens a log, writing the file header if the backend is empty.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the bytes are not a database file
    /// - `VersionMismatch` if the file was written by a newer format
    /// - `OldVersion` if the file predates the current format
    pub fn open(mut backend: Box<dyn StorageBackend>) -> EngineResult<Self> {
        let size = backend.size()?;

        if size == 0 {
            if backend.is_read_only() {
                return Err(EngineError::invalid_argument(
                    "empty file is not a database",
                ));
            }
            let mut header = Vec::with_capacity(FILE_HEADER_SIZE as usize);
            header.extend_from_slice(&FILE_MAGIC);
            header.extend_from_slice(&FILE_VERSION.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes());
            backend.append(&header)?;
            backend.flush()?;
            return Ok(Self { backend });
        }

        if size < FILE_HEADER_SIZE {
            return Err(EngineError::invalid_argument("file too short for a database"));
        }

        let header = backend.read_at(0, FILE_HEADER_SIZE as usize)?;
        if header[0..4] != FILE_MAGIC {
            return Err(EngineError::invalid_argument("not a database file"));
        }
        let found = u16::from_le_bytes([header[4], header[5]]);
        if found > FILE_VERSION {
            return Err(EngineError::VersionMismatch {
                found,
                supported: FILE_VERSION,
            });
        }
        if found < FILE_VERSION {
            return Err(EngineError::OldVersion {
                found,
                supported: FILE_VERSION,
            });
        }

        Ok(Self { backend })
    }

    /// Returns true if appends are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.backend.is_read_only()
    }

    /// Appends records as a single write and flushes them to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded or the write fails.
    pub fn append(&mut self, records: &[LogRecord]) -> EngineResult<()> {
        self.append_reserving(records, &[])
    }

    /// Appends `records` only if `reserved` would still fit after them in a
    /// bounded store; otherwise nothing is written.
    ///
    /// # Errors
    ///
    /// `NoSpace` when the reservation does not fit, or as [`LogFile::append`].
    pub fn append_reserving(
        &mut self,
        records: &[LogRecord],
        reserved: &[LogRecord],
    ) -> EngineResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let data = encode_all(records)?;

        if let Some(limit) = self.backend.capacity() {
            let held = encode_all(reserved)?.len() as u64;
            let needed = self
                .backend
                .size()?
                .saturating_add(data.len() as u64)
                .saturating_add(held);
            if needed > limit {
                return Err(StorageError::NoSpace { needed, limit }.into());
            }
        }

        self.backend.append(&data)?;
        self.backend.flush()?;
        Ok(())
    }

    /// Forces everything appended so far to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> EngineResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes, header included.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn size(&self) -> EngineResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Cuts the log back to `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the truncation.
    pub fn truncate(&mut self, offset: u64) -> EngineResult<()> {
        self.backend.truncate(offset.max(FILE_HEADER_SIZE))?;
        Ok(())
    }

    /// Reads every complete record.
    ///
    /// A truncated header or payload at the end is a torn write and ends the
    /// scan cleanly. A checksum mismatch, bad magic or unknown record type
    /// anywhere is corruption and fails with `RunRecovery`, as does a length
    /// running past the end when an intact record still follows it.
    ///
    /// # Errors
    ///
    /// `RunRecovery` on corruption, or an I/O error.
    pub fn scan(&self) -> EngineResult<LogScan> {
        let size = self.backend.size()?;
        let body_len = usize::try_from(size.saturating_sub(FILE_HEADER_SIZE))
            .map_err(|_| EngineError::invalid_argument("log too large for this platform"))?;
        let body = self.backend.read_at(FILE_HEADER_SIZE, body_len)?;

        let mut scan = LogScan {
            valid_end: FILE_HEADER_SIZE,
            ..LogScan::default()
        };
        let mut pos = 0usize;

        while pos < body.len() {
            let remaining = body.len() - pos;
            if remaining < HEADER_SIZE {
                scan.torn = true;
                break;
            }

            let header = &body[pos..pos + HEADER_SIZE];
            if header[0..4] != RECORD_MAGIC {
                return Err(EngineError::run_recovery(format!(
                    "invalid record magic at offset {}",
                    scan.valid_end
                )));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != RECORD_VERSION {
                return Err(EngineError::run_recovery(format!(
                    "unsupported record version {version}"
                )));
            }
            let type_byte = header[6];
            let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

            let total = HEADER_SIZE.saturating_add(len).saturating_add(CRC_SIZE);
            if remaining < total {
                if intact_record_within(&body[pos + 1..]) {
                    return Err(EngineError::run_recovery(format!(
                        "record length {len} at offset {} overruns the records after it",
                        scan.valid_end
                    )));
                }
                scan.torn = true;
                break;
            }

            let body_end = pos + HEADER_SIZE + len;
            let stored = u32::from_le_bytes([
                body[body_end],
                body[body_end + 1],
                body[body_end + 2],
                body[body_end + 3],
            ]);
            let computed = compute_crc32(&body[pos..body_end]);
            if stored != computed {
                return Err(EngineError::run_recovery(format!(
                    "checksum mismatch at offset {}: expected {stored:#010x}, got {computed:#010x}",
                    scan.valid_end
                )));
            }

            let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
                EngineError::run_recovery(format!("unknown record type {type_byte}"))
            })?;
            let record =
                LogRecord::decode_payload(record_type, &body[pos + HEADER_SIZE..body_end])?;

            scan.records.push(record);
            pos += total;
            scan.valid_end += total as u64;
        }

        Ok(scan)
    }
}

/// Whether a whole record with a matching checksum starts anywhere in
/// `bytes`.
fn intact_record_within(bytes: &[u8]) -> bool {
    (0..bytes.len()).any(|at| {
        let rest = &bytes[at..];
        if rest.len() < HEADER_SIZE + CRC_SIZE
            || rest[0..4] != RECORD_MAGIC
            || u16::from_le_bytes([rest[4], rest[5]]) != RECORD_VERSION
        {
            return false;
        }
        let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let body_end = HEADER_SIZE.saturating_add(len);
        match rest.get(body_end..body_end.saturating_add(CRC_SIZE)) {
            Some(crc) => {
                let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
                stored == compute_crc32(&rest[..body_end])
            }
            None => false,
        }
    })
}

fn encode_all(records: &[LogRecord]) -> EngineResult<Vec<u8>> {
    let mut data = Vec::new();
    for record in records {
        encode_envelope(record, &mut data)?;
    }
    Ok(data)
}

fn encode_envelope(record: &LogRecord, data: &mut Vec<u8>) -> EngineResult<()> {
    let payload = record.encode_payload()?;
    let start = data.len();

    data.extend_from_slice(&RECORD_MAGIC);
    data.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    data.push(record.record_type().as_byte());
    let len = u32::try_from(payload.len())
        .map_err(|_| EngineError::invalid_argument("log record payload too large"))?;
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);

    // CRC32 over everything before it
    let crc = compute_crc32(&data[start..]);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}
