//! Log record types and serialization.

use crate::error::{EngineError, EngineResult};
use crate::types::{DatabaseType, TxnId};

/// Magic bytes identifying a log record.
pub const RECORD_MAGIC: [u8; 4] = *b"BYRC";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

/// Type of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Create a table.
    Create = 1,
    /// Put (insert or update) a key.
    Put = 2,
    /// Delete a key.
    Delete = 3,
    /// Commit a transaction.
    Commit = 4,
    /// Abort a transaction.
    Abort = 5,
    /// Remove every key of a table.
    Truncate = 6,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Create),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            5 => Some(Self::Abort),
            6 => Some(Self::Truncate),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A log record describing one change to a database file.
///
/// Records tagged with [`TxnId::NONE`] take effect as soon as they are
/// read. All others take effect only once a `Commit` with the same id
/// follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Create a table.
    Create {
        /// Transaction ID.
        txid: TxnId,
        /// Table name; empty for the default table.
        table: String,
        /// Access method.
        kind: DatabaseType,
    },

    /// Put (insert or update) a key.
    Put {
        /// Transaction ID.
        txid: TxnId,
        /// Table name.
        table: String,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },

    /// Delete a key.
    Delete {
        /// Transaction ID.
        txid: TxnId,
        /// Table name.
        table: String,
        /// Key bytes.
        key: Vec<u8>,
    },

    /// Remove every key of a table.
    Truncate {
        /// Transaction ID.
        txid: TxnId,
        /// Table name.
        table: String,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TxnId,
    },

    /// Abort a transaction.
    Abort {
        /// Transaction ID.
        txid: TxnId,
    },
}

impl LogRecord {
    /// Maximum key or value size; lengths are stored as `u32`.
    pub const MAX_ITEM_SIZE: usize = u32::MAX as usize;

    /// Maximum table name size; lengths are stored as `u16`.
    pub const MAX_TABLE_NAME: usize = u16::MAX as usize;

    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Create { .. } => LogRecordType::Create,
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Truncate { .. } => LogRecordType::Truncate,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Abort { .. } => LogRecordType::Abort,
        }
    }

    /// Returns the transaction ID of this record.
    #[must_use]
    pub fn txid(&self) -> TxnId {
        match self {
            Self::Create { txid, .. }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Truncate { txid, .. }
            | Self::Commit { txid }
            | Self::Abort { txid } => *txid,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if a key, value or table name is too long for its
    /// length field.
    pub fn encode_payload(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.txid().as_u64().to_le_bytes());

        match self {
            Self::Commit { .. } | Self::Abort { .. } => {}
            Self::Create { table, kind, .. } => {
                put_table(&mut buf, table)?;
                buf.push(kind.as_byte());
            }
            Self::Put {
                table, key, value, ..
            } => {
                put_table(&mut buf, table)?;
                put_item(&mut buf, key)?;
                put_item(&mut buf, value)?;
            }
            Self::Delete { table, key, .. } => {
                put_table(&mut buf, table)?;
                put_item(&mut buf, key)?;
            }
            Self::Truncate { table, .. } => {
                put_table(&mut buf, table)?;
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// `RunRecovery` if the payload is malformed.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> EngineResult<Self> {
        let mut reader = PayloadReader::new(payload);
        let txid = TxnId::new(reader.u64()?);

        let record = match record_type {
            LogRecordType::Commit => Self::Commit { txid },
            LogRecordType::Abort => Self::Abort { txid },
            LogRecordType::Create => {
                let table = reader.table()?;
                let byte = reader.u8()?;
                let kind = DatabaseType::from_byte(byte)
                    .filter(|k| *k != DatabaseType::Unknown)
                    .ok_or_else(|| {
                        EngineError::run_recovery(format!("invalid table type {byte}"))
                    })?;
                Self::Create { txid, table, kind }
            }
            LogRecordType::Put => Self::Put {
                txid,
                table: reader.table()?,
                key: reader.item()?,
                value: reader.item()?,
            },
            LogRecordType::Delete => Self::Delete {
                txid,
                table: reader.table()?,
                key: reader.item()?,
            },
            LogRecordType::Truncate => Self::Truncate {
                txid,
                table: reader.table()?,
            },
        };

        reader.finish(record_type)?;
        Ok(record)
    }
}

fn put_table(buf: &mut Vec<u8>, table: &str) -> EngineResult<()> {
    let len = u16::try_from(table.len()).map_err(|_| {
        EngineError::invalid_argument(format!(
            "table name too long: {} bytes exceeds maximum of {} bytes",
            table.len(),
            LogRecord::MAX_TABLE_NAME
        ))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(table.as_bytes());
    Ok(())
}

fn put_item(buf: &mut Vec<u8>, item: &[u8]) -> EngineResult<()> {
    let len = u32::try_from(item.len()).map_err(|_| {
        EngineError::invalid_argument(format!(
            "item too large: {} bytes exceeds maximum of {} bytes",
            item.len(),
            LogRecord::MAX_ITEM_SIZE
        ))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(item);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, cursor: 0 }
    }

    fn take(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(n)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| EngineError::run_recovery("unexpected end of log payload"))?;
        let bytes = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let bytes: [u8; 2] = self
            .take(2)?
            .try_into()
            .map_err(|_| EngineError::run_recovery("invalid u16"))?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| EngineError::run_recovery("invalid u32"))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> EngineResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| EngineError::run_recovery("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn table(&mut self) -> EngineResult<String> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| EngineError::run_recovery("table name is not UTF-8"))
    }

    fn item(&mut self) -> EngineResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self, record_type: LogRecordType) -> EngineResult<()> {
        if self.cursor != self.payload.len() {
            return Err(EngineError::run_recovery(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                self.cursor,
                self.payload.len()
            )));
        }
        Ok(())
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(record: &LogRecord) -> LogRecord {
        let payload = record.encode_payload().unwrap();
        LogRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn record_type_bytes() {
        for t in [
            LogRecordType::Create,
            LogRecordType::Put,
            LogRecordType::Delete,
            LogRecordType::Commit,
            LogRecordType::Abort,
            LogRecordType::Truncate,
        ] {
            assert_eq!(LogRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(LogRecordType::from_byte(0), None);
        assert_eq!(LogRecordType::from_byte(7), None);
    }

    #[test]
    fn put_record_keeps_empty_value() {
        let record = LogRecord::Put {
            txid: TxnId::new(3),
            table: "users".into(),
            key: b"hoge".to_vec(),
            value: Vec::new(),
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn create_record_for_default_table() {
        let record = LogRecord::Create {
            txid: TxnId::NONE,
            table: String::new(),
            kind: DatabaseType::Hash,
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn create_record_rejects_unknown_type() {
        let mut payload = LogRecord::Create {
            txid: TxnId::NONE,
            table: "t".into(),
            kind: DatabaseType::OrderedTree,
        }
        .encode_payload()
        .unwrap();
        let last = payload.len() - 1;
        payload[last] = DatabaseType::Unknown.as_byte();
        assert!(matches!(
            LogRecord::decode_payload(LogRecordType::Create, &payload),
            Err(EngineError::RunRecovery(_))
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut payload = LogRecord::Commit {
            txid: TxnId::new(9),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(LogRecord::decode_payload(LogRecordType::Commit, &payload).is_err());
    }

    #[test]
    fn short_payload_rejected() {
        let payload = LogRecord::Delete {
            txid: TxnId::new(1),
            table: "t".into(),
            key: b"key".to_vec(),
        }
        .encode_payload()
        .unwrap();
        assert!(
            LogRecord::decode_payload(LogRecordType::Delete, &payload[..payload.len() - 1])
                .is_err()
        );
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
