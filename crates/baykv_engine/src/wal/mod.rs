//! Per-file append-only log.
//!
//! Every database file is a header followed by a sequence of framed
//! records. The file is the log; table contents are rebuilt by replaying it
//! whenever the file is opened.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - **Tolerated**: a truncated header or payload at the end of the file is a
//!   write that never completed. It is ignored, and cut away when the file
//!   is opened for writing.
//! - **Fatal**: checksum mismatch, bad magic or an unknown record type mean
//!   the file is damaged, and opening fails with `RunRecovery`.
//!
//! ## Invariants
//!
//! - Records are never modified after they are written
//! - Replay applies only committed transactions and unscoped records
//! - Replay is idempotent

mod record;
mod writer;

pub use record::{compute_crc32, LogRecord, LogRecordType, RECORD_MAGIC, RECORD_VERSION};
pub use writer::{LogFile, LogScan, FILE_HEADER_SIZE, FILE_MAGIC, FILE_VERSION};
