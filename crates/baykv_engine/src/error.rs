//! Engine return codes.
//!
//! Every failure an engine call can report is one variant here. The client
//! maps each variant onto exactly one member of its own taxonomy.

use baykv_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by the storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed call parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The resource is closed, resolved, or otherwise unusable.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Key, table, file or environment home does not exist.
    #[error("not found")]
    NotFound,

    /// A no-overwrite put or an exclusive create collided with existing data.
    #[error("key exists")]
    KeyExists,

    /// The cursor refers to a record that has been deleted.
    #[error("cursor position refers to a deleted record")]
    KeyEmpty,

    /// The operation is not permitted on this handle or path.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The device is out of space.
    #[error("no space left on device")]
    NoSpace,

    /// A lock request would close a cycle of waiting transactions, or a
    /// snapshot transaction lost an update conflict.
    #[error("deadlock: {0}")]
    Deadlock(String),

    /// A lock could not be granted without waiting longer than allowed.
    #[error("lock not granted")]
    LockNotGranted,

    /// On-disk format is newer than, or unrelated to, what this build reads.
    #[error("version mismatch: found {found}, supported {supported}")]
    VersionMismatch {
        /// Version stored on disk.
        found: u16,
        /// Version this build writes.
        supported: u16,
    },

    /// On-disk format predates what this build reads.
    #[error("database requires an upgrade: found {found}, supported {supported}")]
    OldVersion {
        /// Version stored on disk.
        found: u16,
        /// Version this build writes.
        supported: u16,
    },

    /// Prior unclean shutdown or log damage; recovery must run first.
    #[error("run recovery required: {0}")]
    RunRecovery(String),

    /// A fixed-size caller buffer cannot hold the result.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes provided.
        available: usize,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(io::Error),
}

/// Numeric return codes, compatible with the classic embedded-database values.
pub mod codes {
    /// `EIO`.
    pub const IO: i32 = 5;
    /// `EACCES`.
    pub const PERMISSION_DENIED: i32 = 13;
    /// `EINVAL`.
    pub const INVALID_ARGUMENT: i32 = 22;
    /// `ENOSPC`.
    pub const NO_SPACE: i32 = 28;
    /// Handle closed or transaction resolved.
    pub const INVALID_STATE: i32 = -30970;
    /// `DB_VERSION_MISMATCH`.
    pub const VERSION_MISMATCH: i32 = -30969;
    /// `DB_RUNRECOVERY`.
    pub const RUN_RECOVERY: i32 = -30973;
    /// `DB_NOTFOUND`.
    pub const NOT_FOUND: i32 = -30988;
    /// `DB_OLD_VERSION`.
    pub const OLD_VERSION: i32 = -30990;
    /// `DB_LOCK_NOTGRANTED`.
    pub const LOCK_NOT_GRANTED: i32 = -30992;
    /// `DB_LOCK_DEADLOCK`.
    pub const DEADLOCK: i32 = -30993;
    /// `DB_KEYEXIST`.
    pub const KEY_EXISTS: i32 = -30995;
    /// `DB_KEYEMPTY`.
    pub const KEY_EMPTY: i32 = -30996;
    /// `DB_BUFFER_SMALL`.
    pub const BUFFER_TOO_SMALL: i32 = -30999;
}

impl EngineError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates a permission denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    /// Creates a run-recovery error.
    pub fn run_recovery(message: impl Into<String>) -> Self {
        Self::RunRecovery(message.into())
    }

    /// Returns the numeric return code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            Self::InvalidState(_) => codes::INVALID_STATE,
            Self::NotFound => codes::NOT_FOUND,
            Self::KeyExists => codes::KEY_EXISTS,
            Self::KeyEmpty => codes::KEY_EMPTY,
            Self::PermissionDenied(_) => codes::PERMISSION_DENIED,
            Self::NoSpace => codes::NO_SPACE,
            Self::Deadlock(_) => codes::DEADLOCK,
            Self::LockNotGranted => codes::LOCK_NOT_GRANTED,
            Self::VersionMismatch { .. } => codes::VERSION_MISMATCH,
            Self::OldVersion { .. } => codes::OLD_VERSION,
            Self::RunRecovery(_) => codes::RUN_RECOVERY,
            Self::BufferTooSmall { .. } => codes::BUFFER_TOO_SMALL,
            Self::Io(_) => codes::IO,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            io::ErrorKind::StorageFull => Self::NoSpace,
            _ => Self::Io(err),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => e.into(),
            StorageError::ReadOnly => Self::permission_denied("file opened read-only"),
            StorageError::NoSpace { .. } => Self::NoSpace,
            StorageError::ReadPastEnd { .. } | StorageError::TruncatePastEnd { .. } => {
                Self::run_recovery(err.to_string())
            }
        }
    }
}
