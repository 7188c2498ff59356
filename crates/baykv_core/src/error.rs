//! Error types for the baykv client.
//!
//! Every engine failure maps onto exactly one [`Error`] variant. The client
//! never retries on its own; [`Error::is_retryable`] tells callers which
//! failures are worth retrying after aborting their transaction.

use baykv_engine::{codes, EngineError};
use std::io;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the baykv client.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed arguments, unknown flag bits or an illegal flag combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The handle is closed or the transaction already resolved.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The key, table, file or home directory does not exist.
    #[error("not found")]
    NotFound,

    /// The key (or exclusively created table) already exists.
    #[error("key exists")]
    KeyExists,

    /// The cursor's record was deleted underneath it.
    #[error("cursor position refers to a deleted record")]
    KeyEmpty,

    /// The operation is not permitted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The device is out of space.
    #[error("no space left on device")]
    NoSpace,

    /// The transaction was chosen to resolve a deadlock and must abort.
    #[error("deadlock: {0}")]
    Deadlock(String),

    /// A lock could not be granted in time.
    #[error("lock not granted")]
    LockNotGranted,

    /// The on-disk format is newer than this build understands.
    #[error("version mismatch: found {found}, supported {supported}")]
    VersionMismatch {
        /// Version found on disk.
        found: u16,
        /// Version this build supports.
        supported: u16,
    },

    /// The on-disk format is older than this build understands.
    #[error("old version: found {found}, supported {supported}")]
    OldVersion {
        /// Version found on disk.
        found: u16,
        /// Version this build supports.
        supported: u16,
    },

    /// The environment shut down uncleanly or a log is damaged.
    #[error("run recovery required: {0}")]
    RunRecoveryRequired(String),

    /// A caller buffer cannot hold the value.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes provided.
        available: usize,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns the numeric code of this error.
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
            Self::RunRecoveryRequired(_) => codes::RUN_RECOVERY,
            Self::BufferTooSmall { .. } => codes::BUFFER_TOO_SMALL,
            Self::Io(_) => codes::IO,
        }
    }

    /// Returns true for failures that may succeed if the caller aborts and
    /// retries the transaction.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Deadlock(_) | Self::LockNotGranted)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidArgument(m) => Self::InvalidArgument(m),
            EngineError::InvalidState(m) => Self::InvalidState(m),
            EngineError::NotFound => Self::NotFound,
            EngineError::KeyExists => Self::KeyExists,
            EngineError::KeyEmpty => Self::KeyEmpty,
            EngineError::PermissionDenied(m) => Self::PermissionDenied(m),
            EngineError::NoSpace => Self::NoSpace,
            EngineError::Deadlock(m) => Self::Deadlock(m),
            EngineError::LockNotGranted => Self::LockNotGranted,
            EngineError::VersionMismatch { found, supported } => {
                Self::VersionMismatch { found, supported }
            }
            EngineError::OldVersion { found, supported } => Self::OldVersion { found, supported },
            EngineError::RunRecovery(m) => Self::RunRecoveryRequired(m),
            EngineError::BufferTooSmall { needed, available } => {
                Self::BufferTooSmall { needed, available }
            }
            EngineError::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_code() {
        let cases = [
            EngineError::invalid_argument("x"),
            EngineError::invalid_state("x"),
            EngineError::NotFound,
            EngineError::KeyExists,
            EngineError::KeyEmpty,
            EngineError::permission_denied("x"),
            EngineError::NoSpace,
            EngineError::Deadlock("x".into()),
            EngineError::LockNotGranted,
            EngineError::VersionMismatch {
                found: 3,
                supported: 2,
            },
            EngineError::OldVersion {
                found: 1,
                supported: 2,
            },
            EngineError::run_recovery("x"),
            EngineError::BufferTooSmall {
                needed: 2,
                available: 1,
            },
            EngineError::Io(io::Error::from(io::ErrorKind::BrokenPipe)),
        ];
        for engine in cases {
            let code = engine.code();
            assert_eq!(Error::from(engine).code(), code);
        }
    }

    #[test]
    fn retryable() {
        assert!(Error::LockNotGranted.is_retryable());
        assert!(Error::Deadlock("cycle".into()).is_retryable());
        assert!(!Error::NotFound.is_retryable());
    }

    #[test]
    fn recovery_message_is_kept() {
        let err = Error::from(EngineError::run_recovery("environment was not shut down cleanly"));
        assert_eq!(
            err.to_string(),
            "run recovery required: environment was not shut down cleanly"
        );
    }
}
