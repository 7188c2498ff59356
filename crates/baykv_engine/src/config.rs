//! Environment configuration.

use std::time::Duration;

/// Configuration for opening an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// Longest time a lock request waits before failing with
    /// `LockNotGranted`. `None` waits until the lock is granted or a
    /// deadlock is detected.
    pub lock_timeout: Option<Duration>,

    /// Whether to sync the log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Permission bits for created files when the caller passes mode 0.
    pub default_mode: u32,

    /// Capacity of the environment's in-memory file. Writes that would
    /// grow it further fail with `NoSpace`. `None` is unbounded.
    pub memory_limit: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            lock_timeout: None,
            sync_on_commit: true,
            default_mode: 0o644,
            memory_limit: None,
        }
    }
}

impl EnvConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock wait bound.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the default file mode.
    #[must_use]
    pub const fn default_mode(mut self, mode: u32) -> Self {
        self.default_mode = mode;
        self
    }

    /// Sets the in-memory file capacity.
    #[must_use]
    pub const fn memory_limit(mut self, limit: Option<u64>) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Resolves a caller-supplied mode, where 0 means the default.
    #[must_use]
    pub const fn resolve_mode(&self, mode: u32) -> u32 {
        if mode == 0 {
            self.default_mode
        } else {
            mode
        }
    }
}
