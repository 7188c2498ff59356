//! Typed flag sets accepted by engine operations.
//!
//! Flags sharing a name share a bit across every set, so a raw integer built
//! for one call site means the same thing at another.

use bitflags::bitflags;

const BIT_CREATE: u32 = 1 << 0;
const BIT_EXCLUSIVE: u32 = 1 << 1;
const BIT_READONLY: u32 = 1 << 2;
const BIT_TRUNCATE: u32 = 1 << 3;
const BIT_THREAD: u32 = 1 << 4;
const BIT_NOMMAP: u32 = 1 << 5;
const BIT_MULTIVERSION: u32 = 1 << 6;
const BIT_READ_UNCOMMITTED: u32 = 1 << 7;
const BIT_AUTO_COMMIT: u32 = 1 << 8;
const BIT_RECOVER: u32 = 1 << 9;
const BIT_NO_OVERWRITE: u32 = 1 << 10;
const BIT_SNAPSHOT: u32 = 1 << 11;
const BIT_NOWAIT: u32 = 1 << 12;
const BIT_SYNC: u32 = 1 << 13;
const BIT_NOSYNC: u32 = 1 << 14;

bitflags! {
    /// Flags for opening an environment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnvFlags: u32 {
        /// Create the home directory and region if missing.
        const CREATE = BIT_CREATE;
        /// Allow the handle to be used from multiple threads.
        const THREAD = BIT_THREAD;
        /// Never map files into memory.
        const NOMMAP = BIT_NOMMAP;
        /// Permit dirty reads in this environment.
        const READ_UNCOMMITTED = BIT_READ_UNCOMMITTED;
        /// Wrap unscoped writes in an implicit, durable transaction.
        const AUTO_COMMIT = BIT_AUTO_COMMIT;
        /// Run recovery after an unclean shutdown.
        const RECOVER = BIT_RECOVER;
    }
}

bitflags! {
    /// Flags for opening a database.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DbFlags: u32 {
        /// Create the file and table if missing.
        const CREATE = BIT_CREATE;
        /// Fail with `KeyExists` if the table already exists.
        const EXCLUSIVE = BIT_EXCLUSIVE;
        /// Open without write access.
        const READONLY = BIT_READONLY;
        /// Empty the table on open.
        const TRUNCATE = BIT_TRUNCATE;
        /// Allow the handle to be used from multiple threads.
        const THREAD = BIT_THREAD;
        /// Never map the file into memory.
        const NOMMAP = BIT_NOMMAP;
        /// Keep committed versions so snapshot transactions can read them.
        const MULTIVERSION = BIT_MULTIVERSION;
        /// Permit dirty reads through this handle.
        const READ_UNCOMMITTED = BIT_READ_UNCOMMITTED;
        /// Wrap unscoped writes in an implicit, durable transaction.
        const AUTO_COMMIT = BIT_AUTO_COMMIT;
    }
}

bitflags! {
    /// Flags for `put` and `del`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteFlags: u32 {
        /// Fail with `KeyExists` instead of replacing an existing value.
        const NO_OVERWRITE = BIT_NO_OVERWRITE;
    }
}

bitflags! {
    /// Flags for `get` and cursor creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadFlags: u32 {
        /// Observe writes of transactions that have not committed yet.
        const READ_UNCOMMITTED = BIT_READ_UNCOMMITTED;
    }
}

bitflags! {
    /// Flags for beginning and committing transactions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TxnFlags: u32 {
        /// Every read in the transaction may observe uncommitted data.
        const READ_UNCOMMITTED = BIT_READ_UNCOMMITTED;
        /// Read a stable snapshot of `MULTIVERSION` tables.
        const SNAPSHOT = BIT_SNAPSHOT;
        /// Fail lock conflicts immediately instead of waiting.
        const NOWAIT = BIT_NOWAIT;
        /// Force the log to disk at commit.
        const SYNC = BIT_SYNC;
        /// Skip forcing the log to disk at commit.
        const NOSYNC = BIT_NOSYNC;
    }
}

bitflags! {
    /// Flags for closing handles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CloseFlags: u32 {
        /// Skip flushing file contents to disk.
        const NOSYNC = BIT_NOSYNC;
    }
}
