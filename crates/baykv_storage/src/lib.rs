//! # baykv storage
//!
//! Byte-store backends underneath the baykv storage engine.
//!
//! Backends are **opaque byte stores**: they read, append, flush and
//! truncate. They know nothing about log records, tables or transactions;
//! the engine owns all file format interpretation.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For in-memory databases and tests
//! - [`FileBackend`] - For persistent database files
//!
//! ## Example
//!
//! ```rust
//! use baykv_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileOptions};
pub use memory::InMemoryBackend;
