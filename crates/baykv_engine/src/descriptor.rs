//! Key/value descriptors exchanged with engine operations.
//!
//! Inputs arrive as [`Ownership::UserMem`] descriptors borrowing caller
//! bytes; the engine reads them during the call and never keeps them.
//! Outputs leave as [`Ownership::EngineAlloc`] descriptors holding a buffer
//! the engine allocated, which may be larger than the valid length. The
//! receiver copies the valid prefix out and drops the descriptor, which
//! releases the buffer.

use crate::error::{EngineError, EngineResult};

/// Who owns the bytes behind a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Borrowed caller memory; the engine must not free or resize it.
    UserMem,
    /// Engine-allocated memory the receiver releases after copying out.
    EngineAlloc,
}

#[derive(Debug)]
enum Repr<'a> {
    Null,
    User(&'a [u8]),
    Engine(Vec<u8>),
}

/// A transient {data, length, ownership} view.
#[derive(Debug)]
pub struct Descriptor<'a> {
    repr: Repr<'a>,
    len: usize,
}

impl<'a> Descriptor<'a> {
    /// Wraps caller bytes without copying.
    #[must_use]
    pub fn user(data: &'a [u8]) -> Self {
        Self {
            repr: Repr::User(data),
            len: data.len(),
        }
    }

    /// A zero-length descriptor with no backing memory.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            repr: Repr::Null,
            len: 0,
        }
    }

    /// Builds a descriptor from an optional pointer-like slice and a claimed
    /// length.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `data` is `None` with a nonzero length, or if
    /// the length exceeds the slice.
    pub fn from_parts(data: Option<&'a [u8]>, len: usize) -> EngineResult<Self> {
        match data {
            None if len == 0 => Ok(Self::empty()),
            None => Err(EngineError::invalid_argument(format!(
                "null data with nonzero length {len}"
            ))),
            Some(bytes) if len > bytes.len() => Err(EngineError::invalid_argument(format!(
                "length {len} exceeds buffer of {} bytes",
                bytes.len()
            ))),
            Some(bytes) => Ok(Self {
                repr: Repr::User(bytes),
                len,
            }),
        }
    }

    /// Returns the valid length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the valid length is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns who owns the backing memory.
    #[must_use]
    pub const fn ownership(&self) -> Ownership {
        match self.repr {
            Repr::Null | Repr::User(_) => Ownership::UserMem,
            Repr::Engine(_) => Ownership::EngineAlloc,
        }
    }

    /// Returns the valid bytes.
    ///
    /// A zero-length descriptor yields an empty slice without touching its
    /// backing memory.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        match &self.repr {
            Repr::Null => &[],
            Repr::User(bytes) => &bytes[..self.len],
            Repr::Engine(buf) => &buf[..self.len],
        }
    }
}

impl Descriptor<'static> {
    /// Hands an engine buffer to the caller, valid up to `len`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `len` exceeds the buffer.
    pub fn engine_alloc(buf: Vec<u8>, len: usize) -> EngineResult<Self> {
        if len > buf.len() {
            return Err(EngineError::invalid_argument(format!(
                "length {len} exceeds engine buffer of {} bytes",
                buf.len()
            )));
        }
        Ok(Self {
            repr: Repr::Engine(buf),
            len,
        })
    }

    /// Copies a stored value into a fresh engine buffer.
    ///
    /// The buffer is rounded up to a power of two, so it is usually larger
    /// than the value it carries.
    pub(crate) fn engine_copy(value: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(value.len().next_power_of_two());
        buf.extend_from_slice(value);
        buf.resize(buf.capacity(), 0);
        Self {
            len: value.len(),
            repr: Repr::Engine(buf),
        }
    }
}
