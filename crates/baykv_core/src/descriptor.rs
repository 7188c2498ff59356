//! Byte buffers to and from engine descriptors.
//!
//! Callers pass plain byte slices and get owned `Vec<u8>`s back. Inputs are
//! wrapped without copying; outputs are copied out of the engine buffer,
//! which is released as soon as the copy is made.

use crate::error::{Error, Result};
use baykv_engine::Descriptor;

/// Wraps caller bytes for an engine call without copying them.
///
/// The returned descriptor borrows `bytes`, so it cannot outlive the call
/// that consumes it.
#[must_use]
pub fn to_descriptor(bytes: &[u8]) -> Descriptor<'_> {
    if bytes.is_empty() {
        return Descriptor::empty();
    }
    Descriptor::user(bytes)
}

/// Builds a descriptor from an optional buffer and a claimed length.
///
/// # Errors
///
/// `InvalidArgument` if `data` is `None` with a nonzero length, or the
/// length exceeds `data`.
pub fn from_raw_parts(data: Option<&[u8]>, len: usize) -> Result<Descriptor<'_>> {
    Ok(Descriptor::from_parts(data, len)?)
}

/// Copies a descriptor's valid bytes into a new buffer and releases it.
#[must_use]
pub fn from_descriptor(desc: Descriptor<'_>) -> Vec<u8> {
    let out = desc.as_slice().to_vec();
    // releases an EngineAlloc buffer; a UserMem view just ends its borrow
    drop(desc);
    out
}

/// Copies a descriptor's valid bytes into `buf` and releases it, returning
/// the number of bytes written.
///
/// # Errors
///
/// `BufferTooSmall` if `buf` is shorter than the value; nothing is copied.
pub fn copy_into(desc: Descriptor<'_>, buf: &mut [u8]) -> Result<usize> {
    let len = desc.len();
    if len > buf.len() {
        return Err(Error::BufferTooSmall {
            needed: len,
            available: buf.len(),
        });
    }
    buf[..len].copy_from_slice(desc.as_slice());
    Ok(len)
}
