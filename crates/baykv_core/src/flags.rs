//! Flag sets and the rules for combining them.
//!
//! The typed sets come straight from the engine. Raw integers from outside
//! the type system go through [`from_raw`], which refuses bits the target
//! set does not define.

use crate::error::{Error, Result};
use bitflags::Flags;

pub use baykv_engine::{CloseFlags, DbFlags, EnvFlags, ReadFlags, TxnFlags, WriteFlags};

/// Converts raw bits into a typed flag set.
///
/// # Errors
///
/// `InvalidArgument` if `bits` contains a bit `F` does not define.
pub fn from_raw<F: Flags<Bits = u32>>(bits: u32) -> Result<F> {
    F::from_bits(bits).ok_or_else(|| {
        Error::invalid_argument(format!(
            "unrecognized flag bits {:#x}",
            bits & !F::all().bits()
        ))
    })
}

pub(crate) fn check_db(flags: DbFlags) -> Result<()> {
    if flags.contains(DbFlags::EXCLUSIVE) && !flags.contains(DbFlags::CREATE) {
        return Err(Error::invalid_argument("EXCLUSIVE requires CREATE"));
    }
    if flags.contains(DbFlags::READONLY)
        && flags.intersects(DbFlags::CREATE | DbFlags::EXCLUSIVE | DbFlags::TRUNCATE)
    {
        return Err(Error::invalid_argument(
            "READONLY cannot be combined with CREATE, EXCLUSIVE or TRUNCATE",
        ));
    }
    Ok(())
}

pub(crate) fn check_begin(flags: TxnFlags) -> Result<()> {
    check_sync(flags)?;
    if flags.contains(TxnFlags::SNAPSHOT) && flags.contains(TxnFlags::READ_UNCOMMITTED) {
        return Err(Error::invalid_argument(
            "SNAPSHOT cannot be combined with READ_UNCOMMITTED",
        ));
    }
    Ok(())
}

pub(crate) fn check_commit(flags: TxnFlags) -> Result<()> {
    if !(TxnFlags::SYNC | TxnFlags::NOSYNC).contains(flags) {
        return Err(Error::invalid_argument(
            "only SYNC and NOSYNC apply at commit",
        ));
    }
    check_sync(flags)
}

fn check_sync(flags: TxnFlags) -> Result<()> {
    if flags.contains(TxnFlags::SYNC | TxnFlags::NOSYNC) {
        return Err(Error::invalid_argument("SYNC and NOSYNC are exclusive"));
    }
    Ok(())
}
