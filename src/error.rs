//! Internal reasons an operation yielded nothing.
//!
//! None of this is part of the public surface: every public entry point
//! keeps the C original's "return null / ignore the call" contract and
//! returns `Option`/`()`. `ArenaError` exists so the checked internals (and
//! the test suite) can tell *why* a call was rejected, and so rejections can
//! carry a `log` message without the caller ever seeing a `Result`.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArenaError {
    InvalidAlignment,
    ZeroSize,
    SizeTooLarge,
    OutOfSpace,
    UnknownPointer,
    DoubleFree,
    HostAllocFailed,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ArenaError::InvalidAlignment => "invalid alignment",
            ArenaError::ZeroSize => "zero-size request",
            ArenaError::SizeTooLarge => "size exceeds arena capacity",
            ArenaError::OutOfSpace => "no fitting free block and insufficient tail space",
            ArenaError::UnknownPointer => "pointer not recognized as owned by this arena",
            ArenaError::DoubleFree => "block already free",
            ArenaError::HostAllocFailed => "host allocator returned null",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ArenaError {}
