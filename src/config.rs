//! Compile-time knobs for the allocator.
//!
//! These mirror the `#ifdef`-style configuration points of the original C
//! implementation: `MIN_BUFFER_SIZE`, `DEFAULT_ALIGNMENT`, `POISONING`,
//! `NO_MALLOC` and `SENTINEL` become `const`s plus two Cargo features
//! (`poisoning`, `no_malloc`) — Rust's native replacement for preprocessor
//! conditionals.

use core::mem;

/// `log2` of the machine word size; the alignment exponent stored in a
/// header is relative to this.
pub(crate) const MIN_EXP: u32 = (mem::size_of::<usize>() as u32).trailing_zeros();

/// Number of low bits in the size/alignment word reserved for the
/// alignment exponent. Representable exponents are `0..=7`.
pub(crate) const ALIGN_EXP_BITS: u32 = 3;
pub(crate) const ALIGN_EXP_MASK: usize = (1 << ALIGN_EXP_BITS) - 1;

/// Minimum payload, in bytes, that any block (free or occupied) may have.
/// Splitting a free block never leaves a remainder smaller than
/// `HEADER_SIZE + MIN_BUFFER_SIZE`; such a remainder is absorbed into the
/// allocation instead (resolves the mixed `BLOCK_MIN_SIZE` vs.
/// `HEADER + MIN_BUFFER_SIZE` convention in the original — see DESIGN.md).
pub const MIN_BUFFER_SIZE: usize = 16;

/// Default alignment used by [`crate::Arena::new_static`] and
/// [`crate::Arena::new_dynamic`].
pub const DEFAULT_ALIGNMENT: usize = 16;

/// The smallest amount of space a split-off remainder must occupy to be
/// worth keeping as its own block: header plus minimum payload.
pub(crate) const fn min_block_space() -> usize {
    crate::header::BlockHeader::SIZE + MIN_BUFFER_SIZE
}

/// XOR-magic constant used to validate occupied blocks and to encode the
/// block-pointer back-link under alignment padding (see `list.rs`).
///
/// Any fixed non-zero value works as long as zero isn't the sentinel and
/// its low bits don't coincide with plausible pointer low-bits; the exact
/// value isn't security-sensitive.
#[cfg(target_pointer_width = "64")]
pub const SENTINEL: usize = 0xDEAD_BEEF_DEAD_BEEF;
#[cfg(target_pointer_width = "32")]
pub const SENTINEL: usize = 0xDEAD_BEEF;

/// Byte pattern written over a block's payload just before it re-enters the
/// free tree or the tail, when the `poisoning` feature is enabled.
#[cfg(feature = "poisoning")]
pub const POISON_BYTE: u8 = 0xAA;

pub(crate) const PTR_TAG_MASK: usize = 0b11;
pub(crate) const FREE_BIT: usize = 0b01;
pub(crate) const COLOR_BIT: usize = 0b10;
pub(crate) const DYNAMIC_BIT: usize = 0b01;
pub(crate) const NESTED_BIT: usize = 0b10;
