//! Header codec — component A.
//!
//! `BlockHeader` is the one physical layout shared by every kind of header
//! in the arena: a plain occupied/free block, the arena header itself, and
//! a bump sub-allocator's header. They're all exactly four machine words;
//! what each word *means* depends on which of the three roles is reading
//! it (see `block.rs`, `arena.rs`, `bump.rs` for the per-role views).
//!
//! This module is pure bit arithmetic. It never allocates, never walks the
//! block list, and never decides whether a pointer is valid — it just reads
//! and writes the tagged fields packed into each word.
//!
//! ```text
//!   word0: size_and_alignment   [ payload size : usize-3 bits | align exp : 3 bits ]
//!   word1: prev                 [ prev block address : usize-2 bits | color : 1 | is_free : 1 ]
//!   word2: arena | left | tail  (meaning depends on role + is_free)
//!   word3: magic | right | free_tree_root
//! ```

use core::cell::Cell;
use core::mem;

use crate::config::{ALIGN_EXP_MASK, COLOR_BIT, FREE_BIT, MIN_EXP, PTR_TAG_MASK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Black,
}

/// The shared four-word header. Every in-buffer structure (`Block`,
/// `Arena`, `BumpAllocator`) is `#[repr(transparent)]` over this type.
#[repr(C)]
pub(crate) struct BlockHeader {
    w0: Cell<usize>,
    w1: Cell<usize>,
    w2: Cell<usize>,
    w3: Cell<usize>,
}

impl BlockHeader {
    pub(crate) const WORDS: usize = 4;
    pub(crate) const SIZE: usize = Self::WORDS * mem::size_of::<usize>();

    /// Writes a freshly-zeroed header at `base`, returning a reference into
    /// the buffer. `base` must be word-aligned and own at least
    /// `Self::SIZE` bytes.
    ///
    /// # Safety
    /// `base` must point at valid, writable memory of at least `Self::SIZE`
    /// bytes, word-aligned, and not presently borrowed as anything else.
    pub(crate) unsafe fn init_at<'a>(base: *mut u8) -> &'a BlockHeader {
        debug_assert_eq!(base as usize % mem::align_of::<usize>(), 0);
        let h = base as *mut BlockHeader;
        (*h).w0.set(0);
        (*h).w1.set(0);
        (*h).w2.set(0);
        (*h).w3.set(0);
        &*h
    }

    /// Reinterprets already-initialized memory at `base` as a header.
    ///
    /// # Safety
    /// `base` must point at a live, word-aligned `BlockHeader`-shaped
    /// region for the duration of `'a`.
    pub(crate) unsafe fn at<'a>(base: *mut u8) -> &'a BlockHeader {
        debug_assert_eq!(base as usize % mem::align_of::<usize>(), 0);
        &*(base as *mut BlockHeader)
    }

    pub(crate) fn addr(&self) -> usize {
        self as *const _ as usize
    }

    // -- word0: size + alignment exponent -----------------------------

    pub(crate) fn size(&self) -> usize {
        self.w0.get() >> crate::config::ALIGN_EXP_BITS
    }

    pub(crate) fn set_size(&self, n: usize) {
        debug_assert!(n <= usize::MAX >> crate::config::ALIGN_EXP_BITS);
        self.w0
            .set((n << crate::config::ALIGN_EXP_BITS) | (self.w0.get() & ALIGN_EXP_MASK));
    }

    pub(crate) fn alignment(&self) -> usize {
        1usize << (((self.w0.get() & ALIGN_EXP_MASK) as u32) + MIN_EXP)
    }

    pub(crate) fn set_alignment(&self, a: usize) {
        debug_assert!(a.is_power_of_two());
        let e = a.trailing_zeros() - MIN_EXP;
        debug_assert!((e as usize) <= ALIGN_EXP_MASK);
        self.w0
            .set((self.w0.get() & !ALIGN_EXP_MASK) | e as usize);
    }

    // -- word1: prev address + is_free + color -------------------------

    pub(crate) fn prev_addr(&self) -> usize {
        self.w1.get() & !PTR_TAG_MASK
    }

    pub(crate) fn set_prev_addr(&self, addr: usize) {
        debug_assert_eq!(addr & PTR_TAG_MASK, 0, "prev address must be word-aligned");
        self.w1.set(addr | (self.w1.get() & PTR_TAG_MASK));
    }

    pub(crate) fn is_free(&self) -> bool {
        self.w1.get() & FREE_BIT != 0
    }

    pub(crate) fn set_is_free(&self, free: bool) {
        let w = self.w1.get();
        self.w1.set(if free { w | FREE_BIT } else { w & !FREE_BIT });
    }

    pub(crate) fn color(&self) -> Color {
        if self.w1.get() & COLOR_BIT != 0 {
            Color::Black
        } else {
            Color::Red
        }
    }

    pub(crate) fn set_color(&self, c: Color) {
        let w = self.w1.get();
        self.w1.set(match c {
            Color::Black => w | COLOR_BIT,
            Color::Red => w & !COLOR_BIT,
        });
    }

    // -- word2 / word3: role-dependent ---------------------------------

    pub(crate) fn w2(&self) -> usize {
        self.w2.get()
    }
    pub(crate) fn set_w2(&self, v: usize) {
        self.w2.set(v);
    }
    pub(crate) fn w3(&self) -> usize {
        self.w3.get()
    }
    pub(crate) fn set_w3(&self, v: usize) {
        self.w3.set(v);
    }
}
