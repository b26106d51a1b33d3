//! `Block`: the semantic view of a `BlockHeader` sitting in the physical
//! list (component A/B boundary). A `Block` is a thin `Copy` handle — it
//! owns nothing, it just names an address and interprets the header's
//! words the "occupied or free user block" way.
//!
//! Arena headers and bump headers reuse the exact same four words for
//! different purposes; see `arena.rs` and `bump.rs` for those views.

use core::ptr::NonNull;

use crate::config::SENTINEL;
use crate::header::{BlockHeader, Color};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block(NonNull<BlockHeader>);

impl Block {
    /// # Safety
    /// `ptr` must address a live `BlockHeader` for as long as the returned
    /// `Block` is used.
    pub(crate) unsafe fn from_header(ptr: NonNull<BlockHeader>) -> Self {
        Block(ptr)
    }

    /// # Safety
    /// `addr` must be a word-aligned address of a live `BlockHeader`.
    pub(crate) unsafe fn from_addr(addr: usize) -> Self {
        Block(NonNull::new_unchecked(addr as *mut BlockHeader))
    }

    pub(crate) fn header(&self) -> &BlockHeader {
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    pub(crate) fn as_nonnull(&self) -> NonNull<u8> {
        self.0.cast()
    }

    /// Pointer to this block's payload (`header + HEADER_SIZE`).
    pub(crate) fn data_ptr(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked((self.addr() + BlockHeader::SIZE) as *mut u8) }
    }

    pub(crate) fn size(&self) -> usize {
        self.header().size()
    }
    pub(crate) fn set_size(&self, n: usize) {
        self.header().set_size(n)
    }
    pub(crate) fn alignment(&self) -> usize {
        self.header().alignment()
    }
    pub(crate) fn set_alignment(&self, a: usize) {
        self.header().set_alignment(a)
    }

    pub(crate) fn prev(&self) -> Option<Block> {
        let addr = self.header().prev_addr();
        if addr == 0 {
            None
        } else {
            Some(unsafe { Block::from_addr(addr) })
        }
    }
    pub(crate) fn set_prev(&self, prev: Option<Block>) {
        self.header().set_prev_addr(prev.map_or(0, |b| b.addr()));
    }

    pub(crate) fn is_free(&self) -> bool {
        self.header().is_free()
    }
    pub(crate) fn set_is_free(&self, v: bool) {
        self.header().set_is_free(v)
    }
    pub(crate) fn color(&self) -> Color {
        self.header().color()
    }
    pub(crate) fn set_color(&self, c: Color) {
        self.header().set_color(c)
    }

    // -- occupied variant: arena back-pointer + XOR magic --------------

    pub(crate) fn arena_ptr(&self) -> usize {
        self.header().w2()
    }
    pub(crate) fn set_arena_ptr(&self, arena_addr: usize) {
        self.header().set_w2(arena_addr)
    }

    pub(crate) fn set_magic(&self, user_ptr: NonNull<u8>) {
        self.header().set_w3(SENTINEL ^ user_ptr.as_ptr() as usize)
    }
    pub(crate) fn valid_magic(&self, user_ptr: NonNull<u8>) -> bool {
        self.header().w3() ^ (user_ptr.as_ptr() as usize) == SENTINEL
    }

    // -- free variant: LLRB children ------------------------------------

    pub(crate) fn left(&self) -> Option<Block> {
        let addr = self.header().w2();
        if addr == 0 {
            None
        } else {
            Some(unsafe { Block::from_addr(addr) })
        }
    }
    pub(crate) fn set_left(&self, b: Option<Block>) {
        self.header().set_w2(b.map_or(0, |b| b.addr()));
    }
    pub(crate) fn right(&self) -> Option<Block> {
        let addr = self.header().w3();
        if addr == 0 {
            None
        } else {
            Some(unsafe { Block::from_addr(addr) })
        }
    }
    pub(crate) fn set_right(&self, b: Option<Block>) {
        self.header().set_w3(b.map_or(0, |b| b.addr()));
    }

    /// Trailing zero count of this block's payload address — the
    /// "alignment quality" secondary tree key (§4.C).
    pub(crate) fn alignment_quality(&self) -> u32 {
        let payload = self.addr() + BlockHeader::SIZE;
        if payload == 0 {
            usize::BITS
        } else {
            payload.trailing_zeros()
        }
    }

    /// Resets this header to a fresh free block of the given `size`,
    /// clearing tree-child and physical-list state that belongs to the
    /// *new* placement. Caller sets `prev` and tree linkage afterwards.
    pub(crate) fn init_free(addr: usize, size: usize, alignment: usize) -> Block {
        let header = unsafe { BlockHeader::init_at(addr as *mut u8) };
        header.set_size(size);
        header.set_alignment(alignment);
        header.set_is_free(true);
        header.set_color(Color::Red);
        header.set_w2(0);
        header.set_w3(0);
        unsafe { Block::from_addr(addr) }
    }
}
