//! The `Arena` type and its lifecycle: `new_static`, `new_dynamic`, `reset`,
//! `free`. The arena header reuses the exact `BlockHeader` layout (see
//! `header.rs`) — `capacity_and_alignment` aliases `size_and_alignment`,
//! `tail` (tagged with `is_dynamic`/`is_nested`) aliases word2,
//! `free_tree_root` aliases word3. `prev` (word1) is unused at the
//! top-level; for a nested arena it's the parent's physical-list `prev`
//! pointer, written by the parent's allocator and left untouched here.
//!
//! Host memory acquisition is the one external collaborator (spec.md §1):
//! `obtain`/`release`, implemented here against `libc::malloc`/`libc::free`
//! — the same host-allocator boundary the teacher crate crosses with
//! `libc::sbrk`, just swapped for a single up-front allocation since this
//! arena (unlike the teacher's bump-only design) never grows or shrinks the
//! host allocation after creation.

use core::mem;
use core::ptr::NonNull;

use log::{debug, warn};

use crate::block::Block;
use crate::config::{DEFAULT_ALIGNMENT, DYNAMIC_BIT, MIN_BUFFER_SIZE, NESTED_BIT, PTR_TAG_MASK};
use crate::error::ArenaError;
use crate::header::BlockHeader;
use crate::util::{align_up, is_valid_alignment};

/// Minimum and maximum representable alignment on this target:
/// `word_size * 2^0 ..= word_size * 2^7`.
pub const MIN_ALIGNMENT: usize = mem::size_of::<usize>();
pub const MAX_ALIGNMENT: usize = MIN_ALIGNMENT << 7;

/// A region allocator carving user allocations out of one contiguous byte
/// buffer. See the crate documentation for the allocation disciplines it
/// supports.
#[repr(transparent)]
pub struct Arena(BlockHeader);

impl Arena {
    pub(crate) fn addr(&self) -> usize {
        &self.0 as *const BlockHeader as usize
    }

    pub(crate) fn from_addr<'a>(addr: usize) -> &'a Arena {
        unsafe { &*(addr as *const Arena) }
    }

    pub(crate) fn header(&self) -> &BlockHeader {
        &self.0
    }

    /// Total capacity of the arena, in bytes available to blocks (from the
    /// first block's header to the end of the buffer) — excludes the
    /// `Arena` header itself.
    pub fn capacity(&self) -> usize {
        self.0.size()
    }
    pub(crate) fn set_capacity(&self, n: usize) {
        self.0.set_size(n)
    }

    pub fn default_alignment(&self) -> usize {
        self.0.alignment()
    }
    pub(crate) fn set_default_alignment(&self, a: usize) {
        self.0.set_alignment(a)
    }

    pub(crate) fn tail(&self) -> Block {
        let addr = self.0.w2() & !PTR_TAG_MASK;
        unsafe { Block::from_addr(addr) }
    }
    pub(crate) fn set_tail(&self, block: Block) {
        let tags = self.0.w2() & PTR_TAG_MASK;
        self.0.set_w2(block.addr() | tags);
    }

    pub(crate) fn is_dynamic(&self) -> bool {
        self.0.w2() & DYNAMIC_BIT != 0
    }
    pub(crate) fn set_is_dynamic(&self, v: bool) {
        let w = self.0.w2();
        self.0.set_w2(if v { w | DYNAMIC_BIT } else { w & !DYNAMIC_BIT });
    }

    pub(crate) fn is_nested(&self) -> bool {
        self.0.w2() & NESTED_BIT != 0
    }
    pub(crate) fn set_is_nested(&self, v: bool) {
        let w = self.0.w2();
        self.0.set_w2(if v { w | NESTED_BIT } else { w & !NESTED_BIT });
    }

    pub(crate) fn free_tree_root(&self) -> Option<Block> {
        let addr = self.0.w3();
        if addr == 0 {
            None
        } else {
            Some(unsafe { Block::from_addr(addr) })
        }
    }
    pub(crate) fn set_free_tree_root(&self, root: Option<Block>) {
        self.0.set_w3(root.map_or(0, |b| b.addr()));
    }

    /// Address immediately after the `Arena` header, i.e. where the block
    /// data region conceptually begins before the first-block alignment
    /// pass.
    fn data_start(&self) -> usize {
        self.addr() + mem::size_of::<Arena>()
    }

    pub(crate) fn data_end(&self) -> usize {
        self.data_start() + self.capacity()
    }

    /// The first block's address, aligned so that *its payload* (not its
    /// header) starts on an `alignment`-boundary. If this leaves a gap
    /// between the arena header and the first block, a tagged detector
    /// word is written immediately before the first block so that
    /// `arena_for_block`'s prev-walk terminal case can recover the arena
    /// address later (spec.md §4.B "first-block terminal case").
    pub(crate) fn first_block(&self) -> Block {
        let raw = self.data_start() + BlockHeader::SIZE;
        let aligned_payload = align_up(raw, self.default_alignment());
        let first_addr = aligned_payload - BlockHeader::SIZE;
        unsafe { Block::from_addr(first_addr) }
    }

    fn write_first_block_detector(&self) {
        let first_addr = self.first_block().addr();
        let word_addr = first_addr - mem::size_of::<usize>();
        if word_addr == self.addr() + mem::size_of::<Arena>() - mem::size_of::<usize>() {
            // No padding: this word IS the arena's own free_tree_root
            // word, already a genuine (even) pointer value. Nothing to do.
            return;
        }
        let offset = word_addr - self.addr();
        let detector = (offset << 1) | 1;
        unsafe {
            core::ptr::write_unaligned(word_addr as *mut usize, detector);
        }
    }

    /// Recovers the `Arena` whose first block's detector word precedes
    /// `first_block`. Used only when a prev-walk (component B) runs off
    /// the start of the physical list.
    pub(crate) fn from_first_block(first_block: Block) -> NonNull<Arena> {
        let word_addr = first_block.addr() - mem::size_of::<usize>();
        let detector = unsafe { core::ptr::read_unaligned(word_addr as *const usize) };
        let arena_addr = if detector & 1 == 0 {
            first_block.addr() - mem::size_of::<Arena>()
        } else {
            let offset = detector >> 1;
            word_addr - offset
        };
        unsafe { NonNull::new_unchecked(arena_addr as *mut Arena) }
    }

    /// Minimum total buffer size (`Arena` header + first block header +
    /// `MIN_BUFFER_SIZE` payload), ignoring alignment slack.
    pub(crate) const fn min_total_size() -> usize {
        mem::size_of::<Arena>() + BlockHeader::SIZE + MIN_BUFFER_SIZE
    }

    fn init_in(buf: &mut [u8], align: usize) -> Option<&mut Arena> {
        if !is_valid_alignment(align, MIN_ALIGNMENT, MAX_ALIGNMENT) {
            warn!("arena: rejected alignment {align}: {}", ArenaError::InvalidAlignment);
            return None;
        }
        if buf.len() < Self::min_total_size() {
            warn!("arena: buffer of {} bytes is smaller than the minimum arena size", buf.len());
            return None;
        }
        if buf.as_ptr() as usize % MIN_ALIGNMENT != 0 {
            warn!("arena: buffer is not word-aligned");
            return None;
        }

        let base = buf.as_mut_ptr();
        unsafe { BlockHeader::init_at(base) };
        let arena = unsafe { &mut *(base as *mut Arena) };
        arena.set_capacity(buf.len() - mem::size_of::<Arena>());
        arena.set_default_alignment(align);
        arena.set_is_dynamic(false);
        arena.set_is_nested(false);
        arena.set_free_tree_root(None);

        arena.write_first_block_detector();
        let first = arena.first_block();
        let padding = first.addr() - arena.data_start();
        let tail_payload = arena.capacity() - padding - BlockHeader::SIZE;

        let first = Block::init_free(first.addr(), 0, align);
        first.set_prev(None);
        arena.set_tail(first);
        let _ = tail_payload; // tracked implicitly: tail payload = data_end() - (tail.addr()+HEADER)

        debug!(
            "arena: initialized static arena at {:#x}, capacity={}",
            arena.addr(),
            arena.capacity()
        );
        Some(arena)
    }

    /// Installs an arena in caller-owned memory using the default
    /// alignment (16).
    pub fn new_static(buf: &mut [u8]) -> Option<&mut Arena> {
        Self::new_static_aligned(buf, DEFAULT_ALIGNMENT)
    }

    /// Installs an arena in caller-owned memory using `align` as its
    /// default allocation alignment.
    pub fn new_static_aligned(buf: &mut [u8], align: usize) -> Option<&mut Arena> {
        Self::init_in(buf, align)
    }

    /// Obtains `n` (plus bookkeeping) bytes from the host allocator and
    /// installs an arena in them, using the default alignment.
    #[cfg(not(feature = "no_malloc"))]
    pub fn new_dynamic(n: usize) -> Option<NonNull<Arena>> {
        Self::new_dynamic_aligned(n, DEFAULT_ALIGNMENT)
    }

    /// Obtains `n` (plus bookkeeping) bytes from the host allocator and
    /// installs an arena in them with the given default alignment.
    #[cfg(not(feature = "no_malloc"))]
    pub fn new_dynamic_aligned(n: usize, align: usize) -> Option<NonNull<Arena>> {
        if !is_valid_alignment(align, MIN_ALIGNMENT, MAX_ALIGNMENT) {
            return None;
        }
        let total = n
            .checked_add(mem::size_of::<Arena>())?
            .checked_add(align)?;
        let Some(raw) = (unsafe { host::obtain(total) }) else {
            warn!("arena: {}", ArenaError::HostAllocFailed);
            return None;
        };
        let buf = unsafe { core::slice::from_raw_parts_mut(raw.as_ptr(), total) };
        let arena = Self::init_in(buf, align)?;
        arena.set_is_dynamic(true);
        debug!("arena: initialized dynamic arena, requested {n} bytes");
        Some(NonNull::from(arena))
    }

    /// Collapses the arena to a single free tail block covering the whole
    /// payload, as if freshly created. Invalidates every pointer
    /// previously returned by this arena or any sub-allocator rooted in
    /// it. No-op on a null pointer.
    pub fn reset(&mut self) {
        self.set_free_tree_root(None);
        self.write_first_block_detector();
        let first = self.first_block();
        let block = Block::init_free(first.addr(), 0, self.default_alignment());
        block.set_prev(None);
        self.set_tail(block);
        debug!("arena: reset at {:#x}", self.addr());
    }

    /// `reset` followed by zeroing the full payload.
    pub fn reset_zero(&mut self) {
        self.reset();
        let start = self.first_block().addr();
        let len = self.data_end() - start;
        unsafe {
            core::ptr::write_bytes(start as *mut u8, 0, len);
        }
    }

    /// Releases host memory if this arena `is_dynamic`, or returns the
    /// backing block to the parent if `is_nested`. No-op otherwise.
    ///
    /// # Safety
    /// `arena` must not be used (directly, or via any live sub-allocator
    /// rooted in it) after this call.
    pub unsafe fn free(arena: NonNull<Arena>) {
        let a = arena.as_ref();
        if a.is_nested() {
            crate::nested::free_nested(arena);
            return;
        }
        #[cfg(not(feature = "no_malloc"))]
        if a.is_dynamic() {
            debug!("arena: releasing dynamic arena at {:#x}", a.addr());
            host::release(arena.cast());
        }
    }
}

#[cfg(not(feature = "no_malloc"))]
pub(crate) mod host {
    //! The two-function host-memory collaborator named in spec.md §1:
    //! `obtain(n)` / `release(p)`. Backed by `libc::malloc`/`libc::free`,
    //! the same family of calls the teacher crate uses for its heap
    //! (there, `sbrk`; here, a single up-front allocation since this
    //! design never grows/shrinks the host allocation block-by-block).

    use core::ptr::NonNull;

    pub(crate) unsafe fn obtain(n: usize) -> Option<NonNull<u8>> {
        let p = libc::malloc(n) as *mut u8;
        NonNull::new(p)
    }

    pub(crate) unsafe fn release(p: NonNull<u8>) {
        libc::free(p.as_ptr() as *mut libc::c_void);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned_buf(size: usize) -> Vec<u8> {
        let mut v = Vec::with_capacity(size + MIN_ALIGNMENT);
        v.resize(size + MIN_ALIGNMENT, 0u8);
        let misalign = v.as_ptr() as usize % MIN_ALIGNMENT;
        if misalign != 0 {
            v.drain(0..(MIN_ALIGNMENT - misalign));
        }
        v.truncate(size);
        v
    }

    #[test]
    fn new_static_rejects_too_small_buffer() {
        let mut buf = aligned_buf(Arena::min_total_size() - 1);
        assert!(Arena::new_static(&mut buf).is_none());
    }

    #[test]
    fn new_static_accepts_minimum_buffer() {
        let mut buf = aligned_buf(Arena::min_total_size());
        assert!(Arena::new_static(&mut buf).is_some());
    }

    #[test]
    fn new_static_rejects_bad_alignment() {
        let mut buf = aligned_buf(4096);
        assert!(Arena::new_static_aligned(&mut buf, 3).is_none());
        assert!(Arena::new_static_aligned(&mut buf, MAX_ALIGNMENT * 2).is_none());
    }

    #[test]
    fn reset_restores_full_tail_capacity() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let before = arena.data_end() - arena.first_block().addr();
        arena.alloc(100).unwrap();
        arena.reset();
        let after = arena.data_end() - arena.first_block().addr();
        assert_eq!(before, after);
    }
}
