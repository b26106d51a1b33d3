//! Bump sub-allocator — component E (spec.md §4.E).
//!
//! A `BumpAllocator` is a linear allocator carved out of a single parent
//! block: no search, no free tree, no splitting on every call — each
//! allocation just advances an offset. Its header reuses the same
//! four-word layout as `Block`/`Arena` (see `header.rs`) so it's ABI-
//! compatible with a block header and the parent sees it as plain occupied
//! space: word0 is `capacity`, word1 is the parent arena's address, word2
//! is `offset` (bytes consumed, counted from the bump's own address, so it
//! starts at the header size rather than zero).
//!
//! Only `trim` touches the parent's free tree; every other operation is
//! pure offset arithmetic.

use core::mem;
use core::ptr::NonNull;

use log::{trace, warn};

use crate::arena::Arena;
use crate::block::Block;
use crate::config::{min_block_space, MIN_BUFFER_SIZE};
use crate::header::BlockHeader;
use crate::list;
use crate::util::align_up;

#[repr(transparent)]
pub struct BumpAllocator(BlockHeader);

impl BumpAllocator {
    fn addr(&self) -> usize {
        &self.0 as *const BlockHeader as usize
    }

    /// Bytes available to callers, not counting this header.
    pub fn capacity(&self) -> usize {
        self.0.size()
    }
    fn set_capacity(&self, n: usize) {
        self.0.set_size(n);
    }

    fn parent(&self) -> &Arena {
        Arena::from_addr(self.0.prev_addr())
    }

    /// Bytes consumed so far, counted from this struct's own address — so
    /// a freshly created or freshly reset bump reports `size_of::<Self>()`,
    /// not zero.
    pub fn used(&self) -> usize {
        self.0.w2()
    }
    fn set_used(&self, n: usize) {
        self.0.set_w2(n);
    }

    /// Carves a bump sub-allocator of `n` usable bytes out of `parent`.
    /// Fails if `n` is below `MIN_BUFFER_SIZE` or `parent` has no room for
    /// `size_of::<BumpAllocator>() + n`.
    pub fn new(parent: &Arena, n: usize) -> Option<NonNull<BumpAllocator>> {
        if n < MIN_BUFFER_SIZE {
            warn!("bump: requested capacity {n} is below the minimum");
            return None;
        }
        let total = mem::size_of::<BumpAllocator>().checked_add(n)?;
        let user_ptr = parent.alloc(total)?;

        let header = unsafe { BlockHeader::init_at(user_ptr.as_ptr()) };
        header.set_size(n);
        header.set_prev_addr(parent.addr());
        header.set_w2(BlockHeader::SIZE);

        trace!(
            "bump: created at {:#x} inside arena {:#x}, capacity={n}",
            user_ptr.as_ptr() as usize,
            parent.addr()
        );
        Some(user_ptr.cast())
    }

    /// Returns `address(self) + offset`, advancing `offset` by `size`.
    /// Rejects a zero-size request or one that wouldn't fit; the returned
    /// pointer carries no alignment guarantee beyond the machine word.
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_aligned(size, 1)
    }

    /// Like `alloc`, but first advances the offset so the returned
    /// pointer is a multiple of `alignment` (a power of two).
    pub fn alloc_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 || !alignment.is_power_of_two() {
            return None;
        }
        let current = self.addr() + self.used();
        let aligned = align_up(current, alignment);
        let padding = aligned - current;
        let new_used = self.used().checked_add(padding)?.checked_add(size)?;
        if new_used > self.capacity() + BlockHeader::SIZE {
            return None;
        }
        self.set_used(new_used);
        Some(unsafe { NonNull::new_unchecked(aligned as *mut u8) })
    }

    /// Resets the offset to the header size, reclaiming every allocation
    /// made so far without touching the parent.
    pub fn reset(&self) {
        self.set_used(BlockHeader::SIZE);
    }

    /// Shrinks the backing block down to the smallest size that still
    /// covers the used prefix (rounded up to the parent's default
    /// alignment) and returns the remainder to the parent: merged into the
    /// right neighbor if it's already free, inserted as a new free block
    /// otherwise, or absorbed into the tail if there is no right neighbor.
    /// No-op if the reclaimable remainder is smaller than
    /// `HEADER + MIN_BUFFER_SIZE`.
    pub fn trim(&self) {
        let parent = self.parent();
        let own_ptr = unsafe { NonNull::new_unchecked(self.addr() as *mut u8) };
        let Some(block) = list::recover_block(own_ptr) else {
            return;
        };

        let needed = align_up(self.used(), parent.default_alignment());
        if needed >= block.size() {
            return;
        }
        let leftover = block.size() - needed;
        if leftover < min_block_space() {
            trace!("bump: trim at {:#x} - remainder too small to reclaim", self.addr());
            return;
        }

        let split_addr = block.addr() + BlockHeader::SIZE + needed;
        let split_size = leftover - BlockHeader::SIZE;
        block.set_size(needed);
        self.set_capacity(needed - BlockHeader::SIZE);

        match list::next(parent, block) {
            None => {
                let split = Block::init_free(split_addr, 0, parent.default_alignment());
                split.set_prev(Some(block));
                parent.set_tail(split);
            }
            Some(next) if next.is_free() => {
                let next_is_tail = next == parent.tail();
                if !next_is_tail {
                    parent.remove_free(next);
                }
                let merged_size = split_size + BlockHeader::SIZE + next.size();
                let merged = Block::init_free(split_addr, merged_size, parent.default_alignment());
                merged.set_prev(Some(block));
                if let Some(after) = list::next(parent, next) {
                    after.set_prev(Some(merged));
                }
                if next_is_tail {
                    merged.set_size(0);
                    parent.set_tail(merged);
                } else {
                    parent.insert_free(merged);
                }
            }
            Some(next) => {
                let split = Block::init_free(split_addr, split_size, parent.default_alignment());
                split.set_prev(Some(block));
                next.set_prev(Some(split));
                parent.insert_free(split);
            }
        }

        trace!("bump: trimmed at {:#x}, reclaimed {leftover} bytes", self.addr());
        #[cfg(debug_assertions)]
        parent.check_invariants();
    }

    /// Releases the bump's backing block via `free_block` (spec.md §4.D).
    pub fn free(bump: NonNull<BumpAllocator>) {
        crate::alloc::free_block(bump.cast());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned_buf(size: usize) -> Vec<u8> {
        let mut v = vec![0u8; size + 16];
        let misalign = v.as_ptr() as usize % 16;
        if misalign != 0 {
            v.drain(0..(16 - misalign));
        }
        v.truncate(size);
        v
    }

    #[test]
    fn new_rejects_too_small_capacity() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        assert!(BumpAllocator::new(arena, 4).is_none());
    }

    #[test]
    fn new_accepts_full_remaining_capacity() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let n = arena.free_tail_bytes() - BlockHeader::SIZE;
        assert!(BumpAllocator::new(arena, n).is_some());
    }

    #[test]
    fn alloc_is_contiguous_and_rejects_overflow() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let bump = unsafe { BumpAllocator::new(arena, 256).unwrap().as_ref() };

        let a = bump.alloc(100).unwrap();
        let b = bump.alloc(100).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 100);
        assert!(bump.alloc(200).is_none());
    }

    #[test]
    fn alloc_aligned_rejects_non_power_of_two() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let bump = unsafe { BumpAllocator::new(arena, 256).unwrap().as_ref() };
        assert!(bump.alloc_aligned(50, 3).is_none());
    }

    #[test]
    fn alloc_aligned_returns_aligned_pointer() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let bump = unsafe { BumpAllocator::new(arena, 256).unwrap().as_ref() };
        let p = bump.alloc_aligned(16, 64).unwrap();
        assert_eq!(p.as_ptr() as usize % 64, 0);
    }

    #[test]
    fn reset_reclaims_all_offset_without_touching_parent() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let bump = unsafe { BumpAllocator::new(arena, 256).unwrap().as_ref() };
        bump.alloc(200).unwrap();
        bump.reset();
        assert_eq!(bump.used(), BlockHeader::SIZE);
        assert!(bump.alloc(200).is_some());
    }

    #[test]
    fn trim_noop_when_remainder_too_small() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let bump_ptr = BumpAllocator::new(arena, 100).unwrap();
        let bump = unsafe { bump_ptr.as_ref() };
        bump.alloc(90).unwrap();
        let capacity_before = bump.capacity();
        bump.trim();
        assert_eq!(bump.capacity(), capacity_before);
    }

    #[test]
    fn trim_reclaims_space_as_new_tail() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let tail_before = arena.free_tail_bytes();
        let bump_ptr = BumpAllocator::new(arena, 2048).unwrap();
        let bump = unsafe { bump_ptr.as_ref() };
        bump.alloc(64).unwrap();
        bump.trim();
        assert!(arena.free_tail_bytes() > tail_before.saturating_sub(2048 + BlockHeader::SIZE));
    }

    #[test]
    fn free_returns_block_to_parent() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let before = arena.free_tail_bytes();
        let bump_ptr = BumpAllocator::new(arena, 256).unwrap();
        assert!(arena.free_tail_bytes() < before);
        BumpAllocator::free(bump_ptr);
        assert_eq!(arena.free_tail_bytes(), before);
    }
}
