//! Physical list & arena lookup — component B.
//!
//! Blocks form a singly-linked-forward, pointer-linked-backward chain
//! covering the arena's entire buffer: `next` is implicit (`addr + HEADER +
//! size`), `prev` is the explicit pointer stored in each header's word1.
//!
//! The tricky part is going the other way: recovering *which arena* a user
//! pointer belongs to, without the arena storing a registry of anything.
//! Two scenarios are handled (spec.md §4.B):
//!
//!  1. **Canonical offset** — the allocation had no alignment padding, so
//!     the block header sits immediately at `user_ptr - HEADER_SIZE`, and
//!     the word immediately before `user_ptr` *is* that header's own magic
//!     word (`SENTINEL ^ user_ptr`).
//!  2. **Padded** — alignment pushed the payload forward. The word
//!     immediately before `user_ptr` is not the header's magic field (it
//!     sits in the padding gap instead); it holds `block_addr ^ user_ptr`,
//!     an XOR-linked back-pointer to the real header, whose own magic word
//!     is checked independently once recovered.
//!
//! Either way, a genuine block's own header is re-validated via
//! `valid_magic` before it's trusted — this is what rejects pointers that
//! never came from this allocator.

use core::mem;
use core::ptr::NonNull;

use crate::arena::Arena;
use crate::block::Block;
use crate::config::{NESTED_BIT, SENTINEL};
use crate::error::ArenaError;

/// Address one past `block`, ignoring arena bounds.
pub(crate) fn next_unsafe(block: Block) -> usize {
    block.addr() + crate::header::BlockHeader::SIZE + block.size()
}

/// The block physically following `block` in `arena`, or `None` if `block`
/// is the arena's tail.
pub(crate) fn next(arena: &Arena, block: Block) -> Option<Block> {
    if block == arena.tail() {
        return None;
    }
    let addr = next_unsafe(block);
    if addr < arena.data_end() {
        Some(unsafe { Block::from_addr(addr) })
    } else {
        None
    }
}

/// Decodes `user_ptr` back to the block header it was carved from and
/// checks its magic word, without regard to whether the block is still
/// occupied. Returns `None` for a pointer that was never issued by this
/// allocator at all.
fn decode_block(user_ptr: NonNull<u8>) -> Option<Block> {
    let addr = user_ptr.as_ptr() as usize;
    let word_sz = mem::size_of::<usize>();
    if addr < word_sz || addr % word_sz != 0 {
        return None;
    }
    let word_before = unsafe { core::ptr::read_unaligned((addr - word_sz) as *const usize) };

    let candidate_addr = if word_before ^ addr == SENTINEL {
        addr.checked_sub(crate::header::BlockHeader::SIZE)?
    } else {
        let decoded = word_before ^ addr;
        if decoded == 0 || decoded % word_sz != 0 {
            return None;
        }
        decoded
    };

    let block = unsafe { Block::from_addr(candidate_addr) };
    if !block.valid_magic(user_ptr) {
        return None;
    }
    Some(block)
}

/// Recovers the block header owning `user_ptr`, validating its magic word.
/// Returns `None` for any pointer that doesn't decode to a live, occupied
/// block — including pointers never issued by this allocator.
pub(crate) fn recover_block(user_ptr: NonNull<u8>) -> Option<Block> {
    let block = decode_block(user_ptr)?;
    if block.is_free() {
        return None;
    }
    Some(block)
}

/// Like `recover_block`, but distinguishes a pointer this allocator never
/// issued (`UnknownPointer`) from one that decodes to a genuine, already-
/// free block (`DoubleFree`) — used by `free_block` so the two cases log
/// differently.
pub(crate) fn recover_block_for_free(user_ptr: NonNull<u8>) -> Result<Block, ArenaError> {
    let block = decode_block(user_ptr).ok_or(ArenaError::UnknownPointer)?;
    if block.is_free() {
        return Err(ArenaError::DoubleFree);
    }
    Ok(block)
}

/// Finds the `Arena` owning `block`, an occupied block known to be valid
/// (typically the output of `recover_block`, or a block the allocator
/// itself just created). Handles the case where `block` is actually
/// another arena's header, nested inside this one and thus "occupied" as
/// far as the outer physical list is concerned (spec.md §4.B).
pub(crate) fn arena_for_block(block: Block) -> NonNull<Arena> {
    let mut current = block;
    loop {
        let w2 = current.header().w2();
        let nested_tag = w2 & NESTED_BIT != 0;
        if !current.is_free() && !nested_tag {
            return unsafe { NonNull::new_unchecked(w2 as *mut Arena) };
        }
        match current.prev() {
            Some(p) => current = p,
            None => return Arena::from_first_block(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ALIGNMENT;

    fn aligned_buf(size: usize) -> Vec<u8> {
        let mut v = vec![0u8; size + DEFAULT_ALIGNMENT];
        let misalign = v.as_ptr() as usize % DEFAULT_ALIGNMENT;
        if misalign != 0 {
            v.drain(0..(DEFAULT_ALIGNMENT - misalign));
        }
        v.truncate(size);
        v
    }

    #[test]
    fn recover_block_rejects_foreign_pointer() {
        let garbage = 0x1000usize as *mut u8;
        let ptr = unsafe { NonNull::new_unchecked(garbage) };
        assert!(recover_block(ptr).is_none());
    }

    #[test]
    fn next_returns_none_at_tail() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let tail = arena.tail();
        assert!(next(arena, tail).is_none());
    }

    #[test]
    fn canonical_allocation_round_trips_through_recover_block() {
        let mut buf = aligned_buf(4096);
        let arena = Arena::new_static(&mut buf).unwrap();
        let user_ptr = arena.alloc(64).expect("alloc should succeed");
        let block = recover_block(user_ptr).expect("should recover the block");
        assert!(!block.is_free());
        let owner = arena_for_block(block);
        assert_eq!(owner.as_ptr() as usize, arena.addr());
    }
}
