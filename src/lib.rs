//! # rallocator - A Region/Arena Memory Allocator
//!
//! This crate provides a general-purpose region allocator that carves user
//! allocations out of a single contiguous byte buffer. Three allocation
//! disciplines share that one buffer:
//!
//! - a **free-list allocator** with best-fit reuse and coalescing, backed
//!   by a left-leaning red-black tree keyed on `(size, alignment quality,
//!   address)`;
//! - a **bump sub-allocator** carved out of one block, for callers that
//!   just want to push a pointer forward and free the whole region at
//!   once;
//! - **nested arenas**: a full arena, identical in every respect to a
//!   top-level one, living inside a single block of its parent.
//!
//! ## Crate structure
//!
//! ```text
//!   rallocator
//!   ├── header   - the four-word layout shared by every header (component A)
//!   ├── block    - the physical-list view of a header: occupied or free
//!   ├── list     - physical-list walking + user-pointer → arena recovery (B)
//!   ├── tree     - the LLRB free tree (component C)
//!   ├── alloc    - alloc/free/coalesce on top of block + tree (component D)
//!   ├── arena    - the Arena type and its lifecycle
//!   ├── bump     - BumpAllocator, a linear sub-allocator over one block
//!   ├── nested   - nested arenas
//!   ├── config   - compile-time knobs (MIN_BUFFER_SIZE, DEFAULT_ALIGNMENT, ...)
//!   ├── error    - internal-only rejection reasons, never exposed publicly
//!   └── util     - address arithmetic shared across components
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rallocator::Arena;
//!
//! let mut buf = [0u8; 4096];
//! let arena = Arena::new_static(&mut buf).unwrap();
//!
//! let ptr = arena.alloc(64).unwrap();
//! unsafe { *(ptr.as_ptr() as *mut u64) = 42 };
//!
//! rallocator::free_block(ptr);
//! ```
//!
//! ## Concurrency and safety
//!
//! Single-threaded, no internal synchronization — callers serialize their
//! own access. Every public entry point returns `Option`/`()` rather than
//! panicking on bad input; assertions are reserved for internal invariant
//! violations that would indicate a real bug in the allocator itself, never
//! for user-input errors. The allocator never grows or shrinks a host
//! allocation after a dynamic arena is created; `new_dynamic`/`free` are
//! the only calls that cross into the host allocator.

mod alloc;
mod arena;
mod block;
mod bump;
mod config;
mod error;
mod header;
mod list;
mod nested;
mod tree;
mod util;

pub use alloc::free_block;
pub use arena::{Arena, MAX_ALIGNMENT, MIN_ALIGNMENT};
pub use bump::BumpAllocator;
pub use config::{DEFAULT_ALIGNMENT, MIN_BUFFER_SIZE, SENTINEL};
