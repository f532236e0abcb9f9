//! # segalloc - A segregated-fit dynamic memory allocator
//!
//! This crate provides a **segregated free-list allocator** for a
//! single-threaded host program. It combines three address-space
//! strategies:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                      ADDRESS SPACE STRATEGIES                        │
//!   │                                                                      │
//!   │  1. Static heap     fixed-size byte array, embedded at construction  │
//!   │  2. Sbrk growth     extends the static heap via the program break    │
//!   │  3. Mmap side path  large requests bypass the block layer entirely   │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Overview
//!
//! Small and medium allocations are carved out of blocks tagged with a
//! header and a footer (boundary tags), so a block's physical neighbors
//! can be found in O(1) without walking the whole heap. Free blocks are
//! kept in a fixed array of buckets segregated by size class, searched
//! first-fit:
//!
//! ```text
//!   Segregated free lists:
//!
//!   bucket[0] (<=32)  ──► [free] ──► [free] ──► NULL
//!   bucket[1] (<=64)  ──► NULL
//!   bucket[2] (<=128) ──► [free] ──► NULL
//!   bucket[3] (<=256) ──► NULL
//!   bucket[4] (<=512) ──► [free] ──► [free] ──► [free] ──► NULL
//!   bucket[5] (>512)  ──► NULL
//! ```
//!
//! When the static heap runs out of room, the heap-growth driver extends
//! it by advancing the program break with `sbrk(2)`. Because the static
//! heap may not be adjacent to other data in the process's address
//! space, the first such extension can land somewhere other than right
//! after the heap — opening a "gap" the allocator must never walk into:
//!
//! ```text
//!   static_start                          wavefront        static_end
//!        │                                     │                 │
//!        ▼                                     ▼                 ▼
//!        ┌─────────────────────────────────────┬─────────────────┐
//!        │           carved blocks              │   uncarved room  │
//!        └─────────────────────────────────────┴─────────────────┘
//!
//!   after a non-contiguous sbrk extension:
//!        static_start       gap_start    gap_end       wavefront   static_end
//!             │                  │           │              │           │
//!             ▼                  ▼           ▼              ▼           ▼
//!             ┌──────────────────┬───────────┬──────────────┬───────────┐
//!             │  static blocks   │    gap    │  sbrk blocks  │  uncarved │
//!             └──────────────────┴───────────┴──────────────┴───────────┘
//! ```
//!
//! Requests at or above [`mmap::LARGE_THRESHOLD`] skip all of the above:
//! they're mapped directly from the kernel and tracked in a small
//! side-registry purely for introspection.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - word-alignment macro
//!   ├── block      - boundary-tag header/footer layout, physical navigation
//!   ├── region     - static/gap/sbrk bounds and address validity
//!   ├── freelist   - segregated free-list buckets
//!   ├── mmap       - large-allocation side path + tracking registry
//!   └── heap       - Heap: the allocate/free façade, placement, coalescing,
//!                    heap-growth driver
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::Heap;
//!
//! let mut heap = Heap::new();
//!
//! unsafe {
//!     let ptr = heap.allocate(64) as *mut u64;
//!     assert!(!ptr.is_null());
//!
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!
//!     heap.free(ptr as *mut u8);
//! }
//! ```
//!
//! ## Features
//!
//! - **O(1) coalescing**: boundary tags let `free` merge with both
//!   physical neighbors without searching the heap.
//! - **Segregated first-fit**: six size-class buckets keep the common
//!   case fast; the search still spills into larger buckets since
//!   splitting and coalescing can misfile a block relative to its exact
//!   class.
//! - **Hybrid growth**: a small embedded heap for the common case,
//!   `sbrk` growth when it's exhausted, direct `mmap` for the rare large
//!   request.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; callers
//!   sharing a [`Heap`] across threads must serialize externally.
//! - **No realloc**: only `allocate`/`free` are provided.
//! - **Word alignment only**: no support for alignment classes stronger
//!   than one machine word.
//! - **Unix-only**: requires `libc` and `sbrk`/`mmap` (POSIX systems).
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory
//! management. `allocate` and `free` are `unsafe fn`: the caller must not
//! free a pointer that wasn't returned by `allocate` on the same `Heap`,
//! must not free the same pointer twice, and must not use memory after
//! freeing it.

pub mod align;
mod block;
mod freelist;
mod heap;
mod mmap;
mod region;

pub use heap::{Heap, STATIC_HEAP_BYTES};
pub use mmap::LARGE_THRESHOLD;
