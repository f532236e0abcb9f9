//! The allocator itself: static-heap storage, placement, coalescing, and
//! the heap-growth driver, wired together behind the `allocate`/`free`
//! façade.
//!
//! ```text
//!   allocate(n)
//!       │
//!       ├─ n == 0 ───────────────────────────────────────────► null
//!       │
//!       ├─ aligned(n) >= LARGE_THRESHOLD ───────────────────► mmap::allocate
//!       │
//!       └─ find_fit ──► split ──► done
//!            │
//!            └─ no fit, room at wavefront ──► carve ──► done
//!                 │
//!                 └─ no room ──► grow (sbrk) ──► carve ──► done
//! ```

use std::cell::Cell;
use std::mem;
use std::ptr;

use crate::align;
use crate::block::{self, Block, MIN_BLOCK_SIZE, WORD};
use crate::freelist::{self, FreeList};
use crate::mmap::{self, LargeRegistry, LARGE_THRESHOLD};
use crate::region::Region;

/// Size of the embedded static heap array.
pub const STATIC_HEAP_BYTES: usize = 4096;

/// A single-threaded, segregated-fit dynamic memory allocator.
///
/// Combines a fixed-size embedded heap, sbrk-driven growth of that heap,
/// and a direct-mmap path for large requests. See the module docs for
/// the high-level allocation path.
///
/// The static heap lives in a [`Box`] rather than inline in this struct:
/// that gives it a stable address for its entire lifetime regardless of
/// where the `Heap` value itself is moved, which the boundary-tag
/// pointers stored in [`Region`] depend on. A `Heap` must not be
/// reconstructed or memcpy'd around after its first `allocate` call for
/// the same reason any address-sensitive structure can't: outstanding
/// payload pointers would otherwise point into memory whose owner no
/// longer exists.
pub struct Heap {
  storage: Box<[u8; STATIC_HEAP_BYTES]>,
  region: Region,
  free_list: FreeList,
  large_registry: LargeRegistry,
  page_size: Cell<usize>,
}

impl Heap {
  pub fn new() -> Self {
    let mut storage = Box::new([0u8; STATIC_HEAP_BYTES]);
    let start = storage.as_mut_ptr();
    let end = unsafe { start.add(STATIC_HEAP_BYTES) };

    Self {
      storage,
      region: Region::new(start, end),
      free_list: FreeList::new(),
      large_registry: LargeRegistry::new(),
      page_size: Cell::new(0),
    }
  }

  /// Cached `sysconf(_SC_PAGESIZE)`, falling back to 4096 if the syscall
  /// fails.
  fn page_size(&self) -> usize {
    let cached = self.page_size.get();
    if cached != 0 {
      return cached;
    }

    let queried = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let resolved = if queried > 0 { queried as usize } else { 4096 };
    self.page_size.set(resolved);
    resolved
  }

  /// Returns either null or a word-aligned pointer to at least `n`
  /// usable bytes.
  pub unsafe fn allocate(&mut self, n: usize) -> *mut u8 {
    if n == 0 {
      return ptr::null_mut();
    }

    let aligned = align!(n);

    if aligned >= LARGE_THRESHOLD {
      let page = self.page_size();
      return unsafe { mmap::allocate(&mut self.large_registry, page, aligned) };
    }

    let mut total = WORD + aligned + WORD;
    if total < MIN_BLOCK_SIZE {
      total = MIN_BLOCK_SIZE;
    }

    if let Some(block) = self.find_fit(total) {
      unsafe {
        self.free_list.remove(block);
        self.split(block, total);
        return block::payload(block);
      }
    }

    if (self.region.wavefront as usize) + total <= self.region.static_end as usize {
      return unsafe { self.carve_at_wavefront(total) };
    }

    unsafe { self.grow(total) }
  }

  /// Accepts null (no-op), or a pointer previously returned by
  /// `allocate` on this heap and not yet freed.
  pub unsafe fn free(&mut self, p: *mut u8) {
    if p.is_null() {
      return;
    }

    let block = unsafe { block::block_of(p) };

    if unsafe { block::large(block) } {
      unsafe { mmap::free(&mut self.large_registry, block) };
      return;
    }

    unsafe {
      let sz = block::size(block);
      block::setup(block, sz, false);
      let merged = self.coalesce(block);
      self.free_list.insert(merged);
    }
  }

  /// First-fit search starting at the bucket matching `total`, spilling
  /// into larger buckets since splitting/coalescing can misfile a block
  /// relative to its exact size class.
  fn find_fit(&self, total: usize) -> Option<*mut Block> {
    let start = freelist::bucket(total);
    for idx in start..self.free_list.bucket_count() {
      let mut current = self.free_list.head(idx);
      while !current.is_null() {
        if unsafe { block::size(current) } >= total {
          return Some(current);
        }
        current = unsafe { block::next_free(current) };
      }
    }
    None
  }

  /// Carves `need` bytes off the front of `block` if the remainder would
  /// still meet [`MIN_BLOCK_SIZE`]; otherwise leaves `block` unsplit and
  /// accepts the slack. Either way `block` ends up marked in-use.
  fn split(&mut self, block: *mut Block, need: usize) {
    unsafe {
      let current_size = block::size(block);

      if current_size >= need + MIN_BLOCK_SIZE {
        block::setup(block, need, true);

        let tail = (block as *mut u8).add(need) as *mut Block;
        block::setup(tail, current_size - need, false);
        self.free_list.insert(tail);
      } else {
        block::setup(block, current_size, true);
      }
    }
  }

  /// Carves a fresh block of exactly `total` bytes at the wavefront.
  /// Caller must have already verified there's room before `static_end`.
  unsafe fn carve_at_wavefront(&mut self, total: usize) -> *mut u8 {
    unsafe {
      let block = self.region.wavefront as *mut Block;
      block::setup(block, total, true);
      self.region.wavefront = self.region.wavefront.add(total);
      block::payload(block)
    }
  }

  /// Merges a just-freed block with whichever physical neighbors are
  /// also free, never stepping outside the owned region or into the
  /// gap. Returns the (possibly different) address the merged block now
  /// lives at; the caller must use this pointer, not the original, for
  /// reinsertion into the free-list index.
  unsafe fn coalesce(&mut self, block: *mut Block) -> *mut Block {
    let mut working = block;
    let mut new_size = unsafe { block::size(working) };

    let next = unsafe { block::next_physical(working) };
    if self.region.valid_heap_address(next as *const u8) && !unsafe { block::used(next) } {
      unsafe { self.free_list.remove(next) };
      new_size += unsafe { block::size(next) };
    }

    if !self.region.at_region_start(working as *const u8) {
      let prev_footer_addr = unsafe { (working as *mut u8).sub(WORD) };

      if self.region.valid_heap_address(prev_footer_addr as *const u8) {
        let prev = unsafe { block::prev_physical(working) };

        if self.region.valid_heap_address(prev as *const u8) && !unsafe { block::used(prev) } {
          unsafe { self.free_list.remove(prev) };
          new_size += unsafe { block::size(prev) };
          working = prev;
        }
      }
    }

    unsafe { block::setup(working, new_size, false) };
    working
  }

  /// Heap-growth driver: advances the program break, page-rounded, and
  /// carves `total` bytes out of the newly-won space. If the break comes
  /// back non-contiguous with the current `static_end`, opens the gap
  /// (at most once in the lifetime of this heap — a second non-
  /// contiguous growth is a precondition violation, not a case this
  /// function recovers from).
  unsafe fn grow(&mut self, total: usize) -> *mut u8 {
    let page = self.page_size();

    let mut size_to_alloc = total;
    if size_to_alloc < page {
      size_to_alloc = page;
    }
    let sbrk_size = (size_to_alloc + page - 1) & !(page - 1);

    let request = unsafe { libc::sbrk(sbrk_size as libc::intptr_t) };
    if request == usize::MAX as *mut libc::c_void {
      return ptr::null_mut();
    }
    let request = request as *mut u8;

    if request == self.region.static_end {
      self.region.static_end = unsafe { self.region.static_end.add(sbrk_size) };
    } else {
      debug_assert!(
        self.region.gap_start.is_none(),
        "second non-contiguous heap growth; the gap model only supports one gap"
      );

      let slack = self.region.static_end as usize - self.region.wavefront as usize;

      if slack >= MIN_BLOCK_SIZE {
        unsafe {
          let rest = self.region.wavefront as *mut Block;
          block::setup(rest, slack, false);
          self.free_list.insert(rest);
        }
        self.region.gap_start = Some(self.region.static_end);
      } else {
        self.region.gap_start = Some(self.region.wavefront);
      }

      self.region.gap_end = Some(request);
      self.region.wavefront = request;
      self.region.static_end = unsafe { request.add(sbrk_size) };
    }

    unsafe { self.carve_at_wavefront(total) }
  }

  /// Inert inspection helper: a snapshot of region bounds, gap state,
  /// free-list bucket occupancy, and live large mappings. Never called
  /// by `allocate`/`free`.
  pub fn describe(&self) -> String {
    let mut out = String::new();
    out.push_str(&format!(
      "static heap: {} bytes at {:?}\n",
      self.storage.len(),
      self.storage.as_ptr(),
    ));
    out.push_str(&format!(
      "static_start={:?} wavefront={:?} static_end={:?}\n",
      self.region.static_start, self.region.wavefront, self.region.static_end,
    ));
    match (self.region.gap_start, self.region.gap_end) {
      (Some(s), Some(e)) => out.push_str(&format!("gap: [{:?}, {:?})\n", s, e)),
      _ => out.push_str("gap: none\n"),
    }
    for idx in 0..self.free_list.bucket_count() {
      let mut count = 0usize;
      let mut current = self.free_list.head(idx);
      while !current.is_null() {
        count += 1;
        current = unsafe { block::next_free(current) };
      }
      out.push_str(&format!("bucket[{idx}]: {count} free block(s)\n"));
    }
    out.push_str(&format!("large mappings: {}\n", self.large_registry.iter().count()));
    out
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn is_aligned(p: *mut u8) -> bool {
    (p as usize) % WORD == 0
  }

  #[test]
  fn zero_and_null() {
    let mut heap = Heap::new();
    unsafe {
      assert!(heap.allocate(0).is_null());
      heap.free(ptr::null_mut()); // must not panic
    }
  }

  #[test]
  fn allocate_write_free_three_blocks() {
    let mut heap = Heap::new();
    unsafe {
      let a = heap.allocate(32);
      let b = heap.allocate(64);
      let c = heap.allocate(128);
      assert!(!a.is_null() && !b.is_null() && !c.is_null());

      ptr::write_bytes(a, 0x11, 32);
      ptr::write_bytes(b, 0x22, 64);
      ptr::write_bytes(c, 0x33, 128);

      assert_eq!(*a, 0x11);
      assert_eq!(*b, 0x22);
      assert_eq!(*c, 0x33);

      heap.free(a);
      heap.free(b);
      heap.free(c);
    }
  }

  #[test]
  fn exact_reuse() {
    let mut heap = Heap::new();
    unsafe {
      let p1 = heap.allocate(64);
      assert!(!p1.is_null());
      heap.free(p1);
      let p2 = heap.allocate(64);
      assert_eq!(p1, p2);
    }
  }

  #[test]
  fn triple_coalesce() {
    let mut heap = Heap::new();
    let int_size = mem::size_of::<i32>();
    unsafe {
      let p1 = heap.allocate(int_size);
      let p2 = heap.allocate(int_size);
      let p3 = heap.allocate(int_size);
      assert!(!p1.is_null() && !p2.is_null() && !p3.is_null());

      heap.free(p1);
      heap.free(p3);
      heap.free(p2);

      let p4 = heap.allocate(3 * int_size);
      assert_eq!(p4, p1);

      ptr::write_bytes(p4, 0x7A, 3 * int_size);
      for i in 0..(3 * int_size) {
        assert_eq!(*p4.add(i), 0x7A);
      }
    }
  }

  #[test]
  fn allocations_are_word_aligned() {
    let mut heap = Heap::new();
    unsafe {
      for sz in [1usize, 2, 3, 7, 8, 9, 63, 64, 65, 1000] {
        let p = heap.allocate(sz);
        assert!(!p.is_null());
        assert!(is_aligned(p), "allocate({sz}) returned misaligned {p:?}");
      }
    }
  }

  #[test]
  fn allocations_do_not_overlap() {
    let mut heap = Heap::new();
    unsafe {
      let sizes = [16usize, 48, 96, 200, 500];
      let mut ptrs = Vec::new();
      for &sz in &sizes {
        let p = heap.allocate(sz);
        assert!(!p.is_null());
        ptrs.push((p as usize, sz));
      }

      for i in 0..ptrs.len() {
        for j in (i + 1)..ptrs.len() {
          let (a_start, a_len) = ptrs[i];
          let (b_start, b_len) = ptrs[j];
          let disjoint = a_start + a_len <= b_start || b_start + b_len <= a_start;
          assert!(disjoint, "allocations {i} and {j} overlap");
        }
      }
    }
  }

  #[test]
  fn splitting_never_creates_undersized_blocks() {
    let mut heap = Heap::new();
    unsafe {
      // Allocate a big block, free it, then allocate something much
      // smaller out of it so the tail has to be split off.
      let big = heap.allocate(400);
      heap.free(big);
      let small = heap.allocate(8);
      assert!(!small.is_null());

      let small_block = block::block_of(small);
      assert!(block::size(small_block) >= MIN_BLOCK_SIZE);
    }
  }

  #[test]
  fn large_path_is_isolated_from_the_static_heap() {
    let mut heap = Heap::new();
    unsafe {
      let p = heap.allocate(256 * 1024);
      assert!(!p.is_null());

      ptr::write_bytes(p, b'X', 256 * 1024);
      assert_eq!(*p, b'X');

      let start = heap.region.static_start as usize;
      let end = heap.region.static_end as usize;
      let addr = p as usize;
      assert!(addr < start || addr >= end);

      heap.free(p);
    }
  }

  #[test]
  fn small_path_stays_inside_owned_region() {
    let mut heap = Heap::new();
    unsafe {
      let p = heap.allocate(64);
      assert!(!p.is_null());
      let addr = p as usize;
      let start = heap.region.static_start as usize;
      let end = heap.region.static_end as usize;
      assert!(addr >= start && addr < end);
    }
  }

  #[test]
  fn growth_via_sbrk_survives_seventy_interleaved_allocations() {
    let mut heap = Heap::new();
    let mut ptrs: Vec<*mut u8> = Vec::with_capacity(70);

    unsafe {
      for _ in 0..70 {
        let p = heap.allocate(100);
        assert!(!p.is_null());
        ptrs.push(p);
      }

      for (i, &p) in ptrs.iter().enumerate() {
        if i % 2 == 0 {
          heap.free(p);
        }
      }
      for (i, &p) in ptrs.iter().enumerate() {
        if i % 2 == 1 {
          heap.free(p);
        }
      }
    }
  }

  #[test]
  fn describe_does_not_panic_across_states() {
    let mut heap = Heap::new();
    let _ = heap.describe();
    unsafe {
      let p = heap.allocate(64);
      let _ = heap.describe();
      heap.free(p);
      let _ = heap.describe();
    }
  }
}
