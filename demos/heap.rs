use std::io::Read;

use segalloc::Heap;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how allocations change the
/// program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() {
  let mut heap = Heap::new();

  unsafe {
    println!("[start] {}", heap.describe());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u32.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(4);
    println!("\n[1] Allocate u32, got {:?}", first_block);

    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes to see an "odd-sized" request rounded up.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(12);
    println!("\n[2] Allocate 12 bytes, got {:?}", second_block);
    std::ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate a u64 and look at the bucket it lands in.
    // --------------------------------------------------------------------
    let third_block = heap.allocate(8);
    println!("\n[3] Allocate u64, got {:?}", third_block);
    let third_ptr = third_block as *mut u64;
    third_ptr.write(0x1122334455667788);
    println!("[3] Value written = 0x{:X}", third_ptr.read());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Free the first block, then allocate something small enough to
    //    reuse it.
    // --------------------------------------------------------------------
    heap.free(first_block);
    println!("\n[4] Freed first_block at {:?}", first_block);

    let fourth_block = heap.allocate(2);
    println!(
      "[4] Allocate 2 bytes: reused first_block? {}",
      fourth_block == first_block
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate a large block to trigger the mmap side path, observable
    //    because it lands outside the static heap bounds printed above.
    // --------------------------------------------------------------------
    let big_block = heap.allocate(256 * 1024);
    println!("\n[5] Allocate large 256 KiB block, got {:?}", big_block);
    std::ptr::write_bytes(big_block, b'X', 256 * 1024);
    println!("[5] Wrote 256 KiB of 'X'");
    heap.free(big_block);

    println!("\n[end] {}", heap.describe());
    println!("End of demo. Process will exit and the OS will reclaim all memory.");
  }
}
