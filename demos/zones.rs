use std::ptr::NonNull;

use zonealloc::ZoneAllocator;

/// Prints where an allocation landed and how many bytes it can hold.
unsafe fn print_alloc(
  allocator: &ZoneAllocator,
  label: &str,
  address: *mut u8,
) {
  let usable = match NonNull::new(address) {
    Some(payload) => unsafe { allocator.usable_size(payload) },
    None => 0,
  };

  println!(
    "[{label}] address = {address:?}, usable = {usable} bytes, zones = {}, large objects = {}",
    allocator.zone_count(),
    allocator.large_count(),
  );
}

fn main() {
  // RUST_LOG=debug shows zone acquisition and large mappings.
  env_logger::init();

  let mut allocator = ZoneAllocator::new();
  println!("zone capacity = {} bytes", allocator.zone_capacity());

  unsafe {
    // --------------------------------------------------------------------
    // 1) A small request. The first one maps a zone and splits its single
    //    free block.
    // --------------------------------------------------------------------
    let first = allocator.allocate(4);
    print_alloc(&allocator, "1 small", first);
    first.cast::<u32>().write(0xDEADBEEF);

    // --------------------------------------------------------------------
    // 2) Two neighbours, so that freeing the middle one has something to
    //    merge with.
    // --------------------------------------------------------------------
    let second = allocator.allocate(100);
    let third = allocator.allocate(300);
    print_alloc(&allocator, "2 neighbour", second);
    print_alloc(&allocator, "2 neighbour", third);

    // --------------------------------------------------------------------
    // 3) Free the middle block, then ask for something that fits it.
    // --------------------------------------------------------------------
    allocator.deallocate(second);
    let reused = allocator.allocate(96);
    print_alloc(&allocator, "3 reuse", reused);
    println!("[3] reused the freed block? {}", reused == second);

    // --------------------------------------------------------------------
    // 4) Zeroed memory, served from the same zone.
    // --------------------------------------------------------------------
    let zeroed = allocator.allocate_zeroed(16, 8);
    print_alloc(&allocator, "4 zeroed", zeroed);

    // --------------------------------------------------------------------
    // 5) Grow past the zone capacity. The contents move to a mapping of
    //    their own.
    // --------------------------------------------------------------------
    let grown = allocator.resize(third, 64 * 1024);
    print_alloc(&allocator, "5 grown", grown);

    // --------------------------------------------------------------------
    // 6) Shrink it back down. Less than half of the old size, so it moves
    //    into a zone again.
    // --------------------------------------------------------------------
    let shrunk = allocator.resize(grown, 256);
    print_alloc(&allocator, "6 shrunk", shrunk);

    // --------------------------------------------------------------------
    // 7) Free everything. The zone stays mapped until the allocator is
    //    dropped.
    // --------------------------------------------------------------------
    for address in [first, reused, zeroed, shrunk] {
      allocator.deallocate(address);
    }
    println!("\n[7] zones still mapped = {}", allocator.zone_count());
  }
}
