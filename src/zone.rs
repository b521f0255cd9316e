use std::{mem, ptr::NonNull};

use log::debug;

use crate::{
  align,
  block::{BLOCK_OVERHEAD, Block, HEADER_SIZE, TAIL_SIZE},
  error::AllocError,
  free_list::FreeLists,
  pages::PageSource,
  tag::BlockTag,
};

/// Ring linkage at the start of every zone.
#[repr(C)]
struct ZoneLinks {
  next: NonNull<ZoneLinks>,
  prev: NonNull<ZoneLinks>,
}

/// Offset of the first payload. The bytes just before its header form the
/// front guard, a tail that never reads as free.
pub const FIRST_PAYLOAD: usize = align!(mem::size_of::<ZoneLinks>() + BLOCK_OVERHEAD);
/// The end sentinel occupies the slot a following block header would use.
pub const SENTINEL_SIZE: usize = HEADER_SIZE;
/// Bytes of a zone that no payload can use.
pub const ZONE_OVERHEAD: usize = FIRST_PAYLOAD + TAIL_SIZE + SENTINEL_SIZE;

/// The zone manager.
///
/// ```text
///   ┌───────────┬───────┬────────┬───────────────────────────┬──────┬──────────┐
///   │ next/prev │ guard │ header │   payload (capacity)      │ tail │ sentinel │
///   └───────────┴───────┴────────┴───────────────────────────┴──────┴──────────┘
///   0                            FIRST_PAYLOAD                         zone_size
/// ```
///
/// Zones are never handed back while the allocator is alive; every zone
/// acquired stays in the ring until [`Zones::release_all`].
pub(crate) struct Zones {
  ring: Option<NonNull<ZoneLinks>>,
  count: usize,
  zone_size: usize,
}

impl Zones {
  pub fn new(zone_size: usize) -> Self {
    Self {
      ring: None,
      count: 0,
      zone_size,
    }
  }

  /// Largest payload a block in one of these zones can have.
  pub fn capacity(&self) -> usize {
    self.zone_size - ZONE_OVERHEAD
  }

  pub fn count(&self) -> usize {
    self.count
  }

  /// Maps a new zone, fills it with one free block and hands that block to
  /// `free_lists`.
  pub fn acquire(
    &mut self,
    pages: &mut impl PageSource,
    free_lists: &mut FreeLists,
  ) -> Result<(), AllocError> {
    let base = pages.map(self.zone_size)?;
    let zone = base.cast::<ZoneLinks>();

    unsafe {
      match self.ring {
        None => zone.write(ZoneLinks {
          next: zone,
          prev: zone,
        }),
        Some(head) => {
          let last = (*head.as_ptr()).prev;
          zone.write(ZoneLinks { next: head, prev: last });
          (*head.as_ptr()).prev = zone;
          (*last.as_ptr()).next = zone;
        }
      }

      let start = base.as_ptr();
      BlockTag::new(0, false).write(start.add(FIRST_PAYLOAD - BLOCK_OVERHEAD));
      BlockTag::new(0, true).write(start.add(self.zone_size - BlockTag::BYTES));

      let block = Block::from_payload(base.add(FIRST_PAYLOAD));
      block.retag(self.capacity(), true);
      free_lists.insert(block);
    }

    self.ring = Some(zone);
    self.count += 1;

    debug!("acquired zone #{} at {base:?} ({} bytes)", self.count, self.zone_size);

    Ok(())
  }

  /// Unmaps every zone.
  ///
  /// # Safety
  ///
  /// No block inside any zone may be used afterwards, and the free lists
  /// referring to them must be discarded.
  pub unsafe fn release_all(
    &mut self,
    pages: &mut impl PageSource,
  ) {
    let Some(head) = self.ring.take() else {
      return;
    };

    let mut current = head;
    loop {
      let next = unsafe { (*current.as_ptr()).next };
      unsafe { pages.unmap(current.cast(), self.zone_size) };

      if next == head {
        break;
      }
      current = next;
    }

    debug!("released {} zones", self.count);
    self.count = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::AllocatorConfig, pages::LimitedPages};

  #[test]
  fn test_layout_constants() {
    assert_eq!(FIRST_PAYLOAD % 8, 0);
    assert!(FIRST_PAYLOAD >= mem::size_of::<ZoneLinks>() + BLOCK_OVERHEAD);
    assert_eq!(Zones::new(AllocatorConfig::default().zone_size).capacity(), 32767 - ZONE_OVERHEAD);
  }

  #[test]
  fn test_acquire_seeds_one_free_block() {
    let mut pages = LimitedPages::new(4);
    let mut zones = Zones::new(4096);
    let mut lists = FreeLists::new();

    zones.acquire(&mut pages, &mut lists).unwrap();
    zones.acquire(&mut pages, &mut lists).unwrap();
    zones.acquire(&mut pages, &mut lists).unwrap();

    assert_eq!(zones.count(), 3);
    assert_eq!(lists.free_blocks(), 3);

    unsafe {
      let block = lists.allocate(zones.capacity()).unwrap();
      assert_eq!(block.size(), zones.capacity());
      assert_eq!(block.next_in_zone(), None);
      assert_eq!(block.prev_if_free(), None);

      zones.release_all(&mut pages);
    }

    assert_eq!(zones.count(), 0);
    assert_eq!(pages.live, 0);
  }

  #[test]
  fn test_acquire_failure_changes_nothing() {
    let mut pages = LimitedPages::new(0);
    let mut zones = Zones::new(4096);
    let mut lists = FreeLists::new();

    assert_eq!(
      zones.acquire(&mut pages, &mut lists),
      Err(AllocError::OutOfMemory { len: 4096 })
    );
    assert_eq!(zones.count(), 0);
    assert_eq!(lists.free_blocks(), 0);
  }
}
