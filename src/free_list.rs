//! Segregated free lists and the block-level allocation algorithm.
//!
//! Free blocks are kept in [`BUCKETS`] circular doubly linked rings. A block
//! of size `s` lives in bucket `floor(log2(s))`, so every block in bucket `k`
//! is at least `2^k` bytes.
//!
//! ```text
//!   bucket  4 [16, 32)     ──▶ (a) ◀──▶ (b) ◀──▶ (c) ──┐
//!   bucket  5 [32, 64)          ▲                      │
//!   ...                         └──────────────────────┘
//!   bucket 14 [16K, 32K)   ──▶ (z)  (a singleton links to itself)
//! ```

use log::trace;

use crate::block::{BLOCK_OVERHEAD, Block, MIN_FREE_BLOCK};

pub const BUCKETS: usize = 16;

/// Size class of `size`: the position of its highest set bit, clamped to the
/// last bucket.
pub fn bucket_index(size: usize) -> usize {
  debug_assert!(size > 0);

  let highest = (usize::BITS - 1 - size.leading_zeros()) as usize;
  highest.min(BUCKETS - 1)
}

pub(crate) struct FreeLists {
  heads: [Option<Block>; BUCKETS],
}

impl FreeLists {
  pub fn new() -> Self {
    Self {
      heads: [None; BUCKETS],
    }
  }

  /// Pushes `block` onto the head of its bucket's ring.
  pub unsafe fn insert(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let bucket = bucket_index(block.size());

      match self.heads[bucket] {
        None => block.set_links(block, block),
        Some(head) => {
          let last = head.links().prev;
          block.set_links(head, last);
          head.set_prev(block);
          last.set_next(block);
        }
      }

      self.heads[bucket] = Some(block);
    }
  }

  /// Unlinks `block` from the bucket its size places it in.
  pub unsafe fn remove(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let bucket = bucket_index(block.size());
      let links = block.links();

      if links.next == block {
        self.heads[bucket] = None;
        return;
      }

      links.next.set_prev(links.prev);
      links.prev.set_next(links.next);

      if self.heads[bucket] == Some(block) {
        self.heads[bucket] = Some(links.next);
      }
    }
  }

  /// Removes and returns a free block of at least `size` bytes.
  ///
  /// Within the request's own class sizes overlap the request, so that ring
  /// is searched for the first fit. Any higher class fits by construction and
  /// hands out its head.
  unsafe fn take(
    &mut self,
    size: usize,
  ) -> Option<Block> {
    unsafe {
      let bucket = bucket_index(size);

      if let Some(head) = self.heads[bucket] {
        let mut current = head;
        loop {
          if current.size() >= size {
            self.remove(current);
            return Some(current);
          }

          current = current.links().next;
          if current == head {
            break;
          }
        }
      }

      let head = self.heads[bucket + 1..].iter().find_map(|head| *head)?;
      self.remove(head);
      Some(head)
    }
  }

  /// Allocates a block with a payload of at least `size` bytes, splitting off
  /// the remainder when it can stand as a free block of its own.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> Option<Block> {
    unsafe {
      let block = self.take(size)?;
      let available = block.size();
      let mut taken = available;

      if available - size >= MIN_FREE_BLOCK {
        let rest = Block::from_payload(block.payload().add(size + BLOCK_OVERHEAD));
        let rest_size = available - size - BLOCK_OVERHEAD;

        trace!("split {available} byte block into {size} + {rest_size}");

        rest.retag(rest_size, true);
        self.insert(rest);
        taken = size;
      }

      block.retag(taken, false);
      Some(block)
    }
  }

  /// Returns `block` to the free lists, merging it with a free successor and
  /// then a free predecessor.
  pub unsafe fn release(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let mut block = block;
      let mut size = block.size();

      if let Some(next) = block.next_in_zone() {
        if next.is_free() {
          self.remove(next);
          size += BLOCK_OVERHEAD + next.size();
          trace!("merged with next block, now {size} bytes");
        }
      }

      if let Some(prev) = block.prev_if_free() {
        self.remove(prev);
        size += BLOCK_OVERHEAD + prev.size();
        block = prev;
        trace!("merged with previous block, now {size} bytes");
      }

      block.retag(size, true);
      self.insert(block);
    }
  }

  #[cfg(test)]
  pub fn bucket_len(
    &self,
    bucket: usize,
  ) -> usize {
    let Some(head) = self.heads[bucket] else {
      return 0;
    };

    let mut len = 1;
    let mut current = unsafe { head.links().next };
    while current != head {
      len += 1;
      current = unsafe { current.links().next };
    }

    len
  }

  #[cfg(test)]
  pub fn free_blocks(&self) -> usize {
    (0..BUCKETS).map(|bucket| self.bucket_len(bucket)).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::AllocatorConfig,
    pages::{MmapPages, PageSource},
    zone::Zones,
  };

  fn zone_with_lists() -> (Zones, FreeLists, MmapPages) {
    let mut pages = MmapPages::new();
    let mut zones = Zones::new(AllocatorConfig::default().zone_size);
    let mut lists = FreeLists::new();

    zones.acquire(&mut pages, &mut lists).unwrap();

    (zones, lists, pages)
  }

  fn release_all(
    zones: &mut Zones,
    pages: &mut impl PageSource,
  ) {
    unsafe { zones.release_all(pages) }
  }

  #[test]
  fn test_bucket_index() {
    assert_eq!(bucket_index(1), 0);
    assert_eq!(bucket_index(16), 4);
    assert_eq!(bucket_index(31), 4);
    assert_eq!(bucket_index(32), 5);
    assert_eq!(bucket_index(0x7FFF), 14);
    assert_eq!(bucket_index(0x8000), 15);
    assert_eq!(bucket_index(usize::MAX), 15);
  }

  #[test]
  fn test_insert_and_remove_ring() {
    let (mut zones, mut lists, mut pages) = zone_with_lists();

    unsafe {
      let a = lists.allocate(40).unwrap();
      let _fence_a = lists.allocate(16).unwrap();
      let b = lists.allocate(48).unwrap();
      let _fence_b = lists.allocate(16).unwrap();
      let c = lists.allocate(56).unwrap();
      let _fence_c = lists.allocate(16).unwrap();

      let before = lists.bucket_len(5);

      lists.release(a);
      lists.release(b);
      lists.release(c);
      assert_eq!(lists.bucket_len(5), before + 3);

      lists.remove(b);
      assert_eq!(lists.bucket_len(5), before + 2);
      lists.remove(c);
      lists.remove(a);
      assert_eq!(lists.bucket_len(5), before);
    }

    release_all(&mut zones, &mut pages);
  }

  #[test]
  fn test_fresh_zone_is_one_free_block() {
    let (mut zones, lists, mut pages) = zone_with_lists();

    assert_eq!(lists.free_blocks(), 1);
    assert_eq!(lists.bucket_len(bucket_index(zones.capacity())), 1);

    release_all(&mut zones, &mut pages);
  }

  #[test]
  fn test_split_leaves_remainder_free() {
    let (mut zones, mut lists, mut pages) = zone_with_lists();
    let capacity = zones.capacity();

    unsafe {
      let block = lists.allocate(64).unwrap();
      assert_eq!(block.size(), 64);
      assert!(!block.is_free());

      let rest = block.next_in_zone().unwrap();
      assert!(rest.is_free());
      assert_eq!(rest.size(), capacity - 64 - BLOCK_OVERHEAD);
      assert_eq!(rest.next_in_zone(), None);
    }

    release_all(&mut zones, &mut pages);
  }

  #[test]
  fn test_small_remainder_is_absorbed() {
    let (mut zones, mut lists, mut pages) = zone_with_lists();
    let capacity = zones.capacity();

    unsafe {
      let request = capacity - MIN_FREE_BLOCK + 1;
      let block = lists.allocate(request).unwrap();

      assert_eq!(block.size(), capacity);
      assert_eq!(block.next_in_zone(), None);
      assert_eq!(lists.free_blocks(), 0);
    }

    release_all(&mut zones, &mut pages);
  }

  #[test]
  fn test_first_fit_within_class_skips_short_blocks() {
    let (mut zones, mut lists, mut pages) = zone_with_lists();

    unsafe {
      let small = lists.allocate(72).unwrap();
      let _fence = lists.allocate(16).unwrap();
      let large = lists.allocate(120).unwrap();
      let _fence = lists.allocate(16).unwrap();

      lists.release(large);
      lists.release(small);

      // Both sit in bucket 6; the 72 byte block is at the head but too short.
      let block = lists.allocate(112).unwrap();
      assert_eq!(block, large);
    }

    release_all(&mut zones, &mut pages);
  }

  #[test]
  fn test_coalesces_every_free_order() {
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

    for order in orders {
      let (mut zones, mut lists, mut pages) = zone_with_lists();
      let capacity = zones.capacity();

      unsafe {
        let blocks = [
          lists.allocate(32).unwrap(),
          lists.allocate(64).unwrap(),
          lists.allocate(128).unwrap(),
        ];

        for index in order {
          lists.release(blocks[index]);
        }

        assert_eq!(lists.free_blocks(), 1, "order {order:?}");

        let whole = lists.allocate(capacity).unwrap();
        assert_eq!(whole, blocks[0]);
        assert_eq!(whole.size(), capacity);
      }

      release_all(&mut zones, &mut pages);
    }
  }

  #[test]
  fn test_triple_merge_inserts_once() {
    let (mut zones, mut lists, mut pages) = zone_with_lists();

    unsafe {
      let a = lists.allocate(48).unwrap();
      let b = lists.allocate(48).unwrap();
      let c = lists.allocate(48).unwrap();
      let _fence = lists.allocate(16).unwrap();

      lists.release(a);
      lists.release(c);
      assert_eq!(lists.free_blocks(), 3);

      lists.release(b);
      assert_eq!(lists.free_blocks(), 2);
      assert_eq!(a.size(), 3 * 48 + 2 * BLOCK_OVERHEAD);
      assert!(a.is_free());
    }

    release_all(&mut zones, &mut pages);
  }
}
