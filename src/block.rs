use std::{mem, ptr::NonNull};

use crate::{align, tag::BlockTag};

/// Bytes between the start of a block and its payload. The header tag fills
/// the last two of them.
pub const HEADER_SIZE: usize = 4;
/// Bytes after a payload. The tail tag fills the first two of them.
pub const TAIL_SIZE: usize = 4;
pub const BLOCK_OVERHEAD: usize = HEADER_SIZE + TAIL_SIZE;
/// Smallest payload: a free block must be able to hold its [`FreeLinks`].
pub const MIN_PAYLOAD: usize = align!(mem::size_of::<FreeLinks>());
/// Smallest footprint a free block can have.
pub const MIN_FREE_BLOCK: usize = BLOCK_OVERHEAD + MIN_PAYLOAD;

/// Free-list linkage, stored in the payload of a free block.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct FreeLinks {
  pub next: Block,
  pub prev: Block,
}

/// A block inside a zone, addressed by its payload.
///
/// ```text
///   ┌──────────┬────────────────────────────┬──────────┐
///   │  header  │          payload           │   tail   │
///   │ ..│ size │  size bytes                │ size|F│..│
///   └──────────┴────────────────────────────┴──────────┘
///              ▲
///              └── Block(payload)
/// ```
///
/// The header tag never carries the flag. The tail flag is set while the
/// block sits on a free list.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block(NonNull<u8>);

impl Block {
  pub fn from_payload(payload: NonNull<u8>) -> Self {
    Self(payload)
  }

  pub fn payload(self) -> NonNull<u8> {
    self.0
  }

  fn header_tag(self) -> *mut u8 {
    self.0.as_ptr().wrapping_sub(BlockTag::BYTES)
  }

  unsafe fn tail_tag(self) -> *mut u8 {
    unsafe { self.0.as_ptr().add(self.size()) }
  }

  pub unsafe fn size(self) -> usize {
    unsafe { BlockTag::read(self.header_tag()).magnitude() as usize }
  }

  pub unsafe fn is_free(self) -> bool {
    unsafe { BlockTag::read(self.tail_tag()).has_flag() }
  }

  /// Writes `size` into the header and a matching tail.
  pub unsafe fn retag(
    self,
    size: usize,
    free: bool,
  ) {
    debug_assert!(size <= BlockTag::MAX_MAGNITUDE as usize);

    let tag = BlockTag::new(size as u16, false);

    unsafe {
      tag.write(self.header_tag());
      let tail = if free { tag.with_flag() } else { tag };
      tail.write(self.tail_tag());
    }
  }

  /// The block that follows this one, or `None` when the zone's end sentinel
  /// sits where its header would be.
  pub unsafe fn next_in_zone(self) -> Option<Block> {
    unsafe {
      let next = Block(self.0.add(self.size() + BLOCK_OVERHEAD));

      if BlockTag::read(next.header_tag()).has_flag() {
        None
      } else {
        Some(next)
      }
    }
  }

  /// The block that precedes this one, if it is free.
  ///
  /// Its tail always sits [`BLOCK_OVERHEAD`] bytes before this payload; the
  /// first block of a zone sees the zone's front guard there instead, which
  /// never reads as free.
  pub unsafe fn prev_if_free(self) -> Option<Block> {
    unsafe {
      let prev_tail = BlockTag::read(self.0.as_ptr().sub(BLOCK_OVERHEAD));

      if !prev_tail.has_flag() {
        return None;
      }

      let prev_size = prev_tail.magnitude() as usize;
      Some(Block(self.0.sub(BLOCK_OVERHEAD + prev_size)))
    }
  }

  pub unsafe fn links(self) -> FreeLinks {
    unsafe { self.0.cast::<FreeLinks>().read() }
  }

  pub unsafe fn set_links(
    self,
    next: Block,
    prev: Block,
  ) {
    unsafe { self.0.cast::<FreeLinks>().write(FreeLinks { next, prev }) }
  }

  pub unsafe fn set_next(
    self,
    next: Block,
  ) {
    unsafe { (*self.0.cast::<FreeLinks>().as_ptr()).next = next }
  }

  pub unsafe fn set_prev(
    self,
    prev: Block,
  ) {
    unsafe { (*self.0.cast::<FreeLinks>().as_ptr()).prev = prev }
  }
}
