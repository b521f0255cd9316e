use std::{mem, ptr::NonNull};

use log::debug;

use crate::{align_to, error::AllocError, pages::PageSource, tag::LargeTag};

/// Header at the start of every large mapping. The tag is the last field so
/// its flag byte is the byte right before the payload.
#[repr(C)]
struct LargeHeader {
  next: NonNull<LargeHeader>,
  prev: NonNull<LargeHeader>,
  tag: [u8; LargeTag::BYTES],
}

pub const LARGE_HEADER_SIZE: usize = mem::size_of::<LargeHeader>();

/// Directly mapped allocations, one mapping per object, kept in a ring.
pub(crate) struct LargeObjects {
  ring: Option<NonNull<LargeHeader>>,
  count: usize,
}

/// Page-rounded mapping length for a payload of `size` bytes.
fn mapping_len(
  size: usize,
  page_size: usize,
) -> Result<usize, AllocError> {
  size
    .checked_add(LARGE_HEADER_SIZE + page_size - 1)
    .map(|len| len & !(page_size - 1))
    .ok_or(AllocError::OutOfMemory { len: usize::MAX })
}

unsafe fn header_of(payload: NonNull<u8>) -> NonNull<LargeHeader> {
  unsafe { payload.sub(LARGE_HEADER_SIZE).cast() }
}

impl LargeObjects {
  pub fn new() -> Self {
    Self { ring: None, count: 0 }
  }

  pub fn count(&self) -> usize {
    self.count
  }

  pub fn allocate(
    &mut self,
    pages: &mut impl PageSource,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let len = mapping_len(size, pages.page_size())?;
    let tag = LargeTag::try_new(size as u64, true).ok_or(AllocError::OutOfMemory { len })?;

    let header = pages.map(len)?.cast::<LargeHeader>();

    unsafe {
      let (next, prev) = match self.ring {
        None => (header, header),
        Some(head) => {
          let last = (*head.as_ptr()).prev;
          (*head.as_ptr()).prev = header;
          (*last.as_ptr()).next = header;
          (head, last)
        }
      };

      header.write(LargeHeader {
        next,
        prev,
        tag: tag.to_le_bytes(),
      });
    }

    self.ring = Some(header);
    self.count += 1;

    debug!("mapped large object of {size} bytes at {header:?} ({len} bytes)");

    Ok(unsafe { header.cast::<u8>().add(LARGE_HEADER_SIZE) })
  }

  /// Size the object at `payload` was requested with.
  ///
  /// # Safety
  ///
  /// `payload` must come from [`LargeObjects::allocate`] and still be live.
  pub unsafe fn size_of(payload: NonNull<u8>) -> usize {
    let tag = unsafe { LargeTag::from_le_bytes((*header_of(payload).as_ptr()).tag) };
    tag.magnitude() as usize
  }

  /// Unlinks and unmaps the object at `payload`.
  ///
  /// # Safety
  ///
  /// `payload` must come from [`LargeObjects::allocate`] on this instance and
  /// still be live.
  pub unsafe fn free(
    &mut self,
    pages: &mut impl PageSource,
    payload: NonNull<u8>,
  ) {
    unsafe {
      let header = header_of(payload);
      let size = Self::size_of(payload);
      let LargeHeader { next, prev, .. } = header.read();

      if next == header {
        self.ring = None;
      } else {
        (*next.as_ptr()).prev = prev;
        (*prev.as_ptr()).next = next;
        if self.ring == Some(header) {
          self.ring = Some(next);
        }
      }

      self.count -= 1;

      let len = align_to!(size + LARGE_HEADER_SIZE, pages.page_size());
      debug!("unmapping large object of {size} bytes at {header:?}");
      pages.unmap(header.cast(), len);
    }
  }

  /// Unmaps every live object.
  ///
  /// # Safety
  ///
  /// No object may be used afterwards.
  pub unsafe fn release_all(
    &mut self,
    pages: &mut impl PageSource,
  ) {
    while let Some(head) = self.ring {
      unsafe { self.free(&mut *pages, head.cast::<u8>().add(LARGE_HEADER_SIZE)) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{pages::LimitedPages, tag::peek_large_flag};

  #[test]
  fn test_mapping_len_rounds_to_pages() {
    assert_eq!(mapping_len(1, 4096), Ok(4096));
    assert_eq!(mapping_len(4096 - LARGE_HEADER_SIZE, 4096), Ok(4096));
    assert_eq!(mapping_len(4096 - LARGE_HEADER_SIZE + 1, 4096), Ok(8192));
    assert!(mapping_len(usize::MAX - 8, 4096).is_err());
  }

  #[test]
  fn test_allocate_and_free() {
    let mut pages = LimitedPages::new(8);
    let mut large = LargeObjects::new();

    unsafe {
      let a = large.allocate(&mut pages, 40_000).unwrap();
      let b = large.allocate(&mut pages, 100_000).unwrap();
      let c = large.allocate(&mut pages, 33_000).unwrap();

      assert_eq!(large.count(), 3);
      assert_eq!(LargeObjects::size_of(b), 100_000);
      assert!(peek_large_flag(a));
      assert_eq!(a.as_ptr() as usize % 8, 0);

      std::ptr::write_bytes(b.as_ptr(), 0xAB, 100_000);

      large.free(&mut pages, b);
      assert_eq!(large.count(), 2);
      assert_eq!(LargeObjects::size_of(a), 40_000);
      assert_eq!(LargeObjects::size_of(c), 33_000);

      large.free(&mut pages, c);
      large.free(&mut pages, a);
      assert_eq!(large.count(), 0);
    }

    assert_eq!(pages.live, 0);
  }

  #[test]
  fn test_release_all_unmaps_everything() {
    let mut pages = LimitedPages::new(8);
    let mut large = LargeObjects::new();

    for size in [50_000, 60_000, 70_000] {
      large.allocate(&mut pages, size).unwrap();
    }

    unsafe { large.release_all(&mut pages) };

    assert_eq!(large.count(), 0);
    assert_eq!(pages.live, 0);
  }

  #[test]
  fn test_declined_mapping_leaves_ring_alone() {
    let mut pages = LimitedPages::new(1);
    let mut large = LargeObjects::new();

    let kept = large.allocate(&mut pages, 50_000).unwrap();
    assert!(matches!(
      large.allocate(&mut pages, 50_000),
      Err(AllocError::OutOfMemory { .. })
    ));
    assert_eq!(large.count(), 1);

    unsafe {
      assert_eq!(LargeObjects::size_of(kept), 50_000);
      large.release_all(&mut pages);
    }
  }
}
