use std::ptr::{self, NonNull};

use crate::{
  align,
  block::{Block, MIN_PAYLOAD},
  config::AllocatorConfig,
  error::{AllocError, ConfigError},
  free_list::FreeLists,
  large::LargeObjects,
  pages::{MmapPages, PageSource},
  tag::peek_large_flag,
  zone::Zones,
};

/// A `malloc`-style allocator over anonymous page mappings.
///
/// Requests up to [`ZoneAllocator::zone_capacity`] bytes are carved out of
/// fixed-size zones; anything larger gets a mapping of its own. The instance
/// owns every zone and large object it created and returns them to the page
/// source when dropped.
pub struct ZoneAllocator<P: PageSource = MmapPages> {
  pages: P,
  zones: Zones,
  free_lists: FreeLists,
  large: LargeObjects,
  last_error: Option<AllocError>,
}

impl ZoneAllocator<MmapPages> {
  pub fn new() -> Self {
    Self::from_parts(AllocatorConfig::default(), MmapPages::new())
  }

  pub fn with_config(config: AllocatorConfig) -> Result<Self, ConfigError> {
    Self::with_pages(config, MmapPages::new())
  }
}

impl Default for ZoneAllocator<MmapPages> {
  fn default() -> Self {
    Self::new()
  }
}

impl<P: PageSource> ZoneAllocator<P> {
  pub fn with_pages(
    config: AllocatorConfig,
    pages: P,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self::from_parts(config, pages))
  }

  fn from_parts(
    config: AllocatorConfig,
    pages: P,
  ) -> Self {
    Self {
      pages,
      zones: Zones::new(config.zone_size),
      free_lists: FreeLists::new(),
      large: LargeObjects::new(),
      last_error: None,
    }
  }

  /// Largest request served from a zone; one byte more goes to its own mapping.
  pub fn zone_capacity(&self) -> usize {
    self.zones.capacity()
  }

  /// Why the most recent call returned null, if it failed.
  pub fn last_error(&self) -> Option<AllocError> {
    self.last_error
  }

  pub fn zone_count(&self) -> usize {
    self.zones.count()
  }

  pub fn large_count(&self) -> usize {
    self.large.count()
  }

  /// Allocates at least `size` bytes, 8-byte aligned.
  ///
  /// Returns null for `size == 0`, and on failure with the reason in
  /// [`ZoneAllocator::last_error`].
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    self.last_error = None;

    if size == 0 {
      return ptr::null_mut();
    }

    let result = self.allocate_inner(size);
    self.settle(result)
  }

  /// Allocates `count * size` zeroed bytes.
  ///
  /// An overflowing product fails with [`AllocError::SizeOverflow`] before
  /// anything is mapped.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    self.last_error = None;

    let Some(total) = count.checked_mul(size) else {
      return self.settle(Err(AllocError::SizeOverflow { count, size }));
    };

    if total == 0 {
      return ptr::null_mut();
    }

    let result = self.allocate_inner(total).map(|payload| {
      unsafe { ptr::write_bytes(payload.as_ptr(), 0, total) };
      payload
    });

    self.settle(result)
  }

  /// Releases an allocation. Null is ignored.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this instance.
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    self.last_error = None;

    if let Some(payload) = NonNull::new(address) {
      unsafe { self.release(payload) };
    }
  }

  /// Resizes an allocation, moving it when it grows or shrinks below half of
  /// its current size, and keeping it in place otherwise.
  ///
  /// A null `address` allocates; a zero `new_size` frees and returns null. If
  /// a move fails the original allocation is left untouched and null is
  /// returned.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this instance.
  pub unsafe fn resize(
    &mut self,
    address: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    let Some(payload) = NonNull::new(address) else {
      return self.allocate(new_size);
    };

    self.last_error = None;

    if new_size == 0 {
      unsafe { self.release(payload) };
      return ptr::null_mut();
    }

    let old_size = unsafe { Self::payload_size(payload) };

    let copied = if new_size > old_size {
      old_size
    } else if old_size / new_size > 2 {
      new_size
    } else {
      return address;
    };

    let result = self.allocate_inner(new_size).map(|fresh| {
      unsafe {
        ptr::copy_nonoverlapping(payload.as_ptr(), fresh.as_ptr(), copied);
        self.release(payload);
      }
      fresh
    });

    self.settle(result)
  }

  /// Bytes usable at `address`: the block size for zone allocations, the
  /// requested size for large objects.
  ///
  /// # Safety
  ///
  /// `address` must be a live pointer returned by this instance.
  pub unsafe fn usable_size(
    &self,
    address: NonNull<u8>,
  ) -> usize {
    unsafe { Self::payload_size(address) }
  }

  unsafe fn payload_size(payload: NonNull<u8>) -> usize {
    unsafe {
      if peek_large_flag(payload) {
        LargeObjects::size_of(payload)
      } else {
        Block::from_payload(payload).size()
      }
    }
  }

  fn allocate_inner(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let size = size.max(MIN_PAYLOAD);

    if size > self.zone_capacity() {
      return self.large.allocate(&mut self.pages, size);
    }

    let size = align!(size).min(self.zone_capacity());

    loop {
      if let Some(block) = unsafe { self.free_lists.allocate(size) } {
        return Ok(block.payload());
      }

      self.zones.acquire(&mut self.pages, &mut self.free_lists)?;
    }
  }

  unsafe fn release(
    &mut self,
    payload: NonNull<u8>,
  ) {
    unsafe {
      if peek_large_flag(payload) {
        self.large.free(&mut self.pages, payload);
      } else {
        self.free_lists.release(Block::from_payload(payload));
      }
    }
  }

  fn settle(
    &mut self,
    result: Result<NonNull<u8>, AllocError>,
  ) -> *mut u8 {
    match result {
      Ok(payload) => payload.as_ptr(),
      Err(error) => {
        self.last_error = Some(error);
        ptr::null_mut()
      }
    }
  }
}

impl<P: PageSource> Drop for ZoneAllocator<P> {
  fn drop(&mut self) {
    unsafe {
      self.large.release_all(&mut self.pages);
      self.zones.release_all(&mut self.pages);
    }
  }
}
