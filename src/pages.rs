use std::ptr::{self, NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, _SC_PAGESIZE};
use log::warn;

use crate::error::AllocError;

/// Fallback when `sysconf` cannot report the page size.
const DEFAULT_PAGE_SIZE: usize = 4096;

/// Source of anonymous, zero-filled, read-write memory.
///
/// The allocator never touches memory it did not obtain through [`PageSource::map`]
/// and returns every region it is done with through [`PageSource::unmap`] using the
/// same length it mapped.
pub trait PageSource {
  /// Granularity the source rounds mappings to. Always a power of two.
  fn page_size(&self) -> usize;

  /// Maps `len` bytes of zeroed memory, aligned to at least [`PageSource::page_size`].
  fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>, AllocError>;

  /// Releases a region obtained from [`PageSource::map`].
  ///
  /// # Safety
  ///
  /// `addr` and `len` must describe exactly one live mapping from this source,
  /// and nothing may access the region afterwards.
  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  );
}

impl<P: PageSource + ?Sized> PageSource for &mut P {
  fn page_size(&self) -> usize {
    (**self).page_size()
  }

  fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    (**self).map(len)
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) {
    unsafe { (**self).unmap(addr, len) }
  }
}

/// [`PageSource`] backed by `mmap(2)` / `munmap(2)`.
#[derive(Debug, Clone, Copy)]
pub struct MmapPages {
  page_size: usize,
}

impl MmapPages {
  pub fn new() -> Self {
    let reported = unsafe { libc::sysconf(_SC_PAGESIZE) };

    let page_size = match usize::try_from(reported) {
      Ok(size) if size.is_power_of_two() => size,
      _ => DEFAULT_PAGE_SIZE,
    };

    Self { page_size }
  }
}

impl Default for MmapPages {
  fn default() -> Self {
    Self::new()
  }
}

impl PageSource for MmapPages {
  fn page_size(&self) -> usize {
    self.page_size
  }

  fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      warn!("mmap declined {len} bytes: {}", std::io::Error::last_os_error());
      return Err(AllocError::OutOfMemory { len });
    }

    NonNull::new(address.cast::<u8>()).ok_or(AllocError::OutOfMemory { len })
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) {
    if unsafe { libc::munmap(addr.as_ptr().cast(), len) } != 0 {
      warn!("munmap of {len} bytes at {addr:?} failed: {}", std::io::Error::last_os_error());
    }
  }
}

/// Test page source that declines every mapping once its budget is spent and
/// keeps count of what is still mapped.
#[cfg(test)]
pub(crate) struct LimitedPages {
  inner: MmapPages,
  pub(crate) remaining: usize,
  pub(crate) live: usize,
}

#[cfg(test)]
impl LimitedPages {
  pub(crate) fn new(budget: usize) -> Self {
    Self {
      inner: MmapPages::new(),
      remaining: budget,
      live: 0,
    }
  }
}

#[cfg(test)]
impl PageSource for LimitedPages {
  fn page_size(&self) -> usize {
    self.inner.page_size()
  }

  fn map(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if self.remaining == 0 {
      return Err(AllocError::OutOfMemory { len });
    }

    let address = self.inner.map(len)?;
    self.remaining -= 1;
    self.live += 1;

    Ok(address)
  }

  unsafe fn unmap(
    &mut self,
    addr: NonNull<u8>,
    len: usize,
  ) {
    self.live -= 1;
    unsafe { self.inner.unmap(addr, len) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_page_size_is_power_of_two() {
    assert!(MmapPages::new().page_size().is_power_of_two());
  }

  #[test]
  fn test_map_is_zeroed_and_writable() {
    let mut pages = MmapPages::new();
    let len = pages.page_size() * 2;

    unsafe {
      let region = pages.map(len).unwrap();
      let bytes = std::slice::from_raw_parts_mut(region.as_ptr(), len);

      assert!(bytes.iter().all(|&b| b == 0));
      assert_eq!(region.as_ptr() as usize % pages.page_size(), 0);

      bytes.fill(0x5A);
      assert_eq!(bytes[len - 1], 0x5A);

      pages.unmap(region, len);
    }
  }

  #[test]
  fn test_limited_pages_runs_out() {
    let mut pages = LimitedPages::new(1);

    let region = pages.map(64).unwrap();
    assert_eq!(pages.map(64), Err(AllocError::OutOfMemory { len: 64 }));
    assert_eq!(pages.live, 1);

    unsafe { pages.unmap(region, 64) };
    assert_eq!(pages.live, 0);
  }
}
