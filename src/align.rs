/// Alignment of every payload handed out by the allocator.
pub const ALIGNMENT: usize = 8;

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use zonealloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use zonealloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(24), 24);
/// assert_eq!(align!(25), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGNMENT)
  };
}
