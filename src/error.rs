/// Failure of an allocating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  #[error("out of memory: the page source declined a mapping of {len} bytes")]
  OutOfMemory { len: usize },
  #[error("zeroed allocation of {count} elements of {size} bytes overflows usize")]
  SizeOverflow { count: usize, size: usize },
}

/// Rejected [`AllocatorConfig`](crate::AllocatorConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
  #[error("zone size {zone_size} is below the minimum of {minimum} bytes")]
  ZoneTooSmall { zone_size: usize, minimum: usize },
  #[error("zone size {zone_size} exceeds the maximum of {maximum} bytes")]
  ZoneTooLarge { zone_size: usize, maximum: usize },
}
