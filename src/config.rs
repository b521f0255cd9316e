use crate::{block, error::ConfigError, tag::BlockTag, zone};

/// Zone size used when nothing else is configured.
pub const DEFAULT_ZONE_SIZE: usize = 0x7FFF;

/// Construction-time settings of a [`ZoneAllocator`](crate::ZoneAllocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
  /// Length of every zone mapping in bytes.
  pub zone_size: usize,
}

impl AllocatorConfig {
  /// Smallest zone that can still host one minimal free block.
  pub const MIN_ZONE_SIZE: usize = zone::ZONE_OVERHEAD + block::MIN_PAYLOAD;
  /// Largest zone whose block sizes still fit a [`BlockTag`].
  pub const MAX_ZONE_SIZE: usize = BlockTag::MAX_MAGNITUDE as usize;

  pub fn new() -> Self {
    Self {
      zone_size: DEFAULT_ZONE_SIZE,
    }
  }

  pub fn with_zone_size(
    mut self,
    zone_size: usize,
  ) -> Self {
    self.zone_size = zone_size;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.zone_size < Self::MIN_ZONE_SIZE {
      return Err(ConfigError::ZoneTooSmall {
        zone_size: self.zone_size,
        minimum: Self::MIN_ZONE_SIZE,
      });
    }

    if self.zone_size > Self::MAX_ZONE_SIZE {
      return Err(ConfigError::ZoneTooLarge {
        zone_size: self.zone_size,
        maximum: Self::MAX_ZONE_SIZE,
      });
    }

    Ok(())
  }

  /// Largest payload a single block in one of these zones can carry.
  pub fn zone_capacity(&self) -> usize {
    self.zone_size - zone::ZONE_OVERHEAD
  }
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self::new()
  }
}
