//! Tagged size words.
//!
//! A tagged word packs a magnitude and one status flag into a fixed-width
//! integer. The flag lives in bit 0 of the most significant byte; the
//! magnitude's high bits are shifted one position up to make room for it:
//!
//! ```text
//!   BlockTag (u16):
//!
//!   bit  15 ............ 9   8   7 ............ 0
//!       ┌──────────────────┬───┬────────────────┐
//!       │ magnitude[14..8] │ F │ magnitude[7..0]│
//!       └──────────────────┴───┴────────────────┘
//!       └──── high byte ───────┘
//! ```
//!
//! Words are always stored little-endian, so the byte carrying the flag is
//! the *last* byte of the word. Both block headers and large headers end
//! exactly where the payload starts, which puts the flag at `payload - 1`
//! for every pointer this crate hands out. [`peek_large_flag`] relies on it.

use std::ptr::NonNull;

macro_rules! tagged_word {
  ($(#[$meta:meta])* $name:ident, $word:ty) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct $name($word);

    impl $name {
      /// Width of the word in bytes.
      pub const BYTES: usize = std::mem::size_of::<$word>();

      const LOW_BITS: u32 = <$word>::BITS - 8;
      const LOW_MASK: $word = (1 << Self::LOW_BITS) - 1;
      const FLAG: $word = 1 << Self::LOW_BITS;

      /// Largest magnitude the word can carry.
      pub const MAX_MAGNITUDE: $word = <$word>::MAX >> 1;

      /// Encodes `magnitude` and `flag`, or `None` if the magnitude does not fit.
      pub const fn try_new(
        magnitude: $word,
        flag: bool,
      ) -> Option<Self> {
        if magnitude > Self::MAX_MAGNITUDE {
          return None;
        }

        let low = magnitude & Self::LOW_MASK;
        let high = (magnitude >> Self::LOW_BITS) << (Self::LOW_BITS + 1);
        let word = low | high;

        Some(Self(if flag { word | Self::FLAG } else { word }))
      }

      /// Encodes `magnitude` and `flag`.
      ///
      /// # Panics
      ///
      /// Panics if `magnitude` exceeds [`Self::MAX_MAGNITUDE`].
      pub const fn new(
        magnitude: $word,
        flag: bool,
      ) -> Self {
        match Self::try_new(magnitude, flag) {
          Some(tag) => tag,
          None => panic!("magnitude does not fit in a tagged word"),
        }
      }

      pub const fn decode(self) -> ($word, bool) {
        (self.magnitude(), self.has_flag())
      }

      pub const fn magnitude(self) -> $word {
        (self.0 & Self::LOW_MASK) | ((self.0 >> (Self::LOW_BITS + 1)) << Self::LOW_BITS)
      }

      pub const fn has_flag(self) -> bool {
        self.0 & Self::FLAG != 0
      }

      pub const fn with_flag(self) -> Self {
        Self(self.0 | Self::FLAG)
      }

      pub const fn without_flag(self) -> Self {
        Self(self.0 & !Self::FLAG)
      }

      pub const fn to_bits(self) -> $word {
        self.0
      }

      pub const fn from_bits(bits: $word) -> Self {
        Self(bits)
      }

      pub const fn to_le_bytes(self) -> [u8; std::mem::size_of::<$word>()] {
        self.0.to_le_bytes()
      }

      pub const fn from_le_bytes(bytes: [u8; std::mem::size_of::<$word>()]) -> Self {
        Self(<$word>::from_le_bytes(bytes))
      }

      /// Reads a word stored at `at`.
      ///
      /// # Safety
      ///
      /// `at` must be valid for reads of [`Self::BYTES`] bytes.
      pub unsafe fn read(at: *const u8) -> Self {
        Self::from_le_bytes(unsafe { at.cast::<[u8; std::mem::size_of::<$word>()]>().read_unaligned() })
      }

      /// Stores the word at `at`.
      ///
      /// # Safety
      ///
      /// `at` must be valid for writes of [`Self::BYTES`] bytes.
      pub unsafe fn write(
        self,
        at: *mut u8,
      ) {
        unsafe { at.cast::<[u8; std::mem::size_of::<$word>()]>().write_unaligned(self.to_le_bytes()) }
      }
    }
  };
}

tagged_word!(
  /// Size word of an in-zone block. For tails the flag means "free", for the
  /// zone sentinel it means "end of zone"; headers never set it.
  BlockTag,
  u16
);

tagged_word!(
  /// Size word of a large object. The flag is always set and marks the
  /// pointer as belonging to the large-object path.
  LargeTag,
  u64
);

/// Reports whether the allocation at `payload` came from the large-object path.
///
/// Reads bit 0 of the byte immediately preceding the payload, which is the
/// flag bit of either a [`BlockTag`] header (always clear) or a [`LargeTag`]
/// header (always set).
///
/// # Safety
///
/// `payload` must have been returned by a [`ZoneAllocator`](crate::ZoneAllocator)
/// and not yet been released.
pub unsafe fn peek_large_flag(payload: NonNull<u8>) -> bool {
  unsafe { payload.as_ptr().sub(1).read() & 0x01 != 0 }
}
