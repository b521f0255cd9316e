//! # zonealloc - A Zone-Based Memory Allocator
//!
//! This crate provides a `malloc`/`calloc`/`free`/`realloc` style allocator
//! that sits directly on anonymous page mappings (`mmap(2)`), with no
//! dependency on any platform allocator.
//!
//! ## Overview
//!
//! Small and medium requests are served from fixed-size **zones**, each cut
//! into blocks tracked by 16 segregated free lists. Requests too large for a
//! zone get a mapping of their own:
//!
//! ```text
//!   Request Routing:
//!
//!                        allocate(size)
//!                              │
//!              ┌───────────────┴────────────────┐
//!              │ size <= zone_capacity          │ size > zone_capacity
//!              ▼                                ▼
//!   ┌──────────────────────┐         ┌──────────────────────┐
//!   │    Free lists        │         │    Large objects     │
//!   │  16 size classes     │         │  one mmap per object │
//!   └──────────┬───────────┘         └──────────────────────┘
//!              │ nothing fits
//!              ▼
//!   ┌──────────────────────┐
//!   │    Zones             │
//!   │  mmap(zone_size)     │
//!   └──────────────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   zonealloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── tag        - Tagged size words and the flag peek
//!   ├── pages      - PageSource trait and the mmap backend
//!   ├── block      - Block headers, tails and free-list links (internal)
//!   ├── free_list  - Segregated free lists, splitting, coalescing (internal)
//!   ├── zone       - Zone manager (internal)
//!   ├── large      - Large-object manager (internal)
//!   ├── config     - AllocatorConfig
//!   ├── error      - AllocError, ConfigError
//!   └── allocator  - ZoneAllocator, the public API
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use zonealloc::ZoneAllocator;
//!
//! let mut allocator = ZoneAllocator::new();
//!
//! let ptr = allocator.allocate(64);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write_bytes(0x2A, 64);
//!
//!     let ptr = allocator.resize(ptr, 256);
//!     assert_eq!(*ptr.add(63), 0x2A);
//!
//!     allocator.deallocate(ptr);
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block carries its size twice, in a header before the payload and in
//! a tail after it. The tail also carries the free flag, which lets a block
//! being freed inspect both neighbours in constant time:
//!
//! ```text
//!   Freeing B between two free neighbours:
//!
//!   ┌────┬──────────┬────┬────┬──────────┬────┬────┬──────────┬────┐
//!   │ hA │  A free  │ tA*│ hB │    B     │ tB │ hC │  C free  │ tC*│
//!   └────┴──────────┴────┴────┴──────────┴────┴────┴──────────┴────┘
//!                      ▲                          │
//!       backward: tail │ before hB     forward:   └ header after tB,
//!       gives A's size                  tail flag says C is free
//!
//!   ┌────┬────────────────────────────────────────────────────┬────┐
//!   │ hA │             A + B + C  (one free block)            │ tA*│
//!   └────┴────────────────────────────────────────────────────┴────┘
//! ```
//!
//! Both block headers and large-object headers end in a tagged word whose
//! flag sits in the byte right before the payload. For block headers it is
//! always clear, for large headers always set, so `deallocate` and `resize`
//! route a pointer by reading that one byte.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `ZoneAllocator` is neither `Send` nor `Sync`
//! - **No shrinking**: zones stay mapped until the allocator is dropped
//! - **8-byte alignment**: no larger alignment can be requested
//! - **Unix-only**: requires `libc` and `mmap`
//!
//! ## Safety
//!
//! Freeing or resizing a pointer that did not come from the same allocator,
//! or using one after it was freed, is undefined behavior. Those operations
//! are `unsafe` for that reason.

pub mod align;
mod allocator;
mod block;
pub mod config;
pub mod error;
mod free_list;
mod large;
pub mod pages;
pub mod tag;
mod zone;

pub use allocator::ZoneAllocator;
pub use config::{AllocatorConfig, DEFAULT_ZONE_SIZE};
pub use error::{AllocError, ConfigError};
pub use pages::{MmapPages, PageSource};
