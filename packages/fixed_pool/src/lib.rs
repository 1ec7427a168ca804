#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A fixed-capacity object pool that never grows and never touches the heap.
//!
//! The pool is built from two parts:
//!
//! * A [`ChunkSource`] supplies raw storage in coarse chunks. [`BoundedChunkSource`] owns one
//!   reserved block and grants it exactly once, to a request that matches its size exactly.
//!   Every later request is refused, and releasing the block is a no-op.
//! * A [`SlotPool`] requests one chunk, slices it into `CAPACITY` slots for its item type and
//!   hands them out through [`SlotHandle`]s, reusing slots as items are destroyed.
//!
//! Two kinds of failure are kept apart:
//!
//! * **Exhaustion** is expected. [`SlotPool::construct()`] returns `None` when every slot is
//!   occupied and the caller decides what to do about it.
//! * **Configuration faults** are not. If the reserved block was sized inconsistently with the
//!   pool that consumes it, the chunk request fails with an [`Error`] and the pool panics rather
//!   than run with less storage than it was promised.
//!
//! Size the block with [`required_block_size()`], which follows the pool's slicing scheme:
//! `CAPACITY` slots of [`slot_size::<T>()`][slot_size] bytes each, with the free list stored
//! in the vacant slots themselves.
//!
//! # Example
//!
//! ```
//! use fixed_pool::{BoundedChunkSource, SlotPool, required_block_size};
//!
//! const CAPACITY: usize = 3;
//! const BLOCK_SIZE: usize = required_block_size::<u64>(CAPACITY);
//!
//! let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
//! let mut pool = SlotPool::<u64, CAPACITY>::new(&mut source);
//!
//! let handles: Vec<_> = (0..CAPACITY as u64)
//!     .map(|value| pool.construct(|| value).unwrap())
//!     .collect();
//!
//! // The pool is at capacity: this is an ordinary outcome, not an error.
//! assert!(pool.construct(|| 99).is_none());
//!
//! for handle in handles {
//!     pool.destroy(handle);
//! }
//!
//! assert!(pool.construct(|| 99).is_some());
//! ```
//!
//! # Stability
//!
//! Items never move while they are in the pool. References are handed out as
//! [`Pin<&T>`][std::pin::Pin] and [`Pin<&mut T>`][std::pin::Pin].
//!
//! # Thread safety
//!
//! None. The pool and its handles are single-threaded; wrap the pool in a mutex to share it.

mod builder;
mod chunk_source;
mod drop_policy;
mod error;
mod handle;
mod pool;
mod slots;

pub use builder::*;
pub use chunk_source::*;
pub use drop_policy::*;
pub use error::*;
pub use handle::*;
pub use pool::*;
pub(crate) use slots::Slots;
pub use slots::{required_block_size, slot_size};
