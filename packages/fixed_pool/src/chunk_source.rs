use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::fmt::{self, Debug};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use tracing::{debug, error};

use crate::{Error, Result};

/// Alignment, in bytes, of the block reserved by every [`BoundedChunkSource`].
///
/// Any item type whose alignment does not exceed this can be pooled on top of the block.
pub const BLOCK_ALIGN: usize = 64;

/// Supplies the raw storage that a [`SlotPool`][crate::SlotPool] slices into slots.
///
/// A pool asks for storage in one coarse chunk rather than per item. The source answers each
/// request in one of three ways:
///
/// * `Ok(Some(chunk))` - the request is granted.
/// * `Ok(None)` - the request is refused. The pool treats this as capacity exhaustion.
/// * `Err(_)` - the request reveals a configuration fault that the pool must not paper over.
///
/// # Safety
///
/// A granted chunk must be valid for reads and writes of `layout.size()` bytes, aligned to
/// `layout.align()` and not accessed through any other pointer until it is passed back to
/// [`release()`][Self::release]. It must not move while the source is borrowed, which the
/// pool guarantees by holding an exclusive reference to the source for its whole lifetime.
pub unsafe trait ChunkSource: Debug {
    /// Requests a chunk of storage described by `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request can never be satisfied because the source and its
    /// consumer were configured inconsistently.
    fn acquire(&mut self, layout: Layout) -> Result<Option<NonNull<u8>>>;

    /// Hands back a chunk previously granted by [`acquire()`][Self::acquire].
    fn release(&mut self, chunk: NonNull<u8>);
}

#[repr(C, align(64))]
struct ReservedBlock<const BLOCK_SIZE: usize> {
    bytes: UnsafeCell<[MaybeUninit<u8>; BLOCK_SIZE]>,
}

const _: () = assert!(align_of::<ReservedBlock<0>>() == BLOCK_ALIGN);

/// A [`ChunkSource`] that owns exactly one reserved block of `BLOCK_SIZE` bytes, aligned to
/// [`BLOCK_ALIGN`], and grants it exactly once.
///
/// The first request must ask for exactly `BLOCK_SIZE` bytes. Anything else is reported as
/// [`Error::BlockSizeMismatch`] because it means the capacity of the consumer and the size of
/// the block were derived inconsistently. The fault sticks: every later request gets the same
/// error and the block is never granted, so a consumer cannot paper over the mismatch by
/// retrying with another size. After the block has been granted, every further request is
/// refused, whatever its size. Releasing the block does nothing: it is not
/// dynamically owned, so there is nothing to free and it never becomes available again.
///
/// No heap memory is involved. The block lives wherever the source lives, which is why a pool
/// borrows the source instead of owning it.
///
/// # Examples
///
/// ```
/// use fixed_pool::{BoundedChunkSource, SlotPool, required_block_size};
///
/// const CAPACITY: usize = 4;
/// const BLOCK_SIZE: usize = required_block_size::<u64>(CAPACITY);
///
/// let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
/// let mut pool = SlotPool::<u64, CAPACITY>::new(&mut source);
///
/// let handle = pool.construct(|| 42).unwrap();
/// assert_eq!(*pool.get(&handle), 42);
/// pool.destroy(handle);
/// ```
pub struct BoundedChunkSource<const BLOCK_SIZE: usize> {
    block: ReservedBlock<BLOCK_SIZE>,

    /// Set once the block has been granted. Stays set even after the block is released.
    exhausted: bool,

    /// The configuration fault revealed by the first request, repeated for every later one.
    fault: Option<Error>,
}

impl<const BLOCK_SIZE: usize> BoundedChunkSource<BLOCK_SIZE> {
    /// Size of the reserved block in bytes.
    pub const SIZE: usize = BLOCK_SIZE;

    /// Creates a source with a fresh, not yet granted block.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block: ReservedBlock {
                bytes: UnsafeCell::new([MaybeUninit::uninit(); BLOCK_SIZE]),
            },
            exhausted: false,
            fault: None,
        }
    }

    /// Whether the reserved block has already been granted to a consumer.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether a request has revealed a configuration fault, after which the block is never
    /// granted.
    #[must_use]
    pub const fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    fn record_fault(&mut self, fault: Error) -> Error {
        self.fault = Some(fault.clone());
        fault
    }

    fn block_ptr(&self) -> NonNull<u8> {
        NonNull::new(self.block.bytes.get().cast::<u8>())
            .expect("pointer derived from a reference is never null")
    }
}

impl<const BLOCK_SIZE: usize> Default for BoundedChunkSource<BLOCK_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BLOCK_SIZE: usize> Debug for BoundedChunkSource<BLOCK_SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChunkSource")
            .field("block_size", &BLOCK_SIZE)
            .field("block_align", &BLOCK_ALIGN)
            .field("exhausted", &self.exhausted)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

// SAFETY: The block is a field of `self` with the alignment of `ReservedBlock` and a size of
// `BLOCK_SIZE`. We grant it only when the request fits both, and only once, so no two
// consumers ever see the block. The block moves only when `self` moves, which the exclusive
// borrow held by the consumer prevents until it has released the chunk.
unsafe impl<const BLOCK_SIZE: usize> ChunkSource for BoundedChunkSource<BLOCK_SIZE> {
    fn acquire(&mut self, layout: Layout) -> Result<Option<NonNull<u8>>> {
        if self.exhausted {
            debug!(
                requested_size = layout.size(),
                requested_align = layout.align(),
                block_size = BLOCK_SIZE,
                "chunk request refused, reserved block was already granted"
            );
            return Ok(None);
        }

        if let Some(fault) = &self.fault {
            error!(
                requested_size = layout.size(),
                requested_align = layout.align(),
                block_size = BLOCK_SIZE,
                "chunk request rejected, an earlier request revealed a configuration fault"
            );
            return Err(fault.clone());
        }

        if layout.size() != BLOCK_SIZE {
            error!(
                requested_size = layout.size(),
                requested_align = layout.align(),
                block_size = BLOCK_SIZE,
                "chunk request does not match the reserved block"
            );
            return Err(self.record_fault(Error::BlockSizeMismatch {
                requested: layout.size(),
                reserved: BLOCK_SIZE,
            }));
        }

        if layout.align() > BLOCK_ALIGN {
            error!(
                requested_size = layout.size(),
                requested_align = layout.align(),
                block_size = BLOCK_SIZE,
                "chunk request needs a stricter alignment than the reserved block has"
            );
            return Err(self.record_fault(Error::AlignmentUnsatisfiable {
                requested: layout.align(),
                reserved: BLOCK_ALIGN,
            }));
        }

        self.exhausted = true;

        debug!(
            requested_size = layout.size(),
            requested_align = layout.align(),
            block_size = BLOCK_SIZE,
            "chunk request granted from reserved block"
        );

        Ok(Some(self.block_ptr()))
    }

    fn release(&mut self, chunk: NonNull<u8>) {
        // The block is not dynamically owned, so there is nothing to free.
        debug!(
            block_size = BLOCK_SIZE,
            is_reserved_block = chunk == self.block_ptr(),
            "chunk released"
        );
    }
}
