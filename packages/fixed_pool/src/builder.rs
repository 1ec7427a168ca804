use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{ChunkSource, DropPolicy, SlotPool};

/// Builder for creating an instance of [`SlotPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`SlotPool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use fixed_pool::{BoundedChunkSource, DropPolicy, SlotPool, required_block_size};
///
/// const BLOCK_SIZE: usize = required_block_size::<u32>(4);
///
/// let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
/// let pool = SlotPool::<u32, 4>::builder(&mut source)
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
/// ```
///
/// [1]: SlotPool::new
#[must_use]
pub struct SlotPoolBuilder<'s, T, const CAPACITY: usize> {
    source: &'s mut dyn ChunkSource,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T, const CAPACITY: usize> fmt::Debug for SlotPoolBuilder<'_, T, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &CAPACITY)
            .field("drop_policy", &self.drop_policy)
            .field("source", &self.source)
            .finish()
    }
}

impl<'s, T, const CAPACITY: usize> SlotPoolBuilder<'s, T, CAPACITY> {
    pub(crate) fn new(source: &'s mut dyn ChunkSource) -> Self {
        Self {
            source,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat remaining items in the pool when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// The pool does not request its chunk from the source until it first needs it.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or `CAPACITY` is zero.
    #[must_use]
    pub fn build(self) -> SlotPool<'s, T, CAPACITY> {
        SlotPool::new_inner(self.source, self.drop_policy)
    }
}
