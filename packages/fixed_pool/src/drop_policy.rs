/// Determines what happens to items still in a [`SlotPool`][crate::SlotPool] when the pool
/// is dropped.
///
/// By default, the pool destroys any remaining items, each exactly once, in an unspecified
/// order.
///
/// # Examples
///
/// ```
/// use fixed_pool::{BoundedChunkSource, DropPolicy, SlotPool, required_block_size};
///
/// const BLOCK_SIZE: usize = required_block_size::<u32>(2);
///
/// let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
/// let pool = SlotPool::<u32, 2>::builder(&mut source)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Remaining items are destroyed when the pool is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The pool panics if it still contains items when it is dropped.
    ///
    /// Useful when every item is expected to be destroyed explicitly, so that a forgotten
    /// handle is surfaced instead of being cleaned up silently at teardown.
    MustNotDropItems,
}
