use std::any::type_name;
use std::fmt;
use std::pin::Pin;
use std::thread;

use tracing::{debug, trace};

use crate::{ChunkSource, DropPolicy, Result, SlotHandle, SlotPoolBuilder, Slots, slot_size};

/// An object pool with a hard capacity of `CAPACITY` items of type `T`, built on one chunk of
/// storage obtained from a [`ChunkSource`].
///
/// The pool never grows. The first time it needs storage, it asks its source for exactly
/// [`required_block_size::<T>(CAPACITY)`][crate::required_block_size] bytes and slices that
/// chunk into `CAPACITY` slots. It never asks again after being granted a chunk.
///
/// * [`construct()`][Self::construct] fills a free slot and returns a [`SlotHandle`], or returns
///   `None` when every slot is occupied. Running out of slots is an ordinary outcome, not a
///   fault.
/// * [`destroy()`][Self::destroy] drops the item and returns its slot for reuse.
/// * Dropping the pool drops every item still in it, each exactly once, in no particular order.
///
/// Items never move while they are in the pool, so references are handed out pinned.
///
/// # Configuration faults
///
/// If the source rejects the chunk request (e.g. because it was sized for a different capacity
/// or item type), [`construct()`][Self::construct] panics: there is no smaller or partial
/// fallback. Use [`try_reserve()`][Self::try_reserve] to surface the fault as an [`Error`]
/// instead.
///
/// # Examples
///
/// ```
/// use fixed_pool::{BoundedChunkSource, SlotPool, required_block_size};
///
/// const CAPACITY: usize = 2;
/// const BLOCK_SIZE: usize = required_block_size::<String>(CAPACITY);
///
/// let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
/// let mut pool = SlotPool::<String, CAPACITY>::new(&mut source);
///
/// let alice = pool.construct(|| "Alice".to_string()).unwrap();
/// let bob = pool.construct(|| "Bob".to_string()).unwrap();
///
/// // Both slots are taken.
/// assert!(pool.construct(|| "Charlie".to_string()).is_none());
///
/// pool.destroy(bob);
///
/// // Bob's slot is free again.
/// let charlie = pool.construct(|| "Charlie".to_string()).unwrap();
/// assert_eq!(&*pool.get(&charlie), "Charlie");
/// assert_eq!(&*pool.get(&alice), "Alice");
/// # pool.destroy(alice);
/// # pool.destroy(charlie);
/// ```
///
/// [`Error`]: crate::Error
pub struct SlotPool<'s, T, const CAPACITY: usize> {
    source: &'s mut dyn ChunkSource,

    /// `None` until the chunk has been granted by the source.
    slots: Option<Slots<T, CAPACITY>>,

    /// Set when the source refused to grant the chunk, leaving the pool without slots.
    refused: bool,

    drop_policy: DropPolicy,
}

impl<'s, T, const CAPACITY: usize> SlotPool<'s, T, CAPACITY> {
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or `CAPACITY` is zero.
    #[must_use]
    pub(crate) fn new_inner(source: &'s mut dyn ChunkSource, drop_policy: DropPolicy) -> Self {
        assert!(CAPACITY > 0, "SlotPool must have non-zero capacity");
        assert!(size_of::<T>() > 0, "SlotPool must have non-zero item size");

        Self {
            source,
            slots: None,
            refused: false,
            drop_policy,
        }
    }

    /// Creates a pool with the default configuration on top of `source`.
    ///
    /// No storage is requested until the first item is constructed or
    /// [`try_reserve()`][Self::try_reserve] is called.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or `CAPACITY` is zero.
    #[must_use]
    pub fn new(source: &'s mut dyn ChunkSource) -> Self {
        Self::builder(source).build()
    }

    /// Starts building a pool on top of `source`, for when the defaults do not fit.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{BoundedChunkSource, DropPolicy, SlotPool, required_block_size};
    ///
    /// const BLOCK_SIZE: usize = required_block_size::<u32>(8);
    ///
    /// let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
    /// let pool = SlotPool::<u32, 8>::builder(&mut source)
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    ///
    /// assert!(pool.is_empty());
    /// ```
    pub fn builder(source: &'s mut dyn ChunkSource) -> SlotPoolBuilder<'s, T, CAPACITY> {
        SlotPoolBuilder::new(source)
    }

    /// The maximum number of items the pool can hold at the same time.
    #[must_use]
    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    /// The number of items currently in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.as_ref().map_or(0, Slots::len)
    }

    /// Whether the pool holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot is occupied, so the next [`construct()`][Self::construct] would
    /// return `None`.
    ///
    /// A pool whose source refused to grant a chunk has no slots at all and is also full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.as_ref().map_or(self.refused, Slots::is_full)
    }

    /// Whether the pool has been granted its chunk and sliced it into slots.
    #[must_use]
    pub fn is_sliced(&self) -> bool {
        self.slots.is_some()
    }

    /// The stride in bytes between consecutive slots, see [`slot_size()`][crate::slot_size].
    #[must_use]
    pub fn slot_size(&self) -> usize {
        slot_size::<T>()
    }

    /// Requests the chunk from the source if the pool does not have it yet.
    ///
    /// Returns whether the pool now holds its chunk. `Ok(false)` means the source refused the
    /// request (e.g. because its block was already granted to another pool); the pool then has
    /// no slots and every [`construct()`][Self::construct] returns `None`.
    ///
    /// # Errors
    ///
    /// Returns the source's error if the chunk request reveals a configuration fault, such as a
    /// reserved block that was sized for a different capacity or item type.
    pub fn try_reserve(&mut self) -> Result<bool> {
        if self.slots.is_some() {
            return Ok(true);
        }

        let layout = Slots::<T, CAPACITY>::layout();

        let Some(chunk) = self.source.acquire(layout)? else {
            debug!(
                item_type = type_name::<T>(),
                capacity = CAPACITY,
                "chunk source refused the pool's only chunk request"
            );
            self.refused = true;
            return Ok(false);
        };

        // SAFETY: The `ChunkSource` contract makes the chunk valid, aligned and unaliased for
        // `layout` until we release it, and we hold the source borrowed for as long as we live.
        let slots = unsafe { Slots::slice(chunk) };

        debug!(
            item_type = type_name::<T>(),
            capacity = CAPACITY,
            slot_size = slot_size::<T>(),
            "sliced chunk into slots"
        );

        self.slots = Some(slots);
        self.refused = false;
        Ok(true)
    }

    /// Constructs an item in a free slot and returns its handle.
    ///
    /// `f` is called to produce the item only if a slot is free, so no construction side
    /// effects happen when the pool is exhausted. The first call requests the pool's chunk
    /// from the source.
    ///
    /// Returns `None` if every slot is occupied or the source refused to grant a chunk. This is
    /// the normal way of learning that the pool is at capacity.
    ///
    /// # Panics
    ///
    /// Panics if the chunk request reveals a configuration fault (see
    /// [`try_reserve()`][Self::try_reserve]).
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{BoundedChunkSource, SlotPool, required_block_size};
    ///
    /// const BLOCK_SIZE: usize = required_block_size::<u32>(1);
    ///
    /// let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
    /// let mut pool = SlotPool::<u32, 1>::new(&mut source);
    ///
    /// let first = pool.construct(|| 1);
    /// assert!(first.is_some());
    ///
    /// let second = pool.construct(|| 2);
    /// assert!(second.is_none());
    /// # pool.destroy(first.unwrap());
    /// ```
    pub fn construct<F>(&mut self, f: F) -> Option<SlotHandle<T>>
    where
        F: FnOnce() -> T,
    {
        let slots = self.reserved_slots()?;

        if slots.is_full() {
            debug!(
                item_type = type_name::<T>(),
                capacity = CAPACITY,
                "pool exhausted"
            );
            return None;
        }

        let index = slots.insert_with(f);

        trace!(
            item_type = type_name::<T>(),
            index,
            len = slots.len(),
            "constructed item"
        );

        Some(SlotHandle::new(slots.entry_ptr(index)))
    }

    /// Moves `value` into a free slot and returns its handle.
    ///
    /// If the pool is exhausted, the value is handed back untouched in `Err`, so it is not
    /// dropped on the caller's behalf.
    ///
    /// # Errors
    ///
    /// Returns `value` if every slot is occupied or the source refused to grant a chunk.
    ///
    /// # Panics
    ///
    /// Panics if the chunk request reveals a configuration fault (see
    /// [`try_reserve()`][Self::try_reserve]).
    pub fn insert(&mut self, value: T) -> std::result::Result<SlotHandle<T>, T> {
        if self.reserved_slots().is_none_or(|slots| slots.is_full()) {
            debug!(
                item_type = type_name::<T>(),
                capacity = CAPACITY,
                "pool exhausted, returning value to caller"
            );
            return Err(value);
        }

        Ok(self
            .construct(|| value)
            .expect("we just verified that a slot is free"))
    }

    /// Destroys the item identified by `handle` and returns its slot to the free list.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not issued by this pool.
    pub fn destroy(&mut self, handle: SlotHandle<T>) {
        let index = self.index_of(&handle);

        let slots = self
            .slots
            .as_mut()
            .expect("index_of() only succeeds once the pool holds its chunk");

        slots.remove(index);

        #[cfg(debug_assertions)]
        slots.integrity_check();

        trace!(
            item_type = type_name::<T>(),
            index,
            len = slots.len(),
            "destroyed item"
        );
    }

    /// Gets a pinned reference to the item identified by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not issued by this pool.
    #[must_use]
    pub fn get(&self, handle: &SlotHandle<T>) -> Pin<&T> {
        let index = self.index_of(handle);

        self.slots
            .as_ref()
            .expect("index_of() only succeeds once the pool holds its chunk")
            .get(index)
    }

    /// Gets an exclusive pinned reference to the item identified by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not issued by this pool.
    #[must_use]
    pub fn get_mut(&mut self, handle: &SlotHandle<T>) -> Pin<&mut T> {
        let index = self.index_of(handle);

        self.slots
            .as_mut()
            .expect("index_of() only succeeds once the pool holds its chunk")
            .get_mut(index)
    }

    fn index_of(&self, handle: &SlotHandle<T>) -> usize {
        self.slots
            .as_ref()
            .and_then(|slots| slots.index_of(handle.entry_ptr()))
            .unwrap_or_else(|| {
                panic!(
                    "handle {handle:?} does not identify an item in this pool of {}",
                    type_name::<T>()
                )
            })
    }

    /// Makes sure the chunk has been requested, escalating configuration faults to a panic.
    fn reserved_slots(&mut self) -> Option<&mut Slots<T, CAPACITY>> {
        match self.try_reserve() {
            Ok(true) => self.slots.as_mut(),
            Ok(false) => None,
            Err(error) => panic!(
                "{error}; the capacity of the pool of {} and the chunk source were configured inconsistently",
                type_name::<T>()
            ),
        }
    }
}

impl<T, const CAPACITY: usize> Drop for SlotPool<'_, T, CAPACITY> {
    fn drop(&mut self) {
        let Some(mut slots) = self.slots.take() else {
            return;
        };

        let chunk = slots.chunk_ptr();
        let source = &mut *self.source;

        // The chunk goes back to the source even if an item panics when dropped.
        let release_guard = scopeguard::guard((), move |()| source.release(chunk));

        let dropped_items = slots.drop_occupied();

        drop(release_guard);

        debug!(
            item_type = type_name::<T>(),
            dropped_items, "pool torn down"
        );

        // If we are already panicking, we do not want to panic again because that would
        // obscure the original panic.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                dropped_items == 0,
                "dropped a pool of {} still holding {dropped_items} items with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

impl<T, const CAPACITY: usize> fmt::Debug for SlotPool<'_, T, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &CAPACITY)
            .field("len", &self.len())
            .field("sliced", &self.is_sliced())
            .field("drop_policy", &self.drop_policy)
            .field("source", &self.source)
            .finish()
    }
}
