use std::alloc::Layout;
use std::any::type_name;
use std::mem;
use std::pin::Pin;
use std::ptr::NonNull;

use num_integer::Integer;

/// One slot of a sliced chunk. Vacant slots double as the links of the free list.
pub(crate) enum Entry<T> {
    Occupied { value: T },

    Vacant { next_free_index: usize },
}

/// Size in bytes of one slot holding a `T`, including the free-list link and padding.
///
/// This is the stride between consecutive slots in a chunk: at least
/// `max(size_of::<T>(), size_of::<usize>())`, plus whatever the compiler needs to tell occupied
/// slots from vacant ones, rounded up to the alignment of a slot.
#[must_use]
pub const fn slot_size<T>() -> usize {
    size_of::<Entry<T>>()
}

/// Size in bytes of the block a [`SlotPool`][crate::SlotPool] of `capacity` items of type `T`
/// requests from its [`ChunkSource`][crate::ChunkSource].
///
/// Use this to size a [`BoundedChunkSource`][crate::BoundedChunkSource]. The pool requests
/// exactly this many bytes, once. A source sized in any other way rejects the request.
///
/// # Panics
///
/// Panics if the size overflows `usize`. In a const context this is a compile error.
///
/// # Examples
///
/// ```
/// use fixed_pool::{required_block_size, slot_size};
///
/// assert_eq!(required_block_size::<u64>(6), 6 * slot_size::<u64>());
/// ```
#[must_use]
pub const fn required_block_size<T>(capacity: usize) -> usize {
    match slot_size::<T>().checked_mul(capacity) {
        Some(size) => size,
        None => panic!("block size for the requested capacity overflows usize"),
    }
}

/// A chunk sliced into `CAPACITY` slots of `T`, with an intrusive free list threaded through
/// the vacant slots.
///
/// The memory is borrowed, not owned: dropping `Slots` neither frees the chunk nor drops any
/// remaining items. The owner calls [`drop_occupied()`][Self::drop_occupied] for that.
pub(crate) struct Slots<T, const CAPACITY: usize> {
    first_entry_ptr: NonNull<Entry<T>>,

    /// Index of the most recently freed slot, the top of a stack of vacant slots stored in the
    /// slots themselves. Equal to `CAPACITY` when every slot is occupied.
    next_free_index: usize,

    count: usize,
}

impl<T, const CAPACITY: usize> Slots<T, CAPACITY> {
    /// The layout of the chunk needed to hold all the slots.
    #[must_use]
    pub(crate) fn layout() -> Layout {
        Layout::array::<Entry<T>>(CAPACITY).expect("simple flat array layout must be calculable")
    }

    /// Slices `chunk` into `CAPACITY` vacant slots, all of them on the free list.
    ///
    /// # Safety
    ///
    /// `chunk` must be valid for reads and writes of [`layout()`][Self::layout], aligned to it
    /// and not accessed through any other pointer for as long as the returned value exists.
    ///
    /// # Panics
    ///
    /// Panics if the capacity or the item size is zero, or if the chunk is misaligned.
    #[must_use]
    pub(crate) unsafe fn slice(chunk: NonNull<u8>) -> Self {
        assert!(CAPACITY > 0, "slots must have non-zero capacity");
        assert!(
            CAPACITY < usize::MAX,
            "slot capacity must be less than usize::MAX"
        );
        assert!(size_of::<T>() > 0, "slots must have non-zero item size");

        let first_entry_ptr = chunk.cast::<Entry<T>>();

        assert!(
            first_entry_ptr.is_aligned(),
            "chunk for slots of {} is not aligned to {} bytes",
            type_name::<T>(),
            align_of::<Entry<T>>()
        );

        for index in 0..CAPACITY {
            // SAFETY: The caller guarantees the chunk spans `CAPACITY` entries.
            let entry = unsafe { first_entry_ptr.add(index) };

            // SAFETY: The pointer is in bounds, aligned and exclusively ours. We use `write()`
            // because the previous contents are uninitialized and must not be dropped.
            unsafe {
                entry.write(Entry::Vacant {
                    // For the last slot this points out of bounds, meaning "no more free slots".
                    next_free_index: index
                        .checked_add(1)
                        .expect("guarded by capacity < usize::MAX above"),
                });
            }
        }

        Self {
            first_entry_ptr,
            next_free_index: 0,
            count: 0,
        }
    }

    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Only feeds diagnostics and queries, never decisions.
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.next_free_index >= CAPACITY
    }

    /// Address of the first slot, which is the address of the chunk.
    #[must_use]
    pub(crate) fn chunk_ptr(&self) -> NonNull<u8> {
        self.first_entry_ptr.cast()
    }

    pub(crate) fn entry_ptr(&self, index: usize) -> NonNull<Entry<T>> {
        assert!(
            index < CAPACITY,
            "slot {index} index out of bounds in slots of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by the bounds check above, so the pointer stays inside the chunk.
        unsafe { self.first_entry_ptr.add(index) }
    }

    fn entry(&self, index: usize) -> &Entry<T> {
        let entry_ptr = self.entry_ptr(index);

        // SAFETY: Every entry was initialized in `slice()` and the pointer is in bounds.
        unsafe { entry_ptr.as_ref() }
    }

    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    fn entry_mut(&mut self, index: usize) -> &mut Entry<T> {
        let mut entry_ptr = self.entry_ptr(index);

        // SAFETY: Every entry was initialized in `slice()` and the pointer is in bounds.
        // We hold `&mut self`, so nobody else is looking at the entry through us.
        unsafe { entry_ptr.as_mut() }
    }

    /// Maps a slot address back to its index, or `None` if the address is not the start of
    /// one of these slots.
    #[must_use]
    pub(crate) fn index_of(&self, entry_ptr: NonNull<Entry<T>>) -> Option<usize> {
        let offset = entry_ptr
            .as_ptr()
            .addr()
            .checked_sub(self.first_entry_ptr.as_ptr().addr())?;

        let (index, misalignment) = offset.div_rem(&slot_size::<T>());

        (misalignment == 0 && index < CAPACITY).then_some(index)
    }

    #[must_use]
    pub(crate) fn is_occupied(&self, index: usize) -> bool {
        matches!(self.entry(index), Entry::Occupied { .. })
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn get(&self, index: usize) -> Pin<&T> {
        match self.entry(index) {
            // SAFETY: Items never move while occupied and we never hand out unpinned references.
            Entry::Occupied { value } => unsafe { Pin::new_unchecked(value) },
            Entry::Vacant { .. } => panic!(
                "get({index}) slot was vacant in slots of {}",
                type_name::<T>()
            ),
        }
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> Pin<&mut T> {
        match self.entry_mut(index) {
            // SAFETY: Items never move while occupied and we never hand out unpinned references.
            Entry::Occupied { value } => unsafe { Pin::new_unchecked(value) },
            Entry::Vacant { .. } => panic!(
                "get_mut({index}) slot was vacant in slots of {}",
                type_name::<T>()
            ),
        }
    }

    /// Pops a slot off the free list and fills it with the value returned by `f`.
    ///
    /// `f` is only called once a slot has been picked. If it panics, nothing changes.
    ///
    /// # Panics
    ///
    /// Panics if every slot is occupied.
    pub(crate) fn insert_with<F>(&mut self, f: F) -> usize
    where
        F: FnOnce() -> T,
    {
        #[cfg(debug_assertions)]
        self.integrity_check();

        assert!(
            !self.is_full(),
            "cannot insert into full slots of {}",
            type_name::<T>()
        );

        let index = self.next_free_index;

        let next_free_index = match self.entry(index) {
            Entry::Vacant { next_free_index } => *next_free_index,
            Entry::Occupied { .. } => panic!(
                "slot {index} on the free list was occupied in slots of {}",
                type_name::<T>()
            ),
        };

        let value = f();

        *self.entry_mut(index) = Entry::Occupied { value };

        self.next_free_index = next_free_index;
        self.count = self
            .count
            .checked_add(1)
            .expect("guarded by capacity < usize::MAX in slice()");

        index
    }

    /// Drops the item in a slot and pushes the slot onto the free list.
    ///
    /// The slot is already back on the free list when the item's destructor runs, so a
    /// panicking destructor leaves the slots consistent.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    pub(crate) fn remove(&mut self, index: usize) {
        let next_free_index = self.next_free_index;

        let previous = mem::replace(self.entry_mut(index), Entry::Vacant { next_free_index });

        if matches!(previous, Entry::Vacant { .. }) {
            // Put back what we found; nothing was removed.
            *self.entry_mut(index) = previous;

            panic!(
                "remove({index}) slot was vacant in slots of {}",
                type_name::<T>()
            );
        }

        self.next_free_index = index;
        self.count = self
            .count
            .checked_sub(1)
            .expect("we verified above that the slot was occupied so count must be non-zero");

        drop(previous);
    }

    /// Drops every remaining item, returning how many there were.
    ///
    /// If an item panics when dropped, the items after it are still dropped while the panic
    /// unwinds. A second panic during that cleanup aborts the process.
    pub(crate) fn drop_occupied(&mut self) -> usize {
        let mut dropped: usize = 0;

        // Carries the index of the slot being emptied. `remove()` marks the slot vacant before
        // dropping the item, so the cleanup can resume at that same index.
        let mut cursor = scopeguard::guard((&mut *self, 0_usize), |(slots, panicked_at)| {
            for index in panicked_at..CAPACITY {
                if slots.is_occupied(index) {
                    slots.remove(index);
                }
            }
        });

        for index in 0..CAPACITY {
            cursor.1 = index;

            if cursor.0.is_occupied(index) {
                cursor.0.remove(index);

                dropped = dropped
                    .checked_add(1)
                    .expect("guarded by capacity < usize::MAX in slice()");
            }
        }

        // Everything was dropped without a panic, so there is nothing left to clean up.
        scopeguard::ScopeGuard::into_inner(cursor);

        dropped
    }

    /// Walks the free list and verifies that it covers exactly the vacant slots.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let vacant_count = CAPACITY
            .checked_sub(self.count)
            .expect("count can never exceed capacity");

        let mut walked: usize = 0;
        let mut index = self.next_free_index;

        while index != CAPACITY {
            assert!(
                walked < vacant_count,
                "free list is longer than the {vacant_count} vacant slots in slots of {}",
                type_name::<T>()
            );

            index = match self.entry(index) {
                Entry::Vacant { next_free_index } => *next_free_index,
                Entry::Occupied { .. } => panic!(
                    "free list passes through occupied slot {index} in slots of {}",
                    type_name::<T>()
                ),
            };

            walked = walked
                .checked_add(1)
                .expect("bounded by the assertion above");
        }

        assert!(
            walked == vacant_count,
            "free list has {walked} slots but {vacant_count} are vacant in slots of {}",
            type_name::<T>()
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::mem::MaybeUninit;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use super::*;

    /// Test-local backing storage for a `Slots<T, CAPACITY>`, standing in for a chunk source.
    struct Backing<T, const CAPACITY: usize> {
        entries: [MaybeUninit<Entry<T>>; CAPACITY],
    }

    impl<T, const CAPACITY: usize> Backing<T, CAPACITY> {
        fn new() -> Self {
            Self {
                entries: [const { MaybeUninit::uninit() }; CAPACITY],
            }
        }

        fn slots(&mut self) -> Slots<T, CAPACITY> {
            let chunk = NonNull::from(&mut self.entries).cast::<u8>();

            // SAFETY: The array has exactly the layout of `CAPACITY` entries and we only ever
            // create one `Slots` per backing in these tests.
            unsafe { Slots::slice(chunk) }
        }
    }

    #[test]
    fn smoke_test() {
        let mut backing = Backing::<u32, 3>::new();
        let mut slots = backing.slots();

        let a = slots.insert_with(|| 42);
        let b = slots.insert_with(|| 43);
        let c = slots.insert_with(|| 44);

        assert_eq!(*slots.get(a), 42);
        assert_eq!(*slots.get(b), 43);
        assert_eq!(*slots.get(c), 44);
        assert_eq!(slots.len(), 3);
        assert!(slots.is_full());

        slots.remove(b);

        assert_eq!(slots.len(), 2);
        assert!(!slots.is_full());

        let d = slots.insert_with(|| 45);

        // The only free slot is the one just vacated.
        assert_eq!(d, b);
        assert_eq!(*slots.get(a), 42);
        assert_eq!(*slots.get(c), 44);
        assert_eq!(*slots.get(d), 45);
    }

    #[test]
    fn fills_from_the_start() {
        let mut backing = Backing::<u32, 3>::new();
        let mut slots = backing.slots();

        assert_eq!(slots.insert_with(|| 10), 0);
        assert_eq!(slots.insert_with(|| 11), 1);
        assert_eq!(slots.insert_with(|| 12), 2);
    }

    #[test]
    fn reuses_most_recently_freed_first() {
        let mut backing = Backing::<u32, 4>::new();
        let mut slots = backing.slots();

        for value in 0..4 {
            _ = slots.insert_with(|| value);
        }

        slots.remove(1);
        slots.remove(3);

        assert_eq!(slots.insert_with(|| 100), 3);
        assert_eq!(slots.insert_with(|| 101), 1);
        assert!(slots.is_full());
    }

    #[test]
    #[should_panic]
    fn panic_when_full() {
        let mut backing = Backing::<u32, 2>::new();
        let mut slots = backing.slots();

        _ = slots.insert_with(|| 1);
        _ = slots.insert_with(|| 2);
        _ = slots.insert_with(|| 3);
    }

    #[test]
    #[should_panic]
    fn panic_when_oob_get() {
        let mut backing = Backing::<u32, 2>::new();
        let mut slots = backing.slots();

        _ = slots.insert_with(|| 1);
        _ = slots.get(1234);
    }

    #[test]
    #[should_panic]
    fn get_vacant_panics() {
        let mut backing = Backing::<u32, 2>::new();
        let slots = backing.slots();

        _ = slots.get(1);
    }

    #[test]
    #[should_panic]
    fn get_mut_vacant_panics() {
        let mut backing = Backing::<u32, 2>::new();
        let mut slots = backing.slots();

        _ = slots.get_mut(1);
    }

    #[test]
    fn remove_vacant_panics_and_keeps_free_list() {
        let mut backing = Backing::<u32, 2>::new();
        let mut slots = backing.slots();

        let result = catch_unwind(AssertUnwindSafe(|| slots.remove(1)));
        assert!(result.is_err());

        #[cfg(debug_assertions)]
        slots.integrity_check();
        _ = slots.insert_with(|| 1);
        _ = slots.insert_with(|| 2);
        assert!(slots.is_full());
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut backing = Backing::<u64, 2>::new();
        let mut slots = backing.slots();

        let index = slots.insert_with(|| 5);
        *slots.get_mut(index) += 1;

        assert_eq!(*slots.get(index), 6);
    }

    #[test]
    fn panicking_constructor_changes_nothing() {
        let mut backing = Backing::<u32, 2>::new();
        let mut slots = backing.slots();

        let result = catch_unwind(AssertUnwindSafe(|| {
            slots.insert_with(|| panic!("constructor failed"))
        }));
        assert!(result.is_err());

        assert_eq!(slots.len(), 0);
        assert_eq!(slots.insert_with(|| 7), 0);
    }

    #[test]
    fn index_of_maps_addresses_back() {
        let mut backing = Backing::<u16, 4>::new();
        let slots = backing.slots();

        for index in 0..4 {
            assert_eq!(slots.index_of(slots.entry_ptr(index)), Some(index));
        }
    }

    #[test]
    fn index_of_rejects_foreign_addresses() {
        let mut backing = Backing::<u16, 4>::new();
        let slots = backing.slots();

        let mut other_backing = Backing::<u16, 4>::new();
        let other = other_backing.slots();

        let inside_a_slot = slots
            .chunk_ptr()
            .map_addr(|addr| addr.checked_add(1).unwrap())
            .cast::<Entry<u16>>();

        assert_eq!(slots.index_of(inside_a_slot), None);
        assert_eq!(slots.index_of(other.entry_ptr(0)), None);
    }

    struct Droppable {
        dropped: Rc<Cell<usize>>,
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.dropped.set(self.dropped.get() + 1);
        }
    }

    #[test]
    fn calls_drop_on_remove() {
        let dropped = Rc::new(Cell::new(0));
        let mut backing = Backing::<Droppable, 3>::new();
        let mut slots = backing.slots();

        let a = slots.insert_with(|| Droppable {
            dropped: Rc::clone(&dropped),
        });
        slots.remove(a);

        assert_eq!(dropped.get(), 1);
    }

    #[test]
    fn drop_occupied_drops_each_once() {
        let dropped = Rc::new(Cell::new(0));
        let mut backing = Backing::<Droppable, 4>::new();
        let mut slots = backing.slots();

        for _ in 0..3 {
            _ = slots.insert_with(|| Droppable {
                dropped: Rc::clone(&dropped),
            });
        }
        slots.remove(1);
        assert_eq!(dropped.get(), 1);

        assert_eq!(slots.drop_occupied(), 2);
        assert_eq!(dropped.get(), 3);
        assert_eq!(slots.len(), 0);

        // Nothing left to drop the second time around.
        assert_eq!(slots.drop_occupied(), 0);
        assert_eq!(dropped.get(), 3);
    }

    struct ExplodesOnDrop {
        explode: bool,
        dropped: Rc<Cell<usize>>,
    }

    impl Drop for ExplodesOnDrop {
        fn drop(&mut self) {
            self.dropped.set(self.dropped.get() + 1);

            assert!(!self.explode, "item exploded on drop");
        }
    }

    #[test]
    fn drop_occupied_keeps_going_after_panicking_item() {
        let dropped = Rc::new(Cell::new(0));
        let mut backing = Backing::<ExplodesOnDrop, 4>::new();
        let mut slots = backing.slots();

        for index in 0..4 {
            _ = slots.insert_with(|| ExplodesOnDrop {
                explode: index == 0,
                dropped: Rc::clone(&dropped),
            });
        }

        let result = catch_unwind(AssertUnwindSafe(|| slots.drop_occupied()));

        assert!(result.is_err());
        assert_eq!(dropped.get(), 4);
        assert_eq!(slots.len(), 0);

        #[cfg(debug_assertions)]
        slots.integrity_check();
    }

    #[test]
    fn block_size_is_capacity_times_slot_size() {
        assert_eq!(required_block_size::<u8>(6), 6 * slot_size::<u8>());
        assert_eq!(
            required_block_size::<[u64; 3]>(5),
            Slots::<[u64; 3], 5>::layout().size()
        );
    }

    #[test]
    fn slot_is_large_enough_for_free_list_link() {
        assert!(slot_size::<u8>() >= size_of::<usize>());
        assert!(slot_size::<[u8; 100]>() >= 100);
        assert_eq!(slot_size::<u128>() % align_of::<u128>(), 0);
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        let mut backing = Backing::<(), 3>::new();
        _ = backing.slots();
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_panic() {
        let mut backing = Backing::<usize, 0>::new();
        _ = backing.slots();
    }
}
