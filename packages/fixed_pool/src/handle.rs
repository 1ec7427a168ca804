use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

use crate::slots::Entry;

/// Identifies one occupied slot of a [`SlotPool`][crate::SlotPool].
///
/// A handle is the address of its slot, which never changes while the item lives. It is
/// returned by [`SlotPool::construct()`][crate::SlotPool::construct] and consumed by
/// [`SlotPool::destroy()`][crate::SlotPool::destroy]. Because it can be neither copied nor
/// cloned, an item cannot be destroyed twice through the same handle, and because an
/// exhausted pool returns no handle at all, there is no empty handle to destroy.
///
/// Dropping a handle without destroying its item does not destroy the item. The item stays in
/// the pool until the pool itself is dropped.
#[must_use = "the item stays in the pool until destroyed through its handle or until the pool is dropped"]
pub struct SlotHandle<T> {
    entry_ptr: NonNull<Entry<T>>,
}

impl<T> SlotHandle<T> {
    pub(crate) fn new(entry_ptr: NonNull<Entry<T>>) -> Self {
        Self { entry_ptr }
    }

    pub(crate) fn entry_ptr(&self) -> NonNull<Entry<T>> {
        self.entry_ptr
    }
}

impl<T> fmt::Debug for SlotHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotHandle")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("slot", &self.entry_ptr)
            .finish()
    }
}
