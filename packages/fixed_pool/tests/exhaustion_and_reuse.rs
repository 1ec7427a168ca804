//! End-to-end scenarios for a pool of six items backed by a single reserved block.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use fixed_pool::{BoundedChunkSource, SlotHandle, SlotPool, required_block_size};

const CAPACITY: usize = 6;
const BLOCK_SIZE: usize = required_block_size::<Thing>(CAPACITY);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Event {
    Constructed(i32),
    Destructed(i32),
}

type Journal = Rc<RefCell<Vec<Event>>>;

/// A payload with observable construction and destruction.
struct Thing {
    value: i32,
    journal: Journal,
}

impl Thing {
    fn new(value: i32, journal: &Journal) -> Self {
        journal.borrow_mut().push(Event::Constructed(value));

        Self {
            value,
            journal: Rc::clone(journal),
        }
    }
}

impl Drop for Thing {
    fn drop(&mut self) {
        self.journal
            .borrow_mut()
            .push(Event::Destructed(self.value));
    }
}

fn count(journal: &Journal, event: Event) -> usize {
    journal.borrow().iter().filter(|e| **e == event).count()
}

#[test]
fn six_succeed_then_exhaustion_then_reuse() {
    let journal = Journal::default();
    let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();

    {
        let mut pool = SlotPool::<Thing, CAPACITY>::new(&mut source);

        let handles: Vec<Option<SlotHandle<Thing>>> = (1..=8)
            .map(|value| pool.construct(|| Thing::new(value, &journal)))
            .collect();

        assert!(handles[..6].iter().all(Option::is_some));
        assert!(handles[6].is_none());
        assert!(handles[7].is_none());

        // The exhausted requests never constructed anything.
        assert_eq!(count(&journal, Event::Constructed(7)), 0);
        assert_eq!(count(&journal, Event::Constructed(8)), 0);

        for handle in handles.into_iter().flatten() {
            pool.destroy(handle);
        }

        assert!(pool.is_empty());
        for value in 1..=6 {
            assert_eq!(count(&journal, Event::Destructed(value)), 1);
        }

        let t9 = pool.construct(|| Thing::new(9, &journal));
        let t10 = pool.construct(|| Thing::new(10, &journal));
        let t11 = pool.construct(|| Thing::new(11, &journal));

        // Six slots were freed, so all three fit.
        assert!(t9.is_some());
        assert!(t11.is_some());
        pool.destroy(t10.unwrap());

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(t9.as_ref().unwrap()).value, 9);
        assert_eq!(pool.get(t11.as_ref().unwrap()).value, 11);

        // t9 and t11 are left for the pool to clean up.
    }

    assert_eq!(count(&journal, Event::Destructed(9)), 1);
    assert_eq!(count(&journal, Event::Destructed(10)), 1);
    assert_eq!(count(&journal, Event::Destructed(11)), 1);

    let constructed = journal
        .borrow()
        .iter()
        .filter(|e| matches!(e, Event::Constructed(_)))
        .count();
    let destructed = journal
        .borrow()
        .iter()
        .filter(|e| matches!(e, Event::Destructed(_)))
        .count();
    assert_eq!(constructed, 9);
    assert_eq!(destructed, 9);
}

#[test]
fn reuse_matches_freed_slot_count() {
    let journal = Journal::default();
    let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
    let mut pool = SlotPool::<Thing, CAPACITY>::new(&mut source);

    let mut handles: Vec<_> = (0..6)
        .map(|value| pool.construct(|| Thing::new(value, &journal)).unwrap())
        .collect();

    // Free exactly two slots.
    pool.destroy(handles.pop().unwrap());
    pool.destroy(handles.remove(0));

    let first = pool.construct(|| Thing::new(100, &journal));
    let second = pool.construct(|| Thing::new(101, &journal));
    let third = pool.construct(|| Thing::new(102, &journal));

    assert!(first.is_some());
    assert!(second.is_some());
    assert!(third.is_none());
    assert_eq!(count(&journal, Event::Constructed(102)), 0);

    pool.destroy(first.unwrap());
    pool.destroy(second.unwrap());
    for handle in handles {
        pool.destroy(handle);
    }
}

#[test]
fn every_item_lives_at_a_distinct_address() {
    let journal = Journal::default();
    let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();
    let mut pool = SlotPool::<Thing, CAPACITY>::new(&mut source);

    let handles: Vec<_> = (0..6)
        .map(|value| pool.construct(|| Thing::new(value, &journal)).unwrap())
        .collect();

    let addresses: HashSet<usize> = handles
        .iter()
        .map(|handle| std::ptr::from_ref(pool.get(handle).get_ref()).addr())
        .collect();

    assert_eq!(addresses.len(), CAPACITY);

    for (expected, handle) in handles.iter().enumerate() {
        assert_eq!(
            pool.get(handle).value,
            i32::try_from(expected).unwrap(),
            "value read back must be the value constructed"
        );
    }

    for handle in handles {
        pool.destroy(handle);
    }
}

#[test]
fn teardown_destroys_each_survivor_once_in_any_order() {
    let journal = Journal::default();
    let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();

    {
        let mut pool = SlotPool::<Thing, CAPACITY>::new(&mut source);

        for value in [5, 3, 8, 1] {
            // Handles are dropped immediately; the items stay in the pool.
            drop(pool.construct(|| Thing::new(value, &journal)).unwrap());
        }

        assert_eq!(pool.len(), 4);
    }

    let destructed: Vec<i32> = journal
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Destructed(value) => Some(*value),
            Event::Constructed(_) => None,
        })
        .collect();

    let mut sorted = destructed;
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 3, 5, 8]);
}
