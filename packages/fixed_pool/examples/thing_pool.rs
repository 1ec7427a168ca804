//! Runs a pool of six `Thing`s to exhaustion and back:
//!
//! * Constructing six items succeeds, the seventh and eighth find the pool exhausted.
//! * Destroying every item that was constructed frees all six slots.
//! * Three more items reuse the freed slots. One is destroyed explicitly and the other two are
//!   left for the pool to destroy when it goes out of scope, in whatever order it chooses.
//!
//! Set `RUST_LOG=trace` to also see every slot being filled and emptied.

use fixed_pool::{BoundedChunkSource, SlotHandle, SlotPool, required_block_size};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Maximum number of `Thing`s alive at once.
const CAPACITY: usize = 6;

/// Bytes the pool asks for: one slot per `Thing`, each with room for the free-list link.
const BLOCK_SIZE: usize = required_block_size::<Thing>(CAPACITY);

struct Thing {
    value: i32,
}

impl Thing {
    fn new(value: i32) -> Self {
        info!(value, "Thing constructed");
        Self { value }
    }
}

impl Drop for Thing {
    fn drop(&mut self) {
        info!(value = self.value, "Thing destructed");
    }
}

fn report(name: &str, handle: Option<&SlotHandle<Thing>>) {
    info!(
        "{name} is {}",
        if handle.is_some() { "not empty" } else { "empty" }
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    info!(
        capacity = CAPACITY,
        block_size = BLOCK_SIZE,
        "reserving block"
    );

    let mut source = BoundedChunkSource::<BLOCK_SIZE>::new();

    {
        let mut pool = SlotPool::<Thing, CAPACITY>::new(&mut source);

        let mut handles = Vec::new();

        for value in 1..=8 {
            let handle = pool.construct(|| Thing::new(value));
            report(&format!("t{value}"), handle.as_ref());
            handles.push(handle);
        }

        // Only handles that were actually issued can be destroyed.
        for handle in handles.into_iter().flatten() {
            pool.destroy(handle);
        }

        let t9 = pool.construct(|| Thing::new(9));
        report("t9", t9.as_ref());

        let t10 = pool.construct(|| Thing::new(10));
        report("t10", t10.as_ref());

        let t11 = pool.construct(|| Thing::new(11));
        report("t11", t11.as_ref());

        if let Some(t10) = t10 {
            pool.destroy(t10);
        }

        // t9 and t11 are destroyed by the pool itself.
        drop(t9);
        drop(t11);
    }

    info!(
        exhausted = source.is_exhausted(),
        "program terminating normally"
    );
}
