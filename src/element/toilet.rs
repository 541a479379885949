//! Overflow guard for push-mode input pads.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Shared counter of unconsumed units buffered at a push-mode input.
///
/// The producer adds the size of everything it sends; the consumer
/// subtracts exactly what it drains. Exactly one actor adds and exactly one
/// subtracts, so plain atomic add/sub suffice and the counter never goes
/// negative. When an add pushes the counter past its capacity the producer
/// must stop producing for good — the caller turns the overflow into a
/// forceful kill.
#[derive(Clone, Debug)]
pub struct Toilet {
    counter: Arc<AtomicI64>,
    capacity: i64,
}

impl Toilet {
    /// Create a toilet with the given capacity in demand units.
    pub fn new(capacity: i64) -> Self {
        Self {
            counter: Arc::new(AtomicI64::new(0)),
            capacity,
        }
    }

    /// Producer side: account for `size` units entering the consumer.
    ///
    /// Returns `Err(new_size)` when the counter exceeds capacity.
    pub fn add(&self, size: u64) -> Result<i64, i64> {
        let new_size = self.counter.fetch_add(size as i64, Ordering::AcqRel) + size as i64;
        if new_size > self.capacity {
            Err(new_size)
        } else {
            Ok(new_size)
        }
    }

    /// Consumer side: account for `size` drained units.
    pub fn subtract(&self, size: u64) {
        let previous = self.counter.fetch_sub(size as i64, Ordering::AcqRel);
        debug_assert!(previous >= size as i64, "toilet counter went negative");
    }

    /// Current number of buffered units.
    pub fn size(&self) -> i64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Configured capacity.
    pub fn capacity(&self) -> i64 {
        self.capacity
    }
}
