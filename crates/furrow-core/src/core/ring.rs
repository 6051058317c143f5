use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use super::signal::AutoResetSignal;

/// Creates a bounded single-producer/single-consumer ring with staged
/// commits, returning its two endpoints.
///
/// The producer stages items with [`RingProducer::push`]; staged items stay
/// invisible to the consumer until [`RingProducer::commit`] publishes them
/// and raises the ready signal. The consumer drains committed items in FIFO
/// order with [`RingConsumer::dequeue`], which frees the slots and raises
/// the consumed signal so a blocked producer can resume.
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn command_ring<T: Send>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    assert!(capacity > 0, "ring capacity must be non-zero");

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(RingShared {
        slots,
        committed: AtomicUsize::new(0),
        head: AtomicUsize::new(0),
        ready: AutoResetSignal::new(),
        consumed: AutoResetSignal::new(),
    });

    (
        RingProducer {
            shared: Arc::clone(&shared),
            staged: 0,
        },
        RingConsumer { shared, head: 0 },
    )
}

struct RingShared<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Index one past the last published item. Monotonic.
    committed: AtomicUsize,
    /// Index of the next item to consume. Monotonic.
    head: AtomicUsize,
    ready: AutoResetSignal,
    consumed: AutoResetSignal,
}

// SAFETY: slot cells are accessed under the SPSC cursor protocol. The
// producer only writes slots in `[staged, head + capacity)` and the consumer
// only reads slots in `[head, committed)`; both cursors are published with
// release stores and observed with acquire loads before the other side
// touches the cells.
unsafe impl<T: Send> Send for RingShared<T> {}
unsafe impl<T: Send> Sync for RingShared<T> {}

impl<T> Drop for RingShared<T> {
    fn drop(&mut self) {
        // Committed but unconsumed items still own their payloads. Items
        // staged but never committed are unreachable from here and are left
        // in place; the queue always commits before shutdown.
        let head = *self.head.get_mut();
        let committed = *self.committed.get_mut();
        let capacity = self.slots.len();
        for index in head..committed {
            // SAFETY: slots in `[head, committed)` hold initialized values
            // that no endpoint will read again.
            unsafe { self.slots[index % capacity].get_mut().assume_init_drop() };
        }
    }
}

/// Producer endpoint of a [`command_ring`].
pub struct RingProducer<T> {
    shared: Arc<RingShared<T>>,
    /// Producer-local write cursor; items in `[committed, staged)` are
    /// staged but not yet published.
    staged: usize,
}

impl<T: Send> RingProducer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of items staged since the last commit.
    pub fn staged_len(&self) -> usize {
        self.staged - self.shared.committed.load(Ordering::Relaxed)
    }

    /// Stages one item, blocking on the consumed signal while the ring is
    /// full.
    pub fn push(&mut self, item: T) {
        let capacity = self.capacity();
        loop {
            let head = self.shared.head.load(Ordering::Acquire);
            if self.staged - head < capacity {
                break;
            }

            tracing::warn!(capacity, "command ring full; waiting for dispatch");
            let wait_start = Instant::now();
            self.shared.consumed.wait();
            tracing::debug!(
                waited_us = wait_start.elapsed().as_micros() as u64,
                "command ring slot freed"
            );
        }

        let slot = &self.shared.slots[self.staged % capacity];
        // SAFETY: the capacity check above guarantees the consumer has moved
        // past this slot, and only this producer writes slots.
        unsafe { (*slot.get()).write(item) };
        self.staged += 1;
    }

    /// Publishes every staged item and raises the ready signal.
    pub fn commit(&mut self) {
        self.shared.committed.store(self.staged, Ordering::Release);
        self.shared.ready.signal();
    }
}

/// Consumer endpoint of a [`command_ring`].
pub struct RingConsumer<T> {
    shared: Arc<RingShared<T>>,
    /// Consumer-local read cursor, mirrored into the shared head after each
    /// dequeue.
    head: usize,
}

impl<T: Send> RingConsumer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Blocks until the producer publishes a commit.
    pub fn wait_ready(&self) {
        self.shared.ready.wait();
    }

    /// Moves up to `max` committed items into `out` in FIFO order, frees
    /// their slots and raises the consumed signal. Returns the number of
    /// items appended.
    pub fn dequeue(&mut self, out: &mut Vec<T>, max: usize) -> usize {
        let capacity = self.capacity();
        let committed = self.shared.committed.load(Ordering::Acquire);
        let count = (committed - self.head).min(max);
        if count == 0 {
            return 0;
        }

        for index in self.head..self.head + count {
            let slot = &self.shared.slots[index % capacity];
            // SAFETY: slots in `[head, committed)` were fully written before
            // the producer's release store to `committed`, and each is read
            // exactly once before the head advances past it.
            out.push(unsafe { (*slot.get()).assume_init_read() });
        }

        self.head += count;
        self.shared.head.store(self.head, Ordering::Release);
        self.shared.consumed.signal();
        count
    }
}
