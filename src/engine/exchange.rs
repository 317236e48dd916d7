//! Barrier-guarded hand-off of per-thread partials.
//!
//! Before a fold-shaped step rendezvous, every slave thread parks its merged
//! partial in its own slot; the coordinator drains the slots from inside its
//! barrier section. The array has no lock of its own: it is a bounded,
//! barrier-guarded shared array, not general shared mutable state.
//!
//! ## Access protocol
//!
//! * Slot `t` is written only by thread `t`, and only *before* that thread
//!   arrives at the barrier.
//! * Slots are read (taken) only by the coordinator, and only *inside* a
//!   [`MasterSection`](crate::engine::barrier::MasterSection), i.e. after all
//!   slaves have arrived and before any of them is released.
//!
//! The barrier's mutex orders slot writes before the coordinator's reads, and
//! the coordinator's reads before the next cycle's writes. Breaking either
//! rule is a data race, which is why the accessors are `unsafe`.

use std::cell::UnsafeCell;

use crate::engine::batch::Batch;
use crate::engine::step::MultiField;
use crate::engine::types::ThreadIndex;

/// Thread-level partial published for the coordinator.
pub enum Partial<B, M> {
    /// Single merged batch (Fold and Accumulate-fold steps).
    Batch(B),

    /// Merged multi-field aggregate.
    Fields(M),
}

/// One slot per thread.
pub struct Exchange<B, M> {
    slots: Box<[UnsafeCell<Option<Partial<B, M>>>]>,
}

// Sound under the access protocol above: every slot access is ordered by the
// phase barrier, so no two threads touch a slot concurrently.
unsafe impl<B: Send, M: Send> Sync for Exchange<B, M> {}

impl<B: Batch, M: MultiField<B>> Exchange<B, M> {
    /// Creates `threads` empty slots.
    pub fn new(threads: usize) -> Self {
        Self {
            slots: (0..threads).map(|_| UnsafeCell::new(None)).collect(),
        }
    }

    /// Publishes thread `thread`'s partial.
    ///
    /// # Safety
    /// Must be called by thread `thread` only, before it enters the barrier
    /// for the cycle in which the coordinator will take the slot.
    #[inline]
    pub unsafe fn publish(&self, thread: ThreadIndex, partial: Partial<B, M>) {
        // SAFETY: the caller is the sole writer of this slot and the
        // coordinator is not reading it until the barrier says so.
        unsafe { *self.slots[thread].get() = Some(partial) };
    }

    /// Takes thread `thread`'s partial, leaving the slot empty.
    ///
    /// # Safety
    /// Must be called by the coordinator only, while holding the master
    /// section of the cycle in which `thread` published.
    #[inline]
    pub unsafe fn take(&self, thread: ThreadIndex) -> Option<Partial<B, M>> {
        // SAFETY: every slave is parked in the barrier, so nobody else can
        // touch the slot until the section is released.
        unsafe { (*self.slots[thread].get()).take() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::barrier::PhaseBarrier;
    use crate::engine::batch::LaneBatch;
    use std::thread;

    type B = LaneBatch<u64, 2>;

    #[test]
    fn coordinator_collects_every_published_partial() {
        const THREADS: usize = 4;
        let barrier = PhaseBarrier::new(THREADS);
        let exchange: Exchange<B, ()> = Exchange::new(THREADS);

        let total = thread::scope(|s| {
            for t in 1..THREADS {
                let barrier = &barrier;
                let exchange = &exchange;
                s.spawn(move || {
                    for round in 0..10u64 {
                        let partial = B::splat(round + t as u64);
                        unsafe { exchange.publish(t, Partial::Batch(partial)) };
                        barrier.enter_as_slave();
                    }
                });
            }

            let mut total = 0u64;
            for _ in 0..10 {
                let section = barrier.enter_as_master();
                for t in 1..THREADS {
                    if let Some(Partial::Batch(b)) = unsafe { exchange.take(t) } {
                        total += b.as_slice()[0];
                    }
                }
                section.release();
            }
            total
        });

        // sum over rounds 0..10 and threads 1..4 of (round + t)
        assert_eq!(total, 3 * 45 + 10 * 6);
    }
}
