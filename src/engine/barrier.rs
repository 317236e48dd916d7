//! Two-phase rendezvous barrier.
//!
//! [`PhaseBarrier`] synchronizes a fixed number of participants, one of which
//! acts as the **coordinator** (master). A cycle has two phases:
//!
//! 1. **Arrival.** Every slave calls [`PhaseBarrier::enter_as_slave`] and the
//!    coordinator calls [`PhaseBarrier::enter_as_master`]. The coordinator is
//!    blocked until all participants have arrived; the last slave to arrive
//!    wakes it.
//! 2. **Exclusive section.** The coordinator now runs alone while every slave
//!    is parked. It may read anything the slaves wrote before arriving.
//!    Dropping or releasing the returned [`MasterSection`] ends the cycle and
//!    wakes all slaves at once.
//!
//! ## Lapping
//!
//! A fast participant that leaves cycle `k` may immediately try to enter cycle
//! `k + 1` while a slow peer is still on its way out of cycle `k`. If the fast
//! one were counted as arrived for `k + 1` before the slow one has left, the
//! arrival count of the new cycle would be corrupted. The barrier therefore
//! tracks a **departure counter** next to the arrival counter, and no
//! participant (coordinator included) may arrive while it is non-zero.
//! Slaves additionally wait on a cycle generation rather than a boolean flag,
//! so a stale release can never satisfy a newer wait.
//!
//! ## Memory ordering
//!
//! All state lives behind one mutex. Every write a participant performs before
//! arriving happens-before everything the coordinator does inside its section,
//! and everything inside the section happens-before whatever slaves do after
//! they are released.
//!
//! ## Failure model
//!
//! There is no timeout. If fewer than `participants` threads ever arrive the
//! barrier blocks forever; the caller's participant count is a configuration
//! invariant.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct CycleState {
    /// Participants that arrived for the current cycle.
    arrived: usize,

    /// Slaves released from the previous cycle that have not yet left.
    departing: usize,

    /// Number of completed cycles.
    generation: u64,
}

/// Reusable barrier for exactly `participants` threads.
#[derive(Debug)]
pub struct PhaseBarrier {
    participants: usize,
    state: Mutex<CycleState>,

    /// Coordinator waits here for the last arrival.
    arrivals: Condvar,

    /// Slaves wait here for the coordinator's release.
    release: Condvar,

    /// Anyone trying to enter waits here until the previous cycle drained.
    drained: Condvar,
}

impl PhaseBarrier {
    /// Creates a barrier for `participants` threads (coordinator included).
    ///
    /// A single-participant barrier is valid: the coordinator passes straight
    /// through every cycle.
    pub fn new(participants: usize) -> Self {
        debug_assert!(participants > 0, "a barrier needs at least one participant");
        Self {
            participants,
            state: Mutex::new(CycleState::default()),
            arrivals: Condvar::new(),
            release: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Number of participants per cycle.
    #[inline]
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Number of cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.state.lock().generation
    }

    /// Arrives as the coordinator and waits for every slave.
    ///
    /// Blocks first until all slaves of the previous cycle have departed, then
    /// until all `participants` have arrived for this cycle. The returned
    /// section keeps slaves parked until it is released or dropped.
    pub fn enter_as_master(&self) -> MasterSection<'_> {
        let mut state = self.state.lock();
        while state.departing > 0 {
            self.drained.wait(&mut state);
        }

        state.arrived += 1;
        while state.arrived < self.participants {
            self.arrivals.wait(&mut state);
        }

        let generation = state.generation;
        drop(state);

        MasterSection {
            barrier: self,
            generation,
            released: false,
        }
    }

    /// Arrives as a slave and blocks until the coordinator releases the cycle.
    ///
    /// Returns the generation number of the cycle that was completed.
    pub fn enter_as_slave(&self) -> u64 {
        let mut state = self.state.lock();
        while state.departing > 0 {
            self.drained.wait(&mut state);
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived >= self.participants {
            self.arrivals.notify_one();
        }

        while state.generation == generation {
            self.release.wait(&mut state);
        }

        state.departing -= 1;
        if state.departing == 0 {
            self.drained.notify_all();
        }
        generation + 1
    }

    /// Ends the current cycle: resets arrivals and wakes every slave.
    fn exit_as_master(&self) {
        let mut state = self.state.lock();
        state.arrived = 0;
        state.departing = self.participants - 1;
        state.generation += 1;
        drop(state);

        self.release.notify_all();
    }
}

/// Exclusive coordinator section of one barrier cycle.
///
/// While this guard is alive every slave is parked inside
/// [`PhaseBarrier::enter_as_slave`]. Releasing it (explicitly or on drop)
/// completes the cycle.
#[must_use = "dropping the section immediately releases all slaves"]
pub struct MasterSection<'a> {
    barrier: &'a PhaseBarrier,
    generation: u64,
    released: bool,
}

impl MasterSection<'_> {
    /// Generation of the cycle this section belongs to.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Releases all slaves and completes the cycle.
    pub fn release(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.released {
            self.released = true;
            self.barrier.exit_as_master();
        }
    }
}

impl Drop for MasterSection<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn single_participant_never_blocks() {
        let barrier = PhaseBarrier::new(1);
        for _ in 0..100 {
            barrier.enter_as_master().release();
        }
        assert_eq!(barrier.cycles(), 100);
    }

    #[test]
    fn master_sees_writes_made_before_arrival() {
        const THREADS: usize = 4;
        let barrier = PhaseBarrier::new(THREADS);
        let slots: Vec<AtomicUsize> = (0..THREADS).map(|_| AtomicUsize::new(0)).collect();

        thread::scope(|s| {
            for t in 1..THREADS {
                let barrier = &barrier;
                let slots = &slots;
                s.spawn(move || {
                    for round in 1..=50 {
                        slots[t].store(round * t, Ordering::Relaxed);
                        barrier.enter_as_slave();
                    }
                });
            }

            for round in 1..=50 {
                let section = barrier.enter_as_master();
                for t in 1..THREADS {
                    assert_eq!(slots[t].load(Ordering::Relaxed), round * t);
                }
                section.release();
            }
        });
    }

    #[test]
    fn slaves_report_the_completed_generation() {
        let barrier = PhaseBarrier::new(2);
        let seen = AtomicU64::new(0);

        thread::scope(|s| {
            s.spawn(|| {
                for expected in 1..=20u64 {
                    let generation = barrier.enter_as_slave();
                    assert_eq!(generation, expected);
                    seen.store(generation, Ordering::Relaxed);
                }
            });
            for _ in 0..20 {
                barrier.enter_as_master().release();
            }
        });

        assert_eq!(seen.load(Ordering::Relaxed), 20);
        assert_eq!(barrier.cycles(), 20);
    }

    #[test]
    fn dropping_the_section_releases() {
        let barrier = PhaseBarrier::new(2);
        thread::scope(|s| {
            s.spawn(|| barrier.enter_as_slave());
            let section = barrier.enter_as_master();
            assert_eq!(section.generation(), 0);
            drop(section);
        });
        assert_eq!(barrier.cycles(), 1);
    }
}
