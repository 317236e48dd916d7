//! Work partitioning and per-thread worker sets.
//!
//! ## Partition
//!
//! `Z` logical work units are split evenly over `THREADS` threads, and each
//! thread's share is split into instances of `RO` units (the batch lane
//! count):
//!
//! ```text
//! Z = THREADS × instances_per_thread × RO
//!
//! thread t owns units [t · per_thread · RO, (t + 1) · per_thread · RO)
//! instance i on thread t owns units starting at (t · per_thread + i) · RO
//! ```
//!
//! ## Worker set
//!
//! A [`WorkerSet`] is one thread's ordered list of algorithm instances. On the
//! coordinator thread slot `0` holds the primary variant in place of one
//! generic instance; every other slot, on every thread, is generic. Keeping a
//! single ordered collection plus an explicit primary slot means the step
//! handlers never need separate master/slave structures.

use std::sync::Arc;

use crate::engine::algorithm::{Algorithm, Outcome};
use crate::engine::types::{StepTag, ThreadIndex, MASTER_THREAD};

/// Static layout of `Z` work units over threads and instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Total logical work units (`Z`).
    pub work_units: usize,

    /// Number of worker threads (`THREADS`).
    pub threads: usize,

    /// Work units per instance (`RO`).
    pub lanes: usize,
}

impl Partition {
    /// Creates a partition; validity is checked by [`Partition::is_valid`].
    pub const fn new(work_units: usize, threads: usize, lanes: usize) -> Self {
        Self { work_units, threads, lanes }
    }

    /// `true` if every thread receives the same, non-zero number of instances.
    pub const fn is_valid(&self) -> bool {
        self.threads > 0
            && self.lanes > 0
            && self.work_units % (self.threads * self.lanes) == 0
            && self.work_units / (self.threads * self.lanes) >= 1
    }

    /// Instances owned by each thread (primary included on the coordinator).
    #[inline]
    pub const fn instances_per_thread(&self) -> usize {
        self.work_units / (self.threads * self.lanes)
    }

    /// Total number of instances across all threads.
    #[inline]
    pub const fn instances(&self) -> usize {
        self.work_units / self.lanes
    }

    /// Index of the first instance owned by `thread` in the global ordering.
    #[inline]
    pub const fn thread_offset(&self, thread: ThreadIndex) -> usize {
        self.instances_per_thread() * thread
    }

    /// Global work-unit index of `lane` in instance `slot` of `thread`.
    #[inline]
    pub const fn global_index(&self, thread: ThreadIndex, slot: usize, lane: usize) -> usize {
        (self.thread_offset(thread) + slot) * self.lanes + lane
    }
}

/// One algorithm instance; either generic or the primary variant.
pub enum Instance<A, P> {
    /// Generic instance.
    Generic(A),

    /// The coordinator's primary instance.
    Primary(P),
}

impl<A, P> Instance<A, P>
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    #[inline]
    fn init(&mut self, shared: &Arc<A::Shared>, acc: &mut A::Accumulator) {
        match self {
            Instance::Generic(a) => a.init(shared, acc),
            Instance::Primary(p) => p.init(shared, acc),
        }
    }

    /// Invokes the step on whichever variant this slot holds.
    #[inline]
    pub fn step(&mut self, tag: StepTag, acc: &mut A::Accumulator) -> Outcome<A> {
        match self {
            Instance::Generic(a) => a.step(tag, acc),
            Instance::Primary(p) => p.step(tag, acc),
        }
    }
}

/// A thread's instances and its private accumulator.
pub struct WorkerSet<A: Algorithm, P> {
    thread: ThreadIndex,
    instances: Vec<Instance<A, P>>,
    primary: Option<usize>,
    accumulator: A::Accumulator,
}

impl<A, P> WorkerSet<A, P>
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    /// Builds and initializes the worker set of `thread`.
    ///
    /// Every instance receives exactly one `init` call before this returns.
    pub fn build(thread: ThreadIndex, partition: &Partition, shared: &Arc<A::Shared>) -> Self {
        let count = partition.instances_per_thread();
        let mut instances = Vec::with_capacity(count);

        let primary = if thread == MASTER_THREAD {
            instances.push(Instance::Primary(P::default()));
            Some(0)
        } else {
            None
        };
        while instances.len() < count {
            instances.push(Instance::Generic(A::default()));
        }

        let mut accumulator = A::Accumulator::default();
        for instance in instances.iter_mut() {
            instance.init(shared, &mut accumulator);
        }

        Self { thread, instances, primary, accumulator }
    }

    /// Thread this set belongs to.
    #[inline]
    pub fn thread(&self) -> ThreadIndex {
        self.thread
    }

    /// Number of instances (primary included).
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }

    /// Slot of the primary instance, if this is the coordinator's set.
    #[inline]
    pub fn primary_slot(&self) -> Option<usize> {
        self.primary
    }

    /// Invokes the step on the instance in `slot`.
    #[inline]
    pub fn step_slot(&mut self, slot: usize, tag: StepTag) -> Outcome<A> {
        self.instances[slot].step(tag, &mut self.accumulator)
    }

    /// Invokes the step on every instance in slot order, handing each result
    /// to `sink` together with the slot index.
    #[inline]
    pub fn step_all(&mut self, tag: StepTag, mut sink: impl FnMut(usize, Outcome<A>)) {
        let acc = &mut self.accumulator;
        for (slot, instance) in self.instances.iter_mut().enumerate() {
            sink(slot, instance.step(tag, acc));
        }
    }
}
