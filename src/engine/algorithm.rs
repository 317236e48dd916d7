//! Algorithm contract.
//!
//! An **algorithm** is the unit of logic the dispatcher replicates across
//! work units. Each instance owns `Batch::LANES` work units of private state
//! and is driven through a fixed schedule of steps.
//!
//! ## What an implementor declares
//!
//! - the batch type its partial results are expressed in,
//! - the shared run state every instance can read,
//! - the per-thread accumulator (running statistics shared by the instances
//!   of one thread, never across threads),
//! - the multi-field aggregate used by multi-field folds (`()` if none),
//! - the schedule: one [`Policy`] per step index in `[0, MAX_STEP]`.
//!
//! ## Lifecycle
//!
//! 1. `Default::default()` on the worker thread that will own the instance.
//! 2. [`Algorithm::init`] exactly once, with the shared state and the
//!    thread's accumulator.
//! 3. [`Algorithm::step`] once per invocation until the thread halts.
//!
//! ## Primary variant
//!
//! The dispatcher accepts a second algorithm type for the single *primary*
//! instance living on the coordinator thread. It must agree on every
//! associated type and on the schedule (enforced at compile time), but may
//! carry extra logic, e.g. writing run-wide outputs in a `Singlethreaded`
//! step.
//!
//! On `Parallel` steps the primary must return the same result shape as the
//! generic instances (a fold-shaped result where they fold, a plain control
//! code where they don't). The shape decides whether a thread enters the
//! barrier, so a primary returning `Fold` while the slaves return `Control`
//! parks the coordinator in a rendezvous nobody else joins, and the run
//! hangs.

use std::sync::Arc;

use crate::engine::batch::Batch;
use crate::engine::step::{MultiField, StepResult};
use crate::engine::types::{Policy, StepTag};

/// Result type of [`Algorithm::step`] for algorithm `A`.
pub type Outcome<A> = StepResult<
    <A as Algorithm>::Batch,
    <A as Algorithm>::Fields,
    <A as Algorithm>::Shared,
>;

/// Scalar produced by folding algorithm `A`'s batch.
pub type ScalarOf<A> = <<A as Algorithm>::Batch as Batch>::Scalar;

/// Reduced form of algorithm `A`'s multi-field aggregate.
pub type ReducedOf<A> = <<A as Algorithm>::Fields as MultiField<<A as Algorithm>::Batch>>::Reduced;

/// Step-driven data-parallel algorithm.
pub trait Algorithm: Default + 'static {
    /// Batch used for fold-shaped partial results.
    type Batch: Batch;

    /// Run-wide state shared by every instance on every thread.
    type Shared: Default + Send + Sync + 'static;

    /// Per-thread running state shared by the instances of one thread.
    type Accumulator: Default;

    /// Aggregate for multi-field folds; `()` when unused.
    type Fields: MultiField<Self::Batch>;

    /// Synchronization policy of every step, indexed by step.
    const SCHEDULE: &'static [Policy];

    /// Highest valid step index.
    const MAX_STEP: usize = Self::SCHEDULE.len() - 1;

    /// One-time initialization before the first step.
    fn init(&mut self, shared: &Arc<Self::Shared>, acc: &mut Self::Accumulator);

    /// Executes one step.
    fn step(&mut self, tag: StepTag, acc: &mut Self::Accumulator) -> Outcome<Self>;
}
