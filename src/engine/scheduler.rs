//! Step table construction and per-policy step handlers.
//!
//! This module is responsible for:
//! * building, once per dispatcher, a table mapping every step index in
//!   `[0, MAX_STEP]` to the handler for its policy,
//! * running one step on one thread: invoking the local instances, merging
//!   their results, and taking part in the cross-thread rendezvous when the
//!   step's result shape requires one.
//!
//! ## Handler selection
//!
//! The policy decides the handler when the table is built; nothing is looked up
//! by type at run time. Inside a handler the shape of the returned
//! [`StepResult`] decides the merge:
//!
//! | Result            | Local merge             | Cross-thread          |
//! |-------------------|-------------------------|-----------------------|
//! | `Control`         | keep last code          | none                  |
//! | `Fold`            | accumulate              | accumulate, fold      |
//! | `AccumulateFold`  | keep last partial       | accumulate, fold      |
//! | `MultiFold`       | field-wise accumulate   | field-wise accumulate, fold |
//!
//! Only the `Parallel` policy merges across threads. `Singlethreaded` runs the
//! primary instance inside the coordinator's barrier section. `Separate`,
//! `Accumulate` and `AccReset` are thread-local and use only the next step
//! of whatever they return.
//!
//! ## Determinism
//!
//! Local instances are merged in slot order and threads are merged in thread
//! order `1..THREADS` on top of thread 0, so floating-point results are
//! bit-identical across runs regardless of OS scheduling.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::engine::algorithm::{Algorithm, Outcome, ReducedOf, ScalarOf};
use crate::engine::barrier::PhaseBarrier;
use crate::engine::batch::Batch;
use crate::engine::exchange::{Exchange, Partial};
use crate::engine::step::{accumulate_fields, fold_fields, SharedValue, StepResult};
use crate::engine::types::{ControlCode, Policy, StepIndex, StepTag, ThreadIndex, HALT, MASTER_THREAD};
use crate::engine::worker::{Partition, WorkerSet};
use crate::profiling::profiler;

/// Borrowed run state handed to every step handler.
pub struct RunContext<'r, A: Algorithm> {
    /// Shared run state.
    pub shared: &'r A::Shared,

    /// Rendezvous for fold-shaped and single-threaded steps.
    pub barrier: &'r PhaseBarrier,

    /// Per-thread partial hand-off.
    pub exchange: &'r Exchange<A::Batch, A::Fields>,

    /// Work layout of the run.
    pub partition: Partition,

    /// Control code of the last single-threaded step, written by the
    /// coordinator inside its barrier section.
    pub master_code: &'r AtomicI32,
}

/// Handler invoked by a thread for one step.
pub type StepHandler<A, P> = fn(&RunContext<'_, A>, &mut WorkerSet<A, P>, StepIndex) -> ControlCode;

/// One row of the step table.
pub struct StepEntry<A: Algorithm, P> {
    /// Policy fixed by the schedule.
    pub policy: Policy,

    /// Handler selected for the policy.
    pub handler: StepHandler<A, P>,
}

/// Precompiled handler per step index.
pub struct StepTable<A: Algorithm, P> {
    entries: Vec<StepEntry<A, P>>,
}

impl<A, P> StepTable<A, P>
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    /// Builds the table from `A::SCHEDULE`, one entry per step.
    pub fn build() -> Self {
        let mut entries = Vec::with_capacity(A::SCHEDULE.len());
        for &policy in A::SCHEDULE {
            let handler: StepHandler<A, P> = match policy {
                Policy::Parallel => run_parallel::<A, P>,
                Policy::Separate => run_separate::<A, P>,
                Policy::Singlethreaded => run_singlethreaded::<A, P>,
                Policy::Accumulate => run_accumulate::<A, P>,
                Policy::AccReset => run_acc_reset::<A, P>,
            };
            entries.push(StepEntry { policy, handler });
        }
        log::debug!(
            "step table built: {} steps, {} may synchronize",
            entries.len(),
            entries.iter().filter(|e| e.policy.may_synchronize()).count()
        );
        Self { entries }
    }

    /// Entry for `step`, if it is inside the schedule.
    #[inline]
    pub fn entry(&self, step: StepIndex) -> Option<&StepEntry<A, P>> {
        self.entries.get(step)
    }

    /// Policies in step order.
    pub fn policies(&self) -> impl Iterator<Item = Policy> + '_ {
        self.entries.iter().map(|e| e.policy)
    }
}

/// Thread-local merge of the results of one step.
enum LocalMerge<A: Algorithm> {
    Empty,
    Control(ControlCode),
    Batch {
        next: ControlCode,
        partial: A::Batch,
        target: fn(&A::Shared) -> &SharedValue<ScalarOf<A>>,
        overwrite: bool,
    },
    Fields {
        next: ControlCode,
        partial: A::Fields,
        target: fn(&A::Shared) -> &SharedValue<ReducedOf<A>>,
    },
}

impl<A: Algorithm> LocalMerge<A> {
    fn absorb(&mut self, step: StepIndex, result: Outcome<A>) {
        let state = std::mem::replace(self, LocalMerge::Empty);
        *self = state.merged(step, result);
    }

    fn merged(self, step: StepIndex, result: Outcome<A>) -> Self {
        match (self, result) {
            (LocalMerge::Empty | LocalMerge::Control(_), StepResult::Control(code)) => LocalMerge::Control(code),
            (LocalMerge::Empty, StepResult::Fold(f)) => LocalMerge::Batch {
                next: f.next_step,
                partial: f.partial,
                target: f.target,
                overwrite: false,
            },
            (LocalMerge::Empty, StepResult::AccumulateFold(f)) => LocalMerge::Batch {
                next: f.next_step,
                partial: f.partial,
                target: f.target,
                overwrite: true,
            },
            (LocalMerge::Empty, StepResult::MultiFold(f)) => LocalMerge::Fields {
                next: f.next_step,
                partial: f.partial,
                target: f.target,
            },
            (LocalMerge::Batch { next, mut partial, target, overwrite: false }, StepResult::Fold(f)) => {
                partial.accumulate(&f.partial);
                LocalMerge::Batch { next, partial, target, overwrite: false }
            }
            // Last local instance wins; earlier partials are discarded.
            (LocalMerge::Batch { overwrite: true, .. }, StepResult::AccumulateFold(f)) => LocalMerge::Batch {
                next: f.next_step,
                partial: f.partial,
                target: f.target,
                overwrite: true,
            },
            (LocalMerge::Fields { next, mut partial, target }, StepResult::MultiFold(f)) => {
                accumulate_fields::<A::Batch, A::Fields>(&mut partial, &f.partial);
                LocalMerge::Fields { next, partial, target }
            }
            (state, other) => {
                log::warn!(
                    "step {step}: instance returned a different result shape than its peers; ignoring it (next step {})",
                    other.next_step()
                );
                state
            }
        }
    }
}

impl<A: Algorithm> RunContext<'_, A> {
    /// Finishes a `Parallel` step on `thread` from its local merge.
    fn complete(&self, thread: ThreadIndex, merge: LocalMerge<A>) -> ControlCode {
        match merge {
            LocalMerge::Empty => HALT,
            LocalMerge::Control(code) => code,
            LocalMerge::Batch { next, partial, target, .. } => {
                self.fold_batch(thread, partial, target);
                next
            }
            LocalMerge::Fields { next, partial, target } => {
                self.fold_fields(thread, partial, target);
                next
            }
        }
    }

    fn fold_batch(
        &self,
        thread: ThreadIndex,
        mut partial: A::Batch,
        target: fn(&A::Shared) -> &SharedValue<ScalarOf<A>>,
    ) {
        if thread != MASTER_THREAD {
            // SAFETY: own slot, written before arriving at the barrier.
            unsafe { self.exchange.publish(thread, Partial::Batch(partial)) };
            self.barrier.enter_as_slave();
            return;
        }

        let _span = profiler::span("barrier::fold");
        let section = self.barrier.enter_as_master();
        for t in 1..self.partition.threads {
            // SAFETY: inside the master section every slave is parked.
            if let Some(Partial::Batch(other)) = unsafe { self.exchange.take(t) } {
                partial.accumulate(&other);
            }
        }
        target(self.shared).set(partial.fold());
        section.release();
    }

    fn fold_fields(
        &self,
        thread: ThreadIndex,
        mut partial: A::Fields,
        target: fn(&A::Shared) -> &SharedValue<ReducedOf<A>>,
    ) {
        if thread != MASTER_THREAD {
            // SAFETY: own slot, written before arriving at the barrier.
            unsafe { self.exchange.publish(thread, Partial::Fields(partial)) };
            self.barrier.enter_as_slave();
            return;
        }

        let _span = profiler::span("barrier::fold_fields");
        let section = self.barrier.enter_as_master();
        for t in 1..self.partition.threads {
            // SAFETY: inside the master section every slave is parked.
            if let Some(Partial::Fields(other)) = unsafe { self.exchange.take(t) } {
                accumulate_fields::<A::Batch, A::Fields>(&mut partial, &other);
            }
        }
        let mut out = target(self.shared).write();
        fold_fields::<A::Batch, A::Fields>(&mut *out, &partial);
        drop(out);
        section.release();
    }

    /// Applies a single instance's result directly, without any merge.
    fn apply_alone(&self, result: Outcome<A>) -> ControlCode {
        match result {
            StepResult::Control(code) => code,
            StepResult::Fold(f) | StepResult::AccumulateFold(f) => {
                (f.target)(self.shared).set(f.partial.fold());
                f.next_step
            }
            StepResult::MultiFold(f) => {
                let mut out = (f.target)(self.shared).write();
                fold_fields::<A::Batch, A::Fields>(&mut *out, &f.partial);
                f.next_step
            }
        }
    }
}

/// Every instance runs; the first result's shape decides whether the thread
/// folds through the barrier. All threads, the primary included, must agree
/// on that shape or the rendezvous never completes.
fn run_parallel<A, P>(ctx: &RunContext<'_, A>, set: &mut WorkerSet<A, P>, step: StepIndex) -> ControlCode
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    let tag = StepTag::new(step, Policy::Parallel);
    let mut merge = LocalMerge::<A>::Empty;
    set.step_all(tag, |_, result| merge.absorb(step, result));
    ctx.complete(set.thread(), merge)
}

fn run_separate<A, P>(ctx: &RunContext<'_, A>, set: &mut WorkerSet<A, P>, step: StepIndex) -> ControlCode
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    let thread = set.thread();
    let lanes = ctx.partition.lanes;
    let mut code = HALT;
    for slot in 0..set.len() {
        for lane in 0..lanes {
            let global = ctx.partition.global_index(thread, slot, lane);
            code = set.step_slot(slot, StepTag::separate(step, global, lane)).next_step();
        }
    }
    code
}

fn run_singlethreaded<A, P>(ctx: &RunContext<'_, A>, set: &mut WorkerSet<A, P>, step: StepIndex) -> ControlCode
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    match set.primary_slot() {
        Some(slot) => {
            let _span = profiler::span("barrier::singlethreaded");
            let section = ctx.barrier.enter_as_master();
            let result = set.step_slot(slot, StepTag::new(step, Policy::Singlethreaded));
            let code = ctx.apply_alone(result);
            ctx.master_code.store(code, Ordering::Relaxed);
            section.release();
            code
        }
        None => {
            ctx.barrier.enter_as_slave();
            // Ordered after the coordinator's store by the barrier mutex.
            ctx.master_code.load(Ordering::Relaxed)
        }
    }
}

fn run_accumulate<A, P>(_ctx: &RunContext<'_, A>, set: &mut WorkerSet<A, P>, step: StepIndex) -> ControlCode
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    let mut code = HALT;
    set.step_all(StepTag::new(step, Policy::Accumulate), |_, result| code = result.next_step());
    code
}

fn run_acc_reset<A, P>(_ctx: &RunContext<'_, A>, set: &mut WorkerSet<A, P>, step: StepIndex) -> ControlCode
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    let slot = set.primary_slot().unwrap_or(0);
    set.step_slot(slot, StepTag::new(step, Policy::AccReset)).next_step()
}
