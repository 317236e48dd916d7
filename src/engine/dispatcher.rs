//! Dispatcher: owns the run state and drives every worker loop.
//!
//! A dispatcher is fixed at compile time by its algorithm, work size and
//! thread count:
//!
//! ```text
//! Dispatcher<A, Z, THREADS, P = A>
//!            │  │  │        └ primary variant on thread 0
//!            │  │  └ worker threads
//!            │  └ logical work units
//!            └ algorithm replicated over the work units
//! ```
//!
//! The layout (`Z` divisible by `THREADS × LANES`, at least one instance per
//! thread), the schedule length and the primary's schedule are checked by
//! `const` assertions evaluated when the dispatcher type is instantiated; an
//! invalid combination fails to compile.
//!
//! ## Run
//!
//! [`Dispatcher::run`] builds a rayon pool of exactly `THREADS` named threads
//! and broadcasts the worker loop to all of them. Broadcast index `0` is the
//! coordinator. Each thread builds its own [`WorkerSet`], starts at step `0`
//! and follows the control codes its step handlers return until one of them
//! halts. `run` takes `&mut self`, so two runs can never share a barrier.

use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::algorithm::Algorithm;
use crate::engine::barrier::PhaseBarrier;
use crate::engine::batch::Batch;
use crate::engine::config::RunOptions;
use crate::engine::error::{DispatchResult, StepOutOfRangeError};
use crate::engine::exchange::Exchange;
use crate::engine::scheduler::{RunContext, StepTable};
use crate::engine::types::{next_step, same_schedule, Policy, StepIndex, ThreadIndex, HALT};
use crate::engine::worker::{Partition, WorkerSet};
use crate::profiling::profiler::{self, Arg};

/// Statistics of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Worker threads that took part.
    pub threads: usize,

    /// Barrier cycles completed during the run.
    pub cycles: u64,

    /// Step handler invocations per thread, indexed by thread.
    pub invocations: Vec<u64>,

    /// Wall time from pool start to the last worker finishing.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Step handler invocations summed over all threads.
    pub fn total_invocations(&self) -> u64 {
        self.invocations.iter().sum()
    }
}

/// Phase-synchronized executor of algorithm `A` over `Z` work units on
/// `THREADS` threads, with `P` as the coordinator's primary instance.
pub struct Dispatcher<A, const Z: usize, const THREADS: usize, P = A>
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    shared: Arc<A::Shared>,
    barrier: PhaseBarrier,
    exchange: Exchange<A::Batch, A::Fields>,
    master_code: AtomicI32,
    table: StepTable<A, P>,
    options: RunOptions,
    runs: u64,
}

impl<A, const Z: usize, const THREADS: usize, P> Dispatcher<A, Z, THREADS, P>
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    /// Work layout of this dispatcher type.
    pub const LAYOUT: Partition = Partition::new(Z, THREADS, <A::Batch as Batch>::LANES);

    const CHECK: () = {
        assert!(THREADS > 0, "dispatcher needs at least one thread");
        assert!(<A::Batch as Batch>::LANES > 0, "batch must have at least one lane");
        assert!(
            Self::LAYOUT.is_valid(),
            "Z must split into THREADS x LANES with at least one instance per thread"
        );
        assert!(!A::SCHEDULE.is_empty(), "schedule must contain at least one step");
        assert!(A::MAX_STEP + 1 == A::SCHEDULE.len(), "schedule must cover [0, MAX_STEP]");
        assert!(
            same_schedule(A::SCHEDULE, P::SCHEDULE),
            "primary variant must use the same schedule"
        );
    };

    /// Creates a dispatcher with default shared state and options.
    pub fn new() -> Self {
        Self::with_shared(A::Shared::default())
    }

    /// Creates a dispatcher around the given shared state.
    pub fn with_shared(shared: A::Shared) -> Self {
        let () = Self::CHECK;

        Self {
            shared: Arc::new(shared),
            barrier: PhaseBarrier::new(THREADS),
            exchange: Exchange::new(THREADS),
            master_code: AtomicI32::new(HALT),
            table: StepTable::build(),
            options: RunOptions::default(),
            runs: 0,
        }
    }

    /// Replaces the run options. They are validated by [`Dispatcher::run`].
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs every worker loop to completion.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Config`](crate::DispatchError::Config) if the run
    ///   options are invalid,
    /// * [`DispatchError::ThreadPool`](crate::DispatchError::ThreadPool) if
    ///   the worker threads cannot be spawned,
    /// * [`DispatchError::StepOutOfRange`](crate::DispatchError::StepOutOfRange)
    ///   if a step transitioned past `MAX_STEP`. The lowest failing thread is
    ///   reported.
    pub fn run(&mut self) -> DispatchResult<RunSummary> {
        self.options.validate()?;

        let names = self.options.clone();
        let mut builder = rayon::ThreadPoolBuilder::new()
            .num_threads(THREADS)
            .thread_name(move |i| names.thread_name(i));
        if let Some(bytes) = self.options.stack_size() {
            builder = builder.stack_size(bytes);
        }
        let pool = builder.build()?;

        self.runs += 1;
        log::info!(
            "run {}: {} work units, {} threads, {} instances per thread, {} steps",
            self.runs,
            Z,
            THREADS,
            Self::LAYOUT.instances_per_thread(),
            A::SCHEDULE.len()
        );

        let _span = profiler::span("dispatcher::run").arg("threads", Arg::U64(THREADS as u64));
        let cycles_before = self.barrier.cycles();
        let started = Instant::now();

        let this = &*self;
        let reports = pool.broadcast(|ctx| this.worker_loop(ctx.index()));

        let elapsed = started.elapsed();
        let mut invocations = Vec::with_capacity(THREADS);
        let mut failure = None;
        for report in reports {
            match report {
                Ok(count) => invocations.push(count),
                Err((count, err)) => {
                    invocations.push(count);
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            log::error!("run {} aborted: {err}", self.runs);
            return Err(err.into());
        }

        let summary = RunSummary {
            threads: THREADS,
            cycles: self.barrier.cycles() - cycles_before,
            invocations,
            elapsed,
        };
        log::info!(
            "run {} finished in {:?}: {} step invocations, {} barrier cycles",
            self.runs,
            summary.elapsed,
            summary.total_invocations(),
            summary.cycles
        );
        Ok(summary)
    }

    /// Step loop of one worker thread. Returns the number of step handler
    /// invocations, paired with the error if the loop left the schedule.
    fn worker_loop(&self, thread: ThreadIndex) -> Result<u64, (u64, StepOutOfRangeError)> {
        profiler::thread_name(self.options.thread_name(thread));
        let span = profiler::span_fmt(format_args!("worker {thread}"));

        let partition = Self::LAYOUT;
        let mut set = WorkerSet::<A, P>::build(thread, &partition, &self.shared);
        log::debug!("thread {thread}: {} instances initialized", set.len());

        let ctx = RunContext::<A> {
            shared: self.shared.as_ref(),
            barrier: &self.barrier,
            exchange: &self.exchange,
            partition,
            master_code: &self.master_code,
        };
        let trace = self.options.trace_steps();

        let mut step: StepIndex = 0;
        let mut invocations = 0u64;
        let mut failure = None;
        while let Some(entry) = self.table.entry(step) {
            let code = (entry.handler)(&ctx, &mut set, step);
            invocations += 1;
            if trace {
                log::trace!("thread {thread}: step {step} ({}) -> {code}", entry.policy.name());
            }
            match next_step(code) {
                None => break,
                Some(next) if next <= A::MAX_STEP => step = next,
                Some(_) => {
                    failure = Some(StepOutOfRangeError {
                        thread,
                        from: step,
                        code,
                        max_step: A::MAX_STEP,
                    });
                    break;
                }
            }
        }

        drop(set);
        drop(span.arg("invocations", Arg::U64(invocations)));
        profiler::flush_thread();
        log::debug!("thread {thread}: halted after {invocations} step invocations");

        match failure {
            None => Ok(invocations),
            Some(err) => Err((invocations, err)),
        }
    }

    /// Shared run state.
    pub fn shared(&self) -> &A::Shared {
        &self.shared
    }

    /// Mutable shared state, for initialization between runs.
    ///
    /// Returns `None` while a clone of the shared handle handed out in
    /// [`Algorithm::init`] is still alive somewhere.
    pub fn shared_mut(&mut self) -> Option<&mut A::Shared> {
        Arc::get_mut(&mut self.shared)
    }

    /// Work layout.
    pub fn partition(&self) -> Partition {
        Self::LAYOUT
    }

    /// Current run options.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Schedule as seen by the step table, in step order.
    pub fn policies(&self) -> impl Iterator<Item = Policy> + '_ {
        self.table.policies()
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }
}

impl<A, const Z: usize, const THREADS: usize, P> Default for Dispatcher<A, Z, THREADS, P>
where
    A: Algorithm,
    P: Algorithm<Batch = A::Batch, Shared = A::Shared, Accumulator = A::Accumulator, Fields = A::Fields>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::batch::LaneBatch;
    use crate::engine::step::{SharedValue, StepResult};
    use crate::engine::algorithm::Outcome;
    use crate::engine::types::StepTag;

    #[derive(Default)]
    struct Totals {
        sum: SharedValue<u64>,
    }

    fn sum(s: &Totals) -> &SharedValue<u64> {
        &s.sum
    }

    #[derive(Default)]
    struct CountUp;

    impl Algorithm for CountUp {
        type Batch = LaneBatch<u64, 2>;
        type Shared = Totals;
        type Accumulator = ();
        type Fields = ();
        const SCHEDULE: &'static [Policy] = &[Policy::Parallel, Policy::Parallel];

        fn init(&mut self, _shared: &Arc<Totals>, _acc: &mut ()) {}

        fn step(&mut self, tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
            match tag.step {
                0 => StepResult::fold(1, LaneBatch::splat(1), sum),
                _ => StepResult::control(HALT),
            }
        }
    }

    #[test]
    fn layout_follows_the_type() {
        let d = Dispatcher::<CountUp, 16, 2>::new();
        assert_eq!(d.partition(), Partition::new(16, 2, 2));
        assert_eq!(d.policies().count(), 2);
    }

    #[test]
    fn run_folds_and_reports() {
        let mut d = Dispatcher::<CountUp, 16, 2>::new();
        let summary = d.run().unwrap();
        assert_eq!(d.shared().sum.get(), 16);
        assert_eq!(summary.invocations, vec![2, 2]);
        assert_eq!(summary.cycles, 1);
        assert_eq!(d.runs(), 1);
    }

    #[test]
    fn shared_state_is_mutable_between_runs() {
        let mut d = Dispatcher::<CountUp, 8, 1>::new();
        d.run().unwrap();
        d.shared_mut().unwrap().sum.set(0);
        d.run().unwrap();
        assert_eq!(d.shared().sum.get(), 8);
    }
}
