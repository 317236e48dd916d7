use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use lockstep::{
    Algorithm, ConfigError, DispatchError, Dispatcher, LaneBatch, Outcome, Policy, RunOptions,
    SharedValue, StepResult, StepTag, HALT,
};

const STEPS: usize = 5;

#[derive(Default)]
struct CallLog {
    per_instance: Mutex<Vec<u64>>,
}

/// Walks `0 → 1 → … → STEPS - 1` and halts, counting its own invocations.
#[derive(Default)]
struct Countdown {
    calls: u64,
    log: Option<Arc<CallLog>>,
}

impl Algorithm for Countdown {
    type Batch = LaneBatch<u64, 1>;
    type Shared = CallLog;
    type Accumulator = ();
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[Policy::Parallel; STEPS];

    fn init(&mut self, shared: &Arc<CallLog>, _acc: &mut ()) {
        self.log = Some(Arc::clone(shared));
    }

    fn step(&mut self, tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
        self.calls += 1;
        if tag.step + 1 < STEPS {
            return StepResult::control(tag.step as i32 + 1);
        }
        if let Some(log) = self.log.take() {
            log.per_instance.lock().push(self.calls);
        }
        StepResult::control(HALT)
    }
}

fn run_countdown<const THREADS: usize>() {
    let mut d = Dispatcher::<Countdown, 32, THREADS>::new();
    let summary = d.run().unwrap();

    let counts = d.shared().per_instance.lock().clone();
    assert_eq!(counts.len(), 32);
    assert!(counts.iter().all(|&c| c == STEPS as u64), "{counts:?}");

    assert_eq!(summary.threads, THREADS);
    assert_eq!(summary.invocations, vec![STEPS as u64; THREADS]);
    assert_eq!(summary.cycles, 0);
}

#[test]
fn control_sequence_one_thread() {
    run_countdown::<1>();
}

#[test]
fn control_sequence_two_threads() {
    run_countdown::<2>();
}

#[test]
fn control_sequence_four_threads() {
    run_countdown::<4>();
}

#[test]
fn control_sequence_eight_threads() {
    run_countdown::<8>();
}

#[derive(Default)]
struct PolicyCounters {
    parallel: AtomicU64,
    separate: AtomicU64,
    accumulate: AtomicU64,
    singlethreaded: AtomicU64,
    acc_reset: AtomicU64,
}

/// Visits every policy once and counts who ran where.
#[derive(Default)]
struct Tour {
    counters: Option<Arc<PolicyCounters>>,
}

impl Algorithm for Tour {
    type Batch = LaneBatch<u64, 2>;
    type Shared = PolicyCounters;
    type Accumulator = ();
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[
        Policy::Parallel,
        Policy::Separate,
        Policy::Accumulate,
        Policy::Singlethreaded,
        Policy::AccReset,
        Policy::Parallel,
    ];

    fn init(&mut self, shared: &Arc<PolicyCounters>, _acc: &mut ()) {
        self.counters = Some(Arc::clone(shared));
    }

    fn step(&mut self, tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
        let Some(c) = self.counters.as_ref() else {
            return StepResult::control(HALT);
        };
        let counter = match tag.policy {
            Policy::Parallel => &c.parallel,
            Policy::Separate => &c.separate,
            Policy::Accumulate => &c.accumulate,
            Policy::Singlethreaded => &c.singlethreaded,
            Policy::AccReset => &c.acc_reset,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if tag.step == 5 {
            self.counters = None;
            StepResult::control(HALT)
        } else {
            StepResult::control(tag.step as i32 + 1)
        }
    }
}

#[test]
fn every_policy_runs_where_it_should() {
    let mut d = Dispatcher::<Tour, 16, 4>::new();
    let summary = d.run().unwrap();

    let c = d.shared();
    // 8 instances of 2 lanes, 2 per thread.
    assert_eq!(c.parallel.load(Ordering::Relaxed), 16);
    assert_eq!(c.separate.load(Ordering::Relaxed), 16);
    assert_eq!(c.accumulate.load(Ordering::Relaxed), 8);
    assert_eq!(c.singlethreaded.load(Ordering::Relaxed), 1);
    assert_eq!(c.acc_reset.load(Ordering::Relaxed), 4);

    assert_eq!(summary.invocations, vec![6; 4]);
    assert_eq!(summary.cycles, 1);
}

#[derive(Default)]
struct Runaway;

impl Algorithm for Runaway {
    type Batch = LaneBatch<u64, 1>;
    type Shared = ();
    type Accumulator = ();
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[Policy::Parallel, Policy::Parallel];

    fn init(&mut self, _shared: &Arc<()>, _acc: &mut ()) {}

    fn step(&mut self, tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
        match tag.step {
            0 => StepResult::control(1),
            _ => StepResult::control(7),
        }
    }
}

#[test]
fn transition_past_max_step_is_an_error() {
    let mut d = Dispatcher::<Runaway, 4, 2>::new();
    let err = d.run().unwrap_err();

    let e = match err {
        DispatchError::StepOutOfRange(e) => e,
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(e.thread, 0);
    assert_eq!(e.from, 1);
    assert_eq!(e.code, 7);
    assert_eq!(e.max_step, 1);
}

#[derive(Default)]
struct ThreadNames {
    seen: Mutex<Vec<String>>,
}

#[derive(Default)]
struct NameRecorder;

impl Algorithm for NameRecorder {
    type Batch = LaneBatch<u64, 1>;
    type Shared = ThreadNames;
    type Accumulator = ();
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[Policy::AccReset];

    fn init(&mut self, shared: &Arc<ThreadNames>, _acc: &mut ()) {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        shared.seen.lock().push(name);
    }

    fn step(&mut self, _tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
        StepResult::control(HALT)
    }
}

#[test]
fn workers_are_named_from_options() {
    let options = RunOptions::new().with_thread_name("stepper").with_stack_size(1 << 20);
    let mut d = Dispatcher::<NameRecorder, 3, 3>::new().with_options(options);
    d.run().unwrap();

    let mut names = d.shared().seen.lock().clone();
    names.sort();
    assert_eq!(names, vec!["stepper-0", "stepper-1", "stepper-2"]);
}

#[test]
fn invalid_options_fail_before_any_thread_starts() {
    let mut d = Dispatcher::<NameRecorder, 2, 2>::new().with_options(RunOptions::new().with_thread_name(""));
    let err = d.run().unwrap_err();

    assert_eq!(err, DispatchError::Config(ConfigError::EmptyThreadName));
    assert_eq!(d.runs(), 0);
    assert!(d.shared().seen.lock().is_empty());
}

#[test]
fn shared_mut_is_available_once_instances_are_gone() {
    let mut d = Dispatcher::<Countdown, 8, 2>::new();
    d.shared_mut().unwrap().per_instance.lock().push(99);
    d.run().unwrap();

    // Instances release their handle at the final step.
    let log = d.shared_mut().unwrap();
    let counts = log.per_instance.get_mut();
    assert_eq!(counts.len(), 9);
    assert_eq!(counts[0], 99);
}

#[derive(Default)]
struct Target {
    value: SharedValue<u64>,
}

fn value(t: &Target) -> &SharedValue<u64> {
    &t.value
}

/// Returns fold-shaped results from steps that never rendezvous.
#[derive(Default)]
struct FoldOutsideParallel;

impl Algorithm for FoldOutsideParallel {
    type Batch = LaneBatch<u64, 4>;
    type Shared = Target;
    type Accumulator = ();
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[
        Policy::Separate,
        Policy::Accumulate,
        Policy::AccReset,
        Policy::Parallel,
    ];

    fn init(&mut self, _shared: &Arc<Target>, _acc: &mut ()) {}

    fn step(&mut self, tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
        match tag.step {
            0 => StepResult::fold(1, LaneBatch::splat(5), value),
            1 => StepResult::accumulate_fold(2, LaneBatch::splat(7), value),
            2 => StepResult::accumulate_fold(3, LaneBatch::splat(9), value),
            _ => StepResult::control(HALT),
        }
    }
}

#[test]
fn fold_results_outside_parallel_only_pick_the_next_step() {
    let mut d = Dispatcher::<FoldOutsideParallel, 8, 2>::new();
    let summary = d.run().unwrap();

    assert_eq!(d.shared().value.get(), 0);
    assert_eq!(summary.cycles, 0);
    assert_eq!(summary.invocations, vec![4, 4]);
}

/// Only the first instance of each thread folds; the rest return plain
/// control codes on the same step.
#[derive(Default)]
struct FirstFolds {
    rank: usize,
}

impl Algorithm for FirstFolds {
    type Batch = LaneBatch<u64, 2>;
    type Shared = Target;
    type Accumulator = usize;
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[Policy::Parallel];

    fn init(&mut self, _shared: &Arc<Target>, seen: &mut usize) {
        *seen += 1;
        self.rank = *seen;
    }

    fn step(&mut self, _tag: StepTag, _acc: &mut usize) -> Outcome<Self> {
        if self.rank == 1 {
            StepResult::fold(HALT, LaneBatch::splat(10), value)
        } else {
            StepResult::control(HALT)
        }
    }
}

#[test]
fn first_result_shape_on_a_thread_decides_the_merge() {
    // 8 instances of 2 lanes, 4 per thread; only slot 0 contributes.
    let mut d = Dispatcher::<FirstFolds, 16, 2>::new();
    let summary = d.run().unwrap();

    assert_eq!(d.shared().value.get(), 2 * 20);
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.invocations, vec![1, 1]);
}
