//! Core Identifiers, Policies, and Step Tags
//!
//! This module defines the **small, copyable vocabulary types** shared by every
//! part of the harness: step and thread indices, control codes, the
//! synchronization [`Policy`] a step runs under, and the [`StepTag`] handed to
//! each algorithm instance when a step is invoked.
//!
//! ## Control codes
//!
//! Steps report where execution continues next through a signed
//! [`ControlCode`]:
//!
//! - a value in `[0, MAX_STEP]` selects the next step,
//! - any negative value terminates the worker loop ([`HALT`] by convention).
//!
//! ## Policies
//!
//! A step's policy decides *who* runs it and *whether* threads rendezvous:
//!
//! | Policy           | Runs on                    | Barrier                    |
//! |------------------|----------------------------|----------------------------|
//! | `Parallel`       | every instance             | only for fold-shaped steps |
//! | `Separate`       | every instance, per lane   | never                      |
//! | `Singlethreaded` | primary instance only      | always                     |
//! | `Accumulate`     | every instance             | never                      |
//! | `AccReset`       | first slot of each thread  | never                      |
//!
//! Policies are fixed by the algorithm's schedule and never change during a
//! run.

/// Index of a step inside an algorithm's schedule.
pub type StepIndex = usize;

/// Index of a worker thread inside a run (`0` is the coordinator).
pub type ThreadIndex = usize;

/// Signed step transition reported by plain-control steps.
pub type ControlCode = i32;

/// Conventional control code that ends the worker loop.
pub const HALT: ControlCode = -1;

/// Thread index that plays the coordinator ("master") role.
pub const MASTER_THREAD: ThreadIndex = 0;

/// Synchronization policy of a single step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Every instance runs; fold-shaped results are merged across threads.
    Parallel,

    /// Every instance runs once per lane with its shard offsets attached.
    Separate,

    /// Only the coordinator's primary instance runs; everyone else waits.
    Singlethreaded,

    /// Every instance updates thread-local running state; no rendezvous.
    Accumulate,

    /// One instance per thread resets thread-local running state.
    AccReset,
}

impl Policy {
    /// Returns `true` if a step under this policy can suspend threads in the
    /// barrier. `Singlethreaded` steps always do; `Parallel` steps only when
    /// they return a fold-shaped result.
    #[inline]
    pub const fn may_synchronize(self) -> bool {
        matches!(self, Policy::Parallel | Policy::Singlethreaded)
    }

    /// Stable ordinal, usable in `const` comparisons.
    #[inline]
    pub const fn ordinal(self) -> u8 {
        match self {
            Policy::Parallel => 0,
            Policy::Separate => 1,
            Policy::Singlethreaded => 2,
            Policy::Accumulate => 3,
            Policy::AccReset => 4,
        }
    }

    /// Short lowercase name used in logs and profiling spans.
    pub const fn name(self) -> &'static str {
        match self {
            Policy::Parallel => "parallel",
            Policy::Separate => "separate",
            Policy::Singlethreaded => "singlethreaded",
            Policy::Accumulate => "accumulate",
            Policy::AccReset => "acc_reset",
        }
    }
}

/// Position of one logical work unit under the `Separate` policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShardOffset {
    /// Index in the global `[0, Z)` work-unit space.
    pub global: usize,

    /// Lane inside the instance's batch (`0..RO`).
    pub local: usize,
}

/// Identifies the step being invoked and the policy it runs under.
///
/// Tags are created by the dispatcher and passed by value; instances branch on
/// [`StepTag::step`] to pick their handler logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepTag {
    /// Step index in `[0, MAX_STEP]`.
    pub step: StepIndex,

    /// Policy fixed by the schedule for this step.
    pub policy: Policy,

    /// Shard offsets; present only under [`Policy::Separate`].
    pub shard: Option<ShardOffset>,
}

impl StepTag {
    /// Creates a tag without shard information.
    #[inline]
    pub const fn new(step: StepIndex, policy: Policy) -> Self {
        Self { step, policy, shard: None }
    }

    /// Creates a `Separate` tag carrying the given offsets.
    #[inline]
    pub const fn separate(step: StepIndex, global: usize, local: usize) -> Self {
        Self {
            step,
            policy: Policy::Separate,
            shard: Some(ShardOffset { global, local }),
        }
    }
}

/// Converts a control code into a step index, `None` meaning "halt".
#[inline]
pub fn next_step(code: ControlCode) -> Option<StepIndex> {
    usize::try_from(code).ok()
}

/// Returns `true` if two schedules are identical, usable in `const` context.
pub const fn same_schedule(a: &[Policy], b: &[Policy]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i].ordinal() != b[i].ordinal() {
            return false;
        }
        i += 1;
    }
    true
}
