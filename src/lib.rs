//! # Lockstep
//!
//! Phase-synchronized, data-parallel step execution over a fixed pool of
//! worker threads.
//!
//! An [`Algorithm`] describes the per-instance logic of a computation as a
//! numbered schedule of steps. A [`Dispatcher`] replicates it over `Z` logical
//! work units, spreads the instances evenly over `THREADS` threads, and drives
//! every thread through the schedule. Steps either run thread-locally or meet
//! at a two-phase barrier where the coordinator (thread 0) combines partial
//! results deterministically into the shared run state.
//!
//! ## Design Goals
//! - Compile-time layout: work size, thread count and lanes are type-level
//! - Deterministic reductions (fixed slot and thread order)
//! - One lock per rendezvous; no locks on thread-local steps
//! - Safe, explicit data access for algorithm authors
//!
//! This crate builds as both:
//! - `rlib` (for Rust usage & integration tests)
//! - `cdylib` (for FFI / DLL usage)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Algorithm contract

pub use engine::algorithm::{
    Algorithm,
    Outcome,
    ReducedOf,
    ScalarOf,
};

pub use engine::batch::{
    Batch,
    Lane,
    LaneBatch,
};

pub use engine::step::{
    Fold,
    MultiField,
    MultiFold,
    SharedValue,
    StepResult,
};

pub use engine::types::{
    ControlCode,
    Policy,
    ShardOffset,
    StepIndex,
    StepTag,
    ThreadIndex,
    HALT,
    MASTER_THREAD,
};

// Execution

pub use engine::dispatcher::{
    Dispatcher,
    RunSummary,
};

pub use engine::barrier::{
    MasterSection,
    PhaseBarrier,
};

pub use engine::worker::Partition;

pub use engine::config::{
    RunOptions,
    MIN_STACK_SIZE,
};

pub use engine::reduce::{
    Count,
    MinMax,
    Sum,
    Welford,
};

pub use engine::error::{
    ConfigError,
    DispatchError,
    DispatchResult,
    StepOutOfRangeError,
};

pub use profiling::profiler;

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used harness types.
///
/// Import with:
/// ```rust
/// use lockstep::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Algorithm,
        Batch,
        Dispatcher,
        LaneBatch,
        MultiField,
        Outcome,
        Policy,
        RunOptions,
        SharedValue,
        StepResult,
        StepTag,
        HALT,
    };
}
