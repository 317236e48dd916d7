//! Step result shapes.
//!
//! The variant an instance returns from a step decides how the dispatcher
//! combines partial results:
//!
//! * [`StepResult::Control`] carries only a control code; nothing is merged.
//! * [`StepResult::Fold`] partials are accumulated across the thread's
//!   instances, then across threads, and folded into a shared scalar.
//! * [`StepResult::AccumulateFold`] keeps only the *last* local partial per
//!   thread (overwrite), then accumulates across threads and folds.
//! * [`StepResult::MultiFold`] does the same two-level combination over a
//!   structured aggregate of batches, driven by [`MultiField`].
//!
//! Fold targets are **selectors** into the shared run state
//! (`fn(&Shared) -> &SharedValue<_>`), so an instance never needs to hold a
//! reference into memory owned by the dispatcher.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::batch::Batch;
use crate::engine::types::ControlCode;

/// Scalar or aggregate living in the shared run state.
///
/// The coordinator writes it from inside a barrier section; every other thread
/// reads it after being released. The lock is therefore never contended during
/// a run; it exists so shared state stays `Sync` without `unsafe`.
#[derive(Debug, Default)]
pub struct SharedValue<T> {
    value: RwLock<T>,
}

impl<T> SharedValue<T> {
    /// Wraps an initial value.
    pub const fn new(value: T) -> Self {
        Self { value: RwLock::new(value) }
    }

    /// Replaces the stored value.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
    }

    /// Shared access to the stored value.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }

    /// Exclusive access to the stored value.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.value.write()
    }

    /// Consumes the wrapper.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Copy> SharedValue<T> {
    /// Copy of the stored value.
    pub fn get(&self) -> T {
        *self.value.read()
    }
}

/// Structured aggregate of batches reduced field by field.
///
/// Implementors supply the traversal; the dispatcher supplies the operation.
/// `traverse` visits matching batch fields of two aggregates (used for the
/// local and the cross-thread accumulate), `traverse_into` visits each target
/// scalar next to its source batch (used for the final fold).
pub trait MultiField<B: Batch>: Default + Send + 'static {
    /// Reduced form stored in the shared state, one scalar per field.
    type Reduced: Send + Sync + 'static;

    /// Calls `op(lhs_field, rhs_field)` for every batch field.
    fn traverse<F>(&mut self, rhs: &Self, op: F)
    where
        F: FnMut(&mut B, &B);

    /// Calls `op(target_scalar, source_field)` for every field.
    fn traverse_into<F>(target: &mut Self::Reduced, source: &Self, op: F)
    where
        F: FnMut(&mut B::Scalar, &B);
}

/// Placeholder aggregate for algorithms without multi-field steps.
impl<B: Batch> MultiField<B> for () {
    type Reduced = ();

    fn traverse<F>(&mut self, _rhs: &Self, _op: F)
    where
        F: FnMut(&mut B, &B),
    {
    }

    fn traverse_into<F>(_target: &mut (), _source: &Self, _op: F)
    where
        F: FnMut(&mut B::Scalar, &B),
    {
    }
}

/// Accumulates `rhs` into `lhs` field by field.
pub fn accumulate_fields<B: Batch, M: MultiField<B>>(lhs: &mut M, rhs: &M) {
    lhs.traverse(rhs, |a, b| a.accumulate(b));
}

/// Folds every field of `source` into the matching scalar of `target`.
pub fn fold_fields<B: Batch, M: MultiField<B>>(target: &mut M::Reduced, source: &M) {
    M::traverse_into(target, source, |t, s| *t = s.fold());
}

/// Single-batch fold request.
pub struct Fold<B: Batch, S> {
    /// Step to continue with once the fold completed.
    pub next_step: ControlCode,

    /// This instance's partial batch.
    pub partial: B,

    /// Destination of the fully reduced scalar.
    pub target: fn(&S) -> &SharedValue<B::Scalar>,
}

impl<B: Batch, S> Fold<B, S> {
    /// Creates a fold request.
    pub fn new(next_step: ControlCode, partial: B, target: fn(&S) -> &SharedValue<B::Scalar>) -> Self {
        Self { next_step, partial, target }
    }
}

/// Multi-field fold request.
pub struct MultiFold<B: Batch, M: MultiField<B>, S> {
    /// Step to continue with once the fold completed.
    pub next_step: ControlCode,

    /// This instance's partial aggregate.
    pub partial: M,

    /// Destination of the reduced aggregate.
    pub target: fn(&S) -> &SharedValue<M::Reduced>,

    _batch: std::marker::PhantomData<fn() -> B>,
}

impl<B: Batch, M: MultiField<B>, S> MultiFold<B, M, S> {
    /// Creates a multi-field fold request.
    pub fn new(next_step: ControlCode, partial: M, target: fn(&S) -> &SharedValue<M::Reduced>) -> Self {
        Self {
            next_step,
            partial,
            target,
            _batch: std::marker::PhantomData,
        }
    }
}

/// Value returned by one instance for one step.
pub enum StepResult<B: Batch, M: MultiField<B>, S> {
    /// Plain control code; negative halts.
    Control(ControlCode),

    /// Accumulate locally, accumulate across threads, fold.
    Fold(Fold<B, S>),

    /// Overwrite locally, accumulate across threads, fold.
    AccumulateFold(Fold<B, S>),

    /// Field-wise accumulate locally and across threads, field-wise fold.
    MultiFold(MultiFold<B, M, S>),
}

impl<B: Batch, M: MultiField<B>, S> StepResult<B, M, S> {
    /// Plain control result.
    #[inline]
    pub fn control(code: ControlCode) -> Self {
        StepResult::Control(code)
    }

    /// Fold result.
    #[inline]
    pub fn fold(next_step: ControlCode, partial: B, target: fn(&S) -> &SharedValue<B::Scalar>) -> Self {
        StepResult::Fold(Fold::new(next_step, partial, target))
    }

    /// Accumulate-fold result.
    #[inline]
    pub fn accumulate_fold(
        next_step: ControlCode,
        partial: B,
        target: fn(&S) -> &SharedValue<B::Scalar>,
    ) -> Self {
        StepResult::AccumulateFold(Fold::new(next_step, partial, target))
    }

    /// Multi-field fold result.
    #[inline]
    pub fn multi_fold(
        next_step: ControlCode,
        partial: M,
        target: fn(&S) -> &SharedValue<M::Reduced>,
    ) -> Self {
        StepResult::MultiFold(MultiFold::new(next_step, partial, target))
    }

    /// The step this result transitions to.
    ///
    /// For fold shapes the embedded next step is authoritative.
    #[inline]
    pub fn next_step(&self) -> ControlCode {
        match self {
            StepResult::Control(code) => *code,
            StepResult::Fold(f) | StepResult::AccumulateFold(f) => f.next_step,
            StepResult::MultiFold(f) => f.next_step,
        }
    }

    /// Returns `true` for the fold-shaped variants.
    #[inline]
    pub fn is_fold(&self) -> bool {
        !matches!(self, StepResult::Control(_))
    }
}
