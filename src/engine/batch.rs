//! Numeric batch capability.
//!
//! A *batch* is a fixed-size group of `LANES` scalars owned by one algorithm
//! instance. The harness needs exactly four things from it:
//!
//! * default construction (the additive identity),
//! * cloning,
//! * element-wise accumulate (`+=`),
//! * a horizontal fold of all lanes into one scalar.
//!
//! Anything vectorized (explicit SIMD, intrinsics, GPU staging) lives behind
//! the [`Batch`] trait. [`LaneBatch`] is the portable implementation: a
//! cache-line aligned array whose loops the compiler is free to vectorize.
//!
//! The lane count doubles as the per-instance work-unit count (`RO`): one
//! instance owns exactly `LANES` logical work units.

use std::fmt;
use std::ops::{AddAssign, Index, IndexMut};

/// Scalar element of a batch.
pub trait Lane: Copy + Default + PartialEq + AddAssign + fmt::Debug + Send + Sync + 'static {}

impl<T> Lane for T where T: Copy + Default + PartialEq + AddAssign + fmt::Debug + Send + Sync + 'static {}

/// Fixed-size numeric container merged by the dispatcher.
pub trait Batch: Default + Clone + Send + 'static {
    /// Scalar produced by [`Batch::fold`].
    type Scalar: Lane;

    /// Number of lanes; equals the per-instance work-unit count.
    const LANES: usize;

    /// Element-wise `self += rhs`.
    fn accumulate(&mut self, rhs: &Self);

    /// Horizontal sum of all lanes.
    fn fold(&self) -> Self::Scalar;
}

/// Portable, 64-byte aligned batch of `N` lanes.
#[derive(Clone, Copy, PartialEq)]
#[repr(C, align(64))]
pub struct LaneBatch<S: Lane, const N: usize> {
    data: [S; N],
}

impl<S: Lane, const N: usize> LaneBatch<S, N> {
    /// Batch with every lane set to `value`.
    #[inline]
    pub fn splat(value: S) -> Self {
        Self { data: [value; N] }
    }

    /// Batch built from an explicit lane array.
    #[inline]
    pub const fn from_array(data: [S; N]) -> Self {
        Self { data }
    }

    /// Lanes as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[S] {
        &self.data
    }

    /// Lanes as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [S] {
        &mut self.data
    }

    /// Sets every lane to `value`.
    #[inline]
    pub fn fill(&mut self, value: S) {
        self.data = [value; N];
    }

    /// Applies `f` to every lane in place.
    #[inline]
    pub fn apply(&mut self, mut f: impl FnMut(S) -> S) -> &mut Self {
        for x in self.data.iter_mut() {
            *x = f(*x);
        }
        self
    }

    /// Combines lanes pairwise with `rhs` in place.
    #[inline]
    pub fn zip(&mut self, rhs: &Self, mut f: impl FnMut(S, S) -> S) -> &mut Self {
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a = f(*a, *b);
        }
        self
    }
}

impl<S: Lane, const N: usize> Default for LaneBatch<S, N> {
    fn default() -> Self {
        Self { data: [S::default(); N] }
    }
}

impl<S: Lane, const N: usize> fmt::Debug for LaneBatch<S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

impl<S: Lane, const N: usize> AddAssign<&LaneBatch<S, N>> for LaneBatch<S, N> {
    #[inline]
    fn add_assign(&mut self, rhs: &LaneBatch<S, N>) {
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += *b;
        }
    }
}

impl<S: Lane, const N: usize> AddAssign<S> for LaneBatch<S, N> {
    #[inline]
    fn add_assign(&mut self, rhs: S) {
        for a in self.data.iter_mut() {
            *a += rhs;
        }
    }
}

impl<S: Lane, const N: usize> Index<usize> for LaneBatch<S, N> {
    type Output = S;

    #[inline]
    fn index(&self, index: usize) -> &S {
        &self.data[index]
    }
}

impl<S: Lane, const N: usize> IndexMut<usize> for LaneBatch<S, N> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut S {
        &mut self.data[index]
    }
}

impl<S: Lane, const N: usize> Batch for LaneBatch<S, N> {
    type Scalar = S;
    const LANES: usize = N;

    #[inline]
    fn accumulate(&mut self, rhs: &Self) {
        *self += rhs;
    }

    #[inline]
    fn fold(&self) -> S {
        let mut res = S::default();
        for x in self.data.iter() {
            res += *x;
        }
        res
    }
}
