//! Per-thread running statistics.
//!
//! These types are meant to be used as (or inside) an algorithm's
//! `Accumulator`: the dispatcher gives every thread its own accumulator, the
//! instances of that thread update it during `Accumulate` steps, and an
//! `AccReset` step clears it. Accumulators never cross threads during a run;
//! when a run-wide figure is needed the algorithm publishes it through a fold
//! step instead.
//!
//! All types are plain `Copy` data with an associative [`merge`] so partial
//! statistics can still be combined after a run, in a fixed order, with
//! deterministic results.
//!
//! [`merge`]: Welford::merge

/// Number of observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Count(pub u64);

impl Count {
    /// Records one observation.
    #[inline]
    pub fn push(&mut self) {
        self.0 += 1;
    }

    /// Adds another counter.
    #[inline]
    pub fn merge(&mut self, other: &Count) {
        self.0 += other.0;
    }

    /// Back to zero.
    #[inline]
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Floating-point running total.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sum(pub f64);

impl Sum {
    /// Adds one value.
    #[inline]
    pub fn push(&mut self, x: f64) {
        self.0 += x;
    }

    /// Adds another total.
    #[inline]
    pub fn merge(&mut self, other: &Sum) {
        self.0 += other.0;
    }

    /// Back to zero.
    #[inline]
    pub fn reset(&mut self) {
        self.0 = 0.0;
    }
}

/// Smallest and largest observed value.
///
/// Starts at `(+inf, -inf)` so the first observation sets both bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMax {
    /// Smallest observed value.
    pub min: f64,

    /// Largest observed value.
    pub max: f64,
}

impl Default for MinMax {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl MinMax {
    /// Widens the bounds to include `x`.
    #[inline]
    pub fn push(&mut self, x: f64) {
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    /// Widens the bounds to include another range.
    #[inline]
    pub fn merge(&mut self, other: &MinMax) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// `true` until the first observation.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Back to the empty range.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Welford's online mean and variance.
///
/// Numerically stable in a single pass; two partial states combine with
/// Chan et al.'s parallel update, so per-thread statistics can be merged
/// after a run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Welford {
    /// Number of samples.
    pub n: u64,

    /// Running mean.
    pub mean: f64,

    /// Sum of squared deviations from the mean.
    pub m2: f64,
}

impl Welford {
    /// Incorporates one sample.
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Combines another partial state into this one.
    pub fn merge(&mut self, other: &Welford) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.n as f64 / n as f64;
        let m2 = self.m2 + other.m2 + delta * delta * (self.n as f64 * other.n as f64) / n as f64;
        *self = Welford { n, mean, m2 };
    }

    /// Unbiased sample variance; `0.0` with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            0.0
        }
    }

    /// Forgets all samples.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_two_pass() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut w = Welford::default();
        for &x in &xs {
            w.push(x);
        }
        assert_eq!(w.n, 8);
        assert!((w.mean - 5.0).abs() < 1e-12);
        assert!((w.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn welford_merge_equals_single_stream() {
        let xs: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let mut whole = Welford::default();
        xs.iter().for_each(|&x| whole.push(x));

        let mut a = Welford::default();
        let mut b = Welford::default();
        xs[..37].iter().for_each(|&x| a.push(x));
        xs[37..].iter().for_each(|&x| b.push(x));
        a.merge(&b);

        assert_eq!(a.n, whole.n);
        assert!((a.mean - whole.mean).abs() < 1e-12);
        assert!((a.variance() - whole.variance()).abs() < 1e-12);
    }

    #[test]
    fn minmax_starts_empty() {
        let mut m = MinMax::default();
        assert!(m.is_empty());
        m.push(3.0);
        m.push(-1.0);
        assert_eq!((m.min, m.max), (-1.0, 3.0));
        m.reset();
        assert!(m.is_empty());
    }

    #[test]
    fn counters_merge_and_reset() {
        let mut c = Count::default();
        c.push();
        c.push();
        c.merge(&Count(3));
        assert_eq!(c, Count(5));
        c.reset();
        assert_eq!(c, Count(0));

        let mut s = Sum::default();
        s.push(1.5);
        s.merge(&Sum(2.5));
        assert_eq!(s, Sum(4.0));
    }
}
