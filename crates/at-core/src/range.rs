//! Closed real intervals used as cut windows.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-width of a "point" range built by [`Range::point`].
///
/// Smallest representable reciprocal, so a point range only admits values
/// that compare equal to the point itself.
pub const POINT_EPSILON: f64 = 1.0 / f64::MAX;

/// Closed interval `[lower, upper]` with `lower <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    lower: f64,
    upper: f64,
}

/// A list of ranges, interpreted as their union.
pub type Ranges = Vec<Range>;

impl Default for Range {
    fn default() -> Self {
        Self { lower: f64::NEG_INFINITY, upper: f64::INFINITY }
    }
}

impl Range {
    /// Create `[lower, upper]`; fails if `lower > upper` or either limit is NaN.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        check(lower, upper)?;
        Ok(Self { lower, upper })
    }

    /// `[lower, +inf]`.
    pub fn at_least(lower: f64) -> Result<Self> {
        Self::new(lower, f64::INFINITY)
    }

    /// `[-inf, upper]`.
    pub fn at_most(upper: f64) -> Result<Self> {
        Self::new(f64::NEG_INFINITY, upper)
    }

    /// `[value - eps, value + eps]`.
    pub fn point(value: f64) -> Result<Self> {
        Self::new(value - POINT_EPSILON, value + POINT_EPSILON)
    }

    /// Replace both limits.
    pub fn set_limits(&mut self, lower: f64, upper: f64) -> Result<()> {
        check(lower, upper)?;
        self.lower = lower;
        self.upper = upper;
        Ok(())
    }

    /// Replace the lower limit.
    pub fn set_lower(&mut self, lower: f64) -> Result<()> {
        check(lower, self.upper)?;
        self.lower = lower;
        Ok(())
    }

    /// Replace the upper limit.
    pub fn set_upper(&mut self, upper: f64) -> Result<()> {
        check(self.lower, upper)?;
        self.upper = upper;
        Ok(())
    }

    /// Lower limit.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper limit.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// `(lower, upper)`.
    pub fn limits(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    /// Inclusive membership: `lower <= v <= upper`.
    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }

    /// Exclusive membership: `lower < v < upper`.
    #[inline]
    pub fn contains_exclusive(&self, v: f64) -> bool {
        v > self.lower && v < self.upper
    }

    /// Both endpoints of `other` lie inside `self`.
    pub fn contains_range(&self, other: &Range) -> bool {
        self.contains(other.lower) && self.contains(other.upper)
    }

    /// The two ranges share at least one point.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.contains_range(other)
            || other.contains_range(self)
            || self.contains(other.lower)
            || self.contains(other.upper)
            || other.contains(self.lower)
            || other.contains(self.upper)
    }
}

fn check(lower: f64, upper: f64) -> Result<()> {
    // `!(a <= b)` also rejects NaN limits.
    if !(lower <= upper) {
        return Err(Error::InvalidRange { lower, upper });
    }
    Ok(())
}

/// Union test: `true` if any range contains `value`, short-circuiting on the
/// first match. With no ranges, falls back to the truthiness of `value`.
///
/// NaN never passes, also without ranges: a failed computation must not
/// count as a set flag.
pub fn passes(ranges: &[Range], value: f64) -> bool {
    if ranges.is_empty() {
        return value != 0.0 && !value.is_nan();
    }
    ranges.iter().any(|r| r.contains(value))
}
