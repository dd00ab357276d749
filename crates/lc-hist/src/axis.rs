//! Uniform histogram axis.
//!
//! Bin numbering follows ROOT: in-range bins are `1..=n_bins`, so a stored
//! index of `0` never occurs.

use lc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A fixed-width axis of an N-dimensional histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    /// Number of bins.
    pub n_bins: usize,
    /// Lower edge of bin 1.
    pub min: f64,
    /// Upper edge of bin `n_bins`.
    pub max: f64,
    /// Optional axis title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Axis {
    /// Create an axis, validating its definition.
    pub fn new(n_bins: usize, min: f64, max: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::Validation("axis must have at least one bin".into()));
        }
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(Error::Validation(format!("invalid axis range [{min}, {max}]")));
        }
        Ok(Self { n_bins, min, max, title: None })
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Bin width.
    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.n_bins as f64
    }

    /// 1-based bin containing `x` (half-open bins), `None` outside `[min, max)`.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.min && x < self.max) {
            return None;
        }
        let b = ((x - self.min) / self.width()) as usize;
        // Rounding can push values just below `max` onto `n_bins`.
        Some(b.min(self.n_bins - 1) + 1)
    }

    /// Lower edge of 1-based bin `bin`.
    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 1.0) * self.width()
    }

    /// Upper edge of 1-based bin `bin`.
    pub fn bin_up_edge(&self, bin: usize) -> f64 {
        if bin == self.n_bins { self.max } else { self.min + bin as f64 * self.width() }
    }

    /// All `n_bins + 1` edges.
    pub fn edges(&self) -> Vec<f64> {
        (1..=self.n_bins).map(|b| self.bin_low_edge(b)).chain(std::iter::once(self.max)).collect()
    }

    /// Same binning and limits (titles are ignored).
    pub fn same_binning(&self, other: &Axis) -> bool {
        self.n_bins == other.n_bins && self.min == other.min && self.max == other.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_bin_is_one_based_and_half_open() {
        let a = Axis::new(10, 0.0, 10.0).unwrap();
        assert_eq!(a.find_bin(0.0), Some(1));
        assert_eq!(a.find_bin(0.999), Some(1));
        assert_eq!(a.find_bin(1.0), Some(2));
        assert_eq!(a.find_bin(9.999_999), Some(10));
        assert_eq!(a.find_bin(10.0), None);
        assert_eq!(a.find_bin(-0.1), None);
        assert_eq!(a.find_bin(f64::NAN), None);
    }

    #[test]
    fn edges_span_the_axis() {
        let a = Axis::new(4, -2.0, 2.0).unwrap();
        assert_eq!(a.edges(), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(a.bin_low_edge(3), 0.0);
        assert_eq!(a.bin_up_edge(4), 2.0);
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(Axis::new(0, 0.0, 1.0).is_err());
        assert!(Axis::new(5, 1.0, 1.0).is_err());
        assert!(Axis::new(5, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn binning_comparison_ignores_title() {
        let a = Axis::new(5, 0.0, 1.0).unwrap().with_title("x");
        let b = Axis::new(5, 0.0, 1.0).unwrap();
        assert!(a.same_binning(&b));
        assert!(!a.same_binning(&Axis::new(6, 0.0, 1.0).unwrap()));
    }
}
