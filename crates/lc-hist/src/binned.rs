//! One-dimensional weighted histogram with per-bin uncertainties.
//!
//! This is the leaf data structure of the crate: fills accumulate into it,
//! sparse projections produce it, and the truncated-mean estimator consumes it.
//! Bins are 0-based here (plain vectors), unlike the 1-based sparse axes.

use lc_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::axis::Axis;

/// A 1-D binned distribution.
///
/// Errors are kept as a sum of squared weights (`sumw2`), so a filled bin
/// carries `sqrt(sum w^2)` and an explicitly set bin carries whatever error
/// was set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BinnedRepr", into = "BinnedRepr")]
pub struct BinnedDistribution {
    edges: Vec<f64>,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
    uniform: bool,
}

#[derive(Serialize, Deserialize)]
struct BinnedRepr {
    edges: Vec<f64>,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    #[serde(default)]
    underflow: f64,
    #[serde(default)]
    overflow: f64,
    #[serde(default)]
    entries: u64,
}

impl TryFrom<BinnedRepr> for BinnedDistribution {
    type Error = Error;

    fn try_from(r: BinnedRepr) -> Result<Self> {
        let mut d = BinnedDistribution::new(r.edges)?;
        if r.contents.len() != d.n_bins() || r.sumw2.len() != d.n_bins() {
            return Err(Error::Validation(format!(
                "binned distribution has {} bins but {} contents and {} sumw2",
                d.n_bins(),
                r.contents.len(),
                r.sumw2.len()
            )));
        }
        d.contents = r.contents;
        d.sumw2 = r.sumw2;
        d.underflow = r.underflow;
        d.overflow = r.overflow;
        d.entries = r.entries;
        Ok(d)
    }
}

impl From<BinnedDistribution> for BinnedRepr {
    fn from(d: BinnedDistribution) -> Self {
        Self {
            edges: d.edges,
            contents: d.contents,
            sumw2: d.sumw2,
            underflow: d.underflow,
            overflow: d.overflow,
            entries: d.entries,
        }
    }
}

fn check_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Validation(format!(
            "need at least 2 bin edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(Error::Validation("bin edges must be finite".into()));
    }
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Validation("bin edges must be strictly increasing".into()));
    }
    Ok(())
}

fn is_uniform(edges: &[f64]) -> bool {
    let n = edges.len() - 1;
    let w = (edges[n] - edges[0]) / n as f64;
    edges.iter().enumerate().all(|(i, &e)| (e - (edges[0] + i as f64 * w)).abs() <= 1e-12 * w.abs().max(1.0))
}

impl BinnedDistribution {
    /// Empty distribution with the given (strictly increasing) edges.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        check_edges(&edges)?;
        let n = edges.len() - 1;
        let uniform = is_uniform(&edges);
        Ok(Self {
            edges,
            contents: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            uniform,
        })
    }

    /// Empty distribution with `n_bins` equal bins on `[min, max)`.
    pub fn uniform(n_bins: usize, min: f64, max: f64) -> Result<Self> {
        Self::from_axis(&Axis::new(n_bins, min, max)?)
    }

    /// Empty distribution with the binning of a sparse-histogram axis.
    pub fn from_axis(axis: &Axis) -> Result<Self> {
        Self::new(axis.edges())
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    /// Bin edges (length `n_bins + 1`).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bin contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Per-bin sum of squared weights.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Per-bin uncertainties.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|v| v.max(0.0).sqrt()).collect()
    }

    /// Content of bin `i`.
    pub fn content(&self, i: usize) -> f64 {
        self.contents[i]
    }

    /// Uncertainty of bin `i`.
    pub fn error(&self, i: usize) -> f64 {
        self.sumw2[i].max(0.0).sqrt()
    }

    /// Lower edge of bin `i`.
    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.edges[i]
    }

    /// Upper edge of bin `i`.
    pub fn bin_up_edge(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    /// Width of bin `i`.
    pub fn bin_width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Center of bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// Summed weight that fell below the first edge.
    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    /// Summed weight that fell at or above the last edge.
    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Number of in-range fills. Projections start at zero.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Bin index for `x` (half-open bins), `None` for under/overflow.
    ///
    /// Uniform binning uses index arithmetic, variable binning a binary search.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        let n = self.n_bins();
        if !(x >= self.edges[0] && x < self.edges[n]) {
            return None;
        }
        if self.uniform {
            let w = (self.edges[n] - self.edges[0]) / n as f64;
            let b = (((x - self.edges[0]) / w) as usize).min(n - 1);
            return Some(b);
        }
        // First edge strictly greater than x, minus one.
        let upper = self.edges.partition_point(|&e| e <= x);
        Some(upper - 1)
    }

    /// Fill `x` with unit weight.
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Fill `x` with `weight`. Out-of-range values go to the flow counters.
    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        match self.find_bin(x) {
            Some(b) => {
                self.contents[b] += weight;
                self.sumw2[b] += weight * weight;
                self.entries += 1;
            }
            None if x < self.edges[0] => self.underflow += weight,
            None if x >= self.edges[self.n_bins()] => self.overflow += weight,
            // NaN
            None => {}
        }
    }

    /// Overwrite bin `i`.
    pub fn set_bin(&mut self, i: usize, content: f64, error: f64) {
        self.contents[i] = content;
        self.sumw2[i] = error * error;
    }

    /// Add `sumw`/`sumw2` to bin `i` (used by projections).
    pub(crate) fn accumulate(&mut self, i: usize, sumw: f64, sumw2: f64) {
        self.contents[i] += sumw;
        self.sumw2[i] += sumw2;
    }

    /// Zero all bins, flows and the entry count.
    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
        self.sumw2.iter_mut().for_each(|c| *c = 0.0);
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.entries = 0;
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// `integral^2 / sum(error^2)`; equals the entry count for unit-weight fills.
    ///
    /// Falls back to the integral when no errors are set.
    pub fn effective_entries(&self) -> f64 {
        let sw = self.integral();
        let sw2: f64 = self.sumw2.iter().sum();
        if sw2 > 0.0 { sw * sw / sw2 } else { sw }
    }

    fn require_weight(&self, what: &str) -> Result<f64> {
        let total = self.integral();
        if !(total > 0.0) {
            return Err(Error::EmptyDistribution(format!(
                "{what} requested on a distribution with total weight {total}"
            )));
        }
        Ok(total)
    }

    /// Weighted mean of bin centers.
    pub fn mean(&self) -> Result<f64> {
        let total = self.require_weight("mean")?;
        let s: f64 = self.contents.iter().enumerate().map(|(i, &c)| c * self.bin_center(i)).sum();
        Ok(s / total)
    }

    /// Weighted standard deviation of bin centers about [`mean`](Self::mean).
    pub fn rms(&self) -> Result<f64> {
        let total = self.require_weight("rms")?;
        let m = self.mean()?;
        let s: f64 = self
            .contents
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let d = self.bin_center(i) - m;
                c * d * d
            })
            .sum();
        Ok((s / total).max(0.0).sqrt())
    }

    /// Value below which a fraction `q` of the total content lies.
    ///
    /// The cumulative content is walked bin by bin; inside the bin that
    /// straddles `q` the position is linearly interpolated (content is
    /// treated as flat within a bin). `q = 0.5` gives the median.
    pub fn quantile(&self, q: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::Validation(format!("quantile must be in [0, 1], got {q}")));
        }
        let total = self.require_weight("quantile")?;
        let target = q * total;
        let mut cum = 0.0;
        for (i, &c) in self.contents.iter().enumerate() {
            if c <= 0.0 {
                continue;
            }
            if cum + c >= target {
                let frac = ((target - cum) / c).clamp(0.0, 1.0);
                return Ok(self.bin_low_edge(i) + frac * self.bin_width(i));
            }
            cum += c;
        }
        // Rounding left the target a hair above the final cumulative sum.
        let last = self.contents.iter().rposition(|&c| c > 0.0).unwrap_or(self.n_bins() - 1);
        Ok(self.bin_up_edge(last))
    }

    /// Copy with every bin that does not overlap `[low, high]` zeroed.
    ///
    /// A bin `[e_i, e_{i+1}]` survives unless `e_i > high` or `e_{i+1} < low`.
    /// Flow counters are dropped. The source is untouched.
    pub fn restrict_to_window(&self, low: f64, high: f64) -> Self {
        let mut out = self.clone();
        for i in 0..out.n_bins() {
            if out.bin_low_edge(i) > high || out.bin_up_edge(i) < low {
                out.contents[i] = 0.0;
                out.sumw2[i] = 0.0;
            }
        }
        out.underflow = 0.0;
        out.overflow = 0.0;
        out
    }

    /// Same edges as `other`.
    pub fn same_binning(&self, other: &Self) -> bool {
        self.edges == other.edges
    }

    /// Add `other` bin by bin (errors in quadrature).
    pub fn add(&mut self, other: &Self) -> Result<()> {
        if !self.same_binning(other) {
            return Err(Error::ShapeMismatch(format!(
                "cannot add distributions with {} and {} bins / different edges",
                self.n_bins(),
                other.n_bins()
            )));
        }
        for i in 0..self.n_bins() {
            self.contents[i] += other.contents[i];
            self.sumw2[i] += other.sumw2[i];
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat(n: usize, w: f64) -> BinnedDistribution {
        let mut d = BinnedDistribution::uniform(n, 0.0, n as f64).unwrap();
        for i in 0..n {
            d.fill_weighted(i as f64 + 0.5, w);
        }
        d
    }

    #[test]
    fn fill_tracks_flows_and_sumw2() {
        let mut d = BinnedDistribution::uniform(3, 0.0, 3.0).unwrap();
        for x in [0.5, 1.5, 2.5, 0.5, -1.0, 3.0] {
            d.fill(x);
        }
        d.fill_weighted(1.2, 2.0);
        assert_eq!(d.contents(), &[2.0, 3.0, 1.0]);
        assert_eq!(d.sumw2(), &[2.0, 5.0, 1.0]);
        assert_eq!(d.underflow(), 1.0);
        assert_eq!(d.overflow(), 1.0);
        assert_eq!(d.entries(), 5);
        assert_relative_eq!(d.error(1), 5f64.sqrt());
    }

    #[test]
    fn variable_binning_uses_half_open_bins() {
        let d = BinnedDistribution::new(vec![0.0, 1.0, 5.0, 6.0]).unwrap();
        assert_eq!(d.find_bin(0.0), Some(0));
        assert_eq!(d.find_bin(1.0), Some(1));
        assert_eq!(d.find_bin(4.99), Some(1));
        assert_eq!(d.find_bin(5.0), Some(2));
        assert_eq!(d.find_bin(6.0), None);
        assert_eq!(d.find_bin(-0.5), None);
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(BinnedDistribution::new(vec![0.0]).is_err());
        assert!(BinnedDistribution::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(BinnedDistribution::new(vec![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn mean_and_rms_of_bin_centers() {
        let d = flat(4, 1.0);
        assert_relative_eq!(d.mean().unwrap(), 2.0);
        // centers 0.5..3.5: variance 1.25
        assert_relative_eq!(d.rms().unwrap(), 1.25f64.sqrt());
    }

    #[test]
    fn statistics_of_empty_distribution_fail() {
        let d = BinnedDistribution::uniform(4, 0.0, 4.0).unwrap();
        assert!(matches!(d.mean(), Err(Error::EmptyDistribution(_))));
        assert!(matches!(d.rms(), Err(Error::EmptyDistribution(_))));
        assert!(matches!(d.quantile(0.5), Err(Error::EmptyDistribution(_))));
    }

    #[test]
    fn quantile_interpolates_inside_the_straddling_bin() {
        let d = flat(4, 1.0);
        assert_relative_eq!(d.quantile(0.5).unwrap(), 2.0);
        assert_relative_eq!(d.quantile(0.125).unwrap(), 0.5);
        assert_relative_eq!(d.quantile(0.0).unwrap(), 0.0);
        assert_relative_eq!(d.quantile(1.0).unwrap(), 4.0);
        assert!(d.quantile(1.5).is_err());
    }

    #[test]
    fn quantile_skips_empty_leading_bins() {
        let mut d = BinnedDistribution::uniform(4, 0.0, 4.0).unwrap();
        d.fill_weighted(2.5, 4.0);
        assert_relative_eq!(d.quantile(0.0).unwrap(), 2.0);
        assert_relative_eq!(d.quantile(0.5).unwrap(), 2.5);
    }

    #[test]
    fn restrict_to_window_zeroes_non_overlapping_bins_only() {
        let d = flat(6, 2.0);
        let r = d.restrict_to_window(1.5, 3.2);
        assert_eq!(r.contents(), &[0.0, 2.0, 2.0, 2.0, 0.0, 0.0]);
        assert_eq!(r.error(0), 0.0);
        // source untouched
        assert_eq!(d.contents(), &[2.0; 6]);
    }

    #[test]
    fn window_touching_an_edge_keeps_that_bin() {
        let d = flat(4, 1.0);
        let r = d.restrict_to_window(2.0, 2.0);
        assert_eq!(r.contents(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn add_requires_identical_edges() {
        let mut a = flat(3, 1.0);
        let b = flat(3, 2.0);
        a.add(&b).unwrap();
        assert_eq!(a.contents(), &[3.0; 3]);
        assert_eq!(a.sumw2(), &[5.0; 3]);
        let c = flat(4, 1.0);
        assert!(matches!(a.add(&c), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn effective_entries_match_unit_weight_fills() {
        let d = flat(5, 1.0);
        assert_relative_eq!(d.effective_entries(), 5.0);
        let mut e = BinnedDistribution::uniform(2, 0.0, 2.0).unwrap();
        e.set_bin(0, 10.0, 0.0);
        assert_relative_eq!(e.effective_entries(), 10.0);
    }

    #[test]
    fn serde_roundtrip_preserves_bins_and_validates() {
        let mut d = BinnedDistribution::new(vec![0.0, 0.5, 2.0]).unwrap();
        d.fill_weighted(0.1, 3.0);
        d.fill_weighted(7.0, 1.0);
        let s = serde_json::to_string(&d).unwrap();
        let back: BinnedDistribution = serde_json::from_str(&s).unwrap();
        assert_eq!(back, d);
        assert_eq!(back.find_bin(1.0), Some(1));

        let bad = r#"{"edges":[0.0,1.0],"contents":[1.0,2.0],"sumw2":[1.0]}"#;
        assert!(serde_json::from_str::<BinnedDistribution>(bad).is_err());
    }
}
