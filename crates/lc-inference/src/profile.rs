//! Profiling of sparse histograms into calibration curves.
//!
//! The dynamic profiler walks one axis and groups whole bins into slices
//! holding at least `min_counts` weight, so that sparsely populated regions
//! get wide slices and dense regions narrow ones. Each slice is projected onto
//! a second axis and summarised with the iterative truncated mean.

use lc_core::{Error, Result};
use lc_hist::{BinnedDistribution, BinnedGrid, SparseHistogram};
use serde::{Deserialize, Serialize};

use crate::curve::{CalibrationCurve, GridPoint, GridProfile, ProfilePoint};
use crate::truncated_mean::{TruncatedMeanConfig, TruncatedMeanResult, iterative_truncated_mean};

/// What to do with a final slice that did not reach `min_counts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Keep it as its own (under-filled) slice.
    #[default]
    Keep,
    /// Fold it into the previous slice.
    MergeIntoPrevious,
}

/// Dynamic profile settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Minimum slice weight.
    pub min_counts: f64,
    /// Under-filled last slice handling.
    pub tail: TailPolicy,
    /// Return the per-slice projections alongside the curve.
    pub retain_projections: bool,
    /// Estimator settings.
    pub estimator: TruncatedMeanConfig,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_counts: 1000.0,
            tail: TailPolicy::Keep,
            retain_projections: false,
            estimator: TruncatedMeanConfig::default(),
        }
    }
}

impl ProfileConfig {
    /// Check the settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_counts.is_finite() && self.min_counts >= 0.0) {
            return Err(Error::Validation(format!(
                "min_counts must be finite and >= 0, got {}",
                self.min_counts
            )));
        }
        self.estimator.validate()
    }
}

/// A slice of whole bins along the profile axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinRange {
    /// First bin (1-based, inclusive).
    pub first: usize,
    /// Last bin (1-based, inclusive).
    pub last: usize,
    /// Total weight.
    pub counts: f64,
}

/// One profiled projection axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileResult {
    /// The curve.
    pub curve: CalibrationCurve,
    /// Slice weights on the same edges as the curve.
    pub summary: BinnedDistribution,
    /// Per-slice projections (empty unless `retain_projections`).
    pub projections: Vec<BinnedDistribution>,
}

/// Split `axis` into slices of whole bins with at least `min_counts` weight.
///
/// Bins are taken greedily from bin 1, always at least one per slice. Every
/// slice except possibly the last reaches `min_counts`; the slices tile the
/// axis. Weights are taken from the current view of `hist`, so restrictions
/// on other axes apply.
pub fn dynamic_bin_ranges(
    hist: &SparseHistogram,
    axis: usize,
    min_counts: f64,
    tail: TailPolicy,
) -> Result<Vec<BinRange>> {
    let totals = hist.axis_totals(axis)?;
    let n = totals.len();
    let mut ranges = Vec::new();
    let mut first = 1;
    while first <= n {
        let mut last = first;
        let mut counts = totals[first - 1];
        while counts < min_counts && last < n {
            last += 1;
            counts += totals[last - 1];
        }
        ranges.push(BinRange { first, last, counts });
        first = last + 1;
    }

    if tail == TailPolicy::MergeIntoPrevious
        && ranges.len() >= 2
        && let Some(tail_range) = ranges.last().copied()
        && tail_range.counts < min_counts
    {
        ranges.pop();
        if let Some(prev) = ranges.last_mut() {
            prev.last = tail_range.last;
            prev.counts += tail_range.counts;
        }
    }
    Ok(ranges)
}

fn check_distinct_axes(hist: &SparseHistogram, axes: &[usize]) -> Result<()> {
    for (i, &a) in axes.iter().enumerate() {
        hist.axis(a)?;
        if axes[..i].contains(&a) {
            return Err(Error::Validation(format!("axis {a} used twice in one profile")));
        }
    }
    Ok(())
}

/// Estimator outcome for one slice or block.
enum Estimate {
    Done(TruncatedMeanResult),
    Skipped(String),
}

fn estimate(proj: &BinnedDistribution, cfg: &TruncatedMeanConfig) -> Result<Estimate> {
    match iterative_truncated_mean(proj, cfg) {
        Ok(r) => Ok(Estimate::Done(r)),
        Err(e) if e.is_recoverable() => Ok(Estimate::Skipped(e.to_string())),
        Err(e) => Err(e),
    }
}

/// Dynamic profile of `projection_axis` along `profile_axis`.
///
/// Restrictions applied for each slice are released before returning, also
/// on error. Empty slices are skipped: their curve bin stays at zero and the
/// point records why.
pub fn profile_dynamic(
    hist: &mut SparseHistogram,
    profile_axis: usize,
    projection_axis: usize,
    cfg: &ProfileConfig,
) -> Result<ProfileResult> {
    let mut out = profile_dynamic_multi(hist, profile_axis, &[projection_axis], cfg)?;
    out.pop().ok_or_else(|| Error::Computation("profile produced no result".into()))
}

/// Dynamic profile of several projection axes over the same slices.
///
/// Results are returned in the order of `projection_axes`.
pub fn profile_dynamic_multi(
    hist: &mut SparseHistogram,
    profile_axis: usize,
    projection_axes: &[usize],
    cfg: &ProfileConfig,
) -> Result<Vec<ProfileResult>> {
    cfg.validate()?;
    if projection_axes.is_empty() {
        return Err(Error::Validation("no projection axes given".into()));
    }
    let mut all_axes = vec![profile_axis];
    all_axes.extend_from_slice(projection_axes);
    check_distinct_axes(hist, &all_axes)?;

    let ranges = dynamic_bin_ranges(hist, profile_axis, cfg.min_counts, cfg.tail)?;
    let axis = hist.axis(profile_axis)?.clone();
    let mut edges = Vec::with_capacity(ranges.len() + 1);
    edges.push(axis.bin_low_edge(1));
    edges.extend(ranges.iter().map(|r| axis.bin_up_edge(r.last)));

    let mut summary = BinnedDistribution::new(edges.clone())?;
    for (i, r) in ranges.iter().enumerate() {
        summary.set_bin(i, r.counts, r.counts.max(0.0).sqrt());
    }
    tracing::debug!(profile_axis, slices = ranges.len(), min_counts = cfg.min_counts, "dynamic binning");

    let mut results = Vec::with_capacity(projection_axes.len());
    for &p in projection_axes {
        results.push(ProfileResult {
            curve: CalibrationCurve {
                profile_axis,
                projection_axis: p,
                distribution: BinnedDistribution::new(edges.clone())?,
                points: Vec::with_capacity(ranges.len()),
            },
            summary: summary.clone(),
            projections: Vec::new(),
        });
    }

    for (i, r) in ranges.iter().enumerate() {
        let low = axis.bin_low_edge(r.first);
        let high = axis.bin_up_edge(r.last);
        let view = hist.restrict(profile_axis, r.first, r.last)?;
        for (res, &p) in results.iter_mut().zip(projection_axes) {
            let proj = view.project_1d(p)?;
            let mut point = ProfilePoint::empty(r.first, r.last, low, high, r.counts);
            match estimate(&proj, &cfg.estimator)? {
                Estimate::Done(est) => {
                    if !est.converged {
                        tracing::warn!(slice = i, low, high, projection_axis = p, "slice did not converge");
                    }
                    res.curve.distribution.set_bin(i, est.value, est.uncertainty);
                    point.value = est.value;
                    point.uncertainty = est.uncertainty;
                    point.iterations = est.iterations;
                    point.converged = est.converged;
                }
                Estimate::Skipped(reason) => {
                    tracing::debug!(slice = i, low, high, projection_axis = p, %reason, "skipping slice");
                    point.skipped = Some(reason);
                }
            }
            res.curve.points.push(point);
            if cfg.retain_projections {
                res.projections.push(proj);
            }
        }
    }
    Ok(results)
}

/// Fixed 2-D block profile settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// First profile axis.
    pub x_axis: usize,
    /// Second profile axis.
    pub y_axis: usize,
    /// Blocks along `x_axis`.
    pub nx: usize,
    /// Blocks along `y_axis`.
    pub ny: usize,
    /// Axis the truncated mean is computed on.
    pub projection_axis: usize,
}

/// Split `n_bins` into `n_blocks` blocks of whole bins (1-based, inclusive).
///
/// Blocks have `n_bins / n_blocks` bins; the last absorbs the remainder.
pub fn fixed_blocks(n_bins: usize, n_blocks: usize) -> Result<Vec<(usize, usize)>> {
    if n_blocks == 0 || n_blocks > n_bins {
        return Err(Error::Validation(format!(
            "cannot split {n_bins} bins into {n_blocks} blocks"
        )));
    }
    let width = n_bins / n_blocks;
    Ok((0..n_blocks)
        .map(|k| {
            let first = k * width + 1;
            let last = if k + 1 == n_blocks { n_bins } else { (k + 1) * width };
            (first, last)
        })
        .collect())
}

/// Truncated mean of `grid.projection_axis` in each of `nx * ny` blocks.
pub fn profile_grid(
    hist: &mut SparseHistogram,
    grid: &GridConfig,
    estimator: &TruncatedMeanConfig,
) -> Result<GridProfile> {
    estimator.validate()?;
    check_distinct_axes(hist, &[grid.x_axis, grid.y_axis, grid.projection_axis])?;
    let x_axis = hist.axis(grid.x_axis)?.clone();
    let y_axis = hist.axis(grid.y_axis)?.clone();
    let x_blocks = fixed_blocks(x_axis.n_bins, grid.nx)?;
    let y_blocks = fixed_blocks(y_axis.n_bins, grid.ny)?;

    let block_edges = |axis: &lc_hist::Axis, blocks: &[(usize, usize)]| {
        let mut e = vec![axis.bin_low_edge(1)];
        e.extend(blocks.iter().map(|&(_, last)| axis.bin_up_edge(last)));
        e
    };
    let xe = block_edges(&x_axis, &x_blocks);
    let ye = block_edges(&y_axis, &y_blocks);
    let mut values = BinnedGrid::new(xe.clone(), ye.clone())?;
    let mut counts = BinnedGrid::new(xe, ye)?;
    let mut points = Vec::with_capacity(grid.nx * grid.ny);

    for (ix, &(x_first, x_last)) in x_blocks.iter().enumerate() {
        let mut x_view = hist.restrict(grid.x_axis, x_first, x_last)?;
        for (iy, &(y_first, y_last)) in y_blocks.iter().enumerate() {
            let block = x_view.restrict(grid.y_axis, y_first, y_last)?;
            let proj = block.project_1d(grid.projection_axis)?;
            let weight = proj.integral();
            counts.set(ix, iy, weight, weight.max(0.0).sqrt());
            let mut point = GridPoint {
                ix,
                iy,
                x_bins: (x_first, x_last),
                y_bins: (y_first, y_last),
                counts: weight,
                value: 0.0,
                uncertainty: 0.0,
                converged: false,
                skipped: None,
            };
            match estimate(&proj, estimator)? {
                Estimate::Done(est) => {
                    values.set(ix, iy, est.value, est.uncertainty);
                    point.value = est.value;
                    point.uncertainty = est.uncertainty;
                    point.converged = est.converged;
                }
                Estimate::Skipped(reason) => {
                    tracing::debug!(ix, iy, %reason, "skipping block");
                    point.skipped = Some(reason);
                }
            }
            points.push(point);
        }
    }
    tracing::debug!(nx = grid.nx, ny = grid.ny, "grid profile complete");
    Ok(GridProfile {
        x_axis: grid.x_axis,
        y_axis: grid.y_axis,
        projection_axis: grid.projection_axis,
        values,
        counts,
        points,
    })
}
