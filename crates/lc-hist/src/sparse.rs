//! Sparse N-dimensional histogram.
//!
//! Only occupied cells are stored. A calibration histogram typically has
//! five to ten axes with tens to hundreds of bins each, so the dense
//! cross-product would never fit in memory while the set of cells actually
//! hit by tracks does.
//!
//! Cells are keyed by a mixed-radix `u128` built from the 1-based per-axis
//! bin indices. Per-axis restricted ranges narrow what projections see
//! without touching stored data; they are set through [`AxisRestriction`]
//! guards, which put the previous range back when dropped.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use lc_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::binned::BinnedDistribution;
use crate::grid::BinnedGrid;

/// Accumulated weight of one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Sum of weights.
    pub sumw: f64,
    /// Sum of squared weights.
    pub sumw2: f64,
}

impl Cell {
    fn add(&mut self, other: Cell) {
        self.sumw += other.sumw;
        self.sumw2 += other.sumw2;
    }
}

/// Sparse N-D histogram with scoped per-axis view restrictions.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "SparseRepr", into = "SparseRepr")]
pub struct SparseHistogram {
    axes: Vec<Axis>,
    strides: Vec<u128>,
    cells: HashMap<u128, Cell>,
    ranges: Vec<Option<(usize, usize)>>,
    entries: u64,
    dropped: u64,
}

#[derive(Serialize, Deserialize)]
struct StoredCell {
    bins: Vec<usize>,
    sumw: f64,
    sumw2: f64,
}

#[derive(Serialize, Deserialize)]
struct SparseRepr {
    axes: Vec<Axis>,
    cells: Vec<StoredCell>,
    #[serde(default)]
    entries: u64,
    #[serde(default)]
    dropped: u64,
}

impl TryFrom<SparseRepr> for SparseHistogram {
    type Error = Error;

    fn try_from(r: SparseRepr) -> Result<Self> {
        let mut h = SparseHistogram::new(r.axes)?;
        for c in r.cells {
            let key = h.encode(&c.bins)?;
            h.cells.entry(key).or_default().add(Cell { sumw: c.sumw, sumw2: c.sumw2 });
        }
        h.entries = r.entries;
        h.dropped = r.dropped;
        Ok(h)
    }
}

impl From<SparseHistogram> for SparseRepr {
    fn from(h: SparseHistogram) -> Self {
        let mut keys: Vec<u128> = h.cells.keys().copied().collect();
        keys.sort_unstable();
        let cells = keys
            .into_iter()
            .map(|k| {
                let c = h.cells[&k];
                StoredCell { bins: h.decode(k), sumw: c.sumw, sumw2: c.sumw2 }
            })
            .collect();
        Self { axes: h.axes, cells, entries: h.entries, dropped: h.dropped }
    }
}

/// Clones never inherit an active restriction.
impl Clone for SparseHistogram {
    fn clone(&self) -> Self {
        Self {
            axes: self.axes.clone(),
            strides: self.strides.clone(),
            cells: self.cells.clone(),
            ranges: vec![None; self.axes.len()],
            entries: self.entries,
            dropped: self.dropped,
        }
    }
}

/// Equal axes and equal cells; restrictions and counters are ignored.
impl PartialEq for SparseHistogram {
    fn eq(&self, other: &Self) -> bool {
        self.same_shape(other) && self.cells == other.cells
    }
}

impl SparseHistogram {
    /// Empty histogram with the given axes.
    pub fn new(axes: Vec<Axis>) -> Result<Self> {
        if axes.is_empty() {
            return Err(Error::Validation("sparse histogram needs at least one axis".into()));
        }
        let mut strides = Vec::with_capacity(axes.len());
        let mut stride: u128 = 1;
        for (i, a) in axes.iter().enumerate() {
            // Re-check: axis fields are public.
            Axis::new(a.n_bins, a.min, a.max)
                .map_err(|e| Error::Validation(format!("axis {i}: {e}")))?;
            strides.push(stride);
            stride = stride.checked_mul(a.n_bins as u128).ok_or_else(|| {
                Error::Validation(format!(
                    "axis bin counts overflow the 128-bit cell key at axis {i}"
                ))
            })?;
        }
        let ndim = axes.len();
        Ok(Self {
            axes,
            strides,
            cells: HashMap::new(),
            ranges: vec![None; ndim],
            entries: 0,
            dropped: 0,
        })
    }

    /// Same axes, no cells.
    pub fn empty_like(&self) -> Self {
        Self {
            axes: self.axes.clone(),
            strides: self.strides.clone(),
            cells: HashMap::new(),
            ranges: vec![None; self.axes.len()],
            entries: 0,
            dropped: 0,
        }
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Axis definitions.
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Axis `i`.
    pub fn axis(&self, i: usize) -> Result<&Axis> {
        self.axes.get(i).ok_or_else(|| {
            Error::Validation(format!("axis {i} out of range for {}-d histogram", self.ndim()))
        })
    }

    /// Number of stored cells.
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Accepted fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Fills dropped because a coordinate was outside its axis.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn encode(&self, bins: &[usize]) -> Result<u128> {
        if bins.len() != self.ndim() {
            return Err(Error::Validation(format!(
                "expected {} bin indices, got {}",
                self.ndim(),
                bins.len()
            )));
        }
        let mut key = 0u128;
        for ((&b, a), &s) in bins.iter().zip(&self.axes).zip(&self.strides) {
            if b == 0 || b > a.n_bins {
                return Err(Error::Validation(format!(
                    "bin index {b} outside [1, {}]",
                    a.n_bins
                )));
            }
            key += (b as u128 - 1) * s;
        }
        Ok(key)
    }

    fn decode_into(&self, key: u128, bins: &mut [usize]) {
        for ((b, a), &s) in bins.iter_mut().zip(&self.axes).zip(&self.strides) {
            *b = ((key / s) % a.n_bins as u128) as usize + 1;
        }
    }

    fn decode(&self, key: u128) -> Vec<usize> {
        let mut bins = vec![0; self.ndim()];
        self.decode_into(key, &mut bins);
        bins
    }

    /// Fill one measurement tuple with unit weight.
    pub fn fill(&mut self, coords: &[f64]) -> Result<bool> {
        self.fill_weighted(coords, 1.0)
    }

    /// Fill one measurement tuple.
    ///
    /// Returns `Ok(false)` when any coordinate is outside its axis; such
    /// fills are dropped silently apart from the [`dropped`](Self::dropped)
    /// counter.
    pub fn fill_weighted(&mut self, coords: &[f64], weight: f64) -> Result<bool> {
        if coords.len() != self.ndim() {
            return Err(Error::Validation(format!(
                "expected {} coordinates, got {}",
                self.ndim(),
                coords.len()
            )));
        }
        let mut key = 0u128;
        for ((&x, a), &s) in coords.iter().zip(&self.axes).zip(&self.strides) {
            match a.find_bin(x) {
                Some(b) => key += (b as u128 - 1) * s,
                None => {
                    self.dropped += 1;
                    return Ok(false);
                }
            }
        }
        self.cells.entry(key).or_default().add(Cell { sumw: weight, sumw2: weight * weight });
        self.entries += 1;
        Ok(true)
    }

    /// Add raw weight to the cell at 1-based `bins`.
    pub fn add_to_cell(&mut self, bins: &[usize], sumw: f64, sumw2: f64) -> Result<()> {
        let key = self.encode(bins)?;
        self.cells.entry(key).or_default().add(Cell { sumw, sumw2 });
        Ok(())
    }

    /// Cell at 1-based `bins`, if occupied.
    pub fn cell(&self, bins: &[usize]) -> Option<Cell> {
        self.encode(bins).ok().and_then(|k| self.cells.get(&k).copied())
    }

    /// All occupied cells as `(bins, cell)`, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = (Vec<usize>, Cell)> + '_ {
        self.cells.iter().map(|(&k, &c)| (self.decode(k), c))
    }

    /// Active restriction on `axis`, as inclusive 1-based bins.
    pub fn restriction(&self, axis: usize) -> Option<(usize, usize)> {
        self.ranges.get(axis).copied().flatten()
    }

    /// Restrict `axis` to bins `[low, high]` (1-based, inclusive) until the
    /// returned guard is dropped.
    pub fn restrict(&mut self, axis: usize, low: usize, high: usize) -> Result<AxisRestriction<'_>> {
        let n = self.axis(axis)?.n_bins;
        if low == 0 || low > high || high > n {
            return Err(Error::Validation(format!(
                "restriction [{low}, {high}] invalid for axis {axis} with {n} bins"
            )));
        }
        let previous = self.ranges[axis].replace((low, high));
        Ok(AxisRestriction { hist: self, axis, previous })
    }

    /// Drop any restriction on `axis`.
    pub fn clear_restriction(&mut self, axis: usize) {
        if let Some(r) = self.ranges.get_mut(axis) {
            *r = None;
        }
    }

    /// Drop all restrictions.
    pub fn clear_restrictions(&mut self) {
        self.ranges.iter_mut().for_each(|r| *r = None);
    }

    fn in_view(&self, bins: &[usize]) -> bool {
        bins.iter().zip(&self.ranges).all(|(&b, r)| match r {
            Some((lo, hi)) => b >= *lo && b <= *hi,
            None => true,
        })
    }

    /// Visit every cell inside the current view.
    fn for_each_visible(&self, mut f: impl FnMut(&[usize], Cell)) {
        let restricted = self.ranges.iter().any(Option::is_some);
        let mut bins = vec![0; self.ndim()];
        for (&k, &c) in &self.cells {
            self.decode_into(k, &mut bins);
            if !restricted || self.in_view(&bins) {
                f(&bins, c);
            }
        }
    }

    /// Total weight inside the current view.
    pub fn integral(&self) -> f64 {
        let mut s = 0.0;
        self.for_each_visible(|_, c| s += c.sumw);
        s
    }

    /// Per-bin weight along `axis`, summed over all other axes (index `bin - 1`).
    pub fn axis_totals(&self, axis: usize) -> Result<Vec<f64>> {
        let n = self.axis(axis)?.n_bins;
        let mut totals = vec![0.0; n];
        self.for_each_visible(|bins, c| totals[bins[axis] - 1] += c.sumw);
        Ok(totals)
    }

    fn check_projection_axes(&self, axes: &[usize]) -> Result<()> {
        if axes.is_empty() {
            return Err(Error::Validation("projection needs at least one axis".into()));
        }
        for (i, &a) in axes.iter().enumerate() {
            self.axis(a)?;
            if axes[..i].contains(&a) {
                return Err(Error::Validation(format!("axis {a} listed twice in projection")));
            }
        }
        Ok(())
    }

    /// Sum over every axis not in `axes`, keeping `axes` in the given order.
    ///
    /// Cells outside an active restriction (on any axis) are excluded.
    pub fn project(&self, axes: &[usize]) -> Result<SparseHistogram> {
        self.check_projection_axes(axes)?;
        let mut out = SparseHistogram::new(axes.iter().map(|&a| self.axes[a].clone()).collect())?;
        let mut kept = vec![0; axes.len()];
        let mut err = None;
        self.for_each_visible(|bins, c| {
            for (k, &a) in kept.iter_mut().zip(axes) {
                *k = bins[a];
            }
            if let Err(e) = out.add_to_cell(&kept, c.sumw, c.sumw2) {
                err.get_or_insert(e);
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    /// Project onto a single axis.
    pub fn project_1d(&self, axis: usize) -> Result<BinnedDistribution> {
        let mut out = BinnedDistribution::from_axis(self.axis(axis)?)?;
        self.for_each_visible(|bins, c| out.accumulate(bins[axis] - 1, c.sumw, c.sumw2));
        Ok(out)
    }

    /// Project onto two axes.
    pub fn project_2d(&self, x_axis: usize, y_axis: usize) -> Result<BinnedGrid> {
        self.check_projection_axes(&[x_axis, y_axis])?;
        let mut out = BinnedGrid::new(self.axes[x_axis].edges(), self.axes[y_axis].edges())?;
        self.for_each_visible(|bins, c| {
            out.accumulate(bins[x_axis] - 1, bins[y_axis] - 1, c.sumw, c.sumw2)
        });
        Ok(out)
    }

    /// Identical number of axes with identical binning.
    pub fn same_shape(&self, other: &SparseHistogram) -> bool {
        self.ndim() == other.ndim()
            && self.axes.iter().zip(&other.axes).all(|(a, b)| a.same_binning(b))
    }

    /// Add `other` cell by cell. Axes must match exactly.
    pub fn merge(&mut self, other: &SparseHistogram) -> Result<()> {
        if !self.same_shape(other) {
            return Err(Error::ShapeMismatch(format!(
                "cannot merge {}-d histogram {:?} into {}-d histogram {:?}",
                other.ndim(),
                describe(&other.axes),
                self.ndim(),
                describe(&self.axes)
            )));
        }
        for (&k, &c) in &other.cells {
            self.cells.entry(k).or_default().add(c);
        }
        self.entries += other.entries;
        self.dropped += other.dropped;
        Ok(())
    }
}

fn describe(axes: &[Axis]) -> Vec<(usize, f64, f64)> {
    axes.iter().map(|a| (a.n_bins, a.min, a.max)).collect()
}

/// A restricted view of a [`SparseHistogram`] axis.
///
/// Dereferences to the histogram, so projections (and further, nested
/// restrictions) go through the guard. Dropping it restores whatever range
/// the axis had before, on every exit path.
pub struct AxisRestriction<'a> {
    hist: &'a mut SparseHistogram,
    axis: usize,
    previous: Option<(usize, usize)>,
}

impl AxisRestriction<'_> {
    /// Restricted axis.
    pub fn axis(&self) -> usize {
        self.axis
    }
}

impl Deref for AxisRestriction<'_> {
    type Target = SparseHistogram;

    fn deref(&self) -> &SparseHistogram {
        self.hist
    }
}

impl DerefMut for AxisRestriction<'_> {
    fn deref_mut(&mut self) -> &mut SparseHistogram {
        self.hist
    }
}

impl Drop for AxisRestriction<'_> {
    fn drop(&mut self) {
        if let Some(r) = self.hist.ranges.get_mut(self.axis) {
            *r = self.previous;
        }
    }
}
