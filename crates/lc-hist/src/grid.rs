//! Two-dimensional binned grid (the 2-D analogue of [`BinnedDistribution`]).
//!
//! [`BinnedDistribution`]: crate::BinnedDistribution

use lc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A 2-D grid of contents and squared errors, row-major in `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedGrid {
    /// X edges (length `nx + 1`).
    pub x_edges: Vec<f64>,
    /// Y edges (length `ny + 1`).
    pub y_edges: Vec<f64>,
    /// Contents, index `ix * ny + iy`.
    pub contents: Vec<f64>,
    /// Squared errors, same layout as `contents`.
    pub sumw2: Vec<f64>,
}

impl BinnedGrid {
    /// Empty grid with the given edges.
    pub fn new(x_edges: Vec<f64>, y_edges: Vec<f64>) -> Result<Self> {
        for (name, e) in [("x", &x_edges), ("y", &y_edges)] {
            if e.len() < 2 || e.windows(2).any(|w| !(w[0] < w[1])) {
                return Err(Error::Validation(format!(
                    "{name} edges must have at least 2 strictly increasing values"
                )));
            }
        }
        let n = (x_edges.len() - 1) * (y_edges.len() - 1);
        Ok(Self { x_edges, y_edges, contents: vec![0.0; n], sumw2: vec![0.0; n] })
    }

    /// Number of x bins.
    pub fn nx(&self) -> usize {
        self.x_edges.len() - 1
    }

    /// Number of y bins.
    pub fn ny(&self) -> usize {
        self.y_edges.len() - 1
    }

    fn idx(&self, ix: usize, iy: usize) -> usize {
        ix * self.ny() + iy
    }

    /// Content of cell `(ix, iy)` (0-based).
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[self.idx(ix, iy)]
    }

    /// Error of cell `(ix, iy)`.
    pub fn error(&self, ix: usize, iy: usize) -> f64 {
        self.sumw2[self.idx(ix, iy)].max(0.0).sqrt()
    }

    /// Overwrite cell `(ix, iy)`.
    pub fn set(&mut self, ix: usize, iy: usize, content: f64, error: f64) {
        let i = self.idx(ix, iy);
        self.contents[i] = content;
        self.sumw2[i] = error * error;
    }

    pub(crate) fn accumulate(&mut self, ix: usize, iy: usize, sumw: f64, sumw2: f64) {
        let i = self.idx(ix, iy);
        self.contents[i] += sumw;
        self.sumw2[i] += sumw2;
    }

    /// Sum of all contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }
}
