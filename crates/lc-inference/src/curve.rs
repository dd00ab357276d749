//! Calibration curve artifacts.

use lc_hist::{BinnedDistribution, BinnedGrid, StoredObject};
use serde::{Deserialize, Serialize};

/// One slice of a dynamic profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// First profile-axis bin of the slice (1-based, inclusive).
    pub first_bin: usize,
    /// Last profile-axis bin of the slice (1-based, inclusive).
    pub last_bin: usize,
    /// Lower edge of the slice.
    pub low: f64,
    /// Upper edge of the slice.
    pub high: f64,
    /// Total weight in the slice.
    pub counts: f64,
    /// Estimated value (0 when skipped).
    pub value: f64,
    /// Uncertainty on `value` (0 when skipped).
    pub uncertainty: f64,
    /// Estimator iterations.
    pub iterations: usize,
    /// Whether the estimator converged.
    pub converged: bool,
    /// Why the slice has no estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl ProfilePoint {
    pub(crate) fn empty(first_bin: usize, last_bin: usize, low: f64, high: f64, counts: f64) -> Self {
        Self {
            first_bin,
            last_bin,
            low,
            high,
            counts,
            value: 0.0,
            uncertainty: 0.0,
            iterations: 0,
            converged: false,
            skipped: None,
        }
    }
}

/// Truncated mean of one projection axis as a function of one profile axis.
///
/// `distribution` has one variable-width bin per slice with the estimate as
/// content and its uncertainty as error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurve {
    /// Profile axis index in the source histogram.
    pub profile_axis: usize,
    /// Projection axis index in the source histogram.
    pub projection_axis: usize,
    /// Curve as a binned distribution.
    pub distribution: BinnedDistribution,
    /// Per-slice diagnostics, in axis order.
    pub points: Vec<ProfilePoint>,
}

impl CalibrationCurve {
    /// Number of slices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// No slices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Slices without an estimate.
    pub fn n_skipped(&self) -> usize {
        self.points.iter().filter(|p| p.skipped.is_some()).count()
    }

    /// Slices with an estimate that did not converge.
    pub fn n_unconverged(&self) -> usize {
        self.points.iter().filter(|p| p.skipped.is_none() && !p.converged).count()
    }
}

impl StoredObject for CalibrationCurve {
    const CLASS_NAME: &'static str = "CalibrationCurve";
}

/// One block of a fixed 2-D profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    /// Block index along x.
    pub ix: usize,
    /// Block index along y.
    pub iy: usize,
    /// Inclusive x bin range (1-based).
    pub x_bins: (usize, usize),
    /// Inclusive y bin range (1-based).
    pub y_bins: (usize, usize),
    /// Total weight in the block.
    pub counts: f64,
    /// Estimated value (0 when skipped).
    pub value: f64,
    /// Uncertainty on `value`.
    pub uncertainty: f64,
    /// Whether the estimator converged.
    pub converged: bool,
    /// Why the block has no estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Truncated mean of one projection axis over a grid of blocks on two axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridProfile {
    /// X axis index in the source histogram.
    pub x_axis: usize,
    /// Y axis index in the source histogram.
    pub y_axis: usize,
    /// Projection axis index in the source histogram.
    pub projection_axis: usize,
    /// Estimates (content) and uncertainties (error) per block.
    pub values: BinnedGrid,
    /// Block weights.
    pub counts: BinnedGrid,
    /// Per-block diagnostics, x-major.
    pub points: Vec<GridPoint>,
}

impl StoredObject for GridProfile {
    const CLASS_NAME: &'static str = "GridProfile";
}
