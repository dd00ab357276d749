//! # lc-inference
//!
//! Estimators and profilers for larcal.
//!
//! This crate provides:
//! - the iterative truncated mean with bootstrap (or standard-error)
//!   uncertainty
//! - dynamic-binning profiles of sparse histograms into calibration curves
//! - fixed 2-D block profiles
//! - parallel profiling of every channel group of a histogram set
//! - data/simulation ratios of calibration curves
//!
//! ## Architecture
//!
//! Estimators work on [`lc_hist::BinnedDistribution`] only; profilers own the
//! restriction/projection dance on [`lc_hist::SparseHistogram`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Bootstrap uncertainty on the mean of a binned distribution.
pub mod bootstrap;
/// Calibration curve and grid profile artifacts.
pub mod curve;
/// Per-group parallel profiling.
pub mod groups;
/// Dynamic-binning and fixed-grid profilers.
pub mod profile;
/// Data/simulation curve ratios.
pub mod ratio;
/// Iterative truncated mean.
pub mod truncated_mean;

pub use bootstrap::{BootstrapConfig, BootstrapEstimate, bootstrap_mean};
pub use curve::{CalibrationCurve, GridPoint, GridProfile, ProfilePoint};
pub use groups::{GroupProfiles, profile_groups};
pub use profile::{
    BinRange, GridConfig, ProfileConfig, ProfileResult, TailPolicy, dynamic_bin_ranges, fixed_blocks,
    profile_dynamic, profile_dynamic_multi, profile_grid,
};
pub use ratio::{CurveRatio, RatioPoint, curve_ratio};
pub use truncated_mean::{
    TruncatedMeanConfig, TruncatedMeanResult, UncertaintyMethod, iterative_truncated_mean,
};
