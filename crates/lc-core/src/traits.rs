//! Core traits for larcal
//!
//! The statistical core never reads detector files or evaluates correction
//! physics itself. Those collaborators plug in through the traits below.

use crate::types::{ChannelGroup, Hit};
use crate::Result;

/// Multiplicative calibration correction applied to a hit's charge before
/// it is histogrammed (space-charge, drift lifetime, YZ uniformity, ...).
pub trait Correction: Send + Sync {
    /// Multiplier for the hit's charge.
    fn factor(&self, hit: &Hit, group: ChannelGroup, is_data: bool) -> f64;

    /// Correction name, for logs.
    fn name(&self) -> &str;
}

/// Identity correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrection;

impl Correction for NoCorrection {
    fn factor(&self, _hit: &Hit, _group: ChannelGroup, _is_data: bool) -> f64 {
        1.0
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// One independent input batch (typically one file of a distributed run).
///
/// Loading may fail; the merge layer skips batches that do.
pub trait BatchSource {
    /// What `load` produces.
    type Output;

    /// Human-readable label for warnings (usually the path).
    fn label(&self) -> String;

    /// Load the batch.
    fn load(&self) -> Result<Self::Output>;
}
