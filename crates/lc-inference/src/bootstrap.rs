//! Bootstrap propagation of per-bin errors into the mean of a distribution.
//!
//! Each throw perturbs every bin by a Gaussian of width equal to the bin
//! error, clamps at zero and records the mean of bin centers. The spread of
//! those means is the uncertainty on the mean; it stays valid after
//! truncation and with non-uniform bin errors, where `rms / sqrt(N)` is not.

use lc_core::{Error, Result};
use lc_hist::BinnedDistribution;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Default number of throws.
pub const DEFAULT_THROWS: usize = 1000;

/// Default seed (the historical default of the calibration macros' RNG).
pub const DEFAULT_SEED: u64 = 4357;

/// Bootstrap settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of perturbed throws.
    pub throws: usize,
    /// RNG seed; every call with the same seed draws the same sequence.
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self { throws: DEFAULT_THROWS, seed: DEFAULT_SEED }
    }
}

/// Mean and spread of the bootstrap means.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapEstimate {
    /// Mean of the per-throw means.
    pub mean: f64,
    /// Population RMS of the per-throw means.
    pub rms: f64,
    /// Throws that produced a mean (a throw whose clamped total is zero has none).
    pub throws_used: usize,
}

/// Population mean and RMS of `values` (`NaN` for an empty slice).
pub fn mean_and_rms(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.max(0.0).sqrt())
}

/// Bootstrap the mean of `dist` with `cfg.throws` Gaussian perturbations.
pub fn bootstrap_mean(dist: &BinnedDistribution, cfg: &BootstrapConfig) -> Result<BootstrapEstimate> {
    if cfg.throws == 0 {
        return Err(Error::Validation("bootstrap needs at least one throw".into()));
    }
    // Fails with EmptyDistribution before any sampling.
    dist.mean()?;

    let errors = dist.errors();
    let mut scratch = dist.clone();
    let mut rng = rand::rngs::StdRng::seed_from_u64(cfg.seed);
    let mut means = Vec::with_capacity(cfg.throws);

    for _ in 0..cfg.throws {
        for (i, (&c, &e)) in dist.contents().iter().zip(&errors).enumerate() {
            let z: f64 = rng.sample(StandardNormal);
            scratch.set_bin(i, (c + e * z).max(0.0), 0.0);
        }
        match scratch.mean() {
            Ok(m) => means.push(m),
            Err(Error::EmptyDistribution(_)) => {}
            Err(e) => return Err(e),
        }
    }

    if means.is_empty() {
        return Err(Error::EmptyDistribution(format!(
            "all {} bootstrap throws fluctuated to zero total weight",
            cfg.throws
        )));
    }
    let (mean, rms) = mean_and_rms(&means);
    tracing::trace!(mean, rms, throws_used = means.len(), "bootstrap");
    Ok(BootstrapEstimate { mean, rms, throws_used: means.len() })
}
