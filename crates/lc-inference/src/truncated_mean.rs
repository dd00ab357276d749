//! Iterative truncated mean (ITM).
//!
//! Repeatedly truncate a distribution to a window around its median whose
//! width is proportional to the current RMS, until the mean stops moving.
//! This rejects the long Landau-like upper tail of dE/dx and dQ/dx spectra
//! without fitting a shape.

use lc_core::{Error, Result};
use lc_hist::BinnedDistribution;
use serde::{Deserialize, Serialize};

use crate::bootstrap::{BootstrapConfig, bootstrap_mean};

/// How the uncertainty on the converged value is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyMethod {
    /// Bootstrap the truncated distribution; value and uncertainty are the
    /// mean and RMS of the bootstrap means.
    #[default]
    Bootstrap,
    /// Plain mean, with `rms / sqrt(effective entries)` as uncertainty.
    StandardError,
}

/// Estimator settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncatedMeanConfig {
    /// Lower window edge, in units of the RMS relative to the median.
    pub sigma_low: f64,
    /// Upper window edge, in units of the RMS relative to the median.
    pub sigma_high: f64,
    /// Stop once the mean moves by less than this between iterations.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Uncertainty stage.
    pub uncertainty: UncertaintyMethod,
    /// Bootstrap settings (used by [`UncertaintyMethod::Bootstrap`]).
    pub bootstrap: BootstrapConfig,
}

impl Default for TruncatedMeanConfig {
    fn default() -> Self {
        Self {
            sigma_low: -2.0,
            sigma_high: 1.75,
            tolerance: 1e-4,
            max_iterations: 100,
            uncertainty: UncertaintyMethod::Bootstrap,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl TruncatedMeanConfig {
    /// Check the settings.
    ///
    /// Reversed sigmas are accepted here; the estimator swaps them.
    pub fn validate(&self) -> Result<()> {
        if !self.sigma_low.is_finite() || !self.sigma_high.is_finite() {
            return Err(Error::Validation("sigma_low and sigma_high must be finite".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::Validation(format!("tolerance must be > 0, got {}", self.tolerance)));
        }
        if self.max_iterations == 0 {
            return Err(Error::Validation("max_iterations must be >= 1".into()));
        }
        if self.uncertainty == UncertaintyMethod::Bootstrap && self.bootstrap.throws == 0 {
            return Err(Error::Validation("bootstrap throws must be >= 1".into()));
        }
        Ok(())
    }

    fn ordered_sigmas(&self) -> (f64, f64) {
        if self.sigma_low > self.sigma_high {
            tracing::warn!(
                sigma_low = self.sigma_low,
                sigma_high = self.sigma_high,
                "sigma_low > sigma_high, swapping"
            );
            (self.sigma_high, self.sigma_low)
        } else {
            (self.sigma_low, self.sigma_high)
        }
    }
}

/// Outcome of [`iterative_truncated_mean`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruncatedMeanResult {
    /// Central value.
    pub value: f64,
    /// Uncertainty on `value`.
    pub uncertainty: f64,
    /// Plain mean of the final truncated distribution.
    pub mean: f64,
    /// RMS of the final truncated distribution.
    pub spread: f64,
    /// Last truncation window `(low, high)`; the full span if none was applied.
    pub window: (f64, f64),
    /// Iterations run.
    pub iterations: usize,
    /// Whether the mean settled within tolerance before the cap.
    pub converged: bool,
    /// Shift of the mean in the last iteration (`inf` after a single one).
    pub last_shift: f64,
}

impl TruncatedMeanResult {
    /// Turn a capped run into [`Error::ConvergenceFailure`].
    pub fn require_converged(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(Error::ConvergenceFailure { iterations: self.iterations, last_shift: self.last_shift })
        }
    }
}

/// Iterative truncated mean of `dist` with uncertainty.
///
/// Each iteration computes the mean and RMS; if the mean moved by less than
/// `tolerance` since the previous iteration the loop stops, otherwise the
/// distribution is truncated to
/// `[median + sigma_low * rms, median + sigma_high * rms]`. The first
/// iteration never stops. The input is never modified.
///
/// Hitting `max_iterations` is not an error: the estimate of the last
/// truncated distribution is returned with `converged = false`.
pub fn iterative_truncated_mean(
    dist: &BinnedDistribution,
    cfg: &TruncatedMeanConfig,
) -> Result<TruncatedMeanResult> {
    cfg.validate()?;
    let (sigma_low, sigma_high) = cfg.ordered_sigmas();

    let edges = dist.edges();
    let mut window = (edges[0], edges[edges.len() - 1]);
    let mut current = dist.clone();
    let mut previous: Option<f64> = None;
    let mut last_shift = f64::INFINITY;

    for iteration in 1..=cfg.max_iterations {
        let mean = current.mean()?;
        let spread = current.rms()?;
        if let Some(prev) = previous {
            last_shift = (prev - mean).abs();
            if last_shift < cfg.tolerance {
                tracing::debug!(iteration, mean, spread, "truncated mean converged");
                return finish(&current, cfg, mean, spread, window, iteration, true, last_shift);
            }
        }
        previous = Some(mean);

        let median = current.quantile(0.5)?;
        window = (median + sigma_low * spread, median + sigma_high * spread);
        tracing::trace!(iteration, mean, spread, median, low = window.0, high = window.1, "truncate");
        current = current.restrict_to_window(window.0, window.1);
    }

    let mean = current.mean()?;
    let spread = current.rms()?;
    tracing::warn!(
        iterations = cfg.max_iterations,
        last_shift,
        mean,
        "truncated mean did not converge, returning last estimate"
    );
    finish(&current, cfg, mean, spread, window, cfg.max_iterations, false, last_shift)
}

#[allow(clippy::too_many_arguments)]
fn finish(
    truncated: &BinnedDistribution,
    cfg: &TruncatedMeanConfig,
    mean: f64,
    spread: f64,
    window: (f64, f64),
    iterations: usize,
    converged: bool,
    last_shift: f64,
) -> Result<TruncatedMeanResult> {
    let (value, uncertainty) = match cfg.uncertainty {
        UncertaintyMethod::Bootstrap => {
            let b = bootstrap_mean(truncated, &cfg.bootstrap)?;
            (b.mean, b.rms)
        }
        UncertaintyMethod::StandardError => {
            let n_eff = truncated.effective_entries();
            let unc = if n_eff > 0.0 { spread / n_eff.sqrt() } else { 0.0 };
            (mean, unc)
        }
    };
    if !value.is_finite() || !uncertainty.is_finite() {
        return Err(Error::Computation(format!(
            "non-finite truncated mean estimate: value={value}, uncertainty={uncertainty}"
        )));
    }
    Ok(TruncatedMeanResult { value, uncertainty, mean, spread, window, iterations, converged, last_shift })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn from_weights(weights: &[f64], min: f64, max: f64) -> BinnedDistribution {
        let mut d = BinnedDistribution::uniform(weights.len(), min, max).unwrap();
        for (i, &w) in weights.iter().enumerate() {
            d.set_bin(i, w, w.sqrt());
        }
        d
    }

    #[test]
    fn symmetric_distribution_keeps_its_center() {
        let d = from_weights(&[1.0, 4.0, 10.0, 20.0, 30.0, 30.0, 20.0, 10.0, 4.0, 1.0], 0.0, 10.0);
        let cfg = TruncatedMeanConfig {
            sigma_low: -2.0,
            sigma_high: 2.0,
            uncertainty: UncertaintyMethod::StandardError,
            ..Default::default()
        };
        let r = iterative_truncated_mean(&d, &cfg).unwrap();
        assert!(r.converged);
        assert_relative_eq!(r.value, 5.0, epsilon = 1e-9);
        assert!(r.iterations >= 2);
    }

    #[test]
    fn empty_distribution_is_an_error() {
        let d = BinnedDistribution::uniform(4, 0.0, 4.0).unwrap();
        let r = iterative_truncated_mean(&d, &TruncatedMeanConfig::default());
        assert!(matches!(r, Err(Error::EmptyDistribution(_))));
    }

    #[test]
    fn reversed_sigmas_are_swapped() {
        let d = from_weights(&[2.0, 8.0, 20.0, 14.0, 9.0, 5.0, 3.0, 2.0, 1.0, 1.0], 0.0, 10.0);
        let base = TruncatedMeanConfig {
            uncertainty: UncertaintyMethod::StandardError,
            ..Default::default()
        };
        let swapped = TruncatedMeanConfig { sigma_low: base.sigma_high, sigma_high: base.sigma_low, ..base };
        assert_eq!(
            iterative_truncated_mean(&d, &base).unwrap(),
            iterative_truncated_mean(&d, &swapped).unwrap()
        );
    }

    #[test]
    fn input_is_not_modified() {
        let d = from_weights(&[2.0, 8.0, 20.0, 14.0, 9.0, 5.0, 3.0, 2.0, 1.0, 50.0], 0.0, 10.0);
        let before = d.clone();
        iterative_truncated_mean(&d, &TruncatedMeanConfig::default()).unwrap();
        assert_eq!(d, before);
    }

    #[test]
    fn iteration_cap_flags_non_convergence() {
        let d = from_weights(&[2.0, 8.0, 20.0, 14.0, 9.0, 5.0, 3.0, 2.0, 1.0, 50.0], 0.0, 10.0);
        let cfg = TruncatedMeanConfig {
            max_iterations: 1,
            uncertainty: UncertaintyMethod::StandardError,
            ..Default::default()
        };
        let r = iterative_truncated_mean(&d, &cfg).unwrap();
        assert!(!r.converged);
        assert_eq!(r.iterations, 1);
        assert!(r.value.is_finite());
        assert!(matches!(
            r.require_converged(),
            Err(Error::ConvergenceFailure { iterations: 1, .. })
        ));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let d = from_weights(&[1.0, 1.0], 0.0, 2.0);
        for cfg in [
            TruncatedMeanConfig { tolerance: 0.0, ..Default::default() },
            TruncatedMeanConfig { max_iterations: 0, ..Default::default() },
            TruncatedMeanConfig { sigma_low: f64::NAN, ..Default::default() },
            TruncatedMeanConfig {
                bootstrap: BootstrapConfig { throws: 0, seed: 1 },
                ..Default::default()
            },
        ] {
            assert!(matches!(iterative_truncated_mean(&d, &cfg), Err(Error::Validation(_))));
        }
    }

    #[test]
    fn standard_error_uses_effective_entries() {
        let mut d = BinnedDistribution::uniform(2, 0.0, 2.0).unwrap();
        d.set_bin(0, 50.0, 50f64.sqrt());
        d.set_bin(1, 50.0, 50f64.sqrt());
        let cfg = TruncatedMeanConfig {
            sigma_low: -5.0,
            sigma_high: 5.0,
            uncertainty: UncertaintyMethod::StandardError,
            ..Default::default()
        };
        let r = iterative_truncated_mean(&d, &cfg).unwrap();
        assert_relative_eq!(r.value, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r.uncertainty, 0.5 / 10.0, epsilon = 1e-12);
    }
}
