//! Run configuration (YAML) parsing + semantic validation.
//!
//! A single file describes the histogram axes, the hit selection, and the
//! profile and estimator settings, so `fill`, `profile` and `profile-grid`
//! agree on axis indices.

use anyhow::Result;
use lc_core::{ChannelGroup, Correction, Hit, HitVariable};
use lc_hist::{Axis, AxisBinding, FillSpec};
use lc_inference::{
    BootstrapConfig, GridConfig, ProfileConfig, TailPolicy, TruncatedMeanConfig, UncertaintyMethod,
};
use serde::Deserialize;
use std::path::Path;

const CONFIG_V0: &str = "larcal_config_v0";

fn default_n_planes() -> u16 {
    3
}

fn default_true() -> bool {
    true
}

fn default_min_counts() -> f64 {
    1000.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub schema_version: String,
    #[serde(default = "default_n_planes")]
    pub n_planes: u16,
    pub axes: Vec<AxisConfig>,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub profile: Option<ProfileSection>,
    #[serde(default)]
    pub grid: Option<GridConfig>,
    #[serde(default)]
    pub estimator: EstimatorSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisConfig {
    pub variable: HitVariable,
    pub bins: i64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    #[serde(default)]
    pub min_goodness: Option<f64>,
    #[serde(default = "default_true")]
    pub is_data: bool,
    /// Per-plane charge scale (length `n_planes`), applied to data only.
    #[serde(default)]
    pub plane_scale: Option<Vec<f64>>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { min_goodness: None, is_data: true, plane_scale: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSection {
    pub profile_axis: usize,
    pub projection_axes: Vec<usize>,
    #[serde(default = "default_min_counts")]
    pub min_counts: f64,
    #[serde(default)]
    pub tail: TailPolicy,
    #[serde(default)]
    pub retain_projections: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorSection {
    pub sigma_low: f64,
    pub sigma_high: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub uncertainty: UncertaintyMethod,
    pub bootstrap_throws: usize,
    pub seed: u64,
}

impl Default for EstimatorSection {
    fn default() -> Self {
        let d = TruncatedMeanConfig::default();
        Self {
            sigma_low: d.sigma_low,
            sigma_high: d.sigma_high,
            tolerance: d.tolerance,
            max_iterations: d.max_iterations,
            uncertainty: d.uncertainty,
            bootstrap_throws: d.bootstrap.throws,
            seed: d.bootstrap.seed,
        }
    }
}

/// Scales data charge by a per-plane factor.
#[derive(Debug, Clone)]
pub struct PlaneScale {
    factors: Vec<f64>,
}

impl Correction for PlaneScale {
    fn factor(&self, _hit: &Hit, group: ChannelGroup, is_data: bool) -> f64 {
        if !is_data {
            return 1.0;
        }
        self.factors.get(group.plane as usize).copied().unwrap_or(1.0)
    }

    fn name(&self) -> &str {
        "plane_scale"
    }
}

pub fn read_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path)?;
    // YAML parser can also read JSON (YAML is a superset).
    let cfg: RunConfig = serde_yaml_ng::from_slice(&bytes)?;
    cfg.validate()?;
    tracing::info!(path = %path.display(), axes = cfg.axes.len(), "config loaded");
    Ok(cfg)
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CONFIG_V0 {
            anyhow::bail!(
                "unsupported schema_version '{}' (expected '{CONFIG_V0}')",
                self.schema_version
            );
        }
        if self.n_planes == 0 {
            anyhow::bail!("n_planes must be >= 1");
        }
        if self.axes.is_empty() {
            anyhow::bail!("axes must be non-empty");
        }
        for (i, a) in self.axes.iter().enumerate() {
            if a.bins <= 0 {
                anyhow::bail!("axes[{i}].bins must be > 0, got {}", a.bins);
            }
            if !(a.min.is_finite() && a.max.is_finite()) || a.min >= a.max {
                anyhow::bail!("axes[{i}] needs min < max, got [{}, {}]", a.min, a.max);
            }
        }
        let ndim = self.axes.len();
        let check_axis = |what: &str, idx: usize| -> Result<()> {
            if idx >= ndim {
                anyhow::bail!("{what} = {idx} is out of range for {ndim} axes");
            }
            Ok(())
        };

        if let Some(scale) = &self.selection.plane_scale {
            if scale.len() != self.n_planes as usize {
                anyhow::bail!(
                    "selection.plane_scale has {} entries but n_planes = {}",
                    scale.len(),
                    self.n_planes
                );
            }
            if scale.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
                anyhow::bail!("selection.plane_scale entries must be finite and > 0");
            }
        }

        if let Some(p) = &self.profile {
            check_axis("profile.profile_axis", p.profile_axis)?;
            if p.projection_axes.is_empty() {
                anyhow::bail!("profile.projection_axes must be non-empty");
            }
            for &a in &p.projection_axes {
                check_axis("profile.projection_axes[..]", a)?;
                if a == p.profile_axis {
                    anyhow::bail!("profile axis {a} cannot also be a projection axis");
                }
            }
            if !(p.min_counts.is_finite() && p.min_counts >= 0.0) {
                anyhow::bail!("profile.min_counts must be >= 0, got {}", p.min_counts);
            }
        }

        if let Some(g) = &self.grid {
            check_axis("grid.x_axis", g.x_axis)?;
            check_axis("grid.y_axis", g.y_axis)?;
            check_axis("grid.projection_axis", g.projection_axis)?;
            if g.x_axis == g.y_axis || g.projection_axis == g.x_axis || g.projection_axis == g.y_axis {
                anyhow::bail!("grid axes must be three distinct axes");
            }
            for (what, blocks, axis) in [("nx", g.nx, g.x_axis), ("ny", g.ny, g.y_axis)] {
                let bins = self.axes[axis].bins as usize;
                if blocks == 0 || blocks > bins {
                    anyhow::bail!("grid.{what} = {blocks} must be in [1, {bins}]");
                }
            }
        }

        let e = &self.estimator;
        if !(e.tolerance.is_finite() && e.tolerance > 0.0) {
            anyhow::bail!("estimator.tolerance must be > 0, got {}", e.tolerance);
        }
        if e.bootstrap_throws == 0 {
            anyhow::bail!("estimator.bootstrap_throws must be >= 1");
        }
        if e.max_iterations == 0 {
            anyhow::bail!("estimator.max_iterations must be >= 1");
        }
        if !(e.sigma_low.is_finite() && e.sigma_high.is_finite()) {
            anyhow::bail!("estimator sigmas must be finite");
        }
        Ok(())
    }

    pub fn fill_spec(&self) -> Result<FillSpec> {
        let mut bindings = Vec::with_capacity(self.axes.len());
        for a in &self.axes {
            let mut axis = Axis::new(a.bins as usize, a.min, a.max)?;
            if let Some(t) = &a.title {
                axis = axis.with_title(t.clone());
            }
            bindings.push(AxisBinding { variable: a.variable, axis });
        }
        Ok(FillSpec {
            bindings,
            min_goodness: self.selection.min_goodness,
            is_data: self.selection.is_data,
        })
    }

    pub fn corrections(&self) -> Vec<Box<dyn Correction>> {
        let mut out: Vec<Box<dyn Correction>> = Vec::new();
        if let Some(factors) = &self.selection.plane_scale {
            out.push(Box::new(PlaneScale { factors: factors.clone() }));
        }
        out
    }

    pub fn estimator_config(&self) -> TruncatedMeanConfig {
        let e = &self.estimator;
        TruncatedMeanConfig {
            sigma_low: e.sigma_low,
            sigma_high: e.sigma_high,
            tolerance: e.tolerance,
            max_iterations: e.max_iterations,
            uncertainty: e.uncertainty,
            bootstrap: BootstrapConfig { throws: e.bootstrap_throws, seed: e.seed },
        }
    }

    pub fn profile_config(&self) -> Result<(&ProfileSection, ProfileConfig)> {
        let p = self
            .profile
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("config has no `profile` section"))?;
        let cfg = ProfileConfig {
            min_counts: p.min_counts,
            tail: p.tail,
            retain_projections: p.retain_projections,
            estimator: self.estimator_config(),
        };
        Ok((p, cfg))
    }

    pub fn grid_config(&self) -> Result<GridConfig> {
        self.grid.ok_or_else(|| anyhow::anyhow!("config has no `grid` section"))
    }
}
