//! Single-pass filling of per-group sparse histograms from hit records.

use lc_core::{ChannelGroup, Correction, Error, Hit, HitVariable, Result};
use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::set::HistogramSet;
use crate::sparse::SparseHistogram;

/// One histogram axis fed by one hit variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisBinding {
    /// Hit variable to histogram.
    pub variable: HitVariable,
    /// Axis definition.
    pub axis: Axis,
}

/// What to fill and which hits to accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillSpec {
    /// Axes, in histogram order.
    pub bindings: Vec<AxisBinding>,
    /// Hits with a lower goodness score are rejected.
    #[serde(default)]
    pub min_goodness: Option<f64>,
    /// Real data (as opposed to simulation); forwarded to corrections.
    #[serde(default = "default_is_data")]
    pub is_data: bool,
}

fn default_is_data() -> bool {
    true
}

/// Counters accumulated while filling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillStats {
    /// Hits that landed in a histogram cell.
    pub accepted: u64,
    /// Hits rejected by the goodness cut.
    pub rejected_goodness: u64,
    /// Hits whose charge correction was not finite.
    pub rejected_correction: u64,
    /// Hits with a coordinate outside its axis.
    pub out_of_range: u64,
    /// Hits whose plane is not below the detector's plane count.
    #[serde(default)]
    pub rejected_group: u64,
}

/// Accumulates hits into one sparse histogram per channel group.
pub struct HitFiller {
    spec: FillSpec,
    template: SparseHistogram,
    corrections: Vec<Box<dyn Correction>>,
    set: HistogramSet,
    stats: FillStats,
    coords: Vec<f64>,
}

impl HitFiller {
    /// Filler for `spec` on a detector with `n_planes` planes per drift volume.
    pub fn new(spec: FillSpec, n_planes: u16) -> Result<Self> {
        if spec.bindings.is_empty() {
            return Err(Error::Validation("fill spec has no axes".into()));
        }
        let template = SparseHistogram::new(spec.bindings.iter().map(|b| b.axis.clone()).collect())?;
        let ndim = spec.bindings.len();
        Ok(Self {
            spec,
            template,
            corrections: Vec::new(),
            set: HistogramSet::new(n_planes),
            stats: FillStats::default(),
            coords: Vec::with_capacity(ndim),
        })
    }

    /// Add a multiplicative charge correction.
    pub fn with_correction(mut self, correction: Box<dyn Correction>) -> Self {
        self.corrections.push(correction);
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> FillStats {
        self.stats
    }

    fn corrected_charge(&self, hit: &Hit, group: ChannelGroup) -> f64 {
        self.corrections
            .iter()
            .fold(hit.charge, |q, c| q * c.factor(hit, group, self.spec.is_data))
    }

    /// Fill one hit. Returns whether it landed in a cell.
    pub fn fill(&mut self, hit: &Hit) -> Result<bool> {
        if !hit.group.fits(self.set.n_planes()) {
            if self.stats.rejected_group == 0 {
                tracing::warn!(
                    tpc = hit.group.tpc,
                    plane = hit.group.plane,
                    n_planes = self.set.n_planes(),
                    "hit plane outside the configured plane count; rejecting"
                );
            }
            self.stats.rejected_group += 1;
            return Ok(false);
        }

        if let Some(min) = self.spec.min_goodness
            && hit.goodness < min
        {
            self.stats.rejected_goodness += 1;
            return Ok(false);
        }

        let charge = self.corrected_charge(hit, hit.group);
        if !charge.is_finite() {
            self.stats.rejected_correction += 1;
            return Ok(false);
        }

        self.coords.clear();
        for b in &self.spec.bindings {
            self.coords.push(match b.variable {
                HitVariable::Charge => charge,
                v => hit.value(v),
            });
        }

        let template = &self.template;
        let h = self.set.get_or_insert_with(hit.group, || template.empty_like());
        if h.fill(&self.coords)? {
            self.stats.accepted += 1;
            Ok(true)
        } else {
            self.stats.out_of_range += 1;
            Ok(false)
        }
    }

    /// Fill every hit from an iterator of (possibly failing) reads.
    pub fn fill_all<I>(&mut self, hits: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<Hit>>,
    {
        for hit in hits {
            self.fill(&hit?)?;
        }
        Ok(())
    }

    /// Finish, returning the filled histograms and the counters.
    pub fn finish(self) -> (HistogramSet, FillStats) {
        tracing::debug!(
            groups = self.set.len(),
            accepted = self.stats.accepted,
            rejected_goodness = self.stats.rejected_goodness,
            out_of_range = self.stats.out_of_range,
            rejected_group = self.stats.rejected_group,
            "fill complete"
        );
        (self.set, self.stats)
    }
}
