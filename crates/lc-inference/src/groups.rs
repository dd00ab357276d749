//! Profiling every channel group of a histogram set.

use std::collections::BTreeMap;

use lc_core::{ChannelGroup, Result};
use lc_hist::HistogramSet;
use rayon::prelude::*;

use crate::profile::{ProfileConfig, ProfileResult, profile_dynamic_multi};

/// Per-group profiles.
#[derive(Debug, Clone, Default)]
pub struct GroupProfiles {
    /// Results per group, in the order of the requested projection axes.
    pub results: BTreeMap<ChannelGroup, Vec<ProfileResult>>,
    /// Groups that could not be profiled, with the reason.
    pub failures: Vec<(ChannelGroup, String)>,
}

/// Profile every group of `set` in parallel.
///
/// Groups own their histograms, so each worker restricts only its own.
/// A recoverable error skips its group; any other error aborts.
pub fn profile_groups(
    set: &mut HistogramSet,
    profile_axis: usize,
    projection_axes: &[usize],
    cfg: &ProfileConfig,
) -> Result<GroupProfiles> {
    cfg.validate()?;
    let outcomes: Vec<(ChannelGroup, Result<Vec<ProfileResult>>)> = set
        .as_map_mut()
        .par_iter_mut()
        .map(|(g, h)| (*g, profile_dynamic_multi(h, profile_axis, projection_axes, cfg)))
        .collect();

    let mut out = GroupProfiles::default();
    for (g, r) in outcomes {
        match r {
            Ok(res) => {
                out.results.insert(g, res);
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(group = %g, error = %e, "skipping group");
                out.failures.push((g, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(profiled = out.results.len(), failed = out.failures.len(), "group profiles complete");
    Ok(out)
}
