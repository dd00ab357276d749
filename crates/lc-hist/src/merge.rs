//! Aggregation of per-batch histogram sets.
//!
//! A distributed run writes one histogram set per job. `merge_all` folds
//! them into a single set per channel group. Bad batches never abort the
//! merge: they are skipped, logged, and listed in the outcome.

use std::path::PathBuf;

use lc_core::{BatchSource, ChannelGroup, Error, Result};
use serde::{Deserialize, Serialize};

use crate::file::ObjectFile;
use crate::set::HistogramSet;

/// Merge options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Project every incoming histogram onto these axes before merging.
    ///
    /// Keeps memory bounded when only a few axes are needed downstream.
    #[serde(default)]
    pub keep_axes: Option<Vec<usize>>,
}

/// One skipped batch, or one skipped group of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInput {
    /// Batch label.
    pub source: String,
    /// Group, when only one group of the batch was skipped.
    pub group: Option<ChannelGroup>,
    /// Why.
    pub reason: String,
}

/// Result of [`merge_all`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Merged histograms.
    pub merged: HistogramSet,
    /// Batches that contributed.
    pub sources_merged: usize,
    /// Batches seen.
    pub sources_seen: usize,
    /// Everything skipped, in encounter order.
    pub skipped: Vec<SkippedInput>,
}

/// A histogram set stored in an [`ObjectFile`] on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    /// Path to the container.
    pub path: PathBuf,
    /// Plane count used when the file does not record one.
    pub default_n_planes: u16,
}

impl FileSource {
    /// Source for `path`.
    pub fn new(path: impl Into<PathBuf>, default_n_planes: u16) -> Self {
        Self { path: path.into(), default_n_planes }
    }
}

impl BatchSource for FileSource {
    type Output = HistogramSet;

    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<HistogramSet> {
        let file = ObjectFile::open(&self.path)?;
        HistogramSet::read_from(&file, self.default_n_planes)
    }
}

fn skip(skipped: &mut Vec<SkippedInput>, source: &str, group: Option<ChannelGroup>, reason: String) {
    match group {
        Some(g) => tracing::warn!(source, group = %g, %reason, "skipping group"),
        None => tracing::warn!(source, %reason, "skipping input batch"),
    }
    skipped.push(SkippedInput { source: source.to_string(), group, reason });
}

fn prepare(
    set: HistogramSet,
    opts: &MergeOptions,
    label: &str,
    skipped: &mut Vec<SkippedInput>,
) -> HistogramSet {
    let Some(axes) = &opts.keep_axes else {
        return set;
    };
    let mut out = HistogramSet::new(set.n_planes());
    for (g, h) in set {
        match h.project(axes) {
            Ok(p) => {
                out.insert(g, p);
            }
            Err(e) => skip(skipped, label, Some(g), format!("projection failed: {e}")),
        }
    }
    out
}

/// Merge histogram sets from `sources`, in order.
///
/// The first batch that loads seeds the result and defines the set of
/// groups. Later batches are merged group by group:
/// - a batch that fails to load is skipped;
/// - a group missing from a batch is skipped for that batch only;
/// - a group whose axes differ from the seed is skipped for that batch only;
/// - a group the seed does not have is skipped.
///
/// Fails only when there are no sources or none of them loads.
pub fn merge_all<S, I>(sources: I, opts: &MergeOptions) -> Result<MergeOutcome>
where
    I: IntoIterator<Item = S>,
    S: BatchSource<Output = HistogramSet>,
{
    let mut acc: Option<HistogramSet> = None;
    let mut skipped = Vec::new();
    let mut sources_seen = 0usize;
    let mut sources_merged = 0usize;

    for src in sources {
        sources_seen += 1;
        let label = src.label();
        let set = match src.load() {
            Ok(set) => prepare(set, opts, &label, &mut skipped),
            Err(e) => {
                skip(&mut skipped, &label, None, e.to_string());
                continue;
            }
        };

        let Some(acc) = acc.as_mut() else {
            tracing::info!(source = %label, groups = set.len(), "seeding merge");
            acc = Some(set);
            sources_merged += 1;
            continue;
        };

        if set.n_planes() != acc.n_planes() {
            skip(
                &mut skipped,
                &label,
                None,
                format!("n_planes {} differs from {}", set.n_planes(), acc.n_planes()),
            );
            continue;
        }

        for (g, h) in acc.iter_mut() {
            match set.get(g) {
                None => skip(
                    &mut skipped,
                    &label,
                    Some(*g),
                    Error::MissingInput(format!("no histogram for {g}")).to_string(),
                ),
                Some(other) => {
                    if let Err(e) = h.merge(other) {
                        skip(&mut skipped, &label, Some(*g), e.to_string());
                    }
                }
            }
        }
        for g in set.groups() {
            if acc.get(&g).is_none() {
                skip(&mut skipped, &label, Some(g), "group not present in the first batch".into());
            }
        }
        sources_merged += 1;
        tracing::debug!(source = %label, merged = sources_merged, "merged batch");
    }

    if sources_seen == 0 {
        return Err(Error::Validation("no input batches given".into()));
    }
    let merged = acc.ok_or_else(|| {
        Error::Validation(format!("none of the {sources_seen} input batches could be read"))
    })?;
    tracing::info!(sources_merged, sources_seen, skipped = skipped.len(), "merge complete");
    Ok(MergeOutcome { merged, sources_merged, sources_seen, skipped })
}
