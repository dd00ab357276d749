//! Per-group histogram collection.
//!
//! One sparse histogram per readout-channel group, owned by a single set
//! with an explicit create / merge / persist lifecycle.

use std::collections::BTreeMap;
use std::collections::btree_map;

use lc_core::{ChannelGroup, Error, Result};

use crate::file::ObjectFile;
use crate::sparse::SparseHistogram;

const N_PLANES_ATTR: &str = "n_planes";

/// Sparse histograms keyed by channel group.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSet {
    n_planes: u16,
    groups: BTreeMap<ChannelGroup, SparseHistogram>,
}

impl HistogramSet {
    /// Empty set for a detector with `n_planes` wire planes per drift volume.
    pub fn new(n_planes: u16) -> Self {
        Self { n_planes: n_planes.max(1), groups: BTreeMap::new() }
    }

    /// Wire planes per drift volume (used for `group_<index>` names).
    pub fn n_planes(&self) -> u16 {
        self.n_planes
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// No groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Insert or replace the histogram of `group`.
    pub fn insert(&mut self, group: ChannelGroup, hist: SparseHistogram) -> Option<SparseHistogram> {
        self.groups.insert(group, hist)
    }

    /// Remove the histogram of `group`.
    pub fn remove(&mut self, group: &ChannelGroup) -> Option<SparseHistogram> {
        self.groups.remove(group)
    }

    /// Histogram of `group`.
    pub fn get(&self, group: &ChannelGroup) -> Option<&SparseHistogram> {
        self.groups.get(group)
    }

    /// Mutable histogram of `group`.
    pub fn get_mut(&mut self, group: &ChannelGroup) -> Option<&mut SparseHistogram> {
        self.groups.get_mut(group)
    }

    /// Histogram of `group`, created from `template` on first use.
    pub fn get_or_insert_with(
        &mut self,
        group: ChannelGroup,
        template: impl FnOnce() -> SparseHistogram,
    ) -> &mut SparseHistogram {
        self.groups.entry(group).or_insert_with(template)
    }

    /// Groups in order.
    pub fn groups(&self) -> impl Iterator<Item = ChannelGroup> + '_ {
        self.groups.keys().copied()
    }

    /// `(group, histogram)` pairs in group order.
    pub fn iter(&self) -> btree_map::Iter<'_, ChannelGroup, SparseHistogram> {
        self.groups.iter()
    }

    /// Mutable `(group, histogram)` pairs in group order.
    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, ChannelGroup, SparseHistogram> {
        self.groups.iter_mut()
    }

    /// Underlying map (for parallel iteration).
    pub fn as_map_mut(&mut self) -> &mut BTreeMap<ChannelGroup, SparseHistogram> {
        &mut self.groups
    }

    /// Container name of `group`.
    pub fn object_name(&self, group: &ChannelGroup) -> String {
        group.object_name(self.n_planes)
    }

    /// Write every group as `group_<index>` and record `n_planes`.
    ///
    /// Fails with `Validation`, before anything is written, when a group's
    /// plane is not below `n_planes`: its name would alias another group.
    pub fn write_to(&self, file: &mut ObjectFile) -> Result<()> {
        if let Some(g) = self.groups.keys().find(|g| !g.fits(self.n_planes)) {
            return Err(Error::Validation(format!(
                "group (tpc {}, plane {}) does not fit n_planes = {}; '{}' would alias tpc {} plane {}",
                g.tpc,
                g.plane,
                self.n_planes,
                self.object_name(g),
                g.tpc as usize + g.plane as usize / self.n_planes as usize,
                g.plane % self.n_planes
            )));
        }
        file.set_attribute(N_PLANES_ATTR, serde_json::json!(self.n_planes));
        for (g, h) in &self.groups {
            file.put(self.object_name(g), h)?;
        }
        Ok(())
    }

    /// Read every `group_<index>` sparse histogram from `file`.
    ///
    /// `n_planes` comes from the file's attribute when present, otherwise
    /// from `default_n_planes`.
    pub fn read_from(file: &ObjectFile, default_n_planes: u16) -> Result<Self> {
        let n_planes = match file.attribute(N_PLANES_ATTR) {
            Some(v) => v
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| Error::Validation(format!("bad n_planes attribute: {v}")))?,
            None => default_n_planes,
        };
        let mut set = Self::new(n_planes);
        for key in file.list_keys() {
            if key.class_name != <SparseHistogram as crate::key::StoredObject>::CLASS_NAME {
                continue;
            }
            if let Some(g) = ChannelGroup::parse_object_name(&key.name, set.n_planes) {
                set.insert(g, file.get(&key.name)?);
            }
        }
        Ok(set)
    }

    /// Read one group, failing with `MissingInput` when it is absent.
    pub fn read_group(file: &ObjectFile, group: ChannelGroup, n_planes: u16) -> Result<SparseHistogram> {
        file.get(&group.object_name(n_planes))
    }
}

impl IntoIterator for HistogramSet {
    type Item = (ChannelGroup, SparseHistogram);
    type IntoIter = btree_map::IntoIter<ChannelGroup, SparseHistogram>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}
