//! Common data types for larcal

use serde::{Deserialize, Serialize};
use std::fmt;

/// A detector readout-channel group: one wire plane in one drift volume.
///
/// Every group gets its own histogram and its own calibration curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelGroup {
    /// Drift volume (TPC) index.
    pub tpc: u16,
    /// Wire plane index within the drift volume.
    pub plane: u16,
}

impl ChannelGroup {
    /// Create a group identifier.
    pub fn new(tpc: u16, plane: u16) -> Self {
        Self { tpc, plane }
    }

    /// Flat index `plane + n_planes * tpc`.
    pub fn index(&self, n_planes: u16) -> usize {
        self.plane as usize + n_planes as usize * self.tpc as usize
    }

    /// Inverse of [`ChannelGroup::index`], `None` when the TPC does not fit in a `u16`.
    pub fn from_index(index: usize, n_planes: u16) -> Option<Self> {
        let n = n_planes.max(1) as usize;
        let tpc = u16::try_from(index / n).ok()?;
        let plane = u16::try_from(index % n).ok()?;
        Some(Self { tpc, plane })
    }

    /// Whether the plane is addressable with `n_planes` planes per TPC.
    ///
    /// Groups outside this range would share a flat index with a group of
    /// the next TPC.
    pub fn fits(&self, n_planes: u16) -> bool {
        self.plane < n_planes.max(1)
    }

    /// Deterministic container name, `group_<index>`.
    pub fn object_name(&self, n_planes: u16) -> String {
        format!("group_{}", self.index(n_planes))
    }

    /// Parse a `group_<index>` name back into a group.
    pub fn parse_object_name(name: &str, n_planes: u16) -> Option<Self> {
        let idx: usize = name.strip_prefix("group_")?.parse().ok()?;
        Self::from_index(idx, n_planes)
    }
}

impl fmt::Display for ChannelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tpc{}/plane{}", self.tpc, self.plane)
    }
}

/// One calorimetric hit as delivered by the event reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Readout-channel group the hit was recorded on.
    pub group: ChannelGroup,
    /// Drift coordinate [cm].
    pub x: f64,
    /// Vertical coordinate [cm].
    pub y: f64,
    /// Beam coordinate [cm].
    pub z: f64,
    /// Track angle relative to the wire direction [rad].
    #[serde(default)]
    pub angle: f64,
    /// Charge integral [ADC].
    pub charge: f64,
    /// Pulse width [ticks].
    #[serde(default)]
    pub width: f64,
    /// Pulse-fit goodness score.
    #[serde(default)]
    pub goodness: f64,
}

/// Which field of a [`Hit`] feeds a histogram axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitVariable {
    /// Drift coordinate.
    X,
    /// Vertical coordinate.
    Y,
    /// Beam coordinate.
    Z,
    /// Track angle.
    Angle,
    /// Charge integral (after corrections).
    Charge,
    /// Pulse width.
    Width,
    /// Goodness score.
    Goodness,
}

impl Hit {
    /// Read one variable off the hit.
    pub fn value(&self, var: HitVariable) -> f64 {
        match var {
            HitVariable::X => self.x,
            HitVariable::Y => self.y,
            HitVariable::Z => self.z,
            HitVariable::Angle => self.angle,
            HitVariable::Charge => self.charge,
            HitVariable::Width => self.width,
            HitVariable::Goodness => self.goodness,
        }
    }

    /// Spatial position `[x, y, z]`.
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}
