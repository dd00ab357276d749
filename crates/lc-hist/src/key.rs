//! Key records of an [`ObjectFile`](crate::ObjectFile).

use serde::{Serialize, de::DeserializeOwned};

/// A type that can be stored in an object file under a class name.
pub trait StoredObject: Serialize + DeserializeOwned {
    /// Class name recorded next to the payload (checked on read).
    const CLASS_NAME: &'static str;
}

/// Public info about a key (for `list_keys()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Object name.
    pub name: String,
    /// Object class name (e.g. "SparseHistogram", "CalibrationCurve").
    pub class_name: String,
}

impl StoredObject for crate::BinnedDistribution {
    const CLASS_NAME: &'static str = "BinnedDistribution";
}

impl StoredObject for crate::BinnedGrid {
    const CLASS_NAME: &'static str = "BinnedGrid";
}

impl StoredObject for crate::SparseHistogram {
    const CLASS_NAME: &'static str = "SparseHistogram";
}
