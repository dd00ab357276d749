//! # lc-hist
//!
//! Histogram layer for larcal.
//!
//! - [`BinnedDistribution`]: 1-D weighted histogram with per-bin errors and
//!   the statistics the truncated mean needs (mean, rms, quantile, window
//!   truncation).
//! - [`SparseHistogram`]: N-D sparse histogram with scoped axis
//!   restrictions and projections.
//! - [`HitFiller`] / [`HistogramSet`]: one histogram per channel group.
//! - [`merge_all`]: aggregation over many input batches.
//! - [`ObjectFile`]: named-object persistence.
//!
//! ## Example
//!
//! ```
//! use lc_hist::{Axis, SparseHistogram};
//!
//! let axes = vec![Axis::new(10, 0.0, 10.0).unwrap(); 3];
//! let mut h = SparseHistogram::new(axes).unwrap();
//! h.fill(&[1.0, 1.0, 1.0]).unwrap();
//! h.fill(&[5.0, 5.0, 5.0]).unwrap();
//! {
//!     let view = h.restrict(0, 6, 6).unwrap();
//!     assert_eq!(view.project_1d(1).unwrap().integral(), 1.0);
//! }
//! assert_eq!(h.project_1d(1).unwrap().integral(), 2.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod axis;
pub mod binned;
pub mod file;
pub mod filler;
pub mod grid;
pub mod key;
pub mod merge;
pub mod set;
pub mod sparse;

pub use axis::Axis;
pub use binned::BinnedDistribution;
pub use file::ObjectFile;
pub use filler::{AxisBinding, FillSpec, FillStats, HitFiller};
pub use grid::BinnedGrid;
pub use key::{KeyInfo, StoredObject};
pub use merge::{FileSource, MergeOptions, MergeOutcome, SkippedInput, merge_all};
pub use set::HistogramSet;
pub use sparse::{AxisRestriction, Cell, SparseHistogram};
