//! # lc-core
//!
//! Core types for larcal: the error taxonomy shared by every crate, the
//! readout-channel-group and hit records, and the traits through which
//! external collaborators (calibration corrections, input batches) plug in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{BatchSource, Correction, NoCorrection};
pub use types::{ChannelGroup, Hit, HitVariable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
