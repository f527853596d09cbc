//! # at-store
//!
//! Output side of AnaTools: fillable histograms, flat ntuples and the
//! directory hierarchy they are written into.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod histogram;
pub mod ntuple;

pub use directory::{DirContents, DirPath, MemoryStore, OutputSink};
pub use histogram::Histogram;
pub use ntuple::Ntuple;
