//! # at-select
//!
//! Category-aware selection pipelines for event-by-event physics analysis.
//!
//! An [`Analysis`] runs an ordered list of selections per event:
//!
//! - [`ObjectDefinition`] builds candidates from an input collection and
//!   prunes them, category by category, with [`Cut`]s.
//! - [`EventSelection`] assembles an [`Event`](at_core::Event) from upstream
//!   collections and input scalars and gates it, stopping at the first
//!   failing cut.
//!
//! Every selection keeps a weighted cutflow per category. Cuts and operations
//! can carry plot recorders whose values land in Precut/Postcut trees inside
//! the output hierarchy.
//!
//! ```
//! use at_core::{Event, EventRecord};
//! use at_select::prelude::*;
//!
//! let mut met = Cut::with_function("MET", |e: &Event| e.info("MET"));
//! met.set_range(50.0, f64::INFINITY).unwrap();
//!
//! let mut sel = EventSelection::new("Event");
//! sel.add_info("MET", "met").unwrap();
//! sel.add_cut(met).unwrap();
//!
//! let mut analysis = Analysis::new("Demo");
//! analysis.add_selection(sel).unwrap();
//!
//! let mut rec = EventRecord::new();
//! rec.set_scalar("met", 72.0);
//! assert!(analysis.run(&rec, 1.0, None).unwrap());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod cache;
pub mod categories;
pub mod common;
pub mod config;
pub mod event_selection;
pub mod localised;
pub mod object_definition;
pub mod operation;
pub mod plot;
pub mod selection;

pub use analysis::Analysis;
pub use cache::{CUT_VARIABLE, CacheStats, PassContext, ValueCache, WEIGHT};
pub use categories::{CategorySet, NOMINAL};
pub use config::AnalysisConfig;
pub use event_selection::{CollectionSource, EventSelection};
pub use localised::{Localised, Scope};
pub use object_definition::ObjectDefinition;
pub use operation::{Cut, Operation, OperationNode};
pub use plot::{CutPosition, PlotRecorder, Recorder};
pub use selection::{CUTFLOW_ALL, CUTFLOW_NAME, Pipeline, Registry, RunContext, Selection, SelectionCore};

/// Everything needed to assemble and run an analysis.
pub mod prelude {
    pub use crate::{
        Analysis, AnalysisConfig, Cut, CutPosition, EventSelection, Localised, ObjectDefinition,
        Operation, Pipeline, PlotRecorder, Selection,
    };
}
