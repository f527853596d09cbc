//! # at-core
//!
//! Core data model for AnaTools event selection: cut ranges, four-vectors,
//! physics objects, events, good-run lists, the expression language and the
//! input data interface.
//!
//! ## Example
//!
//! ```
//! use at_core::{LorentzVector, PhysicsObject, Range, Variables};
//!
//! let mut jet = PhysicsObject::new(LorentzVector::from_pt_eta_phi_m(45.0, 0.2, 1.0, 0.0));
//! jet.add_info("btag", 0.85).unwrap();
//!
//! let window = Range::new(25.0, 100.0).unwrap();
//! assert!(window.contains(jet.variable("pt").unwrap()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data;
pub mod error;
pub mod event;
pub mod expr;
pub mod grl;
pub mod lorentz;
pub mod physics_object;
pub mod range;
pub mod variables;

pub use data::{DataSource, EventRecord, KinematicsMode, VectorSource};
pub use error::{Error, Result};
pub use event::Event;
pub use expr::CompiledExpr;
pub use grl::Grl;
pub use lorentz::LorentzVector;
pub use physics_object::{PhysicsObject, PhysicsObjects, overlap_removal, overlap_removal_with};
pub use range::{Range, Ranges, passes};
pub use variables::{Decorate, Variables};
