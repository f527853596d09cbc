//! Read-only view of the current input event.
//!
//! Selections pull scalars, per-object columns and four-vector lists from a
//! [`DataSource`] by name. [`EventRecord`] is the in-memory implementation
//! used by drivers and tests.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::lorentz::LorentzVector;

/// Named values of the event currently being processed.
///
/// Values must not change while one event is being processed.
pub trait DataSource {
    /// Event-level scalar.
    fn scalar(&self, name: &str) -> Option<f64>;
    /// Per-object column (one entry per object).
    fn column(&self, name: &str) -> Option<&[f64]>;
    /// Ready-made list of four-vectors.
    fn vectors(&self, name: &str) -> Option<&[LorentzVector]>;
}

/// HashMap-backed [`DataSource`].
#[derive(Debug, Clone, Default)]
pub struct EventRecord {
    scalars: HashMap<String, f64>,
    columns: HashMap<String, Vec<f64>>,
    vectors: HashMap<String, Vec<LorentzVector>>,
}

impl EventRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) a scalar.
    pub fn set_scalar(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.scalars.insert(name.into(), value);
        self
    }

    /// Set (or replace) a column.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> &mut Self {
        self.columns.insert(name.into(), values);
        self
    }

    /// Set (or replace) a four-vector list.
    pub fn set_vectors(&mut self, name: impl Into<String>, values: Vec<LorentzVector>) -> &mut Self {
        self.vectors.insert(name.into(), values);
        self
    }

    /// Drop everything, keeping allocations.
    pub fn clear(&mut self) {
        self.scalars.clear();
        self.columns.clear();
        self.vectors.clear();
    }
}

impl DataSource for EventRecord {
    fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    fn vectors(&self, name: &str) -> Option<&[LorentzVector]> {
        self.vectors.get(name).map(Vec::as_slice)
    }
}

/// How four parallel columns encode a four-vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KinematicsMode {
    /// `(px, py, pz, E)`.
    PxPyPzE,
    /// `(pt, eta, phi, E)`.
    PtEtaPhiE,
    /// `(pt, eta, phi, m)`.
    PtEtaPhiM,
}

impl KinematicsMode {
    fn build(self, a: f64, b: f64, c: f64, d: f64) -> LorentzVector {
        match self {
            KinematicsMode::PxPyPzE => LorentzVector::from_px_py_pz_e(a, b, c, d),
            KinematicsMode::PtEtaPhiE => LorentzVector::from_pt_eta_phi_e(a, b, c, d),
            KinematicsMode::PtEtaPhiM => LorentzVector::from_pt_eta_phi_m(a, b, c, d),
        }
    }
}

/// Where an object definition gets its input four-vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorSource {
    /// A named four-vector list.
    Vectors(String),
    /// Four parallel columns combined according to `mode`.
    Columns {
        /// Column encoding.
        mode: KinematicsMode,
        /// Column names, in the order `mode` expects.
        columns: [String; 4],
    },
}

impl VectorSource {
    /// Shorthand for [`VectorSource::Columns`].
    pub fn columns(mode: KinematicsMode, a: &str, b: &str, c: &str, d: &str) -> Self {
        VectorSource::Columns {
            mode,
            columns: [a.to_string(), b.to_string(), c.to_string(), d.to_string()],
        }
    }

    /// Materialise the four-vectors of the current event.
    pub fn read(&self, data: &dyn DataSource) -> Result<Vec<LorentzVector>> {
        match self {
            VectorSource::Vectors(name) => data
                .vectors(name)
                .map(<[LorentzVector]>::to_vec)
                .ok_or_else(|| Error::missing("input vectors", name.as_str())),
            VectorSource::Columns { mode, columns } => {
                let mut cols: [&[f64]; 4] = [&[]; 4];
                for (slot, name) in cols.iter_mut().zip(columns) {
                    *slot = data
                        .column(name)
                        .ok_or_else(|| Error::missing("input column", name.as_str()))?;
                }
                let n = cols[0].len();
                if cols.iter().any(|c| c.len() != n) {
                    return Err(Error::Validation(format!(
                        "kinematic columns {columns:?} have different lengths"
                    )));
                }
                Ok((0..n).map(|i| mode.build(cols[0][i], cols[1][i], cols[2][i], cols[3][i])).collect())
            }
        }
    }

    /// Human-readable description.
    pub fn describe(&self) -> String {
        match self {
            VectorSource::Vectors(name) => name.clone(),
            VectorSource::Columns { columns, .. } => columns.join(","),
        }
    }
}
