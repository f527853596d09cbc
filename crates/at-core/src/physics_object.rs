//! Physics objects: four-vectors decorated with named auxiliary scalars.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lorentz::LorentzVector;

/// A candidate object (jet, electron, ...) with auxiliary information.
///
/// Each info name may be set at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsObject {
    p4: LorentzVector,
    info: BTreeMap<String, f64>,
}

/// Collection of physics objects.
pub type PhysicsObjects = Vec<PhysicsObject>;

impl PhysicsObject {
    /// Wrap a bare four-vector.
    pub fn new(p4: LorentzVector) -> Self {
        Self { p4, info: BTreeMap::new() }
    }

    /// The underlying four-vector.
    pub fn p4(&self) -> &LorentzVector {
        &self.p4
    }

    /// Attach an auxiliary value. Fails if `name` is already present.
    pub fn add_info(&mut self, name: impl Into<String>, value: f64) -> Result<()> {
        let name = name.into();
        if self.info.contains_key(&name) {
            return Err(Error::duplicate("object info", name));
        }
        self.info.insert(name, value);
        Ok(())
    }

    /// Auxiliary value by name.
    pub fn info(&self, name: &str) -> Result<f64> {
        self.info.get(name).copied().ok_or_else(|| Error::missing("object info", name))
    }

    /// Whether `name` has been attached.
    pub fn has_info(&self, name: &str) -> bool {
        self.info.contains_key(name)
    }

    /// All auxiliary values, ordered by name.
    pub fn info_map(&self) -> &BTreeMap<String, f64> {
        &self.info
    }
}

impl Deref for PhysicsObject {
    type Target = LorentzVector;

    fn deref(&self) -> &LorentzVector {
        &self.p4
    }
}

impl From<LorentzVector> for PhysicsObject {
    fn from(p4: LorentzVector) -> Self {
        Self::new(p4)
    }
}

/// Remove from `first` every object lying within `r_min < dR < r_max` of any
/// object in `second` for which `constraint(first_i, second_j)` holds.
///
/// `first` is scanned back to front so removals don't shift pending indices.
pub fn overlap_removal_with<F>(
    first: &mut PhysicsObjects,
    second: &[PhysicsObject],
    r_min: f64,
    r_max: f64,
    constraint: F,
) where
    F: Fn(&PhysicsObject, &PhysicsObject) -> bool,
{
    for i in (0..first.len()).rev() {
        let overlaps = second.iter().any(|p2| {
            let dr = first[i].delta_r(p2);
            r_min < dr && dr < r_max && constraint(&first[i], p2)
        });
        if overlaps {
            first.remove(i);
        }
    }
}

/// [`overlap_removal_with`] with `r_min = 0` and no extra constraint.
pub fn overlap_removal(first: &mut PhysicsObjects, second: &[PhysicsObject], r: f64) {
    overlap_removal_with(first, second, 0.0, r, |_, _| true);
}
