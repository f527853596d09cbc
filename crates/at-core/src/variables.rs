//! Named-variable lookup used by compiled expressions.
//!
//! Physics objects expose their kinematics (`pt`, `eta`, `phi`, `m`, `e`,
//! `et`, `px`, `py`, `pz`) followed by their info scalars. Events expose
//! their info scalars, collection sizes (`Jets.n`) and resolved-particle
//! kinematics (`l1.pt`).

use crate::error::{Error, Result};
use crate::event::Event;
use crate::lorentz::LorentzVector;
use crate::physics_object::PhysicsObject;

/// Something an expression can read named values from.
pub trait Variables {
    /// Value of variable `name`.
    fn variable(&self, name: &str) -> Result<f64>;
}

/// Something operations may attach new named scalars to.
pub trait Decorate {
    /// Attach `value` under `name`; fails if `name` already exists.
    fn decorate(&mut self, name: &str, value: f64) -> Result<()>;
}

fn kinematic(v: &LorentzVector, name: &str) -> Option<f64> {
    Some(match name {
        "pt" => v.pt(),
        "eta" => v.eta(),
        "phi" => v.phi(),
        "m" => v.m(),
        "e" => v.e,
        "et" => v.et(),
        "px" => v.px,
        "py" => v.py,
        "pz" => v.pz,
        "p" => v.p(),
        _ => return None,
    })
}

impl Variables for LorentzVector {
    fn variable(&self, name: &str) -> Result<f64> {
        kinematic(self, name).ok_or_else(|| Error::missing("kinematic variable", name))
    }
}

impl Variables for PhysicsObject {
    fn variable(&self, name: &str) -> Result<f64> {
        match kinematic(self.p4(), name) {
            Some(v) => Ok(v),
            None => self.info(name),
        }
    }
}

impl Variables for Event {
    fn variable(&self, name: &str) -> Result<f64> {
        if self.has_info(name) {
            return self.info(name);
        }
        if let Some((head, tail)) = name.split_once('.') {
            if matches!(tail, "n" | "size") && self.has_collection(head) {
                return Ok(self.collection(head)?.len() as f64);
            }
            if self.has_particle(head) {
                return self.particle(head)?.variable(tail);
            }
        }
        Err(Error::missing("event variable", name))
    }
}

impl Decorate for PhysicsObject {
    fn decorate(&mut self, name: &str, value: f64) -> Result<()> {
        self.add_info(name, value)
    }
}

impl Decorate for Event {
    fn decorate(&mut self, name: &str, value: f64) -> Result<()> {
        self.add_info(name, value)
    }
}
