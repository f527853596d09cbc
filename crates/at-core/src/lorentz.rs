//! Minimal Minkowski four-vector.

use std::f64::consts::PI;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Four-momentum `(px, py, pz, E)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LorentzVector {
    /// x-component of momentum.
    pub px: f64,
    /// y-component of momentum.
    pub py: f64,
    /// z-component of momentum.
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl LorentzVector {
    /// From Cartesian momentum and energy.
    pub fn from_px_py_pz_e(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// From transverse momentum, pseudorapidity, azimuth and energy.
    pub fn from_pt_eta_phi_e(pt: f64, eta: f64, phi: f64, e: f64) -> Self {
        let pt = pt.abs();
        Self { px: pt * phi.cos(), py: pt * phi.sin(), pz: pt * eta.sinh(), e }
    }

    /// From transverse momentum, pseudorapidity, azimuth and mass.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pt = pt.abs();
        let (px, py, pz) = (pt * phi.cos(), pt * phi.sin(), pt * eta.sinh());
        let e = if m >= 0.0 {
            (px * px + py * py + pz * pz + m * m).sqrt()
        } else {
            (px * px + py * py + pz * pz - m * m).max(0.0).sqrt()
        };
        Self { px, py, pz, e }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Magnitude of the three-momentum.
    pub fn p(&self) -> f64 {
        (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt()
    }

    /// Azimuthal angle in `(-pi, pi]`; zero for a null transverse vector.
    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 { 0.0 } else { self.py.atan2(self.px) }
    }

    /// Pseudorapidity. Purely longitudinal vectors map to `±1e10`.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0.0 {
            (self.pz / pt).asinh()
        } else if self.pz == 0.0 {
            0.0
        } else {
            1e10_f64.copysign(self.pz)
        }
    }

    /// Invariant mass squared.
    pub fn m2(&self) -> f64 {
        self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz)
    }

    /// Invariant mass; negative for space-like vectors.
    pub fn m(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0.0 { -(-m2).sqrt() } else { m2.sqrt() }
    }

    /// Transverse energy.
    pub fn et(&self) -> f64 {
        let p = self.p();
        if p == 0.0 { 0.0 } else { self.e * self.pt() / p }
    }

    /// Azimuthal separation wrapped into `[-pi, pi)`.
    pub fn delta_phi(&self, other: &LorentzVector) -> f64 {
        let mut d = self.phi() - other.phi();
        while d >= PI {
            d -= 2.0 * PI;
        }
        while d < -PI {
            d += 2.0 * PI;
        }
        d
    }

    /// Angular separation `sqrt(deta^2 + dphi^2)`.
    pub fn delta_r(&self, other: &LorentzVector) -> f64 {
        let deta = self.eta() - other.eta();
        deta.hypot(self.delta_phi(other))
    }
}

impl Add for LorentzVector {
    type Output = LorentzVector;

    fn add(self, rhs: LorentzVector) -> LorentzVector {
        LorentzVector {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

impl AddAssign for LorentzVector {
    fn add_assign(&mut self, rhs: LorentzVector) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pt_eta_phi_m_round_trip() {
        let v = LorentzVector::from_pt_eta_phi_m(50.0, 1.2, -0.7, 10.0);
        assert_relative_eq!(v.pt(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(v.eta(), 1.2, epsilon = 1e-9);
        assert_relative_eq!(v.phi(), -0.7, epsilon = 1e-9);
        assert_relative_eq!(v.m(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn sum_of_back_to_back_pair() {
        let a = LorentzVector::from_px_py_pz_e(10.0, 0.0, 0.0, 10.0);
        let b = LorentzVector::from_px_py_pz_e(-10.0, 0.0, 0.0, 10.0);
        let s = a + b;
        assert_relative_eq!(s.pt(), 0.0);
        assert_relative_eq!(s.m(), 20.0);
    }

    #[test]
    fn delta_r_wraps_phi() {
        let a = LorentzVector::from_pt_eta_phi_m(10.0, 0.0, 3.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(10.0, 0.0, -3.0, 0.0);
        assert_relative_eq!(a.delta_r(&b), 2.0 * PI - 6.0, epsilon = 1e-9);
    }

    #[test]
    fn et_of_massless_particle_equals_pt() {
        let v = LorentzVector::from_pt_eta_phi_m(30.0, 0.5, 0.1, 0.0);
        assert_relative_eq!(v.et(), 30.0, epsilon = 1e-9);
    }
}
