//! Aggregate per-event view assembled by an event selection.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::grl::Grl;
use crate::physics_object::{PhysicsObject, PhysicsObjects};

/// One event as seen by an event-selection pipeline.
///
/// Holds named scalars, named object collections (shared with the object
/// definitions that produced them), and named "resolved particles" built by
/// operations while the pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct Event {
    info: BTreeMap<String, f64>,
    collections: BTreeMap<String, Arc<PhysicsObjects>>,
    particles: BTreeMap<String, PhysicsObject>,
    grl: Option<Arc<Grl>>,
}

impl Event {
    /// Empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a scalar. Fails if `name` is already present.
    pub fn add_info(&mut self, name: impl Into<String>, value: f64) -> Result<()> {
        let name = name.into();
        if self.info.contains_key(&name) {
            return Err(Error::duplicate("event info", name));
        }
        self.info.insert(name, value);
        Ok(())
    }

    /// Scalar by name.
    pub fn info(&self, name: &str) -> Result<f64> {
        self.info.get(name).copied().ok_or_else(|| Error::missing("event info", name))
    }

    /// Whether scalar `name` is present.
    pub fn has_info(&self, name: &str) -> bool {
        self.info.contains_key(name)
    }

    /// Attach a collection. Fails if `name` is already present.
    pub fn add_collection(
        &mut self,
        name: impl Into<String>,
        collection: Arc<PhysicsObjects>,
    ) -> Result<()> {
        let name = name.into();
        if self.collections.contains_key(&name) {
            return Err(Error::duplicate("collection", name));
        }
        self.collections.insert(name, collection);
        Ok(())
    }

    /// Collection by name.
    pub fn collection(&self, name: &str) -> Result<&[PhysicsObject]> {
        self.collections
            .get(name)
            .map(|c| c.as_slice())
            .ok_or_else(|| Error::missing("collection", name))
    }

    /// Whether collection `name` is present.
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Store a resolved particle, replacing any previous one with this name.
    pub fn set_particle(&mut self, name: impl Into<String>, particle: impl Into<PhysicsObject>) {
        self.particles.insert(name.into(), particle.into());
    }

    /// Resolved particle by name.
    pub fn particle(&self, name: &str) -> Result<&PhysicsObject> {
        self.particles.get(name).ok_or_else(|| Error::missing("particle", name))
    }

    /// Whether particle `name` has been resolved.
    pub fn has_particle(&self, name: &str) -> bool {
        self.particles.contains_key(name)
    }

    /// Attach a good-run list.
    pub fn set_grl(&mut self, grl: Arc<Grl>) {
        self.grl = Some(grl);
    }

    /// The attached good-run list.
    pub fn grl(&self) -> Result<&Grl> {
        self.grl.as_deref().ok_or_else(|| Error::missing("good-run list", "GRL"))
    }

    /// Scalar names, in order.
    pub fn info_names(&self) -> impl Iterator<Item = &str> {
        self.info.keys().map(String::as_str)
    }

    /// Collection names, in order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorentz::LorentzVector;

    #[test]
    fn missing_keys_are_errors() {
        let e = Event::new();
        assert!(matches!(e.info("MET"), Err(Error::Missing { kind: "event info", .. })));
        assert!(matches!(e.collection("Jets"), Err(Error::Missing { kind: "collection", .. })));
        assert!(e.particle("l1").is_err());
        assert!(e.grl().is_err());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut e = Event::new();
        e.add_info("MET", 40.0).unwrap();
        assert!(e.add_info("MET", 41.0).is_err());
        e.add_collection("Jets", Arc::new(Vec::new())).unwrap();
        assert!(e.add_collection("Jets", Arc::new(Vec::new())).is_err());
    }

    #[test]
    fn particles_overwrite() {
        let mut e = Event::new();
        e.set_particle("j1", LorentzVector::from_pt_eta_phi_m(10.0, 0.0, 0.0, 0.0));
        e.set_particle("j1", LorentzVector::from_pt_eta_phi_m(20.0, 0.0, 0.0, 0.0));
        assert!((e.particle("j1").unwrap().pt() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn collections_are_shared() {
        let jets: Arc<PhysicsObjects> =
            Arc::new(vec![LorentzVector::from_pt_eta_phi_m(30.0, 0.0, 0.0, 0.0).into()]);
        let mut e = Event::new();
        e.add_collection("Jets", Arc::clone(&jets)).unwrap();
        assert_eq!(e.collection("Jets").unwrap().len(), 1);
        assert_eq!(Arc::strong_count(&jets), 2);
    }
}
