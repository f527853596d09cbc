//! Category-specific collection bindings between selections.

use at_core::{Event, EventRecord, LorentzVector, PhysicsObject, VectorSource};
use at_select::prelude::*;

fn record(pts: &[f64]) -> EventRecord {
    let mut rec = EventRecord::new();
    rec.set_vectors(
        "jets",
        pts.iter().map(|&pt| LorentzVector::from_pt_eta_phi_m(pt, 0.0, 0.0, 0.0)).collect(),
    );
    rec
}

fn jets() -> ObjectDefinition {
    let mut jets = ObjectDefinition::new("Jets").with_input(VectorSource::Vectors("jets".into()));
    jets.add_categories(&["Loose", "Tight"]).unwrap();
    let mut tight = Cut::with_function("pT", |p: &PhysicsObject| Ok(p.pt()));
    tight.set_range(50.0, f64::INFINITY).unwrap();
    jets.add_cut_to(tight, "Tight").unwrap();
    jets
}

fn events() -> EventSelection {
    let mut es = EventSelection::new("Event");
    es.add_categories(&["SR", "CR"]).unwrap();
    es.add_collection_to("Jets", "Jets", "Tight", "SR").unwrap();
    es.add_collection_to("Jets", "Jets", "Loose", "CR").unwrap();
    let mut two = Cut::with_function("TwoJets", |e: &Event| Ok(e.collection("Jets")?.len() as f64));
    two.set_range(2.0, f64::INFINITY).unwrap();
    es.add_cut(two).unwrap();
    es
}

#[test]
fn each_category_sees_its_own_upstream_category() {
    let mut analysis = Analysis::new("Bindings");
    analysis.add_selection(jets()).unwrap();
    analysis.add_selection(events()).unwrap();
    assert!(analysis.run(&record(&[80.0, 30.0]), 1.0, None).unwrap());

    let es: &EventSelection = analysis.get("Event").unwrap();
    assert!(!es.passes("SR").unwrap());
    assert!(es.passes("CR").unwrap());
    assert_eq!(es.event("SR").unwrap().collection("Jets").unwrap().len(), 1);
    assert_eq!(es.event("CR").unwrap().collection("Jets").unwrap().len(), 2);
    assert!(es.unresolved_collections().is_empty());
}

#[test]
fn binding_to_a_missing_upstream_category_is_reported() {
    let mut es = EventSelection::new("Event");
    es.add_collection("Jets", "Jets", "Medium").unwrap();
    es.add_collection("Leptons", "Leptons", "Nominal").unwrap();

    let mut analysis = Analysis::new("Bindings");
    analysis.add_selection(jets()).unwrap();
    analysis.add_selection(es).unwrap();
    assert!(analysis.run(&record(&[80.0]), 1.0, None).unwrap());

    let es: &EventSelection = analysis.get("Event").unwrap();
    assert_eq!(es.unresolved_collections(), ["Jets", "Leptons"]);
    assert!(es.event("Nominal").unwrap().collection("Jets").is_err());
}
