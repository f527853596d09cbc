//! Ready-made cuts and plot recorders for the usual kinematics.
//!
//! Inputs are in MeV; momenta, masses and energies come out in GeV. Cuts are
//! returned without ranges, set them on the result.

use at_core::{Event, PhysicsObject, Result};

use crate::operation::Cut;
use crate::plot::PlotRecorder;

const MEV_PER_GEV: f64 = 1000.0;

/// Value recorded by the leading/subleading plots when the collection is too
/// short.
pub const FALLBACK: f64 = -9999.0;

/// Object transverse momentum in GeV, cut named `pt`.
pub fn cut_pt() -> Cut<PhysicsObject> {
    Cut::with_function("pt", |p: &PhysicsObject| Ok(p.pt() / MEV_PER_GEV))
}

/// Object pseudorapidity, cut named `eta`.
pub fn cut_eta() -> Cut<PhysicsObject> {
    Cut::with_function("eta", |p: &PhysicsObject| Ok(p.eta()))
}

/// Object mass in GeV, cut named `m`.
pub fn cut_m() -> Cut<PhysicsObject> {
    Cut::with_function("m", |p: &PhysicsObject| Ok(p.m() / MEV_PER_GEV))
}

/// Size of event collection `collection`, cut named `Num<collection>`.
pub fn cut_num(collection: &str) -> Cut<Event> {
    let key = collection.to_string();
    Cut::with_function(format!("Num{collection}"), move |e: &Event| {
        Ok(e.collection(&key)?.len() as f64)
    })
}

/// Event info `name` times `scale`.
pub fn cut_event_info(name: &str, scale: f64) -> Cut<Event> {
    let key = name.to_string();
    Cut::with_function(name, move |e: &Event| Ok(e.info(&key)? * scale))
}

/// Object info `name` times `scale`.
pub fn cut_object_info(name: &str, scale: f64) -> Cut<PhysicsObject> {
    let key = name.to_string();
    Cut::with_function(name, move |p: &PhysicsObject| Ok(p.info(&key)? * scale))
}

/// Passes events whose `(run, lumi_block)` event info lies in the attached
/// good-run list.
pub fn cut_grl(run: &str, lumi_block: &str) -> Cut<Event> {
    let (run, lb) = (run.to_string(), lumi_block.to_string());
    Cut::with_function("GRL", move |e: &Event| {
        let good = e.grl()?.contains(e.info(&run)? as i64, e.info(&lb)? as i64);
        Ok(f64::from(u8::from(good)))
    })
}

/// Object transverse momentum in GeV.
pub fn plot_object_pt() -> PlotRecorder<PhysicsObject> {
    PlotRecorder::new("pt", |p: &PhysicsObject| Ok(p.pt() / MEV_PER_GEV))
}

/// Object mass in GeV.
pub fn plot_object_m() -> PlotRecorder<PhysicsObject> {
    PlotRecorder::new("m", |p: &PhysicsObject| Ok(p.m() / MEV_PER_GEV))
}

/// Object energy in GeV.
pub fn plot_object_e() -> PlotRecorder<PhysicsObject> {
    PlotRecorder::new("E", |p: &PhysicsObject| Ok(p.e / MEV_PER_GEV))
}

/// Object pseudorapidity.
pub fn plot_object_eta() -> PlotRecorder<PhysicsObject> {
    PlotRecorder::new("eta", |p: &PhysicsObject| Ok(p.eta()))
}

/// Object azimuth.
pub fn plot_object_phi() -> PlotRecorder<PhysicsObject> {
    PlotRecorder::new("phi", |p: &PhysicsObject| Ok(p.phi()))
}

/// Object info `name` times `scale`.
pub fn plot_object_info(name: &str, scale: f64) -> PlotRecorder<PhysicsObject> {
    let key = name.to_string();
    PlotRecorder::new(name, move |p: &PhysicsObject| Ok(p.info(&key)? * scale))
}

/// Event info `name` times `scale`.
pub fn plot_event_info(name: &str, scale: f64) -> PlotRecorder<Event> {
    let key = name.to_string();
    PlotRecorder::new(name, move |e: &Event| Ok(e.info(&key)? * scale))
}

fn nth_object<F>(
    prefix: &str,
    index: usize,
    collection: &str,
    var: &str,
    fallback: f64,
    f: F,
) -> PlotRecorder<Event>
where
    F: Fn(&PhysicsObject) -> Result<f64> + Send + Sync + 'static,
{
    let key = collection.to_string();
    PlotRecorder::new(format!("{prefix}_{collection}_{var}"), move |e: &Event| {
        match e.collection(&key)?.get(index) {
            Some(obj) => f(obj),
            None => Ok(fallback),
        }
    })
}

/// Leading-object transverse momentum in GeV, named `leading_<collection>_pt`.
pub fn plot_event_leading_pt(collection: &str, fallback: f64) -> PlotRecorder<Event> {
    nth_object("leading", 0, collection, "pt", fallback, |p| Ok(p.pt() / MEV_PER_GEV))
}

/// Leading-object mass in GeV.
pub fn plot_event_leading_m(collection: &str, fallback: f64) -> PlotRecorder<Event> {
    nth_object("leading", 0, collection, "m", fallback, |p| Ok(p.m() / MEV_PER_GEV))
}

/// Leading-object energy in GeV.
pub fn plot_event_leading_e(collection: &str, fallback: f64) -> PlotRecorder<Event> {
    nth_object("leading", 0, collection, "E", fallback, |p| Ok(p.e / MEV_PER_GEV))
}

/// Leading-object pseudorapidity.
pub fn plot_event_leading_eta(collection: &str, fallback: f64) -> PlotRecorder<Event> {
    nth_object("leading", 0, collection, "eta", fallback, |p| Ok(p.eta()))
}

/// Leading-object azimuth.
pub fn plot_event_leading_phi(collection: &str, fallback: f64) -> PlotRecorder<Event> {
    nth_object("leading", 0, collection, "phi", fallback, |p| Ok(p.phi()))
}

/// Info `name` of the leading object times `scale`.
pub fn plot_event_leading_info(
    collection: &str,
    name: &str,
    scale: f64,
    fallback: f64,
) -> PlotRecorder<Event> {
    let key = name.to_string();
    nth_object("leading", 0, collection, name, fallback, move |p| Ok(p.info(&key)? * scale))
}

/// Info `name` of the subleading object times `scale`.
pub fn plot_event_subleading_info(
    collection: &str,
    name: &str,
    scale: f64,
    fallback: f64,
) -> PlotRecorder<Event> {
    let key = name.to_string();
    nth_object("subleading", 1, collection, name, fallback, move |p| Ok(p.info(&key)? * scale))
}
