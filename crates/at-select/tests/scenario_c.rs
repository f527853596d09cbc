//! A failing event selection stops the analysis for the event.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use at_core::{DataSource, Event, EventRecord, Result, VectorSource};
use at_select::prelude::*;
use at_select::{Registry, RunContext, Scope};
use at_store::{Histogram, OutputSink};

/// Counts how often it is run.
struct Sentinel {
    scope: Scope,
    calls: Arc<AtomicUsize>,
}

impl Localised for Sentinel {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }
}

impl Selection for Sentinel {
    fn run(&mut self, _: &RunContext, _: &dyn DataSource, _: &Registry<'_>) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn categories(&self) -> &[String] {
        &[]
    }

    fn cutflow(&self, _: &str) -> Option<&Histogram> {
        None
    }

    fn has_run(&self) -> bool {
        self.calls.load(Ordering::SeqCst) > 0
    }

    fn write(&self, _: &mut dyn OutputSink) -> Result<()> {
        Ok(())
    }

    fn print(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn analysis(calls: &Arc<AtomicUsize>) -> Analysis {
    let objdef = ObjectDefinition::new("ObjdefA").with_input(VectorSource::Vectors("objects".into()));

    let mut veto = EventSelection::new("Veto");
    veto.add_categories(&["SR", "CR"]).unwrap();
    veto.add_cut(Cut::with_function("Never", |_: &Event| Ok(0.0))).unwrap();

    let mut a = Analysis::new("C");
    a.add_selection(objdef).unwrap();
    a.add_selection(veto).unwrap();
    a.add_selection(Sentinel { scope: Scope::new("Sentinel"), calls: Arc::clone(calls) }).unwrap();
    a
}

#[test]
fn later_selections_are_skipped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut a = analysis(&calls);
    let mut rec = EventRecord::new();
    rec.set_vectors("objects", Vec::new());

    for _ in 0..3 {
        assert!(!a.run(&rec, 1.0, None).unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(a.selection("ObjdefA").unwrap().has_run());
    assert!(!a.selection("Sentinel").unwrap().has_run());
}

#[test]
fn errors_abort_the_event() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut a = analysis(&calls);
    // The object definition's input is missing.
    assert!(a.run(&EventRecord::new(), 1.0, None).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
