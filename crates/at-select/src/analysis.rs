//! The top-level analysis: an ordered registry of selections and the output
//! hierarchy they are written into.

use std::time::Instant;

use at_core::{DataSource, Error, Result};
use at_store::{DirPath, Ntuple, OutputSink};

use crate::localised::{Localised, Scope};
use crate::selection::{Registry, RunContext, Selection};

/// Runs its selections in registration order for every event.
///
/// A selection only sees selections registered before it, so collection
/// bindings can point upstream only.
///
/// ```
/// use at_core::{EventRecord, LorentzVector, VectorSource};
/// use at_select::prelude::*;
///
/// let mut jets = ObjectDefinition::new("Jets").with_input(VectorSource::Vectors("jets".into()));
/// let mut pt = at_select::common::cut_pt();
/// pt.set_range(20.0, f64::INFINITY).unwrap();
/// jets.add_cut(pt).unwrap();
///
/// let mut analysis = Analysis::new("Demo");
/// analysis.add_selection(jets).unwrap();
///
/// let mut rec = EventRecord::new();
/// rec.set_vectors("jets", vec![LorentzVector::from_pt_eta_phi_m(45_000.0, 0.0, 0.0, 0.0)]);
/// assert!(analysis.run(&rec, 1.0, None).unwrap());
/// ```
pub struct Analysis {
    scope: Scope,
    selections: Vec<Box<dyn Selection>>,
    output: Option<Box<dyn OutputSink>>,
    tree: Option<Ntuple>,
    started: Option<Instant>,
}

impl Analysis {
    /// Empty analysis called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::new(name),
            selections: Vec::new(),
            output: None,
            tree: None,
            started: None,
        }
    }

    /// Attach an output sink: creates the analysis directory at its top level
    /// and places every selection registered so far under it.
    pub fn open_output(&mut self, out: Box<dyn OutputSink>) -> Result<()> {
        let out = self.output.insert(out);
        let dir = self.scope.place_root(out.as_mut())?;
        for sel in &mut self.selections {
            sel.put(Some(&dir), "", out.as_mut())?;
        }
        log::debug!("'{}' writing to '{dir}'", self.scope.name());
        Ok(())
    }

    /// Write everything and hand the sink back.
    pub fn close_output(&mut self) -> Result<Option<Box<dyn OutputSink>>> {
        if self.output.is_some() {
            self.save()?;
        }
        Ok(self.output.take())
    }

    /// The attached sink, if it is an `S`.
    pub fn output<S: OutputSink + 'static>(&self) -> Option<&S> {
        self.output.as_deref()?.as_any().downcast_ref()
    }

    /// Register `selection` after all existing ones.
    pub fn add_selection(&mut self, selection: impl Selection + 'static) -> Result<()> {
        self.add_boxed_selection(Box::new(selection))
    }

    /// Register an already boxed selection.
    pub fn add_boxed_selection(&mut self, mut selection: Box<dyn Selection>) -> Result<()> {
        self.scope.ensure_unlocked(&format!("add selection '{}'", selection.name()))?;
        if self.selections.iter().any(|s| s.name() == selection.name()) {
            return Err(Error::duplicate("selection", selection.name()));
        }
        if let Some(out) = self.output.as_deref_mut() {
            selection.put(self.scope.dir(), "", out)?;
        }
        self.scope.add_child(selection.name(), "");
        self.selections.push(selection);
        Ok(())
    }

    /// Number of registered selections.
    pub fn len(&self) -> usize {
        self.selections.len()
    }

    /// Whether no selection is registered.
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Registered selections, in order.
    pub fn selections(&self) -> Registry<'_> {
        Registry::new(&self.selections)
    }

    /// Selection `name`.
    pub fn selection(&self, name: &str) -> Option<&dyn Selection> {
        self.selections.iter().find(|s| s.name() == name).map(|s| s.as_ref())
    }

    /// Selection `name` as its concrete type.
    pub fn get<S: Selection>(&self, name: &str) -> Option<&S> {
        self.selection(name)?.as_any().downcast_ref()
    }

    /// Selection `name` as its concrete type, mutably.
    pub fn get_mut<S: Selection>(&mut self, name: &str) -> Option<&mut S> {
        self.selections
            .iter_mut()
            .find(|s| s.name() == name)?
            .as_any_mut()
            .downcast_mut()
    }

    /// Process one event.
    ///
    /// Returns `false` as soon as a required selection fails; later
    /// selections are not run for this event. A failing selection that is not
    /// required is logged and skipped over.
    pub fn run(
        &mut self,
        data: &dyn DataSource,
        weight: f64,
        sum_weights: Option<f64>,
    ) -> Result<bool> {
        if !self.scope.locked() {
            self.scope.lock();
        }
        let ctx = RunContext { weight, sum_weights };
        for i in 0..self.selections.len() {
            let (done, rest) = self.selections.split_at_mut(i);
            let sel = &mut rest[0];
            if sel.run(&ctx, data, &Registry::new(done))? {
                continue;
            }
            if sel.required() {
                log::debug!("'{}': stopped at '{}'", self.scope.name(), sel.name());
                return Ok(false);
            }
            log::debug!("'{}': '{}' failed but is not required", self.scope.name(), sel.name());
        }
        Ok(true)
    }

    /// [`run`](Self::run) for event `current` of `total`, logging progress
    /// every tenth of the sample and the throughput at the end.
    pub fn run_with_progress(
        &mut self,
        current: u64,
        total: u64,
        data: &dyn DataSource,
        weight: f64,
        sum_weights: Option<f64>,
    ) -> Result<bool> {
        if current == 0 || self.started.is_none() {
            self.started = Some(Instant::now());
        }
        let pass = self.run(data, weight, sum_weights)?;

        let done = current + 1;
        let step = (total / 10).max(1);
        if total > 0 && (done % step == 0 || done == total) {
            log::info!(
                "'{}': {done}/{total} events ({:.0}%)",
                self.scope.name(),
                100.0 * done as f64 / total as f64
            );
        }
        if done == total
            && let Some(start) = self.started
        {
            let secs = start.elapsed().as_secs_f64();
            if secs > 0.0 {
                log::info!("'{}': {:.1} events/s", self.scope.name(), total as f64 / secs);
            }
        }
        Ok(pass)
    }

    /// Declare the analysis-level output tree with `branches`.
    pub fn add_tree(&mut self, name: &str, branches: &[&str]) -> Result<()> {
        if self.tree.is_some() {
            return Err(Error::duplicate("output tree", name));
        }
        let mut tree = Ntuple::new(name, self.scope.name());
        for b in branches {
            tree.add_branch(b)?;
        }
        self.tree = Some(tree);
        Ok(())
    }

    /// Append one row, in branch order, to the output tree.
    pub fn fill_tree(&mut self, row: Vec<f64>) -> Result<()> {
        self.tree
            .as_mut()
            .ok_or_else(|| Error::missing("output tree", self.scope.name()))?
            .fill(row)
    }

    /// The output tree, if declared.
    pub fn tree(&self) -> Option<&Ntuple> {
        self.tree.as_ref()
    }

    /// Place every selection (including nodes added since they were
    /// attached) and write cutflows, recorder trees and the output tree.
    pub fn save(&mut self) -> Result<()> {
        let Some(out) = self.output.as_deref_mut() else {
            log::warn!("'{}' has no output; nothing saved", self.scope.name());
            return Ok(());
        };
        let dir: DirPath = self.scope.place_root(out)?;
        for sel in &mut self.selections {
            sel.put(Some(&dir), "", out)?;
            sel.write(out)?;
        }
        if let Some(tree) = &self.tree {
            out.write_ntuple(&dir, tree)?;
        }
        log::info!("'{}' saved to '{dir}'", self.scope.name());
        Ok(())
    }

    /// Log the whole configuration.
    pub fn print(&self) {
        log::info!("Analysis '{}':", self.scope.name());
        for sel in &self.selections {
            sel.print();
        }
    }
}

impl Localised for Analysis {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    fn put_children(&mut self, out: &mut dyn OutputSink) -> Result<()> {
        let dir = self.scope.dir().cloned();
        for sel in &mut self.selections {
            sel.put(dir.as_ref(), "", out)?;
        }
        Ok(())
    }

    fn lock_children(&mut self) {
        for sel in &mut self.selections {
            sel.lock_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cut, EventSelection, ObjectDefinition, Pipeline};
    use at_core::{Event, EventRecord, LorentzVector, VectorSource};
    use at_store::MemoryStore;

    fn jets() -> ObjectDefinition {
        ObjectDefinition::new("Jets").with_input(VectorSource::Vectors("jets".into()))
    }

    fn record(pts: &[f64]) -> EventRecord {
        let mut rec = EventRecord::new();
        rec.set_vectors(
            "jets",
            pts.iter().map(|&pt| LorentzVector::from_pt_eta_phi_m(pt, 0.0, 0.0, 0.0)).collect(),
        );
        rec
    }

    #[test]
    fn duplicate_selection_names_are_rejected() {
        let mut a = Analysis::new("A");
        a.add_selection(jets()).unwrap();
        assert!(matches!(a.add_selection(jets()), Err(Error::Duplicate { .. })));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn downstream_sees_upstream_output() {
        let mut es = EventSelection::new("Event");
        es.add_nominal_collection("Jets", "Jets").unwrap();
        es.add_cut(Cut::from_expr("TwoJets", "Jets.n >= 2").unwrap()).unwrap();

        let mut a = Analysis::new("A");
        a.add_selection(jets()).unwrap();
        a.add_selection(es).unwrap();

        assert!(a.run(&record(&[30.0, 40.0]), 1.0, None).unwrap());
        assert!(!a.run(&record(&[30.0]), 1.0, None).unwrap());
        let es: &EventSelection = a.get("Event").unwrap();
        assert_eq!(es.cutflow("Nominal").unwrap().bin_content, vec![2.0, 1.0]);
    }

    #[test]
    fn optional_selection_does_not_stop_the_chain() {
        let mut veto = EventSelection::new("Veto");
        veto.add_cut(Cut::with_function("Never", |_: &Event| Ok(0.0))).unwrap();
        veto.set_required(false);
        let mut after = EventSelection::new("After");
        after.add_cut(Cut::with_function("Always", |_: &Event| Ok(1.0))).unwrap();

        let mut a = Analysis::new("A");
        a.add_selection(veto).unwrap();
        a.add_selection(after).unwrap();
        assert!(a.run(&EventRecord::new(), 1.0, None).unwrap());
        assert!(a.selection("After").unwrap().has_run());
    }

    #[test]
    fn save_writes_cutflows_and_tree() {
        let mut a = Analysis::new("A");
        a.add_selection(jets()).unwrap();
        a.open_output(Box::new(MemoryStore::new())).unwrap();
        a.add_tree("Events", &["njets"]).unwrap();
        a.run(&record(&[10.0, 20.0]), 1.0, None).unwrap();
        let n = a.get::<ObjectDefinition>("Jets").unwrap().result().unwrap().len();
        a.fill_tree(vec![n as f64]).unwrap();
        a.save().unwrap();

        let store: &MemoryStore = a.output().unwrap();
        assert_eq!(store.histogram("A/Jets/Nominal", "Cutflow").unwrap().bin_content, vec![2.0]);
        assert_eq!(store.ntuple("A", "Events").unwrap().column("njets"), Some(vec![2.0]));
    }

    #[test]
    fn fill_tree_needs_a_tree() {
        let mut a = Analysis::new("A");
        assert!(a.fill_tree(vec![1.0]).is_err());
        a.add_tree("T", &["x"]).unwrap();
        assert!(a.add_tree("T", &["x"]).is_err());
    }
}
