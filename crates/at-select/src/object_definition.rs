//! Object definitions: filter a raw object collection per category.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use at_core::{
    DataSource, Error, PhysicsObject, PhysicsObjects, Result, VectorSource,
};
use at_store::{Histogram, OutputSink};

use crate::cache::{PassContext, ValueCache};
use crate::categories::NOMINAL;
use crate::localised::{Localised, Scope};
use crate::operation::OperationNode;
use crate::selection::{Pipeline, Registry, RunContext, Selection, SelectionCore};

/// Builds candidates from an input collection plus per-object info columns,
/// then prunes them category by category.
///
/// The cutflow counts candidates: `"All"` gets the input size, each cut bin
/// the number surviving it. Running never vetoes the event.
///
/// The input collection and info columns must not change during one run.
pub struct ObjectDefinition {
    core: SelectionCore<PhysicsObject>,
    input: Option<VectorSource>,
    info: Vec<(String, String)>,
    candidates: HashMap<String, Arc<PhysicsObjects>>,
}

impl ObjectDefinition {
    /// Object definition called `name`, with no input yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: SelectionCore::new(name),
            input: None,
            info: Vec::new(),
            candidates: HashMap::new(),
        }
    }

    /// Builder form of [`set_input`](Self::set_input).
    pub fn with_input(mut self, input: VectorSource) -> Self {
        self.input = Some(input);
        self
    }

    /// Where the raw four-vectors come from.
    pub fn set_input(&mut self, input: VectorSource) -> Result<()> {
        self.core.scope.ensure_unlocked("set input")?;
        self.input = Some(input);
        Ok(())
    }

    /// Attach data column `column` to every candidate as info `name`.
    pub fn add_info(&mut self, name: impl Into<String>, column: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.core.scope.ensure_unlocked(&format!("add info '{name}'"))?;
        if self.info.iter().any(|(n, _)| *n == name) {
            return Err(Error::duplicate("object info", name));
        }
        self.info.push((name, column.into()));
        Ok(())
    }

    /// Surviving candidates of the only category.
    ///
    /// Fails when more than one category is declared; empty before the first run.
    pub fn result(&self) -> Result<Arc<PhysicsObjects>> {
        let names = self.core.category_names();
        let category = match names {
            [] => NOMINAL,
            [only] => only.as_str(),
            _ => {
                return Err(Error::Configuration(format!(
                    "'{}' has {} categories; ask for one by name",
                    self.name(),
                    names.len()
                )));
            }
        };
        Ok(self.candidates.get(category).cloned().unwrap_or_default())
    }

    /// Surviving candidates of `category`.
    pub fn result_in(&self, category: &str) -> Result<Arc<PhysicsObjects>> {
        if !self.core.categories.contains(category) {
            return Err(Error::missing("category", category));
        }
        Ok(self.candidates.get(category).cloned().unwrap_or_default())
    }

    /// Cache counters summed over every candidate.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.core.cache_stats()
    }

    fn build_candidates(&self, data: &dyn DataSource) -> Result<PhysicsObjects> {
        let input = self.input.as_ref().ok_or_else(|| {
            Error::Configuration(format!("object definition '{}' has no input", self.name()))
        })?;
        let vectors = input.read(data)?;
        let n = vectors.len();

        let mut columns = Vec::with_capacity(self.info.len());
        for (name, column) in &self.info {
            let values =
                data.column(column).ok_or_else(|| Error::missing("info column", column.as_str()))?;
            if values.len() != n {
                return Err(Error::Validation(format!(
                    "'{}': info column '{column}' has {} entries, input '{}' has {n}",
                    self.name(),
                    values.len(),
                    input.describe()
                )));
            }
            columns.push((name.as_str(), values));
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let mut p = PhysicsObject::new(v);
                for (name, values) in &columns {
                    p.add_info(*name, values[i])?;
                }
                Ok(p)
            })
            .collect()
    }
}

impl Pipeline for ObjectDefinition {
    type Entity = PhysicsObject;

    fn core(&self) -> &SelectionCore<PhysicsObject> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SelectionCore<PhysicsObject> {
        &mut self.core
    }
}

impl Localised for ObjectDefinition {
    fn scope(&self) -> &Scope {
        &self.core.scope
    }

    fn scope_mut(&mut self) -> &mut Scope {
        &mut self.core.scope
    }

    fn put_children(&mut self, out: &mut dyn OutputSink) -> Result<()> {
        self.core.put_nodes(out)
    }

    fn lock_children(&mut self) {
        self.core.lock_nodes();
    }
}

impl Selection for ObjectDefinition {
    fn run(
        &mut self,
        ctx: &RunContext,
        data: &dyn DataSource,
        _upstream: &Registry<'_>,
    ) -> Result<bool> {
        let weight = ctx.effective_weight();
        let categories = self.core.begin_run();
        let base = self.build_candidates(data)?;
        let n = base.len();

        for cat in &categories {
            self.core.setup_cutflow(cat)?;
            let core = &mut self.core;
            let caching = core.caching;
            let Some(cutflow) = core.cutflows.get_mut(cat) else { continue };

            let mut candidates = base.clone();
            let mut caches = vec![ValueCache::new(); n];
            cutflow.fill_bin(0, n as f64);

            let mut bin = 1;
            for node in core.operations.get_mut(cat).into_iter().flatten() {
                match node {
                    OperationNode::Cut(cut) => {
                        for i in (0..candidates.len()).rev() {
                            let mut pass_ctx = PassContext::new(&mut caches[i], caching);
                            if !cut.apply(&candidates[i], weight, &mut pass_ctx)? {
                                candidates.remove(i);
                                core.cache.absorb_stats(&caches.remove(i));
                            }
                        }
                        cutflow.fill_bin(bin, candidates.len() as f64);
                        bin += 1;
                    }
                    OperationNode::Operation(op) => {
                        for (p, cache) in candidates.iter_mut().zip(caches.iter_mut()) {
                            let mut pass_ctx = PassContext::new(cache, caching);
                            op.apply(p, weight, &mut pass_ctx)?;
                        }
                    }
                }
            }
            for cache in &caches {
                core.cache.absorb_stats(cache);
            }

            log::debug!("'{}' [{cat}]: {} of {n} candidates kept", core.scope.name(), candidates.len());
            self.candidates.insert(cat.clone(), Arc::new(candidates));
        }

        self.core.has_run = true;
        Ok(true)
    }

    fn categories(&self) -> &[String] {
        self.core.category_names()
    }

    fn cutflow(&self, category: &str) -> Option<&Histogram> {
        self.core.cutflow(category)
    }

    fn has_run(&self) -> bool {
        self.core.has_run
    }

    fn required(&self) -> bool {
        self.core.required
    }

    fn collection(&self, category: &str) -> Option<Arc<PhysicsObjects>> {
        self.candidates.get(category).cloned()
    }

    fn write(&self, out: &mut dyn OutputSink) -> Result<()> {
        self.core.write(out)
    }

    fn print(&self) {
        self.core.print("ObjectDefinition");
        if let Some(input) = &self.input {
            log::info!("    Input: {}", input.describe());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Cut, Operation};
    use at_core::{EventRecord, KinematicsMode, LorentzVector};

    fn record(pts: &[f64]) -> EventRecord {
        let mut rec = EventRecord::new();
        let vecs = pts.iter().map(|&pt| LorentzVector::from_pt_eta_phi_m(pt, 0.0, 0.0, 0.0)).collect();
        rec.set_vectors("jets", vecs);
        rec
    }

    fn jets() -> ObjectDefinition {
        ObjectDefinition::new("Jets").with_input(VectorSource::Vectors("jets".into()))
    }

    fn pt_cut(min: f64) -> Cut<PhysicsObject> {
        let mut cut = Cut::with_function("pT", |p: &PhysicsObject| Ok(p.pt()));
        cut.set_range(min, f64::INFINITY).unwrap();
        cut
    }

    #[test]
    fn missing_input_is_an_error() {
        let mut od = ObjectDefinition::new("Jets");
        let err = od.run(&RunContext::default(), &EventRecord::new(), &Registry::empty());
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn info_columns_are_attached() {
        let mut rec = record(&[30.0, 40.0]);
        rec.set_column("btag", vec![0.1, 0.9]);
        let mut od = jets();
        od.add_info("btag", "btag").unwrap();
        od.add_cut(Cut::from_expr("btagged", "btag > 0.5").unwrap()).unwrap();
        od.run(&RunContext::default(), &rec, &Registry::empty()).unwrap();
        let res = od.result().unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].info("btag").unwrap(), 0.9);
    }

    #[test]
    fn info_length_mismatch_fails() {
        let mut rec = record(&[30.0, 40.0]);
        rec.set_column("btag", vec![0.1]);
        let mut od = jets();
        od.add_info("btag", "btag").unwrap();
        let r = od.run(&RunContext::default(), &rec, &Registry::empty());
        assert!(matches!(r, Err(Error::Validation(_))));
    }

    #[test]
    fn categories_filter_independently() {
        let mut od = jets();
        od.add_categories(&["Loose", "Tight"]).unwrap();
        od.add_cut_to(pt_cut(20.0), "Loose").unwrap();
        od.add_cut_to(pt_cut(50.0), "Tight").unwrap();
        od.run(&RunContext::default(), &record(&[10.0, 30.0, 60.0]), &Registry::empty()).unwrap();

        assert_eq!(od.result_in("Loose").unwrap().len(), 2);
        assert_eq!(od.result_in("Tight").unwrap().len(), 1);
        assert!(od.result().is_err());
        assert!(od.result_in("Medium").is_err());
        assert_eq!(od.cutflow("Tight").unwrap().bin_content, vec![3.0, 1.0]);
    }

    #[test]
    fn operations_touch_every_candidate() {
        let mut od = jets();
        od.add_operation(Operation::define("ptGeV", "pt_gev", "pt / 1000").unwrap()).unwrap();
        od.add_cut(Cut::from_expr("hard", "pt_gev > 0.02").unwrap()).unwrap();
        od.run(&RunContext::default(), &record(&[10.0, 30.0]), &Registry::empty()).unwrap();
        let res = od.result().unwrap();
        assert_eq!(res.len(), 1);
        assert!((res[0].pt() - 30.0).abs() < 1e-9);

        od.run(&RunContext::default(), &record(&[25_000.0]), &Registry::empty()).unwrap();
        let res = od.result().unwrap();
        assert_eq!(res.len(), 1);
        assert!((res[0].info("pt_gev").unwrap() - 25.0).abs() < 1e-9);
        // Operations do not advance the cutflow.
        assert_eq!(od.cutflow("Nominal").unwrap().n_bins(), 2);
    }

    #[test]
    fn columns_input() {
        let mut rec = EventRecord::new();
        rec.set_column("el_pt", vec![15.0, 45.0])
            .set_column("el_eta", vec![0.1, -1.0])
            .set_column("el_phi", vec![0.0, 2.0])
            .set_column("el_m", vec![0.0, 0.0]);
        let mut od = ObjectDefinition::new("Electrons").with_input(VectorSource::columns(
            KinematicsMode::PtEtaPhiM,
            "el_pt",
            "el_eta",
            "el_phi",
            "el_m",
        ));
        od.add_cut(pt_cut(25.0)).unwrap();
        assert!(od.run(&RunContext::default(), &rec, &Registry::empty()).unwrap());
        assert_eq!(od.result().unwrap().len(), 1);
    }

    #[test]
    fn configuration_is_frozen_after_run() {
        let mut od = jets();
        od.run(&RunContext::default(), &record(&[1.0]), &Registry::empty()).unwrap();
        assert!(od.add_info("btag", "btag").is_err());
        assert!(od.add_cut(pt_cut(1.0)).is_err());
        assert!(od.has_run());
    }
}
