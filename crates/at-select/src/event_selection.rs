//! Event selections: assemble an [`Event`] per category and gate it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use at_core::{DataSource, Error, Event, Grl, PhysicsObject, PhysicsObjects, Result, VectorSource};
use at_store::{Histogram, OutputSink};

use crate::cache::PassContext;
use crate::categories::NOMINAL;
use crate::localised::{Localised, Scope};
use crate::selection::{Pipeline, Registry, RunContext, Selection, SelectionCore};

/// Where an event collection comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionSource {
    /// Output of an earlier selection, in one of its categories.
    Selection {
        /// Name of the upstream selection.
        name: String,
        /// Category of the upstream selection to take the collection from.
        category: String,
    },
    /// Raw four-vectors read straight from the data source.
    Input(VectorSource),
}

#[derive(Debug, Clone)]
struct CollectionBinding {
    name: String,
    source: CollectionSource,
    categories: Vec<String>,
    resolved: Option<usize>,
    dangling: bool,
}

/// Builds one [`Event`] per category from scalar inputs and bound
/// collections, then runs the category's pipeline on it, stopping at the
/// first failing cut.
///
/// Bindings apply to the categories that exist when they are declared.
/// Declaring one therefore finalises the category set.
pub struct EventSelection {
    core: SelectionCore<Event>,
    bindings: Vec<CollectionBinding>,
    info: Vec<(String, String)>,
    grl: Option<Arc<Grl>>,
    collections_cached: bool,
    events: HashMap<String, Event>,
    passes: HashMap<String, bool>,
}

impl EventSelection {
    /// Event selection called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: SelectionCore::new(name),
            bindings: Vec::new(),
            info: Vec::new(),
            grl: None,
            collections_cached: false,
            events: HashMap::new(),
            passes: HashMap::new(),
        }
    }

    fn bind(&mut self, name: String, source: CollectionSource, pattern: &str) -> Result<()> {
        self.core.scope.ensure_unlocked(&format!("add collection '{name}'"))?;
        let categories = self.core.categories_matching(pattern)?;
        if categories.is_empty() {
            log::warn!(
                "'{}': no category matches '{pattern}', collection '{name}' not bound",
                self.name()
            );
            return Ok(());
        }
        let clash = self
            .bindings
            .iter()
            .any(|b| b.name == name && b.categories.iter().any(|c| categories.contains(c)));
        if clash {
            return Err(Error::duplicate("collection", name));
        }
        self.bindings.push(CollectionBinding {
            name,
            source,
            categories,
            resolved: None,
            dangling: false,
        });
        Ok(())
    }

    /// Expose `category` of upstream selection `selection` as collection
    /// `name` in every current category.
    pub fn add_collection(&mut self, name: &str, selection: &str, category: &str) -> Result<()> {
        self.add_collection_to(name, selection, category, "")
    }

    /// As [`add_collection`](Self::add_collection), for the current
    /// categories matching `pattern` only.
    pub fn add_collection_to(
        &mut self,
        name: &str,
        selection: &str,
        category: &str,
        pattern: &str,
    ) -> Result<()> {
        let source = CollectionSource::Selection {
            name: selection.to_string(),
            category: category.to_string(),
        };
        self.bind(name.to_string(), source, pattern)
    }

    /// Expose the upstream selection's "Nominal" output as collection `name`.
    pub fn add_nominal_collection(&mut self, name: &str, selection: &str) -> Result<()> {
        self.add_collection(name, selection, NOMINAL)
    }

    /// Expose raw input four-vectors as collection `name` in every category.
    pub fn add_input_collection(&mut self, name: &str, input: VectorSource) -> Result<()> {
        self.bind(name.to_string(), CollectionSource::Input(input), "")
    }

    /// Copy data scalar `scalar` into every event as info `name`.
    pub fn add_info(&mut self, name: impl Into<String>, scalar: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.core.scope.ensure_unlocked(&format!("add info '{name}'"))?;
        if self.info.iter().any(|(n, _)| *n == name) {
            return Err(Error::duplicate("event info", name));
        }
        self.info.push((name, scalar.into()));
        Ok(())
    }

    /// Attach a good-run list to every event.
    pub fn set_grl(&mut self, grl: Grl) {
        self.grl = Some(Arc::new(grl));
    }

    /// Attach a shared good-run list to every event.
    pub fn set_grl_shared(&mut self, grl: Arc<Grl>) {
        self.grl = Some(grl);
    }

    /// Resolve upstream selection names to registry positions. Runs once,
    /// after the upstream selections have run for the first event; bindings
    /// whose selection, category or collection is missing are reported and
    /// left empty.
    pub fn cache_collections(&mut self, upstream: &Registry<'_>) {
        if self.collections_cached {
            return;
        }
        let me = self.core.scope.name();
        for b in &mut self.bindings {
            let CollectionSource::Selection { name, category } = &b.source else { continue };
            b.resolved = upstream.position(name);
            match b.resolved.and_then(|i| upstream.get(i)) {
                None => log::warn!(
                    "'{me}': collection '{}' refers to unknown selection '{name}'",
                    b.name
                ),
                Some(sel) if sel.collection(category).is_none() => log::warn!(
                    "'{me}': selection '{name}' provides no collection in category '{category}'; \
                     collection '{}' stays empty",
                    b.name
                ),
                Some(_) => continue,
            }
            b.dangling = true;
        }
        self.collections_cached = true;
    }

    /// Names of bindings that could not be resolved against the upstream
    /// selections.
    pub fn unresolved_collections(&self) -> Vec<&str> {
        self.bindings.iter().filter(|b| b.dangling).map(|b| b.name.as_str()).collect()
    }

    /// Outcome of `category` in the last run.
    pub fn passes(&self, category: &str) -> Result<bool> {
        self.passes.get(category).copied().ok_or_else(|| Error::missing("category result", category))
    }

    /// Outcome of the only category in the last run.
    pub fn result(&self) -> Result<bool> {
        match self.core.category_names() {
            [only] => self.passes(only),
            names => Err(Error::Configuration(format!(
                "'{}' has {} categories; ask for one by name",
                self.name(),
                names.len()
            ))),
        }
    }

    /// Outcome of `category` in the last run.
    pub fn result_in(&self, category: &str) -> Result<bool> {
        self.passes(category)
    }

    /// Event built for `category` in the last run.
    pub fn event(&self, category: &str) -> Option<&Event> {
        self.events.get(category)
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.core.cache_stats()
    }

    fn read_inputs(&self, data: &dyn DataSource) -> Result<HashMap<String, Arc<PhysicsObjects>>> {
        let mut out = HashMap::new();
        for b in &self.bindings {
            if let CollectionSource::Input(src) = &b.source {
                let objects: PhysicsObjects =
                    src.read(data)?.into_iter().map(PhysicsObject::new).collect();
                out.insert(b.name.clone(), Arc::new(objects));
            }
        }
        Ok(out)
    }
}

impl Pipeline for EventSelection {
    type Entity = Event;

    fn core(&self) -> &SelectionCore<Event> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SelectionCore<Event> {
        &mut self.core
    }
}

impl Localised for EventSelection {
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

impl Selection for EventSelection {
    fn run(
        &mut self,
        ctx: &RunContext,
        data: &dyn DataSource,
        upstream: &Registry<'_>,
    ) -> Result<bool> {
        let weight = ctx.effective_weight();
        let categories = self.core.begin_run();
        self.cache_collections(upstream);

        let info = self
            .info
            .iter()
            .map(|(name, scalar)| {
                data.scalar(scalar)
                    .map(|v| (name.as_str(), v))
                    .ok_or_else(|| Error::missing("input scalar", scalar.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;
        let inputs = self.read_inputs(data)?;

        for cat in &categories {
            let mut event = Event::new();
            for &(name, v) in &info {
                event.add_info(name, v)?;
            }
            if let Some(grl) = &self.grl {
                event.set_grl(Arc::clone(grl));
            }
            for b in self.bindings.iter().filter(|b| b.categories.contains(cat)) {
                let collection = match &b.source {
                    CollectionSource::Selection { category, .. } => b
                        .resolved
                        .and_then(|i| upstream.get(i))
                        .and_then(|s| s.collection(category)),
                    CollectionSource::Input(_) => inputs.get(&b.name).cloned(),
                };
                if let Some(c) = collection {
                    event.add_collection(b.name.clone(), c)?;
                }
            }

            self.core.setup_cutflow(cat)?;
            let core = &mut self.core;
            if core.caching {
                core.cache.clear();
            }
            let Some(cutflow) = core.cutflows.get_mut(cat) else { continue };
            cutflow.fill_bin(0, weight);

            let mut pass = true;
            let mut bin = 1;
            let mut pass_ctx = PassContext::new(&mut core.cache, core.caching);
            for node in core.operations.get_mut(cat).into_iter().flatten() {
                if !node.apply(&mut event, weight, &mut pass_ctx)? {
                    pass = false;
                    break;
                }
                if node.is_cut() {
                    cutflow.fill_bin(bin, weight);
                    bin += 1;
                }
            }

            log::debug!("'{}' [{cat}]: {}", core.scope.name(), if pass { "pass" } else { "fail" });
            self.passes.insert(cat.clone(), pass);
            self.events.insert(cat.clone(), event);
        }

        self.core.has_run = true;
        Ok(categories.is_empty() || categories.iter().any(|c| self.passes.get(c) == Some(&true)))
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

    fn write(&self, out: &mut dyn OutputSink) -> Result<()> {
        self.core.write(out)
    }

    fn print(&self) {
        self.core.print("EventSelection");
        for b in &self.bindings {
            match &b.source {
                CollectionSource::Selection { name, category } => {
                    log::info!("    Collection '{}' <- {name}/{category}", b.name);
                }
                CollectionSource::Input(src) => {
                    log::info!("    Collection '{}' <- input {}", b.name, src.describe());
                }
            }
        }
        for (name, scalar) in &self.info {
            log::info!("    Info '{name}' <- {scalar}");
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
    use at_core::{EventRecord, LorentzVector};

    fn met_cut(name: &str, min: f64) -> Cut<Event> {
        let mut cut = Cut::with_function(name, |e: &Event| e.info("MET"));
        cut.set_range(min, f64::INFINITY).unwrap();
        cut
    }

    fn met(v: f64) -> EventRecord {
        let mut rec = EventRecord::new();
        rec.set_scalar("met", v);
        rec
    }

    #[test]
    fn scalars_become_event_info() {
        let mut es = EventSelection::new("Event");
        es.add_info("MET", "met").unwrap();
        es.add_cut(met_cut("MET", 50.0)).unwrap();
        assert!(es.run(&RunContext::default(), &met(80.0), &Registry::empty()).unwrap());
        assert!(es.result().unwrap());
        assert!(!es.run(&RunContext::default(), &met(20.0), &Registry::empty()).unwrap());
        assert_eq!(es.event("Nominal").unwrap().info("MET").unwrap(), 20.0);
    }

    #[test]
    fn missing_scalar_is_an_error() {
        let mut es = EventSelection::new("Event");
        es.add_info("MET", "met").unwrap();
        let r = es.run(&RunContext::default(), &EventRecord::new(), &Registry::empty());
        assert!(matches!(r, Err(Error::Missing { .. })));
    }

    #[test]
    fn short_circuit_and_weighted_cutflow() {
        let mut es = EventSelection::new("Event");
        es.add_info("MET", "met").unwrap();
        es.add_cut(met_cut("MET", 50.0)).unwrap();
        es.add_operation(Operation::with_function("never", |_: &mut Event| {
            Err(Error::Configuration("must not run".into()))
        }))
        .unwrap();
        es.add_cut(met_cut("MET100", 100.0)).unwrap();

        let ctx = RunContext { weight: 3.0, sum_weights: Some(2.0) };
        assert!(!es.run(&ctx, &met(20.0), &Registry::empty()).unwrap());
        let h = es.cutflow("Nominal").unwrap();
        assert_eq!(h.bin_content, vec![1.5, 0.0, 0.0]);
    }

    #[test]
    fn unresolved_collection_fails_on_use() {
        let mut es = EventSelection::new("Event");
        es.add_nominal_collection("Jets", "NoSuchSelection").unwrap();
        es.add_cut(Cut::with_function("NJets", |e: &Event| Ok(e.collection("Jets")?.len() as f64)))
            .unwrap();
        let r = es.run(&RunContext::default(), &EventRecord::new(), &Registry::empty());
        assert!(matches!(r, Err(Error::Missing { kind: "collection", .. })));
    }

    #[test]
    fn unresolved_collection_is_harmless_if_unused() {
        let mut es = EventSelection::new("Event");
        es.add_nominal_collection("Jets", "NoSuchSelection").unwrap();
        assert!(es.run(&RunContext::default(), &EventRecord::new(), &Registry::empty()).unwrap());
    }

    #[test]
    fn input_collections_and_particles() {
        let mut rec = EventRecord::new();
        rec.set_vectors(
            "leptons",
            vec![
                LorentzVector::from_pt_eta_phi_m(40.0, 0.0, 0.0, 0.0),
                LorentzVector::from_pt_eta_phi_m(40.0, 0.0, std::f64::consts::PI, 0.0),
            ],
        );
        let mut es = EventSelection::new("Event");
        es.add_input_collection("Leptons", VectorSource::Vectors("leptons".into())).unwrap();
        es.add_operation(Operation::with_function("Z", |e: &mut Event| {
            let leptons = e.collection("Leptons")?;
            let z = leptons.iter().fold(LorentzVector::default(), |acc, l| acc + *l.p4());
            e.set_particle("Z", z);
            Ok(1.0)
        }))
        .unwrap();
        es.add_cut(Cut::from_expr("mZ", "Z.m > 60 && Leptons.n == 2").unwrap()).unwrap();
        assert!(es.run(&RunContext::default(), &rec, &Registry::empty()).unwrap());
        let z = es.event("Nominal").unwrap().particle("Z").unwrap();
        assert!((z.m() - 80.0).abs() < 1e-6);
    }

    #[test]
    fn bindings_use_categories_at_bind_time() {
        let mut es = EventSelection::new("Event");
        es.add_category("SR").unwrap();
        es.add_nominal_collection("Jets", "Jets").unwrap();
        // The binding finalised the category set.
        assert!(es.add_category("CR").is_err());
        assert!(matches!(
            es.add_nominal_collection("Jets", "Other"),
            Err(Error::Duplicate { .. })
        ));
    }

    #[test]
    fn grl_is_attached() {
        let grl = Grl::parse("100\n1,10\n").unwrap();
        let mut es = EventSelection::new("Event");
        es.set_grl(grl);
        es.add_info("run", "run").unwrap();
        es.add_info("lb", "lb").unwrap();
        es.add_cut(Cut::with_function("GRL", |e: &Event| {
            let good = e.grl()?.contains(e.info("run")? as i64, e.info("lb")? as i64);
            Ok(if good { 1.0 } else { 0.0 })
        }))
        .unwrap();
        let mut rec = EventRecord::new();
        rec.set_scalar("run", 100.0).set_scalar("lb", 5.0);
        assert!(es.run(&RunContext::default(), &rec, &Registry::empty()).unwrap());
        rec.set_scalar("lb", 11.0);
        assert!(!es.run(&RunContext::default(), &rec, &Registry::empty()).unwrap());
    }
}
