//! Machinery shared by every selection: categories, per-category node lists,
//! cutflows, the value cache, and the [`Selection`] trait the analysis drives.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use at_core::{DataSource, Error, PhysicsObjects, Result};
use at_store::{DirPath, Histogram, OutputSink};

use crate::cache::{CacheStats, ValueCache};
use crate::categories::CategorySet;
use crate::localised::{Localised, Scope};
use crate::operation::{Cut, Operation, OperationNode};
use crate::plot::{CutPosition, PlotRecorder};

/// Label of the first cutflow bin.
pub const CUTFLOW_ALL: &str = "All";

/// Name of every cutflow histogram in the output.
pub const CUTFLOW_NAME: &str = "Cutflow";

/// Per-event inputs threaded into every [`Selection::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunContext {
    /// Event weight.
    pub weight: f64,
    /// Optional normalisation; ignored when zero.
    pub sum_weights: Option<f64>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self { weight: 1.0, sum_weights: None }
    }
}

impl RunContext {
    /// Context with `weight` and no normalisation.
    pub fn weighted(weight: f64) -> Self {
        Self { weight, sum_weights: None }
    }

    /// `weight / sum_weights` if a non-zero sum is set, else `weight`.
    pub fn effective_weight(&self) -> f64 {
        match self.sum_weights {
            Some(s) if s != 0.0 => self.weight / s,
            _ => self.weight,
        }
    }
}

/// Read-only view of the selections registered before the one running.
#[derive(Clone, Copy)]
pub struct Registry<'a> {
    selections: &'a [Box<dyn Selection>],
}

impl<'a> Registry<'a> {
    /// View over `selections`.
    pub fn new(selections: &'a [Box<dyn Selection>]) -> Self {
        Self { selections }
    }

    /// A registry with nothing in it, for running a selection standalone.
    pub fn empty() -> Self {
        Self { selections: &[] }
    }

    /// Index of the selection called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.selections.iter().position(|s| s.name() == name)
    }

    /// Selection at `index`.
    pub fn get(&self, index: usize) -> Option<&'a dyn Selection> {
        self.selections.get(index).map(|s| s.as_ref())
    }

    /// Selection called `name`.
    pub fn find(&self, name: &str) -> Option<&'a dyn Selection> {
        self.position(name).and_then(|i| self.get(i))
    }

    /// Number of selections visible.
    pub fn len(&self) -> usize {
        self.selections.len()
    }

    /// Whether nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

/// A step of an [`Analysis`](crate::Analysis), run once per event.
pub trait Selection: Localised + Any {
    /// Process one event. `upstream` holds the selections that ran before.
    fn run(&mut self, ctx: &RunContext, data: &dyn DataSource, upstream: &Registry<'_>)
    -> Result<bool>;

    /// Declared categories (empty before the first run if none were declared).
    fn categories(&self) -> &[String];

    /// Cutflow histogram of `category`, once created.
    fn cutflow(&self, category: &str) -> Option<&Histogram>;

    /// Whether [`run`](Self::run) has been called.
    fn has_run(&self) -> bool;

    /// Whether a failure stops the analysis for this event.
    fn required(&self) -> bool {
        true
    }

    /// Output collection of `category`, for selections that produce one.
    fn collection(&self, _category: &str) -> Option<Arc<PhysicsObjects>> {
        None
    }

    /// Write cutflows and node trees into the placed hierarchy.
    fn write(&self, out: &mut dyn OutputSink) -> Result<()>;

    /// Log the configuration.
    fn print(&self);

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// State common to object definitions and event selections over node
/// entity type `U`.
pub struct SelectionCore<U> {
    pub(crate) scope: Scope,
    pub(crate) categories: CategorySet,
    pub(crate) operations: HashMap<String, Vec<OperationNode<U>>>,
    pub(crate) cutflows: HashMap<String, Histogram>,
    pub(crate) caching: bool,
    pub(crate) cache: ValueCache,
    pub(crate) has_run: bool,
    pub(crate) required: bool,
}

impl<U: 'static> SelectionCore<U> {
    /// Empty core called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::new(name),
            categories: CategorySet::new(),
            operations: HashMap::new(),
            cutflows: HashMap::new(),
            caching: false,
            cache: ValueCache::new(),
            has_run: false,
            required: true,
        }
    }

    /// Declare a category.
    pub fn add_category(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.scope.ensure_unlocked(&format!("add category '{name}'"))?;
        self.categories.add(name.clone())?;
        self.operations.entry(name).or_default();
        Ok(())
    }

    /// Finalised categories: injects "Nominal" if none were declared.
    pub fn finalized_categories(&mut self) -> &[String] {
        self.categories.finalize()
    }

    /// Declared categories, without finalising.
    pub fn category_names(&self) -> &[String] {
        self.categories.names()
    }

    /// Finalised categories matching `pattern` (empty matches all).
    pub fn categories_matching(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.categories.finalize();
        self.categories.matching(pattern)
    }

    /// Freeze the category set. Idempotent.
    pub fn lock_categories(&mut self) {
        self.categories.lock();
    }

    fn add_node(&mut self, node: OperationNode<U>, pattern: &str) -> Result<()> {
        let what = if node.is_cut() { "cut" } else { "operation" };
        self.scope.ensure_unlocked(&format!("add {what} '{}'", node.name()))?;
        if node.name().is_empty() {
            return Err(Error::Configuration(format!("{what} name must not be empty")));
        }

        let targets = self.categories_matching(pattern)?;
        if targets.is_empty() {
            log::warn!(
                "'{}': no category matches '{pattern}', {what} '{}' not added",
                self.scope.name(),
                node.name()
            );
            return Ok(());
        }
        for cat in &targets {
            if self.operations.get(cat).is_some_and(|l| l.iter().any(|n| n.name() == node.name())) {
                return Err(Error::duplicate("pipeline node", format!("{cat}/{}", node.name())));
            }
        }
        for cat in targets {
            self.scope.add_child(node.name(), &cat);
            self.operations.entry(cat).or_default().push(node.clone());
        }
        Ok(())
    }

    /// Append `cut` to every category.
    pub fn add_cut(&mut self, cut: Cut<U>) -> Result<()> {
        self.add_node(cut.into(), "")
    }

    /// Append `cut` to the categories matching `pattern`.
    pub fn add_cut_to(&mut self, cut: Cut<U>, pattern: &str) -> Result<()> {
        self.add_node(cut.into(), pattern)
    }

    /// Append `op` to every category.
    pub fn add_operation(&mut self, op: Operation<U>) -> Result<()> {
        self.add_node(op.into(), "")
    }

    /// Append `op` to the categories matching `pattern`.
    pub fn add_operation_to(&mut self, op: Operation<U>, pattern: &str) -> Result<()> {
        self.add_node(op.into(), pattern)
    }

    fn remove_node(&mut self, name: &str, category: Option<&str>, cut: bool) -> Result<usize> {
        self.scope.ensure_unlocked(&format!("remove '{name}'"))?;
        let mut removed = 0;
        for (cat, list) in self.operations.iter_mut() {
            if category.is_some_and(|c| c != cat) {
                continue;
            }
            let before = list.len();
            list.retain(|n| !(n.name() == name && n.is_cut() == cut));
            if list.len() != before {
                removed += before - list.len();
                self.scope.pop_child(name, cat);
            }
        }
        Ok(removed)
    }

    /// Remove cut `name` from every category; returns how many were removed.
    pub fn remove_cut(&mut self, name: &str) -> Result<usize> {
        self.remove_node(name, None, true)
    }

    /// Remove cut `name` from `category`.
    pub fn remove_cut_in(&mut self, name: &str, category: &str) -> Result<usize> {
        self.remove_node(name, Some(category), true)
    }

    /// Remove operation `name` from every category.
    pub fn remove_operation(&mut self, name: &str) -> Result<usize> {
        self.remove_node(name, None, false)
    }

    /// Remove operation `name` from `category`.
    pub fn remove_operation_in(&mut self, name: &str, category: &str) -> Result<usize> {
        self.remove_node(name, Some(category), false)
    }

    /// Pipeline of `category`, in order.
    pub fn operations(&self, category: &str) -> &[OperationNode<U>] {
        self.operations.get(category).map_or(&[], Vec::as_slice)
    }

    /// Node at `index` in `category`.
    pub fn node(&self, category: &str, index: usize) -> Option<&OperationNode<U>> {
        self.operations(category).get(index)
    }

    /// Cut `name` in `category`.
    pub fn cut(&self, name: &str, category: &str) -> Option<&Cut<U>> {
        self.operations(category).iter().filter_map(OperationNode::as_cut).find(|c| c.name() == name)
    }

    /// Cut `name` in `category`, mutably.
    pub fn cut_mut(&mut self, name: &str, category: &str) -> Option<&mut Cut<U>> {
        self.operations
            .get_mut(category)?
            .iter_mut()
            .filter_map(OperationNode::as_cut_mut)
            .find(|c| c.name() == name)
    }

    /// Add `plot` to every cut already in the pipeline.
    pub fn add_plot(&mut self, pos: CutPosition, plot: PlotRecorder<U>) -> Result<()> {
        self.scope.ensure_unlocked(&format!("add plot '{}'", plot.name()))?;
        for cut in self.operations.values_mut().flatten().filter_map(OperationNode::as_cut_mut) {
            cut.add_plot(pos, plot.clone());
        }
        Ok(())
    }

    /// Cutflow of `category`, once created.
    pub fn cutflow(&self, category: &str) -> Option<&Histogram> {
        self.cutflows.get(category)
    }

    /// Create the cutflow of `category` if missing: `"All"` then one bin per cut.
    pub fn setup_cutflow(&mut self, category: &str) -> Result<()> {
        if self.cutflows.contains_key(category) {
            return Ok(());
        }
        let labels: Vec<String> = std::iter::once(CUTFLOW_ALL.to_string())
            .chain(
                self.operations(category)
                    .iter()
                    .filter(|n| n.is_cut())
                    .map(|n| n.name().to_string()),
            )
            .collect();
        let mut h = Histogram::cutflow(CUTFLOW_NAME, &labels)?;
        h.title = category.to_string();
        self.cutflows.insert(category.to_string(), h);
        Ok(())
    }

    /// Share values between nodes through the cache.
    pub fn set_caching(&mut self, caching: bool) {
        self.caching = caching;
    }

    /// Whether values are shared through the cache.
    pub fn caching(&self) -> bool {
        self.caching
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Mark the selection (not) required.
    pub fn set_required(&mut self, required: bool) {
        self.required = required;
    }

    /// Freeze configuration: finalise categories and lock every node.
    pub fn lock(&mut self) {
        self.categories.finalize();
        self.scope.lock();
        for node in self.operations.values_mut().flatten() {
            node.lock_all();
        }
    }

    /// Called at the top of every run: locks on first use and returns the
    /// categories to process.
    pub(crate) fn begin_run(&mut self) -> Vec<String> {
        if !self.scope.locked() {
            self.lock();
        }
        let cats = self.categories.finalize().to_vec();
        for cat in &cats {
            self.operations.entry(cat.clone()).or_default();
        }
        cats
    }

    /// Place every node under `<own dir>/<category>/`.
    pub(crate) fn put_nodes(&mut self, out: &mut dyn OutputSink) -> Result<()> {
        let dir = self.scope.dir().cloned();
        for cat in self.categories.names() {
            if let Some(list) = self.operations.get_mut(cat) {
                for node in list {
                    node.put(dir.as_ref(), cat, out)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn lock_nodes(&mut self) {
        for node in self.operations.values_mut().flatten() {
            node.lock_all();
        }
    }

    /// Write each cutflow to `<own dir>/<category>/Cutflow` and the node trees.
    pub(crate) fn write(&self, out: &mut dyn OutputSink) -> Result<()> {
        let Some(dir) = self.scope.dir() else {
            log::warn!("'{}' has no output directory; nothing written", self.scope.name());
            return Ok(());
        };
        for cat in self.categories.names() {
            let cat_dir: DirPath = out.mkdir(Some(dir), cat)?;
            if let Some(h) = self.cutflows.get(cat) {
                out.write_histogram(&cat_dir, h)?;
            }
            for node in self.operations(cat) {
                node.write(out)?;
            }
        }
        Ok(())
    }

    pub(crate) fn print(&self, kind: &str) {
        log::info!("  {kind} '{}':", self.scope.name());
        for cat in self.categories.names() {
            log::info!("    Category '{cat}':");
            for node in self.operations(cat) {
                node.print();
            }
        }
    }
}

/// Builder-style configuration shared by [`ObjectDefinition`](crate::ObjectDefinition)
/// and [`EventSelection`](crate::EventSelection).
pub trait Pipeline {
    /// Entity type the nodes operate on.
    type Entity: 'static;

    /// Shared state.
    fn core(&self) -> &SelectionCore<Self::Entity>;

    /// Shared state, mutably.
    fn core_mut(&mut self) -> &mut SelectionCore<Self::Entity>;

    /// Declare a category.
    fn add_category(&mut self, name: &str) -> Result<()> {
        self.core_mut().add_category(name)
    }

    /// Declare several categories.
    fn add_categories(&mut self, names: &[&str]) -> Result<()> {
        names.iter().try_for_each(|n| self.core_mut().add_category(*n))
    }

    /// Finalised category list.
    fn finalized_categories(&mut self) -> Vec<String> {
        self.core_mut().finalized_categories().to_vec()
    }

    /// Finalised categories matching `pattern`.
    fn categories_matching(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.core_mut().categories_matching(pattern)
    }

    /// Freeze categories.
    fn lock_categories(&mut self) {
        self.core_mut().lock_categories();
    }

    /// Append a cut to every category.
    fn add_cut(&mut self, cut: Cut<Self::Entity>) -> Result<()> {
        self.core_mut().add_cut(cut)
    }

    /// Append a cut to the categories matching `pattern`.
    fn add_cut_to(&mut self, cut: Cut<Self::Entity>, pattern: &str) -> Result<()> {
        self.core_mut().add_cut_to(cut, pattern)
    }

    /// Append an operation to every category.
    fn add_operation(&mut self, op: Operation<Self::Entity>) -> Result<()> {
        self.core_mut().add_operation(op)
    }

    /// Append an operation to the categories matching `pattern`.
    fn add_operation_to(&mut self, op: Operation<Self::Entity>, pattern: &str) -> Result<()> {
        self.core_mut().add_operation_to(op, pattern)
    }

    /// Add a recorder to every cut already present.
    fn add_plot(&mut self, pos: CutPosition, plot: PlotRecorder<Self::Entity>) -> Result<()> {
        self.core_mut().add_plot(pos, plot)
    }

    /// Enable or disable value sharing between nodes.
    fn set_caching(&mut self, caching: bool) {
        self.core_mut().set_caching(caching);
    }

    /// Mark the selection (not) required.
    fn set_required(&mut self, required: bool) {
        self.core_mut().set_required(required);
    }
}
