//! Pipeline nodes: [`Cut`] gates, [`Operation`] derives, [`OperationNode`]
//! is the closed set the selections iterate over.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use at_core::{CompiledExpr, Decorate, Error, Range, Ranges, Result, Variables, passes};
use at_store::{Ntuple, OutputSink};

use crate::cache::{CUT_VARIABLE, PassContext, WEIGHT};
use crate::localised::{Localised, Scope};
use crate::plot::{CutPosition, MutFn, PlotRecorder, Recorder, ValueFn};

/// Precut/Postcut ntuples of one node with the column of every recorded value.
#[derive(Debug, Clone)]
struct NodeTrees {
    pre: Ntuple,
    post: Ntuple,
    pre_slots: Vec<usize>,
    post_slots: Vec<usize>,
}

impl NodeTrees {
    fn new(pre_names: &[&str], post_names: &[&str]) -> Result<Self> {
        let (pre, pre_slots) = tree("Precut", "TTree with (pre-)cut value distribution", pre_names)?;
        let (post, post_slots) =
            tree("Postcut", "TTree with (post-)cut value distribution", post_names)?;
        Ok(Self { pre, post, pre_slots, post_slots })
    }

    fn fill(&mut self, pos: CutPosition, values: &[f64]) -> Result<()> {
        let (tree, slots) = match pos {
            CutPosition::Pre => (&mut self.pre, &self.pre_slots),
            CutPosition::Post => (&mut self.post, &self.post_slots),
        };
        let mut row = vec![0.0; tree.branches().len()];
        for (&slot, &v) in slots.iter().zip(values) {
            row[slot] = v;
        }
        tree.fill(row)
    }
}

fn tree(name: &str, title: &str, branches: &[&str]) -> Result<(Ntuple, Vec<usize>)> {
    let mut t = Ntuple::new(name, title);
    for (i, b) in branches.iter().enumerate() {
        if branches[..i].contains(b) {
            log::warn!(
                "{name}: two recorders named '{b}' share one column; the later value is kept"
            );
        }
    }
    let slots = branches.iter().map(|b| t.add_branch(b)).collect::<Result<Vec<_>>>()?;
    Ok((t, slots))
}

/// Per-position recorder lists shared by [`Cut`] and [`Operation`].
struct Plots<T> {
    pre: Vec<Recorder<T>>,
    post: Vec<Recorder<T>>,
}

impl<T> Default for Plots<T> {
    fn default() -> Self {
        Self { pre: Vec::new(), post: Vec::new() }
    }
}

impl<T> Clone for Plots<T> {
    fn clone(&self) -> Self {
        Self { pre: self.pre.clone(), post: self.post.clone() }
    }
}

impl<T: 'static> Plots<T> {
    fn at(&self, pos: CutPosition) -> &[Recorder<T>] {
        match pos {
            CutPosition::Pre => &self.pre,
            CutPosition::Post => &self.post,
        }
    }

    fn push(&mut self, owner: &str, initialised: bool, pos: CutPosition, rec: Recorder<T>) {
        if initialised {
            log::warn!("'{owner}' is already running; plot '{}' is ignored", rec.name());
            return;
        }
        match pos {
            CutPosition::Pre => self.pre.push(rec),
            CutPosition::Post => self.post.push(rec),
        }
    }

    fn push_dyn(&mut self, owner: &str, initialised: bool, pos: CutPosition, plot: &dyn Any) {
        if let Some(p) = plot.downcast_ref::<PlotRecorder<T>>() {
            self.push(owner, initialised, pos, Recorder::Entity(p.clone()));
        } else if let Some(p) = plot.downcast_ref::<PlotRecorder<f64>>() {
            self.push(owner, initialised, pos, Recorder::Weight(p.clone()));
        } else {
            log::warn!(
                "'{owner}' does not recognise the entity type of the plot; expected {}",
                std::any::type_name::<PlotRecorder<T>>()
            );
        }
    }

    fn names(&self, pos: CutPosition) -> Vec<&str> {
        self.at(pos).iter().map(Recorder::name).collect()
    }

    fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    fn record(
        &self,
        pos: CutPosition,
        obj: &T,
        weight: f64,
        ctx: &mut PassContext<'_>,
        values: &mut Vec<f64>,
    ) -> Result<()> {
        for rec in self.at(pos) {
            values.push(rec.record(obj, weight, ctx)?);
        }
        Ok(())
    }
}

fn write_trees(scope: &Scope, trees: Option<&NodeTrees>, out: &mut dyn OutputSink) -> Result<()> {
    if let (Some(dir), Some(t)) = (scope.dir(), trees) {
        out.write_ntuple(dir, &t.pre)?;
        out.write_ntuple(dir, &t.post)?;
    }
    Ok(())
}

/// A gate: evaluates its function and passes if the value lies in any of
/// its ranges (or, with no ranges, if the value is non-zero).
///
/// Every application records the event weight and the cut value (plus user
/// pre-plots) into the node's `Precut` tree, and, on pass, into `Postcut`
/// together with the user post-plots.
pub struct Cut<T> {
    scope: Scope,
    function: Option<ValueFn<T>>,
    ranges: Ranges,
    variable: String,
    plots: Plots<T>,
    trees: Option<NodeTrees>,
    initialised: bool,
}

/// Copies carry configuration only; recorded trees start empty.
impl<T> Clone for Cut<T> {
    fn clone(&self) -> Self {
        Self {
            scope: Scope::new(self.scope.name()),
            function: self.function.clone(),
            ranges: self.ranges.clone(),
            variable: self.variable.clone(),
            plots: self.plots.clone(),
            trees: None,
            initialised: false,
        }
    }
}

impl<T> fmt::Debug for Cut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cut")
            .field("name", &self.scope.name())
            .field("ranges", &self.ranges)
            .field("variable", &self.variable)
            .field("initialised", &self.initialised)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Cut<T> {
    /// Cut with no function yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::new(name),
            function: None,
            ranges: Vec::new(),
            variable: CUT_VARIABLE.to_string(),
            plots: Plots::default(),
            trees: None,
            initialised: false,
        }
    }

    /// Cut `name` evaluating `function`.
    pub fn with_function<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&T) -> Result<f64> + Send + Sync + 'static,
    {
        let mut cut = Self::new(name);
        cut.set_function(function);
        cut
    }

    /// Set the value function.
    pub fn set_function<F>(&mut self, function: F)
    where
        F: Fn(&T) -> Result<f64> + Send + Sync + 'static,
    {
        self.function = Some(Arc::new(function));
    }

    /// Whether a function has been set.
    pub fn has_function(&self) -> bool {
        self.function.is_some()
    }

    /// Value of the cut function for `obj`, without touching ranges, plots
    /// or the cache.
    pub fn evaluate(&self, obj: &T) -> Result<f64> {
        match &self.function {
            Some(f) => f(obj),
            None => Err(Error::Configuration(format!("cut '{}' has no function", self.name()))),
        }
    }

    /// Drop all ranges.
    pub fn clear_ranges(&mut self) {
        self.ranges.clear();
    }

    /// Replace all ranges with `[lower, upper]`.
    pub fn set_range(&mut self, lower: f64, upper: f64) -> Result<()> {
        let r = Range::new(lower, upper)?;
        self.ranges = vec![r];
        Ok(())
    }

    /// Add `[lower, upper]` to the union.
    pub fn add_range(&mut self, lower: f64, upper: f64) -> Result<()> {
        self.ranges.push(Range::new(lower, upper)?);
        Ok(())
    }

    /// Add a point range at `value` to the union.
    pub fn add_point(&mut self, value: f64) -> Result<()> {
        self.ranges.push(Range::point(value)?);
        Ok(())
    }

    /// Replace all ranges.
    pub fn set_ranges(&mut self, ranges: Ranges) {
        self.ranges = ranges;
    }

    /// Append ranges to the union.
    pub fn add_ranges(&mut self, ranges: impl IntoIterator<Item = Range>) {
        self.ranges.extend(ranges);
    }

    /// Configured ranges.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Tree column of the cut value (default `"CutVariable"`). A custom name
    /// also publishes the value to the cache for later nodes; the decision
    /// itself is always taken on this cut's own function.
    pub fn set_variable(&mut self, name: impl Into<String>) {
        self.variable = name.into();
    }

    /// Tree column of the cut value.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Attach an entity recorder.
    pub fn add_plot(&mut self, pos: CutPosition, plot: PlotRecorder<T>) {
        self.plots.push(self.scope.name(), self.initialised, pos, Recorder::Entity(plot));
    }

    /// Attach a recorder over the event weight.
    pub fn add_weight_plot(&mut self, pos: CutPosition, plot: PlotRecorder<f64>) {
        self.plots.push(self.scope.name(), self.initialised, pos, Recorder::Weight(plot));
    }

    /// Attach a recorder of unknown entity type; skipped with a warning unless
    /// it is a `PlotRecorder<T>` or a `PlotRecorder<f64>`.
    pub fn add_plot_dyn(&mut self, pos: CutPosition, plot: &dyn Any) {
        self.plots.push_dyn(self.scope.name(), self.initialised, pos, plot);
    }

    /// Drop user recorders.
    pub fn clear_plots(&mut self) {
        self.plots = Plots::default();
    }

    /// User recorders at `pos`.
    pub fn plots(&self, pos: CutPosition) -> &[Recorder<T>] {
        self.plots.at(pos)
    }

    /// `(Precut, Postcut)` trees, once initialised.
    pub fn trees(&self) -> Option<(&Ntuple, &Ntuple)> {
        self.trees.as_ref().map(|t| (&t.pre, &t.post))
    }

    fn init(&mut self) -> Result<()> {
        let mut pre = vec![WEIGHT, self.variable.as_str()];
        pre.extend(self.plots.names(CutPosition::Pre));
        let mut post = vec![WEIGHT, self.variable.as_str()];
        post.extend(self.plots.names(CutPosition::Post));
        self.trees = Some(NodeTrees::new(&pre, &post)?);
        self.initialised = true;
        log::debug!("initialised cut '{}'", self.scope.name());
        Ok(())
    }

    /// Apply to `obj` at event weight `weight`; `Ok(true)` if it passes.
    pub fn apply(&mut self, obj: &T, weight: f64, ctx: &mut PassContext<'_>) -> Result<bool> {
        let function = self.function.clone().ok_or_else(|| {
            Error::Configuration(format!("cut '{}' applied before a function was set", self.name()))
        })?;
        if !self.initialised {
            self.init()?;
        }

        let value = ctx.value(CUT_VARIABLE, obj, |o| function(o))?;
        if self.variable != CUT_VARIABLE {
            ctx.share(&self.variable, value)?;
        }

        let mut values = vec![weight, value];
        self.plots.record(CutPosition::Pre, obj, weight, ctx, &mut values)?;
        if let Some(t) = self.trees.as_mut() {
            t.fill(CutPosition::Pre, &values)?;
        }

        let pass = passes(&self.ranges, value);

        if pass {
            values.truncate(2);
            self.plots.record(CutPosition::Post, obj, weight, ctx, &mut values)?;
            if let Some(t) = self.trees.as_mut() {
                t.fill(CutPosition::Post, &values)?;
            }
        }
        Ok(pass)
    }

    /// Write the recorder trees into this node's directory.
    pub fn write(&self, out: &mut dyn OutputSink) -> Result<()> {
        write_trees(&self.scope, self.trees.as_ref(), out)
    }

    /// Log the configuration.
    pub fn print(&self) {
        log::info!("      Cut '{}':", self.name());
        if self.ranges.is_empty() {
            log::info!("        (boolean)");
        }
        for r in &self.ranges {
            log::info!("        [{}, {}]", r.lower(), r.upper());
        }
    }
}

impl<T: Variables + 'static> Cut<T> {
    /// Cut evaluating the expression `expr`.
    pub fn from_expr(name: impl Into<String>, expr: &str) -> Result<Self> {
        let compiled = CompiledExpr::compile(expr)?;
        Ok(Self::with_function(name, move |obj: &T| compiled.eval(obj)))
    }
}

impl<T> Localised for Cut<T> {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }
}

/// A derivation step: runs a function that may modify the entity.
///
/// Its return value only decides whether the post-plots are recorded; the
/// pipeline always continues past an operation. Recorder trees are only
/// kept when user plots were attached.
pub struct Operation<T> {
    scope: Scope,
    function: Option<MutFn<T>>,
    plots: Plots<T>,
    trees: Option<NodeTrees>,
    initialised: bool,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            scope: Scope::new(self.scope.name()),
            function: self.function.clone(),
            plots: self.plots.clone(),
            trees: None,
            initialised: false,
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.scope.name())
            .field("initialised", &self.initialised)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Operation<T> {
    /// Operation with no function yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::new(name),
            function: None,
            plots: Plots::default(),
            trees: None,
            initialised: false,
        }
    }

    /// Operation `name` running `function`.
    pub fn with_function<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut T) -> Result<f64> + Send + Sync + 'static,
    {
        let mut op = Self::new(name);
        op.set_function(function);
        op
    }

    /// Set the function.
    pub fn set_function<F>(&mut self, function: F)
    where
        F: Fn(&mut T) -> Result<f64> + Send + Sync + 'static,
    {
        self.function = Some(Arc::new(function));
    }

    /// Attach an entity recorder.
    pub fn add_plot(&mut self, pos: CutPosition, plot: PlotRecorder<T>) {
        self.plots.push(self.scope.name(), self.initialised, pos, Recorder::Entity(plot));
    }

    /// Attach a recorder over the event weight.
    pub fn add_weight_plot(&mut self, pos: CutPosition, plot: PlotRecorder<f64>) {
        self.plots.push(self.scope.name(), self.initialised, pos, Recorder::Weight(plot));
    }

    /// Attach a recorder of unknown entity type (see [`Cut::add_plot_dyn`]).
    pub fn add_plot_dyn(&mut self, pos: CutPosition, plot: &dyn Any) {
        self.plots.push_dyn(self.scope.name(), self.initialised, pos, plot);
    }

    /// Drop user recorders.
    pub fn clear_plots(&mut self) {
        self.plots = Plots::default();
    }

    /// User recorders at `pos`.
    pub fn plots(&self, pos: CutPosition) -> &[Recorder<T>] {
        self.plots.at(pos)
    }

    /// `(Precut, Postcut)` trees, if any plots were attached.
    pub fn trees(&self) -> Option<(&Ntuple, &Ntuple)> {
        self.trees.as_ref().map(|t| (&t.pre, &t.post))
    }

    fn init(&mut self) -> Result<()> {
        if !self.plots.is_empty() {
            let mut pre = vec![WEIGHT];
            pre.extend(self.plots.names(CutPosition::Pre));
            let mut post = vec![WEIGHT];
            post.extend(self.plots.names(CutPosition::Post));
            self.trees = Some(NodeTrees::new(&pre, &post)?);
        }
        self.initialised = true;
        log::debug!("initialised operation '{}'", self.scope.name());
        Ok(())
    }

    /// Run on `obj`; returns the truthiness of the function's result.
    pub fn apply(&mut self, obj: &mut T, weight: f64, ctx: &mut PassContext<'_>) -> Result<bool> {
        let function = self.function.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "operation '{}' applied before a function was set",
                self.name()
            ))
        })?;
        if !self.initialised {
            self.init()?;
        }

        let mut values = vec![weight];
        if self.trees.is_some() {
            self.plots.record(CutPosition::Pre, obj, weight, ctx, &mut values)?;
            if let Some(t) = self.trees.as_mut() {
                t.fill(CutPosition::Pre, &values)?;
            }
        }

        let value = function(&mut *obj)?;
        let pass = passes(&[], value);

        if pass && self.trees.is_some() {
            values.truncate(1);
            self.plots.record(CutPosition::Post, obj, weight, ctx, &mut values)?;
            if let Some(t) = self.trees.as_mut() {
                t.fill(CutPosition::Post, &values)?;
            }
        }
        Ok(pass)
    }

    /// Write the recorder trees (if any) into this node's directory.
    pub fn write(&self, out: &mut dyn OutputSink) -> Result<()> {
        write_trees(&self.scope, self.trees.as_ref(), out)
    }

    /// Log the configuration.
    pub fn print(&self) {
        log::info!("      Operation '{}'", self.name());
    }
}

impl<T: Variables + Decorate + 'static> Operation<T> {
    /// Operation storing the value of `expr` on the entity as `variable`.
    pub fn define(name: impl Into<String>, variable: &str, expr: &str) -> Result<Self> {
        let compiled = CompiledExpr::compile(expr)?;
        let variable = variable.to_string();
        Ok(Self::with_function(name, move |obj: &mut T| {
            let v = compiled.eval(&*obj)?;
            obj.decorate(&variable, v)?;
            Ok(1.0)
        }))
    }
}

impl<T> Localised for Operation<T> {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }
}

/// One step of a selection pipeline.
pub enum OperationNode<T> {
    /// Gating step.
    Cut(Cut<T>),
    /// Non-gating derivation step.
    Operation(Operation<T>),
}

impl<T> Clone for OperationNode<T> {
    fn clone(&self) -> Self {
        match self {
            OperationNode::Cut(c) => OperationNode::Cut(c.clone()),
            OperationNode::Operation(o) => OperationNode::Operation(o.clone()),
        }
    }
}

impl<T> fmt::Debug for OperationNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationNode::Cut(c) => c.fmt(f),
            OperationNode::Operation(o) => o.fmt(f),
        }
    }
}

impl<T: 'static> OperationNode<T> {
    /// Apply to `obj`. Cuts report their decision; operations always report
    /// `true`.
    pub fn apply(&mut self, obj: &mut T, weight: f64, ctx: &mut PassContext<'_>) -> Result<bool> {
        match self {
            OperationNode::Cut(cut) => cut.apply(obj, weight, ctx),
            OperationNode::Operation(op) => {
                op.apply(obj, weight, ctx)?;
                Ok(true)
            }
        }
    }

    /// Whether this is a [`Cut`].
    pub fn is_cut(&self) -> bool {
        matches!(self, OperationNode::Cut(_))
    }

    /// The cut, if this is one.
    pub fn as_cut(&self) -> Option<&Cut<T>> {
        match self {
            OperationNode::Cut(c) => Some(c),
            OperationNode::Operation(_) => None,
        }
    }

    /// The cut, if this is one.
    pub fn as_cut_mut(&mut self) -> Option<&mut Cut<T>> {
        match self {
            OperationNode::Cut(c) => Some(c),
            OperationNode::Operation(_) => None,
        }
    }

    /// The operation, if this is one.
    pub fn as_operation(&self) -> Option<&Operation<T>> {
        match self {
            OperationNode::Operation(o) => Some(o),
            OperationNode::Cut(_) => None,
        }
    }

    /// `(Precut, Postcut)` trees, once initialised.
    pub fn trees(&self) -> Option<(&Ntuple, &Ntuple)> {
        match self {
            OperationNode::Cut(c) => c.trees(),
            OperationNode::Operation(o) => o.trees(),
        }
    }

    /// Write recorder trees into this node's directory.
    pub fn write(&self, out: &mut dyn OutputSink) -> Result<()> {
        match self {
            OperationNode::Cut(c) => c.write(out),
            OperationNode::Operation(o) => o.write(out),
        }
    }

    /// Log the configuration.
    pub fn print(&self) {
        match self {
            OperationNode::Cut(c) => c.print(),
            OperationNode::Operation(o) => o.print(),
        }
    }
}

impl<T> Localised for OperationNode<T> {
    fn scope(&self) -> &Scope {
        match self {
            OperationNode::Cut(c) => c.scope(),
            OperationNode::Operation(o) => o.scope(),
        }
    }

    fn scope_mut(&mut self) -> &mut Scope {
        match self {
            OperationNode::Cut(c) => c.scope_mut(),
            OperationNode::Operation(o) => o.scope_mut(),
        }
    }
}

impl<T> From<Cut<T>> for OperationNode<T> {
    fn from(c: Cut<T>) -> Self {
        OperationNode::Cut(c)
    }
}

impl<T> From<Operation<T>> for OperationNode<T> {
    fn from(o: Operation<T>) -> Self {
        OperationNode::Operation(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ValueCache;
    use at_core::{Event, LorentzVector, PhysicsObject};

    fn jet(pt: f64) -> PhysicsObject {
        PhysicsObject::new(LorentzVector::from_pt_eta_phi_m(pt, 0.0, 0.0, 0.0))
    }

    fn pt_cut() -> Cut<PhysicsObject> {
        let mut cut = Cut::with_function("pT", |p: &PhysicsObject| Ok(p.pt()));
        cut.set_range(20.0, f64::INFINITY).unwrap();
        cut
    }

    #[test]
    fn apply_without_function_is_an_error() {
        let mut cut: Cut<PhysicsObject> = Cut::new("pT");
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        assert!(matches!(cut.apply(&jet(10.0), 1.0, &mut ctx), Err(Error::Configuration(_))));
    }

    #[test]
    fn cut_fills_trees() {
        let mut cut = pt_cut();
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        assert!(!cut.apply(&jet(10.0), 0.5, &mut ctx).unwrap());
        assert!(cut.apply(&jet(60.0), 2.0, &mut ctx).unwrap());

        let (pre, post) = cut.trees().unwrap();
        assert_eq!(pre.entries(), 2);
        assert_eq!(post.entries(), 1);
        assert_eq!(pre.branches(), ["weight", "CutVariable"]);
        assert_eq!(post.column("weight").unwrap(), vec![2.0]);
        assert!((post.column("CutVariable").unwrap()[0] - 60.0).abs() < 1e-9);
    }

    #[test]
    fn union_of_ranges() {
        let mut cut = Cut::with_function("x", |x: &f64| Ok(*x));
        cut.add_range(0.0, 1.0).unwrap();
        cut.add_range(5.0, 6.0).unwrap();
        cut.add_point(10.0).unwrap();
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        for (x, expect) in [(0.5, true), (5.5, true), (10.0, true), (3.0, false), (10.5, false)] {
            assert_eq!(cut.apply(&x, 1.0, &mut ctx).unwrap(), expect, "x = {x}");
        }
    }

    #[test]
    fn no_ranges_means_truthiness() {
        let mut cut = Cut::with_function("flag", |x: &f64| Ok(*x));
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        assert!(cut.apply(&1.0, 1.0, &mut ctx).unwrap());
        assert!(!cut.apply(&0.0, 1.0, &mut ctx).unwrap());
    }

    #[test]
    fn post_plots_only_on_pass() {
        let mut cut = pt_cut();
        cut.add_plot(CutPosition::Pre, PlotRecorder::new("eta", |p: &PhysicsObject| Ok(p.eta())));
        cut.add_plot(CutPosition::Post, PlotRecorder::new("pt", |p: &PhysicsObject| Ok(p.pt())));
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        cut.apply(&jet(5.0), 1.0, &mut ctx).unwrap();
        cut.apply(&jet(50.0), 1.0, &mut ctx).unwrap();
        let (pre, post) = cut.trees().unwrap();
        assert_eq!(pre.column("eta").unwrap().len(), 2);
        assert_eq!(post.column("pt").unwrap().len(), 1);
    }

    #[test]
    fn mismatched_plot_type_is_skipped() {
        let mut cut = pt_cut();
        let event_plot = PlotRecorder::new("MET", |e: &Event| e.info("MET"));
        cut.add_plot_dyn(CutPosition::Pre, &event_plot);
        assert!(cut.plots(CutPosition::Pre).is_empty());

        let weight_plot = PlotRecorder::new("w2", |w: &f64| Ok(w * w));
        cut.add_plot_dyn(CutPosition::Pre, &weight_plot);
        let object_plot = PlotRecorder::new("eta", |p: &PhysicsObject| Ok(p.eta()));
        cut.add_plot_dyn(CutPosition::Post, &object_plot);
        assert_eq!(cut.plots(CutPosition::Pre).len(), 1);
        assert_eq!(cut.plots(CutPosition::Post).len(), 1);
    }

    #[test]
    fn copies_start_fresh() {
        let mut cut = pt_cut();
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        cut.apply(&jet(50.0), 1.0, &mut ctx).unwrap();
        let copy = cut.clone();
        assert!(copy.trees().is_none());
        assert_eq!(copy.ranges().len(), 1);
        assert_eq!(copy.name(), "pT");
    }

    #[test]
    fn operation_never_gates_the_pipeline() {
        let mut node: OperationNode<Event> =
            Operation::with_function("zero", |_: &mut Event| Ok(0.0)).into();
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        let mut ev = Event::new();
        assert!(node.apply(&mut ev, 1.0, &mut ctx).unwrap());
        assert!(!node.is_cut());
        assert!(node.trees().is_none());
    }

    #[test]
    fn operation_records_only_with_plots() {
        let mut op = Operation::with_function("flag", |e: &mut Event| e.info("flag"));
        op.add_plot(CutPosition::Post, PlotRecorder::new("MET", |e: &Event| e.info("MET")));
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);

        let mut yes = Event::new();
        yes.add_info("flag", 1.0).unwrap();
        yes.add_info("MET", 30.0).unwrap();
        let mut no = Event::new();
        no.add_info("flag", 0.0).unwrap();
        no.add_info("MET", 70.0).unwrap();

        assert!(op.apply(&mut yes, 1.0, &mut ctx).unwrap());
        assert!(!op.apply(&mut no, 1.0, &mut ctx).unwrap());
        let (pre, post) = op.trees().unwrap();
        assert_eq!(pre.entries(), 2);
        assert_eq!(post.column("MET").unwrap(), vec![30.0]);
    }

    #[test]
    fn define_decorates_the_entity() {
        let mut op = Operation::<Event>::define("HT", "HT", "j1pt + j2pt").unwrap();
        let mut ev = Event::new();
        ev.add_info("j1pt", 40.0).unwrap();
        ev.add_info("j2pt", 25.0).unwrap();
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        op.apply(&mut ev, 1.0, &mut ctx).unwrap();
        assert_eq!(ev.info("HT").unwrap(), 65.0);
        // Defining twice in one event is a duplicate.
        assert!(op.apply(&mut ev, 1.0, &mut ctx).is_err());
    }

    #[test]
    fn custom_variable_names_the_column() {
        let mut cut = pt_cut();
        cut.set_variable("jet_pt");
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, true);
        cut.apply(&jet(30.0), 1.0, &mut ctx).unwrap();
        assert!(ctx.cache().contains("jet_pt"));
        assert!(cut.trees().unwrap().0.column("jet_pt").is_some());
    }

    #[test]
    fn shared_variable_name_does_not_leak_decisions() {
        let mut pt = Cut::with_function("pT", |p: &PhysicsObject| Ok(p.pt()));
        pt.set_range(0.0, f64::INFINITY).unwrap();
        pt.set_variable("v");
        let mut eta = Cut::with_function("eta", |p: &PhysicsObject| Ok(p.eta().abs()));
        eta.set_range(50.0, 100.0).unwrap();
        eta.set_variable("v");

        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, true);
        let j = jet(60.0);
        assert!(pt.apply(&j, 1.0, &mut ctx).unwrap());
        assert!(!eta.apply(&j, 1.0, &mut ctx).unwrap());
        // First writer keeps the shared slot; each column holds its own value.
        assert!((ctx.cache().get("v").unwrap() - 60.0).abs() < 1e-9);
        assert_eq!(eta.trees().unwrap().0.column("v").unwrap(), vec![0.0]);
    }

    #[test]
    fn recorder_named_like_the_variable_shares_its_column() {
        let mut cut = pt_cut();
        let shadow = PlotRecorder::new("CutVariable", |_: &PhysicsObject| Ok(-1.0));
        cut.add_plot(CutPosition::Pre, shadow);
        let mut cache = ValueCache::new();
        let mut ctx = PassContext::new(&mut cache, false);
        cut.apply(&jet(30.0), 1.0, &mut ctx).unwrap();
        let (pre, _) = cut.trees().unwrap();
        assert_eq!(pre.branches(), ["weight", "CutVariable"]);
        assert_eq!(pre.column("CutVariable").unwrap(), vec![-1.0]);
    }
}
