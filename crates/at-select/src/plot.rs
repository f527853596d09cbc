//! Plot recorders: named value functions recorded at a node.

use std::fmt;
use std::sync::Arc;

use at_core::{CompiledExpr, Result, Variables};

use crate::cache::PassContext;

/// Shared, fallible value function over `T`.
pub type ValueFn<T> = Arc<dyn Fn(&T) -> Result<f64> + Send + Sync>;

/// Shared, fallible function that may modify `T`.
pub type MutFn<T> = Arc<dyn Fn(&mut T) -> Result<f64> + Send + Sync>;

/// Where a recorder fires relative to a node's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CutPosition {
    /// Before the decision, for every entity.
    Pre,
    /// After the decision, only for passing entities.
    Post,
}

/// A named value function. The name doubles as the cache key.
pub struct PlotRecorder<T> {
    name: String,
    function: ValueFn<T>,
}

impl<T> Clone for PlotRecorder<T> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), function: Arc::clone(&self.function) }
    }
}

impl<T> fmt::Debug for PlotRecorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlotRecorder").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<T> PlotRecorder<T> {
    /// Recorder `name` evaluating `function`.
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&T) -> Result<f64> + Send + Sync + 'static,
    {
        Self { name: name.into(), function: Arc::new(function) }
    }

    /// Recorder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate directly, bypassing any cache.
    pub fn evaluate(&self, obj: &T) -> Result<f64> {
        (self.function)(obj)
    }

    /// Evaluate through `ctx`: a value already cached under this name is
    /// reused.
    pub fn value(&self, obj: &T, ctx: &mut PassContext<'_>) -> Result<f64> {
        ctx.value(&self.name, obj, |o| (self.function)(o))
    }
}

impl<T: Variables + 'static> PlotRecorder<T> {
    /// Recorder evaluating the expression `expr`.
    pub fn from_expr(name: impl Into<String>, expr: &str) -> Result<Self> {
        let compiled = CompiledExpr::compile(expr)?;
        Ok(Self::new(name, move |obj: &T| compiled.eval(obj)))
    }
}

/// A recorder attached to a node over `T`: either over the entity itself or
/// over the event weight.
pub enum Recorder<T> {
    /// Evaluated on the entity.
    Entity(PlotRecorder<T>),
    /// Evaluated on the event weight.
    Weight(PlotRecorder<f64>),
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        match self {
            Recorder::Entity(p) => Recorder::Entity(p.clone()),
            Recorder::Weight(p) => Recorder::Weight(p.clone()),
        }
    }
}

impl<T> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recorder::Entity(p) => f.debug_tuple("Entity").field(p).finish(),
            Recorder::Weight(p) => f.debug_tuple("Weight").field(p).finish(),
        }
    }
}

impl<T> Recorder<T> {
    /// Recorder name.
    pub fn name(&self) -> &str {
        match self {
            Recorder::Entity(p) => p.name(),
            Recorder::Weight(p) => p.name(),
        }
    }

    /// Value for `obj` at event weight `weight`.
    pub fn record(&self, obj: &T, weight: f64, ctx: &mut PassContext<'_>) -> Result<f64> {
        match self {
            Recorder::Entity(p) => p.value(obj, ctx),
            Recorder::Weight(p) => p.evaluate(&weight),
        }
    }
}
