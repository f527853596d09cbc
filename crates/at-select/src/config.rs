//! Declarative pipeline configuration (YAML or JSON).
//!
//! ```yaml
//! name: ZJets
//! selections:
//!   - kind: object_definition
//!     name: Jets
//!     input: { columns: [jet_pt, jet_eta, jet_phi, jet_m], mode: PtEtaPhiM }
//!     info: [{ name: btag, source: jet_btag }]
//!     nodes:
//!       - { type: cut, name: pT, expr: pt, ranges: [{ min: 20 }] }
//!   - kind: event_selection
//!     name: Event
//!     categories: [SR, CR]
//!     collections: [{ name: Jets, selection: Jets }]
//!     nodes:
//!       - { type: cut, name: NJets, expr: Jets.n, ranges: [{ min: 2 }], categories: SR }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use at_core::{
    CompiledExpr, Decorate, Error, Grl, KinematicsMode, Range, Result, Variables, VectorSource,
};

use crate::analysis::Analysis;
use crate::categories::NOMINAL;
use crate::event_selection::EventSelection;
use crate::object_definition::ObjectDefinition;
use crate::operation::{Cut, Operation};
use crate::plot::{CutPosition, PlotRecorder};
use crate::selection::Pipeline;

/// A whole analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analysis name; also the top-level output directory.
    pub name: String,
    /// Selections in run order.
    #[serde(default)]
    pub selections: Vec<SelectionConfig>,
    /// Optional analysis-level output tree.
    #[serde(default)]
    pub tree: Option<TreeConfig>,
    /// Directory relative paths (good-run lists) are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Analysis-level output tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Tree name.
    pub name: String,
    /// Branch names, in row order.
    pub branches: Vec<String>,
}

/// One selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionConfig {
    /// Filters an input object collection.
    ObjectDefinition(ObjectDefinitionConfig),
    /// Gates the event.
    EventSelection(EventSelectionConfig),
}

impl SelectionConfig {
    /// Selection name.
    pub fn name(&self) -> &str {
        match self {
            SelectionConfig::ObjectDefinition(c) => &c.common.name,
            SelectionConfig::EventSelection(c) => &c.common.name,
        }
    }

    fn common(&self) -> &CommonConfig {
        match self {
            SelectionConfig::ObjectDefinition(c) => &c.common,
            SelectionConfig::EventSelection(c) => &c.common,
        }
    }
}

/// Settings shared by both selection kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    /// Selection name.
    pub name: String,
    /// Categories; none means `Nominal` only.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Share values between nodes through the cache.
    #[serde(default)]
    pub caching: bool,
    /// Whether a failure stops the analysis for this event.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Pipeline nodes in order.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

fn default_true() -> bool {
    true
}

/// Object definition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDefinitionConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub common: CommonConfig,
    /// Input four-vectors.
    pub input: InputConfig,
    /// Per-object info columns.
    #[serde(default)]
    pub info: Vec<InfoConfig>,
}

/// Event selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSelectionConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub common: CommonConfig,
    /// Collections taken from earlier object definitions.
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
    /// Collections read straight from the input.
    #[serde(default)]
    pub input_collections: Vec<InputCollectionConfig>,
    /// Event info scalars.
    #[serde(default)]
    pub info: Vec<InfoConfig>,
    /// Good-run list file.
    #[serde(default)]
    pub grl: Option<PathBuf>,
}

/// Where four-vectors come from: either `vectors` or `columns` + `mode`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// Named four-vector list.
    #[serde(default)]
    pub vectors: Option<String>,
    /// Four parallel columns.
    #[serde(default)]
    pub columns: Option<[String; 4]>,
    /// Column encoding; defaults to `PtEtaPhiM`.
    #[serde(default)]
    pub mode: Option<KinematicsMode>,
}

impl InputConfig {
    fn source(&self) -> Result<VectorSource> {
        match (&self.vectors, &self.columns) {
            (Some(v), None) => Ok(VectorSource::Vectors(v.clone())),
            (None, Some(cols)) => Ok(VectorSource::Columns {
                mode: self.mode.unwrap_or(KinematicsMode::PtEtaPhiM),
                columns: cols.clone(),
            }),
            _ => Err(Error::Validation("input needs exactly one of 'vectors' or 'columns'".into())),
        }
    }
}

/// A named value read from the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoConfig {
    /// Info name on the entity.
    pub name: String,
    /// Input scalar or column name.
    pub source: String,
}

/// Collection taken from an earlier object definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name inside the event.
    pub name: String,
    /// Upstream selection.
    pub selection: String,
    /// Upstream category.
    #[serde(default = "default_category")]
    pub category: String,
    /// Own categories to bind in (regex, empty for all).
    #[serde(default)]
    pub categories: String,
}

fn default_category() -> String {
    NOMINAL.to_string()
}

/// Collection read straight from the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputCollectionConfig {
    /// Collection name inside the event.
    pub name: String,
    /// Where the four-vectors come from.
    #[serde(flatten)]
    pub input: InputConfig,
}

/// Closed interval; `value` alone gives a single point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RangeConfig {
    /// Lower limit, unbounded if absent.
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper limit, unbounded if absent.
    #[serde(default)]
    pub max: Option<f64>,
    /// Exact value.
    #[serde(default)]
    pub value: Option<f64>,
}

impl RangeConfig {
    /// The range described.
    pub fn to_range(&self) -> Result<Range> {
        match (self.value, self.min, self.max) {
            (Some(v), None, None) => Range::point(v),
            (Some(_), _, _) => Err(Error::Validation("range has both 'value' and limits".into())),
            (None, min, max) => {
                Range::new(min.unwrap_or(f64::NEG_INFINITY), max.unwrap_or(f64::INFINITY))
            }
        }
    }
}

/// Where a plot records relative to its cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotPosition {
    /// Every entity the node sees.
    Pre,
    /// Entities that pass.
    #[default]
    Post,
}

impl From<PlotPosition> for CutPosition {
    fn from(p: PlotPosition) -> Self {
        match p {
            PlotPosition::Pre => CutPosition::Pre,
            PlotPosition::Post => CutPosition::Post,
        }
    }
}

/// Expression plot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Recorder name.
    pub name: String,
    /// Value expression.
    pub expr: String,
    /// Pre- or post-cut.
    #[serde(default)]
    pub position: PlotPosition,
}

/// One pipeline node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    /// A cut on an expression value.
    Cut {
        /// Node name.
        name: String,
        /// Value expression.
        expr: String,
        /// Accepted ranges; none means "expression is non-zero".
        #[serde(default)]
        ranges: Vec<RangeConfig>,
        /// Cache key for the cut value.
        #[serde(default)]
        variable: Option<String>,
        /// Category pattern; empty for all.
        #[serde(default)]
        categories: String,
        /// Recorders.
        #[serde(default)]
        plots: Vec<PlotConfig>,
    },
    /// Store an expression value on the entity as info `variable`.
    Define {
        /// Node name.
        name: String,
        /// Info name to write.
        variable: String,
        /// Value expression.
        expr: String,
        /// Category pattern; empty for all.
        #[serde(default)]
        categories: String,
        /// Recorders.
        #[serde(default)]
        plots: Vec<PlotConfig>,
    },
}

impl NodeConfig {
    /// Node name.
    pub fn name(&self) -> &str {
        match self {
            NodeConfig::Cut { name, .. } | NodeConfig::Define { name, .. } => name,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name().is_empty() {
            return Err(Error::Configuration("node name must not be empty".into()));
        }
        let (expr, plots) = match self {
            NodeConfig::Cut { expr, ranges, plots, .. } => {
                for r in ranges {
                    r.to_range()?;
                }
                (expr, plots)
            }
            NodeConfig::Define { expr, plots, variable, .. } => {
                if variable.is_empty() {
                    return Err(Error::Configuration(format!(
                        "define '{}' needs a variable name",
                        self.name()
                    )));
                }
                (expr, plots)
            }
        };
        CompiledExpr::compile(expr)?;
        for p in plots {
            CompiledExpr::compile(&p.expr)?;
        }
        Ok(())
    }

    fn add_to<P>(&self, sel: &mut P) -> Result<()>
    where
        P: Pipeline,
        P::Entity: Variables + Decorate,
    {
        match self {
            NodeConfig::Cut { name, expr, ranges, variable, categories, plots } => {
                let mut cut = Cut::from_expr(name.as_str(), expr)?;
                for r in ranges {
                    let r = r.to_range()?;
                    cut.add_range(r.lower(), r.upper())?;
                }
                if let Some(v) = variable {
                    cut.set_variable(v.as_str());
                }
                for p in plots {
                    cut.add_plot(p.position.into(), PlotRecorder::from_expr(p.name.as_str(), &p.expr)?);
                }
                sel.add_cut_to(cut, categories)
            }
            NodeConfig::Define { name, variable, expr, categories, plots } => {
                let mut op = Operation::define(name.as_str(), variable, expr)?;
                for p in plots {
                    op.add_plot(p.position.into(), PlotRecorder::from_expr(p.name.as_str(), &p.expr)?);
                }
                sel.add_operation_to(op, categories)
            }
        }
    }
}

fn yaml_err(e: serde_yaml_ng::Error) -> Error {
    Error::Yaml(e.to_string())
}

impl AnalysisConfig {
    /// Parse YAML (or JSON) text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text).map_err(yaml_err)
    }

    /// Read and parse a YAML or JSON file. Relative paths inside it resolve
    /// against the file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut cfg: Self = serde_yaml_ng::from_slice(&bytes).map_err(yaml_err)?;
        cfg.base_dir = path.parent().map(Path::to_path_buf);
        log::debug!("read analysis config '{}' from {}", cfg.name, path.display());
        Ok(cfg)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(yaml_err)
    }

    /// Check names, ranges and expressions without building anything.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Configuration("analysis name must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for sel in &self.selections {
            let common = sel.common();
            if common.name.is_empty() {
                return Err(Error::Configuration("selection name must not be empty".into()));
            }
            if !seen.insert(common.name.as_str()) {
                return Err(Error::duplicate("selection", common.name.as_str()));
            }
            let mut cats = HashSet::new();
            for c in &common.categories {
                if c.is_empty() || !cats.insert(c.as_str()) {
                    return Err(Error::Configuration(format!(
                        "'{}': bad or repeated category '{c}'",
                        common.name
                    )));
                }
            }
            for node in &common.nodes {
                node.validate()?;
            }
            match sel {
                SelectionConfig::ObjectDefinition(c) => {
                    c.input.source()?;
                }
                SelectionConfig::EventSelection(c) => {
                    for coll in &c.collections {
                        if !seen.contains(coll.selection.as_str()) {
                            log::warn!(
                                "'{}': collection '{}' refers to '{}', which does not run before it",
                                common.name,
                                coll.name,
                                coll.selection
                            );
                        }
                    }
                    for input in &c.input_collections {
                        input.input.source()?;
                    }
                }
            }
        }
        if let Some(tree) = &self.tree
            && tree.branches.is_empty()
        {
            return Err(Error::Configuration(format!("tree '{}' has no branches", tree.name)));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Validate, then build a ready-to-run [`Analysis`].
    pub fn build(&self) -> Result<Analysis> {
        self.validate()?;
        let mut analysis = Analysis::new(self.name.as_str());
        for sel in &self.selections {
            match sel {
                SelectionConfig::ObjectDefinition(c) => {
                    let mut od = ObjectDefinition::new(c.common.name.as_str())
                        .with_input(c.input.source()?);
                    setup_common(&mut od, &c.common, |od| {
                        for i in &c.info {
                            od.add_info(i.name.as_str(), i.source.as_str())?;
                        }
                        Ok(())
                    })?;
                    analysis.add_selection(od)?;
                }
                SelectionConfig::EventSelection(c) => {
                    let mut es = EventSelection::new(c.common.name.as_str());
                    setup_common(&mut es, &c.common, |es| {
                        for i in &c.info {
                            es.add_info(i.name.as_str(), i.source.as_str())?;
                        }
                        for coll in &c.collections {
                            es.add_collection_to(
                                &coll.name,
                                &coll.selection,
                                &coll.category,
                                &coll.categories,
                            )?;
                        }
                        for input in &c.input_collections {
                            es.add_input_collection(&input.name, input.input.source()?)?;
                        }
                        if let Some(path) = &c.grl {
                            es.set_grl(Grl::load(self.resolve(path))?);
                        }
                        Ok(())
                    })?;
                    analysis.add_selection(es)?;
                }
            }
        }
        if let Some(tree) = &self.tree {
            let branches: Vec<&str> = tree.branches.iter().map(String::as_str).collect();
            analysis.add_tree(&tree.name, &branches)?;
        }
        Ok(analysis)
    }
}

/// Categories, bindings (via `bind`), then nodes: bindings see exactly the
/// declared categories.
fn setup_common<P, F>(sel: &mut P, common: &CommonConfig, bind: F) -> Result<()>
where
    P: Pipeline,
    P::Entity: Variables + Decorate,
    F: FnOnce(&mut P) -> Result<()>,
{
    for c in &common.categories {
        sel.add_category(c)?;
    }
    sel.set_caching(common.caching);
    sel.set_required(common.required);
    bind(sel)?;
    for node in &common.nodes {
        node.add_to(sel)?;
    }
    Ok(())
}
