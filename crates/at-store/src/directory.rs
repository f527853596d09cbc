//! Hierarchical output: directories holding histograms and ntuples.
//!
//! Selections and their nodes create one directory each and write their
//! histograms and ntuples into it. [`OutputSink`] is the seam; [`MemoryStore`]
//! keeps everything in memory and can dump it as JSON.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use at_core::{Error, Result};

use crate::histogram::Histogram;
use crate::ntuple::Ntuple;

/// Absolute path of a directory in an output sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DirPath(Vec<String>);

impl DirPath {
    /// The root directory.
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of child `name` of `self`.
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Parse a `/`-separated path; empty segments are skipped.
    pub fn parse(path: &str) -> Self {
        Self(path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect())
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Destination for histograms and ntuples.
pub trait OutputSink {
    /// Create directory `name` under `parent` (or at top level) and return its
    /// path. Creating an existing directory returns the existing path.
    fn mkdir(&mut self, parent: Option<&DirPath>, name: &str) -> Result<DirPath>;

    /// Whether `dir` exists.
    fn has_dir(&self, dir: &DirPath) -> bool;

    /// Store `hist` in `dir`, replacing any histogram with the same name.
    fn write_histogram(&mut self, dir: &DirPath, hist: &Histogram) -> Result<()>;

    /// Store `tree` in `dir`, replacing any ntuple with the same name.
    fn write_ntuple(&mut self, dir: &DirPath, tree: &Ntuple) -> Result<()>;

    /// Upcast for recovering the concrete sink.
    fn as_any(&self) -> &dyn Any;
}

/// Contents of one directory in a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirContents {
    /// Histograms by name.
    pub histograms: BTreeMap<String, Histogram>,
    /// Ntuples by name.
    pub ntuples: BTreeMap<String, Ntuple>,
}

/// In-memory [`OutputSink`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    dirs: BTreeMap<DirPath, DirContents>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All directory paths, sorted.
    pub fn dirs(&self) -> impl Iterator<Item = &DirPath> {
        self.dirs.keys()
    }

    /// Contents of `dir`.
    pub fn contents(&self, dir: &DirPath) -> Option<&DirContents> {
        self.dirs.get(dir)
    }

    /// Histogram `name` in the `/`-separated directory `path`.
    pub fn histogram(&self, path: &str, name: &str) -> Option<&Histogram> {
        self.dirs.get(&DirPath::parse(path))?.histograms.get(name)
    }

    /// Ntuple `name` in the `/`-separated directory `path`.
    pub fn ntuple(&self, path: &str, name: &str) -> Option<&Ntuple> {
        self.dirs.get(&DirPath::parse(path))?.ntuples.get(name)
    }

    /// Serialize the whole store, keyed by `/`-separated path.
    pub fn to_json(&self) -> Result<String> {
        let flat: BTreeMap<String, &DirContents> =
            self.dirs.iter().map(|(k, v)| (k.to_string(), v)).collect();
        Ok(serde_json::to_string_pretty(&flat)?)
    }

    /// Write [`to_json`](Self::to_json) to `path`.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("wrote {} directories to {}", self.dirs.len(), path.as_ref().display());
        Ok(())
    }

    fn dir_mut(&mut self, dir: &DirPath) -> Result<&mut DirContents> {
        self.dirs.get_mut(dir).ok_or_else(|| Error::missing("directory", dir.to_string()))
    }
}

impl OutputSink for MemoryStore {
    fn mkdir(&mut self, parent: Option<&DirPath>, name: &str) -> Result<DirPath> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::Validation(format!("invalid directory name '{name}'")));
        }
        let path = match parent {
            Some(p) if !self.dirs.contains_key(p) => {
                return Err(Error::missing("directory", p.to_string()));
            }
            Some(p) => p.join(name),
            None => DirPath::root().join(name),
        };
        self.dirs.entry(path.clone()).or_default();
        Ok(path)
    }

    fn has_dir(&self, dir: &DirPath) -> bool {
        self.dirs.contains_key(dir)
    }

    fn write_histogram(&mut self, dir: &DirPath, hist: &Histogram) -> Result<()> {
        self.dir_mut(dir)?.histograms.insert(hist.name.clone(), hist.clone());
        Ok(())
    }

    fn write_ntuple(&mut self, dir: &DirPath, tree: &Ntuple) -> Result<()> {
        self.dir_mut(dir)?.ntuples.insert(tree.name.clone(), tree.clone());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
