//! Named hierarchy nodes and their placement in an output sink.
//!
//! Every pipeline object (analysis, selection, cut, operation) owns a
//! [`Scope`]. Putting an object under a parent creates
//! `parent_dir[/postfix]/name` in the sink and then places the object's own
//! children under it. Placement is skipped while the parent has no
//! directory, so objects can be configured before an output exists and be
//! placed later.

use at_core::{Error, Result};
use at_store::{DirPath, OutputSink};

/// Name, placement and lock state of one hierarchy node.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    name: String,
    dir: Option<DirPath>,
    parent: Option<DirPath>,
    locked: bool,
    children: Vec<(String, String)>,
}

impl Scope {
    /// Unplaced, unlocked scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename; fails once locked.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        if self.locked {
            return Err(Error::locked(&self.name, "rename"));
        }
        self.name = name.into();
        Ok(())
    }

    /// Own directory, once placed.
    pub fn dir(&self) -> Option<&DirPath> {
        self.dir.as_ref()
    }

    /// Directory of the parent this node was placed under.
    pub fn parent_dir(&self) -> Option<&DirPath> {
        self.parent.as_ref()
    }

    /// Whether configuration is frozen.
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Freeze configuration. Idempotent.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Fail with [`Error::Locked`] if locked.
    pub fn ensure_unlocked(&self, action: &str) -> Result<()> {
        if self.locked {
            return Err(Error::locked(&self.name, action));
        }
        Ok(())
    }

    /// Register child `name` under sub-directory `postfix`. Idempotent.
    pub fn add_child(&mut self, name: &str, postfix: &str) {
        if !self.has_child(name, postfix) {
            self.children.push((name.to_string(), postfix.to_string()));
        }
    }

    /// Forget child `name` under `postfix`.
    pub fn pop_child(&mut self, name: &str, postfix: &str) {
        self.children.retain(|(n, p)| !(n == name && p == postfix));
    }

    /// Whether child `name` is registered under `postfix`.
    pub fn has_child(&self, name: &str, postfix: &str) -> bool {
        self.children.iter().any(|(n, p)| n == name && p == postfix)
    }

    /// Registered `(child, postfix)` pairs, in registration order.
    pub fn children(&self) -> &[(String, String)] {
        &self.children
    }

    /// Create `parent[/postfix]/name` in `out` and remember it.
    ///
    /// Returns `Ok(false)` without touching `out` when `parent` is `None`.
    pub fn place(
        &mut self,
        parent: Option<&DirPath>,
        postfix: &str,
        out: &mut dyn OutputSink,
    ) -> Result<bool> {
        if self.name.is_empty() {
            return Err(Error::Configuration("cannot place an unnamed object".into()));
        }
        let Some(parent) = parent else {
            return Ok(false);
        };
        let base = if postfix.is_empty() {
            parent.clone()
        } else {
            out.mkdir(Some(parent), postfix)?
        };
        let dir = out.mkdir(Some(&base), &self.name)?;
        self.parent = Some(parent.clone());
        self.dir = Some(dir);
        Ok(true)
    }

    /// Place at the top level of `out`.
    pub fn place_root(&mut self, out: &mut dyn OutputSink) -> Result<DirPath> {
        let dir = out.mkdir(None, &self.name)?;
        self.parent = None;
        self.dir = Some(dir.clone());
        Ok(dir)
    }
}

/// A pipeline object that owns a [`Scope`].
pub trait Localised {
    /// The node's scope.
    fn scope(&self) -> &Scope;

    /// Mutable access to the node's scope.
    fn scope_mut(&mut self) -> &mut Scope;

    /// Node name.
    fn name(&self) -> &str {
        self.scope().name()
    }

    /// Own directory, once placed.
    fn dir(&self) -> Option<&DirPath> {
        self.scope().dir()
    }

    /// Place every owned child under this node's directory.
    fn put_children(&mut self, _out: &mut dyn OutputSink) -> Result<()> {
        Ok(())
    }

    /// Lock every owned child.
    fn lock_children(&mut self) {}

    /// Place this node under `parent[/postfix]`, then its children under it.
    fn put(
        &mut self,
        parent: Option<&DirPath>,
        postfix: &str,
        out: &mut dyn OutputSink,
    ) -> Result<bool> {
        if !self.scope_mut().place(parent, postfix, out)? {
            return Ok(false);
        }
        self.put_children(out)?;
        Ok(true)
    }

    /// Lock this node and, recursively, its children.
    fn lock_all(&mut self) {
        self.scope_mut().lock();
        self.lock_children();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_store::MemoryStore;

    #[test]
    fn place_without_parent_is_deferred() {
        let mut out = MemoryStore::new();
        let mut s = Scope::new("Jets");
        assert!(!s.place(None, "Nominal", &mut out).unwrap());
        assert!(s.dir().is_none());
        assert_eq!(out.dirs().count(), 0);
    }

    #[test]
    fn place_with_postfix() {
        let mut out = MemoryStore::new();
        let root = out.mkdir(None, "Analysis").unwrap();
        let mut s = Scope::new("pT");
        assert!(s.place(Some(&root), "Nominal", &mut out).unwrap());
        assert_eq!(s.dir().unwrap().to_string(), "Analysis/Nominal/pT");
        assert_eq!(s.parent_dir(), Some(&root));

        // Placing again is harmless.
        assert!(s.place(Some(&root), "Nominal", &mut out).unwrap());
        assert_eq!(out.dirs().count(), 3);
    }

    #[test]
    fn children_are_registered_once() {
        let mut s = Scope::new("Sel");
        s.add_child("pT", "SR");
        s.add_child("pT", "SR");
        s.add_child("pT", "CR");
        assert_eq!(s.children().len(), 2);
        s.pop_child("pT", "SR");
        assert!(!s.has_child("pT", "SR"));
    }

    #[test]
    fn lock_blocks_rename() {
        let mut s = Scope::new("Sel");
        s.lock();
        s.lock();
        assert!(matches!(s.set_name("Other"), Err(Error::Locked { .. })));
        assert!(s.ensure_unlocked("add cut").is_err());
    }

    #[test]
    fn unnamed_scope_cannot_be_placed() {
        let mut out = MemoryStore::new();
        let root = out.mkdir(None, "A").unwrap();
        assert!(Scope::new("").place(Some(&root), "", &mut out).is_err());
    }
}
