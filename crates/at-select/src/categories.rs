//! Ordered category names with a one-way lock and the implicit "Nominal".

use regex::Regex;

use at_core::{Error, Result};

/// Name of the category injected into a selection that declared none.
pub const NOMINAL: &str = "Nominal";

/// Ordered set of unique category names.
///
/// Append-only until locked. [`finalize`](Self::finalize) is the only place
/// the default [`NOMINAL`] category is injected.
#[derive(Debug, Clone, Default)]
pub struct CategorySet {
    names: Vec<String>,
    locked: bool,
}

impl CategorySet {
    /// Empty, unlocked set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name`. Fails when locked or when `name` is already present.
    pub fn add(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.locked {
            return Err(Error::locked("categories", format!("add category '{name}'")));
        }
        if name.is_empty() {
            return Err(Error::Configuration("category name must not be empty".into()));
        }
        if self.contains(&name) {
            return Err(Error::duplicate("category", name));
        }
        self.names.push(name);
        Ok(())
    }

    /// Inject [`NOMINAL`] if no category was declared, then lock. Idempotent.
    pub fn finalize(&mut self) -> &[String] {
        if self.names.is_empty() {
            log::debug!("no categories declared, using '{NOMINAL}'");
            self.names.push(NOMINAL.to_string());
        }
        self.locked = true;
        &self.names
    }

    /// Declared names, without injecting the default.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Names fully matching the regular expression `pattern`. An empty
    /// pattern matches every category.
    pub fn matching(&self, pattern: &str) -> Result<Vec<String>> {
        if pattern.is_empty() {
            return Ok(self.names.clone());
        }
        let re = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| Error::Configuration(format!("bad category pattern '{pattern}': {e}")))?;
        Ok(self.names.iter().filter(|n| re.is_match(n)).cloned().collect())
    }

    /// Freeze the set. Idempotent.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Whether the set is frozen.
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Number of declared categories.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no category is declared.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_is_injected_once() {
        let mut c = CategorySet::new();
        assert_eq!(c.finalize(), ["Nominal"]);
        assert_eq!(c.finalize(), ["Nominal"]);
        assert!(c.locked());
        assert!(c.add("SR").is_err());
    }

    #[test]
    fn declared_categories_are_kept() {
        let mut c = CategorySet::new();
        c.add("SR").unwrap();
        c.add("CR").unwrap();
        assert!(matches!(c.add("SR"), Err(Error::Duplicate { .. })));
        assert_eq!(c.finalize(), ["SR", "CR"]);
    }

    #[test]
    fn lock_is_idempotent() {
        let mut once = CategorySet::new();
        once.lock();
        let mut twice = CategorySet::new();
        twice.lock();
        twice.lock();
        let a = once.add("SR").unwrap_err().to_string();
        let b = twice.add("SR").unwrap_err().to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn pattern_matching_is_anchored() {
        let mut c = CategorySet::new();
        for n in ["SR_ee", "SR_mm", "CR_ee", "SR"] {
            c.add(n).unwrap();
        }
        assert_eq!(c.matching("SR_.*").unwrap(), ["SR_ee", "SR_mm"]);
        assert_eq!(c.matching("SR").unwrap(), ["SR"]);
        assert_eq!(c.matching("").unwrap().len(), 4);
        assert!(c.matching("XX").unwrap().is_empty());
        assert!(c.matching("(").is_err());
    }
}
