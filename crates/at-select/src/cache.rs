//! Per-pass memo of named derived values.

use std::collections::HashMap;

use at_core::{Error, Result};

/// Key under which every node stores its own cut value. Never reused across
/// nodes: each [`ValueCache::add`] with this key re-evaluates.
pub const CUT_VARIABLE: &str = "CutVariable";

/// Name of the per-node weight recorder.
pub const WEIGHT: &str = "weight";

/// Evaluation counters of a [`ValueCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of times a value function actually ran.
    pub evaluations: u64,
    /// Number of requests answered from the cache.
    pub hits: u64,
}

/// Name-keyed cache; first writer wins except for [`CUT_VARIABLE`].
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    values: HashMap<String, f64>,
    stats: CacheStats,
}

impl ValueCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value stored under `key`, evaluating `f(obj)` and storing
    /// it first if `key` is new this pass or is [`CUT_VARIABLE`].
    pub fn add<T: ?Sized, F>(&mut self, key: &str, obj: &T, f: F) -> Result<f64>
    where
        F: FnOnce(&T) -> Result<f64>,
    {
        if key != CUT_VARIABLE
            && let Some(&v) = self.values.get(key)
        {
            self.stats.hits += 1;
            return Ok(v);
        }
        let v = f(obj)?;
        self.stats.evaluations += 1;
        self.values.insert(key.to_string(), v);
        Ok(v)
    }

    /// Value stored under `key`; fails if nothing was added this pass.
    pub fn get(&self, key: &str) -> Result<f64> {
        self.values.get(key).copied().ok_or_else(|| Error::missing("cached value", key))
    }

    /// Whether `key` was added this pass.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Forget all values. Counters are kept.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Evaluation counters since construction.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Add the counters of a short-lived cache to these.
    pub(crate) fn absorb_stats(&mut self, other: &ValueCache) {
        self.stats.evaluations += other.stats.evaluations;
        self.stats.hits += other.stats.hits;
    }
}

/// What a node needs from its selection during one pass: the cache and
/// whether to use it.
#[derive(Debug)]
pub struct PassContext<'a> {
    cache: &'a mut ValueCache,
    caching: bool,
}

impl<'a> PassContext<'a> {
    /// Wrap `cache`; with `caching == false` every lookup evaluates directly.
    pub fn new(cache: &'a mut ValueCache, caching: bool) -> Self {
        Self { cache, caching }
    }

    /// Whether values are shared through the cache.
    pub fn caching(&self) -> bool {
        self.caching
    }

    /// Evaluate `f(obj)`, going through the cache under `key` when caching.
    pub fn value<T: ?Sized, F>(&mut self, key: &str, obj: &T, f: F) -> Result<f64>
    where
        F: FnOnce(&T) -> Result<f64>,
    {
        if self.caching { self.cache.add(key, obj, f) } else { f(obj) }
    }

    /// Offer an already computed `value` under `key`. Only stored when
    /// caching, and only if nothing claimed `key` earlier this pass.
    pub fn share(&mut self, key: &str, value: f64) -> Result<()> {
        if self.caching {
            self.cache.add(key, &value, |v| Ok(*v))?;
        }
        Ok(())
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ValueCache {
        &*self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_writer_wins() {
        let mut c = ValueCache::new();
        assert_eq!(c.add("X", &1.0, |x: &f64| Ok(*x)).unwrap(), 1.0);
        assert_eq!(c.add("X", &2.0, |x: &f64| Ok(*x)).unwrap(), 1.0);
        assert_eq!(c.get("X").unwrap(), 1.0);
        assert_eq!(c.stats(), CacheStats { evaluations: 1, hits: 1 });
    }

    #[test]
    fn cut_variable_always_reevaluates() {
        let mut c = ValueCache::new();
        c.add(CUT_VARIABLE, &1.0, |x: &f64| Ok(*x)).unwrap();
        assert_eq!(c.add(CUT_VARIABLE, &2.0, |x: &f64| Ok(*x)).unwrap(), 2.0);
        assert_eq!(c.get(CUT_VARIABLE).unwrap(), 2.0);
        assert_eq!(c.stats().evaluations, 2);
    }

    #[test]
    fn get_before_add_fails() {
        let mut c = ValueCache::new();
        assert!(matches!(c.get("Y"), Err(Error::Missing { .. })));
        c.add("Y", &3.0, |x: &f64| Ok(*x)).unwrap();
        c.clear();
        assert!(!c.contains("Y"));
    }

    #[test]
    fn disabled_context_bypasses_cache() {
        let mut c = ValueCache::new();
        let mut ctx = PassContext::new(&mut c, false);
        ctx.value("X", &1.0, |x: &f64| Ok(*x)).unwrap();
        assert_eq!(ctx.value("X", &5.0, |x: &f64| Ok(*x)).unwrap(), 5.0);
        assert!(!ctx.cache().contains("X"));
    }

    #[test]
    fn errors_are_not_cached() {
        let mut c = ValueCache::new();
        assert!(c.add("Z", &0.0, |_: &f64| Err(Error::missing("event info", "Z"))).is_err());
        assert!(!c.contains("Z"));
    }
}
