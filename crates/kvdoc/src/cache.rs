//! Per-class identity cache.
//!
//! The cache owns the canonical instance of every live document; everyone
//! else holds cheap `Rc` handles. An instance is live while it is cached.
//! [`IdentityCache::sweep`] drops instances no handle outside the cache
//! refers to any more.
//!
//! With a sweep threshold set, [`IdentityCache::sweep_if_due`] sweeps once
//! the cache has grown to the threshold, then waits until it has doubled
//! from what survived.

use std::collections::HashMap;
use std::rc::Rc;

use kvdoc_types::Key;
use tracing::debug;

use crate::error::{OdmError, OdmResult};

pub struct IdentityCache<T> {
    classes: HashMap<String, HashMap<Key, Rc<T>>>,
    /// 0 disables automatic sweeps.
    sweep_threshold: usize,
    next_sweep: usize,
}

impl<T> Default for IdentityCache<T> {
    fn default() -> Self {
        Self::with_sweep_threshold(0)
    }
}

impl<T> IdentityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        Self {
            classes: HashMap::new(),
            sweep_threshold,
            next_sweep: sweep_threshold,
        }
    }

    pub fn get(&self, class: &str, key: &Key) -> Option<Rc<T>> {
        self.classes.get(class)?.get(key).cloned()
    }

    /// Register the canonical instance for `key`. Fails if one is live.
    pub fn put(&mut self, class: &str, key: Key, instance: Rc<T>) -> OdmResult<()> {
        let entries = self.classes.entry(class.to_string()).or_default();
        if entries.contains_key(&key) {
            return Err(OdmError::DuplicateKey {
                class: class.to_string(),
                key,
            });
        }
        entries.insert(key, instance);
        Ok(())
    }

    pub fn remove(&mut self, class: &str, key: &Key) -> Option<Rc<T>> {
        self.classes.get_mut(class)?.remove(key)
    }

    /// Remove `key` only if the cached instance is `instance` itself.
    pub fn remove_instance(&mut self, class: &str, key: &Key, instance: &Rc<T>) -> bool {
        let Some(entries) = self.classes.get_mut(class) else {
            return false;
        };
        match entries.get(key) {
            Some(cached) if Rc::ptr_eq(cached, instance) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, class: &str, key: &Key) -> bool {
        self.classes
            .get(class)
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Live instances of `class`.
    pub fn len(&self, class: &str) -> usize {
        self.classes.get(class).map_or(0, HashMap::len)
    }

    pub fn total(&self) -> usize {
        self.classes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Drop every instance only the cache still refers to. Returns how many
    /// were dropped.
    pub fn sweep(&mut self) -> usize {
        self.sweep_retaining(|_| false)
    }

    /// Sweep if the cache has reached its next sweep point, keeping
    /// unreferenced instances for which `keep` holds.
    pub fn sweep_if_due(&mut self, keep: impl Fn(&T) -> bool) -> usize {
        if self.sweep_threshold == 0 {
            return 0;
        }
        let total = self.total();
        if total < self.next_sweep {
            return 0;
        }
        let dropped = self.sweep_retaining(keep);
        self.next_sweep = self.sweep_threshold.max((total - dropped) * 2);
        debug!(total, dropped, next_sweep = self.next_sweep, "automatic identity cache sweep");
        dropped
    }

    fn sweep_retaining(&mut self, keep: impl Fn(&T) -> bool) -> usize {
        let mut dropped = 0;
        for (class, entries) in &mut self.classes {
            let before = entries.len();
            entries.retain(|_, instance| Rc::strong_count(instance) > 1 || keep(instance));
            let swept = before - entries.len();
            if swept > 0 {
                debug!(class = %class, swept, "swept identity cache");
            }
            dropped += swept;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Key {
        Key::new(k).unwrap()
    }

    #[test]
    fn put_get_remove() {
        let mut cache = IdentityCache::new();
        let a = Rc::new("a".to_string());
        cache.put("User", key("1"), a.clone()).unwrap();

        let got = cache.get("User", &key("1")).unwrap();
        assert!(Rc::ptr_eq(&got, &a));
        assert!(cache.contains("User", &key("1")));
        assert!(!cache.contains("Page", &key("1")));
        assert_eq!(cache.len("User"), 1);

        assert!(cache.remove("User", &key("1")).is_some());
        assert!(cache.get("User", &key("1")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn second_live_instance_is_rejected() {
        let mut cache = IdentityCache::new();
        cache.put("User", key("1"), Rc::new(1)).unwrap();
        let err = cache.put("User", key("1"), Rc::new(2)).unwrap_err();
        assert!(matches!(err, OdmError::DuplicateKey { .. }));
        // same key in another class is a different document
        cache.put("Page", key("1"), Rc::new(3)).unwrap();
        assert_eq!(cache.total(), 2);
    }

    #[test]
    fn remove_instance_checks_identity() {
        let mut cache = IdentityCache::new();
        let live = Rc::new(1);
        let stale = Rc::new(1);
        cache.put("T", key("k"), live.clone()).unwrap();
        assert!(!cache.remove_instance("T", &key("k"), &stale));
        assert!(cache.remove_instance("T", &key("k"), &live));
        assert!(!cache.contains("T", &key("k")));
    }

    #[test]
    fn sweep_drops_unreferenced_instances() {
        let mut cache = IdentityCache::new();
        let held = Rc::new("held");
        cache.put("T", key("held"), held.clone()).unwrap();
        cache.put("T", key("loose"), Rc::new("loose")).unwrap();

        assert_eq!(cache.sweep(), 1);
        assert!(cache.contains("T", &key("held")));
        assert!(!cache.contains("T", &key("loose")));

        drop(held);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_if_due_waits_for_threshold_then_doubles() {
        let mut cache = IdentityCache::with_sweep_threshold(4);
        let held: Vec<Rc<usize>> = (0..2).map(Rc::new).collect();
        for (i, h) in held.iter().enumerate() {
            cache.put("T", key(&format!("held{i}")), h.clone()).unwrap();
        }
        cache.put("T", key("loose0"), Rc::new(10)).unwrap();
        assert_eq!(cache.sweep_if_due(|_| false), 0);

        cache.put("T", key("loose1"), Rc::new(11)).unwrap();
        assert_eq!(cache.sweep_if_due(|_| false), 2);
        assert_eq!(cache.total(), 2);

        // next sweep at twice the two survivors
        cache.put("T", key("loose2"), Rc::new(12)).unwrap();
        assert_eq!(cache.sweep_if_due(|_| false), 0);
        cache.put("T", key("loose3"), Rc::new(13)).unwrap();
        assert_eq!(cache.sweep_if_due(|_| false), 2);
    }

    #[test]
    fn sweep_if_due_keeps_what_the_predicate_holds() {
        let mut cache = IdentityCache::with_sweep_threshold(2);
        cache.put("T", key("keep"), Rc::new(1)).unwrap();
        cache.put("T", key("drop"), Rc::new(2)).unwrap();
        assert_eq!(cache.sweep_if_due(|v| *v == 1), 1);
        assert!(cache.contains("T", &key("keep")));
        assert!(!cache.contains("T", &key("drop")));
    }

    #[test]
    fn zero_threshold_never_sweeps() {
        let mut cache = IdentityCache::new();
        for i in 0..64 {
            cache.put("T", key(&format!("k{i}")), Rc::new(i)).unwrap();
            assert_eq!(cache.sweep_if_due(|_| false), 0);
        }
        assert_eq!(cache.total(), 64);
    }
}
