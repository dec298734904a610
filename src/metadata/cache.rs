//! Row id caches owned by a [`crate::metadata::module::ModuleView`].
//!
//! Two shapes exist:
//!
//! - [`RowCache`]: one unconditional entry per rid. Used by member tables and simple tables.
//! - [`ContextCache`]: separate "no context" and "with context" tiers for tables whose rows can
//!   mention open generic parameters. Each slot moves through [`Slot`] states, which is also how
//!   recursive resolution of the same rid is cut short.

use std::{
    hash::Hash,
    sync::Arc,
    thread::{self, ThreadId},
};

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::metadata::context::GenericContext;

/// A rid indexed cache with get-or-create semantics.
///
/// Two racing creators of the same rid both construct a value, but only the first insert wins
/// and both callers observe the same instance.
pub struct RowCache<T> {
    entries: SkipMap<u32, Arc<T>>,
}

impl<T: Send + Sync + 'static> Default for RowCache<T> {
    fn default() -> Self {
        RowCache {
            entries: SkipMap::new(),
        }
    }
}

impl<T: Send + Sync + 'static> RowCache<T> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `rid` without creating it
    pub fn get(&self, rid: u32) -> Option<Arc<T>> {
        self.entries.get(&rid).map(|entry| entry.value().clone())
    }

    /// Look up `rid`, creating it with `create` on a miss. `None` from `create` leaves the slot
    /// empty so a later call can retry.
    pub fn get_or_create<F>(&self, rid: u32, create: F) -> Option<Arc<T>>
    where
        F: FnOnce() -> Option<Arc<T>>,
    {
        if let Some(entry) = self.entries.get(&rid) {
            return Some(entry.value().clone());
        }

        let value = create()?;
        Some(self.entries.get_or_insert(rid, value).value().clone())
    }

    /// Look up `rid`, creating it with `create` on a miss
    pub fn get_or_insert_with<F>(&self, rid: u32, create: F) -> Arc<T>
    where
        F: FnOnce() -> Arc<T>,
    {
        if let Some(entry) = self.entries.get(&rid) {
            return entry.value().clone();
        }

        self.entries.get_or_insert(rid, create()).value().clone()
    }

    /// `true` if `rid` is cached
    pub fn contains(&self, rid: u32) -> bool {
        self.entries.contains_key(&rid)
    }

    /// Insert a value, replacing any previous one
    pub fn insert(&self, rid: u32, value: Arc<T>) {
        self.entries.insert(rid, value);
    }

    /// Evict one rid
    pub fn remove(&self, rid: u32) -> Option<Arc<T>> {
        self.entries.remove(&rid).map(|entry| entry.value().clone())
    }

    /// Evict everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all cached values in rid order
    pub fn values(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// State of one entry of a [`ContextCache`].
pub enum Slot<T> {
    /// Never looked up, or the last lookup found nothing
    Unresolved,
    /// Under construction by these threads; a lookup of the same key on one of them must not
    /// recurse
    InProgress(Vec<ThreadId>),
    /// Constructed and stable
    Resolved(Arc<T>),
    /// Constructed, but the value still mentioned an open generic parameter and was handed out
    /// without being kept
    ResolvedButUncacheable,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Unresolved => Slot::Unresolved,
            Slot::InProgress(builders) => Slot::InProgress(builders.clone()),
            Slot::Resolved(value) => Slot::Resolved(value.clone()),
            Slot::ResolvedButUncacheable => Slot::ResolvedButUncacheable,
        }
    }
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Unresolved => write!(f, "Unresolved"),
            Slot::InProgress(builders) => write!(f, "InProgress({})", builders.len()),
            Slot::Resolved(_) => write!(f, "Resolved"),
            Slot::ResolvedButUncacheable => write!(f, "ResolvedButUncacheable"),
        }
    }
}

/// Two-tier cache for context-sensitive tables.
///
/// Lookups with an empty [`GenericContext`] use the no-context tier keyed by rid, all others
/// use the context tier keyed by `(rid, context)`. In both tiers a value is only kept if the
/// `cacheable` predicate passed to [`ContextCache::resolve`] accepts it.
///
/// The reserve-then-discard protocol: before a value is constructed the calling thread is
/// recorded in the slot's [`Slot::InProgress`] list. A nested lookup of the same key on that
/// thread yields `None` instead of recursing; other threads construct their own value and the
/// first one kept wins. The last builder settles the slot to `Resolved`,
/// `ResolvedButUncacheable`, or back to `Unresolved` if nothing was found.
pub struct ContextCache<T> {
    no_context: DashMap<u32, Slot<T>>,
    with_context: DashMap<(u32, GenericContext), Slot<T>>,
}

impl<T> Default for ContextCache<T> {
    fn default() -> Self {
        ContextCache {
            no_context: DashMap::new(),
            with_context: DashMap::new(),
        }
    }
}

impl<T> ContextCache<T> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `rid` under `context`.
    ///
    /// `construct` builds a fresh value (or finds nothing); `cacheable` decides whether the
    /// built value may be kept.
    pub fn resolve<C, P>(
        &self,
        rid: u32,
        context: &GenericContext,
        construct: C,
        cacheable: P,
    ) -> Option<Arc<T>>
    where
        C: FnOnce() -> Option<Arc<T>>,
        P: FnOnce(&T) -> bool,
    {
        if context.is_empty() {
            resolve_in(&self.no_context, rid, construct, cacheable)
        } else {
            resolve_in(&self.with_context, (rid, context.clone()), construct, cacheable)
        }
    }

    /// Current state of a slot, mostly useful for diagnostics
    pub fn slot(&self, rid: u32, context: &GenericContext) -> Slot<T> {
        let slot = if context.is_empty() {
            self.no_context.get(&rid).map(|slot| slot.clone())
        } else {
            self.with_context
                .get(&(rid, context.clone()))
                .map(|slot| slot.clone())
        };

        slot.unwrap_or(Slot::Unresolved)
    }

    /// Number of values held in either tier
    pub fn cached_count(&self) -> usize {
        let count = |slot: &Slot<T>| matches!(slot, Slot::Resolved(_));
        self.no_context.iter().filter(|e| count(e.value())).count()
            + self.with_context.iter().filter(|e| count(e.value())).count()
    }

    /// Drop every slot of both tiers
    pub fn clear(&self) {
        self.no_context.clear();
        self.with_context.clear();
    }
}

fn resolve_in<K, T, C, P>(
    map: &DashMap<K, Slot<T>>,
    key: K,
    construct: C,
    cacheable: P,
) -> Option<Arc<T>>
where
    K: Eq + Hash + Clone,
    C: FnOnce() -> Option<Arc<T>>,
    P: FnOnce(&T) -> bool,
{
    let current = thread::current().id();

    // The shard guard must be released before construct() runs, it may resolve other keys
    match map.entry(key.clone()) {
        Entry::Occupied(mut entry) => match entry.get_mut() {
            Slot::Resolved(value) => return Some(value.clone()),
            Slot::InProgress(builders) => {
                if builders.contains(&current) {
                    return None;
                }
                builders.push(current);
            }
            slot => *slot = Slot::InProgress(vec![current]),
        },
        Entry::Vacant(entry) => {
            entry.insert(Slot::InProgress(vec![current]));
        }
    }

    let built = construct();
    let keep = built.as_deref().is_some_and(cacheable);

    match map.entry(key) {
        Entry::Occupied(mut entry) => {
            let slot = entry.get_mut();
            if let Slot::Resolved(existing) = slot {
                return Some(existing.clone());
            }

            let others_building = match slot {
                Slot::InProgress(builders) => {
                    builders.retain(|builder| *builder != current);
                    !builders.is_empty()
                }
                _ => false,
            };

            match built {
                Some(value) if keep => {
                    *slot = Slot::Resolved(value.clone());
                    Some(value)
                }
                Some(value) => {
                    if !others_building {
                        *slot = Slot::ResolvedButUncacheable;
                    }
                    Some(value)
                }
                None => {
                    if !others_building {
                        *slot = Slot::Unresolved;
                    }
                    None
                }
            }
        }
        // The cache was cleared while the value was being built
        Entry::Vacant(entry) => match built {
            Some(value) if keep => {
                entry.insert(Slot::Resolved(value.clone()));
                Some(value)
            }
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };

    use super::*;
    use crate::metadata::signatures::TypeSignature;

    #[test]
    fn row_cache_is_stable() {
        let cache = RowCache::<String>::new();
        let first = cache.get_or_create(1, || Some(Arc::new("a".to_string()))).unwrap();
        let second = cache.get_or_create(1, || Some(Arc::new("b".to_string()))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        assert!(cache.get_or_create(2, || None).is_none());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn context_cache_keeps_cacheable_values() {
        let cache = ContextCache::<u32>::new();
        let empty = GenericContext::empty();

        let first = cache.resolve(1, &empty, || Some(Arc::new(7)), |_| true).unwrap();
        let second = cache.resolve(1, &empty, || Some(Arc::new(8)), |_| true).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(cache.slot(1, &empty), Slot::Resolved(_)));
    }

    #[test]
    fn context_cache_discards_uncacheable_values() {
        let cache = ContextCache::<u32>::new();
        let empty = GenericContext::empty();
        let built = AtomicUsize::new(0);

        let construct = || {
            built.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(1))
        };
        let first = cache.resolve(1, &empty, construct, |_| false).unwrap();
        let second = cache.resolve(1, &empty, construct, |_| false).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(matches!(cache.slot(1, &empty), Slot::ResolvedButUncacheable));
        assert_eq!(cache.cached_count(), 0);
    }

    #[test]
    fn context_cache_tiers_are_separate() {
        let cache = ContextCache::<u32>::new();
        let empty = GenericContext::empty();
        let context = GenericContext::for_type(vec![TypeSignature::I4]);

        let plain = cache.resolve(1, &empty, || Some(Arc::new(1)), |_| true).unwrap();
        let with_context = cache.resolve(1, &context, || Some(Arc::new(2)), |_| true).unwrap();
        assert!(!Arc::ptr_eq(&plain, &with_context));
        assert_eq!(*with_context, 2);
        assert_eq!(cache.cached_count(), 2);
    }

    #[test]
    fn context_cache_breaks_recursion() {
        let cache = ContextCache::<u32>::new();
        let empty = GenericContext::empty();

        let outer = cache.resolve(
            1,
            &empty,
            || {
                let inner = cache.resolve(1, &empty, || Some(Arc::new(99)), |_| true);
                assert!(inner.is_none());
                Some(Arc::new(1))
            },
            |_| true,
        );
        assert_eq!(outer.as_deref(), Some(&1));
    }

    #[test]
    fn context_cache_serves_other_threads_during_construction() {
        let cache = ContextCache::<u32>::new();
        let empty = GenericContext::empty();
        let (cache, empty) = (&cache, &empty);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        thread::scope(|scope| {
            let builder = scope.spawn(move || {
                cache.resolve(
                    7,
                    empty,
                    || {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Some(Arc::new(7))
                    },
                    |_| true,
                )
            });

            started_rx.recv().unwrap();
            assert!(matches!(cache.slot(7, empty), Slot::InProgress(_)));

            let concurrent = cache.resolve(7, empty, || Some(Arc::new(7)), |_| true).unwrap();
            assert_eq!(*concurrent, 7);

            release_tx.send(()).unwrap();
            let built = builder.join().unwrap().unwrap();
            assert!(Arc::ptr_eq(&built, &concurrent));
        });

        assert!(matches!(cache.slot(7, empty), Slot::Resolved(_)));
        assert_eq!(cache.cached_count(), 1);
    }

    #[test]
    fn context_cache_not_found_is_retried() {
        let cache = ContextCache::<u32>::new();
        let empty = GenericContext::empty();

        assert!(cache.resolve(3, &empty, || None, |_| true).is_none());
        assert!(matches!(cache.slot(3, &empty), Slot::Unresolved));
        assert!(cache.resolve(3, &empty, || Some(Arc::new(3)), |_| true).is_some());
    }
}
