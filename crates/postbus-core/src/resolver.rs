//! Type resolution with per-type caching.
//!
//! The resolved chain of an event depends only on its runtime type, so the
//! cache is keyed by the concrete [`TypeId`] of the posted value rather than by
//! the instance. Entries therefore never keep an event alive.
//!
//! The canonical entry always holds the chain without the universal root.
//! When the root is requested, it is appended to a fresh copy:
//!
//! ```text
//! resolve(SpecialOrder, false) ─▶ [SpecialOrder, Order]          (cached)
//! resolve(SpecialOrder, true)  ─▶ [SpecialOrder, Order, *]       (derived, not cached)
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::event::{Event, EventType};

/// Resolves events to their ordered list of nominal types.
#[derive(Default)]
pub struct TypeResolver {
    cache: Mutex<HashMap<TypeId, Arc<[EventType]>>>,
}

impl TypeResolver {
    /// Creates a resolver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the event's own type followed by its ancestors, most specific
    /// first, with the universal root appended when `include_any` is set.
    pub fn resolve(&self, event: &dyn Event, include_any: bool) -> Arc<[EventType]> {
        let key = Any::type_id(event.as_any());

        let canonical = {
            let mut cache = self.cache.lock();
            match cache.get(&key) {
                Some(chain) => Arc::clone(chain),
                None => {
                    let chain = Self::walk(event);
                    trace!(event_name = event.event_name(), depth = chain.len(), "Resolved type chain");
                    cache.insert(key, Arc::clone(&chain));
                    chain
                }
            }
        };

        if include_any && !canonical.iter().any(EventType::is_any) {
            let mut derived = Vec::with_capacity(canonical.len() + 1);
            derived.extend_from_slice(&canonical);
            derived.push(EventType::any());
            derived.into()
        } else {
            canonical
        }
    }

    /// Walks the ancestor chain, dropping repeated entries so no handler set
    /// is visited twice.
    fn walk(event: &dyn Event) -> Arc<[EventType]> {
        let mut chain = Vec::new();
        event.type_chain(&mut chain);

        let mut resolved: Vec<EventType> = Vec::with_capacity(chain.len());
        for ty in chain {
            if !ty.is_any() && !resolved.contains(&ty) {
                resolved.push(ty);
            }
        }
        resolved.into()
    }

    /// Discards every cached chain.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Returns the number of cached chains.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl std::fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeResolver")
            .field("cached", &self.cached_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::{Order, SpecialOrder};

    fn special() -> SpecialOrder {
        SpecialOrder {
            order: Order { id: 1 },
        }
    }

    #[test]
    fn test_resolve_without_root() {
        let resolver = TypeResolver::new();
        let chain = resolver.resolve(&special(), false);
        assert_eq!(
            &chain[..],
            &[EventType::of::<SpecialOrder>(), EventType::of::<Order>()]
        );
    }

    #[test]
    fn test_root_is_appended_last() {
        let resolver = TypeResolver::new();
        let chain = resolver.resolve(&Order { id: 1 }, true);
        assert_eq!(&chain[..], &[EventType::of::<Order>(), EventType::any()]);
    }

    #[test]
    fn test_derived_root_variant_is_not_cached() {
        let resolver = TypeResolver::new();
        let first = resolver.resolve(&special(), true);
        assert_eq!(first.len(), 3);

        let second = resolver.resolve(&special(), false);
        assert_eq!(second.len(), 2);
        assert!(!second.iter().any(EventType::is_any));

        let third = resolver.resolve(&special(), true);
        assert_eq!(third.last(), Some(&EventType::any()));
        assert_eq!(third.len(), 3);
    }

    #[test]
    fn test_cache_is_shared_across_instances_of_a_type() {
        let resolver = TypeResolver::new();
        let a = resolver.resolve(&Order { id: 1 }, false);
        let b = resolver.resolve(&Order { id: 2 }, false);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(resolver.cached_len(), 1);
    }

    #[test]
    fn test_clear_cache() {
        let resolver = TypeResolver::new();
        resolver.resolve(&Order { id: 1 }, false);
        resolver.resolve(&special(), false);
        assert_eq!(resolver.cached_len(), 2);

        resolver.clear_cache();
        assert_eq!(resolver.cached_len(), 0);
    }
}
