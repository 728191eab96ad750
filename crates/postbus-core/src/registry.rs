//! Handler registry and subscriptions.
//!
//! The registry maps each [`EventType`] to the handlers registered for it, in
//! insertion order. A type's entry exists only while it has at least one
//! handler.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::event::EventType;
use crate::handler::{HandlerId, HandlerRecord};

/// Mapping from nominal type to its ordered handler set.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<EventType, Vec<Arc<HandlerRecord>>>,
}

impl Registry {
    /// Appends a record under its type.
    pub(crate) fn insert(&mut self, record: HandlerRecord) -> HandlerId {
        let id = record.info.id;
        self.entries
            .entry(record.event_type)
            .or_default()
            .push(Arc::new(record));
        id
    }

    /// Removes exactly one record, dropping the type's entry once it is empty.
    pub(crate) fn remove(&mut self, event_type: &EventType, id: HandlerId) -> bool {
        let Some(handlers) = self.entries.get_mut(event_type) else {
            return false;
        };
        let Some(pos) = handlers.iter().position(|r| r.info.id == id) else {
            return false;
        };
        handlers.remove(pos);
        if handlers.is_empty() {
            self.entries.remove(event_type);
        }
        true
    }

    /// Removes every record for a type, returning how many there were.
    pub(crate) fn remove_all(&mut self, event_type: &EventType) -> usize {
        self.entries.remove(event_type).map_or(0, |h| h.len())
    }

    pub(crate) fn count(&self, event_type: &EventType) -> usize {
        self.entries.get(event_type).map_or(0, Vec::len)
    }

    pub(crate) fn contains(&self, event_type: &EventType) -> bool {
        self.entries.contains_key(event_type)
    }

    pub(crate) fn active_types(&self) -> Vec<EventType> {
        self.entries.keys().copied().collect()
    }

    /// Returns the handlers registered for `event_type` at this moment.
    pub(crate) fn handlers(&self, event_type: &EventType) -> &[Arc<HandlerRecord>] {
        self.entries.get(event_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Empties the registry, returning the total number of removed records.
    pub(crate) fn clear(&mut self) -> usize {
        let total = self.entries.values().map(Vec::len).sum();
        self.entries.clear();
        total
    }
}

/// Shared handle on a bus registry.
pub(crate) type SharedRegistry = Arc<RwLock<Registry>>;

/// A live registration returned by `subscribe`.
///
/// The subscription only holds a weak reference to its bus's registry, so it
/// never keeps a bus alive. Dropping it does **not** unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<RwLock<Registry>>,
    event_type: EventType,
    id: HandlerId,
}

impl Subscription {
    pub(crate) fn new(registry: &SharedRegistry, event_type: EventType, id: HandlerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            event_type,
            id,
        }
    }

    /// Removes this subscription's handler.
    ///
    /// Returns `true` if this call removed it. Calling it again, after
    /// `clear`/`unsubscribe_all`, or after the bus was dropped is a no-op that
    /// returns `false`.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.write().remove(&self.event_type, self.id);
        if removed {
            debug!(event_type = %self.event_type, handler = %self.id, "Unsubscribed handler");
        }
        removed
    }

    /// Returns `true` while the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .read()
                .handlers(&self.event_type)
                .iter()
                .any(|r| r.info.id == self.id)
        })
    }

    /// Returns the handler's identity.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the type this subscription was registered for.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::{Order, SpecialOrder};
    use crate::handler::erase;

    fn record<E: crate::Event>() -> HandlerRecord {
        HandlerRecord::new(EventType::of::<E>(), "test", erase(|_: &E| {}))
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut registry = Registry::default();
        let a = registry.insert(record::<Order>());
        let b = registry.insert(record::<Order>());

        let ids: Vec<_> = registry
            .handlers(&EventType::of::<Order>())
            .iter()
            .map(|r| r.info.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_empty_entries_are_removed() {
        let mut registry = Registry::default();
        let ty = EventType::of::<Order>();
        let id = registry.insert(record::<Order>());

        assert!(registry.remove(&ty, id));
        assert!(!registry.contains(&ty));
        assert!(registry.active_types().is_empty());
        assert!(!registry.remove(&ty, id));
    }

    #[test]
    fn test_remove_all_and_clear_counts() {
        let mut registry = Registry::default();
        registry.insert(record::<Order>());
        registry.insert(record::<Order>());
        registry.insert(record::<SpecialOrder>());

        assert_eq!(registry.remove_all(&EventType::of::<Order>()), 2);
        assert_eq!(registry.remove_all(&EventType::of::<Order>()), 0);
        assert_eq!(registry.count(&EventType::of::<SpecialOrder>()), 1);
        assert_eq!(registry.clear(), 1);
        assert_eq!(registry.clear(), 0);
    }

    #[test]
    fn test_subscription_unsubscribe_is_idempotent() {
        let registry: SharedRegistry = Arc::default();
        let ty = EventType::of::<Order>();
        let id = registry.write().insert(record::<Order>());
        let sub = Subscription::new(&registry, ty, id);

        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
    }

    #[test]
    fn test_subscription_outlives_registry() {
        let registry: SharedRegistry = Arc::default();
        let id = registry.write().insert(record::<Order>());
        let sub = Subscription::new(&registry, EventType::of::<Order>(), id);

        drop(registry);
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
    }
}
