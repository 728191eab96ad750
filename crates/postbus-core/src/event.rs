//! Event system for postbus.
//!
//! This module provides the core event infrastructure:
//!
//! - [`Event`] - Base trait for all events, including the ancestor-chain capability
//! - [`EventType`] - The nominal type used as a registry key
//! - [`BoxedEvent`] - Type-erased, cheaply clonable event container
//!
//! # Parent-in-child Hierarchies
//!
//! A child event embeds its parent as a field. The ancestor chain of an event
//! is therefore its own type followed by the chain of the embedded parent:
//!
//! ```text
//! SpecialOrder { priority, order: Order }  ──▶  Order { id, amount }
//! type_chain = [SpecialOrder, Order]
//! ```
//!
//! `#[derive(Event)]` from `postbus-macros` generates all of this. Hand-written
//! root events only need `event_name` and `as_any`:
//!
//! ```rust,ignore
//! use postbus_core::Event;
//! use std::any::Any;
//!
//! struct Widget;
//!
//! impl Event for Widget {
//!     fn event_name(&self) -> &'static str {
//!         "widget"
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Nominal Type
// ============================================================================

/// Marker behind [`EventType::any`]. Uninhabited, so no posted value can
/// ever have this type.
enum Universal {}

/// The runtime identity of an event type, used as the registry key.
///
/// Equality and hashing only consider the [`TypeId`]; the name is carried for
/// logging.
#[derive(Debug, Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// Returns the nominal type of `E`.
    pub fn of<E: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// The universal root type. Handlers registered against it receive every
    /// posted event.
    pub fn any() -> Self {
        Self {
            id: TypeId::of::<Universal>(),
            name: "*",
        }
    }

    /// Returns `true` for the universal root sentinel.
    pub fn is_any(&self) -> bool {
        self.id == TypeId::of::<Universal>()
    }

    /// Returns the underlying [`TypeId`].
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the full type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all events posted through an [`EventBus`].
///
/// Events are type-erased using `dyn Event`. Beyond downcasting via
/// [`as_any`](Event::as_any), every event exposes its ancestor chain through
/// [`type_chain`](Event::type_chain) and can be viewed as any of its
/// ancestors through [`upcast`](Event::upcast).
///
/// [`EventBus`]: crate::EventBus
pub trait Event: Any + Send + Sync {
    /// Returns the human-readable name of this event type.
    fn event_name(&self) -> &'static str;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns this event viewed as the type identified by `target`, if
    /// `target` is this event's type or one of its ancestors.
    ///
    /// Root events only match themselves. Child events check themselves and
    /// then delegate to their embedded parent.
    fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
        let this = self.as_any();
        (Any::type_id(this) == target).then_some(this)
    }

    /// Appends this event's own type followed by every ancestor type,
    /// most specific first.
    fn type_chain(&self, chain: &mut Vec<EventType>) {
        chain.push(EventType::of::<Self>());
    }
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A type-erased container for events that supports runtime downcasting.
///
/// `BoxedEvent` wraps any type implementing [`Event`] in an `Arc`, so the same
/// instance can be handed to every handler of a post (and moved into deferred
/// delivery tasks) without cloning the payload.
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    /// Creates a new `BoxedEvent` from any type implementing `Event`.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Returns the inner `Arc<dyn Event>`.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Returns the nominal type of the wrapped event.
    pub fn event_type(&self) -> EventType {
        let mut chain = Vec::with_capacity(1);
        self.inner.type_chain(&mut chain);
        chain.first().copied().unwrap_or_else(EventType::of::<dyn Event>)
    }

    /// Attempts to downcast to the concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }

    /// Attempts to view the event as `E`, which may be its own type or any
    /// ancestor in its chain.
    pub fn upcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner
            .upcast(TypeId::of::<E>())
            .and_then(|any| any.downcast_ref())
    }

    /// Returns `true` if both containers hold the same event instance.
    pub fn ptr_eq(&self, other: &BoxedEvent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::ops::Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl std::fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("event_name", &self.event_name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct Order {
        pub id: u32,
    }

    impl Event for Order {
        fn event_name(&self) -> &'static str {
            "order"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub(crate) struct SpecialOrder {
        pub order: Order,
    }

    impl Event for SpecialOrder {
        fn event_name(&self) -> &'static str {
            "order.special"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            if target == TypeId::of::<Self>() {
                return Some(self);
            }
            self.order.upcast(target)
        }

        fn type_chain(&self, chain: &mut Vec<EventType>) {
            chain.push(EventType::of::<Self>());
            self.order.type_chain(chain);
        }
    }

    #[test]
    fn test_event_type_identity() {
        assert_eq!(EventType::of::<Order>(), EventType::of::<Order>());
        assert_ne!(EventType::of::<Order>(), EventType::of::<SpecialOrder>());
        assert!(EventType::any().is_any());
        assert!(!EventType::of::<Order>().is_any());
    }

    #[test]
    fn test_type_chain_is_specific_first() {
        let event = SpecialOrder {
            order: Order { id: 7 },
        };
        let mut chain = Vec::new();
        event.type_chain(&mut chain);
        assert_eq!(
            chain,
            vec![EventType::of::<SpecialOrder>(), EventType::of::<Order>()]
        );
    }

    #[test]
    fn test_upcast_to_ancestor() {
        let boxed = BoxedEvent::new(SpecialOrder {
            order: Order { id: 7 },
        });

        assert_eq!(boxed.upcast_ref::<Order>().map(|o| o.id), Some(7));
        assert!(boxed.upcast_ref::<SpecialOrder>().is_some());
        assert!(boxed.downcast_ref::<Order>().is_none());
        assert_eq!(boxed.event_type(), EventType::of::<SpecialOrder>());
    }

    #[test]
    fn test_ptr_eq_tracks_instance() {
        let a = BoxedEvent::new(Order { id: 1 });
        let b = a.clone();
        let c = BoxedEvent::new(Order { id: 1 });
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
