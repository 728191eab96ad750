//! Handler system for postbus.
//!
//! Handlers are plain closures taking a reference to the event type they are
//! registered for. The return value decides whether the invocation counts as a
//! failure:
//!
//! ```rust,ignore
//! // Infallible handler
//! bus.subscribe(|order: &Order| println!("order {}", order.id));
//!
//! // Fallible handler, `Err` is forwarded to the exception reporter
//! bus.subscribe(|order: &Order| -> Result<(), std::io::Error> {
//!     audit_log(order)?;
//!     Ok(())
//! });
//! ```
//!
//! Internally every handler is erased to an [`ErasedHandler`] that receives a
//! `&dyn Event` and upcasts it to the registered type.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BoxError, HandlerError, HandlerResult};
use crate::event::{Event, EventType};

// ============================================================================
// HandlerOutcome - Handle handler return values
// ============================================================================

/// A trait for types a handler may return.
pub trait HandlerOutcome {
    /// Converts this value into the result of the invocation.
    fn into_result(self) -> HandlerResult;
}

/// `()` - the handler always succeeds.
impl HandlerOutcome for () {
    fn into_result(self) -> HandlerResult {
        Ok(())
    }
}

/// `Result<(), E>` - `Err` becomes [`HandlerError::Failed`].
impl<E: Into<BoxError>> HandlerOutcome for Result<(), E> {
    fn into_result(self) -> HandlerResult {
        self.map_err(|e| HandlerError::Failed(e.into()))
    }
}

// ============================================================================
// Erased handlers
// ============================================================================

/// Type-erased handler callback stored in the registry.
pub type ErasedHandler = Arc<dyn Fn(&dyn Event) -> HandlerResult + Send + Sync>;

/// Erases a handler registered for events of type `E`.
pub(crate) fn erase<E, F, R>(handler: F) -> ErasedHandler
where
    E: Event,
    F: Fn(&E) -> R + Send + Sync + 'static,
    R: HandlerOutcome,
{
    Arc::new(move |event: &dyn Event| {
        match event
            .upcast(TypeId::of::<E>())
            .and_then(|any| any.downcast_ref::<E>())
        {
            Some(typed) => handler(typed).into_result(),
            None => Err(HandlerError::TypeMismatch {
                expected: std::any::type_name::<E>(),
            }),
        }
    })
}

/// Erases a handler registered against the universal root type.
pub(crate) fn erase_any<F, R>(handler: F) -> ErasedHandler
where
    F: Fn(&dyn Event) -> R + Send + Sync + 'static,
    R: HandlerOutcome,
{
    Arc::new(move |event: &dyn Event| handler(event).into_result())
}

// ============================================================================
// Handler identity
// ============================================================================

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one subscription. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Descriptive information about a handler, handed to exception reporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerInfo {
    /// The subscription this handler belongs to.
    pub id: HandlerId,
    /// Type name of the handler callback.
    pub name: &'static str,
}

/// One registered handler.
pub(crate) struct HandlerRecord {
    pub(crate) info: HandlerInfo,
    pub(crate) event_type: EventType,
    pub(crate) callback: ErasedHandler,
}

impl HandlerRecord {
    pub(crate) fn new(event_type: EventType, name: &'static str, callback: ErasedHandler) -> Self {
        Self {
            info: HandlerInfo {
                id: HandlerId::next(),
                name,
            },
            event_type,
            callback,
        }
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .field("event_type", &self.event_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::{Order, SpecialOrder};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_erased_handler_upcasts_child() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let handler = erase(move |order: &Order| {
            seen_clone.store(order.id as usize, Ordering::SeqCst);
        });

        let event = SpecialOrder {
            order: Order { id: 9 },
        };
        assert!(handler(&event as &dyn Event).is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_erased_handler_reports_mismatch() {
        let handler = erase(|_: &SpecialOrder| {});
        let order = Order { id: 1 };
        let result = handler(&order as &dyn Event);
        assert!(matches!(result, Err(HandlerError::TypeMismatch { .. })));
    }

    #[test]
    fn test_result_outcome_maps_errors() {
        let handler = erase(|_: &Order| -> Result<(), std::io::Error> {
            Err(std::io::Error::other("disk full"))
        });
        let order = Order { id: 1 };
        match handler(&order as &dyn Event) {
            Err(HandlerError::Failed(e)) => assert_eq!(e.to_string(), "disk full"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_handler_ids_are_unique() {
        let a = HandlerId::next();
        let b = HandlerId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
