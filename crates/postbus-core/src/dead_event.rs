//! Dead events: posts that reached no handler.

use std::any::Any;

use crate::dispatcher::EventBus;
use crate::event::{BoxedEvent, Event};

/// Reason attached to dead events generated by the bus itself.
pub const NO_SUBSCRIBERS: &str = "no subscribers";

/// Wraps an event that was posted but matched zero handlers.
///
/// The bus posts one `DeadEvent` per undeliverable post. Dead events are never
/// wrapped again: an undeliverable `DeadEvent` is silently dropped.
///
/// ```rust,ignore
/// bus.subscribe(|dead: &DeadEvent| {
///     warn!(event = dead.event().event_name(), "Nobody listened");
/// });
/// ```
#[derive(Debug, Clone)]
pub struct DeadEvent {
    source: EventBus,
    event: BoxedEvent,
    reason: Option<String>,
}

impl DeadEvent {
    /// Creates a dead event for `event`, originally posted on `source`.
    pub fn new(source: EventBus, event: BoxedEvent) -> Self {
        Self {
            source,
            event,
            reason: None,
        }
    }

    /// Attaches a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The bus the original event was posted on.
    pub fn source(&self) -> &EventBus {
        &self.source
    }

    /// The undelivered event.
    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    /// Why the event was not delivered, if known.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl Event for DeadEvent {
    fn event_name(&self) -> &'static str {
        "dead_event"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
