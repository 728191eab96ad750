//! # Postbus Core
//!
//! The dispatch engine of the postbus in-process event bus.
//!
//! Handlers are registered against an event's nominal type and receive every
//! post of that type *and of every type derived from it*. This crate provides:
//!
//! - **Event System**: Type-erased events with an explicit ancestor chain ([`Event`], [`BoxedEvent`], [`EventType`])
//! - **Type Resolution**: Cached, specific-to-general type chains ([`TypeResolver`])
//! - **Registry**: Insertion-ordered handler sets with idempotent [`Subscription`]s
//! - **Dispatch**: Synchronous ([`EventBus`]) and executor-driven ([`DeferredEventBus`]) delivery
//! - **Failure Isolation**: Per-handler error and panic capture ([`ExceptionReporter`])
//! - **Dead Events**: Undelivered posts resurface as [`DeadEvent`]s
//!
//! ## Flow
//!
//! ```text
//! post(event)
//!    │
//!    ▼
//! ┌──────────────┐    ┌──────────┐    ┌───────────┐    ┌──────────────┐
//! │ TypeResolver │───▶│ Registry │───▶│  Handler  │───▶│   Reporter   │
//! │  (chain)     │    │(snapshot)│    │(inline or │    │ (on failure) │
//! └──────────────┘    └──────────┘    │ executor) │    └──────────────┘
//!                          │          └───────────┘
//!                          └── empty ──▶ post(DeadEvent)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use postbus_core::{EventBus, DeadEvent};
//!
//! let bus = EventBus::new();
//!
//! bus.subscribe(|order: &Order| println!("order {}", order.id));
//! bus.subscribe(|dead: &DeadEvent| println!("unhandled: {}", dead.event().event_name()));
//!
//! assert_eq!(bus.post(SpecialOrder::new(1, 5)), 1);
//! assert_eq!(bus.post(Widget), 0); // reaches the DeadEvent handler
//! ```

pub mod dead_event;
pub mod deferred;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;
pub mod reporter;
pub mod resolver;

pub use dead_event::{DeadEvent, NO_SUBSCRIBERS};
pub use deferred::{
    DeferredEventBus, DeferredEventBusBuilder, DelayExecutor, Executor, ManualExecutor,
    SpawnExecutor, Task, WORKER_THREAD_NAME,
};
pub use dispatcher::{EventBus, EventBusBuilder};
pub use error::{BoxError, HandlerError, HandlerResult};
pub use event::{BoxedEvent, Event, EventType};
pub use handler::{ErasedHandler, HandlerId, HandlerInfo, HandlerOutcome};
pub use registry::Subscription;
pub use reporter::{ExceptionContext, ExceptionReporter, LoggingReporter};
pub use resolver::TypeResolver;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BoxedEvent, DeadEvent, DeferredEventBus, Event, EventBus, EventType, ExceptionContext,
        HandlerError, Subscription,
    };
}
