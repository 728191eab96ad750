//! # Postbus
//!
//! An in-process publish/subscribe event bus with hierarchical event types.
//!
//! ## Overview
//!
//! Handlers subscribe to an event *type*. Posting an event delivers it to the
//! handlers of its own type and of every ancestor type, most specific first.
//! Events nobody listens to come back as [`DeadEvent`]s, and a failing
//! handler never stops its siblings from running.
//!
//! ```text
//! ┌───────────┐     ┌──────────┐     ┌─────────────────────────────┐
//! │  post(e)  │────▶│ EventBus │────▶│ handlers of SpecialOrder    │
//! └───────────┘     │          │────▶│ handlers of Order           │
//!                   │          │────▶│ catch-all handlers          │
//!                   └──────────┘     └─────────────────────────────┘
//!                        │ no handlers
//!                        └──────────▶ post(DeadEvent(e))
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use postbus::prelude::*;
//!
//! #[derive(Debug, Event)]
//! struct Order {
//!     id: u32,
//! }
//!
//! #[derive(Debug, Event)]
//! struct SpecialOrder {
//!     #[event(parent)]
//!     order: Order,
//!     priority: u8,
//! }
//!
//! let bus = EventBus::new();
//! bus.subscribe(|order: &Order| println!("order {}", order.id));
//! bus.subscribe(|dead: &DeadEvent| println!("unhandled {}", dead.event().event_name()));
//!
//! let special = SpecialOrder { order: Order { id: 7 }, priority: 1 };
//! assert_eq!(bus.post(special), 1);
//! ```
//!
//! ## Features
//!
//! - `macros`: Enable the `Event` derive macro (default)
//! - `toml-config`: Load `postbus.toml` configuration files (default)
//! - `yaml-config`: Load `postbus.yaml` configuration files
//! - `json-log`: JSON log output

pub use postbus_core as core;
pub use postbus_runtime as runtime;

pub use postbus_core::{
    BoxError, BoxedEvent, DeadEvent, DeferredEventBus, DeferredEventBusBuilder, DelayExecutor,
    ErasedHandler, Event, EventBus, EventBusBuilder, EventType, ExceptionContext,
    ExceptionReporter, Executor, HandlerError, HandlerId, HandlerInfo, HandlerOutcome,
    HandlerResult, LoggingReporter, ManualExecutor, NO_SUBSCRIBERS, SpawnExecutor, Subscription,
    Task, TypeResolver, WORKER_THREAD_NAME,
};
#[cfg(feature = "macros")]
pub use postbus_macros::Event;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use postbus::prelude::*;
/// ```
pub mod prelude {
    // Buses
    pub use postbus_core::{DeferredEventBus, EventBus, Subscription};

    // Events
    pub use postbus_core::{BoxedEvent, DeadEvent, Event, EventType};
    #[cfg(feature = "macros")]
    pub use postbus_macros::Event;

    // Failure reporting
    pub use postbus_core::{ExceptionContext, HandlerError};

    // Executors
    pub use postbus_core::{DelayExecutor, ManualExecutor, SpawnExecutor};

    // Configuration
    pub use postbus_runtime::{PostbusConfig, load_config};
}
