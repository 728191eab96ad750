//! Exception reporting for failed handler invocations.
//!
//! Every handler failure (an `Err` return or a panic) is handed to the bus's
//! [`ExceptionReporter`] together with an [`ExceptionContext`]. The reporter
//! runs outside the panic guard: a reporter that panics is not caught and
//! unwinds out of the delivery step.
//!
//! ```rust,ignore
//! let bus = EventBus::builder()
//!     .exception_reporter(|err: &HandlerError, ctx: &ExceptionContext| {
//!         eprintln!("{} failed on {}: {err}", ctx.handler.name, ctx.event_type);
//!     })
//!     .build();
//! ```

use tracing::error;

use crate::dispatcher::EventBus;
use crate::error::HandlerError;
use crate::event::{BoxedEvent, EventType};
use crate::handler::HandlerInfo;

/// Everything known about a failed invocation.
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    /// The posted event.
    pub event: BoxedEvent,
    /// The resolved type under which the failing handler was registered.
    pub event_type: EventType,
    /// The failing handler.
    pub handler: HandlerInfo,
    /// The bus that delivered the event.
    pub event_bus: EventBus,
}

/// Sink for handler failures.
pub trait ExceptionReporter: Send + Sync {
    /// Reports one failed invocation.
    fn report(&self, error: &HandlerError, context: &ExceptionContext);
}

impl<F> ExceptionReporter for F
where
    F: Fn(&HandlerError, &ExceptionContext) + Send + Sync,
{
    fn report(&self, error: &HandlerError, context: &ExceptionContext) {
        self(error, context)
    }
}

/// The default reporter: logs every failure at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter;

impl ExceptionReporter for LoggingReporter {
    fn report(&self, err: &HandlerError, context: &ExceptionContext) {
        error!(
            event_name = context.event.event_name(),
            event_type = %context.event_type,
            handler = %context.handler.id,
            handler_name = context.handler.name,
            panicked = err.is_panic(),
            "Event handler failed: {err}"
        );
    }
}
