//! Error types for the postbus core.

use std::any::Any;

use thiserror::Error;

/// Boxed error returned by fallible handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a single handler invocation.
///
/// These never reach the caller of `post`; they are handed to the bus's
/// [`ExceptionReporter`](crate::ExceptionReporter).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler was invoked with an event outside its type's hierarchy.
    #[error("handler expected '{expected}' but the event does not upcast to it")]
    TypeMismatch {
        /// Type name the handler was registered for.
        expected: &'static str,
    },
}

impl HandlerError {
    /// Builds a [`HandlerError::Panicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }

    /// Returns `true` if the handler panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

/// Result type for handler invocations.
pub type HandlerResult = Result<(), HandlerError>;
