//! Postbus Runtime - configuration and logging for the postbus event bus.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `PostbusConfig`)
//! - Building buses from configuration (`BusConfig::build`)
//! - Logging configuration (`LoggingBuilder`, `init_from_config`)
//!
//! ```ignore
//! use postbus_runtime::{config::load_config, logging};
//!
//! fn main() -> Result<(), postbus_runtime::ConfigError> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let bus = config.bus.build();
//!     bus.subscribe(|order: &Order| tracing::info!(id = order.id, "Order placed"));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;

// Re-exports
pub use config::{
    BusConfig, ConfigError, ConfigLoader, ConfigResult, DeliveryMode, ExecutorConfig,
    LoggingConfig, PostbusConfig, load_config, load_config_from_file,
};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
