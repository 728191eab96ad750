//! Configuration for postbus applications.
//!
//! Settings are loaded with figment from defaults, an optional config file,
//! and `POSTBUS_*` environment variables. See [`loader`] for the order.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BusConfig, DeliveryMode, ExecutorConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    PostbusConfig, SpanEventConfig,
};
