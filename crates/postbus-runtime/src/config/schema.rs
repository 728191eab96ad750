//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use postbus_core::{
    DelayExecutor, EventBus, EventBusBuilder, ExceptionReporter, SpawnExecutor,
};
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostbusConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings for the bus built from this configuration.
    #[serde(default)]
    pub bus: BusConfig,
}

impl PostbusConfig {
    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(ConfigError::validation(
                "logging.output = \"file\" requires logging.file_path",
            ));
        }
        self.bus.validate()
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase level name, as accepted by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the matching [`tracing::Level`].
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Appends to `logging.file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error).
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `postbus_core = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,
}

// =============================================================================
// Bus
// =============================================================================

/// How handler invocations run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Inline, on the posting thread.
    #[default]
    Sync,
    /// Through the configured executor.
    Deferred,
}

/// Executor used for deferred delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExecutorConfig {
    /// Spawn onto the ambient tokio runtime.
    #[default]
    Spawn,
    /// Run each invocation after a fixed delay.
    Delay {
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
    },
}

fn default_delay_ms() -> u64 {
    10
}

/// Bus configuration.
///
/// ```toml
/// [bus]
/// delivery = "deferred"
///
/// [bus.executor]
/// kind = "delay"
/// delay_ms = 25
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusConfig {
    #[serde(default)]
    pub delivery: DeliveryMode,

    /// Ignored for synchronous delivery.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl BusConfig {
    /// Rejects a zero delay, which would be spawn delivery under another name.
    pub fn validate(&self) -> ConfigResult<()> {
        if let ExecutorConfig::Delay { delay_ms: 0 } = self.executor {
            return Err(ConfigError::validation(
                "bus.executor.delay_ms must be positive, use kind = \"spawn\" for undelayed delivery",
            ));
        }
        Ok(())
    }

    /// Builds a bus reporting failures through the default logging reporter.
    pub fn build(&self) -> EventBus {
        self.apply(EventBus::builder()).build()
    }

    /// Builds a bus reporting failures through `reporter`.
    pub fn build_with_reporter(&self, reporter: impl ExceptionReporter + 'static) -> EventBus {
        self.apply(EventBus::builder().exception_reporter(reporter))
            .build()
    }

    fn apply(&self, builder: EventBusBuilder) -> EventBusBuilder {
        match (self.delivery, &self.executor) {
            (DeliveryMode::Sync, _) => builder,
            (DeliveryMode::Deferred, ExecutorConfig::Spawn) => builder.executor(SpawnExecutor::new()),
            (DeliveryMode::Deferred, ExecutorConfig::Delay { delay_ms }) => {
                builder.executor(DelayExecutor::new(Duration::from_millis(*delay_ms)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postbus_core::{ExceptionContext, HandlerError};

    #[test]
    fn test_defaults() {
        let config = PostbusConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.bus.delivery, DeliveryMode::Sync);
        assert_eq!(config.bus.executor, ExecutorConfig::Spawn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_respects_delivery_mode() {
        let sync = BusConfig::default();
        assert!(!sync.build().is_deferred());

        let deferred = BusConfig {
            delivery: DeliveryMode::Deferred,
            executor: ExecutorConfig::Delay { delay_ms: 5 },
        };
        assert!(deferred.build().is_deferred());
    }

    #[test]
    fn test_build_with_reporter() {
        let bus = BusConfig::default()
            .build_with_reporter(|_: &HandlerError, _: &ExceptionContext| {});
        assert!(!bus.is_deferred());
    }

    #[test]
    fn test_validation() {
        let bus = BusConfig {
            delivery: DeliveryMode::Deferred,
            executor: ExecutorConfig::Delay { delay_ms: 0 },
        };
        assert!(matches!(
            bus.validate(),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = PostbusConfig::default();
        config.logging.output = LogOutput::File;
        assert!(config.validate().is_err());
        config.logging.file_path = Some(PathBuf::from("postbus.log"));
        assert!(config.validate().is_ok());
    }
}
