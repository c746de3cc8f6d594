//! Logging setup for contextual-beans
//!
//! Every event the crate emits uses the `contextual_beans` target:
//! registration, context activation and destruction at `DEBUG`, resolution
//! cache hits and misses at `TRACE`, swallowed destruction failures at `WARN`.
//!
//! # Features
//!
//! - `logging` - Emit tracing events (default)
//! - `logging-json` - Install a JSON subscriber (production)
//! - `logging-pretty` - Install a colorful subscriber (development)
//!
//! Without one of the subscriber features the `init*` functions do nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use contextual_beans::logging;
//!
//! // JSON if logging-json, pretty if logging-pretty
//! logging::init();
//!
//! // Only this crate, resolution cache included
//! logging::builder()
//!     .trace()
//!     .beans_only()
//!     .compact()
//!     .init();
//! ```

use crate::Result;
use tracing::Level;

#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
use crate::DiError;

/// The target every event of this crate is emitted under.
pub const TARGET: &str = "contextual_beans";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Multi-line colorful output
    Pretty,
    /// Single-line output
    Compact,
}

/// Builder for the tracing subscriber
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            from_env: false,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
            with_thread_names: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Include resolution cache traffic
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only swallowed destruction failures and worse
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    pub fn error(self) -> Self {
        self.with_level(Level::ERROR)
    }

    /// Only show events of `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show events of this crate
    pub fn beans_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Let `RUST_LOG` override the configured filter when it is set
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// The `EnvFilter` directive this builder installs.
    pub fn directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the subscriber, ignoring an already installed one.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Install the subscriber.
    ///
    /// Fails when a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let directive = self.directive();
        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive))
        } else {
            EnvFilter::new(&directive)
        };

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_thread_names(self.with_thread_names)
            .with_target(true);
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            // Without the json feature the default format falls back to pretty.
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer.pretty()).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact()).try_init(),
        };
        installed.map_err(|err| {
            DiError::InvalidConfiguration(format!("cannot install subscriber: {err}"))
        })
    }

    /// Install the subscriber (no subscriber feature: nothing to install)
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn try_init(self) -> Result<()> {
        Ok(())
    }
}

/// Create a new logging builder
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with the format the enabled features suggest.
pub fn init() {
    #[cfg(feature = "logging-json")]
    init_json();
    #[cfg(all(feature = "logging-pretty", not(feature = "logging-json")))]
    init_pretty();
}

/// Initialize JSON structured logging.
///
/// # Example output
/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"DEBUG","fields":{"message":"Registered bean","bean":"Cod @Dependent"},"target":"contextual_beans"}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// Initialize pretty logging.
///
/// # Example output
/// ```text
///   2026-01-01T00:00:00.000Z DEBUG contextual_beans: Context activated, scope: @session
/// ```
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Initialize logging for this crate only.
pub fn init_beans_only() {
    builder().beans_only().debug().init();
}
