//! Tracing initialisation
//!
//! The kiosk runs unattended, so logs are its only error surface. This module
//! sets up `tracing-subscriber` with:
//! - one fmt layer in the configured format (pretty, compact, JSON)
//! - environment-based filtering (`RUST_LOG` wins over the configured level)
//! - the optional on-screen [`DebugPanel`](crate::debug_panel::DebugPanel) layer
//!
//! # Example
//! ```no_run
//! use vitrina::{config::KioskConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KioskConfig::load()?;
//! let _panel = logging::init_from_config(&config)?;
//! tracing::info!("kiosk starting");
//! # Ok(())
//! # }
//! ```

use crate::config::KioskConfig;
use crate::debug_panel::DebugPanel;
use crate::error::{KioskError, KioskResult};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    #[default]
    Pretty,
    /// Compact single-line format (for the kiosk console)
    Compact,
    /// JSON format for log aggregation
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Most verbose level emitted
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors (only for Pretty format)
    pub with_ansi: bool,
    /// Mirror events into this panel
    pub panel: Option<DebugPanel>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_file_and_line: false,
            with_ansi: true,
            panel: None,
        }
    }
}

impl TracingConfig {
    /// Build from the kiosk configuration. The debug panel is created when enabled.
    pub fn from_kiosk_config(config: &KioskConfig) -> KioskResult<Self> {
        let level = parse_log_level(&config.application.log_level)?;
        Ok(Self {
            level,
            format: config.application.log_format,
            panel: config.application.debug_panel.then(DebugPanel::new),
            ..Default::default()
        })
    }

    /// Pretty output at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Mirror events into `panel`.
    pub fn with_panel(mut self, panel: DebugPanel) -> Self {
        self.panel = Some(panel);
        self
    }
}

/// Initialize tracing from the kiosk configuration.
///
/// Returns the debug panel when `application.debug_panel` is set.
pub fn init_from_config(config: &KioskConfig) -> KioskResult<Option<DebugPanel>> {
    let tracing_config = TracingConfig::from_kiosk_config(config)?;
    let panel = tracing_config.panel.clone();
    init(tracing_config)?;
    Ok(panel)
}

/// Initialize tracing with custom configuration
///
/// This function is idempotent: if a global subscriber is already set it returns
/// `Ok(())`, which keeps it safe to call from tests.
pub fn init(config: TracingConfig) -> KioskResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let fmt_layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_ansi(config.with_ansi)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_ansi(false)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .boxed(),
    };
    let panel_layer = config.panel.as_ref().map(DebugPanel::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(panel_layer)
        .try_init()
        .or_else(|e| {
            // Already initialised (tests, embedding applications)
            if e
                .to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(KioskError::Configuration(format!(
                    "Failed to initialize tracing: {}",
                    e
                )))
            }
        })
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> KioskResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(KioskError::Configuration(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("Debug"), Ok(Level::DEBUG)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_tracing_config_from_kiosk_config() {
        let mut config = KioskConfig::default();
        config.application.log_level = "debug".to_string();
        config.application.log_format = OutputFormat::Json;
        config.application.debug_panel = true;

        let tracing_config = TracingConfig::from_kiosk_config(&config).unwrap();
        assert_eq!(tracing_config.level, Level::DEBUG);
        assert_eq!(tracing_config.format, OutputFormat::Json);
        assert!(tracing_config.panel.is_some());
    }

    #[test]
    fn test_tracing_config_builder() {
        let config = TracingConfig::new(Level::WARN)
            .with_format(OutputFormat::Compact)
            .with_ansi(false);
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, OutputFormat::Compact);
        assert!(!config.with_ansi);
        assert!(config.panel.is_none());
    }

    #[test]
    fn output_format_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(parsed.format, OutputFormat::Json);
    }
}
