//! Kiosk configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/vitrina.toml` (or the file given with `--config`)
//! 2. Environment variables prefixed with `VITRINA_`
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration that talks to a backend on `127.0.0.1:5000`.
//!
//! The runtime display setting (`versus_mode`) is *not* part of this file: it is
//! owned by the backend and re-read before every sensor-triggered transition.
//!
//! # Example
//! ```no_run
//! use vitrina::config::KioskConfig;
//!
//! let config = KioskConfig::load()?;
//! config.validate()?;
//! println!("Backend: {}", config.backend.base_url);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::controller::{ControllerConfig, SelectionPolicy, SteadyDisplay};
use crate::error::{KioskError, KioskResult};
use crate::logging::OutputFormat;
use crate::playlist::PlaylistConfig;
use crate::sensors::{SensorId, SensorPollerConfig};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/vitrina.toml";

/// Prefix of environment overrides, e.g. `VITRINA_BACKEND__BASE_URL`.
pub const ENV_PREFIX: &str = "VITRINA_";

/// Top-level kiosk configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KioskConfig {
    /// Name and logging
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Backend API location
    #[serde(default)]
    pub backend: BackendConfig,
    /// Sensor polling
    #[serde(default)]
    pub sensors: SensorsConfig,
    /// Playback policies
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// Local preference storage
    #[serde(default)]
    pub preferences: PreferencesConfig,
    /// Device heartbeat; disabled when absent
    #[serde(default)]
    pub beacon: Option<BeaconConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Instance name used in logs
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default)]
    pub log_format: OutputFormat,
    /// Keep the most recent log lines for the on-screen debug panel
    #[serde(default)]
    pub debug_panel: bool,
}

/// Backend API location and client timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend origin, e.g. `http://localhost:5000`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path prefix of the API endpoints
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Root under which media paths are served
    #[serde(default = "default_static_root")]
    pub static_root: String,
    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Startup connection attempts before giving up
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    /// Pause between startup connection attempts
    #[serde(default = "default_connect_retry_delay")]
    pub connect_retry_delay_ms: u64,
}

/// Sensor polling and debounce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorsConfig {
    /// GPIO pins of the installed sensors
    #[serde(default = "default_pins")]
    pub pins: Vec<u32>,
    /// Time between sensor status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Quiet window a reading must survive before it is acted upon
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    /// Forward single-sensor readings without waiting for the quiet window
    #[serde(default)]
    pub immediate_single: bool,
    /// Outstanding status requests allowed at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_polls: usize,
}

/// Playback policies and media timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Which sensors win when more are active than fit
    #[serde(default)]
    pub selection: SelectionPolicy,
    /// Loop sensor videos or play them once
    #[serde(default)]
    pub steady_display: SteadyDisplay,
    /// Longest wait for a background video to become ready
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
    /// Pause before the next background video
    #[serde(default = "default_advance_delay")]
    pub advance_delay_ms: u64,
    /// Pause before retrying after a background failure
    #[serde(default = "default_error_retry_delay")]
    pub error_retry_delay_ms: u64,
    /// Background playlist reload period while idle
    #[serde(default = "default_playlist_refresh")]
    pub playlist_refresh_secs: u64,
}

/// Client-local preference storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// JSON file holding mute flags; kept in memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Periodic device heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Heartbeat endpoint
    pub url: String,
    /// Identifier reported with every heartbeat
    pub device_id: String,
    /// Seconds between heartbeats
    #[serde(default = "default_beacon_interval")]
    pub interval_secs: u64,
}

// Default value functions
fn default_name() -> String {
    "Vitrina Digital".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_static_root() -> String {
    "/static".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_connect_retries() -> u32 {
    5
}

fn default_connect_retry_delay() -> u64 {
    1000
}

fn default_pins() -> Vec<u32> {
    vec![17, 27, 5, 6, 13, 18, 22, 26, 19]
}

fn default_poll_interval() -> u64 {
    200
}

fn default_debounce() -> u64 {
    250
}

fn default_max_in_flight() -> usize {
    4
}

fn default_ready_timeout() -> u64 {
    3000
}

fn default_advance_delay() -> u64 {
    100
}

fn default_error_retry_delay() -> u64 {
    1000
}

fn default_playlist_refresh() -> u64 {
    30
}

fn default_beacon_interval() -> u64 {
    60
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
            debug_panel: false,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            static_root: default_static_root(),
            request_timeout_ms: default_request_timeout(),
            connect_retries: default_connect_retries(),
            connect_retry_delay_ms: default_connect_retry_delay(),
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            pins: default_pins(),
            poll_interval_ms: default_poll_interval(),
            debounce_ms: default_debounce(),
            immediate_single: false,
            max_in_flight_polls: default_max_in_flight(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::default(),
            steady_display: SteadyDisplay::default(),
            ready_timeout_ms: default_ready_timeout(),
            advance_delay_ms: default_advance_delay(),
            error_retry_delay_ms: default_error_retry_delay(),
            playlist_refresh_secs: default_playlist_refresh(),
        }
    }
}

impl KioskConfig {
    /// Load configuration from `config/vitrina.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `VITRINA_`; a double
    /// underscore separates the section from the key.
    /// Example: `VITRINA_SENSORS__POLL_INTERVAL_MS=250`
    pub fn load() -> KioskResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> KioskResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> KioskResult<()> {
        let invalid = |msg: String| Err(KioskError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.backend.base_url.trim().is_empty() {
            return invalid("backend.base_url must not be empty".to_string());
        }
        if self.backend.request_timeout_ms == 0 {
            return invalid("backend.request_timeout_ms must be greater than 0".to_string());
        }
        if self.backend.connect_retries == 0 {
            return invalid("backend.connect_retries must be at least 1".to_string());
        }

        if self.sensors.poll_interval_ms == 0 {
            return invalid("sensors.poll_interval_ms must be greater than 0".to_string());
        }
        if self.sensors.debounce_ms > 10_000 {
            return invalid(format!(
                "sensors.debounce_ms {} is too large. Must be at most 10000",
                self.sensors.debounce_ms
            ));
        }
        if self.sensors.max_in_flight_polls == 0 {
            return invalid("sensors.max_in_flight_polls must be at least 1".to_string());
        }
        if self.sensors.pins.is_empty() {
            return invalid("sensors.pins must list at least one pin".to_string());
        }
        let mut pins = HashSet::new();
        for pin in &self.sensors.pins {
            if !pins.insert(pin) {
                return invalid(format!("Duplicate sensor pin: {}", pin));
            }
        }

        if self.playback.ready_timeout_ms == 0 {
            return invalid("playback.ready_timeout_ms must be greater than 0".to_string());
        }
        if self.playback.playlist_refresh_secs == 0 {
            return invalid("playback.playlist_refresh_secs must be greater than 0".to_string());
        }

        if let Some(beacon) = &self.beacon {
            if beacon.url.trim().is_empty() || beacon.device_id.trim().is_empty() {
                return invalid("beacon.url and beacon.device_id are required".to_string());
            }
            if beacon.interval_secs == 0 {
                return invalid("beacon.interval_secs must be greater than 0".to_string());
            }
        }

        Ok(())
    }

    /// Poller settings.
    pub fn poller_config(&self) -> SensorPollerConfig {
        SensorPollerConfig {
            interval: Duration::from_millis(self.sensors.poll_interval_ms),
            max_in_flight: self.sensors.max_in_flight_polls,
            pins: self.sensors.pins.iter().copied().map(SensorId).collect(),
        }
    }

    /// Debounce quiet window.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.sensors.debounce_ms)
    }

    /// Background playlist settings.
    pub fn playlist_config(&self) -> PlaylistConfig {
        PlaylistConfig {
            static_root: self.backend.static_root.clone(),
            ready_timeout: Duration::from_millis(self.playback.ready_timeout_ms),
            advance_delay: Duration::from_millis(self.playback.advance_delay_ms),
            error_retry_delay: Duration::from_millis(self.playback.error_retry_delay_ms),
        }
    }

    /// Display controller settings.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            static_root: self.backend.static_root.clone(),
            selection: self.playback.selection,
            steady_display: self.playback.steady_display,
        }
    }

    /// Background playlist reload period.
    pub fn playlist_refresh(&self) -> Duration {
        Duration::from_secs(self.playback.playlist_refresh_secs)
    }
}
