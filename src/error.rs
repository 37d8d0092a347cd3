//! Custom error types for the kiosk.
//!
//! This module defines the primary error type, `KioskError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures the kiosk can run into, from configuration problems to backend
//! outages and missing media.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps figment errors raised while parsing the configuration file
//!   or environment overrides.
//! - **`Configuration`**: Semantic errors that pass parsing but are logically wrong
//!   (a zero poll interval, duplicated sensor pins). Caught by `KioskConfig::validate`.
//! - **`Http` / `Status` / `Decode`**: Transport failures, non-2xx responses and
//!   malformed payloads from the backend API. All of them are transient: the caller
//!   logs, skips the cycle and keeps the last known-good state.
//! - **`MissingContent`**: A sensor has no assigned video. Aborts the transition in
//!   progress, which always resolves by falling back to Background.
//! - **`Display`**: The display backend refused an operation (unknown surface,
//!   vanished element).
//!
//! Playback rejections are not part of this enum; they live in
//! [`crate::display::PlaybackError`] and are absorbed by the video pool.

use crate::sensors::SensorId;
use thiserror::Error;

/// Convenience alias for results using the kiosk error type.
pub type KioskResult<T> = std::result::Result<T, KioskError>;

/// Errors raised by kiosk components.
#[derive(Error, Debug)]
pub enum KioskError {
    /// Config file or environment could not be read.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Config values failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request could not be sent or timed out.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("Backend returned {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Response body did not match the expected shape.
    #[error("Malformed payload from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// A sensor to be shown has no video.
    #[error("Sensor {0} has no assigned video")]
    MissingContent(SensorId),

    /// `versus_mode` outside 1-4.
    #[error("Invalid versus mode '{0}'. Must be between 1 and 4")]
    InvalidVersusMode(String),

    /// The screen refused an operation.
    #[error("Display error: {0}")]
    Display(String),

    /// Preference storage failure.
    #[error("Preference store error: {0}")]
    Preferences(String),
}

impl KioskError {
    /// True for failures that should only skip the current cycle.
    ///
    /// Transient errors never change the current display mode; the next poll
    /// re-evaluates from scratch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KioskError::Http(_)
                | KioskError::Status { .. }
                | KioskError::Decode { .. }
                | KioskError::Io(_)
                | KioskError::InvalidVersusMode(_)
        )
    }
}

impl From<figment::Error> for KioskError {
    fn from(value: figment::Error) -> Self {
        KioskError::Config(Box::new(value))
    }
}

impl From<serde_json::Error> for KioskError {
    fn from(value: serde_json::Error) -> Self {
        KioskError::Preferences(value.to_string())
    }
}
