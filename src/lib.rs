//! # Vitrina Digital kiosk controller
//!
//! This crate drives a touchless product-display kiosk: proximity sensors wired to
//! GPIO pins decide which product videos are on screen. With no sensor active the
//! kiosk loops a background playlist; when sensors trigger it switches to a single,
//! versus, triple or quad layout, capped by the backend's `versus_mode` setting.
//!
//! ## Crate Structure
//!
//! - **`sensors`**: `SensorId`, `ActiveSensorSet`, the status poller and the debounce stage.
//! - **`backend`**: The `KioskBackend` capability over the content/telemetry API, with an
//!   HTTP implementation and a scriptable mock.
//! - **`display`**: Video surfaces and layouts, the `DisplayBackend` capability, the
//!   `VideoElementPool` playback policy and a simulated screen.
//! - **`playlist`**: The idle-state `BackgroundPlaylist`.
//! - **`controller`**: The `DisplayModeController` state machine and its mode table.
//! - **`reporter`**: Fire-and-forget activation telemetry.
//! - **`kiosk`**: The runtime loop wiring everything together.
//! - **`beacon`**: Periodic device heartbeat.
//! - **`config`**, **`logging`**, **`debug_panel`**, **`prefs`**, **`error`**: Ambient
//!   configuration, tracing setup, on-screen log buffer, local preferences and errors.

pub mod backend;
pub mod beacon;
pub mod config;
pub mod controller;
pub mod debug_panel;
pub mod display;
pub mod error;
pub mod kiosk;
pub mod logging;
pub mod playlist;
pub mod prefs;
pub mod reporter;
pub mod sensors;

pub use error::{KioskError, KioskResult};
pub use kiosk::Kiosk;
