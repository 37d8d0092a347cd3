//! Video surfaces and screen layouts.
//!
//! The kiosk screen is a fixed set of named video surfaces grouped into three layout
//! containers. Exactly one container is visible at a time:
//!
//! | Layout | Surfaces | Used by |
//! |---|---|---|
//! | `Main` | `Main` | Background, Single |
//! | `Split` | `VersusA`, `VersusB` | Versus |
//! | `Quad` | `Quad1`..`Quad4` | Triple, Quad |
//!
//! [`DisplayBackend`] is the capability trait over the actual screen (a browser DOM,
//! a media player, or [`SimulatedDisplay`]). It exposes raw mechanics only; the
//! playback policy (mute-and-retry, idempotent stop) lives in [`VideoElementPool`].
//!
//! # Thread Safety
//! - All methods take `&self`; implementations use interior mutability
//! - Surface events (`ended`, `error`) are published on a broadcast channel

pub mod pool;
pub mod simulated;

pub use pool::{PlayOutcome, VideoElementPool};
pub use simulated::{SimulatedDisplay, SurfaceState};

use crate::error::KioskResult;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

/// A named video surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceId {
    /// Full-screen surface, shared by Background and Single.
    Main,
    /// Left half of the split layout.
    VersusA,
    /// Right half of the split layout.
    VersusB,
    /// First cell of the quad grid.
    Quad1,
    /// Second cell of the quad grid.
    Quad2,
    /// Third cell of the quad grid.
    Quad3,
    /// Fourth cell of the quad grid.
    Quad4,
}

impl SurfaceId {
    /// Every surface, in declaration order.
    pub const ALL: [SurfaceId; 7] = [
        SurfaceId::Main,
        SurfaceId::VersusA,
        SurfaceId::VersusB,
        SurfaceId::Quad1,
        SurfaceId::Quad2,
        SurfaceId::Quad3,
        SurfaceId::Quad4,
    ];

    /// Element id of the surface in the kiosk page.
    pub fn element_id(self) -> &'static str {
        match self {
            SurfaceId::Main => "background-video",
            SurfaceId::VersusA => "video1",
            SurfaceId::VersusB => "video2",
            SurfaceId::Quad1 => "quad1",
            SurfaceId::Quad2 => "quad2",
            SurfaceId::Quad3 => "quad3",
            SurfaceId::Quad4 => "quad4",
        }
    }

    /// The layout container holding this surface.
    pub fn layout(self) -> Layout {
        match self {
            SurfaceId::Main => Layout::Main,
            SurfaceId::VersusA | SurfaceId::VersusB => Layout::Split,
            SurfaceId::Quad1 | SurfaceId::Quad2 | SurfaceId::Quad3 | SurfaceId::Quad4 => {
                Layout::Quad
            }
        }
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_id())
    }
}

/// Layout containers; exactly one is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Single full-screen surface.
    Main,
    /// Two side-by-side surfaces.
    Split,
    /// Two-by-two grid.
    Quad,
}

/// Corner of the quad grid that holds the Triple-mode extra pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Corner {
    /// Top-right cell.
    TopRight,
    /// Top-left cell.
    TopLeft,
    /// Bottom-right cell.
    #[default]
    BottomRight,
    /// Bottom-left cell.
    BottomLeft,
}

impl Corner {
    /// Parse a backend position string (English or Spanish). Unknown values yield `None`.
    pub fn parse(position: &str) -> Option<Corner> {
        match position.trim().to_ascii_lowercase().as_str() {
            "top-right" | "superior-derecha" => Some(Corner::TopRight),
            "top-left" | "superior-izquierda" => Some(Corner::TopLeft),
            "bottom-right" | "inferior-derecha" => Some(Corner::BottomRight),
            "bottom-left" | "inferior-izquierda" => Some(Corner::BottomLeft),
            _ => None,
        }
    }

    /// Quad surfaces in fill order: three sensor panes, then the extra pane.
    pub fn surface_order(self) -> [SurfaceId; 4] {
        use SurfaceId::{Quad1, Quad2, Quad3, Quad4};
        match self {
            Corner::TopRight => [Quad1, Quad3, Quad2, Quad4],
            Corner::TopLeft => [Quad2, Quad3, Quad1, Quad4],
            Corner::BottomRight => [Quad1, Quad2, Quad3, Quad4],
            Corner::BottomLeft => [Quad1, Quad2, Quad4, Quad3],
        }
    }
}

/// Attributes applied when a surface is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceOptions {
    /// Start muted.
    pub muted: bool,
    /// Restart at the end instead of emitting `Ended`.
    pub looping: bool,
}

/// Why a surface refused to play.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Blocked by the autoplay policy; muting usually lifts the block.
    #[error("playback rejected: {0}")]
    Rejected(String),

    /// Any other playback failure.
    #[error("playback failed: {0}")]
    Failed(String),
}

/// Media lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEventKind {
    /// Natural end of a non-looping video.
    Ended,
    /// The media element reported a decode or network error.
    Error(String),
}

/// A media lifecycle event on one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceEvent {
    /// Surface the event came from.
    pub surface: SurfaceId,
    /// What happened.
    pub kind: SurfaceEventKind,
}

/// Capability: kiosk screen.
#[async_trait]
pub trait DisplayBackend: Send + Sync {
    /// Set the source and attributes of a surface without starting playback.
    async fn configure(
        &self,
        surface: SurfaceId,
        source: &str,
        options: SurfaceOptions,
    ) -> KioskResult<()>;

    /// Resolve once the surface has enough data to start (`canplay`).
    ///
    /// May never resolve for a stalled source; callers bound it with a timeout.
    async fn wait_ready(&self, surface: SurfaceId) -> KioskResult<()>;

    /// Start playback.
    async fn play(&self, surface: SurfaceId) -> Result<(), PlaybackError>;

    /// Change the mute flag of a configured surface.
    async fn set_muted(&self, surface: SurfaceId, muted: bool) -> KioskResult<()>;

    /// Pause, rewind to zero, drop the source and hide the surface.
    async fn halt(&self, surface: SurfaceId) -> KioskResult<()>;

    /// Show or hide one surface.
    async fn set_surface_visible(&self, surface: SurfaceId, visible: bool) -> KioskResult<()>;

    /// Make `layout` the only visible container.
    async fn show_layout(&self, layout: Layout) -> KioskResult<()>;

    /// Show a still image in the extra pane, anchored to `corner`.
    async fn show_overlay_image(&self, source: &str, corner: Corner) -> KioskResult<()>;

    /// Remove the overlay image, if any.
    async fn hide_overlay_image(&self) -> KioskResult<()>;

    /// Subscribe to `ended` / `error` notifications.
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;
}
