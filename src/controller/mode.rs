//! Display modes and the table-driven transition function.
//!
//! | versus mode | active sensors | target |
//! |---|---|---|
//! | any | 0 | Background |
//! | n | k >= 1 | mode showing `min(k, n)` sensors |
//!
//! When more sensors are active than the target can show, [`SelectionPolicy`] picks
//! which ones stay on screen.

use crate::backend::VersusMode;
use crate::display::{Corner, Layout, SurfaceId};
use crate::sensors::{ActiveSensorSet, SensorId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Screen layouts the kiosk can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    /// Idle playlist on the main surface.
    #[default]
    Background,
    /// One sensor video full screen.
    Single,
    /// Two sensor videos side by side.
    Versus,
    /// Three sensor videos plus an extra pane.
    Triple,
    /// Four sensor videos in a grid.
    Quad,
}

impl DisplayMode {
    /// Mode that shows exactly `count` sensors. Counts above four are capped.
    pub fn for_sensor_count(count: usize) -> Self {
        match count {
            0 => DisplayMode::Background,
            1 => DisplayMode::Single,
            2 => DisplayMode::Versus,
            3 => DisplayMode::Triple,
            _ => DisplayMode::Quad,
        }
    }

    /// Number of sensor videos on screen in this mode.
    pub fn sensor_slots(self) -> usize {
        match self {
            DisplayMode::Background => 0,
            DisplayMode::Single => 1,
            DisplayMode::Versus => 2,
            DisplayMode::Triple => 3,
            DisplayMode::Quad => 4,
        }
    }

    /// Layout shown in this mode.
    pub fn layout(self) -> Layout {
        match self {
            DisplayMode::Background | DisplayMode::Single => Layout::Main,
            DisplayMode::Versus => Layout::Split,
            DisplayMode::Triple | DisplayMode::Quad => Layout::Quad,
        }
    }

    /// Surfaces receiving sensor videos, in selection order.
    ///
    /// For Triple the fourth surface of `corner`'s order is the extra pane and is
    /// not included.
    pub fn sensor_surfaces(self, corner: Corner) -> Vec<SurfaceId> {
        match self {
            DisplayMode::Background => Vec::new(),
            DisplayMode::Single => vec![SurfaceId::Main],
            DisplayMode::Versus => vec![SurfaceId::VersusA, SurfaceId::VersusB],
            DisplayMode::Triple => corner.surface_order()[..3].to_vec(),
            DisplayMode::Quad => vec![
                SurfaceId::Quad1,
                SurfaceId::Quad2,
                SurfaceId::Quad3,
                SurfaceId::Quad4,
            ],
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayMode::Background => "background",
            DisplayMode::Single => "single",
            DisplayMode::Versus => "versus",
            DisplayMode::Triple => "triple",
            DisplayMode::Quad => "quad",
        };
        f.write_str(name)
    }
}

/// Which sensors stay on screen when the active set exceeds the mode's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The most recently activated sensors.
    #[default]
    MostRecent,
    /// The earliest activated sensors (arrival order).
    FirstActivated,
}

/// Playback behaviour of Single and Versus surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteadyDisplay {
    /// Loop until the sensor set changes.
    #[default]
    Loop,
    /// Play once, then return to Background.
    PlayOnce,
}

impl SteadyDisplay {
    /// Whether sensor surfaces of `mode` loop.
    pub fn loops(self, mode: DisplayMode) -> bool {
        match (self, mode) {
            (SteadyDisplay::PlayOnce, DisplayMode::Single | DisplayMode::Versus) => false,
            _ => true,
        }
    }
}

/// A display mode plus the exact sensors it shows, in surface order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Composition {
    /// Display mode.
    pub mode: DisplayMode,
    /// Sensors on screen, in surface order.
    pub sensors: Vec<SensorId>,
}

impl Composition {
    /// The idle composition.
    pub fn background() -> Self {
        Self::default()
    }

    /// Whether this is the idle composition.
    pub fn is_background(&self) -> bool {
        self.mode == DisplayMode::Background
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode)?;
        if !self.sensors.is_empty() {
            let ids: Vec<String> = self.sensors.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", ids.join(", "))?;
        }
        Ok(())
    }
}

/// Target mode for `count` active sensors under `versus_mode`.
pub fn target_mode(count: usize, versus_mode: VersusMode) -> DisplayMode {
    DisplayMode::for_sensor_count(count.min(versus_mode.capacity()))
}

/// Choose `slots` sensors from an oldest-first set, keeping their relative order.
pub fn select(set: &ActiveSensorSet, slots: usize, policy: SelectionPolicy) -> Vec<SensorId> {
    let sensors = set.as_slice();
    let take = slots.min(sensors.len());
    match policy {
        SelectionPolicy::MostRecent => sensors[sensors.len() - take..].to_vec(),
        SelectionPolicy::FirstActivated => sensors[..take].to_vec(),
    }
}

/// The composition the kiosk should show for `set`.
pub fn plan(set: &ActiveSensorSet, versus_mode: VersusMode, policy: SelectionPolicy) -> Composition {
    let mode = target_mode(set.len(), versus_mode);
    Composition {
        mode,
        sensors: select(set, mode.sensor_slots(), policy),
    }
}
