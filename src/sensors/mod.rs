//! Sensor identities and the active-sensor sets derived from polling.
//!
//! A sensor is a proximity input wired to one GPIO pin of the kiosk computer. The
//! backend reports which pins are currently triggered; the [`poller`] turns those
//! raw readings into [`ActiveSensorSet`]s ordered by activation time, and the
//! [`debounce`] stage decides which of them are forwarded to the display controller.

pub mod debounce;
pub mod poller;

pub use debounce::Debouncer;
pub use poller::{ActivationOrder, PollSequencer, SensorPoller, SensorPollerConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Identifier of a physical sensor (its GPIO pin number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SensorId {
    fn from(value: u32) -> Self {
        SensorId(value)
    }
}

/// Sensors currently reporting "triggered", oldest activation first.
///
/// Sets are never edited in place: every poll produces a fresh one. Two sets are
/// equal when they hold the same sensors in the same activation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ActiveSensorSet(Vec<SensorId>);

impl ActiveSensorSet {
    /// Build a set from sensors in activation order. Duplicates keep their first position.
    pub fn new(sensors: impl IntoIterator<Item = SensorId>) -> Self {
        let mut ordered: Vec<SensorId> = Vec::new();
        for sensor in sensors {
            if !ordered.contains(&sensor) {
                ordered.push(sensor);
            }
        }
        Self(ordered)
    }

    /// Convenience constructor from raw pin numbers.
    pub fn from_pins(pins: impl IntoIterator<Item = u32>) -> Self {
        Self::new(pins.into_iter().map(SensorId))
    }

    /// The empty set (no sensor triggered).
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Number of active sensors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no sensor is active.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `sensor` is active.
    pub fn contains(&self, sensor: SensorId) -> bool {
        self.0.contains(&sensor)
    }

    /// Sensors in activation order.
    pub fn as_slice(&self) -> &[SensorId] {
        &self.0
    }

    /// Iterate in activation order.
    pub fn iter(&self) -> impl Iterator<Item = &SensorId> {
        self.0.iter()
    }
}

impl fmt::Display for ActiveSensorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "[]");
        }
        let joined = self
            .0
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{joined}]")
    }
}

/// A freshly applied poll result, queued for the debounce stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSetObserved {
    /// Issue order of the poll that produced this reading.
    pub seq: u64,
    /// Active sensors.
    pub set: ActiveSensorSet,
    /// When the reading was applied.
    pub at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_keep_first_position() {
        let set = ActiveSensorSet::from_pins([17, 27, 17, 5]);
        assert_eq!(set.as_slice(), &[SensorId(17), SensorId(27), SensorId(5)]);
    }

    #[test]
    fn order_matters_for_equality() {
        assert_ne!(
            ActiveSensorSet::from_pins([3, 9]),
            ActiveSensorSet::from_pins([9, 3])
        );
    }

    #[test]
    fn display_lists_pins() {
        assert_eq!(ActiveSensorSet::from_pins([3, 9]).to_string(), "[3, 9]");
        assert_eq!(ActiveSensorSet::empty().to_string(), "[]");
    }
}
