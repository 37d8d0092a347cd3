//! Backend API consumed by the kiosk.
//!
//! The kiosk never owns its content: sensor state, the versus-mode setting, video
//! assignments, the background playlist and the Triple-mode extra content all come
//! from the backend HTTP API. This module defines the [`KioskBackend`] capability
//! trait over those endpoints plus the payload types, so the controller can be
//! exercised against [`MockBackend`] and deployed against [`HttpBackend`].
//!
//! # Wire formats
//!
//! | Endpoint | Payload |
//! |---|---|
//! | `GET /sensor_status` | `{"active_sensors": [17, 27], "status": {"17": 1, "27": 1, "5": 0}}` |
//! | `GET /system-config` | `{"versus_mode": "2", ...}` (values are strings) |
//! | `GET /sensor_video/{id}` | `{"video_path": "videos/a.mp4" \| null, "nombre_sensor": ...}` |
//! | `GET /background_videos` | `[{"id": 1, "video_path": "...", "orden": 0}]` |
//! | `GET /extra-content` | `{"path": ..., "position": "top-right", "type": "image"}` |
//! | `POST /register_activation` | `{"sensor_id": 17, "duration": 6200}` |

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

use crate::error::{KioskError, KioskResult};
use crate::sensors::SensorId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability: kiosk content and telemetry API.
///
/// # Contract
/// - Every method is a single request; no method retries on its own
/// - Transport, status and decode failures surface as transient [`KioskError`]s
/// - Implementations must be cheap to share behind an `Arc`
#[async_trait]
pub trait KioskBackend: Send + Sync {
    /// Current sensor readings.
    async fn sensor_status(&self) -> KioskResult<SensorStatus>;

    /// Runtime configuration (read before every sensor-triggered transition).
    async fn system_config(&self) -> KioskResult<SystemConfig>;

    /// Video assigned to one sensor. `video_path` is `None` when nothing is assigned.
    async fn sensor_video(&self, sensor: SensorId) -> KioskResult<VideoAssignment>;

    /// Background playlist in backend order (callers still sort by `order`).
    async fn background_videos(&self) -> KioskResult<Vec<PlaylistEntry>>;

    /// The extra pane shown next to three sensors in Triple mode.
    async fn extra_content(&self) -> KioskResult<ExtraContent>;

    /// Record one sensor activation.
    async fn register_activation(&self, record: ActivationRecord) -> KioskResult<()>;
}

// =============================================================================
// Sensor status
// =============================================================================

/// Parsed `/sensor_status` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorStatus {
    /// Triggered sensors in backend order.
    pub active_sensors: Vec<SensorId>,
}

#[derive(Debug, Deserialize)]
struct SensorStatusWire {
    #[serde(default)]
    active_sensors: Option<Vec<u32>>,
    #[serde(default)]
    status: BTreeMap<String, serde_json::Value>,
}

impl SensorStatus {
    /// Decode a `/sensor_status` payload.
    ///
    /// When `active_sensors` is missing the set is derived from the `status` map,
    /// where a value of `1` (or `true`) means triggered.
    pub fn from_json(endpoint: &str, value: serde_json::Value) -> KioskResult<Self> {
        let wire: SensorStatusWire =
            serde_json::from_value(value).map_err(|e| decode_error(endpoint, e))?;

        if let Some(active) = wire.active_sensors {
            return Ok(Self {
                active_sensors: active.into_iter().map(SensorId).collect(),
            });
        }

        let mut active_sensors = Vec::new();
        for (pin, state) in wire.status {
            let triggered = match state {
                serde_json::Value::Bool(b) => b,
                serde_json::Value::Number(n) => n.as_i64() == Some(1),
                _ => false,
            };
            if triggered {
                let pin: u32 = pin
                    .parse()
                    .map_err(|_| decode_error(endpoint, format!("invalid pin '{pin}'")))?;
                active_sensors.push(SensorId(pin));
            }
        }
        Ok(Self { active_sensors })
    }
}

// =============================================================================
// System configuration
// =============================================================================

/// Maximum number of sensors the kiosk may show at once (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersusMode(u8);

impl VersusMode {
    /// One sensor at a time.
    pub const SINGLE: VersusMode = VersusMode(1);
    /// Up to two sensors side by side.
    pub const VERSUS: VersusMode = VersusMode(2);
    /// Up to three sensors plus the extra pane.
    pub const TRIPLE: VersusMode = VersusMode(3);
    /// Up to four sensors.
    pub const QUAD: VersusMode = VersusMode(4);

    /// Validate a raw versus-mode value.
    pub fn new(value: u8) -> KioskResult<Self> {
        if (1..=4).contains(&value) {
            Ok(Self(value))
        } else {
            Err(KioskError::InvalidVersusMode(value.to_string()))
        }
    }

    /// Most sensors shown at once.
    pub fn capacity(self) -> usize {
        usize::from(self.0)
    }
}

/// Parsed `/system-config` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    /// Configured versus mode.
    pub versus_mode: VersusMode,
}

impl SystemConfig {
    /// Decode the backend's key/value map. `versus_mode` may be a string or a number.
    pub fn from_json(endpoint: &str, value: serde_json::Value) -> KioskResult<Self> {
        let raw = value
            .get("versus_mode")
            .ok_or_else(|| decode_error(endpoint, "missing versus_mode"))?;
        let parsed = match raw {
            serde_json::Value::String(s) => s.trim().parse::<u8>().ok(),
            serde_json::Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
            _ => None,
        };
        let versus_mode = match parsed {
            Some(v) => VersusMode::new(v)?,
            None => return Err(KioskError::InvalidVersusMode(raw.to_string())),
        };
        Ok(Self { versus_mode })
    }
}

// =============================================================================
// Content
// =============================================================================

/// Parsed `/sensor_video/{id}` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAssignment {
    /// Sensor the assignment belongs to.
    pub sensor: SensorId,
    /// Assigned video, `None` when unassigned.
    pub video_path: Option<String>,
    /// Display name of the sensor.
    pub sensor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoAssignmentWire {
    #[serde(default)]
    video_path: Option<String>,
    #[serde(default)]
    nombre_sensor: Option<String>,
}

impl VideoAssignment {
    /// Decode the assignment of `sensor`. A blank path counts as unassigned.
    pub fn from_json(
        endpoint: &str,
        sensor: SensorId,
        value: serde_json::Value,
    ) -> KioskResult<Self> {
        let wire: VideoAssignmentWire =
            serde_json::from_value(value).map_err(|e| decode_error(endpoint, e))?;
        Ok(Self {
            sensor,
            video_path: wire.video_path.filter(|p| !p.trim().is_empty()),
            sensor_name: wire.nombre_sensor,
        })
    }

    /// The assigned path, or [`KioskError::MissingContent`].
    pub fn require_path(&self) -> KioskResult<&str> {
        self.video_path
            .as_deref()
            .ok_or(KioskError::MissingContent(self.sensor))
    }
}

/// One background playlist video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Backend id.
    pub id: i64,
    /// Media path below the static root.
    pub video_path: String,
    /// Explicit sort key; `null` on the wire is treated as 0.
    #[serde(rename = "orden", default, deserialize_with = "null_as_zero")]
    pub order: i64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

/// Kind of Triple-mode extra content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraKind {
    /// Still image overlay.
    Image,
    /// Video in the extra pane.
    Video,
}

/// Parsed `/extra-content` response. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraContent {
    /// Media path below the static root.
    #[serde(default)]
    pub path: Option<String>,
    /// Corner name, English or Spanish.
    #[serde(default)]
    pub position: Option<String>,
    /// Image or video; unknown kinds read as `None`.
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: Option<ExtraKind>,
}

fn lenient_kind<'de, D>(deserializer: D) -> Result<Option<ExtraKind>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("image") => Some(ExtraKind::Image),
        Some("video") => Some(ExtraKind::Video),
        _ => None,
    })
}

/// Body of `POST /register_activation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Sensor that was shown.
    pub sensor_id: SensorId,
    /// Milliseconds the sensor's content was on screen.
    pub duration: u64,
}

fn decode_error(endpoint: &str, reason: impl ToString) -> KioskError {
    KioskError::Decode {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}

/// Join the static-content root and a backend media path.
pub fn media_url(static_root: &str, path: &str) -> String {
    format!(
        "{}/{}",
        static_root.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensor_status_prefers_active_list() {
        let status = SensorStatus::from_json(
            "/api/sensor_status",
            json!({"active_sensors": [27, 17], "status": {"17": 1, "27": 1}}),
        )
        .unwrap();
        assert_eq!(status.active_sensors, vec![SensorId(27), SensorId(17)]);
    }

    #[test]
    fn sensor_status_derives_from_status_map() {
        let status = SensorStatus::from_json(
            "/api/sensor_status",
            json!({"status": {"17": 1, "27": 0, "5": true}}),
        )
        .unwrap();
        assert_eq!(status.active_sensors, vec![SensorId(17), SensorId(5)]);
    }

    #[test]
    fn sensor_status_rejects_garbage() {
        let err = SensorStatus::from_json("/api/sensor_status", json!({"active_sensors": "x"}))
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn system_config_accepts_strings_and_numbers() {
        let from_str =
            SystemConfig::from_json("/api/system-config", json!({"versus_mode": "3"})).unwrap();
        let from_num =
            SystemConfig::from_json("/api/system-config", json!({"versus_mode": 4})).unwrap();
        assert_eq!(from_str.versus_mode, VersusMode::TRIPLE);
        assert_eq!(from_num.versus_mode, VersusMode::QUAD);
    }

    #[test]
    fn system_config_rejects_out_of_range() {
        let err = SystemConfig::from_json("/api/system-config", json!({"versus_mode": "7"}))
            .unwrap_err();
        assert!(matches!(err, KioskError::InvalidVersusMode(_)));
    }

    #[test]
    fn null_video_path_is_missing_content() {
        let assignment = VideoAssignment::from_json(
            "/api/sensor_video/9",
            SensorId(9),
            json!({"video_path": null, "nombre_sensor": null}),
        )
        .unwrap();
        assert!(matches!(
            assignment.require_path(),
            Err(KioskError::MissingContent(SensorId(9)))
        ));
    }

    #[test]
    fn playlist_entry_null_order_is_zero() {
        let entries: Vec<PlaylistEntry> = serde_json::from_value(json!([
            {"id": 1, "video_path": "bg/a.mp4", "orden": null},
            {"id": 2, "video_path": "bg/b.mp4", "orden": 3}
        ]))
        .unwrap();
        assert_eq!(entries[0].order, 0);
        assert_eq!(entries[1].order, 3);
    }

    #[test]
    fn extra_content_unknown_type_is_none() {
        let extra: ExtraContent =
            serde_json::from_value(json!({"path": "x.gif", "position": null, "type": "gif"}))
                .unwrap();
        assert_eq!(extra.kind, None);
        let extra: ExtraContent =
            serde_json::from_value(json!({"path": null, "position": null, "type": null}))
                .unwrap();
        assert_eq!(extra, ExtraContent::default());
    }

    #[test]
    fn media_url_joins_cleanly() {
        assert_eq!(media_url("/static/", "/videos/a.mp4"), "/static/videos/a.mp4");
        assert_eq!(media_url("/static", "videos/a.mp4"), "/static/videos/a.mp4");
    }
}
