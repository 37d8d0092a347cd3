//! In-memory backend for tests and the `simulate` command.
//!
//! `MockBackend` holds the same data the real API serves and lets callers script it:
//! which sensors are triggered, the versus-mode setting, video assignments, the
//! background playlist and extra content. Failure switches and per-endpoint delays
//! make it possible to exercise the controller's recovery paths.
//!
//! All delays use `tokio::time::sleep`, so tests running on a paused clock stay
//! deterministic.

use super::{
    ActivationRecord, ExtraContent, KioskBackend, PlaylistEntry, SensorStatus, SystemConfig,
    VersusMode, VideoAssignment,
};
use crate::error::{KioskError, KioskResult};
use crate::sensors::SensorId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{sleep, Duration};

#[derive(Debug, Default)]
struct MockState {
    active: Vec<SensorId>,
    versus_mode: u8,
    videos: HashMap<SensorId, String>,
    playlist: Vec<PlaylistEntry>,
    extra: ExtraContent,
    activations: Vec<ActivationRecord>,
    fail_status: bool,
    fail_config: bool,
    fail_videos: bool,
    fail_playlist: bool,
    fail_extra: bool,
    fail_activations: bool,
    status_delays: Vec<Duration>,
    video_delay: Duration,
    activation_delay: Duration,
}

/// Scriptable in-memory [`KioskBackend`].
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
    status_calls: AtomicU64,
    config_calls: AtomicU64,
    video_calls: AtomicU64,
    playlist_calls: AtomicU64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Empty backend: no sensors, versus mode 1, no content.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                versus_mode: 1,
                ..MockState::default()
            }),
            status_calls: AtomicU64::new(0),
            config_calls: AtomicU64::new(0),
            video_calls: AtomicU64::new(0),
            playlist_calls: AtomicU64::new(0),
        }
    }

    /// Set the triggered sensors, in the order the backend reports them.
    pub fn set_active(&self, pins: &[u32]) {
        self.state.lock().active = pins.iter().copied().map(SensorId).collect();
    }

    /// Store a raw versus-mode value. Out-of-range values are served as-is.
    pub fn set_versus_mode(&self, mode: u8) {
        self.state.lock().versus_mode = mode;
    }

    /// Assign `path` as the video of sensor `pin`.
    pub fn assign_video(&self, pin: u32, path: &str) {
        self.state.lock().videos.insert(SensorId(pin), path.to_string());
    }

    /// Remove the video assignment of `pin`.
    pub fn unassign_video(&self, pin: u32) {
        self.state.lock().videos.remove(&SensorId(pin));
    }

    /// Replace the background playlist.
    pub fn set_playlist(&self, entries: Vec<PlaylistEntry>) {
        self.state.lock().playlist = entries;
    }

    /// Set the Triple-mode extra content.
    pub fn set_extra_content(&self, extra: ExtraContent) {
        self.state.lock().extra = extra;
    }

    /// Make `/sensor_status` fail.
    pub fn fail_sensor_status(&self, fail: bool) {
        self.state.lock().fail_status = fail;
    }

    /// Make `/system-config` fail.
    pub fn fail_system_config(&self, fail: bool) {
        self.state.lock().fail_config = fail;
    }

    /// Make `/sensor_video/{id}` fail.
    pub fn fail_sensor_videos(&self, fail: bool) {
        self.state.lock().fail_videos = fail;
    }

    /// Make `/background_videos` fail.
    pub fn fail_background_videos(&self, fail: bool) {
        self.state.lock().fail_playlist = fail;
    }

    /// Make `/extra-content` fail.
    pub fn fail_extra_content(&self, fail: bool) {
        self.state.lock().fail_extra = fail;
    }

    /// Make `/register_activation` fail.
    pub fn fail_activations(&self, fail: bool) {
        self.state.lock().fail_activations = fail;
    }

    /// Queue response delays for the next `/sensor_status` calls, one per call.
    pub fn push_status_delays(&self, delays: &[Duration]) {
        self.state.lock().status_delays.extend_from_slice(delays);
    }

    /// Delay every `/sensor_video` response.
    pub fn set_video_delay(&self, delay: Duration) {
        self.state.lock().video_delay = delay;
    }

    /// Delay every `/register_activation` response.
    pub fn set_activation_delay(&self, delay: Duration) {
        self.state.lock().activation_delay = delay;
    }

    /// Activations received so far.
    pub fn activations(&self) -> Vec<ActivationRecord> {
        self.state.lock().activations.clone()
    }

    /// Number of status requests served.
    pub fn status_calls(&self) -> u64 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of system-config requests served.
    pub fn config_calls(&self) -> u64 {
        self.config_calls.load(Ordering::SeqCst)
    }

    /// Number of sensor-video requests served.
    pub fn video_calls(&self) -> u64 {
        self.video_calls.load(Ordering::SeqCst)
    }

    /// Number of playlist requests served.
    pub fn playlist_calls(&self) -> u64 {
        self.playlist_calls.load(Ordering::SeqCst)
    }

    fn unavailable(endpoint: &str) -> KioskError {
        KioskError::Status {
            endpoint: endpoint.to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl KioskBackend for MockBackend {
    async fn sensor_status(&self) -> KioskResult<SensorStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let mut state = self.state.lock();
            if state.status_delays.is_empty() {
                Duration::ZERO
            } else {
                state.status_delays.remove(0)
            }
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let state = self.state.lock();
        if state.fail_status {
            return Err(Self::unavailable("sensor_status"));
        }
        Ok(SensorStatus {
            active_sensors: state.active.clone(),
        })
    }

    async fn system_config(&self) -> KioskResult<SystemConfig> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fail_config {
            return Err(Self::unavailable("system-config"));
        }
        Ok(SystemConfig {
            versus_mode: VersusMode::new(state.versus_mode)?,
        })
    }

    async fn sensor_video(&self, sensor: SensorId) -> KioskResult<VideoAssignment> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().video_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let state = self.state.lock();
        if state.fail_videos {
            return Err(Self::unavailable("sensor_video"));
        }
        Ok(VideoAssignment {
            sensor,
            video_path: state.videos.get(&sensor).cloned(),
            sensor_name: None,
        })
    }

    async fn background_videos(&self) -> KioskResult<Vec<PlaylistEntry>> {
        self.playlist_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fail_playlist {
            return Err(Self::unavailable("background_videos"));
        }
        Ok(state.playlist.clone())
    }

    async fn extra_content(&self) -> KioskResult<ExtraContent> {
        let state = self.state.lock();
        if state.fail_extra {
            return Err(Self::unavailable("extra-content"));
        }
        Ok(state.extra.clone())
    }

    async fn register_activation(&self, record: ActivationRecord) -> KioskResult<()> {
        let delay = self.state.lock().activation_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.fail_activations {
            return Err(Self::unavailable("register_activation"));
        }
        state.activations.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_scripted_state() {
        let backend = MockBackend::new();
        backend.set_active(&[17, 27]);
        backend.set_versus_mode(2);
        backend.assign_video(17, "videos/17.mp4");

        let status = backend.sensor_status().await.unwrap();
        assert_eq!(status.active_sensors, vec![SensorId(17), SensorId(27)]);
        assert_eq!(
            backend.system_config().await.unwrap().versus_mode,
            VersusMode::VERSUS
        );
        let video = backend.sensor_video(SensorId(17)).await.unwrap();
        assert_eq!(video.video_path.as_deref(), Some("videos/17.mp4"));
        let missing = backend.sensor_video(SensorId(27)).await.unwrap();
        assert_eq!(missing.video_path, None);
        assert_eq!(backend.video_calls(), 2);
    }

    #[tokio::test]
    async fn invalid_versus_mode_is_an_error() {
        let backend = MockBackend::new();
        backend.set_versus_mode(9);
        assert!(matches!(
            backend.system_config().await,
            Err(KioskError::InvalidVersusMode(_))
        ));
    }

    #[tokio::test]
    async fn failure_switches_return_transient_errors() {
        let backend = MockBackend::new();
        backend.fail_sensor_status(true);
        let err = backend.sensor_status().await.unwrap_err();
        assert!(err.is_transient());
        backend.fail_sensor_status(false);
        assert!(backend.sensor_status().await.is_ok());
    }
}
