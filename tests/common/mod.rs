//! Shared harness for integration tests.
//!
//! Builds a [`Kiosk`] over the in-memory backend and the simulated screen and keeps
//! typed handles to both so tests can script inputs and inspect the screen.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use vitrina::backend::{MockBackend, PlaylistEntry};
use vitrina::config::KioskConfig;
use vitrina::display::SimulatedDisplay;
use vitrina::prefs::MemoryPreferences;
use vitrina::Kiosk;

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub display: Arc<SimulatedDisplay>,
    pub prefs: Arc<MemoryPreferences>,
    pub kiosk: Arc<Kiosk>,
}

/// Configuration with short timings, polling pins 1-9.
pub fn test_config() -> KioskConfig {
    let mut config = KioskConfig::default();
    config.sensors.pins = (1..=9).collect();
    config.sensors.poll_interval_ms = 50;
    config.sensors.debounce_ms = 250;
    config.playback.advance_delay_ms = 100;
    config.playback.error_retry_delay_ms = 1000;
    config
}

pub fn playlist(ids: &[i64]) -> Vec<PlaylistEntry> {
    ids.iter()
        .enumerate()
        .map(|(order, id)| PlaylistEntry {
            id: *id,
            video_path: format!("bg/{id}.mp4"),
            order: order as i64,
        })
        .collect()
}

/// Every pin in 1-9 has `videos/<pin>.mp4`; the playlist holds three entries.
pub fn harness(config: KioskConfig) -> Harness {
    let backend = Arc::new(MockBackend::new());
    for pin in 1..=9 {
        backend.assign_video(pin, &format!("videos/{pin}.mp4"));
    }
    backend.set_playlist(playlist(&[10, 11, 12]));
    let display = Arc::new(SimulatedDisplay::new());
    let prefs = Arc::new(MemoryPreferences::new());
    let kiosk = Arc::new(Kiosk::new(
        config,
        backend.clone(),
        display.clone(),
        prefs.clone(),
    ));
    Harness {
        backend,
        display,
        prefs,
        kiosk,
    }
}

/// Let spawned tasks run. On a paused clock this also advances virtual time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn source(path: &str) -> Option<String> {
    Some(format!("/static/{path}"))
}
