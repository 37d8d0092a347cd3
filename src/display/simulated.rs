//! Simulated kiosk screen.
//!
//! `SimulatedDisplay` keeps the state a browser would keep for each video element
//! (source, attributes, play state, position, visibility) and records every layout
//! change, so tests can assert that at most one layout was ever visible. It is also
//! what the `run` and `simulate` commands drive when no real screen is attached.
//!
//! Failure knobs:
//! - `set_autoplay_requires_mute`: unmuted `play()` is rejected like a browser
//!   autoplay policy would
//! - `break_source`: playback of that source always fails
//! - `stall_ready`: `wait_ready` never resolves
//! - `set_auto_finish`: non-looping videos emit `Ended` after a fixed duration

use super::{
    Corner, DisplayBackend, Layout, PlaybackError, SurfaceEvent, SurfaceEventKind, SurfaceId,
    SurfaceOptions,
};
use crate::error::{KioskError, KioskResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;

/// Observable state of one simulated video element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceState {
    /// Configured media reference.
    pub source: Option<String>,
    /// Muted flag.
    pub muted: bool,
    /// Loop flag.
    pub looping: bool,
    /// Whether the video is playing.
    pub playing: bool,
    /// Whether the surface is shown.
    pub visible: bool,
    /// Playback position.
    pub position_ms: u64,
    /// `play()` calls since the source was last set.
    pub play_attempts: u32,
    /// Number of times a source was assigned.
    pub loads: u32,
}

#[derive(Debug, Default)]
struct DisplayState {
    surfaces: HashMap<SurfaceId, SurfaceState>,
    layout: Option<Layout>,
    layout_history: Vec<Layout>,
    overlay: Option<(String, Corner)>,
    autoplay_requires_mute: bool,
    broken_sources: HashSet<String>,
    stall_ready: bool,
    auto_finish: Option<Duration>,
    log_activity: bool,
}

/// In-memory [`DisplayBackend`].
pub struct SimulatedDisplay {
    state: Arc<Mutex<DisplayState>>,
    events: broadcast::Sender<SurfaceEvent>,
}

impl Default for SimulatedDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDisplay {
    /// Screen with every surface hidden and empty.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let mut state = DisplayState::default();
        for surface in SurfaceId::ALL {
            state.surfaces.insert(surface, SurfaceState::default());
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            events,
        }
    }

    /// Log every surface and layout change at `info` level.
    pub fn with_activity_log(self) -> Self {
        self.state.lock().log_activity = true;
        self
    }

    /// Reject unmuted `play()` calls.
    pub fn set_autoplay_requires_mute(&self, required: bool) {
        self.state.lock().autoplay_requires_mute = required;
    }

    /// Make every `play()` of `source` fail.
    pub fn break_source(&self, source: &str) {
        self.state.lock().broken_sources.insert(source.to_string());
    }

    /// Make `wait_ready` hang.
    pub fn stall_ready(&self, stalled: bool) {
        self.state.lock().stall_ready = stalled;
    }

    /// Emit `Ended` for non-looping videos `after` they start playing.
    pub fn set_auto_finish(&self, after: Option<Duration>) {
        self.state.lock().auto_finish = after;
    }

    /// Snapshot of one surface.
    pub fn surface(&self, surface: SurfaceId) -> SurfaceState {
        self.state
            .lock()
            .surfaces
            .get(&surface)
            .cloned()
            .unwrap_or_default()
    }

    /// Currently visible layout container.
    pub fn layout(&self) -> Option<Layout> {
        self.state.lock().layout
    }

    /// Every layout shown so far, in order.
    pub fn layout_history(&self) -> Vec<Layout> {
        self.state.lock().layout_history.clone()
    }

    /// The overlay image and its corner, if shown.
    pub fn overlay(&self) -> Option<(String, Corner)> {
        self.state.lock().overlay.clone()
    }

    /// Surfaces that are visible right now.
    pub fn visible_surfaces(&self) -> Vec<SurfaceId> {
        let state = self.state.lock();
        SurfaceId::ALL
            .into_iter()
            .filter(|s| state.surfaces.get(s).is_some_and(|st| st.visible))
            .collect()
    }

    /// True when every visible surface belongs to the visible layout.
    pub fn is_exclusive(&self) -> bool {
        let layout = self.layout();
        self.visible_surfaces()
            .into_iter()
            .all(|surface| Some(surface.layout()) == layout)
    }

    /// Move the playhead of a surface forward.
    pub fn advance(&self, surface: SurfaceId, millis: u64) {
        if let Some(state) = self.state.lock().surfaces.get_mut(&surface) {
            state.position_ms += millis;
        }
    }

    /// Simulate the natural end of the current video.
    pub fn finish(&self, surface: SurfaceId) {
        if let Some(state) = self.state.lock().surfaces.get_mut(&surface) {
            state.playing = false;
        }
        let _ = self.events.send(SurfaceEvent {
            surface,
            kind: SurfaceEventKind::Ended,
        });
    }

    /// Simulate a media error on a surface.
    pub fn fail(&self, surface: SurfaceId, reason: &str) {
        if let Some(state) = self.state.lock().surfaces.get_mut(&surface) {
            state.playing = false;
        }
        let _ = self.events.send(SurfaceEvent {
            surface,
            kind: SurfaceEventKind::Error(reason.to_string()),
        });
    }

    fn with_surface<T>(
        &self,
        surface: SurfaceId,
        f: impl FnOnce(&mut SurfaceState, bool) -> T,
    ) -> KioskResult<T> {
        let mut state = self.state.lock();
        let log = state.log_activity;
        let entry = state
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| KioskError::Display(format!("unknown surface {surface}")))?;
        Ok(f(entry, log))
    }

    fn schedule_finish(&self, surface: SurfaceId, source: String, after: Duration) {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let still_playing = {
                let mut guard = state.lock();
                match guard.surfaces.get_mut(&surface) {
                    Some(s) if s.playing && s.source.as_deref() == Some(source.as_str()) => {
                        s.playing = false;
                        true
                    }
                    _ => false,
                }
            };
            if still_playing {
                let _ = events.send(SurfaceEvent {
                    surface,
                    kind: SurfaceEventKind::Ended,
                });
            }
        });
    }
}

#[async_trait]
impl DisplayBackend for SimulatedDisplay {
    async fn configure(
        &self,
        surface: SurfaceId,
        source: &str,
        options: SurfaceOptions,
    ) -> KioskResult<()> {
        self.with_surface(surface, |s, log| {
            s.source = Some(source.to_string());
            s.muted = options.muted;
            s.looping = options.looping;
            s.playing = false;
            s.position_ms = 0;
            s.play_attempts = 0;
            s.loads += 1;
            if log {
                tracing::info!(%surface, source, muted = options.muted, looping = options.looping, "surface loaded");
            }
        })
    }

    async fn wait_ready(&self, surface: SurfaceId) -> KioskResult<()> {
        let (stalled, has_source) = {
            let state = self.state.lock();
            let has_source = state
                .surfaces
                .get(&surface)
                .is_some_and(|s| s.source.is_some());
            (state.stall_ready, has_source)
        };
        if !has_source {
            return Err(KioskError::Display(format!("{surface} has no source")));
        }
        if stalled {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn play(&self, surface: SurfaceId) -> Result<(), PlaybackError> {
        let (result, finish) = {
            let mut state = self.state.lock();
            let requires_mute = state.autoplay_requires_mute;
            let auto_finish = state.auto_finish;
            let log = state.log_activity;
            let broken = state.broken_sources.clone();
            let s = state
                .surfaces
                .get_mut(&surface)
                .ok_or_else(|| PlaybackError::Failed(format!("unknown surface {surface}")))?;
            s.play_attempts += 1;
            match s.source.clone() {
                None => (Err(PlaybackError::Failed("no source".into())), None),
                Some(src) if broken.contains(&src) => (
                    Err(PlaybackError::Failed(format!("cannot decode {src}"))),
                    None,
                ),
                Some(_) if requires_mute && !s.muted => (
                    Err(PlaybackError::Rejected("autoplay requires muted media".into())),
                    None,
                ),
                Some(src) => {
                    s.playing = true;
                    if log {
                        tracing::info!(%surface, source = %src, muted = s.muted, "surface playing");
                    }
                    let finish = match auto_finish {
                        Some(after) if !s.looping => Some((src, after)),
                        _ => None,
                    };
                    (Ok(()), finish)
                }
            }
        };
        if let Some((source, after)) = finish {
            self.schedule_finish(surface, source, after);
        }
        result
    }

    async fn set_muted(&self, surface: SurfaceId, muted: bool) -> KioskResult<()> {
        self.with_surface(surface, |s, _| s.muted = muted)
    }

    async fn halt(&self, surface: SurfaceId) -> KioskResult<()> {
        self.with_surface(surface, |s, log| {
            if log && s.source.is_some() {
                tracing::info!(%surface, "surface stopped");
            }
            s.playing = false;
            s.position_ms = 0;
            s.source = None;
            s.visible = false;
        })
    }

    async fn set_surface_visible(&self, surface: SurfaceId, visible: bool) -> KioskResult<()> {
        self.with_surface(surface, |s, _| s.visible = visible)
    }

    async fn show_layout(&self, layout: Layout) -> KioskResult<()> {
        let mut state = self.state.lock();
        if state.log_activity && state.layout != Some(layout) {
            tracing::info!(?layout, "layout shown");
        }
        state.layout = Some(layout);
        state.layout_history.push(layout);
        Ok(())
    }

    async fn show_overlay_image(&self, source: &str, corner: Corner) -> KioskResult<()> {
        let mut state = self.state.lock();
        if state.log_activity {
            tracing::info!(source, ?corner, "overlay image shown");
        }
        state.overlay = Some((source.to_string(), corner));
        Ok(())
    }

    async fn hide_overlay_image(&self) -> KioskResult<()> {
        self.state.lock().overlay = None;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finish_publishes_ended_event() {
        let display = SimulatedDisplay::new();
        let mut events = display.subscribe();
        display.finish(SurfaceId::Main);
        let event = events.recv().await.unwrap();
        assert_eq!(event.surface, SurfaceId::Main);
        assert_eq!(event.kind, SurfaceEventKind::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_finish_only_for_non_looping() {
        let display = SimulatedDisplay::new();
        display.set_auto_finish(Some(Duration::from_secs(5)));
        let mut events = display.subscribe();

        display
            .configure(
                SurfaceId::VersusA,
                "/static/loop.mp4",
                SurfaceOptions {
                    muted: true,
                    looping: true,
                },
            )
            .await
            .unwrap();
        display.play(SurfaceId::VersusA).await.unwrap();
        display
            .configure(SurfaceId::Main, "/static/once.mp4", SurfaceOptions::default())
            .await
            .unwrap();
        display.play(SurfaceId::Main).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.surface, SurfaceId::Main);
        assert!(display.surface(SurfaceId::VersusA).playing);
    }

    #[tokio::test]
    async fn wait_ready_requires_a_source() {
        let display = SimulatedDisplay::new();
        assert!(display.wait_ready(SurfaceId::Quad2).await.is_err());
    }

    #[tokio::test]
    async fn exclusivity_tracks_visible_surfaces() {
        let display = SimulatedDisplay::new();
        display.show_layout(Layout::Split).await.unwrap();
        display
            .set_surface_visible(SurfaceId::VersusA, true)
            .await
            .unwrap();
        assert!(display.is_exclusive());
        display
            .set_surface_visible(SurfaceId::Main, true)
            .await
            .unwrap();
        assert!(!display.is_exclusive());
    }
}
