//! Playback policy on top of a [`DisplayBackend`].
//!
//! The pool owns the playback mechanics of every surface. It never decides which
//! layout is visible; that belongs to the display controller.

use super::{DisplayBackend, PlaybackError, SurfaceId, SurfaceOptions};
use crate::error::KioskResult;
use std::sync::Arc;

/// Result of [`VideoElementPool::play`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playing with the configured mute setting.
    Playing,
    /// The first attempt was rejected; playing after forcing `muted`.
    PlayingMuted,
    /// Both attempts failed. The surface stays silent and still.
    NotPlaying,
}

impl PlayOutcome {
    /// Whether the surface ended up playing.
    pub fn is_playing(self) -> bool {
        !matches!(self, PlayOutcome::NotPlaying)
    }
}

/// Owns the kiosk's video surfaces.
pub struct VideoElementPool {
    display: Arc<dyn DisplayBackend>,
}

impl VideoElementPool {
    /// Pool over `display`.
    pub fn new(display: Arc<dyn DisplayBackend>) -> Self {
        Self { display }
    }

    /// Set source and attributes. Does not start playback.
    pub async fn configure(
        &self,
        surface: SurfaceId,
        source: &str,
        options: SurfaceOptions,
    ) -> KioskResult<()> {
        tracing::debug!(%surface, source, muted = options.muted, looping = options.looping, "configuring surface");
        self.display.configure(surface, source, options).await
    }

    /// Make a configured surface visible.
    pub async fn reveal(&self, surface: SurfaceId) -> KioskResult<()> {
        self.display.set_surface_visible(surface, true).await
    }

    /// Wait until `surface` can start playing.
    pub async fn wait_ready(&self, surface: SurfaceId) -> KioskResult<()> {
        self.display.wait_ready(surface).await
    }

    /// Start playback, muting and retrying once on rejection.
    ///
    /// Never fails: a surface that still refuses is logged and left silent.
    pub async fn play(&self, surface: SurfaceId) -> PlayOutcome {
        let first = match self.display.play(surface).await {
            Ok(()) => return PlayOutcome::Playing,
            Err(e) => e,
        };
        tracing::debug!(%surface, error = %first, "play rejected, retrying muted");

        if let Err(e) = self.display.set_muted(surface, true).await {
            tracing::warn!(%surface, error = %e, "could not mute surface for retry");
        }
        match self.display.play(surface).await {
            Ok(()) => PlayOutcome::PlayingMuted,
            Err(e) => {
                let reason = match &e {
                    PlaybackError::Rejected(_) => "autoplay still blocked",
                    PlaybackError::Failed(_) => "media failed",
                };
                tracing::warn!(%surface, error = %e, reason, "surface not playing");
                PlayOutcome::NotPlaying
            }
        }
    }

    /// Stop every surface: pause, rewind, release media and hide.
    ///
    /// Idempotent and safe from any state; individual failures are only logged.
    pub async fn stop_all(&self) {
        for surface in SurfaceId::ALL {
            if let Err(e) = self.display.halt(surface).await {
                tracing::warn!(%surface, error = %e, "failed to stop surface");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::SimulatedDisplay;

    fn pool() -> (Arc<SimulatedDisplay>, VideoElementPool) {
        let display = Arc::new(SimulatedDisplay::new());
        let pool = VideoElementPool::new(display.clone());
        (display, pool)
    }

    #[tokio::test]
    async fn plays_unmuted_when_allowed() {
        let (display, pool) = pool();
        pool.configure(
            SurfaceId::Main,
            "/static/a.mp4",
            SurfaceOptions {
                muted: false,
                looping: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(pool.play(SurfaceId::Main).await, PlayOutcome::Playing);
        let state = display.surface(SurfaceId::Main);
        assert!(state.playing);
        assert!(!state.muted);
    }

    #[tokio::test]
    async fn rejected_play_retries_muted() {
        let (display, pool) = pool();
        display.set_autoplay_requires_mute(true);
        pool.configure(SurfaceId::VersusA, "/static/a.mp4", SurfaceOptions::default())
            .await
            .unwrap();
        assert_eq!(pool.play(SurfaceId::VersusA).await, PlayOutcome::PlayingMuted);
        let state = display.surface(SurfaceId::VersusA);
        assert!(state.playing);
        assert!(state.muted);
        assert_eq!(state.play_attempts, 2);
    }

    #[tokio::test]
    async fn persistent_failure_is_soft() {
        let (display, pool) = pool();
        display.break_source("/static/broken.mp4");
        pool.configure(SurfaceId::Quad1, "/static/broken.mp4", SurfaceOptions::default())
            .await
            .unwrap();
        assert_eq!(pool.play(SurfaceId::Quad1).await, PlayOutcome::NotPlaying);
        assert!(!display.surface(SurfaceId::Quad1).playing);
    }

    #[tokio::test]
    async fn stop_all_is_idempotent() {
        let (display, pool) = pool();
        pool.configure(SurfaceId::Main, "/static/a.mp4", SurfaceOptions::default())
            .await
            .unwrap();
        pool.reveal(SurfaceId::Main).await.unwrap();
        pool.play(SurfaceId::Main).await;
        display.advance(SurfaceId::Main, 1500);

        pool.stop_all().await;
        pool.stop_all().await;

        for surface in SurfaceId::ALL {
            let state = display.surface(surface);
            assert!(!state.playing);
            assert!(!state.visible);
            assert_eq!(state.source, None);
            assert_eq!(state.position_ms, 0);
        }
    }
}
