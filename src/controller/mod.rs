//! Display mode state machine.
//!
//! `DisplayModeController` is constructed once at startup and owns the current
//! [`Composition`] and the last *acted-upon* sensor set. It is the only component
//! that changes which layout is visible.
//!
//! # Transitions
//!
//! Transitions are serialized by a try-lock: a sensor change that arrives while
//! another transition is in flight is dropped, not queued. The debounce stage keeps
//! re-forwarding the latest set until the acted-upon set catches up, so a dropped
//! change is re-evaluated on the next cycle.
//!
//! A sensor-triggered transition:
//! 1. reads `/system-config` (a failure skips the cycle and keeps the current mode)
//! 2. plans the target composition; an identical composition is a no-op
//! 3. fetches every video assignment (and the extra content for Triple) in parallel
//! 4. stops every surface and shows the target layout
//! 5. configures and starts the surfaces
//! 6. records the new composition and updates activation sessions
//!
//! Any failure in steps 3-5 falls back to Background, which cannot fail.

pub mod mode;

pub use mode::{
    plan, select, target_mode, Composition, DisplayMode, SelectionPolicy, SteadyDisplay,
};

use crate::backend::{media_url, ExtraContent, ExtraKind, KioskBackend};
use crate::display::{Corner, DisplayBackend, SurfaceId, SurfaceOptions, VideoElementPool};
use crate::error::KioskResult;
use crate::playlist::BackgroundPlaylist;
use crate::prefs::{PreferenceKey, PreferenceStore};
use crate::reporter::ActivationReporter;
use crate::sensors::{ActiveSensorSet, SensorId};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Controller policies.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Static-content root prepended to media paths.
    pub static_root: String,
    /// Sensor selection when more are active than fit.
    pub selection: SelectionPolicy,
    /// Loop or play-once for sensor videos.
    pub steady_display: SteadyDisplay,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            static_root: "/static".to_string(),
            selection: SelectionPolicy::default(),
            steady_display: SteadyDisplay::default(),
        }
    }
}

/// What [`DisplayModeController::handle_sensor_change`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Another transition was in flight.
    Dropped,
    /// The target equals the current composition.
    Unchanged,
    /// Transient failure before anything changed; the acted-upon set was restored.
    Skipped,
    /// The composition is on screen.
    Entered(Composition),
    /// The target could not be shown; the kiosk is in Background.
    FellBack,
}

#[derive(Debug, Default)]
struct ControllerState {
    current: Composition,
    acted: ActiveSensorSet,
}

/// A sensor video resolved to its media reference.
struct ResolvedVideo {
    sensor: SensorId,
    source: String,
}

/// Owns the current composition and performs every transition.
pub struct DisplayModeController {
    backend: Arc<dyn KioskBackend>,
    display: Arc<dyn DisplayBackend>,
    pool: Arc<VideoElementPool>,
    playlist: Arc<BackgroundPlaylist>,
    reporter: Arc<ActivationReporter>,
    prefs: Arc<dyn PreferenceStore>,
    config: ControllerConfig,
    transition: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    state: Mutex<ControllerState>,
}

impl DisplayModeController {
    /// Create a controller. Nothing is shown until [`start`](Self::start).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn KioskBackend>,
        display: Arc<dyn DisplayBackend>,
        pool: Arc<VideoElementPool>,
        playlist: Arc<BackgroundPlaylist>,
        reporter: Arc<ActivationReporter>,
        prefs: Arc<dyn PreferenceStore>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            backend,
            display,
            pool,
            playlist,
            reporter,
            prefs,
            config,
            transition: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Current display mode.
    pub fn mode(&self) -> DisplayMode {
        self.state.lock().current.mode
    }

    /// Current composition.
    pub fn composition(&self) -> Composition {
        self.state.lock().current.clone()
    }

    /// The last sensor set a transition was started for.
    pub fn acted_set(&self) -> ActiveSensorSet {
        self.state.lock().acted.clone()
    }

    /// Whether a transition holds the slot.
    pub fn is_transitioning(&self) -> bool {
        self.transition.try_lock().is_err()
    }

    /// Controller policies.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Claim the transition slot without waiting.
    fn try_begin(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.transition.try_lock().ok()
    }

    /// Enter the initial Background mode.
    pub async fn start(&self) {
        let Some(_guard) = self.try_begin() else {
            return;
        };
        self.state.lock().acted = ActiveSensorSet::empty();
        self.enter_background().await;
    }

    /// React to a debounced sensor-set change.
    pub async fn handle_sensor_change(&self, set: ActiveSensorSet) -> TransitionOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!(set = %set, "transition in flight, dropping sensor change");
            return TransitionOutcome::Dropped;
        };
        let previous = std::mem::replace(&mut self.state.lock().acted, set.clone());
        tracing::info!(set = %set, "sensor change");

        let target = if set.is_empty() {
            Composition::background()
        } else {
            match self.backend.system_config().await {
                Ok(config) => plan(&set, config.versus_mode, self.config.selection),
                Err(e) => {
                    tracing::warn!(error = %e, "could not read system config, skipping cycle");
                    self.state.lock().acted = previous;
                    return TransitionOutcome::Skipped;
                }
            }
        };

        if self.composition() == target {
            tracing::debug!(composition = %target, "composition unchanged");
            return TransitionOutcome::Unchanged;
        }

        if target.is_background() {
            self.enter_background().await;
            return TransitionOutcome::Entered(target);
        }

        match self.enter(&target).await {
            Ok(()) => {
                tracing::info!(composition = %target, "entered mode");
                TransitionOutcome::Entered(target)
            }
            Err(e) => {
                tracing::warn!(composition = %target, error = %e, "transition failed, falling back to background");
                self.enter_background().await;
                TransitionOutcome::FellBack
            }
        }
    }

    /// Return to Background while the sensor set is unchanged (play-once end).
    pub async fn return_to_background(&self) -> bool {
        let Some(_guard) = self.try_begin() else {
            return false;
        };
        if self.composition().is_background() {
            return false;
        }
        tracing::info!("sensor video finished, returning to background");
        self.enter_background().await;
        true
    }

    /// Stop everything and refuse further transitions. Open activation sessions are
    /// closed and reported.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.transition.lock().await;
        self.playlist.deactivate().await;
        self.pool.stop_all().await;
        if let Err(e) = self.display.hide_overlay_image().await {
            tracing::warn!(error = %e, "failed to hide overlay image");
        }
        self.state.lock().current = Composition::background();
        join_all(self.reporter.track(&[], Instant::now())).await;
        tracing::info!("display controller stopped");
    }

    /// Unconditional Background entry.
    async fn enter_background(&self) {
        self.clear_screen().await;
        if let Err(e) = self.display.show_layout(DisplayMode::Background.layout()).await {
            tracing::warn!(error = %e, "failed to show main layout");
        }
        self.state.lock().current = Composition::background();
        self.reporter.track(&[], Instant::now());

        let generation = self.playlist.activate();
        self.playlist.load().await;
        self.playlist.spawn_play(generation, Duration::ZERO);
        tracing::info!("entered background mode");
    }

    async fn clear_screen(&self) {
        self.playlist.deactivate().await;
        self.pool.stop_all().await;
        if let Err(e) = self.display.hide_overlay_image().await {
            tracing::warn!(error = %e, "failed to hide overlay image");
        }
    }

    async fn resolve_video(&self, sensor: SensorId) -> KioskResult<ResolvedVideo> {
        let assignment = self.backend.sensor_video(sensor).await?;
        let path = assignment.require_path()?;
        Ok(ResolvedVideo {
            sensor,
            source: media_url(&self.config.static_root, path),
        })
    }

    async fn fetch_extra(&self, mode: DisplayMode) -> ExtraContent {
        if mode != DisplayMode::Triple {
            return ExtraContent::default();
        }
        match self.backend.extra_content().await {
            Ok(extra) => extra,
            Err(e) => {
                tracing::warn!(error = %e, "extra content unavailable, leaving pane empty");
                ExtraContent::default()
            }
        }
    }

    async fn enter(&self, target: &Composition) -> KioskResult<()> {
        let (videos, extra) = tokio::join!(
            join_all(target.sensors.iter().map(|s| self.resolve_video(*s))),
            self.fetch_extra(target.mode),
        );
        let videos = videos.into_iter().collect::<KioskResult<Vec<_>>>()?;

        let corner = extra
            .position
            .as_deref()
            .and_then(Corner::parse)
            .unwrap_or_default();
        let surfaces = target.mode.sensor_surfaces(corner);
        let looping = self.config.steady_display.loops(target.mode);

        self.clear_screen().await;
        self.display.show_layout(target.mode.layout()).await?;

        for (surface, video) in surfaces.iter().zip(&videos) {
            let options = SurfaceOptions {
                muted: self.prefs.get(PreferenceKey::SensorMuted(video.sensor)),
                looping,
            };
            self.pool.configure(*surface, &video.source, options).await?;
            self.pool.reveal(*surface).await?;
        }

        let outcomes = join_all(surfaces.iter().map(|s| self.pool.play(*s))).await;
        let playing: Vec<SensorId> = videos
            .iter()
            .zip(outcomes)
            .filter(|(_, outcome)| outcome.is_playing())
            .map(|(video, _)| video.sensor)
            .collect();

        if target.mode == DisplayMode::Triple {
            self.show_extra(&extra, corner).await;
        }

        self.state.lock().current = target.clone();
        self.reporter.track(&playing, Instant::now());
        Ok(())
    }

    /// Fill the Triple-mode extra pane. Never fails the transition.
    async fn show_extra(&self, extra: &ExtraContent, corner: Corner) {
        let (Some(path), Some(kind)) = (extra.path.as_deref(), extra.kind) else {
            tracing::debug!("no extra content configured");
            return;
        };
        let source = media_url(&self.config.static_root, path);
        let pane = corner.surface_order()[3];
        match kind {
            ExtraKind::Image => {
                if let Err(e) = self.display.show_overlay_image(&source, corner).await {
                    tracing::warn!(error = %e, "failed to show extra image");
                }
            }
            ExtraKind::Video => {
                let options = SurfaceOptions {
                    muted: true,
                    looping: true,
                };
                if let Err(e) = self.pool.configure(pane, &source, options).await {
                    tracing::warn!(error = %e, "failed to configure extra video");
                    return;
                }
                if let Err(e) = self.pool.reveal(pane).await {
                    tracing::warn!(error = %e, "failed to reveal extra video");
                }
                self.pool.play(pane).await;
            }
        }
    }
}
