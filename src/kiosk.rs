//! Kiosk runtime.
//!
//! `Kiosk` builds every component once and drives them from a single cooperative
//! loop:
//!
//! ```text
//! SensorPoller ──SensorSetObserved──▶ Debouncer ──set──▶ DisplayModeController
//!                                                          │
//! DisplayBackend ──SurfaceEvent──▶ BackgroundPlaylist ◀────┘ (Background entry)
//! ```
//!
//! The poller runs as its own task and queues observations on an mpsc channel.
//! The loop feeds them to the debouncer and starts a transition when a debounced
//! set is due and no transition is running. A set that became due while a
//! transition was running is picked up again on the next evaluation. A cycle
//! skipped on a transient backend failure is retried one poll interval later.

use crate::backend::KioskBackend;
use crate::config::KioskConfig;
use crate::controller::{DisplayMode, DisplayModeController, SteadyDisplay, TransitionOutcome};
use crate::display::{DisplayBackend, SurfaceEvent, SurfaceEventKind, SurfaceId, VideoElementPool};
use crate::playlist::BackgroundPlaylist;
use crate::prefs::PreferenceStore;
use crate::reporter::ActivationReporter;
use crate::sensors::{Debouncer, SensorPoller};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};

/// Capacity of the observation queue between poller and loop.
const OBSERVATION_QUEUE: usize = 32;

/// The assembled kiosk: every component plus the loop that drives them.
pub struct Kiosk {
    config: KioskConfig,
    backend: Arc<dyn KioskBackend>,
    display: Arc<dyn DisplayBackend>,
    controller: Arc<DisplayModeController>,
    playlist: Arc<BackgroundPlaylist>,
    reporter: Arc<ActivationReporter>,
}

impl Kiosk {
    /// Assemble the kiosk over a backend, a screen and a preference store.
    pub fn new(
        config: KioskConfig,
        backend: Arc<dyn KioskBackend>,
        display: Arc<dyn DisplayBackend>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        let pool = Arc::new(VideoElementPool::new(Arc::clone(&display)));
        let playlist = Arc::new(BackgroundPlaylist::new(
            Arc::clone(&backend),
            Arc::clone(&pool),
            Arc::clone(&prefs),
            config.playlist_config(),
        ));
        let reporter = Arc::new(ActivationReporter::new(Arc::clone(&backend)));
        let controller = Arc::new(DisplayModeController::new(
            Arc::clone(&backend),
            Arc::clone(&display),
            pool,
            Arc::clone(&playlist),
            Arc::clone(&reporter),
            prefs,
            config.controller_config(),
        ));
        Self {
            config,
            backend,
            display,
            controller,
            playlist,
            reporter,
        }
    }

    /// The display mode state machine.
    pub fn controller(&self) -> &Arc<DisplayModeController> {
        &self.controller
    }

    /// The background playlist.
    pub fn playlist(&self) -> &Arc<BackgroundPlaylist> {
        &self.playlist
    }

    /// The activation reporter.
    pub fn reporter(&self) -> &Arc<ActivationReporter> {
        &self.reporter
    }

    /// Run until `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// On exit the poller is stopped, a running transition is allowed to finish and
    /// every surface is stopped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(name = %self.config.application.name, "kiosk starting");
        let mut events = self.display.subscribe();
        self.controller.start().await;

        let (tx, mut observations) = mpsc::channel(OBSERVATION_QUEUE);
        let poller = SensorPoller::new(Arc::clone(&self.backend), self.config.poller_config());
        let poll_task = tokio::spawn(poller.run(tx));

        let mut debouncer = Debouncer::new(
            self.config.debounce_window(),
            self.config.sensors.immediate_single,
        );
        let poll_interval = self.config.poller_config().interval;
        let mut recheck = interval(poll_interval);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let refresh_period = self.config.playlist_refresh();
        let mut refresh = interval_at(Instant::now() + refresh_period, refresh_period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut transition: Option<Transition> = None;
        let mut hold_until: Option<Instant> = None;
        let mut events_open = true;

        loop {
            let running = transition.is_some();
            let deadline = debouncer.deadline(&self.controller.acted_set());
            let due = match (deadline, hold_until) {
                (Some(deadline), Some(hold)) => deadline.max(hold),
                (Some(deadline), None) => deadline,
                (None, _) => Instant::now(),
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(observed) = observations.recv() => {
                    debouncer.observe(observed.set, observed.at);
                    self.dispatch(&debouncer, &mut transition, hold_until);
                }
                _ = sleep_until(due), if deadline.is_some() && !running => {
                    self.dispatch(&debouncer, &mut transition, hold_until);
                }
                outcome = join_transition(&mut transition), if running => {
                    transition = None;
                    if outcome == Some(TransitionOutcome::Skipped) {
                        hold_until = Some(Instant::now() + poll_interval);
                        tracing::debug!(retry_in_ms = poll_interval.as_millis() as u64, "sensor change skipped, holding");
                    }
                    self.dispatch(&debouncer, &mut transition, hold_until);
                }
                _ = recheck.tick() => {
                    self.dispatch(&debouncer, &mut transition, hold_until);
                }
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.on_surface_event(event, &mut transition),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "surface events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("display event channel closed");
                        events_open = false;
                    }
                },
                _ = refresh.tick() => {
                    if self.controller.mode() == DisplayMode::Background && !running {
                        let playlist = Arc::clone(&self.playlist);
                        tokio::spawn(async move {
                            playlist.refresh().await;
                        });
                    }
                }
            }
        }

        tracing::info!("kiosk shutting down");
        poll_task.abort();
        if let Some(handle) = transition.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "transition task failed");
            }
        }
        self.controller.shutdown().await;
    }

    /// Start a transition for the debounced set, if one is due, none is running and
    /// no skipped cycle is being held off.
    fn dispatch(
        &self,
        debouncer: &Debouncer,
        transition: &mut Option<Transition>,
        hold_until: Option<Instant>,
    ) {
        if hold_until.is_some_and(|hold| Instant::now() < hold) {
            return;
        }
        let acted = self.controller.acted_set();
        let Some(set) = debouncer.poll(Instant::now(), &acted) else {
            return;
        };
        if transition.is_some() {
            tracing::trace!(set = %set, "transition running, deferring change");
            return;
        }
        let controller = Arc::clone(&self.controller);
        *transition = Some(tokio::spawn(async move {
            let outcome = controller.handle_sensor_change(set).await;
            match &outcome {
                TransitionOutcome::FellBack => tracing::info!("showing background after failed transition"),
                outcome => tracing::debug!(?outcome, "transition finished"),
            }
            Some(outcome)
        }));
    }

    fn on_surface_event(&self, event: SurfaceEvent, transition: &mut Option<Transition>) {
        let mode = self.controller.mode();
        match (&event.kind, mode) {
            (SurfaceEventKind::Ended, DisplayMode::Background) if event.surface == SurfaceId::Main => {
                self.playlist.on_ended();
            }
            (SurfaceEventKind::Error(reason), DisplayMode::Background)
                if event.surface == SurfaceId::Main =>
            {
                self.playlist.on_error(reason);
            }
            (SurfaceEventKind::Ended, DisplayMode::Single | DisplayMode::Versus)
                if self.config.playback.steady_display == SteadyDisplay::PlayOnce =>
            {
                if transition.is_some() {
                    return;
                }
                let controller = Arc::clone(&self.controller);
                *transition = Some(tokio::spawn(async move {
                    controller.return_to_background().await;
                    None
                }));
            }
            (SurfaceEventKind::Error(reason), _) => {
                tracing::warn!(surface = %event.surface, %mode, reason = %reason, "surface error");
            }
            (SurfaceEventKind::Ended, _) => {
                tracing::debug!(surface = %event.surface, %mode, "surface ended");
            }
        }
    }
}

/// A spawned transition. Sensor changes yield their outcome; play-once returns
/// yield `None`.
type Transition = JoinHandle<Option<TransitionOutcome>>;

/// Wait for the running transition, if any.
async fn join_transition(handle: &mut Option<Transition>) -> Option<TransitionOutcome> {
    match handle {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "transition task failed");
                None
            }
        },
        None => futures::future::pending().await,
    }
}
