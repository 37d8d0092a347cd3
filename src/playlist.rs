//! Idle-state background playlist.
//!
//! While no sensor is active the kiosk loops through the background playlist on the
//! `Main` surface. The playlist is infinite: a natural end or a playback failure
//! advances `index = (index + 1) % len` and plays the next entry.
//!
//! # Ownership of the `Main` surface
//!
//! The playlist only touches the display while it is *active* (the controller is in
//! Background mode). Every activation gets a new generation number; a play attempt
//! that started under an older generation gives up as soon as it notices. Leaving
//! Background goes through [`BackgroundPlaylist::deactivate`], which waits for any
//! attempt that is already configuring the surface, so a sensor transition never
//! races a background video for `Main`. An attempt still waiting for its media to
//! become ready is abandoned instead, so a stalled load never delays a transition.
//!
//! Overlapping `play` calls (an `ended` event racing a Background re-entry) collapse:
//! the second one returns [`PlayResult::Busy`] without touching the surface.

use crate::backend::{media_url, KioskBackend, PlaylistEntry};
use crate::display::{SurfaceId, SurfaceOptions, VideoElementPool};
use crate::prefs::{PreferenceKey, PreferenceStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

/// Timing for [`BackgroundPlaylist`].
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    /// Static-content root prepended to every `video_path`.
    pub static_root: String,
    /// Upper bound on the media-ready wait.
    pub ready_timeout: Duration,
    /// Pause between a natural end and the next entry.
    pub advance_delay: Duration,
    /// Pause before retrying after a failed entry.
    pub error_retry_delay: Duration,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            static_root: "/static".to_string(),
            ready_timeout: Duration::from_secs(3),
            advance_delay: Duration::from_millis(100),
            error_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of a single [`BackgroundPlaylist::play`] attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayResult {
    /// The entry at `index` is playing.
    Started { index: usize, entry: PlaylistEntry },
    /// Another attempt holds the surface; this one did nothing.
    Busy,
    /// Nothing to play.
    Empty,
    /// The playlist was deactivated or re-activated meanwhile.
    Stale,
    /// The entry could not be played; the index already moved on.
    Failed,
}

#[derive(Debug, Default)]
struct PlaylistState {
    entries: Vec<PlaylistEntry>,
    index: usize,
    playing: bool,
}

impl PlaylistState {
    fn advance(&mut self) {
        if !self.entries.is_empty() {
            self.index = (self.index + 1) % self.entries.len();
        }
    }
}

/// Clears the in-transition flag when an attempt ends, however it ends.
struct TransitionFlag<'a>(&'a AtomicBool);

impl Drop for TransitionFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The looping idle-state playlist shown on the `Main` surface.
pub struct BackgroundPlaylist {
    backend: Arc<dyn KioskBackend>,
    pool: Arc<VideoElementPool>,
    prefs: Arc<dyn PreferenceStore>,
    config: PlaylistConfig,
    state: Mutex<PlaylistState>,
    active: AtomicBool,
    generation: AtomicU64,
    in_transition: AtomicBool,
    lease: tokio::sync::Mutex<()>,
    superseded: Notify,
}

impl BackgroundPlaylist {
    /// Create an inactive, empty playlist.
    pub fn new(
        backend: Arc<dyn KioskBackend>,
        pool: Arc<VideoElementPool>,
        prefs: Arc<dyn PreferenceStore>,
        config: PlaylistConfig,
    ) -> Self {
        Self {
            backend,
            pool,
            prefs,
            config,
            state: Mutex::new(PlaylistState::default()),
            active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            in_transition: AtomicBool::new(false),
            lease: tokio::sync::Mutex::new(()),
            superseded: Notify::new(),
        }
    }

    /// Fetch the playlist and sort it by `order`.
    ///
    /// Returns `true` when the list changed, in which case the index is reset to 0.
    /// A failed or empty fetch keeps the previous list.
    pub async fn load(&self) -> bool {
        let mut entries = match self.backend.background_videos().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load background playlist, keeping previous");
                return false;
            }
        };
        if entries.is_empty() {
            tracing::debug!("backend returned an empty background playlist");
            return false;
        }
        entries.sort_by_key(|entry| entry.order);

        let mut state = self.state.lock();
        if state.entries == entries {
            return false;
        }
        tracing::info!(videos = entries.len(), "background playlist loaded");
        state.entries = entries;
        state.index = 0;
        true
    }

    /// Hand the `Main` surface to the playlist and restart from the first entry.
    pub fn activate(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(true, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.index = 0;
        state.playing = false;
        generation
    }

    /// Take the `Main` surface back.
    ///
    /// Returns once no play attempt is touching the display.
    pub async fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.superseded.notify_waiters();
        let _barrier = self.lease.lock().await;
        self.state.lock().playing = false;
    }

    /// Whether the playlist currently owns `Main`.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Current activation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Index of the entry that plays next (or is playing).
    pub fn current_index(&self) -> usize {
        self.state.lock().index
    }

    /// Whether a background entry is playing.
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Number of loaded entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no entries are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loaded entries in play order.
    pub fn entries(&self) -> Vec<PlaylistEntry> {
        self.state.lock().entries.clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_active() && self.generation() == generation
    }

    fn fail_current(&self, index: usize, reason: &str) -> PlayResult {
        let mut state = self.state.lock();
        state.playing = false;
        if state.index == index {
            state.advance();
        }
        tracing::warn!(index, next = state.index, reason, "background entry failed");
        PlayResult::Failed
    }

    /// Play the entry at the current index on the `Main` surface. Single attempt.
    pub async fn play(&self, generation: u64) -> PlayResult {
        if !self.is_current(generation) {
            return PlayResult::Stale;
        }
        if self.in_transition.swap(true, Ordering::SeqCst) {
            tracing::debug!("background play already in progress");
            return PlayResult::Busy;
        }
        let _flag = TransitionFlag(&self.in_transition);
        let _lease = self.lease.lock().await;
        if !self.is_current(generation) {
            return PlayResult::Stale;
        }

        let (index, entry, total) = {
            let mut state = self.state.lock();
            if state.entries.is_empty() {
                return PlayResult::Empty;
            }
            if state.index >= state.entries.len() {
                state.index = 0;
            }
            state.playing = false;
            (state.index, state.entries[state.index].clone(), state.entries.len())
        };

        tracing::info!(
            position = index + 1,
            total,
            video = %entry.video_path,
            "playing background video"
        );
        let options = SurfaceOptions {
            muted: self.prefs.get(PreferenceKey::BackgroundMuted(entry.id)),
            looping: false,
        };
        let source = media_url(&self.config.static_root, &entry.video_path);
        if let Err(e) = self.pool.configure(SurfaceId::Main, &source, options).await {
            tracing::warn!(error = %e, "could not configure background surface");
            return self.fail_current(index, "configure failed");
        }
        if let Err(e) = self.pool.reveal(SurfaceId::Main).await {
            tracing::warn!(error = %e, "could not reveal background surface");
        }

        // Registered before the generation check so a deactivation cannot slip between.
        let superseded = self.superseded.notified();
        tokio::pin!(superseded);
        superseded.as_mut().enable();
        if !self.is_current(generation) {
            return PlayResult::Stale;
        }
        let ready = tokio::select! {
            ready = timeout(self.config.ready_timeout, self.pool.wait_ready(SurfaceId::Main)) => ready,
            _ = &mut superseded => {
                tracing::debug!("background load superseded, discarding");
                return PlayResult::Stale;
            }
        };
        match ready {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "background video never became ready");
                return self.fail_current(index, "not ready");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.ready_timeout.as_millis() as u64,
                    "background video ready wait timed out, starting anyway"
                );
            }
        }
        if !self.is_current(generation) {
            return PlayResult::Stale;
        }

        if !self.pool.play(SurfaceId::Main).await.is_playing() {
            return self.fail_current(index, "playback failed");
        }
        self.state.lock().playing = true;
        PlayResult::Started { index, entry }
    }

    /// Play in the background, retrying failed entries until one starts or the
    /// generation ends.
    pub fn spawn_play(self: &Arc<Self>, generation: u64, delay: Duration) -> JoinHandle<()> {
        let playlist = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = delay;
            loop {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                match playlist.play(generation).await {
                    PlayResult::Failed => delay = playlist.config.error_retry_delay,
                    PlayResult::Empty => {
                        tracing::debug!("background playlist empty, surface left blank");
                        break;
                    }
                    PlayResult::Started { .. } | PlayResult::Busy | PlayResult::Stale => break,
                }
            }
        })
    }

    /// The current entry ended naturally.
    pub fn on_ended(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.is_active() {
            return None;
        }
        let generation = self.generation();
        {
            let mut state = self.state.lock();
            state.playing = false;
            state.advance();
        }
        Some(self.spawn_play(generation, self.config.advance_delay))
    }

    /// The `Main` surface reported a media error while the playlist owned it.
    pub fn on_error(self: &Arc<Self>, reason: &str) -> Option<JoinHandle<()>> {
        if !self.is_active() {
            return None;
        }
        let generation = self.generation();
        {
            let mut state = self.state.lock();
            tracing::warn!(index = state.index, reason, "background video error");
            state.playing = false;
            state.advance();
        }
        Some(self.spawn_play(generation, self.config.error_retry_delay))
    }

    /// Reload the playlist; start playing if Background is showing nothing.
    pub async fn refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.load().await;
        if self.is_active() && !self.is_playing() && !self.is_empty() {
            return Some(self.spawn_play(self.generation(), Duration::ZERO));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::display::SimulatedDisplay;
    use crate::prefs::MemoryPreferences;

    fn entry(id: i64, order: i64) -> PlaylistEntry {
        PlaylistEntry {
            id,
            video_path: format!("bg/{id}.mp4"),
            order,
        }
    }

    fn setup(entries: Vec<PlaylistEntry>) -> (Arc<MockBackend>, Arc<SimulatedDisplay>, Arc<BackgroundPlaylist>) {
        let backend = Arc::new(MockBackend::new());
        backend.set_playlist(entries);
        let display = Arc::new(SimulatedDisplay::new());
        let pool = Arc::new(VideoElementPool::new(display.clone()));
        let playlist = Arc::new(BackgroundPlaylist::new(
            backend.clone(),
            pool,
            Arc::new(MemoryPreferences::new()),
            PlaylistConfig::default(),
        ));
        (backend, display, playlist)
    }

    #[tokio::test]
    async fn load_sorts_by_order() {
        let (_, _, playlist) = setup(vec![entry(1, 2), entry(2, 0), entry(3, 1)]);
        assert!(playlist.load().await);
        let ids: Vec<i64> = playlist.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(!playlist.load().await);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_list() {
        let (backend, _, playlist) = setup(vec![entry(1, 0)]);
        playlist.load().await;
        backend.fail_background_videos(true);
        assert!(!playlist.load().await);
        assert_eq!(playlist.len(), 1);
    }

    #[tokio::test]
    async fn play_configures_main_without_loop() {
        let (_, display, playlist) = setup(vec![entry(4, 0)]);
        playlist.load().await;
        let generation = playlist.activate();
        let result = playlist.play(generation).await;
        assert!(matches!(result, PlayResult::Started { index: 0, .. }));

        let main = display.surface(SurfaceId::Main);
        assert_eq!(main.source.as_deref(), Some("/static/bg/4.mp4"));
        assert!(!main.looping);
        assert!(main.playing);
        assert!(main.visible);
    }

    #[tokio::test]
    async fn inactive_playlist_never_plays() {
        let (_, display, playlist) = setup(vec![entry(1, 0)]);
        playlist.load().await;
        let generation = playlist.activate();
        playlist.deactivate().await;
        assert_eq!(playlist.play(generation).await, PlayResult::Stale);
        assert_eq!(display.surface(SurfaceId::Main).source, None);
    }

    #[tokio::test]
    async fn empty_playlist_leaves_surface_blank() {
        let (_, display, playlist) = setup(vec![]);
        playlist.load().await;
        let generation = playlist.activate();
        assert_eq!(playlist.play(generation).await, PlayResult::Empty);
        assert_eq!(display.surface(SurfaceId::Main).source, None);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_play_is_busy() {
        let (_, display, playlist) = setup(vec![entry(1, 0)]);
        display.stall_ready(true);
        playlist.load().await;
        let generation = playlist.activate();

        let first = {
            let playlist = Arc::clone(&playlist);
            tokio::spawn(async move { playlist.play(generation).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(playlist.play(generation).await, PlayResult::Busy);

        // The stalled ready wait is bounded by the timeout.
        let result = first.await.unwrap();
        assert!(matches!(result, PlayResult::Started { .. }));
        assert_eq!(display.surface(SurfaceId::Main).play_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_abandons_stalled_load() {
        let (_, display, playlist) = setup(vec![entry(1, 0)]);
        display.stall_ready(true);
        playlist.load().await;
        let generation = playlist.activate();

        let attempt = {
            let playlist = Arc::clone(&playlist);
            tokio::spawn(async move { playlist.play(generation).await })
        };
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        playlist.deactivate().await;
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(attempt.await.unwrap(), PlayResult::Stale);
        assert_eq!(display.surface(SurfaceId::Main).play_attempts, 0);
    }

    #[tokio::test]
    async fn failed_entry_advances_index() {
        let (_, display, playlist) = setup(vec![entry(1, 0), entry(2, 1)]);
        display.break_source("/static/bg/1.mp4");
        playlist.load().await;
        let generation = playlist.activate();
        assert_eq!(playlist.play(generation).await, PlayResult::Failed);
        assert_eq!(playlist.current_index(), 1);
        assert!(matches!(
            playlist.play(generation).await,
            PlayResult::Started { index: 1, .. }
        ));
    }
}
