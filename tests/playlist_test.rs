//! Integration tests for the background playlist.

mod common;

use common::{harness, playlist, settle, source, test_config};
use std::time::Duration;
use vitrina::display::SurfaceId;
use vitrina::prefs::{PreferenceKey, PreferenceStore};

#[tokio::test(start_paused = true)]
async fn test_playlist_wraps_around() {
    let h = harness(test_config());
    h.kiosk.controller().start().await;
    settle().await;
    let bg = h.kiosk.playlist();
    assert_eq!(bg.len(), 3);

    let mut played = vec![h.display.surface(SurfaceId::Main).source];
    for _ in 0..3 {
        bg.on_ended().unwrap().await.unwrap();
        played.push(h.display.surface(SurfaceId::Main).source);
    }
    assert_eq!(
        played,
        vec![
            source("bg/10.mp4"),
            source("bg/11.mp4"),
            source("bg/12.mp4"),
            source("bg/10.mp4"),
        ]
    );
    assert_eq!(bg.current_index(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_playlist_follows_order_field() {
    let h = harness(test_config());
    let mut entries = playlist(&[1, 2, 3]);
    entries[0].order = 5;
    h.backend.set_playlist(entries);
    h.kiosk.controller().start().await;
    settle().await;

    let ids: Vec<i64> = h.kiosk.playlist().entries().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert_eq!(h.display.surface(SurfaceId::Main).source, source("bg/2.mp4"));
}

#[tokio::test(start_paused = true)]
async fn test_background_mute_preference() {
    let h = harness(test_config());
    h.prefs
        .set(PreferenceKey::BackgroundMuted(10), true)
        .unwrap();
    h.kiosk.controller().start().await;
    settle().await;
    assert!(h.display.surface(SurfaceId::Main).muted);

    h.kiosk.playlist().on_ended().unwrap().await.unwrap();
    assert!(!h.display.surface(SurfaceId::Main).muted);
}

#[tokio::test(start_paused = true)]
async fn test_broken_entry_is_skipped() {
    let h = harness(test_config());
    h.display.break_source("/static/bg/11.mp4");
    h.kiosk.controller().start().await;
    settle().await;

    // 11 fails, the retry after the error delay moves on to 12.
    h.kiosk.playlist().on_ended().unwrap().await.unwrap();
    assert_eq!(h.display.surface(SurfaceId::Main).source, source("bg/12.mp4"));
    assert!(h.display.surface(SurfaceId::Main).playing);
    assert_eq!(h.kiosk.playlist().current_index(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_media_error_advances_after_delay() {
    let h = harness(test_config());
    h.kiosk.controller().start().await;
    settle().await;
    let bg = h.kiosk.playlist();

    let retry = bg.on_error("decode error").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!bg.is_playing());
    retry.await.unwrap();
    assert!(bg.is_playing());
    assert_eq!(h.display.surface(SurfaceId::Main).source, source("bg/11.mp4"));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_starts_playback_once_content_arrives() {
    let h = harness(test_config());
    h.backend.set_playlist(Vec::new());
    h.kiosk.controller().start().await;
    settle().await;
    let bg = h.kiosk.playlist();
    assert!(bg.is_empty());
    assert_eq!(h.display.surface(SurfaceId::Main).source, None);

    h.backend.set_playlist(playlist(&[7]));
    bg.refresh().await.unwrap().await.unwrap();
    assert!(bg.is_playing());
    assert_eq!(h.display.surface(SurfaceId::Main).source, source("bg/7.mp4"));

    // Already playing: nothing to start.
    assert!(bg.refresh().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_events_ignored_while_inactive() {
    let h = harness(test_config());
    h.kiosk.controller().start().await;
    settle().await;
    h.kiosk.playlist().deactivate().await;

    assert!(h.kiosk.playlist().on_ended().is_none());
    assert!(h.kiosk.playlist().on_error("late error").is_none());
}
