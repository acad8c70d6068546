//! Adaptive paginated fetch-all.

mod common;

use common::*;
use core_library::{CacheFilter, Playlist, Song};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, SyncEvent};
use core_sync::{DomainCode, ListFilter, RemoteError, RemotePage, SyncError, SyncResult};
use tokio::sync::broadcast::Receiver;

fn playlists(count: usize) -> Vec<Playlist> {
    (0..count)
        .map(|i| Playlist::new(format!("p{}", i), format!("Playlist {}", i)))
        .collect()
}

fn settings(
    fetch_all_page_size: u32,
    min_page_size: u32,
    max_fetch_iterations: u32,
) -> SyncSettings {
    SyncSettings {
        fetch_all_page_size,
        min_page_size,
        max_fetch_iterations,
        ..SyncSettings::default()
    }
}

fn drain_sync_events(events: &mut Receiver<CoreEvent>) -> Vec<SyncEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Sync(event) = event {
            collected.push(event);
        }
    }
    collected
}

fn completion_is_partial(events: &[SyncEvent]) -> Option<bool> {
    events.iter().find_map(|event| match event {
        SyncEvent::Completed { partial, .. } => Some(*partial),
        _ => None,
    })
}

// ============================================================================
// Adaptive page size
// ============================================================================

#[tokio::test]
async fn test_page_size_halves_until_pages_succeed() {
    let h = Harness::with_settings(settings(100, 1, 64)).await;
    let all = playlists(37);
    h.playlists.on_list(paged(all.clone(), 10)).await;
    let mut events = h.event_bus.subscribe();

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);
    assert!(error_of(&results).is_none());

    let emitted = successes(&results);
    let (cache_data, network_data) = emitted.last().unwrap();
    assert_eq!(ids(network_data.as_ref().unwrap()), ids(&all));
    assert_eq!(ids(cache_data), ids(&all));

    let limits: Vec<u32> = h
        .playlists
        .list_calls()
        .await
        .iter()
        .map(|call| call.limit)
        .collect();
    assert_eq!(limits, vec![100, 50, 25, 12, 6, 6, 6, 6, 6, 6, 6]);

    let sync_events = drain_sync_events(&mut events);
    let reductions = sync_events
        .iter()
        .filter(|event| matches!(event, SyncEvent::PageSizeReduced { .. }))
        .count();
    assert_eq!(reductions, 4);
    assert_eq!(completion_is_partial(&sync_events), Some(false));
}

#[tokio::test]
async fn test_failure_at_minimum_page_size_degrades_to_partial() {
    let h = Harness::with_settings(settings(10, 5, 64)).await;
    h.caches
        .playlists
        .upsert_all(&[Playlist::new("stale", "Stale")])
        .await
        .unwrap();

    let serve = paged(playlists(40), 10);
    h.playlists
        .on_list(move |request| {
            if request.offset >= 20 {
                Err(RemoteError::Network("gateway timeout".to_string()))
            } else {
                serve(request)
            }
        })
        .await;
    let mut events = h.event_bus.subscribe();

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);
    assert!(error_of(&results).is_none());
    assert!(matches!(results.last(), Some(SyncResult::Loading(false))));

    let emitted = successes(&results);
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[1].1.as_ref().unwrap().len(), 20);

    // A partial listing never clears the family.
    let cached = h.caches.playlists.query(&CacheFilter::all()).await.unwrap();
    assert_eq!(cached.len(), 21);
    assert_eq!(cached[0].id, "stale");

    let limits: Vec<u32> = h
        .playlists
        .list_calls()
        .await
        .iter()
        .map(|call| call.limit)
        .collect();
    assert_eq!(limits, vec![10, 10, 10, 5]);
    assert_eq!(completion_is_partial(&drain_sync_events(&mut events)), Some(true));
}

#[tokio::test]
async fn test_failure_without_data_is_an_error() {
    let h = Harness::with_settings(settings(4, 1, 64)).await;
    h.playlists
        .on_list(|_| Err(RemoteError::Network("unreachable".to_string())))
        .await;

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);
    assert!(successes(&results).is_empty());
    assert!(matches!(error_of(&results), Some(SyncError::Network(_))));
    assert_eq!(h.playlists.list_calls().await.len(), 3);
}

#[tokio::test]
async fn test_iteration_cap_bounds_requests() {
    let h = Harness::with_settings(settings(2, 1, 3)).await;
    h.playlists
        .on_list(|request| {
            let items = (0..request.limit)
                .map(|i| {
                    let n = request.offset + i;
                    Playlist::new(format!("p{}", n), format!("Playlist {}", n))
                })
                .collect();
            Ok(RemotePage::new(items))
        })
        .await;

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);
    assert!(error_of(&results).is_none());

    let emitted = successes(&results);
    assert_eq!(emitted.last().unwrap().1.as_ref().unwrap().len(), 6);
    assert_eq!(h.playlists.list_calls().await.len(), 3);
}

#[tokio::test]
async fn test_reported_total_stops_paging() {
    let h = Harness::with_settings(settings(2, 1, 64)).await;
    let all = playlists(4);
    h.playlists
        .on_list(move |request| {
            let start = (request.offset as usize).min(all.len());
            let end = (start + request.limit as usize).min(all.len());
            Ok(RemotePage::new(all[start..end].to_vec()).with_total(4))
        })
        .await;

    let results = collect(h.catalog.playlists("", true)).await;
    assert!(error_of(&results).is_none());
    assert_eq!(h.playlists.list_calls().await.len(), 2);
}

// ============================================================================
// Terminal failures
// ============================================================================

#[tokio::test]
async fn test_domain_error_emits_collected_pages_then_error() {
    let h = Harness::with_settings(settings(2, 1, 64)).await;
    let serve = paged(playlists(10), 2);
    h.playlists
        .on_list(move |request| {
            if request.offset >= 2 {
                Err(RemoteError::domain(DomainCode::AccessDenied, "forbidden"))
            } else {
                serve(request)
            }
        })
        .await;

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);

    let emitted = successes(&results);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].1.as_ref().unwrap().len(), 2);
    assert!(matches!(
        error_of(&results),
        Some(SyncError::Domain {
            code: DomainCode::AccessDenied,
            ..
        })
    ));

    let cached = h.caches.playlists.query(&CacheFilter::all()).await.unwrap();
    assert_eq!(cached.len(), 2);
}

#[tokio::test]
async fn test_session_expiry_mid_listing_merges_nothing() {
    let h = Harness::with_settings(settings(2, 1, 64)).await;
    let serve = paged(playlists(10), 2);
    h.playlists
        .on_list(move |request| {
            if request.offset >= 2 {
                Err(RemoteError::domain(DomainCode::SessionExpired, "expired"))
            } else {
                serve(request)
            }
        })
        .await;

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);
    assert!(successes(&results).is_empty());
    assert!(error_of(&results).unwrap().is_session_expired());

    assert!(h
        .caches
        .playlists
        .query(&CacheFilter::all())
        .await
        .unwrap()
        .is_empty());
    assert!(h.sessions.current_session().await.unwrap().is_none());
}

// ============================================================================
// Family policy
// ============================================================================

#[tokio::test]
async fn test_full_playlist_listing_replaces_cache() {
    let h = Harness::new().await;
    h.caches
        .playlists
        .upsert_all(&[Playlist::new("old", "Deleted On Server")])
        .await
        .unwrap();
    h.playlists
        .returns(vec![Playlist::new("new", "Fresh")])
        .await;

    let results = collect(h.catalog.playlists("", true)).await;
    assert_emission_contract(&results);

    let cached = h.caches.playlists.query(&CacheFilter::all()).await.unwrap();
    assert_eq!(ids(&cached), vec!["new"]);
}

#[tokio::test]
async fn test_filtered_playlist_listing_merges() {
    let h = Harness::new().await;
    h.caches
        .playlists
        .upsert_all(&[Playlist::new("old", "Road Trip")])
        .await
        .unwrap();
    h.playlists
        .returns(vec![Playlist::new("new", "Fresh")])
        .await;

    collect(h.catalog.playlists("fresh", true)).await;

    let cached = h.caches.playlists.query(&CacheFilter::all()).await.unwrap();
    assert_eq!(ids(&cached), vec!["old", "new"]);
}

#[tokio::test]
async fn test_full_playlist_listing_keeps_recorded_songs() {
    let h = Harness::new().await;
    h.caches
        .playlists
        .upsert_all(&[
            Playlist {
                song_ids: vec!["s1".to_string(), "s2".to_string()],
                item_count: 2,
                ..Playlist::new("p1", "Favourites")
            },
            Playlist::new("old", "Deleted On Server"),
        ])
        .await
        .unwrap();
    h.caches
        .songs
        .upsert_all(&[Song::new("s1", "First"), Song::new("s2", "Second")])
        .await
        .unwrap();
    h.playlists
        .returns(vec![Playlist {
            item_count: 2,
            ..Playlist::new("p1", "Favourites")
        }])
        .await;

    collect(h.catalog.playlists("", true)).await;

    let cached = h.caches.playlists.query(&CacheFilter::all()).await.unwrap();
    assert_eq!(ids(&cached), vec!["p1"]);
    assert_eq!(cached[0].song_ids, vec!["s1", "s2"]);

    let songs = collect(h.catalog.playlist_songs("p1", false)).await;
    let emitted = successes(&songs);
    assert_eq!(emitted.len(), 1);
    assert_eq!(ids(&emitted[0].0), vec!["s1", "s2"]);
    assert!(h.songs.list_calls().await.is_empty());
}

// ============================================================================
// Related listings
// ============================================================================

#[tokio::test]
async fn test_playlist_songs_are_recorded_on_the_playlist() {
    let h = Harness::new().await;
    h.caches
        .playlists
        .upsert_all(&[Playlist::new("p1", "Favourites")])
        .await
        .unwrap();
    h.songs
        .returns(vec![
            Song::new("s3", "Third"),
            Song::new("s1", "First"),
            Song::new("s2", "Second"),
        ])
        .await;

    let results = collect(h.catalog.playlist_songs("p1", true)).await;
    assert_emission_contract(&results);
    assert!(error_of(&results).is_none());

    let calls = h.songs.list_calls().await;
    assert_eq!(calls[0].filter, ListFilter::Playlist("p1".to_string()));

    let playlist = h.caches.playlists.get_by_id("p1").await.unwrap().unwrap();
    assert_eq!(playlist.song_ids, vec!["s3", "s1", "s2"]);
    assert_eq!(playlist.item_count, 3);

    // Served from the recorded ids, in playlist order.
    let cached = collect(h.catalog.playlist_songs("p1", false)).await;
    let emitted = successes(&cached);
    assert_eq!(emitted.len(), 1);
    assert_eq!(ids(&emitted[0].0), vec!["s3", "s1", "s2"]);
    assert_eq!(h.songs.list_calls().await.len(), 1);
}
