//! Orchestrator behavior over a full load: event ordering, late joiners,
//! cache hits, error propagation, and exactly-once scheduling.

mod common;

use std::sync::Arc;

use common::{collect_until_terminal, options, race_key, scratch_cache, TestProvider};
use replay_core::{LoadingState, decode_frame};
use replay_server::session::load::schedule_load;
use replay_server::session::registry::SessionRegistry;
use replay_server::session::{ProgressEvent, Session};

fn assert_well_ordered(events: &[ProgressEvent]) {
    // Zero or more loading events with non-decreasing progress, then
    // exactly one terminal event.
    let (terminal, loading) = events.split_last().unwrap();
    assert!(terminal.state.is_terminal());
    assert!(loading.iter().all(|e| !e.state.is_terminal()));
    for pair in loading.windows(2) {
        assert!(
            pair[1].progress >= pair[0].progress,
            "progress regressed: {} then {}",
            pair[0].progress,
            pair[1].progress
        );
    }
}

#[tokio::test]
async fn fresh_load_emits_ordered_progress_then_ready() {
    let session = Session::new(race_key());
    let mut sub = session.subscribe();

    let provider = Arc::new(TestProvider::new());
    schedule_load(&session, provider.clone(), scratch_cache("fresh"), options());

    let events = collect_until_terminal(&mut sub).await;
    assert_well_ordered(&events);

    // Starts at zero...
    assert_eq!(events[0].progress, 0);
    assert_eq!(events[0].state, LoadingState::Loading);
    // ...ends ready at 100, preceded by the final loading event.
    let terminal = events.last().unwrap();
    assert_eq!(terminal.state, LoadingState::Ready);
    assert_eq!(terminal.progress, 100);
    let final_loading = &events[events.len() - 2];
    assert_eq!(final_loading.progress, 100);
    assert_eq!(final_loading.message, "Ready for playback");
    // At least three loading events on a fresh load.
    assert!(events.len() >= 4);

    assert_eq!(provider.open_count(), 1);
    assert_eq!(session.state(), LoadingState::Ready);
    assert!(session.frame_count() > 0);
}

#[tokio::test]
async fn two_subscribers_each_see_a_well_ordered_stream() {
    let session = Session::new(race_key());
    let mut first = session.subscribe();
    let mut second = session.subscribe();

    schedule_load(
        &session,
        Arc::new(TestProvider::new()),
        scratch_cache("two-subs"),
        options(),
    );

    let events_first = collect_until_terminal(&mut first).await;
    let events_second = collect_until_terminal(&mut second).await;

    assert_well_ordered(&events_first);
    assert_well_ordered(&events_second);
    // Both observed the same total ordering from the session.
    assert_eq!(events_first, events_second);
}

#[tokio::test]
async fn late_joiner_gets_exactly_the_synthetic_catchup() {
    let session = Session::new(race_key());
    {
        let mut sub = session.subscribe();
        schedule_load(
            &session,
            Arc::new(TestProvider::new()),
            scratch_cache("late"),
            options(),
        );
        collect_until_terminal(&mut sub).await;
    }

    // Session settled; a new subscriber sees the uniform catch-up pair.
    let mut late = session.subscribe();
    let events = collect_until_terminal(&mut late).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].state, LoadingState::Loading);
    assert_eq!(events[0].progress, 100);
    assert_eq!(events[0].message, "Ready for playback");
    assert_eq!(events[1].state, LoadingState::Ready);
    assert_eq!(events[1].progress, 100);
}

#[tokio::test]
async fn load_failure_reaches_present_and_future_subscribers() {
    let session = Session::new(race_key());
    let mut sub = session.subscribe();

    schedule_load(
        &session,
        Arc::new(TestProvider::failing()),
        scratch_cache("failure"),
        options(),
    );

    let events = collect_until_terminal(&mut sub).await;
    let terminal = events.last().unwrap();
    assert_eq!(terminal.state, LoadingState::Error);
    assert!(terminal.message.starts_with("Load failed:"));
    assert!(terminal.message.contains("upstream fetch exploded"));

    // A reconnect to the same session sees the same error.
    let mut reconnect = session.subscribe();
    let replayed = collect_until_terminal(&mut reconnect).await;
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].state, LoadingState::Error);
    assert!(replayed[0].message.contains("upstream fetch exploded"));
}

#[tokio::test]
async fn schedule_load_is_exactly_once() {
    let session = Session::new(race_key());
    let mut sub = session.subscribe();

    let provider = Arc::new(TestProvider::new());
    let cache = scratch_cache("once");
    schedule_load(&session, provider.clone(), cache.clone(), options());
    schedule_load(&session, provider.clone(), cache.clone(), options());
    schedule_load(&session, provider.clone(), cache, options());

    collect_until_terminal(&mut sub).await;
    assert_eq!(provider.open_count(), 1);
}

#[tokio::test]
async fn registry_reuses_sessions_and_refresh_restarts() {
    let registry = SessionRegistry::new();
    let provider = Arc::new(TestProvider::new());
    let cache = scratch_cache("registry");

    let (session, _) = registry.get_or_create(race_key(), false);
    let mut sub = session.subscribe();
    schedule_load(&session, provider.clone(), cache.clone(), options());
    collect_until_terminal(&mut sub).await;

    // Same key again: same instance, no new load possible.
    let (again, created) = registry.get_or_create(race_key(), false);
    assert!(!created);
    assert!(Arc::ptr_eq(&session, &again));
    schedule_load(&again, provider.clone(), cache.clone(), options());
    assert_eq!(provider.open_count(), 1);

    // Refresh destroys and re-creates; the replacement loads fresh
    // (through the cache, so the provider may stay untouched).
    let (fresh, created) = registry.get_or_create(race_key(), true);
    assert!(created);
    assert!(!Arc::ptr_eq(&session, &fresh));
    assert_eq!(fresh.state(), LoadingState::Init);
}

#[tokio::test]
async fn cache_hit_skips_the_pipeline_but_replays_the_sequence() {
    let cache = scratch_cache("cache-hit");

    // First load populates the cache.
    let warm_provider = Arc::new(TestProvider::new());
    {
        let session = Session::new(race_key());
        let mut sub = session.subscribe();
        schedule_load(&session, warm_provider.clone(), cache.clone(), options());
        collect_until_terminal(&mut sub).await;
    }
    assert_eq!(warm_provider.open_count(), 1);

    // Second session, same cache: ready without touching the provider.
    let cold_provider = Arc::new(TestProvider::new());
    let session = Session::new(race_key());
    let mut sub = session.subscribe();
    schedule_load(&session, cold_provider.clone(), cache, options());

    let events = collect_until_terminal(&mut sub).await;
    assert_well_ordered(&events);
    assert_eq!(events.last().unwrap().state, LoadingState::Ready);
    assert_eq!(cold_provider.open_count(), 0);
    assert!(session.frame_count() > 0);
}

#[tokio::test]
async fn frames_are_preencoded_and_decodable() {
    let session = Session::new(race_key());
    let mut sub = session.subscribe();
    schedule_load(
        &session,
        Arc::new(TestProvider::new()),
        scratch_cache("encoded"),
        options(),
    );
    collect_until_terminal(&mut sub).await;

    let encoded = session.encoded_frames().expect("frames should pre-encode");
    assert_eq!(encoded.len(), session.frame_count());

    let wire = decode_frame(&encoded[0]).unwrap();
    assert_eq!(wire.frame_index, 0);
    assert_eq!(wire.drivers.len(), 2);

    let last = decode_frame(encoded.last().unwrap()).unwrap();
    assert_eq!(last.frame_index as usize, encoded.len() - 1);
}

#[tokio::test]
async fn subscriber_set_is_empty_after_guards_drop() {
    let session = Session::new(race_key());
    let mut sub = session.subscribe();
    let other = session.subscribe();
    assert_eq!(session.subscriber_count(), 2);

    schedule_load(
        &session,
        Arc::new(TestProvider::new()),
        scratch_cache("guards"),
        options(),
    );
    collect_until_terminal(&mut sub).await;

    drop(sub);
    drop(other);
    assert_eq!(session.subscriber_count(), 0);
}
