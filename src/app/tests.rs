use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde_json::json;

use super::catalog::{
    Episode, SortKey, builtin_catalog, filter_episodes, format_published_display, parse_catalog,
};
use super::player::engine::{
    EngineEvent, EngineSpawner, HandleId, MediaEngine, translate_ipc_message,
};
use super::player::unlock::{LinkOpener, UnlockState, parse_unlocked_ids};
use super::player::{PlayDenied, PlayerController, SessionPhase, format_clock};
use super::tui::PlayerView;

#[derive(Clone, Default)]
struct EngineLog(Arc<Mutex<Vec<String>>>);

impl EngineLog {
    fn record(&self, entry: String) {
        self.0.lock().expect("lock engine log").push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().expect("lock engine log").clone()
    }

    fn index_of(&self, prefix: &str) -> Option<usize> {
        self.entries()
            .iter()
            .position(|entry| entry.starts_with(prefix))
    }
}

struct FakeEngine {
    handle: HandleId,
    log: EngineLog,
    fail_begin: bool,
}

impl MediaEngine for FakeEngine {
    fn begin(&mut self, media_url: &str, start_at_secs: f64) -> Result<()> {
        self.log
            .record(format!("begin#{} {media_url} @{start_at_secs}", self.handle));
        if self.fail_begin {
            return Err(anyhow!("engine refused to start"));
        }
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.log.record(format!("pause#{} {paused}", self.handle));
        Ok(())
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.log
            .record(format!("seek#{} {position_secs}", self.handle));
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.log.record(format!("mute#{} {muted}", self.handle));
        Ok(())
    }

    fn release(&mut self) {
        self.log.record(format!("release#{}", self.handle));
    }
}

struct FakeSpawner {
    log: EngineLog,
    fail_begin: bool,
}

impl EngineSpawner for FakeSpawner {
    fn spawn(
        &self,
        handle: HandleId,
        _events: std::sync::mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn MediaEngine>> {
        self.log.record(format!("spawn#{handle}"));
        Ok(Box::new(FakeEngine {
            handle,
            log: self.log.clone(),
            fail_begin: self.fail_begin,
        }))
    }
}

#[derive(Clone, Default)]
struct RecordingOpener {
    opened: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl LinkOpener for RecordingOpener {
    fn open(&self, url: &str) -> Result<()> {
        self.opened
            .lock()
            .expect("lock opened urls")
            .push(url.to_string());
        if self.fail {
            return Err(anyhow!("no browser available"));
        }
        Ok(())
    }
}

fn episode(id: u32, title: &str, description: &str, date: &str, media_url: &str) -> Episode {
    Episode {
        id,
        title: title.to_string(),
        description: description.to_string(),
        category: "Biology".to_string(),
        media_url: media_url.to_string(),
        published_at: date.to_string(),
        assessment_url: format!("https://example.com/assessment/episode{id}"),
    }
}

fn two_episode_catalog() -> Vec<Episode> {
    vec![
        episode(1, "Episode One", "first", "2025-01-20", "https://a/1.mp3"),
        episode(2, "Episode Two", "second", "2025-02-05", "https://a/2.mp3"),
    ]
}

fn controller_for(catalog: &[Episode], fail_begin: bool) -> (PlayerController, EngineLog) {
    let log = EngineLog::default();
    let controller = PlayerController::new(
        Box::new(FakeSpawner {
            log: log.clone(),
            fail_begin,
        }),
        catalog,
        Duration::from_secs(15),
        None,
    );
    (controller, log)
}

fn drive_event(controller: &mut PlayerController, event: EngineEvent) {
    controller
        .events_sender()
        .send(event)
        .expect("send engine event");
    controller.tick();
}

fn start_playing(controller: &mut PlayerController, ep: &Episode) -> HandleId {
    controller.request_play(ep).expect("play request accepted");
    let handle = controller.current_handle().expect("session handle");
    drive_event(
        controller,
        EngineEvent::MetadataLoaded {
            handle,
            duration_secs: 200.0,
        },
    );
    drive_event(
        controller,
        EngineEvent::TimeUpdate {
            handle,
            position_secs: 0.5,
        },
    );
    handle
}

#[test]
fn locked_play_request_changes_nothing() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);

    let denied = controller.request_play(&catalog[1]);
    assert_eq!(denied, Err(PlayDenied::EpisodeLocked));
    assert!(controller.session().is_none());
    assert_eq!(controller.unlocked_ids(), vec![1]);
    assert!(log.entries().is_empty());
}

#[test]
fn play_request_without_media_reports_unavailable() {
    let catalog = vec![episode(1, "Pending Episode", "soon", "2025-01-20", "")];
    let (mut controller, log) = controller_for(&catalog, false);

    let denied = controller.request_play(&catalog[0]);
    assert_eq!(denied, Err(PlayDenied::MediaUnavailable));
    assert!(controller.session().is_none());
    assert!(log.entries().is_empty());
}

#[test]
fn replacing_session_releases_old_handle_first() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    let opener = RecordingOpener::default();
    controller.complete_assessment(&catalog[0], &opener);

    controller
        .request_play(&catalog[0])
        .expect("first episode plays");
    controller
        .request_play(&catalog[1])
        .expect("second episode plays");

    let release_old = log.index_of("release#1").expect("old handle released");
    let spawn_new = log.index_of("spawn#2").expect("new handle spawned");
    assert!(
        release_old < spawn_new,
        "old handle must be released before the replacement spawns: {:?}",
        log.entries()
    );
    assert_eq!(controller.current_handle(), Some(2));
}

#[test]
fn assessment_unlocks_next_episode_once() {
    let catalog = two_episode_catalog();
    let (mut controller, _log) = controller_for(&catalog, false);
    let opener = RecordingOpener::default();

    let first = controller.complete_assessment(&catalog[0], &opener);
    assert_eq!(first.newly_unlocked, Some(2));
    assert_eq!(controller.unlocked_ids(), vec![1, 2]);

    let second = controller.complete_assessment(&catalog[0], &opener);
    assert_eq!(second.newly_unlocked, None);
    assert_eq!(controller.unlocked_ids(), vec![1, 2]);

    assert!(controller.request_play(&catalog[1]).is_ok());
}

#[test]
fn assessment_opens_the_link_on_every_call() {
    let catalog = two_episode_catalog();
    let (mut controller, _log) = controller_for(&catalog, false);
    let opener = RecordingOpener::default();

    controller.complete_assessment(&catalog[0], &opener);
    controller.complete_assessment(&catalog[0], &opener);

    let opened = opener.opened.lock().expect("lock opened urls").clone();
    assert_eq!(opened.len(), 2);
    assert!(opened[0].ends_with("/episode1"));
}

#[test]
fn failed_link_open_is_a_warning_not_an_error() {
    let catalog = two_episode_catalog();
    let (mut controller, _log) = controller_for(&catalog, false);
    let opener = RecordingOpener {
        fail: true,
        ..RecordingOpener::default()
    };

    let outcome = controller.complete_assessment(&catalog[0], &opener);
    assert_eq!(outcome.newly_unlocked, Some(2));
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("assessment link"));
}

#[test]
fn closed_session_resumes_at_saved_position() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);

    let handle = start_playing(&mut controller, &catalog[0]);
    drive_event(
        &mut controller,
        EngineEvent::TimeUpdate {
            handle,
            position_secs: 42.5,
        },
    );
    controller.close();
    assert_eq!(controller.saved_position(1), Some(42.5));

    controller
        .request_play(&catalog[0])
        .expect("replay accepted");
    assert!(
        log.entries()
            .iter()
            .any(|entry| entry.starts_with("begin#2") && entry.ends_with("@42.5")),
        "replay should seed the saved position: {:?}",
        log.entries()
    );
    let session = controller.session().expect("session exists");
    assert_eq!(session.position_secs, 42.5);
}

#[test]
fn seek_clamps_to_duration_bounds() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    start_playing(&mut controller, &catalog[0]);

    controller.seek_percent(150.0);
    assert_eq!(
        controller.session().expect("session").position_secs,
        200.0
    );

    controller.seek_percent(-10.0);
    assert_eq!(controller.session().expect("session").position_secs, 0.0);

    let seeks: Vec<String> = log
        .entries()
        .into_iter()
        .filter(|entry| entry.starts_with("seek#"))
        .collect();
    assert_eq!(seeks, vec!["seek#1 200", "seek#1 0"]);
}

#[test]
fn seek_is_a_noop_before_duration_is_known() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    controller
        .request_play(&catalog[0])
        .expect("play request accepted");

    controller.seek_percent(50.0);
    assert!(log.index_of("seek#").is_none());
    assert_eq!(controller.session().expect("session").position_secs, 0.0);
}

#[test]
fn search_matches_title_case_insensitively() {
    let catalog = vec![
        episode(
            1,
            "Introduction to Cell Biology",
            "the smallest unit of life",
            "2025-01-20",
            "https://a/1.mp3",
        ),
        episode(
            2,
            "Photosynthesis",
            "how plants make food",
            "2025-02-05",
            "https://a/2.mp3",
        ),
    ];

    let matched = filter_episodes(&catalog, "cell", SortKey::NewestFirst);
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, 1);
}

#[test]
fn search_matches_description_too() {
    let catalog = two_episode_catalog();
    let matched = filter_episodes(&catalog, "SECOND", SortKey::NewestFirst);
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, 2);
}

#[test]
fn empty_query_returns_the_whole_catalog() {
    let catalog = two_episode_catalog();
    assert_eq!(
        filter_episodes(&catalog, "", SortKey::OldestFirst).len(),
        2
    );
}

#[test]
fn unmatched_query_returns_empty_not_error() {
    let catalog = two_episode_catalog();
    assert!(filter_episodes(&catalog, "quantum", SortKey::NewestFirst).is_empty());
}

#[test]
fn sort_oldest_first_orders_by_publish_date() {
    let catalog = two_episode_catalog();
    let sorted = filter_episodes(&catalog, "", SortKey::OldestFirst);
    assert_eq!(sorted[0].published_at, "2025-01-20");

    let reversed = filter_episodes(&catalog, "", SortKey::NewestFirst);
    assert_eq!(reversed[0].published_at, "2025-02-05");
}

#[test]
fn sort_by_title_ignores_case() {
    let catalog = vec![
        episode(1, "zebra stripes", "", "2025-01-01", "https://a/1.mp3"),
        episode(2, "Antelope herds", "", "2025-01-02", "https://a/2.mp3"),
    ];
    let sorted = filter_episodes(&catalog, "", SortKey::TitleAscending);
    assert_eq!(sorted[0].id, 2);
}

#[test]
fn view_mode_switch_leaves_playback_running() {
    let catalog = two_episode_catalog();
    let (mut controller, _log) = controller_for(&catalog, false);
    let handle = start_playing(&mut controller, &catalog[0]);
    assert!(controller.session().expect("session").is_playing());

    let view = PlayerView::Modal.minimize();
    assert_eq!(view, PlayerView::Minimized);
    assert!(controller.session().expect("session").is_playing());

    drive_event(
        &mut controller,
        EngineEvent::TimeUpdate {
            handle,
            position_secs: 7.0,
        },
    );
    assert_eq!(controller.session().expect("session").position_secs, 7.0);
    assert_eq!(view.expand(), PlayerView::Modal);
}

#[test]
fn hidden_view_never_becomes_visible_by_reconciliation() {
    assert_eq!(PlayerView::Hidden.minimize(), PlayerView::Hidden);
    assert_eq!(PlayerView::Hidden.expand(), PlayerView::Hidden);
    assert!(!PlayerView::Hidden.is_visible());
    assert!(PlayerView::Minimized.is_visible());
}

#[test]
fn stale_handle_events_are_ignored_after_replacement() {
    let catalog = two_episode_catalog();
    let (mut controller, _log) = controller_for(&catalog, false);
    let opener = RecordingOpener::default();
    controller.complete_assessment(&catalog[0], &opener);

    let old_handle = start_playing(&mut controller, &catalog[0]);
    controller
        .request_play(&catalog[1])
        .expect("replacement accepted");

    drive_event(
        &mut controller,
        EngineEvent::TimeUpdate {
            handle: old_handle,
            position_secs: 99.0,
        },
    );
    drive_event(&mut controller, EngineEvent::Ended { handle: old_handle });

    let session = controller.session().expect("session exists");
    assert_eq!(session.episode.id, 2);
    assert_eq!(session.position_secs, 0.0);
    assert_eq!(session.phase, SessionPhase::Loading);
}

#[test]
fn load_timeout_fails_a_hung_session() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    controller
        .request_play(&catalog[0])
        .expect("play request accepted");

    controller.force_tick_at(Instant::now() + Duration::from_secs(16));

    let session = controller.session().expect("session exists");
    assert_eq!(session.phase, SessionPhase::Failed);
    assert!(
        session
            .last_error
            .as_deref()
            .is_some_and(|err| err.contains("did not load")),
        "unexpected error: {:?}",
        session.last_error
    );
    assert!(log.index_of("release#1").is_some());
}

#[test]
fn engine_start_failure_leaves_a_retryable_failed_session() {
    let catalog = two_episode_catalog();
    let (mut controller, _log) = controller_for(&catalog, true);

    controller
        .request_play(&catalog[0])
        .expect("denial applies only to locks and missing media");
    let session = controller.session().expect("session exists");
    assert_eq!(session.phase, SessionPhase::Failed);
    assert!(!session.is_playing());
    assert!(
        session
            .last_error
            .as_deref()
            .is_some_and(|err| err.contains("Failed to start playback"))
    );

    // Manual retry is allowed; the failed session is simply replaced.
    assert!(controller.request_play(&catalog[0]).is_ok());
}

#[test]
fn toggle_playback_flips_between_playing_and_paused() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    start_playing(&mut controller, &catalog[0]);

    controller.toggle_playback();
    assert_eq!(
        controller.session().expect("session").phase,
        SessionPhase::Paused
    );
    controller.toggle_playback();
    assert_eq!(
        controller.session().expect("session").phase,
        SessionPhase::Playing
    );
    assert!(log.entries().contains(&"pause#1 true".to_string()));
    assert!(log.entries().contains(&"pause#1 false".to_string()));
}

#[test]
fn ended_session_restarts_from_zero_on_toggle() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    let handle = start_playing(&mut controller, &catalog[0]);

    drive_event(&mut controller, EngineEvent::Ended { handle });
    let session = controller.session().expect("session exists");
    assert_eq!(session.phase, SessionPhase::Ended);
    assert_eq!(session.position_secs, 200.0);

    controller.toggle_playback();
    let session = controller.session().expect("session exists");
    assert_eq!(session.phase, SessionPhase::Playing);
    assert_eq!(session.position_secs, 0.0);
    assert!(log.entries().contains(&"seek#1 0".to_string()));
}

#[test]
fn toggle_playback_without_a_session_is_a_noop() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    controller.toggle_playback();
    controller.seek_percent(50.0);
    controller.toggle_mute();
    assert!(log.entries().is_empty());
}

#[test]
fn toggle_mute_mirrors_engine_state() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    start_playing(&mut controller, &catalog[0]);

    controller.toggle_mute();
    assert!(controller.session().expect("session").muted);
    controller.toggle_mute();
    assert!(!controller.session().expect("session").muted);
    assert!(log.entries().contains(&"mute#1 true".to_string()));
    assert!(log.entries().contains(&"mute#1 false".to_string()));
}

#[test]
fn mid_session_failure_surfaces_and_releases_the_handle() {
    let catalog = two_episode_catalog();
    let (mut controller, log) = controller_for(&catalog, false);
    let handle = start_playing(&mut controller, &catalog[0]);

    drive_event(
        &mut controller,
        EngineEvent::Failed {
            handle,
            message: "stream reset".to_string(),
        },
    );
    let session = controller.session().expect("session exists");
    assert_eq!(session.phase, SessionPhase::Failed);
    assert_eq!(session.last_error.as_deref(), Some("stream reset"));
    assert!(log.index_of("release#1").is_some());
}

#[test]
fn format_clock_handles_bad_and_boundary_input() {
    assert_eq!(format_clock(0.0), "0:00");
    assert_eq!(format_clock(65.4), "1:05");
    assert_eq!(format_clock(600.0), "10:00");
    assert_eq!(format_clock(-3.0), "0:00");
    assert_eq!(format_clock(f64::NAN), "0:00");
    assert_eq!(format_clock(f64::INFINITY), "0:00");
}

#[test]
fn parse_catalog_skips_malformed_entries_with_a_warning() {
    let raw = r#"[
        {"id": 1, "title": "Good", "content": "https://a/1.mp3", "created_at": "2025-01-20"},
        {"title": "No id"},
        {"id": 0, "title": "Zero id"},
        {"id": 2, "title": "Also good", "date": "2025-01-25"}
    ]"#;

    let parsed = parse_catalog(raw).expect("catalog parses");
    assert_eq!(parsed.episodes.len(), 2);
    assert_eq!(parsed.episodes[1].published_at, "2025-01-25");
    assert_eq!(parsed.warnings.len(), 1);
    assert!(parsed.warnings[0].contains("skipped 2"));
}

#[test]
fn parse_catalog_accepts_both_remote_field_spellings() {
    let raw = r#"{"episodes": [
        {"id": 3, "title": "Nested", "media_url": "https://a/3.mp3",
         "published_at": "2025-02-01", "assessment_url": "https://a/assess/3"}
    ]}"#;

    let parsed = parse_catalog(raw).expect("catalog parses");
    assert_eq!(parsed.episodes[0].media_url, "https://a/3.mp3");
    assert_eq!(parsed.episodes[0].assessment_url, "https://a/assess/3");
}

#[test]
fn parse_catalog_rejects_payloads_with_no_usable_entries() {
    assert!(parse_catalog("[]").is_none());
    assert!(parse_catalog(r#"[{"title": "no id"}]"#).is_none());
    assert!(parse_catalog("not json").is_none());
}

#[test]
fn builtin_catalog_seeds_the_first_episode_unlocked() {
    let catalog = builtin_catalog();
    assert!(catalog.len() >= 4);
    assert!(catalog.windows(2).all(|pair| pair[0].id < pair[1].id));

    let unlocks = UnlockState::seeded(&catalog);
    assert!(unlocks.is_unlocked(1));
    assert!(!unlocks.is_unlocked(2));
}

#[test]
fn unlock_state_only_grows() {
    let catalog = two_episode_catalog();
    let mut unlocks = UnlockState::seeded(&catalog);
    assert!(unlocks.unlock(2));
    assert!(!unlocks.unlock(2));
    unlocks.merge(vec![1, 3, 4]);
    assert_eq!(unlocks.ids(), vec![1, 2, 3, 4]);
}

#[test]
fn parse_unlocked_ids_reads_the_progress_response() {
    assert_eq!(
        parse_unlocked_ids(r#"{"unlocked": [1, 2, 3]}"#),
        Some(vec![1, 2, 3])
    );
    assert_eq!(parse_unlocked_ids(r#"{"unlocked": []}"#), None);
    assert_eq!(parse_unlocked_ids(r#"{"status": "ok"}"#), None);
    assert_eq!(parse_unlocked_ids("garbage"), None);
}

#[test]
fn ipc_duration_change_maps_to_metadata_event() {
    let message = json!({"event": "property-change", "name": "duration", "data": 1834.2});
    assert_eq!(
        translate_ipc_message(&message, 7),
        vec![EngineEvent::MetadataLoaded {
            handle: 7,
            duration_secs: 1834.2
        }]
    );
}

#[test]
fn ipc_eof_and_error_map_to_terminal_events() {
    let eof = json!({"event": "property-change", "name": "eof-reached", "data": true});
    assert_eq!(
        translate_ipc_message(&eof, 3),
        vec![EngineEvent::Ended { handle: 3 }]
    );

    let failed = json!({"event": "end-file", "reason": "error", "file_error": "no stream"});
    assert_eq!(
        translate_ipc_message(&failed, 3),
        vec![EngineEvent::Failed {
            handle: 3,
            message: "no stream".to_string()
        }]
    );
}

#[test]
fn ipc_unknown_messages_map_to_nothing() {
    assert!(translate_ipc_message(&json!({"request_id": 1, "error": "success"}), 1).is_empty());
    assert!(
        translate_ipc_message(
            &json!({"event": "property-change", "name": "eof-reached", "data": false}),
            1
        )
        .is_empty()
    );
    assert!(translate_ipc_message(&json!({"event": "end-file", "reason": "quit"}), 1).is_empty());
}

#[test]
fn published_display_formats_dates_and_keeps_raw_on_failure() {
    assert_eq!(format_published_display("2025-01-20"), "Jan 20, 2025");
    assert_eq!(format_published_display("someday"), "someday");
}
