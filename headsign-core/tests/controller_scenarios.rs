//! End-to-end controller behavior over fake hardware

mod common;

use common::{Harness, EPOCH};
use headsign_core::scheduler::DisplaySlot;
use headsign_core::{
    ControllerConfig, DisplayFrame, LinkError, NewMessage, SchedulerState, StartError, StoreError,
    ValidationError,
};
use headsign_hal::{MemoryStorage, RecordKey};

fn started() -> Harness<MemoryStorage> {
    let mut harness = Harness::new(ControllerConfig::default(), MemoryStorage::new());
    harness.controller.start().unwrap();
    harness
}

#[test]
fn test_emergency_then_unshown_message() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("A", 50)).unwrap();
    h.tick_at(0);
    let b = h.at(5).insert(&NewMessage::new("B", 97)).unwrap();

    let report = h.tick_at(6);
    let step = report.scheduler.unwrap();
    assert_eq!(step.committed, Some(DisplaySlot::Message(a)));
    assert_eq!(step.started, Some(DisplaySlot::Message(b)));

    let c = h.at(10).insert(&NewMessage::new("C", 60)).unwrap();
    let report = h.tick_at(36);
    let step = report.scheduler.unwrap();
    assert_eq!(step.committed, Some(DisplaySlot::Message(b)));
    assert_eq!(step.started, Some(DisplaySlot::Message(c)));

    let store = h.controller.store();
    assert_eq!(store.get(a).unwrap().last_shown_at, Some(EPOCH + 4));
    assert_eq!(store.get(b).unwrap().last_shown_at, Some(EPOCH + 10));

    // Both committed showings reached the sign
    let texts = h.transport.texts();
    assert!(texts.iter().any(|t| t == "A"));
    assert!(texts.iter().any(|t| t == "B"));
}

#[test]
fn test_committed_text_reaches_sign_with_sparse_ticks() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("first", 20)).unwrap();
    let b = h.at(0).insert(&NewMessage::new("second", 20)).unwrap();
    h.tick_at(0);

    let report = h.tick_at(10);
    let step = report.scheduler.unwrap();
    assert_eq!(step.committed, Some(DisplaySlot::Message(a)));
    assert_eq!(step.started, Some(DisplaySlot::Message(b)));
    assert_eq!(h.controller.store().get(a).unwrap().show_count, 1);
    assert_eq!(h.transport.texts().last().map(String::as_str), Some("first"));
}

#[test]
fn test_no_commit_without_settled_frame_on_link() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("A", 50)).unwrap();
    h.tick_at(0);
    // Emergency lands while A is still being drawn
    let b = h.at(1).insert(&NewMessage::new("B", 97)).unwrap();
    let report = h.tick_at(2);
    assert!(report.scheduler.unwrap().preempted);

    h.tick_at(6);
    let store = h.controller.store();
    assert_eq!(store.get(a).unwrap().show_count, 0);
    assert_eq!(store.get(b).unwrap().show_count, 1);
    assert!(!h.transport.texts().iter().any(|t| t == "A"));
    assert_eq!(h.transport.texts().last().map(String::as_str), Some("B"));
}

#[test]
fn test_expired_message_never_candidate() {
    let mut h = started();
    let d = h.at(0).insert(&NewMessage::new("D", 40).with_ttl(10)).unwrap();
    h.tick_at(0);
    h.tick_at(4);

    let now = h.at(11).now();
    assert!(h.controller.store().get_candidates(now).all(|m| m.id != d));

    let report = h.tick_at(11);
    assert_eq!(report.scheduler.unwrap().purged, 1);
    assert!(h.controller.store().get(d).is_none());
}

#[test]
fn test_link_timeout_recovers_next_tick() {
    let mut h = started();
    h.at(0).insert(&NewMessage::new("Hello", 20)).unwrap();
    h.tick_at(0);

    h.transport.fail_next(1);
    let report = h.tick_at(2);
    assert_eq!(report.link_error, Some(LinkError::Timeout));
    assert_eq!(h.controller.link().health().frames_dropped, 1);

    h.transport.clear();
    let report = h.tick_at(3);
    assert!(report.frame_queued);
    assert_eq!(report.link_error, None);
    // Sent in full after the drop
    assert_eq!(h.transport.sent_with(b"l").len(), 1);
    assert_eq!(h.transport.sent_with(b"zM ").len(), 1);
}

#[test]
fn test_timeout_on_settled_frame_is_resent() {
    let mut h = started();
    h.at(0).insert(&NewMessage::new("Hello", 20)).unwrap();
    h.tick_at(0);

    h.transport.fail_next(1);
    let report = h.tick_at(4);
    assert!(report.link_error.is_some());
    assert!(!h.controller.renderer().in_transition());

    h.transport.clear();
    h.tick_at(5);
    assert_eq!(h.transport.texts(), vec!["Hello".to_string()]);
}

#[test]
fn test_show_count_once_per_transition() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("only one", 20)).unwrap();
    for t in 0..100 {
        h.tick_at(t);
    }
    let message = h.controller.store().get(a).unwrap();
    assert_eq!(message.show_count, 1);
    assert_eq!(h.controller.scheduler().currently_displayed(), Some(a));
}

#[test]
fn test_messages_alternate_outside_window() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("first", 20)).unwrap();
    let b = h.at(0).insert(&NewMessage::new("second", 20)).unwrap();
    for t in 0..120 {
        h.tick_at(t);
    }
    let store = h.controller.store();
    let (a, b) = (store.get(a).unwrap(), store.get(b).unwrap());
    assert!(a.show_count >= 2);
    assert!(b.show_count >= 2);
    assert!(a.show_count.abs_diff(b.show_count) <= 1);
}

#[test]
fn test_empty_store_shows_fallback() {
    let mut h = started();
    h.transport.clear();
    h.tick_at(0);
    h.tick_at(4);

    assert_eq!(h.controller.renderer().current(), &DisplayFrame::fallback());
    assert_eq!(h.transport.texts().last().map(String::as_str), Some("--.-"));
    assert_eq!(h.controller.scheduler().state(), SchedulerState::Displaying);
}

#[test]
fn test_splash_sent_on_start() {
    let mut h = Harness::new(ControllerConfig::default(), MemoryStorage::new());
    h.controller.start().unwrap();
    assert_eq!(
        h.transport.texts(),
        vec!["System initialization in progress...".to_string()]
    );
}

#[test]
fn test_pause_and_resume() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("a", 20)).unwrap();
    h.tick_at(0);
    h.tick_at(4);
    h.controller.pause();

    let b = h.at(5).insert(&NewMessage::new("b", 90)).unwrap();
    for t in 5..40 {
        let report = h.tick_at(t);
        assert_eq!(report.scheduler.unwrap().started, None);
    }
    assert_eq!(h.controller.scheduler().currently_displayed(), Some(a));
    assert!(h.sink.snapshots.borrow().last().unwrap().paused);

    h.controller.resume();
    let report = h.tick_at(40);
    assert_eq!(report.scheduler.unwrap().started, Some(DisplaySlot::Message(b)));
}

#[test]
fn test_removed_message_leaves_screen() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("gone soon", 20)).unwrap();
    h.tick_at(0);
    h.tick_at(4);
    h.controller.remove(a).unwrap();
    assert_eq!(h.controller.remove(a), Err(StoreError::NotFound));

    let report = h.tick_at(5);
    assert_eq!(report.scheduler.unwrap().started, Some(DisplaySlot::Fallback));
}

#[test]
fn test_ephemeral_shown_for_display_count_then_dropped() {
    let mut h = started();
    let stored = h.at(0).insert(&NewMessage::new("Next stop", 20)).unwrap();
    let notice = h
        .at(0)
        .insert_ephemeral(&NewMessage::new("Notice", 10), 2)
        .unwrap();

    let mut committed = 0;
    for t in 0..150 {
        let report = h.tick_at(t);
        if report.scheduler.and_then(|s| s.committed) == Some(DisplaySlot::Ephemeral(notice)) {
            committed += 1;
        }
    }
    assert_eq!(committed, 2);
    assert!(h.transport.texts().iter().any(|t| t == "Notice"));
    assert!(h.controller.store().get(stored).unwrap().show_count >= 1);
    assert!(h.controller.store().ephemeral().is_empty());

    // Never written to storage
    assert_eq!(h.controller.store().len(), 1);
    let snapshots = h.sink.snapshots.borrow();
    assert_eq!(snapshots[0].ephemeral_depth, 1);
    assert_eq!(snapshots.last().unwrap().ephemeral_depth, 0);
}

#[test]
fn test_cleared_ephemeral_never_shown() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("stored", 20)).unwrap();
    h.at(0)
        .insert_ephemeral(&NewMessage::new("urgent", 90), 0)
        .unwrap();
    h.controller.clear_ephemeral();

    let report = h.tick_at(0);
    assert_eq!(report.scheduler.unwrap().started, Some(DisplaySlot::Message(a)));
    assert!(!h.transport.texts().iter().any(|t| t == "urgent"));
}

#[test]
fn test_disabled_message_kept_out_of_rotation() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("on", 20)).unwrap();
    let b = h.at(0).insert(&NewMessage::new("off", 20)).unwrap();
    h.controller.set_enabled(b, false).unwrap();
    assert_eq!(h.controller.set_enabled(99, false), Err(StoreError::NotFound));

    for t in 0..60 {
        h.tick_at(t);
    }
    assert!(h.controller.store().get(b).is_some());
    assert_eq!(h.controller.store().get(b).unwrap().show_count, 0);
    assert!(h.controller.store().get(a).unwrap().show_count >= 1);
    assert!(!h.transport.texts().iter().any(|t| t == "off"));

    h.controller.set_enabled(b, true).unwrap();
    for t in 60..120 {
        h.tick_at(t);
    }
    assert!(h.controller.store().get(b).unwrap().show_count >= 1);
}

#[test]
fn test_insert_unique_rejects_duplicate_text() {
    let mut h = started();
    h.at(0).insert_unique(&NewMessage::new("same", 20)).unwrap();
    assert_eq!(
        h.controller.insert_unique(&NewMessage::new("same", 70)),
        Err(StoreError::Validation(ValidationError::Duplicate))
    );
}

#[test]
fn test_update_keeps_history() {
    let mut h = started();
    let a = h.at(0).insert(&NewMessage::new("old text", 20)).unwrap();
    h.tick_at(0);
    h.tick_at(4);

    h.at(6)
        .update(a, &NewMessage::new("new text", 30).with_line(7))
        .unwrap();
    let message = h.controller.store().get(a).unwrap();
    assert_eq!(message.text.as_str(), "new text");
    assert_eq!(message.line_number, 7);
    assert_eq!(message.show_count, 1);
    assert_eq!(message.created_at, EPOCH);
}

#[test]
fn test_corrupt_store_halts_start() {
    let storage = MemoryStorage::new();
    storage.put_raw(RecordKey::Index, &[0xFF; 7]);
    let mut h = Harness::new(ControllerConfig::default(), storage);
    assert_eq!(h.controller.start(), Err(StartError::StoreCorrupt));
    assert!(!h.controller.is_started());
}

#[test]
fn test_corrupt_store_wiped_when_allowed() {
    let storage = MemoryStorage::new();
    storage.put_raw(RecordKey::Index, &[0xFF; 7]);
    let config = ControllerConfig {
        wipe_database_on_boot: true,
        ..ControllerConfig::default()
    };
    let mut h = Harness::new(config, storage);
    let report = h.controller.start().unwrap();
    assert!(report.recovered);
    assert!(!report.wiped);
    assert_eq!(report.messages, 0);
    assert_eq!(h.at(0).insert(&NewMessage::new("fresh", 10)), Ok(1));
}

#[test]
fn test_self_check_on_startup() {
    let config = ControllerConfig {
        run_tests_on_startup: true,
        ..ControllerConfig::default()
    };
    let mut h = Harness::new(config, MemoryStorage::new());
    let report = h.controller.start().unwrap();
    let check = report.self_check.unwrap();
    assert!(check.all_passed());
    assert_eq!(check.passed, 4);
}

#[test]
fn test_store_failure_does_not_stop_ticks() {
    let storage = MemoryStorage::new();
    let mut h = Harness::new(ControllerConfig::default(), storage.clone());
    h.controller.start().unwrap();
    let a = h.at(0).insert(&NewMessage::new("a", 20)).unwrap();
    h.tick_at(0);

    storage.set_fail_writes(true);
    let report = h.tick_at(4);
    assert!(report.store_error.is_some());
    assert_eq!(h.controller.store().get(a).unwrap().show_count, 0);

    storage.set_fail_writes(false);
    let report = h.tick_at(5);
    assert_eq!(report.store_error, None);
    assert_eq!(h.controller.store().get(a).unwrap().show_count, 1);
}

#[test]
fn test_clock_sync_and_display_time() {
    let config = ControllerConfig {
        utc_offset_minutes: 60,
        ..ControllerConfig::default()
    };
    let mut h = Harness::new(config, MemoryStorage::new());
    h.controller.start().unwrap();
    assert!(h.controller.clock().is_synced());

    h.time.set_available(false);
    let report = h.tick_at(10);
    assert!(matches!(report.sync, Some(Err(_))));
    // Local time keeps running
    assert_eq!(report.now, EPOCH + 10);

    h.time.set_available(true);
    h.transport.clear();
    let report = h.tick_at(20);
    assert_eq!(report.sync, Some(Ok(EPOCH + 20)));
    // 1_700_000_020 is 22:13 UTC
    assert_eq!(h.transport.sent_with(b"u"), vec![b"u2313".to_vec()]);
}

#[test]
fn test_telemetry_published_every_tick() {
    let mut h = started();
    h.at(0).insert(&NewMessage::new("a", 20)).unwrap();
    h.tick_at(0);
    h.tick_at(1);

    let snapshots = h.sink.snapshots.borrow();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1].queue_depth, 1);
    assert_eq!(snapshots[1].state, SchedulerState::Transitioning);
    assert!(snapshots[1].clock_synced);
    assert!(!snapshots[1].link_degraded);
}

#[test]
fn test_raw_passthrough() {
    let mut h = started();
    h.transport.clear();
    h.controller.send_raw(b"xC1").unwrap();
    assert_eq!(h.transport.write_count(), 1);
    assert_eq!(h.transport.sent_with(b"xC"), vec![b"xC1".to_vec()]);
}

#[test]
fn test_invalid_config_rejected() {
    let config = ControllerConfig {
        time_sync_interval_s: 0,
        ..ControllerConfig::default()
    };
    let clock = common::TestClock::default();
    let result = headsign_core::Controller::new(
        config,
        MemoryStorage::new(),
        common::TestTransport::default(),
        common::TestTimeSource::new(&clock),
        clock.clone(),
        None::<headsign_core::NoTelemetry>,
    );
    assert!(matches!(
        result,
        Err(headsign_core::ConfigError::SyncInterval)
    ));
}
