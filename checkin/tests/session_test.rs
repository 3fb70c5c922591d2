//! End-to-end tests for the check-in session
//!
//! Each test drives a real store with scripted collaborators. Rate windows and
//! cooldowns read a `ManualClock`; display and submit timeouts run on tokio
//! time, paused where a test depends on them.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use checkin::authority::CheckInFailure;
use checkin::mocks::{CountingStats, RecordingFeedback, ScriptedAuthority};
use checkin::{
    CheckInEnvironment, CheckInSession, EventId, FeedbackKind, OutcomeKind, ProcessorSettings,
    RatePolicy, ScanOutcome, ScanPhase, ScanRefusal, SessionError,
};
use checkpoint_core::environment::Clock;
use checkpoint_runtime::StoreError;
use checkpoint_testing::{ManualClock, test_clock};
use std::sync::Arc;
use std::time::Duration;

const EVENT: EventId = EventId::new(12);

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    session: CheckInSession,
    authority: Arc<ScriptedAuthority>,
    feedback: Arc<RecordingFeedback>,
    stats: Arc<CountingStats>,
    clock: ManualClock,
}

impl Harness {
    fn new(settings: ProcessorSettings) -> Self {
        let authority = Arc::new(ScriptedAuthority::new());
        let feedback = Arc::new(RecordingFeedback::default());
        let stats = Arc::new(CountingStats::default());
        let clock = ManualClock::starting_at(test_clock().now());

        let session = CheckInSession::new(CheckInEnvironment::new(
            Arc::new(clock.clone()),
            authority.clone(),
            stats.clone(),
            feedback.clone(),
            settings,
        ));

        Self {
            session,
            authority,
            feedback,
            stats,
            clock,
        }
    }

    async fn ready() -> Self {
        Self::ready_with(ProcessorSettings::default()).await
    }

    async fn ready_with(settings: ProcessorSettings) -> Self {
        let harness = Self::new(settings);
        harness.session.select_event(EVENT).await.unwrap();
        harness
    }

    fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    async fn wait_for_submissions(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.authority.call_count() < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("submission never reached the authority");
    }
}

fn refused(result: Result<ScanOutcome, SessionError>) -> ScanRefusal {
    match result {
        Err(SessionError::Refused(reason)) => reason,
        other => panic!("expected a refusal, got {other:?}"),
    }
}

// ============================================================================
// Normalization and refusals
// ============================================================================

#[tokio::test]
async fn test_ticket_url_variants_submit_the_bare_code() {
    let harness = Harness::ready().await;

    for input in [
        "https://example.com/t/ABC123",
        "  https://example.com/t/ABC123  ",
        "https://example.com/t/ABC123/",
        "https://example.com/t/ABC123?ref=email",
    ] {
        harness.session.manual_entry(input).await.unwrap();
    }

    assert_eq!(harness.authority.submitted_codes(), vec!["ABC123"; 4]);
}

#[tokio::test]
async fn test_empty_input_is_refused_without_side_effects() {
    let harness = Harness::ready().await;

    let reason = refused(harness.session.manual_entry(" \t ").await);

    assert_eq!(reason, ScanRefusal::EmptyInput);
    assert_eq!(harness.authority.call_count(), 0);
    assert!(harness.session.recent_scans().await.is_empty());
    assert_eq!(harness.session.phase().await, ScanPhase::Idle);
    assert!(harness.feedback.signals().is_empty());
}

#[tokio::test]
async fn test_scans_require_a_selected_event() {
    let harness = Harness::new(ProcessorSettings::default());

    let reason = refused(harness.session.manual_entry("EVT-1").await);

    assert_eq!(reason, ScanRefusal::NoEventSelected);
    assert_eq!(harness.authority.call_count(), 0);
}

#[tokio::test]
async fn test_paused_shift_refuses_until_resumed() {
    let harness = Harness::ready().await;
    harness.authority.accept("EVT-1", "A. Popescu", "VIP");

    harness.session.pause_shift().await.unwrap();
    assert_eq!(
        refused(harness.session.manual_entry("EVT-1").await),
        ScanRefusal::ShiftPaused
    );

    harness.session.resume_shift().await.unwrap();
    let outcome = harness.session.manual_entry("EVT-1").await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Valid);
}

#[tokio::test]
async fn test_camera_cooldown_does_not_debounce_manual_entry() {
    let harness = Harness::ready().await;

    harness.session.scan_camera("CAM-1").await.unwrap();
    assert_eq!(
        refused(harness.session.scan_camera("CAM-2").await),
        ScanRefusal::CameraCooldown
    );

    harness.session.manual_entry("MAN-1").await.unwrap();

    harness.advance_secs(2);
    harness.session.scan_camera("CAM-3").await.unwrap();

    assert_eq!(
        harness.authority.submitted_codes(),
        vec!["CAM-1", "MAN-1", "CAM-3"]
    );
}

// ============================================================================
// Re-entrancy lock
// ============================================================================

#[tokio::test]
async fn test_second_scan_is_refused_while_first_is_in_flight() {
    let harness = Harness::ready().await;
    harness.authority.accept("FIRST", "A. Popescu", "VIP");
    harness.authority.hold();

    let session = harness.session.clone();
    let first = tokio::spawn(async move { session.scan_camera("FIRST").await });
    harness.wait_for_submissions(1).await;

    assert_eq!(
        refused(harness.session.manual_entry("SECOND").await),
        ScanRefusal::Busy
    );
    assert!(harness.session.phase().await.is_submitting());

    harness.authority.release();
    let outcome = first.await.unwrap().unwrap();

    assert_eq!(outcome.holder_name(), Some("A. Popescu"));
    assert_eq!(harness.authority.submitted_codes(), vec!["FIRST"]);
    assert_eq!(harness.session.recent_scans().await.len(), 1);
}

#[tokio::test]
async fn test_racing_camera_and_manual_scans_submit_once() {
    let harness = Harness::ready().await;
    harness.authority.hold();

    let camera = harness.session.clone();
    let manual = harness.session.clone();
    let camera = tokio::spawn(async move { camera.scan_camera("CAM").await });
    let manual = tokio::spawn(async move { manual.manual_entry("MAN").await });

    harness.wait_for_submissions(1).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !camera.is_finished() && !manual.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("the losing scan was never refused");
    harness.authority.release();

    let results = [camera.await.unwrap(), manual.await.unwrap()];
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(SessionError::Refused(ScanRefusal::Busy))))
        .count();

    assert_eq!(busy, 1);
    assert_eq!(harness.authority.call_count(), 1);
    assert_eq!(harness.session.recent_scans().await.len(), 1);
}

#[tokio::test]
async fn test_every_outcome_releases_the_lock() {
    let harness = Harness::ready().await;
    harness.authority.accept("OK", "A. Popescu", "VIP");
    harness
        .authority
        .fail("USED", CheckInFailure::from_legacy_message("Ticket already checked in"));

    for (code, kind) in [
        ("OK", OutcomeKind::Valid),
        ("USED", OutcomeKind::Duplicate),
        ("MISSING", OutcomeKind::Invalid),
    ] {
        let outcome = harness.session.manual_entry(code).await.unwrap();
        assert_eq!(outcome.kind(), kind);
        assert!(!harness.session.phase().await.is_submitting());

        harness.session.manual_entry("PROBE").await.unwrap();
    }
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test]
async fn test_legacy_messages_classify_as_duplicate_or_invalid() {
    let harness = Harness::ready().await;
    harness.authority.fail(
        "USED",
        CheckInFailure::from_legacy_message("Ticket already checked in at 14:02"),
    );
    harness.authority.fail(
        "XYZ",
        CheckInFailure::from_legacy_message("No ticket found for code XYZ"),
    );

    let duplicate = harness.session.manual_entry("USED").await.unwrap();
    assert_eq!(
        duplicate,
        ScanOutcome::Duplicate {
            message: "Ticket already checked in at 14:02".to_string(),
            previous_check_in_time: None,
            holder_name: None,
            ticket_type_name: None,
        }
    );

    let invalid = harness.session.manual_entry("XYZ").await.unwrap();
    assert_eq!(
        invalid,
        ScanOutcome::Invalid {
            message: "No ticket found for code XYZ".to_string()
        }
    );

    let kinds: Vec<_> = harness
        .feedback
        .signals()
        .iter()
        .map(|signal| signal.kind)
        .collect();
    assert_eq!(kinds, vec![FeedbackKind::Warning, FeedbackKind::Error]);

    let records = harness.session.recent_scans().await;
    assert_eq!(records[0].holder_name, "Invalid Ticket");
    assert_eq!(records[1].holder_name, "Unknown");
}

// ============================================================================
// Rate window and records
// ============================================================================

#[tokio::test]
async fn test_rate_counts_scans_strictly_inside_the_window() {
    let harness = Harness::ready().await;
    let start = harness.clock.now();

    harness.session.manual_entry("S0").await.unwrap();
    harness.advance_secs(10);
    harness.session.manual_entry("S10").await.unwrap();
    harness.advance_secs(55);
    harness.session.manual_entry("S65").await.unwrap();

    harness.clock.set(start + chrono::Duration::seconds(66));
    assert_eq!(harness.session.current_rate().await.unwrap(), 2);

    harness.clock.set(start + chrono::Duration::seconds(71));
    assert_eq!(harness.session.current_rate().await.unwrap(), 1);

    harness.clock.set(start + chrono::Duration::seconds(125));
    assert_eq!(harness.session.current_rate().await.unwrap(), 0);
}

#[tokio::test]
async fn test_accepted_only_policy_ignores_failures() {
    let harness = Harness::ready_with(ProcessorSettings {
        rate_policy: RatePolicy::AcceptedOnly,
        ..ProcessorSettings::default()
    })
    .await;
    harness.authority.accept("OK", "A. Popescu", "VIP");

    harness.session.manual_entry("OK").await.unwrap();
    harness.session.manual_entry("MISSING").await.unwrap();

    assert_eq!(harness.session.current_rate().await.unwrap(), 1);
    assert_eq!(harness.session.tally().await.total, 2);
}

#[tokio::test]
async fn test_recent_list_keeps_the_newest_ten() {
    let harness = Harness::ready().await;

    for n in 0..12 {
        harness.session.manual_entry(format!("T{n}")).await.unwrap();
    }

    let records = harness.session.recent_scans().await;
    assert_eq!(records.len(), 10);
    assert_eq!(records[0].ticket_code.as_str(), "T11");
    assert_eq!(records[9].ticket_code.as_str(), "T2");
}

#[tokio::test]
async fn test_end_to_end_valid_scan() {
    let harness = Harness::ready().await;
    harness.authority.accept("EVT2025-00042", "A. Popescu", "VIP");

    let outcome = harness
        .session
        .scan_camera("https://example.com/t/EVT2025-00042")
        .await
        .unwrap();

    assert_eq!(outcome.holder_name(), Some("A. Popescu"));
    assert_eq!(
        harness.session.phase().await.outcome(),
        Some(&ScanOutcome::Valid {
            holder_name: "A. Popescu".to_string(),
            ticket_type_name: "VIP".to_string(),
            seat_label: None,
        })
    );

    let records = harness.session.recent_scans().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ticket_code.as_str(), "EVT2025-00042");
    assert_eq!(records[0].kind, OutcomeKind::Valid);

    assert_eq!(harness.session.current_rate().await.unwrap(), 1);
    assert_eq!(harness.stats.requests(), vec![EVENT]);

    let signals = harness.feedback.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind, FeedbackKind::Success);
    assert_eq!(signals[0].vibration, Some(&[100][..]));
}

#[tokio::test]
async fn test_haptics_off_keeps_visual_feedback() {
    let harness = Harness::ready().await;

    harness.session.set_haptics(false).await.unwrap();
    harness.session.manual_entry("MISSING").await.unwrap();

    let signals = harness.feedback.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind, FeedbackKind::Error);
    assert_eq!(signals[0].vibration, None);
}

#[tokio::test]
async fn test_reset_and_event_switch_clear_bookkeeping() {
    let harness = Harness::ready().await;
    harness.session.manual_entry("A").await.unwrap();

    harness.session.reset().await.unwrap();
    assert!(harness.session.recent_scans().await.is_empty());
    assert_eq!(harness.session.tally().await.total, 0);
    assert_eq!(harness.session.current_rate().await.unwrap(), 0);

    harness.session.manual_entry("B").await.unwrap();
    harness.session.select_event(EVENT).await.unwrap();
    assert_eq!(harness.session.tally().await.total, 1);

    harness.session.select_event(EventId::new(99)).await.unwrap();
    assert_eq!(harness.session.tally().await.total, 0);
    assert_eq!(harness.session.event().await, Some(EventId::new(99)));
}

#[tokio::test]
async fn test_scan_from_previous_event_does_not_count_for_new_event() {
    let harness = Harness::ready().await;
    harness.authority.accept("OLD", "Old Event Holder", "General");
    harness.authority.hold();

    let session = harness.session.clone();
    let old = tokio::spawn(async move { session.manual_entry("OLD").await });
    harness.wait_for_submissions(1).await;

    let next = EventId::new(2);
    harness.session.select_event(next).await.unwrap();
    harness.authority.release();

    assert_eq!(old.await.unwrap().unwrap().kind(), OutcomeKind::Valid);
    assert_eq!(harness.session.event().await, Some(next));
    assert_eq!(harness.session.tally().await.total, 0);
    assert!(harness.session.recent_scans().await.is_empty());
    assert_eq!(harness.session.current_rate().await.unwrap(), 0);
    assert_eq!(harness.stats.requests(), vec![EVENT]);
}

#[tokio::test]
async fn test_ended_event_refuses_scans() {
    let harness = Harness::ready().await;

    harness.session.set_event_ended(true).await.unwrap();
    assert_eq!(
        refused(harness.session.scan_camera("EVT-1").await),
        ScanRefusal::EventEnded
    );
    assert_eq!(harness.authority.call_count(), 0);

    harness.session.set_event_ended(false).await.unwrap();
    harness.session.manual_entry("EVT-1").await.unwrap();
    assert_eq!(harness.authority.call_count(), 1);
}

// ============================================================================
// Timers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_outcome_clears_after_display_window() {
    let harness = Harness::ready().await;

    harness.session.manual_entry("A").await.unwrap();
    assert!(harness.session.phase().await.outcome().is_some());

    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert!(harness.session.phase().await.outcome().is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.session.phase().await, ScanPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stale_display_timer_does_not_clear_newer_outcome() {
    let harness = Harness::ready().await;
    harness.authority.accept("B", "B. Holder", "General");

    harness.session.manual_entry("A").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    harness.session.manual_entry("B").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    // The first timer has fired by now.
    assert_eq!(
        harness.session.phase().await.outcome().and_then(ScanOutcome::holder_name),
        Some("B. Holder")
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.session.phase().await, ScanPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_submission_resolves_as_invalid() {
    let harness = Harness::ready().await;
    harness.authority.stall();

    let outcome = harness.session.manual_entry("SLOW").await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Invalid);
    assert!(outcome.message().unwrap().contains("timed out"));
    assert!(!harness.session.phase().await.is_submitting());
    assert_eq!(harness.session.recent_scans().await.len(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_in_flight_scan_finishes_during_shutdown() {
    let harness = Harness::ready().await;
    harness.authority.accept("LAST", "A. Popescu", "VIP");
    harness.authority.hold();

    let session = harness.session.clone();
    let last = tokio::spawn(async move { session.manual_entry("LAST").await });
    harness.wait_for_submissions(1).await;

    let session = harness.session.clone();
    let shutdown = tokio::spawn(async move { session.shutdown(Duration::from_secs(5)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.authority.release();

    assert_eq!(last.await.unwrap().unwrap().kind(), OutcomeKind::Valid);
    shutdown.await.unwrap().unwrap();

    assert!(matches!(
        harness.session.manual_entry("LATE").await,
        Err(SessionError::Store(StoreError::ShutdownInProgress))
    ));
}

#[tokio::test]
async fn test_subscribers_see_completions() {
    let harness = Harness::ready().await;
    let mut actions = harness.session.subscribe();

    harness.session.manual_entry("MISSING").await.unwrap();

    let observed = actions.recv().await.unwrap();
    assert!(matches!(
        observed,
        checkin::ScanAction::ScanResolved { ref outcome, .. } if outcome.kind() == OutcomeKind::Invalid
    ));
}
