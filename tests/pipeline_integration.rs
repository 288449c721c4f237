//! End-to-end behaviour of the frame path
//!
//! These tests drive the public API the way the capture loop does:
//! - Normalization of raw landmark sets
//! - Strum detection and voice triggering
//! - Recognizer correction, staleness and total recognizer loss
//! - Replay of the bundled fixture against its expectations

use std::time::Duration;

use futures::future::{self, BoxFuture};
use tokio::runtime::Handle;

use air_guitar::arbitration::Arbitrator;
use air_guitar::audio::{TriggerRejection, VoiceScheduler};
use air_guitar::config::{AppConfig, RecognitionConfig};
use air_guitar::engine::{DesktopStubBackend, FrameOrchestrator};
use air_guitar::error::RecognitionError;
use air_guitar::fingering::FingeringMap;
use air_guitar::fixtures::synthetic::{open_hand, SessionBuilder};
use air_guitar::fixtures::{FixtureCatalog, FixtureProcessor};
use air_guitar::gesture::{StrumDetector, StrumDirection, StrumStore};
use air_guitar::landmarks::{
    Handedness, LandmarkNormalizer, LandmarkSet, Point3, SmoothingStore, POSE_VECTOR_LEN,
};
use air_guitar::recognition::{
    ConnectionState, InferenceRequest, ReconnectBackoff, RecognitionClient, RecognitionResult,
    RecognizerTransport, ServerMessage,
};

#[test]
fn test_wrist_at_origin_normalizes_to_zero_anchor() {
    let set = LandmarkSet::try_from(open_hand(Point3::default(), 0.1).as_slice()).unwrap();
    let mut store = SmoothingStore::new();
    let pose = LandmarkNormalizer::default().normalize(&set, Handedness::Left, 0.0, &mut store);

    assert_eq!(pose.values().len(), POSE_VECTOR_LEN);
    assert!(pose.values().iter().all(|v| v.is_finite()));
    assert_eq!(&pose.values()[0..3], &[0.0, 0.0, 0.0]);
}

#[test]
fn test_normalization_ignores_translation() {
    let normalizer = LandmarkNormalizer::default();
    let here = LandmarkSet::try_from(open_hand(Point3::new(0.2, 0.3, 0.0), 0.1).as_slice()).unwrap();
    let there =
        LandmarkSet::try_from(open_hand(Point3::new(0.7, 0.6, -0.2), 0.1).as_slice()).unwrap();

    let a = normalizer.normalize_unsmoothed(&here);
    let b = normalizer.normalize_unsmoothed(&there);
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-4, "{x} vs {y}");
    }
}

#[test]
fn test_fast_motion_emits_exactly_one_strum() {
    let detector = StrumDetector::default();
    let mut store = StrumStore::new();
    let hand = Handedness::Right;

    assert!(detector
        .update(hand, Point3::new(0.5, 0.1, 0.0), 0.0, &mut store)
        .is_none());
    let events: Vec<_> = [(0.3, 16.0), (0.5, 32.0), (0.7, 48.0)]
        .iter()
        .filter_map(|&(y, t)| detector.update(hand, Point3::new(0.5, y, 0.0), t, &mut store))
        .collect();

    assert_eq!(events.len(), 1);
    assert!((0.0..=1.0).contains(&events[0].velocity));
    assert_eq!(events[0].direction, StrumDirection::Down);
}

#[test]
fn test_activation_threshold_is_inclusive() {
    let arbitrator = Arbitrator::default();
    let result = |confidence: f32| RecognitionResult {
        chord_id: "C_Major".to_string(),
        confidence,
        fingering: FingeringMap::new([-1, 3, 2, 0, 1, 0]),
        override_notes: None,
        message: None,
        timestamp_ms: 100.0,
    };

    let at = arbitrator.arbitrate(Some(&result(0.85)), FingeringMap::open(), 150.0);
    assert!(at.correction_active);
    let below = arbitrator.arbitrate(Some(&result(0.8499)), FingeringMap::open(), 150.0);
    assert!(!below.correction_active);
    assert_eq!(below.fingering, FingeringMap::open());
}

#[test]
fn test_retrigger_within_debounce_is_noop() {
    let mut scheduler = VoiceScheduler::default();
    scheduler.trigger(2, 0, 0.8, 100.0).unwrap();
    let before = scheduler.voice(2).cloned();
    scheduler.drain_commands().for_each(drop);

    assert_eq!(
        scheduler.trigger(2, 0, 0.8, 110.0),
        Err(TriggerRejection::Debounced)
    );
    assert_eq!(scheduler.voice(2).cloned(), before);
    assert_eq!(scheduler.drain_commands().count(), 0);
}

#[test]
fn test_confident_recognition_overrides_geometric_fingering() {
    let session = SessionBuilder::new("confident")
        .fretting_hand(open_hand(Point3::new(0.3, 0.6, 0.0), 0.08))
        .tip_at(0.6, 0.1)
        .hold(4)
        .recognize("C_Major", 0.92)
        .stroke(StrumDirection::Down, 1, 0.05)
        .hold(2)
        .build();

    let report = FixtureProcessor::new(AppConfig::default())
        .run(&session)
        .unwrap();

    assert_eq!(report.strum_count, 1);
    assert!(report.final_correction_active);
    assert_eq!(report.final_fingering, FingeringMap::new([0, 3, 2, 0, 1, 0]));
    assert_eq!(report.final_chord_id.as_deref(), Some("C_Major"));
}

#[test]
fn test_bundled_fixture_meets_expectations() {
    let data = FixtureCatalog::default().load("strum_session", None).unwrap();
    let expectations = data.expectations.expect("bundled expectations");

    let report = FixtureProcessor::new(AppConfig::default())
        .run(&data.session)
        .unwrap();

    if let Err(diff) = expectations.verify(&report) {
        panic!("fixture mismatch: {}", diff.to_json());
    }
}

struct RefusingTransport;

impl RecognizerTransport for RefusingTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<(), RecognitionError>> {
        Box::pin(future::ready(Err(RecognitionError::TransportFailure {
            reason: "connection refused".to_string(),
        })))
    }

    fn request<'a>(
        &'a mut self,
        _request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<ServerMessage, RecognitionError>> {
        Box::pin(future::ready(Err(RecognitionError::ChannelClosed)))
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(future::ready(()))
    }

    fn name(&self) -> &'static str {
        "refusing"
    }
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_recognizer_degrades_to_geometric() {
    let config = AppConfig {
        recognition: RecognitionConfig {
            publish_interval_ms: 0.0,
            ..RecognitionConfig::default()
        },
        ..AppConfig::default()
    };
    let backoff = ReconnectBackoff::new(10, 40, 2, 0.0);
    let (handle, _task) = RecognitionClient::spawn_with_backoff(
        &Handle::current(),
        &config.recognition,
        Box::new(RefusingTransport),
        backoff,
    );

    let backend = DesktopStubBackend::started();
    let log = backend.log();
    let mut orchestrator = FrameOrchestrator::new(&config, handle, backend);

    let session = SessionBuilder::new("unreachable")
        .fretting_hand(open_hand(Point3::new(0.3, 0.6, 0.0), 0.08))
        .tip_at(0.6, 0.1)
        .hold(5)
        .stroke(StrumDirection::Down, 1, 0.05)
        .hold(20)
        .stroke(StrumDirection::Up, 1, 0.05)
        .hold(5)
        .build();

    let mut reports = Vec::new();
    for frame in &session.frames {
        reports.push(orchestrator.tick(frame));
        tokio::time::sleep(Duration::from_millis(16)).await;
    }

    assert!(reports.iter().all(|r| !r.correction_active));
    assert!(reports.iter().all(|r| r.fingering == FingeringMap::open()));
    assert_eq!(reports.iter().filter(|r| r.strum.is_some()).count(), 2);
    assert!(!log.triggered_strings().is_empty());
    assert_eq!(
        reports.last().unwrap().connectivity,
        ConnectionState::Offline
    );
}
