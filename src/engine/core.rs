//! FrameOrchestrator: the per-frame gesture-to-audio path.
//!
//! One `tick` per captured frame runs Normalizer -> Gesture Detector ->
//! Arbitrator -> Voice Scheduler synchronously, reads the recognition cadence
//! through a single snapshot, and hands voice commands to the audio backend.
//! A tick always runs to completion: component errors become skipped work,
//! log lines and telemetry, never a returned error.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::arbitration::{ArbitrationOutcome, Arbitrator, FingeringSource, GeometricFallback};
use crate::audio::{StringSet, VoiceScheduler};
use crate::config::AppConfig;
use crate::engine::backend::{AudioBackend, SystemTimeSource, TimeSource};
use crate::error::{log_audio_error, log_input_error, AudioError};
use crate::fingering::FingeringMap;
use crate::gesture::{StrumDetector, StrumEvent, StrumStore};
use crate::landmarks::{
    CaptureFrame, Handedness, LandmarkNormalizer, LandmarkSet, PoseVector, SmoothingStore,
};
use crate::managers::BroadcastChannelManager;
use crate::recognition::{ConnectionState, RecognitionSource};
use crate::telemetry::{self, DiagnosticError};

/// Everything a single tick decided
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub fingering: FingeringMap,
    pub correction_active: bool,
    pub source: FingeringSource,
    pub chord_id: Option<String>,
    pub confidence: Option<f32>,
    pub low_confidence_warning: bool,
    /// Strum detected on this frame
    pub strum: Option<StrumEvent>,
    /// Strings whose trigger was accepted on this frame
    pub triggered: StringSet,
    pub connectivity: ConnectionState,
    pub strumming_hand_tracked: bool,
    pub fretting_hand_tracked: bool,
    /// A fretting-hand vector was handed to the recognizer
    pub recognition_offered: bool,
    pub tick_ms: f32,
}

/// Read-only state handed to the presentation collaborator
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PresentationSnapshot {
    pub timestamp_ms: f64,
    pub fingering: FingeringMap,
    pub correction_active: bool,
    pub chord_id: Option<String>,
    pub last_strum: Option<StrumEvent>,
    pub connectivity: ConnectionState,
    pub low_confidence_warning: bool,
    pub sounding: StringSet,
}

/// Owns all per-hand state and drives the frame cadence
pub struct FrameOrchestrator<B: AudioBackend, R: RecognitionSource> {
    strumming_hand: Handedness,
    normalizer: LandmarkNormalizer,
    smoothing: SmoothingStore,
    detector: StrumDetector,
    strums: StrumStore,
    recognition: R,
    staleness_window_ms: f64,
    arbitrator: Arbitrator,
    fallback: GeometricFallback,
    scheduler: VoiceScheduler,
    backend: B,
    broadcasts: Option<BroadcastChannelManager>,
    time_source: Arc<dyn TimeSource>,
    frame_id: u64,
    last_timestamp_ms: f64,
    last_strum: Option<StrumEvent>,
    last_correction: bool,
    last_connectivity: Option<ConnectionState>,
    presentation: PresentationSnapshot,
}

impl<B: AudioBackend, R: RecognitionSource> FrameOrchestrator<B, R> {
    pub fn new(config: &AppConfig, recognition: R, backend: B) -> Self {
        let staleness_window_ms = config.recognition.staleness_window_ms;
        tracing::info!(
            "[FrameOrchestrator] Strumming with {:?} hand, {} audio backend",
            config.hands.strumming_hand,
            backend.name()
        );
        Self {
            strumming_hand: config.hands.strumming_hand,
            normalizer: LandmarkNormalizer::new(&config.normalizer),
            smoothing: SmoothingStore::new(),
            detector: StrumDetector::new(&config.gesture),
            strums: StrumStore::new(),
            recognition,
            staleness_window_ms,
            arbitrator: Arbitrator::new(&config.arbitration, staleness_window_ms),
            fallback: GeometricFallback::from_config(&config.arbitration),
            scheduler: VoiceScheduler::new(&config.voice),
            backend,
            broadcasts: None,
            time_source: Arc::new(SystemTimeSource::default()),
            frame_id: 0,
            last_timestamp_ms: 0.0,
            last_strum: None,
            last_correction: false,
            last_connectivity: None,
            presentation: PresentationSnapshot::default(),
        }
    }

    /// Publish presentation snapshots and strums through `broadcasts`.
    pub fn with_broadcasts(mut self, broadcasts: BroadcastChannelManager) -> Self {
        self.broadcasts = Some(broadcasts);
        self
    }

    /// Measure tick durations with `time_source` instead of the system clock.
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    // ========================================================================
    // FRAME CADENCE
    // ========================================================================

    /// Process one captured frame.
    pub fn tick(&mut self, frame: &CaptureFrame) -> FrameReport {
        let started = self.time_source.now();
        let now_ms = frame.timestamp_ms;
        self.frame_id += 1;
        self.last_timestamp_ms = now_ms;

        let fretting_hand = self.strumming_hand.other();
        let mut tracked = [Handedness::Left; 2];
        let mut tracked_count = 0;
        let mut fretting_pose: Option<PoseVector> = None;
        let mut strum: Option<StrumEvent> = None;

        for hand in [Handedness::Left, Handedness::Right] {
            let Some(observation) = frame.hand(hand) else {
                continue;
            };
            let set = match LandmarkSet::try_from(observation) {
                Ok(set) => set,
                Err(err) => {
                    // Treated as not detected: its state is dropped below.
                    log_input_error(&err, "FrameOrchestrator::tick");
                    telemetry::hub().record_input_rejection(hand, &err);
                    continue;
                }
            };
            tracked[tracked_count] = hand;
            tracked_count += 1;

            let pose = self
                .normalizer
                .normalize(&set, hand, now_ms, &mut self.smoothing);
            if hand == fretting_hand {
                fretting_pose = Some(pose);
            }
            if hand == self.strumming_hand {
                strum = self
                    .detector
                    .update(hand, set.index_tip(), now_ms, &mut self.strums);
            }
        }

        let present = &tracked[..tracked_count];
        self.smoothing.retain_present(present);
        self.strums.retain_present(present);

        let recognition_offered = match &fretting_pose {
            Some(pose) => self.recognition.offer(pose, self.frame_id),
            None => false,
        };

        self.recognition.advance_to(now_ms);
        let snapshot = self.recognition.snapshot();
        let outcome = self.arbitrator.arbitrate(
            snapshot.usable_result(now_ms, self.staleness_window_ms),
            self.fallback.fingering(),
            now_ms,
        );
        self.note_outcome(&outcome);
        self.note_connectivity(snapshot.state);

        let mut triggered = StringSet::EMPTY;
        if let Some(event) = strum {
            telemetry::hub().record_strum(&event);
            if let Some(broadcasts) = &self.broadcasts {
                broadcasts.publish_strum(event);
            }
            triggered = self.scheduler.strum(&event, &outcome.fingering, now_ms);
            self.last_strum = Some(event);
        }

        self.scheduler.advance(now_ms);
        self.flush_commands(now_ms);

        let tick_ms = elapsed_ms(started, self.time_source.now());
        telemetry::hub().record_frame_latency(tick_ms);

        self.presentation = PresentationSnapshot {
            timestamp_ms: now_ms,
            fingering: outcome.fingering,
            correction_active: outcome.correction_active,
            chord_id: outcome.chord_id.clone(),
            last_strum: self.last_strum,
            connectivity: snapshot.state,
            low_confidence_warning: outcome.low_confidence_warning,
            sounding: self.scheduler.sounding(),
        };
        if let Some(broadcasts) = &self.broadcasts {
            broadcasts.publish_presentation(&self.presentation);
        }

        FrameReport {
            frame_id: self.frame_id,
            timestamp_ms: now_ms,
            fingering: outcome.fingering,
            correction_active: outcome.correction_active,
            source: outcome.source,
            chord_id: outcome.chord_id,
            confidence: outcome.confidence,
            low_confidence_warning: outcome.low_confidence_warning,
            strum,
            triggered,
            connectivity: snapshot.state,
            strumming_hand_tracked: present.contains(&self.strumming_hand),
            fretting_hand_tracked: present.contains(&fretting_hand),
            recognition_offered,
            tick_ms,
        }
    }

    fn note_outcome(&mut self, outcome: &ArbitrationOutcome) {
        if outcome.correction_active != self.last_correction {
            tracing::debug!(
                "[FrameOrchestrator] Correction {} ({:?})",
                if outcome.correction_active { "on" } else { "off" },
                outcome.chord_id
            );
            telemetry::hub().record_correction(outcome.correction_active, outcome.chord_id.as_deref());
            self.last_correction = outcome.correction_active;
        }
    }

    fn note_connectivity(&mut self, state: ConnectionState) {
        if self.last_connectivity != Some(state) {
            if state == ConnectionState::Offline {
                tracing::info!("[FrameOrchestrator] Recognizer offline, geometric fingering only");
            }
            self.last_connectivity = Some(state);
        }
    }

    fn flush_commands(&mut self, now_ms: f64) {
        for command in self.scheduler.drain_commands() {
            if let Err(err) = self.backend.submit(command, now_ms) {
                log_audio_error(&err, "FrameOrchestrator::flush_commands");
                let code = if err.is_transient() {
                    DiagnosticError::QueueBackpressure
                } else {
                    DiagnosticError::AudioBackend
                };
                telemetry::hub().record_error(code, err.to_string());
            }
        }
        if let Some(percent) = self.backend.queue_occupancy_percent() {
            telemetry::hub().record_queue_occupancy("voice_commands", percent);
        }
    }

    // ========================================================================
    // AUDIO CONTROL
    // ========================================================================

    pub fn start_audio(&mut self) -> Result<(), AudioError> {
        self.backend.start()
    }

    /// Silence all voices, then stop the backend.
    pub fn stop_audio(&mut self) -> Result<(), AudioError> {
        self.stop_all();
        self.backend.stop()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.scheduler.set_volume(volume);
        self.flush_commands(self.last_timestamp_ms);
    }

    pub fn mute(&mut self, muted: bool) {
        self.scheduler.mute(muted);
        self.flush_commands(self.last_timestamp_ms);
    }

    pub fn stop_all(&mut self) {
        self.scheduler.stop_all();
        self.flush_commands(self.last_timestamp_ms);
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn presentation(&self) -> &PresentationSnapshot {
        &self.presentation
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_id
    }

    pub fn scheduler(&self) -> &VoiceScheduler {
        &self.scheduler
    }

    pub fn smoothing(&self) -> &SmoothingStore {
        &self.smoothing
    }

    pub fn strums(&self) -> &StrumStore {
        &self.strums
    }

    pub fn recognition(&self) -> &R {
        &self.recognition
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Release the recognition source and backend
    pub fn into_parts(self) -> (R, B) {
        (self.recognition, self.backend)
    }
}

fn elapsed_ms(start: Instant, end: Instant) -> f32 {
    end.saturating_duration_since(start).as_secs_f32() * 1000.0
}
