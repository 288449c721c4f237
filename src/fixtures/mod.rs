//! Fixture utilities for the deterministic replay harness.
//!
//! This module discovers recorded landmark sessions, parses optional
//! expectation JSON, and replays sessions frame by frame through a
//! `FrameOrchestrator` with a recording audio backend. It is intentionally
//! desktop-focused to support CI and QA workflows.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::VoiceCommand;
use crate::config::AppConfig;
use crate::engine::{DesktopStubBackend, FrameOrchestrator, FrameReport, StubTimeSource};
use crate::fingering::FingeringMap;
use crate::gesture::{StrumDirection, StrumEvent};
use crate::landmarks::{CaptureFrame, PoseVector};
use crate::recognition::{
    ConnectionState, DisabledRecognition, InlineRecognizer, LocalRecognizer, RecognitionResult,
    RecognitionSnapshot, RecognitionSource,
};

pub mod synthetic;

/// Default location for session/expectation assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

const SESSION_SUFFIX: &str = ".session.json";
const EXPECT_SUFFIX: &str = ".expect.json";

/// Recorded capture frames plus optional scripted recognizer answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSession {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub frames: Vec<CaptureFrame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recognitions: Vec<ScriptedRecognitionEntry>,
}

impl LandmarkSession {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing landmark session")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading session {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing landmark session")
    }

    pub fn start_ms(&self) -> f64 {
        self.frames.first().map(|f| f.timestamp_ms).unwrap_or(0.0)
    }

    pub fn duration_ms(&self) -> f64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0.0,
        }
    }
}

/// A recognizer answer that becomes visible at `at_ms` on the frame clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedRecognitionEntry {
    pub at_ms: f64,
    pub chord_id: String,
    pub confidence: f32,
    pub fingering: FingeringMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_notes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScriptedRecognitionEntry {
    fn to_result(&self) -> RecognitionResult {
        RecognitionResult {
            chord_id: self.chord_id.clone(),
            confidence: self.confidence.clamp(0.0, 1.0),
            fingering: self.fingering,
            override_notes: self.override_notes.clone(),
            message: self.message.clone(),
            timestamp_ms: self.at_ms,
        }
    }
}

/// Recognition source replaying scripted answers on the frame clock
#[derive(Debug)]
pub struct ScriptedRecognition {
    entries: Vec<ScriptedRecognitionEntry>,
    next: usize,
    snapshot: Arc<RecognitionSnapshot>,
}

impl ScriptedRecognition {
    pub fn new(mut entries: Vec<ScriptedRecognitionEntry>) -> Self {
        entries.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        Self {
            entries,
            next: 0,
            snapshot: Arc::new(RecognitionSnapshot {
                state: ConnectionState::Connected,
                ..RecognitionSnapshot::default()
            }),
        }
    }
}

impl RecognitionSource for ScriptedRecognition {
    fn offer(&mut self, _pose: &PoseVector, _frame_id: u64) -> bool {
        Arc::make_mut(&mut self.snapshot).requests_sent += 1;
        true
    }

    fn snapshot(&self) -> Arc<RecognitionSnapshot> {
        Arc::clone(&self.snapshot)
    }

    fn advance_to(&mut self, now_ms: f64) {
        while let Some(entry) = self.entries.get(self.next) {
            if entry.at_ms > now_ms {
                break;
            }
            let snapshot = Arc::make_mut(&mut self.snapshot);
            snapshot.result = Some(entry.to_result());
            snapshot.results_received += 1;
            self.next += 1;
        }
    }
}

/// Metadata describing an available fixture.
#[derive(Clone, Debug)]
pub struct FixtureMetadata {
    pub name: String,
    pub session_path: PathBuf,
    pub expect_path: Option<PathBuf>,
}

/// Loaded fixture: session plus optional expectations.
pub struct FixtureData {
    pub metadata: FixtureMetadata,
    pub session: LandmarkSession,
    pub expectations: Option<FixtureExpectations>,
}

/// JSON expectation schema for fixture verification.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureExpectations {
    pub fixture: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub strums: Vec<ExpectedStrum>,
    #[serde(default)]
    pub final_chord: Option<String>,
    #[serde(default)]
    pub final_correction_active: Option<bool>,
}

/// Expected strum, timed from the first frame of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedStrum {
    pub string_index: usize,
    pub direction: StrumDirection,
    pub offset_ms: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance_ms: f64,
}

fn default_tolerance() -> f64 {
    20.0
}

impl FixtureExpectations {
    pub fn verify(&self, report: &ReplayReport) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();

        for (idx, expected) in self.strums.iter().enumerate() {
            match report.strums.get(idx) {
                Some(event) => {
                    let offset = event.timestamp_ms - report.start_ms;
                    let delta = (offset - expected.offset_ms).abs();
                    if event.string_index != expected.string_index
                        || event.direction != expected.direction
                        || delta > expected.tolerance_ms
                    {
                        failures.push(ExpectationFailure::Strum {
                            index: idx,
                            expected: expected.clone(),
                            actual: Some(*event),
                        });
                    }
                }
                None => failures.push(ExpectationFailure::Strum {
                    index: idx,
                    expected: expected.clone(),
                    actual: None,
                }),
            }
        }

        for (idx, event) in report.strums.iter().enumerate().skip(self.strums.len()) {
            failures.push(ExpectationFailure::UnexpectedStrum {
                index: idx,
                actual: *event,
            });
        }

        if let Some(chord) = &self.final_chord {
            if report.final_chord_id.as_ref() != Some(chord) {
                failures.push(ExpectationFailure::FinalChord {
                    expected: chord.clone(),
                    actual: report.final_chord_id.clone(),
                });
            }
        }

        if let Some(active) = self.final_correction_active {
            if report.final_correction_active != active {
                failures.push(ExpectationFailure::Correction {
                    expected: active,
                    actual: report.final_correction_active,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Outcome of comparing a replay with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "failures": self.failures })
    }
}

/// Detailed diff entry for a single failure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectationFailure {
    Strum {
        index: usize,
        expected: ExpectedStrum,
        actual: Option<StrumEvent>,
    },
    UnexpectedStrum {
        index: usize,
        actual: StrumEvent,
    },
    FinalChord {
        expected: String,
        actual: Option<String>,
    },
    Correction {
        expected: bool,
        actual: bool,
    },
}

/// Catalog responsible for discovering fixtures on disk.
pub struct FixtureCatalog {
    root: PathBuf,
}

impl FixtureCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all sessions by their metadata.
    pub fn discover(&self) -> Result<Vec<FixtureMetadata>> {
        let mut fixtures = Vec::new();
        if !self.root.exists() {
            return Ok(fixtures);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if let Some(metadata) = self.metadata_for_path(&path) {
                    fixtures.push(metadata);
                }
            }
        }

        fixtures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fixtures)
    }

    /// Load session + expectations for provided name or path.
    pub fn load(&self, fixture: &str, override_expect: Option<PathBuf>) -> Result<FixtureData> {
        let session_path = self.resolve_fixture_path(fixture)?;
        let metadata = self
            .metadata_for_path(&session_path)
            .unwrap_or_else(|| FixtureMetadata {
                name: fixture_name(&session_path),
                session_path: session_path.clone(),
                expect_path: None,
            });
        let session = LandmarkSession::load(&session_path)?;

        let expectation_path = override_expect.or(metadata.expect_path.clone());
        let expectations = match expectation_path {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading expectation {}", path.display()))?;
                Some(
                    serde_json::from_str(&json)
                        .with_context(|| format!("parsing {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(FixtureData {
            metadata,
            session,
            expectations,
        })
    }

    fn resolve_fixture_path(&self, fixture: &str) -> Result<PathBuf> {
        let as_path = Path::new(fixture);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{fixture}{SESSION_SUFFIX}"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Fixture '{fixture}' not found in {}",
                self.root.display()
            ))
        }
    }

    fn metadata_for_path(&self, session_path: &Path) -> Option<FixtureMetadata> {
        let file_name = session_path.file_name()?.to_str()?;
        let name = file_name.strip_suffix(SESSION_SUFFIX)?.to_string();
        let expect_path = session_path.with_file_name(format!("{name}{EXPECT_SUFFIX}"));
        Some(FixtureMetadata {
            name,
            session_path: session_path.to_path_buf(),
            expect_path: expect_path.exists().then_some(expect_path),
        })
    }
}

fn fixture_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

impl Default for FixtureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FIXTURE_ROOT)
    }
}

/// Where recognition results come from during a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognitionMode {
    /// The session's scripted answers (offline when it has none)
    #[default]
    Scripted,
    /// The in-process similarity recognizer, answering on the frame clock
    Local,
    /// Geometric fingering only
    Disabled,
}

/// Summary of one replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub session: String,
    pub frames: usize,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub strum_count: usize,
    pub strums: Vec<StrumEvent>,
    pub trigger_count: usize,
    pub corrected_frames: usize,
    pub low_confidence_frames: usize,
    pub final_fingering: FingeringMap,
    pub final_correction_active: bool,
    pub final_chord_id: Option<String>,
    pub connectivity: ConnectionState,
    pub max_tick_ms: f32,
    /// Everything the audio backend received, `(frame_ms, command)`
    #[serde(skip)]
    pub commands: Vec<(f64, VoiceCommand)>,
    #[serde(skip)]
    pub reports: Vec<FrameReport>,
}

/// Replays sessions through the full frame path.
pub struct FixtureProcessor {
    config: AppConfig,
    mode: RecognitionMode,
}

impl FixtureProcessor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            mode: RecognitionMode::default(),
        }
    }

    pub fn with_recognition(mut self, mode: RecognitionMode) -> Self {
        self.mode = mode;
        self
    }

    fn recognition_for(&self, session: &LandmarkSession) -> Box<dyn RecognitionSource> {
        match self.mode {
            RecognitionMode::Scripted if !session.recognitions.is_empty() => {
                Box::new(ScriptedRecognition::new(session.recognitions.clone()))
            }
            RecognitionMode::Scripted | RecognitionMode::Disabled => {
                Box::new(DisabledRecognition::new())
            }
            RecognitionMode::Local => Box::new(InlineRecognizer::new(
                LocalRecognizer::new(),
                self.config.recognition.publish_interval_ms,
            )),
        }
    }

    pub fn run(&self, session: &LandmarkSession) -> Result<ReplayReport> {
        let backend = DesktopStubBackend::started();
        let log = backend.log();
        let mut orchestrator =
            FrameOrchestrator::new(&self.config, self.recognition_for(session), backend)
                .with_time_source(Arc::new(StubTimeSource::new()));

        let reports: Vec<FrameReport> = session
            .frames
            .iter()
            .map(|frame| orchestrator.tick(frame))
            .collect();

        let strums: Vec<StrumEvent> = reports.iter().filter_map(|r| r.strum).collect();
        let presentation = orchestrator.presentation();

        tracing::info!(
            "[Replay] {}: {} frames, {} strums",
            session.name,
            reports.len(),
            strums.len()
        );

        Ok(ReplayReport {
            session: session.name.clone(),
            frames: reports.len(),
            start_ms: session.start_ms(),
            duration_ms: session.duration_ms(),
            strum_count: strums.len(),
            strums,
            trigger_count: reports.iter().map(|r| r.triggered.len()).sum(),
            corrected_frames: reports.iter().filter(|r| r.correction_active).count(),
            low_confidence_frames: reports.iter().filter(|r| r.low_confidence_warning).count(),
            final_fingering: presentation.fingering,
            final_correction_active: presentation.correction_active,
            final_chord_id: presentation.chord_id.clone(),
            connectivity: presentation.connectivity,
            max_tick_ms: reports.iter().map(|r| r.tick_ms).fold(0.0, f32::max),
            commands: log.entries(),
            reports,
        })
    }
}
