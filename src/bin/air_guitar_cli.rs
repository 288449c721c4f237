use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use air_guitar::audio::{render_timeline, EnvelopeParams};
use air_guitar::config::AppConfig;
use air_guitar::engine::{AudioBackend, DesktopStubBackend, FrameOrchestrator, FrameReport};
use air_guitar::fingering::CHORD_CATALOG;
use air_guitar::fixtures::synthetic::{chord_hand, open_hand, SessionBuilder};
use air_guitar::fixtures::{
    ExpectationDiff, FixtureCatalog, FixtureData, FixtureProcessor, LandmarkSession, RecognitionMode,
    ReplayReport,
};
use air_guitar::gesture::StrumDirection;
use air_guitar::landmarks::{LandmarkNormalizer, LandmarkSet, Point3};
use air_guitar::managers::BroadcastChannelManager;
use air_guitar::recognition::{
    ConnectionState, LocalRecognizer, RecognitionClient, RecognitionHandle, WebSocketTransport,
};
use air_guitar::telemetry::{self, DiagnosticError};

#[derive(Parser, Debug)]
#[command(
    name = "air_guitar_cli",
    about = "Deterministic landmark replay harness for the air guitar pipeline"
)]
struct Cli {
    /// Override directory containing fixture sessions (defaults to ./fixtures)
    #[arg(long)]
    fixtures_dir: Option<PathBuf>,
    /// JSON configuration file (defaults apply when missing)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a session and optionally compare against expectations
    Replay {
        #[arg(long)]
        session: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = RecognitionArg::Scripted)]
        recognition: RecognitionArg,
        /// Render the triggered voices to a mono WAV file
        #[arg(long)]
        wav: Option<PathBuf>,
    },
    /// Print one JSON frame report per line while replaying a session
    Stream {
        #[arg(long)]
        session: String,
        #[arg(long, value_enum, default_value_t = RecognitionArg::Scripted)]
        recognition: RecognitionArg,
    },
    /// Replay a session in real time against a running recognizer
    Live {
        #[arg(long)]
        session: String,
        /// Recognizer WebSocket URL (defaults to the configured one)
        #[arg(long)]
        url: Option<String>,
        /// Play through the default output device instead of discarding audio
        #[arg(long)]
        play: bool,
    },
    /// List available fixtures on disk
    DumpFixtures,
    /// List the chord catalog
    Chords,
    /// Run the local recognizer on a synthetic hand shaped like `chord`
    Recognize {
        #[arg(long)]
        chord: String,
        #[arg(long, default_value_t = 3)]
        top: usize,
    },
    /// Write the bundled demo session
    DemoSession {
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RecognitionArg {
    Scripted,
    Local,
    Off,
}

impl From<RecognitionArg> for RecognitionMode {
    fn from(arg: RecognitionArg) -> Self {
        match arg {
            RecognitionArg::Scripted => RecognitionMode::Scripted,
            RecognitionArg::Local => RecognitionMode::Local,
            RecognitionArg::Off => RecognitionMode::Disabled,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    air_guitar::init_logging(cli.verbose);

    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    let catalog = cli
        .fixtures_dir
        .map(FixtureCatalog::new)
        .unwrap_or_else(FixtureCatalog::default);

    match cli.command {
        Commands::Replay {
            session,
            expect,
            output,
            recognition,
            wav,
        } => run_replay(&catalog, config, &session, expect, output, recognition, wav),
        Commands::Stream {
            session,
            recognition,
        } => run_stream(&catalog, config, &session, recognition),
        Commands::Live { session, url, play } => run_live(&catalog, config, &session, url, play),
        Commands::DumpFixtures => run_dump(&catalog),
        Commands::Chords => run_chords(),
        Commands::Recognize { chord, top } => run_recognize(&config, &chord, top),
        Commands::DemoSession { output } => run_demo_session(&output),
    }
}

fn run_replay(
    catalog: &FixtureCatalog,
    config: AppConfig,
    fixture: &str,
    override_expect: Option<PathBuf>,
    output_path: Option<PathBuf>,
    recognition: RecognitionArg,
    wav_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let data = load_fixture(catalog, fixture, override_expect)?;
    let envelope = EnvelopeParams::from_config(&config.voice);
    let sample_rate = config.audio.sample_rate;
    let report = FixtureProcessor::new(config)
        .with_recognition(recognition.into())
        .run(&data.session)
        .with_context(|| format!("replaying fixture {fixture}"))?;

    emit_report(&report, output_path)?;

    if let Some(path) = wav_path {
        write_wav(&path, &report, sample_rate, envelope)?;
    }

    if let Some(expectations) = data.expectations {
        match expectations.verify(&report) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        }
    } else {
        Ok(ExitCode::from(0))
    }
}

fn run_stream(
    catalog: &FixtureCatalog,
    config: AppConfig,
    fixture: &str,
    recognition: RecognitionArg,
) -> Result<ExitCode> {
    let data = load_fixture(catalog, fixture, None)?;
    let report = FixtureProcessor::new(config)
        .with_recognition(recognition.into())
        .run(&data.session)
        .with_context(|| format!("replaying fixture {fixture}"))?;

    for frame in &report.reports {
        println!("{}", serde_json::to_string(frame)?);
    }

    Ok(ExitCode::from(0))
}

fn run_live(
    catalog: &FixtureCatalog,
    config: AppConfig,
    fixture: &str,
    url: Option<String>,
    play: bool,
) -> Result<ExitCode> {
    let data = load_fixture(catalog, fixture, None)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building recognition runtime")?;

    let url = url.unwrap_or_else(|| config.recognition.url.clone());
    let transport = Box::new(WebSocketTransport::new(url));
    let (handle, task) = RecognitionClient::spawn_on(runtime.handle(), &config.recognition, transport);

    let broadcasts = BroadcastChannelManager::new();
    broadcasts.init_presentation();
    broadcasts.init_strum_events();
    air_guitar::http::spawn_if_enabled(&broadcasts);

    let backend: Box<dyn AudioBackend> = if play {
        open_output(&config)?
    } else {
        Box::new(DesktopStubBackend::started())
    };

    let mut orchestrator =
        FrameOrchestrator::new(&config, handle, backend).with_broadcasts(broadcasts);
    let reports = paced_replay(&mut orchestrator, &data.session);

    if play {
        // Let the last notes ring out.
        std::thread::sleep(Duration::from_millis(config.voice.release_ms.max(0.0) as u64));
    }
    if let Err(err) = orchestrator.stop_audio() {
        tracing::debug!("[Live] Stopping audio: {}", err);
    }
    let presentation = orchestrator.presentation().clone();
    drop(orchestrator);
    task.abort();

    let summary = LiveSummary {
        session: &data.session.name,
        frames: reports.len(),
        strums: reports.iter().filter(|r| r.strum.is_some()).count(),
        corrected_frames: reports.iter().filter(|r| r.correction_active).count(),
        final_chord: presentation.chord_id.as_deref(),
        connectivity: presentation.connectivity,
        diagnostics_events: telemetry::hub().snapshot().total_events,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(0))
}

/// Feed frames at their capture timing so the recognizer sees real cadence.
fn paced_replay<B: AudioBackend>(
    orchestrator: &mut FrameOrchestrator<B, RecognitionHandle>,
    session: &LandmarkSession,
) -> Vec<FrameReport> {
    let started = Instant::now();
    let origin = session.start_ms();
    let mut reports = Vec::with_capacity(session.frames.len());
    for frame in &session.frames {
        let due = Duration::from_secs_f64(((frame.timestamp_ms - origin) / 1000.0).max(0.0));
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            std::thread::sleep(wait);
        }
        reports.push(orchestrator.tick(frame));
    }
    reports
}

#[cfg(not(target_os = "android"))]
fn open_output(config: &AppConfig) -> Result<Box<dyn AudioBackend>> {
    let mut backend = air_guitar::engine::CpalBackend::new(&config.audio, &config.voice);
    backend
        .start()
        .map_err(|err| anyhow!("starting audio output: {err}"))?;
    Ok(Box::new(backend))
}

#[cfg(target_os = "android")]
fn open_output(_config: &AppConfig) -> Result<Box<dyn AudioBackend>> {
    Err(anyhow!("audio playback is not available on this platform"))
}

fn run_dump(catalog: &FixtureCatalog) -> Result<ExitCode> {
    let fixtures = catalog.discover()?;
    if fixtures.is_empty() {
        println!("No fixtures found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for metadata in fixtures {
        if let Some(expect) = metadata.expect_path {
            println!("{} -> {}", metadata.name, expect.display());
        } else {
            println!("{}", metadata.name);
        }
    }
    Ok(ExitCode::from(0))
}

fn run_chords() -> Result<ExitCode> {
    for shape in CHORD_CATALOG.iter() {
        println!("{:<8} {}", shape.id, shape.fingering);
    }
    Ok(ExitCode::from(0))
}

fn run_recognize(config: &AppConfig, chord: &str, top: usize) -> Result<ExitCode> {
    let points = chord_hand(chord, Point3::new(0.3, 0.6, 0.0))
        .ok_or_else(|| anyhow!("unknown chord '{chord}'"))?;
    let set = LandmarkSet::try_from(points.as_slice())?;
    let values = LandmarkNormalizer::new(&config.normalizer).normalize_unsmoothed(&set);

    let matches: Vec<_> = LocalRecognizer::new()
        .search(&values, top)
        .into_iter()
        .map(|m| serde_json::json!({ "chord_id": m.shape.id, "score": m.score }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(ExitCode::from(0))
}

fn run_demo_session(output: &Path) -> Result<ExitCode> {
    let session = demo_session();
    fs::write(output, session.to_json_pretty()?)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{} frames -> {}", session.frames.len(), output.display());
    Ok(ExitCode::from(0))
}

/// Down strum on open strings, a recognized G chord, then an up strum.
fn demo_session() -> LandmarkSession {
    let mut session = SessionBuilder::new("strum_session")
        .fretting_hand(open_hand(Point3::new(0.3, 0.6, 0.0), 0.08))
        .tip_at(0.6, 0.1)
        .hold(10)
        .stroke(StrumDirection::Down, 3, 0.05)
        .hold(10)
        .recognize("G_Major", 0.92)
        .hold(10)
        .stroke(StrumDirection::Up, 3, 0.05)
        .hold(10)
        .build();
    session.notes = Some("Open-string down strum, then an up strum over a recognized G".into());
    session
}

fn load_fixture(
    catalog: &FixtureCatalog,
    fixture: &str,
    override_expect: Option<PathBuf>,
) -> Result<FixtureData> {
    catalog.load(fixture, override_expect).map_err(|err| {
        telemetry::hub().record_error(DiagnosticError::FixtureLoad, format!("{err:#}"));
        err
    })
}

fn write_wav(
    path: &Path,
    report: &ReplayReport,
    sample_rate: u32,
    envelope: EnvelopeParams,
) -> Result<()> {
    let timeline: Vec<_> = report
        .commands
        .iter()
        .map(|(at_ms, command)| (at_ms - report.start_ms, *command))
        .collect();
    let tail_ms = f64::from(envelope.release_ms) + 1500.0;
    let samples = render_timeline(&timeline, sample_rate, envelope, report.duration_ms + tail_ms);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    tracing::info!("[Replay] Wrote {}", path.display());
    Ok(())
}

fn emit_report(report: &ReplayReport, output_path: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct LiveSummary<'a> {
    session: &'a str,
    frames: usize,
    strums: usize,
    corrected_frames: usize,
    final_chord: Option<&'a str>,
    connectivity: ConnectionState,
    diagnostics_events: u64,
}
