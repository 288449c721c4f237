// Air Guitar Core - gesture-to-audio pipeline
// Hand landmarks in, plucked-string voices out, with a remote chord
// recognizer correcting the fingering when it is confident.

// Module declarations
pub mod arbitration;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingering;
pub mod fixtures;
pub mod gesture;
pub mod http;
pub mod landmarks;
pub mod managers;
pub mod recognition;
pub mod telemetry;

// Re-exports for convenience
pub use config::AppConfig;
pub use engine::{FrameOrchestrator, FrameReport, PresentationSnapshot};
pub use error::{AudioError, ErrorCode, InputError, RecognitionError};

/// Install the crate's tracing subscriber.
///
/// `verbosity` follows the CLI `-v` count: 0 = info, 1 = debug, 2+ = trace.
/// `RUST_LOG`-style filtering is not wired in; calling twice is harmless.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
