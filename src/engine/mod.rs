//! Engine module housing the frame cadence.
//!
//! `backend` holds the audio-output and clock abstractions; `core` holds the
//! `FrameOrchestrator` that drives one tick per captured frame.

pub mod backend;
pub mod core;

#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{
    AudioBackend, CommandLog, DesktopStubBackend, StubTimeSource, SystemTimeSource, TimeSource,
};
pub use core::{FrameOrchestrator, FrameReport, PresentationSnapshot};
