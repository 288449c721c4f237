//! Pipeline telemetry hub.
//!
//! Every component reports into one process-wide [`TelemetryHub`]: a bounded
//! history of [`MetricEvent`]s, a broadcast stream of the same events, running
//! pipeline counters, and a rolling window of tick durations.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audio::TriggerRejection;
use crate::error::{ErrorCode, InputError};
use crate::gesture::StrumEvent;
use crate::landmarks::Handedness;

pub mod events;

pub use events::{DiagnosticError, MetricEvent};

/// Gauge changes smaller than this (in percent) are not republished
const QUEUE_GAUGE_STEP: f32 = 2.5;

static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Process-wide hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Running totals since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub frames: u64,
    pub strums: u64,
    pub corrections_entered: u64,
    pub voices_rejected: u64,
    pub inputs_rejected: u64,
    pub recognitions: u64,
    pub errors: u64,
}

/// Tick duration statistics over the rolling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickLatency {
    pub avg_ms: f32,
    pub p95_ms: f32,
    pub max_ms: f32,
    pub samples: usize,
}

/// Point-in-time view for the CLI and the debug HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    /// Events evicted from `recent` because the history was full
    pub dropped_events: u64,
    pub counters: PipelineCounters,
    pub tick_latency: TickLatency,
}

struct TickWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl TickWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, tick_ms: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(tick_ms.max(0.0));
    }

    fn summary(&self) -> TickLatency {
        if self.samples.is_empty() {
            return TickLatency::default();
        }
        let mut sorted: Vec<f32> = self.samples.iter().copied().collect();
        sorted.sort_by(f32::total_cmp);
        let n = sorted.len();
        let p95_index = ((n as f32 * 0.95).ceil() as usize).clamp(1, n) - 1;
        TickLatency {
            avg_ms: sorted.iter().sum::<f32>() / n as f32,
            p95_ms: sorted[p95_index],
            max_ms: sorted[n - 1],
            samples: n,
        }
    }
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    strums: AtomicU64,
    corrections_entered: AtomicU64,
    voices_rejected: AtomicU64,
    inputs_rejected: AtomicU64,
    recognitions: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn load(&self) -> PipelineCounters {
        PipelineCounters {
            frames: self.frames.load(Ordering::Relaxed),
            strums: self.strums.load(Ordering::Relaxed),
            corrections_entered: self.corrections_entered.load(Ordering::Relaxed),
            voices_rejected: self.voices_rejected.load(Ordering::Relaxed),
            inputs_rejected: self.inputs_rejected.load(Ordering::Relaxed),
            recognitions: self.recognitions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct TelemetryHub {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_events: AtomicU64,
    counters: Counters,
    ticks: Mutex<TickWindow>,
    /// A `FrameLatency` event is published once per this many ticks
    latency_every: u64,
    queue_gauges: Mutex<HashMap<&'static str, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            total_events: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            counters: Counters::default(),
            ticks: Mutex::new(TickWindow::new(latency_window)),
            latency_every: latency_window.max(1) as u64,
            queue_gauges: Mutex::new(HashMap::new()),
        }
    }

    /// Live stream of every published event; lagging receivers lose the oldest.
    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn counters(&self) -> PipelineCounters {
        self.counters.load()
    }

    pub fn tick_latency(&self) -> TickLatency {
        self.ticks
            .lock()
            .map(|window| window.summary())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = self
            .history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default();
        TelemetrySnapshot {
            recent,
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            counters: self.counters(),
            tick_latency: self.tick_latency(),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        match &event {
            MetricEvent::Recognition { .. } => bump(&self.counters.recognitions),
            MetricEvent::Error { .. } => bump(&self.counters.errors),
            _ => {}
        }
        bump(&self.total_events);
        if let Ok(mut history) = self.history.lock() {
            if history.len() == self.history_capacity {
                history.pop_front();
                bump(&self.dropped_events);
            }
            history.push_back(event.clone());
        }
        // No subscribers is the common case outside debug builds.
        let _ = self.tx.send(event);
    }

    /// Feed one tick duration. Returns the window summary.
    pub fn record_frame_latency(&self, tick_ms: f32) -> TickLatency {
        let summary = match self.ticks.lock() {
            Ok(mut window) => {
                window.push(tick_ms);
                window.summary()
            }
            Err(_) => return TickLatency::default(),
        };

        let frames = self.counters.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frames % self.latency_every == 0 {
            self.publish(MetricEvent::FrameLatency {
                avg_ms: summary.avg_ms,
                max_ms: summary.max_ms,
                sample_count: summary.samples,
            });
        }
        summary
    }

    pub fn record_strum(&self, event: &StrumEvent) {
        bump(&self.counters.strums);
        self.publish(MetricEvent::Strum {
            string_index: event.string_index,
            velocity: event.velocity,
            direction: event.direction,
        });
    }

    /// Called on correction transitions only.
    pub fn record_correction(&self, active: bool, chord_id: Option<&str>) {
        if active {
            bump(&self.counters.corrections_entered);
        }
        self.publish(MetricEvent::Correction {
            active,
            chord_id: chord_id.map(str::to_string),
        });
    }

    pub fn record_voice_rejection(&self, string_index: usize, reason: TriggerRejection) {
        bump(&self.counters.voices_rejected);
        self.publish(MetricEvent::VoiceRejected {
            string_index,
            reason,
        });
    }

    pub fn record_input_rejection(&self, hand: Handedness, err: &InputError) {
        bump(&self.counters.inputs_rejected);
        self.publish(MetricEvent::InputRejected {
            hand,
            code: err.code(),
        });
    }

    /// Publish `channel`'s fill level when it moved by at least 2.5 points.
    pub fn record_queue_occupancy(&self, channel: &'static str, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        let Ok(mut gauges) = self.queue_gauges.lock() else {
            return;
        };
        if let Some(last) = gauges.get(channel) {
            if (last - percent).abs() < QUEUE_GAUGE_STEP {
                return;
            }
        }
        gauges.insert(channel, percent);
        drop(gauges);

        self.publish(MetricEvent::QueueOccupancy {
            channel: channel.to_string(),
            percent,
        });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        self.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::StrumDirection;

    fn strum(string_index: usize) -> StrumEvent {
        StrumEvent {
            timestamp_ms: 0.0,
            string_index,
            velocity: 0.7,
            direction: StrumDirection::Down,
            speed: 2.1,
        }
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let hub = TelemetryHub::new(8, 2, 4);
        for string in 0..3 {
            hub.record_strum(&strum(string));
        }

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.recent.len(), 2);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::Strum { string_index: 1, .. }
        ));
        assert_eq!(snapshot.counters.strums, 3);
    }

    #[test]
    fn latency_event_once_per_window() {
        let hub = TelemetryHub::new(16, 16, 4);
        for ms in [1.0, 2.0, 3.0, 6.0, 1.0] {
            hub.record_frame_latency(ms);
        }

        let latency: Vec<_> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter(|event| matches!(event, MetricEvent::FrameLatency { .. }))
            .collect();
        assert_eq!(latency.len(), 1);
        assert!(
            matches!(latency[0], MetricEvent::FrameLatency { avg_ms, max_ms, sample_count: 4 }
                if (avg_ms - 3.0).abs() < 1e-6 && (max_ms - 6.0).abs() < 1e-6)
        );
        assert_eq!(hub.counters().frames, 5);
    }

    #[test]
    fn tick_window_reports_p95() {
        let mut window = TickWindow::new(20);
        for ms in 1..=20 {
            window.push(ms as f32);
        }
        let summary = window.summary();
        assert_eq!(summary.samples, 20);
        assert_eq!(summary.p95_ms, 19.0);
        assert_eq!(summary.max_ms, 20.0);
        assert!((summary.avg_ms - 10.5).abs() < 1e-6);

        assert_eq!(TickWindow::new(4).summary(), TickLatency::default());
    }

    #[test]
    fn counters_follow_recorded_events() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_voice_rejection(2, TriggerRejection::Debounced);
        hub.record_correction(true, Some("G_Major"));
        hub.record_correction(false, None);
        hub.record_error(DiagnosticError::AudioBackend, "device lost");

        let counters = hub.counters();
        assert_eq!(counters.voices_rejected, 1);
        assert_eq!(counters.corrections_entered, 1);
        assert_eq!(counters.errors, 1);
        assert!(matches!(
            hub.snapshot().recent[0],
            MetricEvent::VoiceRejected {
                string_index: 2,
                reason: TriggerRejection::Debounced
            }
        ));
    }

    #[test]
    fn queue_gauge_skips_small_changes() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_queue_occupancy("voice_commands", 10.0);
        hub.record_queue_occupancy("voice_commands", 10.5);
        hub.record_queue_occupancy("voice_commands", 25.0);

        let count = hub
            .snapshot()
            .recent
            .iter()
            .filter(|event| matches!(event, MetricEvent::QueueOccupancy { .. }))
            .count();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = TelemetryHub::new(8, 8, 4);
        let mut rx = hub.subscribe();
        hub.record_strum(&strum(4));
        assert!(matches!(
            rx.recv().await,
            Ok(MetricEvent::Strum { string_index: 4, .. })
        ));
    }

    #[test]
    fn metric_event_wire_shape() {
        let json = serde_json::to_string(&MetricEvent::Connectivity {
            state: crate::recognition::ConnectionState::Offline,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"connectivity","payload":{"state":{"state":"offline"}}}"#
        );
    }
}
