//! VoiceScheduler - six-voice trigger/release policy
//!
//! Runs on the frame cadence. Accepted triggers and releases are queued as
//! [`VoiceCommand`]s which the orchestrator drains into the audio backend
//! once per tick. Rejected triggers are no-ops: they are logged, counted in
//! telemetry and leave voice state untouched.

use serde::{Serialize, Serializer};

use crate::config::VoiceConfig;
use crate::fingering::{fretted_frequency, FingeringMap, MAX_FRET};
use crate::gesture::{StrumEvent, STRING_COUNT};
use crate::telemetry;

use super::voice::{velocity_gain, EnvelopeParams, Voice, VoiceState};
use super::{TriggerRejection, VoiceCommand};

/// Compact set of string indices (bit i = string i)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringSet(u8);

impl StringSet {
    pub const EMPTY: StringSet = StringSet(0);

    pub fn insert(&mut self, string: usize) {
        if string < STRING_COUNT {
            self.0 |= 1 << string;
        }
    }

    pub fn contains(&self, string: usize) -> bool {
        string < STRING_COUNT && self.0 & (1 << string) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Members in ascending string order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..STRING_COUNT).filter(move |s| self.contains(*s))
    }
}

impl Serialize for StringSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Trigger/release scheduling for the six string voices
#[derive(Debug, Clone)]
pub struct VoiceScheduler {
    voices: [Voice; STRING_COUNT],
    envelope: EnvelopeParams,
    min_gain: f32,
    max_gain: f32,
    velocity_gamma: f32,
    master_volume: f32,
    debounce_ms: f64,
    sustain_ms: f64,
    stagger_ms: f64,
    muted: bool,
    pending: Vec<VoiceCommand>,
}

impl VoiceScheduler {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            voices: std::array::from_fn(Voice::new),
            envelope: EnvelopeParams::from_config(config),
            min_gain: config.min_gain,
            max_gain: config.max_gain,
            velocity_gamma: config.velocity_gamma,
            master_volume: config.master_volume.clamp(0.0, 1.0),
            debounce_ms: config.debounce_ms,
            sustain_ms: config.sustain_ms,
            stagger_ms: config.strum_stagger_ms,
            muted: false,
            pending: Vec::with_capacity(4 * STRING_COUNT),
        }
    }

    /// Trigger `string` at `fret` with an immediate onset.
    pub fn trigger(
        &mut self,
        string: usize,
        fret: i8,
        velocity: f32,
        now_ms: f64,
    ) -> Result<(), TriggerRejection> {
        self.trigger_at(string, fret, velocity, now_ms, now_ms)
    }

    /// Trigger `string` with its onset scheduled at `onset_ms` (>= `now_ms`).
    ///
    /// Debounce compares onset times, so staggered strum onsets are judged by
    /// when they will actually sound.
    pub fn trigger_at(
        &mut self,
        string: usize,
        fret: i8,
        velocity: f32,
        onset_ms: f64,
        now_ms: f64,
    ) -> Result<(), TriggerRejection> {
        let fret = match self.check_trigger(string, fret, onset_ms) {
            Ok(fret) => fret,
            Err(reason) => {
                tracing::debug!(
                    "[VoiceScheduler] Trigger on string {} rejected: {}",
                    string,
                    reason.as_str()
                );
                telemetry::hub().record_voice_rejection(string, reason);
                return Err(reason);
            }
        };

        let frequency_hz = fretted_frequency(string, fret).ok_or(TriggerRejection::InvalidString)?;
        let gain = velocity_gain(velocity, self.min_gain, self.max_gain, self.velocity_gamma)
            * self.master_volume;
        let delay_ms = (onset_ms - now_ms).max(0.0);

        let voice = &mut self.voices[string];
        if voice.is_sounding() {
            self.pending.push(VoiceCommand::Release { string });
        }
        voice.state = VoiceState::Sounding {
            release_at_ms: onset_ms + self.sustain_ms,
        };
        voice.last_onset_ms = Some(onset_ms);
        voice.frequency_hz = frequency_hz;
        voice.gain = gain;
        voice.fret = fret;

        self.pending.push(VoiceCommand::Trigger {
            string,
            frequency_hz,
            gain,
            delay_ms: delay_ms as f32,
        });
        Ok(())
    }

    fn check_trigger(&self, string: usize, fret: i8, onset_ms: f64) -> Result<u8, TriggerRejection> {
        let voice = self
            .voices
            .get(string)
            .ok_or(TriggerRejection::InvalidString)?;
        if self.muted {
            return Err(TriggerRejection::GlobalMute);
        }
        if fret < 0 {
            return Err(TriggerRejection::MutedString);
        }
        if fret > MAX_FRET {
            return Err(TriggerRejection::InvalidFret);
        }
        if let Some(last) = voice.last_onset_ms {
            if onset_ms - last < self.debounce_ms {
                return Err(TriggerRejection::Debounced);
            }
        }
        Ok(fret as u8)
    }

    /// Release a sounding voice early. Returns false when nothing changed.
    pub fn release(&mut self, string: usize, now_ms: f64) -> bool {
        let Some(voice) = self.voices.get_mut(string) else {
            tracing::debug!("[VoiceScheduler] Release on invalid string {}", string);
            return false;
        };
        match voice.state {
            VoiceState::Sounding { .. } => {
                voice.state = VoiceState::Releasing {
                    until_ms: now_ms + self.envelope.release_ms as f64,
                };
                self.pending.push(VoiceCommand::Release { string });
                true
            }
            _ => false,
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.master_volume = volume;
        self.pending.push(VoiceCommand::SetVolume { volume });
    }

    pub fn mute(&mut self, muted: bool) {
        if self.muted != muted {
            tracing::info!("[VoiceScheduler] Mute {}", if muted { "on" } else { "off" });
        }
        self.muted = muted;
        self.pending.push(VoiceCommand::Mute { muted });
    }

    /// Silence every voice immediately.
    pub fn stop_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.state = VoiceState::Idle;
        }
        self.pending.push(VoiceCommand::StopAll);
    }

    /// Render a strum over the crossed strings of `event` using `fingering`.
    ///
    /// Muted strings are skipped; each accepted string's onset is offset by
    /// the stagger interval in crossing order.
    pub fn strum(&mut self, event: &StrumEvent, fingering: &FingeringMap, now_ms: f64) -> StringSet {
        let mut triggered = StringSet::EMPTY;
        let mut slot = 0u32;
        for string in event.crossed_strings() {
            let fret = fingering.frets()[string];
            if fret < 0 {
                continue;
            }
            let onset_ms = now_ms + self.stagger_ms * slot as f64;
            if self
                .trigger_at(string, fret, event.velocity, onset_ms, now_ms)
                .is_ok()
            {
                triggered.insert(string);
                slot += 1;
            }
        }
        triggered
    }

    /// Apply release deadlines due at `now_ms`.
    pub fn advance(&mut self, now_ms: f64) {
        let release_ms = self.envelope.release_ms as f64;
        for voice in self.voices.iter_mut() {
            if let VoiceState::Sounding { release_at_ms } = voice.state {
                if now_ms >= release_at_ms {
                    voice.state = VoiceState::Releasing {
                        until_ms: release_at_ms + release_ms,
                    };
                    self.pending.push(VoiceCommand::Release {
                        string: voice.string,
                    });
                }
            }
            if let VoiceState::Releasing { until_ms } = voice.state {
                if now_ms >= until_ms {
                    voice.state = VoiceState::Idle;
                }
            }
        }
    }

    /// Commands produced since the last drain, in emission order
    pub fn drain_commands(&mut self) -> std::vec::Drain<'_, VoiceCommand> {
        self.pending.drain(..)
    }

    pub fn voice(&self, string: usize) -> Option<&Voice> {
        self.voices.get(string)
    }

    pub fn voices(&self) -> &[Voice; STRING_COUNT] {
        &self.voices
    }

    pub fn sounding(&self) -> StringSet {
        let mut set = StringSet::EMPTY;
        for voice in self.voices.iter().filter(|v| v.is_sounding()) {
            set.insert(voice.string);
        }
        set
    }

    pub fn sounding_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_sounding()).count()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn volume(&self) -> f32 {
        self.master_volume
    }

    pub fn envelope(&self) -> EnvelopeParams {
        self.envelope
    }
}

impl Default for VoiceScheduler {
    fn default() -> Self {
        Self::new(&VoiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::StrumDirection;

    fn drained(scheduler: &mut VoiceScheduler) -> Vec<VoiceCommand> {
        scheduler.drain_commands().collect()
    }

    fn strum_event(string_index: usize, direction: StrumDirection) -> StrumEvent {
        StrumEvent {
            timestamp_ms: 0.0,
            string_index,
            velocity: 0.8,
            direction,
            speed: 2.4,
        }
    }

    #[test]
    fn test_trigger_emits_pitch_and_gain() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.trigger(2, 2, 1.0, 0.0).unwrap();

        let commands = drained(&mut scheduler);
        assert_eq!(commands.len(), 1);
        match commands[0] {
            VoiceCommand::Trigger {
                string,
                frequency_hz,
                gain,
                delay_ms,
            } => {
                assert_eq!(string, 2);
                // D3 + 2 semitones = E3
                assert!((frequency_hz - 164.81).abs() < 0.01);
                assert!((gain - 0.9 * 0.8).abs() < 1e-5);
                assert_eq!(delay_ms, 0.0);
            }
            other => panic!("Expected trigger, got {:?}", other),
        }
        assert!(matches!(
            scheduler.voice(2).unwrap().state,
            VoiceState::Sounding { release_at_ms } if release_at_ms == 1200.0
        ));
    }

    #[test]
    fn test_second_trigger_within_debounce_is_noop() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.trigger(2, 3, 0.7, 100.0).unwrap();
        drained(&mut scheduler);
        let before = scheduler.voice(2).unwrap().clone();

        assert_eq!(
            scheduler.trigger(2, 5, 1.0, 110.0),
            Err(TriggerRejection::Debounced)
        );
        assert_eq!(scheduler.voice(2).unwrap(), &before);
        assert!(drained(&mut scheduler).is_empty());
    }

    #[test]
    fn test_out_of_range_string_is_noop() {
        let mut scheduler = VoiceScheduler::default();
        assert_eq!(
            scheduler.trigger(6, 0, 1.0, 0.0),
            Err(TriggerRejection::InvalidString)
        );
        assert!(drained(&mut scheduler).is_empty());
        assert_eq!(scheduler.sounding_count(), 0);
    }

    #[test]
    fn test_muted_fret_and_global_mute_reject() {
        let mut scheduler = VoiceScheduler::default();
        assert_eq!(
            scheduler.trigger(0, -1, 1.0, 0.0),
            Err(TriggerRejection::MutedString)
        );
        assert_eq!(
            scheduler.trigger(0, 25, 1.0, 0.0),
            Err(TriggerRejection::InvalidFret)
        );

        scheduler.mute(true);
        assert_eq!(
            scheduler.trigger(0, 0, 1.0, 0.0),
            Err(TriggerRejection::GlobalMute)
        );
        scheduler.mute(false);
        assert!(scheduler.trigger(0, 0, 1.0, 0.0).is_ok());
    }

    #[test]
    fn test_retrigger_releases_then_triggers() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.trigger(4, 0, 0.5, 0.0).unwrap();
        drained(&mut scheduler);

        scheduler.trigger(4, 1, 0.5, 60.0).unwrap();
        let commands = drained(&mut scheduler);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], VoiceCommand::Release { string: 4 });
        assert!(matches!(commands[1], VoiceCommand::Trigger { string: 4, .. }));
    }

    #[test]
    fn test_auto_release_follows_deadline() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.trigger(1, 0, 0.5, 0.0).unwrap();
        drained(&mut scheduler);

        scheduler.advance(1199.0);
        assert!(drained(&mut scheduler).is_empty());

        scheduler.advance(1200.0);
        assert_eq!(drained(&mut scheduler), vec![VoiceCommand::Release { string: 1 }]);
        assert!(matches!(
            scheduler.voice(1).unwrap().state,
            VoiceState::Releasing { until_ms } if until_ms == 1450.0
        ));

        scheduler.advance(1450.0);
        assert_eq!(scheduler.voice(1).unwrap().state, VoiceState::Idle);
        assert!(drained(&mut scheduler).is_empty());
    }

    #[test]
    fn test_late_advance_goes_straight_to_idle() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.trigger(1, 0, 0.5, 0.0).unwrap();
        drained(&mut scheduler);

        scheduler.advance(10_000.0);
        assert_eq!(drained(&mut scheduler), vec![VoiceCommand::Release { string: 1 }]);
        assert_eq!(scheduler.voice(1).unwrap().state, VoiceState::Idle);
    }

    #[test]
    fn test_explicit_release_only_from_sounding() {
        let mut scheduler = VoiceScheduler::default();
        assert!(!scheduler.release(3, 0.0));
        assert!(!scheduler.release(9, 0.0));

        scheduler.trigger(3, 2, 0.5, 0.0).unwrap();
        assert!(scheduler.release(3, 100.0));
        assert!(!scheduler.release(3, 110.0));
    }

    #[test]
    fn test_strum_staggers_and_skips_muted() {
        let mut scheduler = VoiceScheduler::default();
        let fingering = FingeringMap::new([0, -1, 2, 2, 1, 0]);
        let triggered = scheduler.strum(&strum_event(0, StrumDirection::Down), &fingering, 0.0);

        assert_eq!(triggered.iter().collect::<Vec<_>>(), vec![0, 2, 3, 4, 5]);
        let delays: Vec<(usize, f32)> = drained(&mut scheduler)
            .into_iter()
            .filter_map(|c| match c {
                VoiceCommand::Trigger {
                    string, delay_ms, ..
                } => Some((string, delay_ms)),
                _ => None,
            })
            .collect();
        assert_eq!(
            delays,
            vec![(0, 0.0), (2, 15.0), (3, 30.0), (4, 45.0), (5, 60.0)]
        );
    }

    #[test]
    fn test_up_strum_orders_high_to_low() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.strum(&strum_event(2, StrumDirection::Up), &FingeringMap::open(), 0.0);
        let order: Vec<usize> = drained(&mut scheduler)
            .into_iter()
            .filter_map(|c| match c {
                VoiceCommand::Trigger { string, .. } => Some(string),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_polyphony_never_exceeds_strings() {
        let mut scheduler = VoiceScheduler::default();
        let fingering = FingeringMap::open();
        for i in 0..40 {
            let now = i as f64 * 20.0;
            let direction = if i % 2 == 0 {
                StrumDirection::Down
            } else {
                StrumDirection::Up
            };
            let index = if i % 2 == 0 { 0 } else { 5 };
            scheduler.strum(&strum_event(index, direction), &fingering, now);
            for string in 0..8 {
                let _ = scheduler.trigger(string, 3, 1.0, now);
            }
            scheduler.advance(now);
            assert!(scheduler.sounding_count() <= STRING_COUNT);
        }
    }

    #[test]
    fn test_volume_scales_gain() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.set_volume(0.5);
        scheduler.trigger(0, 0, 1.0, 0.0).unwrap();
        let gain = drained(&mut scheduler)
            .into_iter()
            .find_map(|c| match c {
                VoiceCommand::Trigger { gain, .. } => Some(gain),
                _ => None,
            })
            .unwrap();
        assert!((gain - 0.45).abs() < 1e-5);
    }

    #[test]
    fn test_stop_all_silences_everything() {
        let mut scheduler = VoiceScheduler::default();
        scheduler.strum(
            &strum_event(0, StrumDirection::Down),
            &FingeringMap::open(),
            0.0,
        );
        assert_eq!(scheduler.sounding_count(), 6);

        scheduler.stop_all();
        assert_eq!(scheduler.sounding_count(), 0);
        assert_eq!(drained(&mut scheduler).last(), Some(&VoiceCommand::StopAll));
    }

    #[test]
    fn test_string_set_serializes_as_list() {
        let mut set = StringSet::EMPTY;
        set.insert(5);
        set.insert(1);
        set.insert(9);
        assert_eq!(set.len(), 2);
        assert_eq!(serde_json::to_string(&set).unwrap(), "[1,5]");
    }
}
