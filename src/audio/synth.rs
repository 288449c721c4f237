//! Plucked-string synthesis for the audio thread
//!
//! Karplus-Strong strings shaped by a linear ADSR envelope. Every buffer is
//! allocated up front in [`SynthBank::new`]; [`SynthBank::apply`] and
//! [`SynthBank::render`] never allocate, lock or block, so both are safe to
//! call from the output callback.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gesture::STRING_COUNT;

use super::voice::EnvelopeParams;
use super::VoiceCommand;

/// Lowest pitch a delay line can hold
const MIN_FREQUENCY_HZ: f32 = 20.0;

/// Loop-filter gain; closer to 1.0 rings longer
const STRING_DAMPING: f32 = 0.996;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-sample linear ADSR
#[derive(Debug, Clone)]
struct Envelope {
    stage: Stage,
    level: f32,
    attack_step: f32,
    decay_step: f32,
    sustain_level: f32,
    release_samples: f32,
    release_step: f32,
}

impl Envelope {
    fn new(params: &EnvelopeParams, sample_rate: f32) -> Self {
        let samples = |ms: f32| (ms * sample_rate / 1000.0).max(1.0);
        Self {
            stage: Stage::Off,
            level: 0.0,
            attack_step: 1.0 / samples(params.attack_ms),
            decay_step: (1.0 - params.sustain_level) / samples(params.decay_ms),
            sustain_level: params.sustain_level,
            release_samples: samples(params.release_ms),
            release_step: 0.0,
        }
    }

    fn start(&mut self) {
        self.stage = Stage::Attack;
        self.level = 0.0;
    }

    fn release(&mut self) {
        if matches!(self.stage, Stage::Off | Stage::Release) {
            return;
        }
        self.stage = Stage::Release;
        self.release_step = self.level / self.release_samples;
    }

    fn kill(&mut self) {
        self.stage = Stage::Off;
        self.level = 0.0;
    }

    fn next(&mut self) -> f32 {
        match self.stage {
            Stage::Off => return 0.0,
            Stage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.sustain_level {
                    self.level = self.sustain_level;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.kill();
                }
            }
        }
        self.level
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPluck {
    frequency_hz: f32,
    gain: f32,
    delay_samples: u32,
}

/// One Karplus-Strong delay line plus its envelope
#[derive(Debug, Clone)]
struct PluckedString {
    delay_line: Vec<f32>,
    period: usize,
    position: usize,
    gain: f32,
    envelope: Envelope,
    pending: Option<PendingPluck>,
}

impl PluckedString {
    fn new(capacity: usize, envelope: Envelope) -> Self {
        Self {
            delay_line: vec![0.0; capacity],
            period: capacity,
            position: 0,
            gain: 0.0,
            envelope,
            pending: None,
        }
    }

    fn excite(&mut self, pluck: PendingPluck, sample_rate: f32, rng: &mut StdRng) {
        let period = (sample_rate / pluck.frequency_hz.max(MIN_FREQUENCY_HZ)).round() as usize;
        self.period = period.clamp(2, self.delay_line.len());
        self.position = 0;
        for sample in self.delay_line[..self.period].iter_mut() {
            *sample = rng.gen_range(-1.0..1.0);
        }
        self.gain = pluck.gain;
        self.envelope.start();
    }

    fn next_sample(&mut self, sample_rate: f32, rng: &mut StdRng) -> f32 {
        if let Some(mut pluck) = self.pending {
            if pluck.delay_samples == 0 {
                self.pending = None;
                self.excite(pluck, sample_rate, rng);
            } else {
                pluck.delay_samples -= 1;
                self.pending = Some(pluck);
            }
        }

        if self.envelope.stage == Stage::Off {
            return 0.0;
        }

        let current = self.delay_line[self.position];
        let next_position = (self.position + 1) % self.period;
        let next = self.delay_line[next_position];
        self.delay_line[self.position] = STRING_DAMPING * 0.5 * (current + next);
        self.position = next_position;

        current * self.envelope.next() * self.gain
    }

    fn is_active(&self) -> bool {
        self.pending.is_some() || self.envelope.stage != Stage::Off
    }
}

/// Six plucked strings mixed to mono
#[derive(Debug, Clone)]
pub struct SynthBank {
    strings: [PluckedString; STRING_COUNT],
    sample_rate: f32,
    muted: bool,
    volume: f32,
    rng: StdRng,
    frames_rendered: u64,
}

impl SynthBank {
    pub fn new(sample_rate: u32, envelope: EnvelopeParams) -> Self {
        let rate = sample_rate.max(1) as f32;
        let capacity = (rate / MIN_FREQUENCY_HZ).ceil() as usize + 1;
        let shape = Envelope::new(&envelope, rate);
        Self {
            strings: std::array::from_fn(|_| PluckedString::new(capacity, shape.clone())),
            sample_rate: rate,
            muted: false,
            volume: 1.0,
            // Fixed seed keeps offline renders reproducible.
            rng: StdRng::seed_from_u64(42),
            frames_rendered: 0,
        }
    }

    pub fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Trigger {
                string,
                frequency_hz,
                gain,
                delay_ms,
            } => {
                if let Some(target) = self.strings.get_mut(string) {
                    let delay_samples = (delay_ms.max(0.0) * self.sample_rate / 1000.0) as u32;
                    target.pending = Some(PendingPluck {
                        frequency_hz,
                        gain,
                        delay_samples,
                    });
                }
            }
            VoiceCommand::Release { string } => {
                if let Some(target) = self.strings.get_mut(string) {
                    // A release before the onset cancels the pluck.
                    target.pending = None;
                    target.envelope.release();
                }
            }
            VoiceCommand::SetVolume { volume } => self.volume = volume,
            VoiceCommand::Mute { muted } => self.muted = muted,
            VoiceCommand::StopAll => {
                for target in self.strings.iter_mut() {
                    target.pending = None;
                    target.envelope.kill();
                }
            }
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let mut mix = 0.0_f32;
        for string in self.strings.iter_mut() {
            mix += string.next_sample(self.sample_rate, &mut self.rng);
        }
        self.frames_rendered += 1;
        if self.muted {
            0.0
        } else {
            mix.clamp(-1.0, 1.0)
        }
    }

    /// Fill `out` with mono samples.
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }

    pub fn active_strings(&self) -> usize {
        self.strings.iter().filter(|s| s.is_active()).count()
    }

    /// Last master volume received; gains already include it
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }
}

/// Render timestamped commands offline into a mono buffer.
///
/// # Arguments
/// * `commands` - `(at_ms, command)` pairs in submission order, timed from
///   the start of the buffer
/// * `sample_rate` - Output rate in Hz
/// * `envelope` - Envelope applied to every string
/// * `duration_ms` - Length of the rendered buffer
///
/// # Returns
/// `duration_ms * sample_rate / 1000` samples
pub fn render_timeline(
    commands: &[(f64, VoiceCommand)],
    sample_rate: u32,
    envelope: EnvelopeParams,
    duration_ms: f64,
) -> Vec<f32> {
    let mut bank = SynthBank::new(sample_rate, envelope);
    let total = (duration_ms.max(0.0) * sample_rate as f64 / 1000.0) as usize;
    let mut out = Vec::with_capacity(total);
    let mut next = 0;

    for frame in 0..total {
        let now_ms = frame as f64 * 1000.0 / sample_rate as f64;
        while next < commands.len() && commands[next].0 <= now_ms {
            bank.apply(commands[next].1);
            next += 1;
        }
        out.push(bank.next_sample());
    }
    out
}
