//! AudioOutputEngine - cpal output stream driving the plucked-string synth
//!
//! The frame cadence pushes [`VoiceCommand`]s into an rtrb SPSC ring; the
//! output callback drains it at the top of every buffer and renders the
//! [`SynthBank`]. The callback does no allocation, locking or blocking.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::synth::SynthBank;
use super::voice::EnvelopeParams;
use super::VoiceCommand;
use crate::config::AudioConfig;
use crate::error::AudioError;

pub struct AudioOutputEngine {
    /// Output audio stream
    output_stream: Option<cpal::Stream>,
    /// Producer half of the command queue (frame side)
    producer: Option<Producer<VoiceCommand>>,
    /// Atomic frame counter advanced by the callback
    frame_counter: Arc<AtomicU64>,
    /// Device sample rate once started, configured rate before
    sample_rate: u32,
    queue_capacity: usize,
    envelope: EnvelopeParams,
    dropped_commands: u64,
}

impl AudioOutputEngine {
    pub fn new(config: &AudioConfig, envelope: EnvelopeParams) -> Self {
        Self {
            output_stream: None,
            producer: None,
            frame_counter: Arc::new(AtomicU64::new(0)),
            sample_rate: config.sample_rate,
            queue_capacity: config.command_queue_capacity.max(1),
            envelope,
            dropped_commands: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.output_stream.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let (producer, consumer) = RingBuffer::<VoiceCommand>::new(self.queue_capacity);
        let stream = self.create_output_stream(consumer)?;
        stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Output start failed: {}", e),
        })?;

        tracing::info!(
            "[AudioOutput] Started at {} Hz (queue capacity {})",
            self.sample_rate,
            self.queue_capacity
        );
        self.output_stream = Some(stream);
        self.producer = Some(producer);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), AudioError> {
        let Some(stream) = self.output_stream.take() else {
            return Err(AudioError::NotRunning);
        };
        drop(stream);
        self.producer = None;
        tracing::info!("[AudioOutput] Stopped");
        Ok(())
    }

    /// Queue a command for the audio thread without blocking.
    pub fn push(&mut self, command: VoiceCommand) -> Result<(), AudioError> {
        let producer = self.producer.as_mut().ok_or(AudioError::NotRunning)?;
        match producer.push(command) {
            Ok(()) => Ok(()),
            Err(PushError::Full(_)) => {
                self.dropped_commands += 1;
                Err(AudioError::QueueFull {
                    capacity: self.queue_capacity,
                })
            }
        }
    }

    /// Share of the command queue currently in use, in percent
    pub fn queue_occupancy_percent(&self) -> f32 {
        match &self.producer {
            Some(producer) => {
                let used = self.queue_capacity.saturating_sub(producer.slots());
                used as f32 / self.queue_capacity as f32 * 100.0
            }
            None => 0.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.output_stream.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    pub fn dropped_commands(&self) -> u64 {
        self.dropped_commands
    }

    fn create_output_stream(
        &mut self,
        mut consumer: Consumer<VoiceCommand>,
    ) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default output device found".to_string(),
            })?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels_count = (stream_config.channels as usize).max(1);
        self.sample_rate = stream_config.sample_rate.0;

        let mut synth = SynthBank::new(self.sample_rate, self.envelope);
        let frame_counter = Arc::clone(&self.frame_counter);

        let err_fn = |err| tracing::error!("[AudioOutput] Output stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Ok(command) = consumer.pop() {
                        synth.apply(command);
                    }

                    // data.len() = frames * channels
                    let mut frames = 0u64;
                    for frame in data.chunks_mut(channels_count) {
                        let sample = synth.next_sample();
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                        frames += 1;
                    }
                    frame_counter.fetch_add(frames, Ordering::Relaxed);
                },
                err_fn,
                None,
            ),
            _ => {
                return Err(AudioError::StreamOpenFailed {
                    reason: "Only F32 sample format is currently supported for output".to_string(),
                })
            }
        }
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        Ok(stream)
    }
}
