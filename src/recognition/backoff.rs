// Reconnect backoff: base delay doubling per attempt, capped, bounded count

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RecognitionConfig;

/// Exponential reconnect schedule with optional jitter
#[derive(Debug)]
pub struct ReconnectBackoff {
    base_ms: u64,
    max_ms: u64,
    max_attempts: u32,
    jitter: f64,
    attempt: u32,
    rng: StdRng,
}

impl ReconnectBackoff {
    pub fn new(base_ms: u64, max_ms: u64, max_attempts: u32, jitter: f64) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            max_attempts,
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self::new(
            config.backoff_base_ms,
            config.backoff_max_ms,
            config.max_reconnect_attempts,
            config.backoff_jitter,
        )
    }

    /// Deterministic jitter, for tests and replay
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Attempts made since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Un-jittered delay before attempt `attempt` (0-based)
    pub fn nominal_delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let nominal = self.nominal_delay_ms(self.attempt) as f64;
        let spread = if self.jitter > 0.0 {
            self.rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        self.attempt += 1;
        Some(Duration::from_millis((nominal * (1.0 + spread)).round() as u64))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
