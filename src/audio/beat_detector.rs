use std::collections::VecDeque;

use crate::config::{clamp_or, BEAT_COOLDOWN_RANGE_MS, BEAT_THRESHOLD_RANGE};

const DEFAULT_THRESHOLD: f32 = 1.3;
const DEFAULT_COOLDOWN_MS: f64 = 100.0;

/// About one second of history at 60 ticks per second.
pub const BEAT_HISTORY_LEN: usize = 43;

/// Rising-edge beat detector with a refractory period.
///
/// A beat fires when the current low-end energy exceeds the mean of the
/// recent history by `threshold`, and at least `cooldown_ms` have passed
/// since the previous beat.
pub struct BeatDetector {
    history: VecDeque<f32>,
    history_size: usize,
    threshold: f32,
    cooldown_ms: f64,
    last_beat_ms: Option<f64>,
}

impl BeatDetector {
    pub fn new(threshold: f32, cooldown_ms: f64) -> Self {
        Self {
            history: VecDeque::with_capacity(BEAT_HISTORY_LEN + 1),
            history_size: BEAT_HISTORY_LEN,
            threshold: clamp_or(threshold, BEAT_THRESHOLD_RANGE, DEFAULT_THRESHOLD),
            cooldown_ms: clamp_or(cooldown_ms, BEAT_COOLDOWN_RANGE_MS, DEFAULT_COOLDOWN_MS),
            last_beat_ms: None,
        }
    }

    /// Feed one energy sample taken at `now_ms`; returns true on a beat.
    ///
    /// The sample is compared against the history that precedes it, then
    /// joins the window.
    pub fn detect_beat(&mut self, energy: f32, now_ms: f64) -> bool {
        let energy = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
        let mean = self.mean();

        self.history.push_back(energy);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }

        let Some(mean) = mean else {
            return false;
        };

        let cooled_down = self
            .last_beat_ms
            .map_or(true, |last| now_ms - last >= self.cooldown_ms);

        let beat = cooled_down && energy > 0.0 && energy > mean * self.threshold;
        if beat {
            self.last_beat_ms = Some(now_ms);
        }
        beat
    }

    fn mean(&self) -> Option<f32> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f32>() / self.history.len() as f32)
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = clamp_or(threshold, BEAT_THRESHOLD_RANGE, DEFAULT_THRESHOLD);
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_cooldown_ms(&mut self, cooldown_ms: f64) {
        self.cooldown_ms = clamp_or(cooldown_ms, BEAT_COOLDOWN_RANGE_MS, DEFAULT_COOLDOWN_MS);
    }

    pub fn last_beat_ms(&self) -> Option<f64> {
        self.last_beat_ms
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat_ms = None;
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_COOLDOWN_MS)
    }
}
