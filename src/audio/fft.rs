use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::{clamp_unit, AudioConfig};

/// Produces the byte-scale magnitude buffer the feature extractor consumes.
///
/// Keeps the most recent `fft_size` samples in a ring, windows them with a
/// Blackman window, and maps smoothed magnitudes onto `0..=255` between
/// `min_db` and `max_db`. The output holds `fft_size / 2` bins.
pub struct FrequencyAnalyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,

    ring: Vec<f32>,
    write_pos: usize,

    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl FrequencyAnalyser {
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            fft,
            window: Self::blackman_window(fft_size),
            ring: vec![0.0; fft_size],
            write_pos: 0,
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothing: clamp_unit(config.analyser_smoothing),
            min_db: config.min_db,
            max_db: config.max_db,
        }
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let n = size as f32;
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append mono samples; older samples fall out of the ring.
    pub fn push_samples(&mut self, samples: &[f32]) {
        // Only the newest fft_size samples can matter
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.ring[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Run the transform over the current ring and write `bin_count` bytes.
    pub fn frequency_bytes(&mut self, out: &mut Vec<u8>) {
        for i in 0..self.fft_size {
            let sample = self.ring[(self.write_pos + i) % self.fft_size];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let db_span = self.max_db - self.min_db;
        out.clear();
        out.reserve(self.bin_count());
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let byte = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - self.min_db) / db_span).clamp(0.0, 255.0) as u8
            } else {
                0
            };
            out.push(byte);
        }
    }

    /// Byte-scale waveform, oldest sample first, silence at 128.
    pub fn waveform_bytes(&self, out: &mut Vec<u8>) {
        out.clear();
        out.extend((0..self.fft_size).map(|i| {
            let sample = self.ring[(self.write_pos + i) % self.fft_size];
            (128.0 + sample * 128.0).clamp(0.0, 255.0) as u8
        }));
    }

    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}
