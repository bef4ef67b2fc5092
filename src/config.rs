use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::particles::ColorMode;

pub const DENSITY_RANGE: (f32, f32) = (0.1, 5.0);
pub const SIZE_RANGE: (f32, f32) = (0.25, 4.0);
pub const BEAT_THRESHOLD_RANGE: (f32, f32) = (1.0, 2.0);
pub const BEAT_COOLDOWN_RANGE_MS: (f64, f64) = (0.0, 2000.0);

/// Top-level settings for the whole pipeline.
///
/// Every section falls back to its defaults when missing from a JSON file,
/// and every numeric field is clamped into its valid range by
/// [`VisualizerConfig::sanitized`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub audio: AudioConfig,
    pub motion: MotionConfig,
    pub particles: ParticleConfig,
    pub paint: PaintConfig,
    pub sources: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Transform size; the magnitude buffer holds half as many bins
    pub fft_size: usize,
    /// Exponential smoothing factor for band levels (0 = raw, 1 = frozen)
    pub smoothing: f32,
    pub beat_threshold: f32,
    pub beat_cooldown_ms: f64,
    pub adaptive_gain: bool,
    /// Per-tick decay of the loudness envelope toward its midpoint
    pub envelope_decay: f32,
    pub spectrum_bands: usize,
    /// Time constant of the analyser's magnitude smoothing
    pub analyser_smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.7,
            beat_threshold: 1.3,
            beat_cooldown_ms: 100.0,
            adaptive_gain: true,
            envelope_decay: 0.999,
            spectrum_bands: 32,
            analyser_smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub width: usize,
    pub height: usize,
    pub hd_width: usize,
    pub hd_height: usize,
    /// Luminance difference above which a pixel counts as moving
    pub threshold: f32,
    pub trail_decay: f32,
    pub smoothing: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            hd_width: 1280,
            hd_height: 720,
            threshold: 15.0,
            trail_decay: 0.92,
            smoothing: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    pub density: f32,
    pub size: f32,
    pub color_mode: ColorMode,
    pub confetti_capacity: usize,
    pub spark_capacity: usize,
    pub bubble_capacity: usize,
    /// Normalized motion-heat level that counts as a collision
    pub collision_threshold: f32,
    /// Fixed RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            size: 1.0,
            color_mode: ColorMode::Fire,
            confetti_capacity: 600,
            spark_capacity: 1500,
            bubble_capacity: 400,
            collision_threshold: 0.25,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaintConfig {
    pub sensitivity: f32,
    pub color_speed: f32,
    /// Seconds a painted pixel holds before it starts fading
    pub fade_delay: f32,
}

impl Default for PaintConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.3,
            color_speed: 0.2,
            fade_delay: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub microphone: bool,
    pub wav_path: Option<String>,
    pub mjpeg_url: Option<String>,
    /// Treat the remote stream as display-only (no pixel analysis)
    pub display_only: bool,
    pub acquire_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            microphone: false,
            wav_path: None,
            mjpeg_url: None,
            display_only: false,
            acquire_timeout_ms: 8000,
        }
    }
}

impl VisualizerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: VisualizerConfig = serde_json::from_str(&json)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("writing config {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Clamp every field into its valid range.
    pub fn sanitized(mut self) -> Self {
        let audio = &mut self.audio;
        audio.fft_size = audio.fft_size.clamp(512, 32768).next_power_of_two();
        audio.smoothing = clamp_unit(audio.smoothing);
        audio.beat_threshold = clamp_or(audio.beat_threshold, BEAT_THRESHOLD_RANGE, 1.3);
        audio.beat_cooldown_ms = clamp_or(audio.beat_cooldown_ms, BEAT_COOLDOWN_RANGE_MS, 100.0);
        audio.envelope_decay = audio.envelope_decay.clamp(0.9, 1.0);
        audio.spectrum_bands = audio.spectrum_bands.clamp(1, 256);
        audio.analyser_smoothing = clamp_unit(audio.analyser_smoothing);
        if audio.max_db <= audio.min_db {
            audio.min_db = AudioConfig::default().min_db;
            audio.max_db = AudioConfig::default().max_db;
        }

        let motion = &mut self.motion;
        motion.width = motion.width.clamp(8, 640);
        motion.height = motion.height.clamp(8, 480);
        motion.hd_width = motion.hd_width.clamp(motion.width, 3840);
        motion.hd_height = motion.hd_height.clamp(motion.height, 2160);
        motion.threshold = clamp_or(motion.threshold, (0.0, 255.0), 15.0);
        motion.trail_decay = clamp_unit(motion.trail_decay);
        motion.smoothing = clamp_unit(motion.smoothing);

        let particles = &mut self.particles;
        particles.density = particles.density.clamp(DENSITY_RANGE.0, DENSITY_RANGE.1);
        particles.size = particles.size.clamp(SIZE_RANGE.0, SIZE_RANGE.1);
        particles.confetti_capacity = particles.confetti_capacity.clamp(1, 20_000);
        particles.spark_capacity = particles.spark_capacity.clamp(1, 20_000);
        particles.bubble_capacity = particles.bubble_capacity.clamp(1, 20_000);
        particles.collision_threshold = clamp_unit(particles.collision_threshold);

        let paint = &mut self.paint;
        paint.sensitivity = clamp_unit(paint.sensitivity);
        paint.color_speed = paint.color_speed.clamp(0.0, 5.0);
        paint.fade_delay = paint.fade_delay.clamp(0.0, 30.0);

        self.sources.acquire_timeout_ms = self.sources.acquire_timeout_ms.clamp(100, 60_000);
        self
    }
}

/// Clamp to `[0,1]`, mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp into `range`; values that compare with neither bound (NaN) become
/// `fallback`.
pub fn clamp_or<T: PartialOrd + Copy>(value: T, range: (T, T), fallback: T) -> T {
    if value < range.0 {
        range.0
    } else if value > range.1 {
        range.1
    } else if value >= range.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_clamps_out_of_range_values() {
        let mut config = VisualizerConfig::default();
        config.audio.beat_threshold = 3.5;
        config.audio.smoothing = -1.0;
        config.particles.density = 100.0;
        config.motion.trail_decay = 1.7;
        config.paint.sensitivity = f32::NAN;

        let config = config.sanitized();
        assert_eq!(config.audio.beat_threshold, 2.0);
        assert_eq!(config.audio.smoothing, 0.0);
        assert_eq!(config.particles.density, 5.0);
        assert_eq!(config.motion.trail_decay, 1.0);
        assert_eq!(config.paint.sensitivity, 0.0);
    }

    #[test]
    fn test_clamp_or_replaces_nan() {
        assert_eq!(clamp_or(f32::NAN, BEAT_THRESHOLD_RANGE, 1.3), 1.3);
        assert_eq!(clamp_or(f64::NAN, BEAT_COOLDOWN_RANGE_MS, 100.0), 100.0);
        assert_eq!(clamp_or(0.5f32, (0.0, 1.0), 0.2), 0.5);
        assert_eq!(clamp_or(-4.0f32, (0.0, 1.0), 0.2), 0.0);
        assert_eq!(clamp_or(f32::INFINITY, DENSITY_RANGE, 1.0), 5.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "audio": { "smoothing": 0.5 }, "particles": { "seed": 7 } }"#;
        let config: VisualizerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.audio.smoothing, 0.5);
        assert_eq!(config.audio.fft_size, 2048);
        assert_eq!(config.particles.seed, Some(7));
        assert_eq!(config.motion.width, 160);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visualizer.json");

        let mut config = VisualizerConfig::default();
        config.sources.mjpeg_url = Some("http://camera.local/stream".to_string());
        config.save(&path).unwrap();

        let loaded = VisualizerConfig::load(&path).unwrap();
        assert_eq!(loaded.sources.mjpeg_url, config.sources.mjpeg_url);
        assert_eq!(loaded.particles.color_mode, ColorMode::Fire);
    }
}
