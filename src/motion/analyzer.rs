use glam::Vec2;
use log::debug;

use super::frame::{luminance, VideoFrame};
use super::{MotionFrame, MotionMode};
use crate::audio::exp_smooth;
use crate::config::{clamp_or, clamp_unit, MotionConfig};
use crate::grid::Grid;

/// Luminance difference used when a caller passes an unusable threshold.
pub const DEFAULT_THRESHOLD: f32 = 15.0;
/// Moving-pixel count below which the centroid is treated as noise.
pub const MIN_MOVING_PIXELS: usize = 10;
/// Amplification applied to the centroid finite difference.
pub const VELOCITY_GAIN: f32 = 15.0;
/// Per-tick velocity decay while motion is below the noise floor.
pub const VELOCITY_DECAY: f32 = 0.9;
/// Gain applied to a moving pixel's difference when heating it.
pub const HEAT_GAIN: f32 = 3.0;
/// Scale from summed luminance difference to perceptual intensity.
pub const INTENSITY_GAIN: f32 = 25.0;

/// Frame-differencing motion analysis on a fixed low-resolution grid.
///
/// Incoming frames are resampled twice: to the analysis grid that drives
/// all motion math, and to an independent high-resolution buffer that is
/// only ever displayed.
pub struct MotionFieldExtractor {
    config: MotionConfig,
    mode: MotionMode,

    previous: Grid<u8>,
    current: Grid<u8>,
    heat: Grid<f32>,
    rgba: VideoFrame,
    hd: VideoFrame,
    primed: bool,

    center: Vec2,
    velocity: Vec2,
    intensity: f32,
    frames_analyzed: u64,
}

impl MotionFieldExtractor {
    pub fn new(config: &MotionConfig) -> Self {
        let (w, h) = (config.width, config.height);
        Self {
            config: config.clone(),
            mode: MotionMode::Off,
            previous: Grid::new(w, h),
            current: Grid::new(w, h),
            heat: Grid::new(w, h),
            rgba: Grid::new(w, h),
            hd: Grid::new(config.hd_width, config.hd_height),
            primed: false,
            center: Vec2::splat(0.5),
            velocity: Vec2::ZERO,
            intensity: 0.0,
            frames_analyzed: 0,
        }
    }

    /// Analyse the next frame from the active source.
    pub fn process(&mut self, frame: &VideoFrame) -> MotionFrame {
        self.rgba = frame.resample(self.config.width, self.config.height);
        self.hd = frame.resample(self.config.hd_width, self.config.hd_height);

        // O(1) rotation; the stale buffer is overwritten below
        std::mem::swap(&mut self.previous, &mut self.current);
        let rgba = &self.rgba;
        self.current
            .for_each_mut(|x, y, lum| *lum = rgba.get(x, y).map_or(0, luminance));

        if !self.primed {
            self.primed = true;
            return self.frame();
        }

        let threshold = self.config.threshold;
        let decay = self.config.trail_decay;
        let mut total = 0.0f32;
        let mut weighted = Vec2::ZERO;
        let mut moving = 0usize;

        let previous = &self.previous;
        let current = &self.current;
        self.heat.for_each_mut(|x, y, heat| {
            let (Some(now), Some(before)) = (current.get(x, y), previous.get(x, y)) else {
                return;
            };
            let diff = (now as f32 - before as f32).abs();
            if diff > threshold {
                *heat = heat.max((diff * HEAT_GAIN).min(255.0));
                total += diff;
                weighted += Vec2::new(x as f32, y as f32) * diff;
                moving += 1;
            } else {
                *heat *= decay;
            }
        });

        self.update_centroid(total, weighted, moving);

        let cells = (self.config.width * self.config.height) as f32;
        let raw_intensity = (total / (cells * 128.0) * INTENSITY_GAIN).min(1.0);
        self.intensity = exp_smooth(self.intensity, raw_intensity, self.config.smoothing);

        self.frames_analyzed += 1;
        if self.frames_analyzed % 120 == 0 {
            debug!(
                "Motion: intensity={:.3} center=({:.2},{:.2}) velocity=({:.2},{:.2}) moving={}",
                self.intensity, self.center.x, self.center.y, self.velocity.x, self.velocity.y, moving
            );
        }

        self.frame()
    }

    fn update_centroid(&mut self, total: f32, weighted: Vec2, moving: usize) {
        let k = self.config.smoothing;
        if total > 0.0 && moving > MIN_MOVING_PIXELS {
            let size = Vec2::new(self.config.width as f32, self.config.height as f32);
            let raw_center = weighted / total / size;
            // Differenced against the smoothed centroid before it moves
            let raw_velocity = (raw_center - self.center) * VELOCITY_GAIN;

            self.center = Vec2::new(
                exp_smooth(self.center.x, raw_center.x, k),
                exp_smooth(self.center.y, raw_center.y, k),
            );
            self.velocity = Vec2::new(
                exp_smooth(self.velocity.x, raw_velocity.x, k),
                exp_smooth(self.velocity.y, raw_velocity.y, k),
            )
            .clamp(Vec2::splat(-1.0), Vec2::splat(1.0));
        } else {
            self.velocity *= VELOCITY_DECAY;
        }
    }

    pub fn frame(&self) -> MotionFrame {
        MotionFrame {
            intensity: clamp_unit(self.intensity),
            center_x: clamp_unit(self.center.x),
            center_y: clamp_unit(self.center.y),
            velocity_x: self.velocity.x,
            velocity_y: self.velocity.y,
            mode: self.mode,
        }
    }

    pub fn set_mode(&mut self, mode: MotionMode) {
        if mode == self.mode {
            return;
        }
        if mode == MotionMode::Off {
            self.reset_motion();
        }
        debug!("Motion mode {} -> {}", self.mode.name(), mode.name());
        self.mode = mode;
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    /// Zero intensity and velocity, clear the heat trail, and restart
    /// differencing from the next frame.
    pub fn reset_motion(&mut self) {
        self.heat.clear();
        self.previous.clear();
        self.current.clear();
        self.primed = false;
        self.center = Vec2::splat(0.5);
        self.velocity = Vec2::ZERO;
        self.intensity = 0.0;
    }

    /// Drop every buffer derived from the current source so nothing stale
    /// can be read after a disconnect or source switch.
    pub fn invalidate(&mut self) {
        self.reset_motion();
        self.rgba.clear();
        self.hd.clear();
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.config.threshold = clamp_or(threshold, (0.0, 255.0), DEFAULT_THRESHOLD);
    }

    pub fn set_trail_decay(&mut self, decay: f32) {
        self.config.trail_decay = clamp_unit(decay);
    }

    /// Motion heat per cell, `0..=255`.
    pub fn motion_field(&self) -> &Grid<f32> {
        &self.heat
    }

    pub fn rgba_frame(&self) -> &VideoFrame {
        &self.rgba
    }

    pub fn hd_frame(&self) -> &VideoFrame {
        &self.hd
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }
}
