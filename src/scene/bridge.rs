use log::debug;

use super::paint::PaintAccumulator;
use super::uniforms::{PublishedFrame, SceneUniforms, FIELD_TEXTURE, HD_TEXTURE};
use super::Scene;
use crate::audio::AudioFrame;
use crate::config::{PaintConfig, ParticleConfig};
use crate::error::SourceKind;
use crate::grid::Grid;
use crate::motion::{MotionFrame, MotionMode, VideoFrame};

/// Simulation seconds added per tick.
pub const TIME_STEP: f32 = 0.016;
/// Per-tick decay of the beat flash.
pub const BEAT_FLASH_DECAY: f32 = 0.95;

/// Which motion source feeds the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionRoute {
    None,
    Local,
    Remote,
}

impl MotionRoute {
    /// Pick exactly one source: the scene's preference when it is
    /// connected, otherwise whichever other source is.
    pub fn select(scene: Scene, local_connected: bool, remote_connected: bool) -> Self {
        let preferred = match scene.preferred_motion_source() {
            SourceKind::RemoteStream => MotionRoute::Remote,
            _ => MotionRoute::Local,
        };
        match (preferred, local_connected, remote_connected) {
            (MotionRoute::Local, true, _) => MotionRoute::Local,
            (MotionRoute::Remote, _, true) => MotionRoute::Remote,
            (_, true, false) => MotionRoute::Local,
            (_, false, true) => MotionRoute::Remote,
            _ => MotionRoute::None,
        }
    }

    pub fn source_kind(self) -> Option<SourceKind> {
        match self {
            MotionRoute::None => None,
            MotionRoute::Local => Some(SourceKind::LocalCamera),
            MotionRoute::Remote => Some(SourceKind::RemoteStream),
        }
    }
}

/// Per-tick view of the extracted features handed to the bridge.
pub struct BridgeInputs<'a> {
    pub scene: Scene,
    pub audio: &'a AudioFrame,
    /// `None` when no source delivered analysable pixels
    pub motion: Option<MotionFrame>,
    pub mode: MotionMode,
    pub motion_field: Option<&'a Grid<f32>>,
    pub rgba: Option<&'a VideoFrame>,
    pub hd: Option<&'a VideoFrame>,
    /// Undecoded frame from a display-only source
    pub encoded: Option<&'a [u8]>,
    pub display_only: bool,
    pub particles: &'a ParticleConfig,
}

/// Assembles the published parameter set and owns the paint target.
pub struct SceneUniformBridge {
    time: f32,
    beat_flash: f32,
    paused: bool,
    resolution: [f32; 2],
    paint_config: PaintConfig,
    paint: PaintAccumulator,
    frame: PublishedFrame,
    ticks: u64,
}

impl SceneUniformBridge {
    pub fn new(paint_config: &PaintConfig) -> Self {
        let (w, h) = FIELD_TEXTURE;
        Self {
            time: 0.0,
            beat_flash: 0.0,
            paused: false,
            resolution: [HD_TEXTURE.0 as f32, HD_TEXTURE.1 as f32],
            paint_config: paint_config.clone(),
            paint: PaintAccumulator::new(w, h),
            frame: PublishedFrame::default(),
            ticks: 0,
        }
    }

    /// Step the tick-counted clock and the beat flash.
    pub fn advance_clock(&mut self, beat: bool) {
        if !self.paused {
            self.time += TIME_STEP;
        }
        self.beat_flash = if beat { 1.0 } else { self.beat_flash * BEAT_FLASH_DECAY };
    }

    /// Turn the paint accumulator on or off; turning it on always starts
    /// from blank buffers.
    pub fn set_paint_active(&mut self, active: bool) {
        match (active, self.paint.is_active()) {
            (true, false) => {
                debug!("Paint accumulation started");
                self.paint.enter();
            }
            (false, true) => {
                debug!("Paint accumulation stopped");
                self.paint.exit();
            }
            _ => {}
        }
    }

    pub fn accumulate_paint(&mut self, heat: Option<&Grid<f32>>, dt: f32) {
        if let Some(heat) = heat {
            self.paint.accumulate(heat, dt, self.time, &self.paint_config);
        }
    }

    pub fn assemble(&mut self, inputs: BridgeInputs<'_>) -> &PublishedFrame {
        let motion = inputs.motion.unwrap_or_else(|| MotionFrame::idle(inputs.mode));
        let bands = inputs.audio.frequency_bands;

        self.frame.uniforms = SceneUniforms {
            time: self.time,
            resolution: self.resolution,
            bass: bands.bass,
            mid: bands.mid,
            treble: bands.treble,
            energy: inputs.audio.energy,
            beat: self.beat_flash,
            motion_intensity: motion.intensity,
            motion_center: [motion.center_x, motion.center_y],
            motion_velocity: [motion.velocity_x, motion.velocity_y],
            motion_mode: inputs.mode.uniform_value(),
            scene: inputs.scene.uniform_value(),
            motion_available: u32::from(inputs.motion.is_some()),
            display_only: u32::from(inputs.display_only),
            paint_sensitivity: self.paint_config.sensitivity,
            paint_color_speed: self.paint_config.color_speed,
            paint_fade_delay: self.paint_config.fade_delay,
            particle_density: inputs.particles.density,
            particle_size: inputs.particles.size,
            color_mode: inputs.particles.color_mode.uniform_value(),
            paused: u32::from(self.paused),
        };

        self.frame.publish_spectrum(&inputs.audio.spectrum);
        self.frame.publish_motion_field(inputs.motion.and(inputs.motion_field));
        self.frame.publish_rgba(inputs.rgba);
        self.frame.publish_hd(inputs.hd);
        self.frame.publish_encoded(inputs.encoded);
        let paint = self.paint.is_active().then(|| self.paint.current());
        self.frame.publish_paint(paint);

        self.ticks += 1;
        if self.ticks % 120 == 0 {
            debug!(
                "Bridge: scene={} t={:.2} beat={:.2} motion={}",
                inputs.scene.name(),
                self.time,
                self.beat_flash,
                inputs.motion.is_some()
            );
        }
        &self.frame
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_resolution(&mut self, width: f32, height: f32) {
        self.resolution = [width.max(1.0), height.max(1.0)];
    }

    pub fn set_paint_config(&mut self, config: &PaintConfig) {
        self.paint_config = config.clone();
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn beat_flash(&self) -> f32 {
        self.beat_flash
    }

    pub fn paint(&self) -> &PaintAccumulator {
        &self.paint
    }

    pub fn frame(&self) -> &PublishedFrame {
        &self.frame
    }
}
