//! Pooled 2D particle simulations driven by audio and motion features.
//!
//! All positions live in normalized screen space: `x` runs left to right
//! over `[0,1]` and `y` runs bottom to top, so particles spawned just above
//! the top edge have `y` slightly above 1. The motion field uses image
//! convention (row 0 at the top), so every lookup goes through
//! [`FieldView`], which performs the flip.

pub mod bubbles;
pub mod confetti;
pub mod pool;
pub mod sparks;

pub use bubbles::BubbleSystem;
pub use confetti::ConfettiSystem;
pub use pool::ParticlePool;
pub use sparks::SparkSystem;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;
use crate::config::{clamp_or, DENSITY_RANGE, SIZE_RANGE};
use crate::grid::Grid;
use crate::motion::MotionFrame;

/// Particles further than this outside any screen edge are retired.
pub const SCREEN_MARGIN: f32 = 0.15;
/// Particles fading below this alpha are retired.
pub const ALPHA_FLOOR: f32 = 0.05;

/// Palette used when coloring particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorMode {
    /// White-hot to deep red, keyed by heat
    #[default]
    Fire,
    /// Fixed hue per particle, keyed by its seed
    Rainbow,
    /// Hue drifting with time
    Cycle,
}

impl ColorMode {
    pub const ALL: [ColorMode; 3] = [ColorMode::Fire, ColorMode::Rainbow, ColorMode::Cycle];

    pub fn next(self) -> Self {
        match self {
            ColorMode::Fire => ColorMode::Rainbow,
            ColorMode::Rainbow => ColorMode::Cycle,
            ColorMode::Cycle => ColorMode::Fire,
        }
    }

    pub fn uniform_value(self) -> u32 {
        match self {
            ColorMode::Fire => 0,
            ColorMode::Rainbow => 1,
            ColorMode::Cycle => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorMode::Fire => "fire",
            ColorMode::Rainbow => "rainbow",
            ColorMode::Cycle => "cycle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.name().eq_ignore_ascii_case(name))
    }

    /// Color for a particle with random `seed` in `[0,1)` and `heat` in
    /// `[0,1]` at simulation `time` seconds.
    pub fn color(self, seed: f32, heat: f32, time: f32) -> [f32; 3] {
        match self {
            ColorMode::Fire => fire_gradient(heat),
            ColorMode::Rainbow => hsv_to_rgb(seed, 0.85, 0.4 + 0.6 * heat),
            ColorMode::Cycle => hsv_to_rgb(time * 0.1 + seed * 0.15, 0.8, 0.4 + 0.6 * heat),
        }
    }
}

/// Black-body style ramp: 0 is dark red, 1 is near white.
pub fn fire_gradient(heat: f32) -> [f32; 3] {
    let h = heat.clamp(0.0, 1.0);
    let r = (0.35 + h * 1.3).min(1.0);
    let g = (h * 1.6 - 0.35).clamp(0.0, 1.0);
    let b = (h * 2.5 - 1.6).clamp(0.0, 1.0);
    [r, g, b]
}

/// HSV to RGB with hue in turns (wraps outside `[0,1)`).
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [f32; 3] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let c = value * saturation;
    let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// Motion heat seen from particle space.
#[derive(Clone, Copy)]
pub struct FieldView<'a> {
    heat: &'a Grid<f32>,
    threshold: f32,
}

impl<'a> FieldView<'a> {
    /// `threshold` is the normalized heat level that counts as solid.
    pub fn new(heat: &'a Grid<f32>, threshold: f32) -> Self {
        Self { heat, threshold }
    }

    /// Normalized heat (0-1) under a particle; zero off-screen.
    pub fn level(&self, pos: Vec2) -> f32 {
        self.heat.sample(pos.x, 1.0 - pos.y).map_or(0.0, |h| h / 255.0)
    }

    pub fn is_solid(&self, pos: Vec2) -> bool {
        self.level(pos) > self.threshold
    }

    /// Particle-space `y` of the upper edge of the cell under `pos`.
    pub fn cell_top(&self, pos: Vec2) -> f32 {
        let rows = self.heat.height().max(1) as f32;
        let row = ((1.0 - pos.y) * rows).floor().clamp(0.0, rows - 1.0);
        1.0 - row / rows
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn grid(&self) -> &'a Grid<f32> {
        self.heat
    }
}

/// Everything a simulation may read during one tick.
pub struct ParticleInputs<'a> {
    pub dt: f32,
    pub time: f32,
    pub audio: &'a AudioFrame,
    pub motion: Option<MotionFrame>,
    pub field: Option<FieldView<'a>>,
}

/// Parallel per-particle arrays handed to point rendering.
///
/// Rebuilt from the pool at the end of every update; every array holds
/// exactly one entry per active particle.
#[derive(Debug, Clone, Default)]
pub struct RenderBuffers {
    pub positions: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 3]>,
    pub alphas: Vec<f32>,
    pub sizes: Vec<f32>,
    pub rotations: Vec<f32>,
}

impl RenderBuffers {
    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.alphas.clear();
        self.sizes.clear();
        self.rotations.clear();
    }

    pub fn push(&mut self, pos: Vec2, color: [f32; 3], alpha: f32, size: f32, rotation: f32) {
        self.positions.push(pos.to_array());
        self.colors.push(color);
        self.alphas.push(alpha);
        self.sizes.push(size);
        self.rotations.push(rotation);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Shared surface of the confetti, spark and bubble simulations.
pub trait ParticleSystem {
    fn name(&self) -> &'static str;

    /// Emit, integrate, retire and repack for one tick.
    fn update(&mut self, inputs: &ParticleInputs);

    /// Deactivate every particle, keeping the pool's storage.
    fn clear(&mut self);

    fn set_density(&mut self, density: f32);

    fn set_size_scale(&mut self, size: f32);

    fn set_color_mode(&mut self, mode: ColorMode);

    /// Change pool capacity, keeping as many active particles as fit.
    fn resize_capacity(&mut self, capacity: usize);

    fn active_count(&self) -> usize;

    fn capacity(&self) -> usize;

    fn render_buffers(&self) -> &RenderBuffers;
}

/// Settings shared by every simulation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tuning {
    pub density: f32,
    pub size: f32,
    pub color_mode: ColorMode,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            density: 1.0,
            size: 1.0,
            color_mode: ColorMode::Fire,
        }
    }
}

impl Tuning {
    pub fn set_density(&mut self, density: f32) {
        self.density = clamp_or(density, DENSITY_RANGE, 1.0);
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = clamp_or(size, SIZE_RANGE, 1.0);
    }
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// True while `pos` is within the retirement margin around the screen.
pub(crate) fn on_screen(pos: Vec2, top: f32) -> bool {
    pos.x >= -SCREEN_MARGIN && pos.x <= 1.0 + SCREEN_MARGIN && pos.y >= -SCREEN_MARGIN && pos.y <= top
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        let close = |a: [f32; 3], b: [f32; 3]| a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5);
        assert!(close(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]));
        assert!(close(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), [0.0, 1.0, 0.0]));
        assert!(close(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), [0.0, 0.0, 1.0]));
        assert!(close(hsv_to_rgb(1.25, 0.0, 0.5), [0.5, 0.5, 0.5]));
    }

    #[test]
    fn test_fire_gradient_brightens_with_heat() {
        let cold = fire_gradient(0.0);
        let hot = fire_gradient(1.0);
        assert!(cold[0] > cold[1] && cold[1] == 0.0);
        assert_eq!(&hot[..2], &[1.0, 1.0]);
        assert!((hot[2] - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_field_view_flips_vertical_axis() {
        let mut heat: Grid<f32> = Grid::new(10, 10);
        // Top row of the image
        heat.set(5, 0, 255.0);
        let view = FieldView::new(&heat, 0.25);
        assert!(view.is_solid(Vec2::new(0.55, 0.99)));
        assert!(!view.is_solid(Vec2::new(0.55, 0.01)));
        assert_eq!(view.level(Vec2::new(0.55, 1.2)), 0.0);
        assert!((view.cell_top(Vec2::new(0.55, 0.95)) - 1.0).abs() < 1e-6);
        assert!((view.cell_top(Vec2::new(0.55, 0.85)) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_tuning_clamps() {
        let mut tuning = Tuning::default();
        tuning.set_density(50.0);
        tuning.set_size(0.0);
        assert_eq!(tuning.density, DENSITY_RANGE.1);
        assert_eq!(tuning.size, SIZE_RANGE.0);
        tuning.set_density(f32::NAN);
        assert_eq!(tuning.density, 1.0);
    }

    #[test]
    fn test_color_mode_names() {
        for mode in ColorMode::ALL {
            assert_eq!(ColorMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(ColorMode::Cycle.next(), ColorMode::Fire);
    }
}
