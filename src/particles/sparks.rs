use glam::Vec2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use super::pool::ParticlePool;
use super::{make_rng, on_screen, ColorMode, FieldView, ParticleInputs, ParticleSystem, RenderBuffers, Tuning, ALPHA_FLOOR};
use crate::motion::MotionFrame;

/// Per-tick velocity retention; sparks carry no gravity.
pub const VELOCITY_RETENTION: f32 = 0.985;
/// Grid cells between a candidate pixel and the sample ahead of it.
pub const EDGE_PROBE: i64 = 4;
/// Normalized heat a cell needs before it can emit.
pub const EDGE_THRESHOLD: f32 = 0.3;
/// Edge spawns per tick at density 1.
pub const MAX_EDGE_SPAWNS: usize = 24;
/// Velocity magnitude below which motion has no usable direction.
pub const MIN_DIRECTIONAL_SPEED: f32 = 0.05;
/// Intensity below which nothing is emitted.
pub const MIN_EMIT_INTENSITY: f32 = 0.02;
/// Fan spawns per tick at full intensity and density 1.
pub const FAN_SPAWNS: f32 = 20.0;
pub const FAN_SPREAD: f32 = 0.6;
pub const EDGE_SPREAD: f32 = 0.35;
pub const IMPACT_HEAT: f32 = 0.4;
pub const IMPACT_COOLDOWN: f32 = 0.15;
const SCAN_STRIDE: usize = 2;

#[derive(Debug, Clone, Default)]
struct Spark {
    pos: Vec2,
    vel: Vec2,
    /// Color temperature, 1 = white hot
    heat: f32,
    seed: f32,
    size: f32,
    alpha: f32,
    age: f32,
    max_age: f32,
    /// Seconds until another impact may reheat the spark
    impact_cooldown: f32,
}

/// Sparks thrown off moving silhouettes.
///
/// Emission prefers the leading edge of the motion blob: a hot cell whose
/// neighbour a few cells ahead along the global motion direction is
/// cooler. When no such edge exists the sparks fan out from the motion
/// centroid instead.
pub struct SparkSystem {
    pool: ParticlePool<Spark>,
    rng: StdRng,
    tuning: Tuning,
    emitting: bool,
    edges: Vec<Vec2>,
    buffers: RenderBuffers,
}

impl SparkSystem {
    pub fn new(capacity: usize, seed: Option<u64>) -> Self {
        Self {
            pool: ParticlePool::new(capacity),
            rng: make_rng(seed),
            tuning: Tuning::default(),
            emitting: false,
            edges: Vec::new(),
            buffers: RenderBuffers::default(),
        }
    }

    pub fn set_emitting(&mut self, emitting: bool) {
        self.emitting = emitting;
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    /// Emit for one tick of motion; returns the number of sparks spawned.
    pub fn emit(&mut self, motion: &MotionFrame, field: Option<FieldView<'_>>) -> usize {
        if motion.intensity < MIN_EMIT_INTENSITY {
            return 0;
        }
        // Image rows grow downward; particle y grows upward
        let velocity = Vec2::new(motion.velocity_x, -motion.velocity_y);
        let speed = velocity.length().min(1.0);

        if let Some(field) = field {
            if speed >= MIN_DIRECTIONAL_SPEED {
                self.find_leading_edges(field, velocity.normalize());
                if !self.edges.is_empty() {
                    return self.emit_from_edges(velocity, speed);
                }
            }
        }
        self.emit_fan(motion, velocity, speed)
    }

    fn find_leading_edges(&mut self, field: FieldView<'_>, direction: Vec2) {
        self.edges.clear();
        let grid = field.grid();
        let (width, height) = (grid.width(), grid.height());
        if width == 0 || height == 0 {
            return;
        }
        // Probe offset in grid cells, image orientation
        let dx = (direction.x * EDGE_PROBE as f32).round() as i64;
        let dy = (-direction.y * EDGE_PROBE as f32).round() as i64;

        for y in (0..height).step_by(SCAN_STRIDE) {
            for x in (0..width).step_by(SCAN_STRIDE) {
                let Some(heat) = grid.get(x, y) else { continue };
                if heat / 255.0 <= EDGE_THRESHOLD {
                    continue;
                }
                let ahead = grid.get_signed(x as i64 + dx, y as i64 + dy).unwrap_or(0.0);
                if ahead < heat {
                    self.edges.push(Vec2::new(
                        (x as f32 + 0.5) / width as f32,
                        1.0 - (y as f32 + 0.5) / height as f32,
                    ));
                }
            }
        }
    }

    fn emit_from_edges(&mut self, velocity: Vec2, speed: f32) -> usize {
        let budget = ((MAX_EDGE_SPAWNS as f32) * self.tuning.density).round() as usize;
        let mut edges = std::mem::take(&mut self.edges);
        let (chosen, _) = edges.partial_shuffle(&mut self.rng, budget);
        let base_angle = velocity.y.atan2(velocity.x);

        let mut spawned = 0;
        for &origin in chosen.iter() {
            let angle = base_angle + self.rng.gen_range(-EDGE_SPREAD..EDGE_SPREAD);
            let launch = 0.2 + speed * 0.8;
            if self.launch(origin, angle, launch, speed) {
                spawned += 1;
            }
        }
        self.edges = edges;
        spawned
    }

    fn emit_fan(&mut self, motion: &MotionFrame, velocity: Vec2, speed: f32) -> usize {
        let count = (motion.intensity * FAN_SPAWNS * self.tuning.density).round() as usize;
        let origin = Vec2::new(motion.center_x, 1.0 - motion.center_y);
        let directional = speed >= MIN_DIRECTIONAL_SPEED;
        let base_angle = velocity.y.atan2(velocity.x);

        let mut spawned = 0;
        for _ in 0..count {
            let angle = if directional {
                base_angle + self.rng.gen_range(-FAN_SPREAD..FAN_SPREAD)
            } else {
                self.rng.gen_range(0.0..std::f32::consts::TAU)
            };
            let launch = 0.15 + speed * 0.8;
            if self.launch(origin, angle, launch, speed) {
                spawned += 1;
            }
        }
        spawned
    }

    /// Spawn one spark; bigger, hotter and longer-lived with faster motion.
    fn launch(&mut self, origin: Vec2, angle: f32, launch_speed: f32, motion_speed: f32) -> bool {
        let size_scale = self.tuning.size;
        let rng = &mut self.rng;
        self.pool.spawn(|s| {
            let jitter = rng.gen_range(0.8..1.2);
            s.pos = origin;
            s.vel = Vec2::from_angle(angle) * launch_speed * jitter;
            s.heat = 0.7 + 0.3 * motion_speed;
            s.seed = rng.gen_range(0.0..1.0);
            s.size = (2.0 + motion_speed * 6.0) * size_scale * jitter;
            s.alpha = 1.0;
            s.max_age = (0.5 + motion_speed * 1.5) * jitter;
        })
    }

    /// Integrate one tick without emitting.
    pub fn advance(&mut self, dt: f32, field: Option<FieldView<'_>>) {
        self.pool.update(|s| step(s, dt, field));
    }

    fn pack(&mut self, time: f32) {
        self.buffers.clear();
        let mode = self.tuning.color_mode;
        for s in self.pool.iter_active() {
            let color = mode.color(s.seed, s.heat, time);
            self.buffers.push(s.pos, color, s.alpha, s.size, 0.0);
        }
    }
}

fn step(s: &mut Spark, dt: f32, field: Option<FieldView<'_>>) -> bool {
    s.vel *= VELOCITY_RETENTION;
    s.pos += s.vel * dt;
    s.age += dt;

    s.heat = (s.heat - dt / s.max_age.max(f32::EPSILON)).max(0.0);
    s.impact_cooldown = (s.impact_cooldown - dt).max(0.0);
    if let Some(field) = field {
        if s.impact_cooldown <= 0.0 && field.is_solid(s.pos) {
            s.heat = (s.heat + IMPACT_HEAT).min(1.0);
            s.impact_cooldown = IMPACT_COOLDOWN;
        }
    }

    let life = 1.0 - s.age / s.max_age.max(f32::EPSILON);
    s.alpha = life * (0.4 + 0.6 * s.heat);
    s.age < s.max_age && s.alpha >= ALPHA_FLOOR && on_screen(s.pos, 1.0 + super::SCREEN_MARGIN)
}

impl ParticleSystem for SparkSystem {
    fn name(&self) -> &'static str {
        "sparks"
    }

    fn update(&mut self, inputs: &ParticleInputs) {
        if self.emitting {
            if let Some(motion) = inputs.motion.as_ref() {
                self.emit(motion, inputs.field);
            }
        }
        self.advance(inputs.dt, inputs.field);
        self.pack(inputs.time);
    }

    fn clear(&mut self) {
        self.pool.clear();
        self.buffers.clear();
        self.edges.clear();
    }

    fn set_density(&mut self, density: f32) {
        self.tuning.set_density(density);
    }

    fn set_size_scale(&mut self, size: f32) {
        self.tuning.set_size(size);
    }

    fn set_color_mode(&mut self, mode: ColorMode) {
        self.tuning.color_mode = mode;
    }

    fn resize_capacity(&mut self, capacity: usize) {
        self.pool.resize(capacity);
    }

    fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    fn render_buffers(&self) -> &RenderBuffers {
        &self.buffers
    }
}
