use glam::Vec2;
use rand::rngs::StdRng;
use rand::Rng;

use super::pool::ParticlePool;
use super::{make_rng, on_screen, ColorMode, FieldView, ParticleInputs, ParticleSystem, RenderBuffers, Tuning, ALPHA_FLOOR};

pub const GRAVITY: f32 = 1.2;
pub const BASE_DRAG: f32 = 0.15;
/// Drag multiplier for a piece seen edge-on (flatness 0)
pub const EDGE_DRAG: f32 = 0.8;
/// Drag multiplier for a piece falling flat (flatness 1)
pub const FLAT_DRAG: f32 = 7.0;
/// Fraction of gravity cancelled by lift when fully flat
pub const MAX_LIFT: f32 = 0.6;
pub const ANGULAR_DAMPING: f32 = 0.93;
pub const AIRFLOW_TORQUE: f32 = 20.0;
pub const STALL_SPEED: f32 = 0.15;
pub const STALL_FLATNESS: f32 = 0.7;
pub const FLUTTER_CHANCE: f32 = 0.1;
pub const FLUTTER_IMPULSE: f32 = 3.0;
pub const LATERAL_DRIFT: f32 = 0.3;
pub const BAT_KICK: f32 = 0.3;
pub const BAT_SPIN: f32 = 8.0;
pub const BAT_FADE: f32 = 0.85;
/// Pieces per second at full energy and density 1
pub const EMIT_RATE: f32 = 40.0;
pub const BEAT_BURST: f32 = 30.0;
const TOP_LIMIT: f32 = 1.3;

/// Orientation-dependent forces for a given pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aerodynamics {
    /// |cos(pitch)|: 1 when falling flat, 0 when edge-on
    pub flatness: f32,
    pub drag_multiplier: f32,
    /// Downward acceleration after lift
    pub gravity: f32,
}

impl Aerodynamics {
    pub fn at_pitch(pitch: f32) -> Self {
        let flatness = pitch.cos().abs();
        Self {
            flatness,
            drag_multiplier: EDGE_DRAG + (FLAT_DRAG - EDGE_DRAG) * flatness,
            gravity: GRAVITY * (1.0 - MAX_LIFT * flatness),
        }
    }

    pub fn drag(&self) -> f32 {
        BASE_DRAG * self.drag_multiplier
    }
}

#[derive(Debug, Clone, Default)]
struct Confetti {
    pos: Vec2,
    vel: Vec2,
    /// Tumble angle; drives flatness
    pitch: f32,
    /// Spin in the screen plane
    yaw: f32,
    pitch_vel: f32,
    yaw_vel: f32,
    /// Sign and strength of airflow-induced tumbling
    torque_bias: f32,
    seed: f32,
    size: f32,
    alpha: f32,
    age: f32,
    max_age: f32,
}

/// Falling paper confetti that tumbles, flutters and gets batted away by
/// motion.
pub struct ConfettiSystem {
    pool: ParticlePool<Confetti>,
    rng: StdRng,
    tuning: Tuning,
    emit_budget: f32,
    emitting: bool,
    buffers: RenderBuffers,
}

impl ConfettiSystem {
    pub fn new(capacity: usize, seed: Option<u64>) -> Self {
        Self {
            pool: ParticlePool::new(capacity),
            rng: make_rng(seed),
            tuning: Tuning::default(),
            emit_budget: 0.0,
            emitting: true,
            buffers: RenderBuffers::default(),
        }
    }

    /// Enable or disable time-based and beat emission.
    pub fn set_emitting(&mut self, emitting: bool) {
        self.emitting = emitting;
    }

    /// Drop up to `count` pieces just above the top edge. Returns how many
    /// fit in the pool.
    pub fn spawn(&mut self, count: usize) -> usize {
        let size_scale = self.tuning.size;
        let rng = &mut self.rng;
        let mut spawned = 0;
        for _ in 0..count {
            let ok = self.pool.spawn(|c| {
                c.pos = Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(1.0..1.1));
                c.vel = Vec2::new(rng.gen_range(-0.1..0.1), rng.gen_range(-0.2..0.0));
                c.pitch = rng.gen_range(0.0..std::f32::consts::TAU);
                c.yaw = rng.gen_range(0.0..std::f32::consts::TAU);
                c.pitch_vel = rng.gen_range(-4.0..4.0);
                c.yaw_vel = rng.gen_range(-4.0..4.0);
                let bias: f32 = rng.gen_range(0.3..1.0);
                c.torque_bias = if rng.gen_bool(0.5) { bias } else { -bias };
                c.seed = rng.gen_range(0.0..1.0);
                c.size = rng.gen_range(6.0..12.0) * size_scale;
                c.alpha = 1.0;
                c.max_age = rng.gen_range(8.0..12.0);
            });
            if !ok {
                break;
            }
            spawned += 1;
        }
        spawned
    }

    /// Integrate one tick without emitting anything.
    pub fn advance(&mut self, dt: f32, field: Option<FieldView<'_>>) {
        let rng = &mut self.rng;
        self.pool.update(|c| step(c, dt, field, rng));
    }

    fn emit(&mut self, inputs: &ParticleInputs) {
        let density = self.tuning.density;
        self.emit_budget += EMIT_RATE * density * (0.25 + inputs.audio.energy) * inputs.dt;
        let mut count = self.emit_budget.floor() as usize;
        self.emit_budget -= count as f32;
        if inputs.audio.beat_detected {
            count += (BEAT_BURST * density).round() as usize;
        }
        self.spawn(count);
    }

    fn pack(&mut self, time: f32) {
        self.buffers.clear();
        let mode = self.tuning.color_mode;
        for c in self.pool.iter_active() {
            // Foreshortening: an edge-on piece shows a sliver
            let visible = 0.25 + 0.75 * c.pitch.cos().abs();
            let color = mode.color(c.seed, 0.5 + 0.5 * visible, time);
            self.buffers.push(c.pos, color, c.alpha, c.size * visible, c.yaw);
        }
    }
}

fn step(c: &mut Confetti, dt: f32, field: Option<FieldView<'_>>, rng: &mut StdRng) -> bool {
    let aero = Aerodynamics::at_pitch(c.pitch);

    c.vel.y -= aero.gravity * dt;
    c.vel.x += LATERAL_DRIFT * (c.pitch + c.yaw).sin() * dt;
    c.vel *= (1.0 - aero.drag() * dt).max(0.0);

    // Falling through the air makes flat pieces tumble
    let speed = c.vel.length();
    c.pitch_vel += AIRFLOW_TORQUE * speed * aero.flatness * c.torque_bias * dt;

    if speed < STALL_SPEED && aero.flatness > STALL_FLATNESS && rng.gen::<f32>() < FLUTTER_CHANCE {
        c.pitch_vel += rng.gen_range(-FLUTTER_IMPULSE..FLUTTER_IMPULSE);
        c.yaw_vel += rng.gen_range(-FLUTTER_IMPULSE..FLUTTER_IMPULSE);
    }

    c.pitch_vel *= ANGULAR_DAMPING;
    c.yaw_vel *= ANGULAR_DAMPING;
    c.pitch += c.pitch_vel * dt;
    c.yaw += c.yaw_vel * dt;
    c.pos += c.vel * dt;

    if let Some(field) = field {
        if field.is_solid(c.pos) {
            c.pitch_vel += rng.gen_range(-BAT_SPIN..BAT_SPIN);
            c.yaw_vel += rng.gen_range(-BAT_SPIN..BAT_SPIN);
            c.vel.y += BAT_KICK;
            c.alpha *= BAT_FADE;
        }
    }

    c.age += dt;
    c.age < c.max_age && c.alpha >= ALPHA_FLOOR && on_screen(c.pos, TOP_LIMIT)
}

impl ParticleSystem for ConfettiSystem {
    fn name(&self) -> &'static str {
        "confetti"
    }

    fn update(&mut self, inputs: &ParticleInputs) {
        if self.emitting {
            self.emit(inputs);
        }
        self.advance(inputs.dt, inputs.field);
        self.pack(inputs.time);
    }

    fn clear(&mut self) {
        self.pool.clear();
        self.buffers.clear();
        self.emit_budget = 0.0;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::grid::Grid;
    use std::f32::consts::FRAC_PI_2;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_flatness_law() {
        let flat = Aerodynamics::at_pitch(0.0);
        assert_eq!(flat.flatness, 1.0);
        assert!((flat.drag_multiplier - 7.0).abs() < 1e-6);
        assert!((flat.gravity - 0.48).abs() < 1e-6);

        let edge = Aerodynamics::at_pitch(FRAC_PI_2);
        assert!(edge.flatness < 1e-6);
        assert!((edge.drag_multiplier - 0.8).abs() < 1e-5);
        assert!((edge.gravity - 1.2).abs() < 1e-5);
    }

    #[test]
    fn test_seeded_confetti_clears_screen_in_five_seconds() {
        let mut system = ConfettiSystem::new(200, Some(1234));
        assert_eq!(system.spawn(100), 100);

        for tick in 0..300 {
            system.advance(DT, None);
            assert_eq!(system.pool.active_count(), system.pool.counted_active(), "tick {}", tick);
        }
        assert_eq!(system.active_count(), 0);
    }

    #[test]
    fn test_identical_seeds_are_deterministic() {
        let run = || {
            let mut system = ConfettiSystem::new(50, Some(7));
            system.spawn(20);
            for _ in 0..60 {
                system.advance(DT, None);
            }
            system.pack(1.0);
            system.render_buffers().positions.clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_motion_bats_confetti_upward() {
        let heat: Grid<f32> = Grid::filled(16, 12, 255.0);
        let field = FieldView::new(&heat, 0.25);
        let mut system = ConfettiSystem::new(10, Some(3));
        system.spawn(1);

        // Move the piece into the field
        system.pool.update(|c| {
            c.pos = Vec2::new(0.5, 0.5);
            c.vel = Vec2::ZERO;
            true
        });
        system.advance(DT, Some(field));

        let c = system.pool.iter_active().next().unwrap();
        assert!(c.vel.y > 0.2, "vy = {}", c.vel.y);
        assert!((c.alpha - BAT_FADE).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_batting_fades_out() {
        let heat: Grid<f32> = Grid::filled(16, 12, 255.0);
        let field = FieldView::new(&heat, 0.25);
        let mut system = ConfettiSystem::new(10, Some(9));
        system.spawn(1);
        for _ in 0..40 {
            system.pool.update(|c| {
                c.pos = Vec2::new(0.5, 0.5);
                true
            });
            system.advance(DT, Some(field));
        }
        assert_eq!(system.active_count(), 0);
    }

    #[test]
    fn test_beat_triggers_burst_and_buffers_match() {
        let mut system = ConfettiSystem::new(600, Some(5));
        let mut audio = AudioFrame::default();
        audio.beat_detected = true;
        let inputs = ParticleInputs {
            dt: DT,
            time: 0.0,
            audio: &audio,
            motion: None,
            field: None,
        };
        system.update(&inputs);
        assert!(system.active_count() >= 30);
        assert_eq!(system.render_buffers().len(), system.active_count());
        assert_eq!(system.render_buffers().alphas.len(), system.active_count());
    }

    #[test]
    fn test_clear_and_resize() {
        let mut system = ConfettiSystem::new(100, Some(11));
        system.spawn(80);
        system.resize_capacity(50);
        assert_eq!(system.active_count(), 50);
        assert_eq!(system.capacity(), 50);
        system.clear();
        assert_eq!(system.active_count(), 0);
        assert_eq!(system.capacity(), 50);
    }
}
