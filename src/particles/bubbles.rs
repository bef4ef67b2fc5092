use glam::Vec2;
use rand::rngs::StdRng;
use rand::Rng;

use super::pool::ParticlePool;
use super::{make_rng, on_screen, ColorMode, FieldView, ParticleInputs, ParticleSystem, RenderBuffers, Tuning, ALPHA_FLOOR};

pub const GRAVITY: f32 = 0.9;
/// Fraction of vertical speed kept on a bounce
pub const BOUNCE_DAMPING: f32 = 0.6;
pub const SCATTER: f32 = 0.3;
pub const MAX_HORIZONTAL_SPEED: f32 = 0.5;
pub const BOUNCE_FADE: f32 = 0.8;
pub const MAX_BOUNCES: u32 = 5;
/// Drops per second at full energy and density 1
pub const EMIT_RATE: f32 = 24.0;
pub const BEAT_BURST: f32 = 8.0;
const TOP_LIMIT: f32 = 1.3;

#[derive(Debug, Clone, Default)]
struct Bubble {
    pos: Vec2,
    vel: Vec2,
    seed: f32,
    size: f32,
    alpha: f32,
    age: f32,
    max_age: f32,
    bounces: u32,
}

/// Drops that fall under gravity and bounce off moving bodies.
pub struct BubbleSystem {
    pool: ParticlePool<Bubble>,
    rng: StdRng,
    tuning: Tuning,
    emit_budget: f32,
    emitting: bool,
    buffers: RenderBuffers,
}

impl BubbleSystem {
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

    pub fn set_emitting(&mut self, emitting: bool) {
        self.emitting = emitting;
    }

    pub fn spawn(&mut self, count: usize) -> usize {
        let size_scale = self.tuning.size;
        let rng = &mut self.rng;
        let mut spawned = 0;
        for _ in 0..count {
            let ok = self.pool.spawn(|b| {
                b.pos = Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(1.0..1.1));
                b.vel = Vec2::new(rng.gen_range(-0.05..0.05), -rng.gen_range(0.0..0.1));
                b.seed = rng.gen_range(0.0..1.0);
                b.size = rng.gen_range(8.0..18.0) * size_scale;
                b.alpha = rng.gen_range(0.7..1.0);
                b.max_age = rng.gen_range(6.0..10.0);
            });
            if !ok {
                break;
            }
            spawned += 1;
        }
        spawned
    }

    pub fn advance(&mut self, dt: f32, field: Option<FieldView<'_>>) {
        let rng = &mut self.rng;
        self.pool.update(|b| step(b, dt, field, rng));
    }

    fn emit(&mut self, inputs: &ParticleInputs) {
        let density = self.tuning.density;
        self.emit_budget += EMIT_RATE * density * (0.5 + inputs.audio.energy) * inputs.dt;
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
        for b in self.pool.iter_active() {
            let color = mode.color(b.seed, 0.75, time);
            self.buffers.push(b.pos, color, b.alpha, b.size, 0.0);
        }
    }
}

fn step(b: &mut Bubble, dt: f32, field: Option<FieldView<'_>>, rng: &mut StdRng) -> bool {
    b.vel.y -= GRAVITY * dt;
    b.pos += b.vel * dt;

    if let Some(field) = field {
        if b.vel.y < 0.0 && field.is_solid(b.pos) {
            b.vel.y = -b.vel.y * BOUNCE_DAMPING;
            b.vel.x = (b.vel.x + rng.gen_range(-SCATTER..SCATTER))
                .clamp(-MAX_HORIZONTAL_SPEED, MAX_HORIZONTAL_SPEED);
            b.alpha *= BOUNCE_FADE;
            b.bounces += 1;
            // Sit on top of the cell so the next tick cannot tunnel
            b.pos.y = field.cell_top(b.pos) + 1e-3;
        }
    }

    b.age += dt;
    b.age < b.max_age && b.bounces <= MAX_BOUNCES && b.alpha >= ALPHA_FLOOR && on_screen(b.pos, TOP_LIMIT)
}

impl ParticleSystem for BubbleSystem {
    fn name(&self) -> &'static str {
        "bubbles"
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

    const DT: f32 = 1.0 / 60.0;

    /// Solid floor across the bottom quarter of the screen.
    fn floor() -> Grid<f32> {
        let mut heat: Grid<f32> = Grid::new(40, 40);
        heat.for_each_mut(|_, y, h| {
            if y >= 30 {
                *h = 255.0;
            }
        });
        heat
    }

    fn place(system: &mut BubbleSystem, pos: Vec2, vel: Vec2) {
        system.pool.update(|b| {
            b.pos = pos;
            b.vel = vel;
            true
        });
    }

    #[test]
    fn test_falls_under_gravity() {
        let mut system = BubbleSystem::new(4, Some(1));
        system.spawn(1);
        place(&mut system, Vec2::new(0.5, 0.8), Vec2::ZERO);
        system.advance(DT, None);
        let b = system.pool.iter_active().next().unwrap();
        assert!((b.vel.y + GRAVITY * DT).abs() < 1e-6);
        assert!(b.pos.y < 0.8);
    }

    #[test]
    fn test_bounce_reflects_and_lifts_above_cell() {
        let heat = floor();
        let field = FieldView::new(&heat, 0.25);
        let mut system = BubbleSystem::new(4, Some(2));
        system.spawn(1);
        let alpha = system.pool.iter_active().next().unwrap().alpha;

        place(&mut system, Vec2::new(0.5, 0.251), Vec2::new(0.0, -0.5));
        system.advance(DT, Some(field));

        let b = system.pool.iter_active().next().unwrap();
        let incoming = 0.5 + GRAVITY * DT;
        assert!((b.vel.y - incoming * BOUNCE_DAMPING).abs() < 1e-5);
        assert!(b.vel.x.abs() <= MAX_HORIZONTAL_SPEED);
        assert!((b.alpha - alpha * BOUNCE_FADE).abs() < 1e-6);
        assert_eq!(b.bounces, 1);
        assert!(!field.is_solid(b.pos), "bubble left inside the field at {:?}", b.pos);
    }

    #[test]
    fn test_rising_bubble_passes_through() {
        let heat = floor();
        let field = FieldView::new(&heat, 0.25);
        let mut system = BubbleSystem::new(4, Some(3));
        system.spawn(1);
        place(&mut system, Vec2::new(0.5, 0.1), Vec2::new(0.0, 1.0));
        system.advance(DT, Some(field));
        assert_eq!(system.pool.iter_active().next().unwrap().bounces, 0);
    }

    #[test]
    fn test_scatter_is_capped() {
        let heat = floor();
        let field = FieldView::new(&heat, 0.25);
        let mut system = BubbleSystem::new(4, Some(4));
        system.spawn(1);
        place(&mut system, Vec2::new(0.5, 0.2), Vec2::new(0.49, -0.5));
        system.advance(DT, Some(field));
        let b = system.pool.iter_active().next().unwrap();
        assert!(b.vel.x <= MAX_HORIZONTAL_SPEED);
    }

    #[test]
    fn test_bounce_cap_retires() {
        let heat = floor();
        let field = FieldView::new(&heat, 0.25);
        let mut system = BubbleSystem::new(4, Some(5));
        system.spawn(1);
        system.pool.update(|b| {
            b.alpha = 1.0;
            true
        });

        for bounce in 1..=MAX_BOUNCES + 1 {
            place(&mut system, Vec2::new(0.5, 0.2), Vec2::new(0.0, -0.5));
            system.advance(DT, Some(field));
            let expected = if bounce <= MAX_BOUNCES { 1 } else { 0 };
            assert_eq!(system.active_count(), expected, "after bounce {}", bounce);
        }
    }

    #[test]
    fn test_steady_rain_keeps_invariants() {
        let heat = floor();
        let mut system = BubbleSystem::new(100, Some(6));
        let mut audio = AudioFrame::default();
        for tick in 0..600 {
            audio.energy = 0.5;
            audio.beat_detected = tick % 30 == 0;
            let inputs = ParticleInputs {
                dt: DT,
                time: tick as f32 * DT,
                audio: &audio,
                motion: None,
                field: Some(FieldView::new(&heat, 0.25)),
            };
            system.update(&inputs);
            assert_eq!(system.render_buffers().len(), system.active_count());
            assert_eq!(system.pool.counted_active(), system.active_count());
            assert!(system.active_count() <= system.capacity());
        }
        assert!(system.active_count() > 0);
    }
}
