use crate::config::PaintConfig;
use crate::grid::Grid;
use crate::particles::hsv_to_rgb;

/// Per-tick multiplicative fade once a cell's hold time has passed.
pub const PAINT_FADE: f32 = 0.96;
/// Share of the fresh color blended into a repainted cell.
pub const PAINT_MIX: f32 = 0.6;

/// Double-buffered paint target for the persistent-paint effect.
///
/// Each tick reads the front buffer, writes the back buffer, then swaps.
/// Both buffers are wiped whenever the effect is (re)entered.
pub struct PaintAccumulator {
    buffers: [Grid<[f32; 4]>; 2],
    /// Seconds since each cell was last painted
    age: Grid<f32>,
    front: usize,
    active: bool,
}

impl PaintAccumulator {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffers: [Grid::new(width, height), Grid::new(width, height)],
            age: Grid::filled(width, height, f32::INFINITY),
            front: 0,
            active: false,
        }
    }

    /// Start a fresh painting session with cleared buffers.
    pub fn enter(&mut self) {
        self.wipe();
        self.active = true;
    }

    pub fn exit(&mut self) {
        self.wipe();
        self.active = false;
    }

    fn wipe(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.age.fill(f32::INFINITY);
        self.front = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Blend motion-triggered color into the accumulation and age
    /// everything else.
    pub fn accumulate(&mut self, heat: &Grid<f32>, dt: f32, time: f32, params: &PaintConfig) {
        if !self.active {
            return;
        }
        let threshold = 0.5 * (1.0 - params.sensitivity);
        let width = self.age.width().max(1) as f32;

        let (previous, next) = split_pair(&mut self.buffers, self.front);
        let age = &mut self.age;
        next.for_each_mut(|x, y, out| {
            let old = previous.get(x, y).unwrap_or_default();
            let level = heat.get(x, y).map_or(0.0, |h| h / 255.0);
            let Some(cell_age) = age.get_mut(x, y) else {
                *out = old;
                return;
            };

            if level > threshold {
                let hue = time * params.color_speed + x as f32 / width * 0.2;
                let [r, g, b] = hsv_to_rgb(hue, 0.9, 1.0);
                let fresh = [r, g, b, 1.0];
                *out = std::array::from_fn(|i| old[i] + (fresh[i] - old[i]) * PAINT_MIX);
                *cell_age = 0.0;
            } else {
                *cell_age += dt;
                *out = if *cell_age > params.fade_delay {
                    old.map(|c| c * PAINT_FADE)
                } else {
                    old
                };
            }
        });

        self.front = 1 - self.front;
    }

    /// Most recently written buffer.
    pub fn current(&self) -> &Grid<[f32; 4]> {
        &self.buffers[self.front]
    }

    pub fn is_blank(&self) -> bool {
        self.buffers
            .iter()
            .all(|buffer| buffer.as_slice().iter().all(|cell| *cell == [0.0; 4]))
    }
}

fn split_pair<T>(pair: &mut [T; 2], front: usize) -> (&T, &mut T) {
    let (a, b) = pair.split_at_mut(1);
    if front == 0 {
        (&a[0], &mut b[0])
    } else {
        (&b[0], &mut a[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn hot_spot() -> Grid<f32> {
        let mut heat: Grid<f32> = Grid::new(8, 8);
        heat.set(2, 3, 255.0);
        heat
    }

    #[test]
    fn test_inactive_does_nothing() {
        let mut paint = PaintAccumulator::new(8, 8);
        paint.accumulate(&hot_spot(), DT, 0.0, &PaintConfig::default());
        assert!(paint.is_blank());
    }

    #[test]
    fn test_motion_paints_and_buffers_swap() {
        let mut paint = PaintAccumulator::new(8, 8);
        paint.enter();
        paint.accumulate(&hot_spot(), DT, 0.0, &PaintConfig::default());
        let painted = paint.current().get(2, 3).unwrap();
        assert!((painted[3] - PAINT_MIX).abs() < 1e-6);
        assert_eq!(paint.current().get(0, 0), Some([0.0; 4]));
        assert_eq!(paint.front, 1);

        // The second pass reads what the first one wrote
        paint.accumulate(&hot_spot(), DT, 0.0, &PaintConfig::default());
        let again = paint.current().get(2, 3).unwrap();
        assert!(again[3] > painted[3]);
        assert_eq!(paint.front, 0);
    }

    #[test]
    fn test_paint_holds_then_fades() {
        let params = PaintConfig {
            fade_delay: 0.5,
            ..PaintConfig::default()
        };
        let mut paint = PaintAccumulator::new(8, 8);
        paint.enter();
        paint.accumulate(&hot_spot(), DT, 0.0, &params);
        let fresh = paint.current().get(2, 3).unwrap()[3];

        let still: Grid<f32> = Grid::new(8, 8);
        for _ in 0..29 {
            paint.accumulate(&still, DT, 0.0, &params);
        }
        assert_eq!(paint.current().get(2, 3).unwrap()[3], fresh);

        for _ in 0..60 {
            paint.accumulate(&still, DT, 0.0, &params);
        }
        assert!(paint.current().get(2, 3).unwrap()[3] < fresh * 0.2);
    }

    #[test]
    fn test_reentering_clears_stale_paint() {
        let mut paint = PaintAccumulator::new(8, 8);
        paint.enter();
        paint.accumulate(&hot_spot(), DT, 0.0, &PaintConfig::default());
        assert!(!paint.is_blank());

        paint.exit();
        assert!(paint.is_blank());
        paint.enter();
        assert!(paint.is_blank());
    }
}
