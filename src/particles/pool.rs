/// Fixed-capacity particle storage reused by index.
///
/// Free slots are found with a cursor that rotates past the last spawn, so
/// steady emission does not rescan from slot zero. The active count is
/// maintained incrementally and always equals the number of set flags.
#[derive(Debug, Clone)]
pub struct ParticlePool<P> {
    particles: Vec<P>,
    active: Vec<bool>,
    cursor: usize,
    active_count: usize,
}

impl<P: Default + Clone> ParticlePool<P> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            particles: vec![P::default(); capacity],
            active: vec![false; capacity],
            cursor: 0,
            active_count: 0,
        }
    }

    /// Claim a free slot, reset it to `P::default()` and let `init` fill
    /// it in. Returns false without side effects when the pool is full.
    pub fn spawn(&mut self, init: impl FnOnce(&mut P)) -> bool {
        let capacity = self.particles.len();
        if self.active_count >= capacity {
            return false;
        }

        for offset in 0..capacity {
            let index = (self.cursor + offset) % capacity;
            if self.active[index] {
                continue;
            }
            let slot = &mut self.particles[index];
            *slot = P::default();
            init(slot);
            self.active[index] = true;
            self.active_count += 1;
            self.cursor = (index + 1) % capacity;
            return true;
        }
        false
    }

    /// Step every active particle; `step` returns false to retire it.
    pub fn update(&mut self, mut step: impl FnMut(&mut P) -> bool) {
        for (particle, active) in self.particles.iter_mut().zip(self.active.iter_mut()) {
            if *active && !step(particle) {
                *active = false;
                self.active_count -= 1;
            }
        }
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &P> + '_ {
        self.particles
            .iter()
            .zip(self.active.iter())
            .filter_map(|(particle, &active)| active.then_some(particle))
    }

    pub fn clear(&mut self) {
        self.active.iter_mut().for_each(|flag| *flag = false);
        self.active_count = 0;
        self.cursor = 0;
    }

    /// Reallocate to `capacity` slots. Active particles are compacted to
    /// the front in slot order; any beyond the new capacity are dropped.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.particles.len() {
            return;
        }

        let mut particles: Vec<P> = self.iter_active().take(capacity).cloned().collect();
        let kept = particles.len();
        particles.resize(capacity, P::default());

        let mut active = vec![false; capacity];
        active[..kept].iter_mut().for_each(|flag| *flag = true);

        self.particles = particles;
        self.active = active;
        self.active_count = kept;
        self.cursor = kept % capacity;
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn is_full(&self) -> bool {
        self.active_count >= self.particles.len()
    }

    #[cfg(test)]
    pub(crate) fn counted_active(&self) -> usize {
        self.active.iter().filter(|&&flag| flag).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Dot {
        id: u32,
        age: u32,
        marked: bool,
    }

    #[test]
    fn test_spawn_until_full() {
        let mut pool: ParticlePool<Dot> = ParticlePool::new(3);
        for id in 0..3 {
            assert!(pool.spawn(|dot| dot.id = id));
        }
        assert!(pool.is_full());
        assert!(!pool.spawn(|dot| dot.id = 99));
        assert_eq!(pool.active_count(), 3);
        assert_eq!(pool.counted_active(), 3);
    }

    #[test]
    fn test_respawn_resets_stale_fields() {
        let mut pool: ParticlePool<Dot> = ParticlePool::new(1);
        pool.spawn(|dot| {
            dot.id = 1;
            dot.marked = true;
        });
        pool.update(|_| false);
        assert_eq!(pool.active_count(), 0);

        pool.spawn(|dot| dot.id = 2);
        let dot = pool.iter_active().next().unwrap();
        assert_eq!(dot, &Dot { id: 2, age: 0, marked: false });
    }

    #[test]
    fn test_cursor_rotates_past_last_spawn() {
        let mut pool: ParticlePool<Dot> = ParticlePool::new(4);
        pool.spawn(|dot| dot.id = 0);
        pool.spawn(|dot| dot.id = 1);
        pool.update(|dot| dot.id != 0);

        // Slot 0 is free but the search starts after slot 1
        pool.spawn(|dot| dot.id = 10);
        let ids: Vec<u32> = pool.iter_active().map(|dot| dot.id).collect();
        assert_eq!(ids, vec![1, 10]);

        pool.spawn(|dot| dot.id = 11);
        pool.spawn(|dot| dot.id = 12);
        let ids: Vec<u32> = pool.iter_active().map(|dot| dot.id).collect();
        assert_eq!(ids, vec![12, 1, 10, 11]);
        assert_eq!(pool.active_count(), pool.counted_active());
    }

    #[test]
    fn test_update_retires_and_counts() {
        let mut pool: ParticlePool<Dot> = ParticlePool::new(8);
        for id in 0..8 {
            pool.spawn(|dot| dot.id = id);
        }
        for _ in 0..3 {
            pool.update(|dot| {
                dot.age += 1;
                dot.id % 2 == 0 || dot.age < 2
            });
            assert_eq!(pool.active_count(), pool.counted_active());
        }
        assert_eq!(pool.active_count(), 4);
    }

    #[test]
    fn test_resize_keeps_active_up_to_cap() {
        let mut pool: ParticlePool<Dot> = ParticlePool::new(6);
        for id in 0..5 {
            pool.spawn(|dot| dot.id = id);
        }
        pool.update(|dot| dot.id != 0);

        pool.resize(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.active_count(), 3);
        let ids: Vec<u32> = pool.iter_active().map(|dot| dot.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        pool.resize(10);
        assert_eq!(pool.active_count(), 3);
        assert!(pool.spawn(|dot| dot.id = 42));
        assert_eq!(pool.counted_active(), 4);
    }

    #[test]
    fn test_clear_keeps_storage() {
        let mut pool: ParticlePool<Dot> = ParticlePool::new(5);
        for id in 0..5 {
            pool.spawn(|dot| dot.id = id);
        }
        pool.clear();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.iter_active().count(), 0);
    }
}
