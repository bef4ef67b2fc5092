/// Row-major 2D buffer with explicit dimensions.
///
/// All pixel-shaped state (luminance frames, motion heat, color frames, the
/// paint accumulator) lives in a `Grid` so callers address cells by `(x, y)`
/// and never do index arithmetic themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Grid<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::default())
    }

    /// Reset every cell to `T::default()`.
    pub fn clear(&mut self) {
        self.fill(T::default());
    }

    /// Nearest-neighbour resample into a grid of a different size.
    pub fn resample(&self, width: usize, height: usize) -> Grid<T> {
        let mut out = Grid::new(width, height);
        if self.is_empty() {
            return out;
        }
        for y in 0..height {
            let src_y = (y * self.height) / height;
            for x in 0..width {
                let src_x = (x * self.width) / width;
                out.data[y * width + x] = self.data[src_y * self.width + src_x];
            }
        }
        out
    }

    /// Copy into a flat buffer of exactly `len` cells, truncating or
    /// zero-padding as needed.
    pub fn copy_into_fixed(&self, len: usize) -> Vec<T> {
        fixed_length(&self.data, len)
    }
}

impl<T: Copy> Grid<T> {
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        self.index(x, y).map(|i| self.data[i])
    }

    /// Signed lookup for neighbourhood lookups that may step off the edge.
    #[inline]
    pub fn get_signed(&self, x: i64, y: i64) -> Option<T> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        self.index(x, y).map(move |i| &mut self.data[i])
    }

    /// Returns false when `(x, y)` is outside the grid.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|cell| *cell = value);
    }

    /// Sample with normalized coordinates in `[0,1]`, `(0,0)` being the
    /// top-left cell. Out-of-range coordinates return `None`.
    pub fn sample(&self, u: f32, v: f32) -> Option<T> {
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) || self.is_empty() {
            return None;
        }
        let x = ((u * self.width as f32) as usize).min(self.width - 1);
        let y = ((v * self.height as f32) as usize).min(self.height - 1);
        self.get(x, y)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.width.max(1))
    }

    /// Iterate `(x, y, value)` over every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &value)| (i % width, i / width, value))
    }

    /// Visit every cell mutably along with its coordinates.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(usize, usize, &mut T)) {
        let width = self.width.max(1);
        for (i, cell) in self.data.iter_mut().enumerate() {
            f(i % width, i / width, cell);
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

/// Truncate or zero-pad `src` to exactly `len` elements.
pub fn fixed_length<T: Copy + Default>(src: &[T], len: usize) -> Vec<T> {
    let mut out = vec![T::default(); len];
    let n = src.len().min(len);
    out[..n].copy_from_slice(&src[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_checked_access() {
        let mut grid: Grid<u8> = Grid::new(4, 3);
        assert!(grid.set(3, 2, 7));
        assert!(!grid.set(4, 0, 1));
        assert_eq!(grid.get(3, 2), Some(7));
        assert_eq!(grid.get(0, 3), None);
        assert_eq!(grid.get_signed(-1, 0), None);
        assert_eq!(grid.as_slice()[2 * 4 + 3], 7);
    }

    #[test]
    fn test_resample_nearest() {
        let grid = Grid::from_vec(2, 2, vec![1u8, 2, 3, 4]).unwrap();
        let up = grid.resample(4, 4);
        assert_eq!(up.get(0, 0), Some(1));
        assert_eq!(up.get(3, 0), Some(2));
        assert_eq!(up.get(0, 3), Some(3));
        assert_eq!(up.get(3, 3), Some(4));
    }

    #[test]
    fn test_fixed_length_truncates_and_pads() {
        assert_eq!(fixed_length(&[1u8, 2, 3], 2), vec![1, 2]);
        assert_eq!(fixed_length(&[1u8, 2], 4), vec![1, 2, 0, 0]);
        assert!(fixed_length::<u8>(&[], 0).is_empty());
    }

    #[test]
    fn test_sample_normalized() {
        let mut grid: Grid<u8> = Grid::new(10, 10);
        grid.set(9, 0, 200);
        assert_eq!(grid.sample(1.0, 0.0), Some(200));
        assert_eq!(grid.sample(0.95, 0.01), Some(200));
        assert_eq!(grid.sample(1.2, 0.5), None);
    }

    #[test]
    fn test_cells_coordinates() {
        let grid = Grid::from_vec(3, 2, vec![0u8, 1, 2, 3, 4, 5]).unwrap();
        let cells: Vec<_> = grid.cells().collect();
        assert_eq!(cells[4], (1, 1, 4));
        assert_eq!(grid.rows().count(), 2);
    }
}
