//! Flat 2D grid storage shared by every map in the pipeline.
//!
//! A [`Grid`] is one contiguous buffer addressed by `iy * nx + ix`. A
//! [`GridSpec`] ties the cell layout to world XY bounds so that every map
//! produced by one binning call (heights, mask, colors, counts) agrees on
//! where each cell sits.

use nalgebra::Point2;

use crate::types::VertexColor;

/// Spans below this are treated as degenerate and replaced with 1.0.
pub const MIN_SPAN: f64 = 1e-12;

/// 4-connected neighbor offsets: east, north, west, south.
pub const OFFSETS_4: [(isize, isize); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// 8-connected neighbor offsets.
pub const OFFSETS_8: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Grid dimensions plus the world XY rectangle they cover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub nx: usize,
    pub ny: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub span_x: f64,
    pub span_y: f64,
}

impl GridSpec {
    /// Create a spec over `[min_x, max_x] x [min_y, max_y]`.
    ///
    /// Zero dimensions are raised to 1 and degenerate spans are floored to
    /// 1.0, so coordinate normalization never divides by zero.
    pub fn new(nx: usize, ny: usize, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let floor_span = |s: f64| if s.is_finite() && s > MIN_SPAN { s } else { 1.0 };
        Self {
            nx: nx.max(1),
            ny: ny.max(1),
            min_x,
            min_y,
            span_x: floor_span(max_x - min_x),
            span_y: floor_span(max_y - min_y),
        }
    }

    /// Total number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Linear index of cell `(ix, iy)`.
    #[inline]
    pub fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    /// Cell coordinates of a linear index.
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.nx, index / self.nx)
    }

    /// Offset a cell by `(dx, dy)`; None if the result leaves the grid.
    #[inline]
    pub fn offset(&self, ix: usize, iy: usize, dx: isize, dy: isize) -> Option<(usize, usize)> {
        let x = ix.checked_add_signed(dx)?;
        let y = iy.checked_add_signed(dy)?;
        (x < self.nx && y < self.ny).then_some((x, y))
    }

    #[inline]
    pub fn cell_width(&self) -> f64 {
        self.span_x / self.nx as f64
    }

    #[inline]
    pub fn cell_height(&self) -> f64 {
        self.span_y / self.ny as f64
    }

    /// Cell containing world point `(x, y)`, clamped to the grid.
    pub fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let u = (x - self.min_x) / self.span_x;
        let v = (y - self.min_y) / self.span_y;
        (clamp_index(u * self.nx as f64, self.nx), clamp_index(v * self.ny as f64, self.ny))
    }

    /// World X of the center of column `ix`.
    #[inline]
    pub fn center_x(&self, ix: usize) -> f64 {
        self.min_x + (ix as f64 + 0.5) * self.cell_width()
    }

    /// World Y of the center of row `iy`.
    #[inline]
    pub fn center_y(&self, iy: usize) -> f64 {
        self.min_y + (iy as f64 + 0.5) * self.cell_height()
    }

    /// World XY of the center of cell `(ix, iy)`.
    #[inline]
    pub fn cell_center(&self, ix: usize, iy: usize) -> Point2<f64> {
        Point2::new(self.center_x(ix), self.center_y(iy))
    }

    /// Continuous grid coordinates where integer values fall on cell centers.
    #[inline]
    pub fn continuous(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.min_x) / self.span_x * self.nx as f64 - 0.5,
            (y - self.min_y) / self.span_y * self.ny as f64 - 0.5,
        )
    }
}

fn clamp_index(g: f64, n: usize) -> usize {
    if g.is_nan() || g <= 0.0 {
        0
    } else {
        (g.floor() as usize).min(n - 1)
    }
}

/// A dense `nx * ny` buffer in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    nx: usize,
    ny: usize,
    data: Vec<T>,
}

/// One height per cell.
pub type HeightMap = Grid<f64>;

/// True where at least one sample landed.
pub type ValidMask = Grid<bool>;

impl<T: Clone> Grid<T> {
    /// Create a grid with every cell set to `fill`.
    pub fn new(nx: usize, ny: usize, fill: T) -> Self {
        Self {
            nx,
            ny,
            data: vec![fill; nx * ny],
        }
    }

    /// Create a grid sized by `spec` with every cell set to `fill`.
    pub fn for_spec(spec: &GridSpec, fill: T) -> Self {
        Self::new(spec.nx, spec.ny, fill)
    }
}

impl<T> Grid<T> {
    /// Wrap an existing buffer; None unless `data.len() == nx * ny`.
    pub fn from_vec(nx: usize, ny: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == nx * ny).then_some(Self { nx, ny, data })
    }

    /// Wrap a buffer whose length is known to be `nx * ny`.
    pub(crate) fn from_parts(nx: usize, ny: usize, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), nx * ny);
        Self { nx, ny, data }
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    /// Value at `(ix, iy)`, or None outside the grid.
    #[inline]
    pub fn get(&self, ix: usize, iy: usize) -> Option<&T> {
        if ix < self.nx && iy < self.ny {
            self.data.get(iy * self.nx + ix)
        } else {
            None
        }
    }

    /// Value at `(ix, iy)`. Panics outside the grid.
    #[inline]
    pub fn at(&self, ix: usize, iy: usize) -> &T {
        &self.data[iy * self.nx + ix]
    }

    #[inline]
    pub fn set(&mut self, ix: usize, iy: usize, value: T) {
        let i = self.index(ix, iy);
        self.data[i] = value;
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// True if both grids have the same dimensions.
    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.nx == other.nx && self.ny == other.ny
    }
}

impl Grid<bool> {
    /// Number of true cells.
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// True if `(ix, iy)` is set; cells outside the grid read as false.
    #[inline]
    pub fn is_set(&self, ix: isize, iy: isize) -> bool {
        ix >= 0
            && iy >= 0
            && (ix as usize) < self.nx
            && (iy as usize) < self.ny
            && self.data[iy as usize * self.nx + ix as usize]
    }
}

impl Grid<f64> {
    /// Minimum and maximum over cells where `mask` is true.
    pub fn masked_range(&self, mask: &ValidMask) -> Option<(f64, f64)> {
        self.data
            .iter()
            .zip(mask.iter())
            .filter(|&(_, &valid)| valid)
            .fold(None, |acc, (&h, _)| match acc {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            })
    }
}

/// Per-cell mean color as three parallel channels in the 0-255 range.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    pub r: Grid<f64>,
    pub g: Grid<f64>,
    pub b: Grid<f64>,
}

impl ColorMap {
    /// A map filled with one color.
    pub fn uniform(nx: usize, ny: usize, color: VertexColor) -> Self {
        Self {
            r: Grid::new(nx, ny, color.r as f64),
            g: Grid::new(nx, ny, color.g as f64),
            b: Grid::new(nx, ny, color.b as f64),
        }
    }

    /// Color stored at `(ix, iy)`, rounded to 8-bit channels.
    pub fn color_at(&self, ix: usize, iy: usize) -> VertexColor {
        VertexColor::from_channels(*self.r.at(ix, iy), *self.g.at(ix, iy), *self.b.at(ix, iy))
    }
}
