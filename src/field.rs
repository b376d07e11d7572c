//! The 2D trail field agents sense and deposit onto.
//!
//! The field is a `width × height` grid of `f32` intensities, row-major.
//! Two boundary policies meet here and must not be confused:
//!
//! - **Sampling wraps.** Sensor probes and the diffusion kernel treat the
//!   field as a torus: `coord = ((coord mod size) + size) mod size`.
//! - **Deposits clamp.** Agents never leave [0, 1]² (they bounce, see
//!   [`stages::sense`](crate::stages::sense)), so the deposit cell is the
//!   one containing the position, with `x == 1.0` falling in the last column.
//!
//! # Buffers
//!
//! - [`FieldBuffers`] - the "current"/"next" pair. Diffusion reads one and
//!   writes the other, then they swap.
//! - [`DepositAccumulator`] - atomic scatter target for deposits. Values are
//!   stored as 32.32 fixed point in `i64` so that concurrent adds are plain
//!   integer additions: exact, and independent of the order they land in.
//!   On the GPU the same 64 bits live in a `(lo, hi)` pair of `u32` words
//!   with an explicit carry.

use std::sync::atomic::{AtomicI64, Ordering};

use glam::Vec2;

use crate::error::SimulationError;

/// Scale of the fractional word of a deposit (32.32 format).
pub const FRACTION_SCALE: f32 = 4_294_967_296.0;

/// Largest magnitude of a single deposit.
pub const MAX_DEPOSIT: f32 = 1.0e9;

/// Largest per-cell sum one frame can accumulate before the integer word wraps.
pub const MAX_CELL_DEPOSIT: f64 = i32::MAX as f64;

/// Wrap an integer cell coordinate onto `0..size`.
#[inline]
pub fn wrap_coord(coord: i32, size: u32) -> u32 {
    let size = size as i64;
    (((coord as i64 % size) + size) % size) as u32
}

/// Cell coordinate (unwrapped) of a normalized position component.
#[inline]
pub fn raw_cell(normalized: f32, size: u32) -> i32 {
    (normalized * size as f32).floor() as i32
}

/// Wrapped cell coordinate of a normalized position component.
///
/// `cell_of(p, s) == cell_of(p + k as f32, s)` for any integer `k` (up to
/// float precision of the shifted value).
#[inline]
pub fn cell_of(normalized: f32, size: u32) -> u32 {
    wrap_coord(raw_cell(normalized, size), size)
}

/// Convert a deposit to 32.32 fixed point, rounding toward negative infinity.
///
/// Every step is exact in `f32`, so the WGSL `deposit_parts` produces the
/// same bits.
#[inline]
pub fn to_fixed(value: f32) -> i64 {
    let clamped = value.clamp(-MAX_DEPOSIT, MAX_DEPOSIT);
    let whole = clamped.floor();
    let fraction = ((clamped - whole) * FRACTION_SCALE).floor() as u32;
    ((whole as i64) << 32) | fraction as i64
}

/// Convert an accumulated fixed-point value back to intensity.
#[inline]
pub fn from_fixed(value: i64) -> f32 {
    let whole = (value >> 32) as i32;
    let fraction = value as u32;
    whole as f32 + fraction as f32 / FRACTION_SCALE
}

/// Dimensions of the trail field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub width: u32,
    pub height: u32,
}

impl FieldLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of cells, checked for overflow and zero size.
    pub fn total_cells(&self) -> Result<usize, SimulationError> {
        if self.width == 0 || self.height == 0 {
            return Err(SimulationError::Allocation(format!(
                "field dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| {
                SimulationError::Allocation(format!(
                    "field of {}x{} cells overflows the address space",
                    self.width, self.height
                ))
            })
    }

    /// Number of cells. Only valid for layouts that passed [`Self::total_cells`].
    #[inline]
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memory size in bytes of one `f32` field buffer.
    pub fn memory_size(&self) -> usize {
        self.len() * std::mem::size_of::<f32>()
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Index of the cell at wrapped integer coordinates.
    #[inline]
    pub fn wrapped_index(&self, x: i32, y: i32) -> usize {
        self.index(wrap_coord(x, self.width), wrap_coord(y, self.height))
    }

    /// Index of the cell containing an in-bounds normalized position.
    #[inline]
    pub fn deposit_index(&self, position: Vec2) -> usize {
        let x = raw_cell(position.x, self.width).clamp(0, self.width as i32 - 1);
        let y = raw_cell(position.y, self.height).clamp(0, self.height as i32 - 1);
        self.index(x as u32, y as u32)
    }
}

/// Allocate a zeroed `f32` grid without aborting on failure.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<f32>, SimulationError> {
    let mut cells = Vec::new();
    cells.try_reserve_exact(len)?;
    cells.resize(len, 0.0);
    Ok(cells)
}

/// A snapshot of the trail field.
#[derive(Clone, Debug, PartialEq)]
pub struct TrailField {
    layout: FieldLayout,
    cells: Vec<f32>,
}

impl TrailField {
    /// A zeroed field.
    pub fn zeroed(layout: FieldLayout) -> Result<Self, SimulationError> {
        let len = layout.total_cells()?;
        Ok(Self {
            layout,
            cells: try_zeroed(len)?,
        })
    }

    /// Wrap existing cell values. Callers pass exactly `layout.len()` cells.
    pub(crate) fn from_cells(layout: FieldLayout, cells: Vec<f32>) -> Self {
        debug_assert_eq!(cells.len(), layout.len());
        Self { layout, cells }
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.cells[self.layout.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = self.layout.index(x, y);
        self.cells[idx] = value;
    }

    /// Value at wrapped integer coordinates.
    #[inline]
    pub fn get_wrapped(&self, x: i32, y: i32) -> f32 {
        self.cells[self.layout.wrapped_index(x, y)]
    }

    pub fn sum(&self) -> f32 {
        self.cells.iter().sum()
    }

    pub fn max_value(&self) -> f32 {
        self.cells.iter().copied().fold(0.0, f32::max)
    }

    /// Coordinates of every cell with a non-zero value.
    pub fn nonzero_cells(&self) -> Vec<(u32, u32)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, _)| {
                (
                    (i % self.layout.width as usize) as u32,
                    (i / self.layout.width as usize) as u32,
                )
            })
            .collect()
    }
}

/// The "current"/"next" field pair.
pub struct FieldBuffers {
    layout: FieldLayout,
    buffer_a: Vec<f32>,
    buffer_b: Vec<f32>,
    /// Which buffer is currently the "current" one (false = A, true = B)
    current_is_b: bool,
}

impl FieldBuffers {
    pub fn new(layout: FieldLayout) -> Result<Self, SimulationError> {
        let len = layout.total_cells()?;
        let buffer_a = try_zeroed(len)?;
        let buffer_b = try_zeroed(len)?;
        Ok(Self {
            layout,
            buffer_a,
            buffer_b,
            current_is_b: false,
        })
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// The field as of the last completed step.
    pub fn current(&self) -> &[f32] {
        if self.current_is_b {
            &self.buffer_b
        } else {
            &self.buffer_a
        }
    }

    pub fn current_mut(&mut self) -> &mut [f32] {
        if self.current_is_b {
            &mut self.buffer_b
        } else {
            &mut self.buffer_a
        }
    }

    /// Read view of "current" and write view of "next". Never aliased.
    pub fn split(&mut self) -> (&[f32], &mut [f32]) {
        if self.current_is_b {
            (&self.buffer_b, &mut self.buffer_a)
        } else {
            (&self.buffer_a, &mut self.buffer_b)
        }
    }

    /// Make "next" the new "current".
    pub fn swap(&mut self) {
        self.current_is_b = !self.current_is_b;
    }

    pub fn clear(&mut self) {
        self.buffer_a.fill(0.0);
        self.buffer_b.fill(0.0);
    }

    pub fn snapshot(&self) -> TrailField {
        TrailField::from_cells(self.layout, self.current().to_vec())
    }
}

/// Per-cell atomic accumulator for a frame's deposits.
pub struct DepositAccumulator {
    cells: Vec<AtomicI64>,
}

impl DepositAccumulator {
    pub fn new(len: usize) -> Result<Self, SimulationError> {
        let mut cells = Vec::new();
        cells.try_reserve_exact(len)?;
        cells.extend((0..len).map(|_| AtomicI64::new(0)));
        Ok(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Atomically add `value` to a cell. Safe to call from many threads.
    #[inline]
    pub fn add(&self, index: usize, value: f32) {
        self.cells[index].fetch_add(to_fixed(value), Ordering::Relaxed);
    }

    /// Accumulated intensity of one cell.
    pub fn get(&self, index: usize) -> f32 {
        from_fixed(self.cells[index].load(Ordering::Relaxed))
    }

    /// Take the accumulated value of one cell, leaving zero behind.
    #[inline]
    pub fn take(&self, index: usize) -> f32 {
        from_fixed(self.cells[index].swap(0, Ordering::Relaxed))
    }

    pub fn clear(&self) {
        for cell in &self.cells {
            cell.store(0, Ordering::Relaxed);
        }
    }
}
