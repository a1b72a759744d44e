//! Dense row-major `f32` matrix storage.
//!
//! A [`Matrix`] owns exactly `rows * cols` elements. Allocation never aborts the
//! process: element-count overflow and allocator refusal both come back as
//! [`BenchError::Allocation`](crate::error::BenchError::Allocation) so a
//! benchmark can skip one oversized cell and keep going.

use std::ops::{Index, IndexMut};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{allocation_error, dimension_error, Result};

/// Size in bytes of one matrix element.
pub const ELEMENT_BYTES: usize = std::mem::size_of::<f32>();

/// A dense row-major matrix of single-precision values.
///
/// Element `(i, j)` lives at `data[i * cols + j]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Allocates a zero-initialized `rows x cols` matrix.
    ///
    /// # Errors
    ///
    /// Returns an allocation error if `rows * cols` (or its byte size) overflows,
    /// or if the allocator cannot provide the storage.
    pub fn allocate(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| allocation_error(usize::MAX, format!("{rows}x{cols} overflows usize")))?;

        if len.checked_mul(ELEMENT_BYTES).is_none() {
            return Err(allocation_error(len, "byte size overflows usize"));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| allocation_error(len, e.to_string()))?;
        data.resize(len, 0.0);

        Ok(Self { rows, cols, data })
    }

    /// Wraps an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns a dimension error if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(dimension_error((rows, cols), (data.len(), 1)));
        }
        Ok(Self { rows, cols, data })
    }

    /// Overwrites every element with `f(row, col)`, in row-major order.
    pub fn fill<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, usize) -> f32,
    {
        if self.cols == 0 {
            return;
        }
        for (i, row) in self.data.chunks_exact_mut(self.cols).enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = f(i, j);
            }
        }
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline(always)]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements in the buffer.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Largest element-wise error against `expected`, relative to
    /// `max(|expected|, 1)` so near-zero sums are compared absolutely.
    /// A NaN on either side counts as an infinite error.
    ///
    /// # Errors
    ///
    /// Returns a dimension error when the shapes differ.
    pub fn max_relative_error(&self, expected: &Matrix) -> Result<f32> {
        if self.shape() != expected.shape() {
            return Err(dimension_error(self.shape(), expected.shape()));
        }

        // `f32::max` discards NaN, so a NaN error is mapped to infinity first.
        let max = self
            .data
            .iter()
            .zip(expected.data.iter())
            .map(|(&actual, &wanted)| {
                let error = (actual - wanted).abs() / wanted.abs().max(1.0);
                if error.is_nan() {
                    f32::INFINITY
                } else {
                    error
                }
            })
            .fold(0.0f32, f32::max);

        Ok(max)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;

    #[inline(always)]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        debug_assert!(i < self.rows && j < self.cols);
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline(always)]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[i * self.cols + j]
    }
}

/// How benchmark operands are populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillPattern {
    /// Uniform values in `[-1, 1)`. A is seeded with `seed`, B with `seed + 1`.
    Random { seed: u64 },
    /// `A[i, j] = sin(i + j)` and `B[i, j] = cos(i - j)`.
    Trigonometric,
}

impl Default for FillPattern {
    fn default() -> Self {
        FillPattern::Random { seed: 42 }
    }
}

impl FillPattern {
    /// Fills the left and right operands of one benchmark cell.
    pub fn fill_operands(&self, a: &mut Matrix, b: &mut Matrix) {
        match *self {
            FillPattern::Random { seed } => {
                fill_random(a, seed);
                fill_random(b, seed.wrapping_add(1));
            }
            FillPattern::Trigonometric => {
                a.fill(|i, j| ((i + j) as f32).sin());
                b.fill(|i, j| (i as f32 - j as f32).cos());
            }
        }
    }
}

/// Fills `matrix` with reproducible uniform values in `[-1, 1)`.
pub fn fill_random(matrix: &mut Matrix, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    matrix.fill(|_, _| rng.random_range(-1.0f32..1.0));
}
