//! Matrix multiplication implementations compared by the benchmark.
//!
//! Every implementation computes `C = A * B` for row-major [`Matrix`] operands
//! and sits behind the [`Multiply`] trait so the runner can drive them
//! uniformly:
//!
//! - [`BlockedMultiply`]: pretransposed, lane-accumulated, tiled and parallel
//! - [`ReferenceMultiply`]: plain i-j-k triple loop, the correctness oracle
//! - [`BaselineMultiply`]: `ndarray`'s `general_mat_mul`

use crate::error::{dimension_error, Result};
use crate::matrix::Matrix;

pub mod baseline;
pub mod blocked;
pub mod lanes;
pub mod reference;
pub mod transpose;

pub use baseline::BaselineMultiply;
pub use blocked::{BlockedMultiply, TileSpec};
pub use reference::{multiply_reference, ReferenceMultiply};

/// A matrix multiplication implementation the runner can benchmark.
pub trait Multiply {
    /// Label used in reports.
    fn name(&self) -> &'static str;

    /// One-time setup for operands of this shape, excluded from timing.
    ///
    /// The default does nothing.
    fn prepare(&mut self, _a: &Matrix, _b: &Matrix) -> Result<()> {
        Ok(())
    }

    /// Overwrites `c` with `a * b`.
    ///
    /// # Errors
    ///
    /// Returns a dimension mismatch, leaving `c` untouched, if
    /// `a.cols() != b.rows()` or `c` is not `a.rows() x b.cols()`.
    fn multiply(&mut self, a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<()>;
}

/// Checks that `a * b` is defined and fits in `c`.
pub fn check_dimensions(a: &Matrix, b: &Matrix, c: &Matrix) -> Result<()> {
    if a.cols() != b.rows() {
        return Err(dimension_error(a.shape(), b.shape()));
    }
    if c.shape() != (a.rows(), b.cols()) {
        return Err(dimension_error(a.shape(), c.shape()));
    }
    Ok(())
}
