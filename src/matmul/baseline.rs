//! External library baseline: `ndarray`'s GEMM over views of our buffers.

use ndarray::{linalg::general_mat_mul, ArrayView2, ArrayViewMut2, ShapeError};

use crate::error::{BenchError, Result};
use crate::matrix::Matrix;

use super::{check_dimensions, Multiply};

/// Multiplies with `ndarray::linalg::general_mat_mul` (backed by
/// `matrixmultiply`). The matrices are viewed in place, nothing is copied.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineMultiply;

fn shape_error(e: ShapeError) -> BenchError {
    BenchError::Baseline {
        message: e.to_string(),
    }
}

impl Multiply for BaselineMultiply {
    fn name(&self) -> &'static str {
        "ndarray baseline"
    }

    fn multiply(&mut self, a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<()> {
        check_dimensions(a, b, c)?;

        let c_shape = c.shape();
        let a_view = ArrayView2::from_shape(a.shape(), a.as_slice()).map_err(shape_error)?;
        let b_view = ArrayView2::from_shape(b.shape(), b.as_slice()).map_err(shape_error)?;
        let mut c_view =
            ArrayViewMut2::from_shape(c_shape, c.as_mut_slice()).map_err(shape_error)?;

        general_mat_mul(1.0, &a_view, &b_view, 0.0, &mut c_view);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matmul::multiply_reference;
    use crate::matrix::fill_random;

    #[test]
    fn test_matches_reference() {
        let mut a = Matrix::allocate(13, 21).unwrap();
        let mut b = Matrix::allocate(21, 9).unwrap();
        fill_random(&mut a, 1);
        fill_random(&mut b, 2);
        let expected = multiply_reference(&a, &b).unwrap();

        let mut c = Matrix::allocate(13, 9).unwrap();
        c.as_mut_slice().fill(7.0);
        BaselineMultiply.multiply(&a, &b, &mut c).unwrap();

        assert!(c.max_relative_error(&expected).unwrap() < 1e-4);
    }

    #[test]
    fn test_dimension_mismatch_leaves_output() {
        let a = Matrix::allocate(3, 4).unwrap();
        let b = Matrix::allocate(5, 6).unwrap();
        let mut c = Matrix::from_vec(3, 6, vec![7.0; 18]).unwrap();

        assert!(BaselineMultiply.multiply(&a, &b, &mut c).is_err());
        assert!(c.as_slice().iter().all(|&v| v == 7.0));
    }
}
