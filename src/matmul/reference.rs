use crate::error::Result;
use crate::matrix::Matrix;

use super::{check_dimensions, Multiply};

/// Naive matrix multiplication using i-j-k loop order.
///
/// The textbook triple loop: one multiply-accumulate per `(i, j, k)` with no
/// tiling and no vectorization hints. The inner loop walks B with stride
/// `cols`, so it is slow for large sizes. Use it as a correctness oracle and as
/// the "no special optimization" baseline.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMultiply;

impl Multiply for ReferenceMultiply {
    fn name(&self) -> &'static str {
        "Reference (i-j-k)"
    }

    fn multiply(&mut self, a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<()> {
        check_dimensions(a, b, c)?;

        let (m, k) = a.shape();
        let n = b.cols();
        let (a, b) = (a.as_slice(), b.as_slice());
        let c = c.as_mut_slice();

        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0f32;
                for p in 0..k {
                    sum += a[i * k + p] * b[p * n + j];
                }
                c[i * n + j] = sum;
            }
        }
        Ok(())
    }
}

/// Computes `a * b` into a fresh matrix with [`ReferenceMultiply`].
pub fn multiply_reference(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let mut c = Matrix::allocate(a.rows(), b.cols())?;
    ReferenceMultiply.multiply(a, b, &mut c)?;
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;

    #[test]
    fn test_2x3_times_3x2() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();

        let c = multiply_reference(&a, &b).unwrap();

        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_overwrites_output() {
        let a = Matrix::from_vec(1, 1, vec![3.0]).unwrap();
        let b = Matrix::from_vec(1, 1, vec![4.0]).unwrap();
        let mut c = Matrix::from_vec(1, 1, vec![100.0]).unwrap();

        ReferenceMultiply.multiply(&a, &b, &mut c).unwrap();

        assert_eq!(c[(0, 0)], 12.0);
    }

    #[test]
    fn test_identity() {
        let mut a = Matrix::allocate(5, 5).unwrap();
        a.fill(|i, j| (i * 5 + j) as f32);
        let mut id = Matrix::allocate(5, 5).unwrap();
        id.fill(|i, j| if i == j { 1.0 } else { 0.0 });

        let c = multiply_reference(&a, &id).unwrap();

        assert_eq!(c, a);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Matrix::allocate(3, 4).unwrap();
        let b = Matrix::allocate(5, 6).unwrap();

        let err = multiply_reference(&a, &b).unwrap_err();

        assert!(matches!(err, BenchError::DimensionMismatch { .. }));
    }
}
