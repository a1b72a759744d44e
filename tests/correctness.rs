//! Agreement between the tiled kernel, the external baseline and the reference
//! multiply across sizes that hit every tiling and remainder path.

use approx::assert_relative_eq;

use tilebench::matmul::{
    multiply_reference, BaselineMultiply, BlockedMultiply, Multiply, TileSpec,
};
use tilebench::matrix::{FillPattern, Matrix};
use tilebench::BenchError;

const SIZES: [usize; 7] = [1, 2, 8, 9, 16, 17, 64];

fn operands(rows: usize, inner: usize, cols: usize, fill: FillPattern) -> (Matrix, Matrix) {
    let mut a = Matrix::allocate(rows, inner).unwrap();
    let mut b = Matrix::allocate(inner, cols).unwrap();
    fill.fill_operands(&mut a, &mut b);
    (a, b)
}

fn assert_matches_reference(multiply: &mut dyn Multiply, a: &Matrix, b: &Matrix, label: &str) {
    let expected = multiply_reference(a, b).unwrap();
    let mut c = Matrix::allocate(a.rows(), b.cols()).unwrap();
    c.as_mut_slice().fill(-999.0);

    multiply.prepare(a, b).unwrap();
    multiply.multiply(a, b, &mut c).unwrap();

    for i in 0..c.rows() {
        for j in 0..c.cols() {
            let (actual, wanted) = (c[(i, j)], expected[(i, j)]);
            assert_relative_eq!(actual, wanted, epsilon = 1e-4, max_relative = 1e-4);
            assert_ne!(actual, -999.0, "{}: ({}, {}) never written", label, i, j);
        }
    }
}

#[test]
fn test_tiled_matches_reference_random() {
    let mut kernel = BlockedMultiply::with_threads(TileSpec::default(), 4).unwrap();
    for n in SIZES {
        let (a, b) = operands(n, n, n, FillPattern::Random { seed: n as u64 });
        assert_matches_reference(&mut kernel, &a, &b, &format!("random {n}"));
    }
}

#[test]
fn test_tiled_matches_reference_trigonometric() {
    let mut kernel = BlockedMultiply::with_threads(TileSpec::default(), 4).unwrap();
    for n in SIZES {
        let (a, b) = operands(n, n, n, FillPattern::Trigonometric);
        assert_matches_reference(&mut kernel, &a, &b, &format!("trig {n}"));
    }
}

#[test]
fn test_portable_kernel_matches_reference() {
    let mut kernel = BlockedMultiply::with_threads(TileSpec::default(), 2)
        .unwrap()
        .portable();
    assert!(!kernel.uses_explicit_simd());
    for n in SIZES {
        let (a, b) = operands(n, n, n, FillPattern::Random { seed: 100 + n as u64 });
        assert_matches_reference(&mut kernel, &a, &b, &format!("portable {n}"));
    }
}

#[test]
fn test_baseline_matches_reference() {
    for n in SIZES {
        let (a, b) = operands(n, n, n, FillPattern::Random { seed: 7 });
        assert_matches_reference(&mut BaselineMultiply, &a, &b, &format!("baseline {n}"));
    }
}

#[test]
fn test_remainder_path_s10_v8() {
    let mut kernel = BlockedMultiply::with_threads(TileSpec::new(16, 8, 8).unwrap(), 4).unwrap();
    let (a, b) = operands(20, 10, 20, FillPattern::Random { seed: 3 });
    assert_matches_reference(&mut kernel, &a, &b, "S=10");
}

#[test]
fn test_tile_boundary_17x17() {
    let mut kernel = BlockedMultiply::with_threads(TileSpec::default(), 4).unwrap();
    let (a, b) = operands(17, 17, 17, FillPattern::Trigonometric);
    assert_matches_reference(&mut kernel, &a, &b, "17x17");
}

#[test]
fn test_rectangular_shapes() {
    let mut kernel = BlockedMultiply::with_threads(TileSpec::default(), 3).unwrap();
    for (r, s, t) in [(1, 64, 1), (33, 5, 18), (7, 129, 40), (48, 16, 3)] {
        let (a, b) = operands(r, s, t, FillPattern::Random { seed: 11 });
        assert_matches_reference(&mut kernel, &a, &b, &format!("{r}x{s}x{t}"));
    }
}

#[test]
fn test_dimension_mismatch_3x4_by_5x6() {
    let a = Matrix::allocate(3, 4).unwrap();
    let b = Matrix::allocate(5, 6).unwrap();

    let implementations: Vec<Box<dyn Multiply>> = vec![
        Box::new(BlockedMultiply::with_threads(TileSpec::default(), 2).unwrap()),
        Box::new(tilebench::matmul::ReferenceMultiply),
        Box::new(BaselineMultiply),
    ];

    for mut multiply in implementations {
        let mut c = Matrix::from_vec(3, 6, vec![42.0; 18]).unwrap();
        let err = multiply.multiply(&a, &b, &mut c).unwrap_err();

        assert!(
            matches!(err, BenchError::DimensionMismatch { .. }),
            "{}: {err}",
            multiply.name()
        );
        assert!(c.as_slice().iter().all(|&v| v == 42.0), "{} wrote output", multiply.name());
    }
}
