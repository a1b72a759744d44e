//! Tiled, vectorized and parallel single-precision matrix multiplication, and a
//! harness that benchmarks it fairly against a naive reference and `ndarray`.
//!
//! ## Usage
//!
//! ```
//! use tilebench::matmul::{BlockedMultiply, Multiply, TileSpec};
//! use tilebench::matrix::{fill_random, Matrix};
//!
//! let mut a = Matrix::allocate(64, 64).unwrap();
//! let mut b = Matrix::allocate(64, 64).unwrap();
//! fill_random(&mut a, 1);
//! fill_random(&mut b, 2);
//!
//! let mut kernel = BlockedMultiply::with_threads(TileSpec::default(), 4).unwrap();
//! let mut c = Matrix::allocate(64, 64).unwrap();
//! kernel.multiply(&a, &b, &mut c).unwrap();
//! ```
//!
//! Running a whole benchmark:
//!
//! ```
//! use tilebench::bench::{BenchmarkConfig, BenchmarkRunner, ReportTable};
//!
//! let config = BenchmarkConfig::builder().sizes(vec![16, 32]).build().unwrap();
//! let outcomes = BenchmarkRunner::new(config).unwrap().run();
//! println!("{}", ReportTable(&outcomes));
//! ```

pub mod bench;
pub mod error;
pub mod matmul;
pub mod matrix;

pub use error::{BenchError, Result};
