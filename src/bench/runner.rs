//! The benchmark driver.
//!
//! For every selected implementation and every configured size, one *cell*
//! walks through:
//!
//! ```text
//! Allocate(A, B, C) -> Fill(A, B) -> Prepare -> Warmup -> TimedLoop -> [Verify] -> Report
//! ```
//!
//! Cells run sequentially on the calling thread. Only the tiled kernel uses the
//! worker pool, and only inside a single call. A failing cell is reported as
//! skipped and the run continues with the next one.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::bench::report::{report, BenchmarkResult, CellOutcome};
use crate::bench::timer::measure;
use crate::error::{config_error, BenchError, Result};
use crate::matmul::{BaselineMultiply, BlockedMultiply, Multiply, ReferenceMultiply, TileSpec};
use crate::matrix::{FillPattern, Matrix};

/// Matrix sizes benchmarked when none are given.
pub const DEFAULT_SIZES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

/// Default timed iterations per cell.
pub const DEFAULT_ITERATIONS: usize = 1;

/// Default maximum relative error accepted by verification.
pub const DEFAULT_TOLERANCE: f32 = 1e-3;

/// One implementation the runner knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implementation {
    Tiled,
    Reference,
    Baseline,
}

impl Implementation {
    /// Canonical run order.
    pub const ALL: [Implementation; 3] = [
        Implementation::Tiled,
        Implementation::Reference,
        Implementation::Baseline,
    ];

    /// Report label, the same as the built implementation's [`Multiply::name`].
    pub fn name(self) -> &'static str {
        match self {
            Implementation::Tiled => "Tiled kernel",
            Implementation::Reference => "Reference (i-j-k)",
            Implementation::Baseline => "ndarray baseline",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Implementation::Tiled => ImplementationSet::TILED.0,
            Implementation::Reference => ImplementationSet::REFERENCE.0,
            Implementation::Baseline => ImplementationSet::BASELINE.0,
        }
    }
}

/// Bitmask of selected implementations.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImplementationSet(u8);

impl ImplementationSet {
    pub const NONE: Self = Self(0);
    pub const TILED: Self = Self(1);
    pub const REFERENCE: Self = Self(2);
    pub const BASELINE: Self = Self(4);
    pub const ALL: Self = Self(7);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, implementation: Implementation) -> Self {
        Self(self.0 | implementation.bit())
    }

    pub fn contains(self, implementation: Implementation) -> bool {
        self.0 & implementation.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Selected implementations in canonical run order.
    pub fn iter(self) -> impl Iterator<Item = Implementation> {
        Implementation::ALL
            .into_iter()
            .filter(move |&implementation| self.contains(implementation))
    }
}

impl Default for ImplementationSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<Implementation> for ImplementationSet {
    fn from(implementation: Implementation) -> Self {
        Self::NONE.with(implementation)
    }
}

impl FromIterator<Implementation> for ImplementationSet {
    fn from_iter<I: IntoIterator<Item = Implementation>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl fmt::Debug for ImplementationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Everything a benchmark run needs. Immutable once the runner owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    sizes: Vec<usize>,
    iterations: usize,
    implementations: ImplementationSet,
    warmup: usize,
    threads: usize,
    tile: TileSpec,
    fill: FillPattern,
    verify: bool,
    tolerance: f32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_SIZES.to_vec(),
            iterations: DEFAULT_ITERATIONS,
            implementations: ImplementationSet::ALL,
            warmup: 1,
            threads: available_threads(),
            tile: TileSpec::default(),
            fill: FillPattern::default(),
            verify: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

fn available_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

impl BenchmarkConfig {
    pub fn builder() -> BenchmarkConfigBuilder {
        BenchmarkConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn implementations(&self) -> ImplementationSet {
        self.implementations
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn tile(&self) -> TileSpec {
        self.tile
    }

    pub fn fill(&self) -> FillPattern {
        self.fill
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() {
            return Err(config_error("size list is empty"));
        }
        if let Some(position) = self.sizes.iter().position(|&n| n == 0) {
            return Err(config_error(format!(
                "matrix size at position {position} must be positive"
            )));
        }
        if self.iterations == 0 {
            return Err(config_error("iteration count must be positive"));
        }
        if self.implementations.is_empty() {
            return Err(config_error("no implementation selected"));
        }
        if self.threads == 0 {
            return Err(config_error("thread count must be positive"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(config_error(format!(
                "verification tolerance {} must be a positive number",
                self.tolerance
            )));
        }
        self.tile.validate()
    }
}

/// Builder for [`BenchmarkConfig`]; [`build`](Self::build) validates.
#[derive(Debug, Clone)]
pub struct BenchmarkConfigBuilder {
    config: BenchmarkConfig,
}

impl BenchmarkConfigBuilder {
    pub fn sizes(mut self, sizes: Vec<usize>) -> Self {
        self.config.sizes = sizes;
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.config.iterations = iterations;
        self
    }

    pub fn implementations(mut self, implementations: ImplementationSet) -> Self {
        self.config.implementations = implementations;
        self
    }

    /// Untimed calls before the timed loop.
    pub fn warmup(mut self, warmup: usize) -> Self {
        self.config.warmup = warmup;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn tile(mut self, tile: TileSpec) -> Self {
        self.config.tile = tile;
        self
    }

    pub fn fill(mut self, fill: FillPattern) -> Self {
        self.config.fill = fill;
        self
    }

    /// Check every output against the reference after timing.
    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// # Errors
    ///
    /// Returns a configuration error for an empty or zero size list, zero
    /// iterations or threads, an empty implementation set, a non-positive
    /// tolerance, or an invalid tile specification.
    pub fn build(self) -> Result<BenchmarkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Allocation hook used for every matrix of a run.
pub type Allocator = Box<dyn Fn(usize, usize) -> Result<Matrix>>;

/// Drives every `(implementation, size)` cell of a [`BenchmarkConfig`].
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    pool: Arc<ThreadPool>,
    allocator: Allocator,
}

impl BenchmarkRunner {
    /// Creates a runner and its worker pool.
    ///
    /// # Errors
    ///
    /// Fails if the thread pool cannot be built.
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("tile-worker-{i}"))
            .build()?;

        Ok(Self {
            config,
            pool: Arc::new(pool),
            allocator: Box::new(Matrix::allocate),
        })
    }

    /// Replaces the matrix allocator, e.g. to simulate allocation failures.
    pub fn with_allocator<F>(mut self, allocator: F) -> Self
    where
        F: Fn(usize, usize) -> Result<Matrix> + 'static,
    {
        self.allocator = Box::new(allocator);
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Builds the implementation behind `implementation`, sharing the runner's pool.
    pub fn implementation(&self, implementation: Implementation) -> Result<Box<dyn Multiply>> {
        let multiply: Box<dyn Multiply> = match implementation {
            Implementation::Tiled => Box::new(BlockedMultiply::new(
                self.config.tile,
                Arc::clone(&self.pool),
            )?),
            Implementation::Reference => Box::new(ReferenceMultiply),
            Implementation::Baseline => Box::new(BaselineMultiply),
        };
        Ok(multiply)
    }

    /// Runs every cell and returns the outcomes in run order.
    pub fn run(&self) -> Vec<CellOutcome> {
        let mut outcomes = Vec::new();
        self.run_with(|outcome| {
            outcomes.push(outcome);
            ControlFlow::Continue(())
        });
        outcomes
    }

    /// Like [`run`](Self::run) but hands each outcome to `sink` as soon as its
    /// cell finishes. The run stops before the next cell once `sink` breaks.
    pub fn run_with<F>(&self, mut sink: F)
    where
        F: FnMut(CellOutcome) -> ControlFlow<()>,
    {
        info!(
            implementations = ?self.config.implementations,
            sizes = ?self.config.sizes,
            iterations = self.config.iterations,
            threads = self.pool.current_num_threads(),
            "benchmark run starting"
        );

        for implementation in self.config.implementations.iter() {
            let mut multiply = match self.implementation(implementation) {
                Ok(multiply) => multiply,
                Err(error) => {
                    for &n in &self.config.sizes {
                        let outcome = skipped(implementation.name(), n, error_for_cell(&error));
                        if sink(outcome).is_break() {
                            info!("benchmark run stopped early");
                            return;
                        }
                    }
                    continue;
                }
            };

            for &n in &self.config.sizes {
                let outcome = match self.run_cell(multiply.as_mut(), n) {
                    Ok(result) => {
                        info!(
                            implementation = %result.implementation,
                            size = n,
                            average_secs = result.average.as_secs_f64(),
                            mb_per_sec = result.megabytes_per_sec(),
                            "cell finished"
                        );
                        CellOutcome::Completed(result)
                    }
                    Err(error) => skipped(multiply.name(), n, error),
                };
                if sink(outcome).is_break() {
                    info!("benchmark run stopped early");
                    return;
                }
            }
        }
    }

    fn run_cell(&self, multiply: &mut dyn Multiply, n: usize) -> Result<BenchmarkResult> {
        let name = multiply.name();

        debug!(implementation = name, size = n, "allocating");
        let mut a = (self.allocator)(n, n)?;
        let mut b = (self.allocator)(n, n)?;
        let mut c = (self.allocator)(n, n)?;

        self.config.fill.fill_operands(&mut a, &mut b);

        debug!(implementation = name, size = n, "preparing");
        multiply.prepare(&a, &b)?;

        for _ in 0..self.config.warmup {
            multiply.multiply(&a, &b, &mut c)?;
        }

        debug!(
            implementation = name,
            size = n,
            iterations = self.config.iterations,
            "timing"
        );
        let elapsed = measure(|| multiply.multiply(&a, &b, &mut c), self.config.iterations)?;

        if self.config.verify {
            let mut expected = (self.allocator)(n, n)?;
            ReferenceMultiply.multiply(&a, &b, &mut expected)?;
            let max_error = c.max_relative_error(&expected)?;
            if max_error > self.config.tolerance {
                return Err(BenchError::Verification {
                    implementation: name.to_string(),
                    max_error,
                    tolerance: self.config.tolerance,
                });
            }
            debug!(implementation = name, size = n, max_error, "verified");
        }

        Ok(report(name, n, n, self.config.iterations, elapsed))
    }
}

fn skipped(name: &str, n: usize, error: BenchError) -> CellOutcome {
    warn!(implementation = name, size = n, %error, "cell skipped");
    CellOutcome::Skipped {
        implementation: name.to_string(),
        rows: n,
        cols: n,
        error,
    }
}

// BenchError is not Clone, construction failures are repeated per cell as
// configuration errors.
fn error_for_cell(error: &BenchError) -> BenchError {
    config_error(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchmarkConfig::builder().build().unwrap();
        assert_eq!(config.sizes(), &DEFAULT_SIZES);
        assert_eq!(config.iterations(), 1);
        assert_eq!(config.implementations(), ImplementationSet::ALL);
        assert_eq!(config.warmup(), 1);
        assert!(config.threads() >= 1);
        assert!(!config.verify());
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let cases = [
            BenchmarkConfig::builder().sizes(vec![]),
            BenchmarkConfig::builder().sizes(vec![16, 0, 32]),
            BenchmarkConfig::builder().iterations(0),
            BenchmarkConfig::builder().implementations(ImplementationSet::NONE),
            BenchmarkConfig::builder().threads(0),
            BenchmarkConfig::builder().tolerance(0.0),
            BenchmarkConfig::builder().tolerance(f32::NAN),
            BenchmarkConfig::builder().tile(TileSpec {
                outer: 16,
                inner: 8,
                lanes: 5,
            }),
        ];
        for builder in cases {
            let err = builder.clone().build().unwrap_err();
            assert!(matches!(err, BenchError::Config { .. }), "{:?}", builder);
        }
    }

    #[test]
    fn test_set_bits_match_selection_flags() {
        assert_eq!(ImplementationSet::TILED.bits(), 1);
        assert_eq!(ImplementationSet::REFERENCE.bits(), 2);
        assert_eq!(ImplementationSet::BASELINE.bits(), 4);
        assert_eq!(ImplementationSet::ALL.bits(), 7);

        let set: ImplementationSet = [Implementation::Baseline, Implementation::Tiled]
            .into_iter()
            .collect();
        assert_eq!(set.bits(), 5);
        assert!(!set.contains(Implementation::Reference));
    }

    #[test]
    fn test_set_iterates_in_canonical_order() {
        let set = ImplementationSet::from(Implementation::Baseline)
            .with(Implementation::Reference)
            .with(Implementation::Tiled);
        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, Implementation::ALL.to_vec());
    }

    #[test]
    fn test_implementation_names_match_reports() {
        let config = BenchmarkConfig::builder().threads(1).build().unwrap();
        let runner = BenchmarkRunner::new(config).unwrap();
        for implementation in Implementation::ALL {
            let built = runner.implementation(implementation).unwrap();
            assert_eq!(built.name(), implementation.name());
        }
    }

    #[test]
    fn test_wrong_result_fails_verification() {
        struct Garbage;
        impl Multiply for Garbage {
            fn name(&self) -> &'static str {
                "garbage"
            }
            fn multiply(&mut self, _: &Matrix, _: &Matrix, c: &mut Matrix) -> Result<()> {
                c.as_mut_slice().fill(3.0);
                Ok(())
            }
        }

        let config = BenchmarkConfig::builder()
            .sizes(vec![8])
            .verify(true)
            .threads(1)
            .build()
            .unwrap();
        let runner = BenchmarkRunner::new(config).unwrap();

        let err = runner.run_cell(&mut Garbage, 8).unwrap_err();

        assert!(matches!(
            err,
            BenchError::Verification { ref implementation, .. } if implementation == "garbage"
        ));
    }

    #[test]
    fn test_nan_result_fails_verification() {
        struct NanOutput;
        impl Multiply for NanOutput {
            fn name(&self) -> &'static str {
                "nan"
            }
            fn multiply(&mut self, _: &Matrix, _: &Matrix, c: &mut Matrix) -> Result<()> {
                c.as_mut_slice().fill(f32::NAN);
                Ok(())
            }
        }

        let config = BenchmarkConfig::builder()
            .sizes(vec![4])
            .verify(true)
            .threads(1)
            .build()
            .unwrap();
        let runner = BenchmarkRunner::new(config).unwrap();

        assert!(matches!(
            runner.run_cell(&mut NanOutput, 4),
            Err(BenchError::Verification { .. })
        ));
    }

    #[test]
    fn test_warmup_is_not_timed() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Counting(Rc<Cell<usize>>);
        impl Multiply for Counting {
            fn name(&self) -> &'static str {
                "counting"
            }
            fn multiply(&mut self, _: &Matrix, _: &Matrix, _: &mut Matrix) -> Result<()> {
                self.0.set(self.0.get() + 1);
                Ok(())
            }
        }

        let config = BenchmarkConfig::builder()
            .sizes(vec![4])
            .iterations(5)
            .warmup(2)
            .threads(1)
            .build()
            .unwrap();
        let runner = BenchmarkRunner::new(config).unwrap();
        let calls = Rc::new(Cell::new(0));
        let mut counting = Counting(Rc::clone(&calls));

        let result = runner.run_cell(&mut counting, 4).unwrap();

        assert_eq!(calls.get(), 7);
        assert_eq!(result.iterations, 5);
    }
}
