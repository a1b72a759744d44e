//! Benchmark harness: timing, result records and the cell-by-cell runner.

pub mod report;
pub mod runner;
pub mod timer;

pub use report::{report, BenchmarkResult, CellOutcome, ReportTable};
pub use runner::{
    BenchmarkConfig, BenchmarkConfigBuilder, BenchmarkRunner, Implementation, ImplementationSet,
};
pub use timer::measure;
