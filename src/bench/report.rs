//! Benchmark results and the fixed-width report table.

use std::fmt;
use std::time::Duration;

use crate::error::BenchError;
use crate::matrix::ELEMENT_BYTES;

/// One measured `(implementation, size)` cell.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub implementation: String,
    pub rows: usize,
    pub cols: usize,
    pub iterations: usize,
    /// Total time of the timed loop.
    pub elapsed: Duration,
    /// `elapsed / iterations`.
    pub average: Duration,
    /// One output buffer's worth of bytes per call, per second.
    pub bytes_per_sec: f64,
}

impl BenchmarkResult {
    pub fn megabytes_per_sec(&self) -> f64 {
        self.bytes_per_sec / 1e6
    }
}

/// Builds the result record for `iterations` calls that took `elapsed` in total.
///
/// Throughput counts `rows * cols * 4` bytes per call. A zero `elapsed` yields
/// infinite throughput, zero iterations a zero average.
pub fn report(
    name: &str,
    rows: usize,
    cols: usize,
    iterations: usize,
    elapsed: Duration,
) -> BenchmarkResult {
    let average = if iterations == 0 {
        Duration::ZERO
    } else {
        let nanos = elapsed.as_nanos() / iterations as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    };

    let bytes = iterations as f64 * rows as f64 * cols as f64 * ELEMENT_BYTES as f64;
    let secs = elapsed.as_secs_f64();
    let bytes_per_sec = if secs > 0.0 {
        bytes / secs
    } else {
        f64::INFINITY
    };

    BenchmarkResult {
        implementation: name.to_string(),
        rows,
        cols,
        iterations,
        elapsed,
        average,
        bytes_per_sec,
    }
}

/// What happened to one `(implementation, size)` cell.
#[derive(Debug)]
pub enum CellOutcome {
    Completed(BenchmarkResult),
    Skipped {
        implementation: String,
        rows: usize,
        cols: usize,
        error: BenchError,
    },
}

impl CellOutcome {
    pub fn implementation(&self) -> &str {
        match self {
            CellOutcome::Completed(r) => &r.implementation,
            CellOutcome::Skipped { implementation, .. } => implementation,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            CellOutcome::Completed(r) => (r.rows, r.cols),
            CellOutcome::Skipped { rows, cols, .. } => (*rows, *cols),
        }
    }

    pub fn result(&self) -> Option<&BenchmarkResult> {
        match self {
            CellOutcome::Completed(r) => Some(r),
            CellOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CellOutcome::Skipped { .. })
    }
}

const NAME_WIDTH: usize = 25;
const SIZE_WIDTH: usize = 15;
const COLUMN_WIDTH: usize = 20;
const RULE_WIDTH: usize = 80;

/// Table header and rule.
pub fn header() -> String {
    format!(
        "{:>NAME_WIDTH$}{:>SIZE_WIDTH$}{:>COLUMN_WIDTH$}{:>COLUMN_WIDTH$}\n{}",
        "Implementation",
        "Matrix Size",
        "Average Runtime",
        "Data Throughput",
        "-".repeat(RULE_WIDTH)
    )
}

impl fmt::Display for CellOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.shape();
        write!(f, "{:>NAME_WIDTH$}{:>8} x {:<4}", self.implementation(), rows, cols)?;
        match self {
            CellOutcome::Completed(r) => write!(
                f,
                "{:>COLUMN_WIDTH$}{:>COLUMN_WIDTH$}",
                format!("{:.6e} s", r.average.as_secs_f64()),
                format!("{:.2} MB/s", r.megabytes_per_sec())
            ),
            CellOutcome::Skipped { error, .. } => write!(f, "   skipped: {error}"),
        }
    }
}

/// A complete report: header followed by one line per cell, in run order.
pub struct ReportTable<'a>(pub &'a [CellOutcome]);

impl fmt::Display for ReportTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", header())?;
        for cell in self.0 {
            writeln!(f, "{cell}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::allocation_error;

    #[test]
    fn test_report_arithmetic() {
        let r = report("Tiled kernel", 256, 256, 4, Duration::from_millis(8));

        assert_eq!(r.average, Duration::from_millis(2));
        // 4 calls * 256 * 256 * 4 bytes in 8 ms
        let expected = 4.0 * 256.0 * 256.0 * 4.0 / 0.008;
        assert!((r.bytes_per_sec - expected).abs() / expected < 1e-9);
        assert!((r.megabytes_per_sec() - expected / 1e6).abs() < 1e-6);
    }

    #[test]
    fn test_report_zero_elapsed() {
        let r = report("x", 2, 2, 1, Duration::ZERO);
        assert!(r.bytes_per_sec.is_infinite());
        assert_eq!(r.average, Duration::ZERO);
    }

    #[test]
    fn test_report_zero_iterations() {
        let r = report("x", 2, 2, 0, Duration::from_millis(1));
        assert_eq!(r.average, Duration::ZERO);
        assert_eq!(r.bytes_per_sec, 0.0);
    }

    #[test]
    fn test_header_layout() {
        let h = header();
        let mut lines = h.lines();
        let titles = lines.next().unwrap();
        assert_eq!(titles.len(), NAME_WIDTH + SIZE_WIDTH + 2 * COLUMN_WIDTH);
        assert!(titles.starts_with(&" ".repeat(NAME_WIDTH - "Implementation".len())));
        assert_eq!(lines.next().unwrap(), "-".repeat(80));
    }

    #[test]
    fn test_completed_row_layout() {
        let cell = CellOutcome::Completed(report("Tiled kernel", 64, 64, 1, Duration::from_millis(1)));
        let line = cell.to_string();

        assert!(line.starts_with(&format!("{:>25}", "Tiled kernel")));
        assert!(line.contains("      64 x 64  "));
        assert!(line.ends_with("MB/s"));
        assert!(line.contains("1.000000e-3 s"));
    }

    #[test]
    fn test_skipped_row() {
        let cell = CellOutcome::Skipped {
            implementation: "Reference (i-j-k)".to_string(),
            rows: 2048,
            cols: 2048,
            error: allocation_error(4, "forced"),
        };
        let line = cell.to_string();
        assert!(cell.is_skipped());
        assert!(cell.result().is_none());
        assert!(line.contains("2048 x 2048"));
        assert!(line.contains("skipped: Memory allocation failed"));
    }

    #[test]
    fn test_table_has_one_line_per_cell() {
        let cells = vec![
            CellOutcome::Completed(report("a", 16, 16, 1, Duration::from_micros(5))),
            CellOutcome::Completed(report("a", 32, 32, 1, Duration::from_micros(9))),
        ];
        let table = ReportTable(&cells).to_string();
        assert_eq!(table.lines().count(), 4);
    }
}
