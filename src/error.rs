//! Error types for tilebench operations.
//!
//! Every failure a benchmark cell can hit is a [`BenchError`]. The runner turns
//! these into skipped cells; only configuration and pool construction errors
//! stop a run.

use thiserror::Error;

/// Errors that can occur while allocating, multiplying or benchmarking.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The benchmark configuration is unusable.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Operands (or the output buffer) have incompatible shapes.
    #[error(
        "Dimension mismatch: cannot multiply {lhs_rows}x{lhs_cols} by {rhs_rows}x{rhs_cols}"
    )]
    DimensionMismatch {
        lhs_rows: usize,
        lhs_cols: usize,
        rhs_rows: usize,
        rhs_cols: usize,
    },

    /// Matrix storage could not be allocated.
    #[error("Memory allocation failed: {message} (requested {requested_elements} f32 elements)")]
    Allocation {
        /// Number of `f32` elements that were requested.
        requested_elements: usize,
        /// Human-readable error message.
        message: String,
    },

    /// The worker pool could not be started.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The external baseline rejected its inputs.
    #[error("Baseline error: {message}")]
    Baseline {
        /// Human-readable error message.
        message: String,
    },

    /// An implementation's output drifted from the reference result.
    #[error(
        "Verification failed for {implementation}: max relative error {max_error:e} exceeds {tolerance:e}"
    )]
    Verification {
        implementation: String,
        max_error: f32,
        tolerance: f32,
    },
}

/// Result type alias for tilebench operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Creates a configuration error.
pub fn config_error(message: impl Into<String>) -> BenchError {
    BenchError::Config {
        message: message.into(),
    }
}

/// Creates an allocation error.
pub fn allocation_error(requested_elements: usize, message: impl Into<String>) -> BenchError {
    BenchError::Allocation {
        requested_elements,
        message: message.into(),
    }
}

/// Creates a dimension mismatch error for `lhs · rhs`.
pub fn dimension_error(lhs: (usize, usize), rhs: (usize, usize)) -> BenchError {
    BenchError::DimensionMismatch {
        lhs_rows: lhs.0,
        lhs_cols: lhs.1,
        rhs_rows: rhs.0,
        rhs_cols: rhs.1,
    }
}
