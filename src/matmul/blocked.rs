//! # Tiled, Vectorized, Parallel Matrix Multiplication
//!
//! This module computes `C = A * B` for single-precision, row-major matrices
//! A (R×S) and B (S×T):
//!
//! 1. **Pretranspose**: B is transposed once per call into a scratch buffer Bt
//!    (T×S), so both operands of every dot product are read contiguously.
//!
//! 2. **Lane accumulation**: each `C[i, j]` is a dot product of row `i` of A and
//!    row `j` of Bt, accumulated in `V`-lane chunks with a scalar tail
//!    (see [`lanes`](super::lanes)).
//!
//! 3. **Two-level tiling**: the output is split into bands of `outer` rows. Each
//!    band (one row of `outer × outer` tiles) is a task on the rayon pool and
//!    owns a disjoint `&mut` chunk of C. Inside a band, every column tile uses
//!    its contiguous `outer × S` panel of Bt, shared by all rows of A passing
//!    through, and walks it in `inner × inner` sub-tiles.
//!
//! ```text
//! for band in par(0..R step outer):          // one rayon task per row of tiles
//!     for j0 in (0..T step outer):           // column tile, Bt panel rows j0..j0+outer
//!         for ii in band step inner:         // sub-tiles
//!             for jj in j0.. step inner:
//!                 C[i, j] = dot_V(A[i, ..], Bt[j, ..])
//! ```
//!
//! Boundary tiles are clipped to the remaining extent. Results differ from a
//! strictly sequential sum only by accumulation order.

use std::cmp::min;
use std::sync::Arc;

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
    ThreadPool, ThreadPoolBuilder,
};
use tracing::debug;

#[cfg(all(avx2, target_arch = "x86_64"))]
use super::lanes::{avx2_available, Avx2};
use super::lanes::{LaneKernel, Portable};
use super::transpose::transpose_tiled;
use super::{check_dimensions, Multiply};
use crate::error::{allocation_error, config_error, dimension_error, Result};
use crate::matrix::Matrix;

/// Outer tile edge: rows per parallel band, columns per Bt panel.
pub const OUTER_TILE: usize = 16;

/// Inner sub-tile edge.
pub const INNER_TILE: usize = 8;

/// Default accumulator width, one 256-bit register of `f32`.
pub const LANES: usize = 8;

/// Largest accepted tile edge.
pub const MAX_TILE: usize = 4096;

/// Cache-block and vector-width configuration of the tiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    /// Edge of the tiles distributed across workers.
    pub outer: usize,
    /// Edge of the sub-tiles processed sequentially inside a worker.
    pub inner: usize,
    /// Accumulator lane count, one of [`TileSpec::SUPPORTED_LANES`].
    pub lanes: usize,
}

impl Default for TileSpec {
    fn default() -> Self {
        Self {
            outer: OUTER_TILE,
            inner: INNER_TILE,
            lanes: LANES,
        }
    }
}

impl TileSpec {
    /// Lane counts with a compiled kernel.
    pub const SUPPORTED_LANES: [usize; 3] = [4, 8, 16];

    pub fn new(outer: usize, inner: usize, lanes: usize) -> Result<Self> {
        let spec = Self {
            outer,
            inner,
            lanes,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// # Errors
    ///
    /// Returns a configuration error for zero tile sizes, `outer > MAX_TILE`,
    /// `inner > outer`, or an unsupported lane count.
    pub fn validate(&self) -> Result<()> {
        if self.outer == 0 || self.inner == 0 {
            return Err(config_error(format!(
                "tile sizes must be positive (outer {}, inner {})",
                self.outer, self.inner
            )));
        }
        if self.outer > MAX_TILE {
            return Err(config_error(format!(
                "outer tile {} exceeds the maximum of {MAX_TILE}",
                self.outer
            )));
        }
        if self.inner > self.outer {
            return Err(config_error(format!(
                "inner tile {} is larger than outer tile {}",
                self.inner, self.outer
            )));
        }
        if !Self::SUPPORTED_LANES.contains(&self.lanes) {
            return Err(config_error(format!(
                "unsupported lane count {} (expected one of {:?})",
                self.lanes,
                Self::SUPPORTED_LANES
            )));
        }
        Ok(())
    }
}

/// Which monomorphized lane kernel a [`BlockedMultiply`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaneDispatch {
    Portable4,
    Portable8,
    Portable16,
    #[cfg(all(avx2, target_arch = "x86_64"))]
    Avx2,
}

impl LaneDispatch {
    fn select(lanes: usize, allow_explicit: bool) -> Result<Self> {
        match lanes {
            4 => Ok(Self::Portable4),
            8 => Ok(allow_explicit
                .then(Self::explicit_eight)
                .flatten()
                .unwrap_or(Self::Portable8)),
            16 => Ok(Self::Portable16),
            other => Err(config_error(format!("unsupported lane count {other}"))),
        }
    }

    #[cfg(all(avx2, target_arch = "x86_64"))]
    fn explicit_eight() -> Option<Self> {
        avx2_available().then_some(Self::Avx2)
    }

    #[cfg(not(all(avx2, target_arch = "x86_64")))]
    fn explicit_eight() -> Option<Self> {
        None
    }
}

/// The tiled kernel bound to a worker pool.
///
/// The pool is shared (`Arc`) so one set of worker threads serves every call of
/// a benchmark run. The transpose scratch buffer grows to the largest B seen
/// and is reused.
pub struct BlockedMultiply {
    tile: TileSpec,
    pool: Arc<ThreadPool>,
    dispatch: LaneDispatch,
    bt: Vec<f32>,
}

impl BlockedMultiply {
    /// Creates a kernel that runs on `pool`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `tile` is invalid.
    pub fn new(tile: TileSpec, pool: Arc<ThreadPool>) -> Result<Self> {
        tile.validate()?;
        let dispatch = LaneDispatch::select(tile.lanes, true)?;
        debug!(?tile, ?dispatch, threads = pool.current_num_threads(), "tiled kernel ready");

        Ok(Self {
            tile,
            pool,
            dispatch,
            bt: Vec::new(),
        })
    }

    /// Creates a kernel with its own pool of `threads` workers.
    pub fn with_threads(tile: TileSpec, threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tile-worker-{i}"))
            .build()?;
        Self::new(tile, Arc::new(pool))
    }

    /// Forces the portable lane kernel even when an explicit one is available.
    pub fn portable(mut self) -> Self {
        if let Ok(dispatch) = LaneDispatch::select(self.tile.lanes, false) {
            self.dispatch = dispatch;
        }
        self
    }

    pub fn tile(&self) -> &TileSpec {
        &self.tile
    }

    /// `true` when the explicit AVX2 lane kernel is in use.
    pub fn uses_explicit_simd(&self) -> bool {
        #[cfg(all(avx2, target_arch = "x86_64"))]
        {
            self.dispatch == LaneDispatch::Avx2
        }
        #[cfg(not(all(avx2, target_arch = "x86_64")))]
        {
            false
        }
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn ensure_scratch(bt: &mut Vec<f32>, len: usize) -> Result<()> {
    if bt.len() < len {
        bt.try_reserve_exact(len - bt.len())
            .map_err(|e| allocation_error(len, e.to_string()))?;
        bt.resize(len, 0.0);
    }
    Ok(())
}

impl Multiply for BlockedMultiply {
    fn name(&self) -> &'static str {
        "Tiled kernel"
    }

    fn prepare(&mut self, a: &Matrix, b: &Matrix) -> Result<()> {
        if a.cols() != b.rows() {
            return Err(dimension_error(a.shape(), b.shape()));
        }
        ensure_scratch(&mut self.bt, b.len())
    }

    fn multiply(&mut self, a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<()> {
        check_dimensions(a, b, c)?;
        if c.is_empty() {
            return Ok(());
        }

        let Self {
            tile,
            pool,
            dispatch,
            bt,
        } = self;

        let (s, t) = b.shape();
        ensure_scratch(bt, s * t)?;
        let bt = &mut bt[..s * t];

        pool.install(|| transpose_tiled(b.as_slice(), bt, s, t, tile.outer));

        let bt: &[f32] = bt;
        let (a, c) = (a.as_slice(), c.as_mut_slice());
        match dispatch {
            LaneDispatch::Portable4 => multiply_tiles::<Portable<4>>(pool, tile, a, bt, c, s, t),
            LaneDispatch::Portable8 => multiply_tiles::<Portable<8>>(pool, tile, a, bt, c, s, t),
            LaneDispatch::Portable16 => multiply_tiles::<Portable<16>>(pool, tile, a, bt, c, s, t),
            #[cfg(all(avx2, target_arch = "x86_64"))]
            LaneDispatch::Avx2 => multiply_tiles::<Avx2>(pool, tile, a, bt, c, s, t),
        }
        Ok(())
    }
}

/// Fills `c` (R×T) from `a` (R×S) and the pretransposed `bt` (T×S).
fn multiply_tiles<K: LaneKernel>(
    pool: &ThreadPool,
    tile: &TileSpec,
    a: &[f32],
    bt: &[f32],
    c: &mut [f32],
    s: usize,
    t: usize,
) {
    let TileSpec { outer, inner, .. } = *tile;
    // Clamped to C's row count so the band length never exceeds `c.len()`.
    let band_rows_max = min(outer, c.len() / t);
    let band_len = band_rows_max * t;

    pool.install(|| {
        c.par_chunks_mut(band_len)
            .enumerate()
            .for_each(|(band, c_band)| {
                let i0 = band * band_rows_max;
                let band_rows = c_band.len() / t;

                for j0 in (0..t).step_by(outer) {
                    let j_end = min(j0 + outer, t);
                    let bt_panel = &bt[j0 * s..j_end * s];

                    for ii in (0..band_rows).step_by(inner) {
                        let ii_end = min(ii + inner, band_rows);

                        for jj in (j0..j_end).step_by(inner) {
                            let jj_end = min(jj + inner, j_end);

                            for i in ii..ii_end {
                                let a_row = &a[(i0 + i) * s..(i0 + i + 1) * s];
                                let c_row = &mut c_band[i * t..(i + 1) * t];

                                for j in jj..jj_end {
                                    let p = j - j0;
                                    c_row[j] = K::dot(a_row, &bt_panel[p * s..(p + 1) * s]);
                                }
                            }
                        }
                    }
                }
            });
    });
}
