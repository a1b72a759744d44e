//! Cache-blocked transpose used to lay out B for row-by-row dot products.

use std::cmp::min;

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

/// Transposes the row-major `rows x cols` matrix `src` into `dst` (`cols x rows`).
///
/// Work proceeds in `tile x tile` blocks so both the reads from `src` and the
/// writes into `dst` stay within a few cache lines. Each band of `tile` output
/// rows is an independent rayon task, so this runs on whatever pool the caller
/// installed.
///
/// # Arguments
///
/// * `src` - Source matrix (`rows x cols`), row-major
/// * `dst` - Destination (`cols x rows`), row-major, fully overwritten
/// * `rows` - Rows of `src`
/// * `cols` - Columns of `src`
/// * `tile` - Block edge length, must be non-zero
pub fn transpose_tiled(src: &[f32], dst: &mut [f32], rows: usize, cols: usize, tile: usize) {
    debug_assert_eq!(src.len(), rows * cols);
    debug_assert_eq!(dst.len(), rows * cols);
    debug_assert!(tile > 0);

    if rows == 0 || cols == 0 {
        return;
    }

    // dst row `j` is src column `j`. Bands are clamped to `cols` rows of dst.
    let band_rows = min(tile, cols);
    dst.par_chunks_mut(band_rows * rows)
        .enumerate()
        .for_each(|(band, dst_band)| {
            let j0 = band * band_rows;
            let j_end = min(j0 + band_rows, cols);

            for i0 in (0..rows).step_by(tile) {
                let i_end = min(i0 + tile, rows);
                for j in j0..j_end {
                    let dst_row = &mut dst_band[(j - j0) * rows..(j - j0 + 1) * rows];
                    for i in i0..i_end {
                        dst_row[i] = src[i * cols + j];
                    }
                }
            }
        });
}
