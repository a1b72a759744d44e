//! Lane-accumulated dot products, the innermost step of the tiled kernel.
//!
//! A reduction of length `S` is split into `S / V` full chunks of `V` lanes that
//! accumulate into a `V`-wide register, followed by a sequential lane sum and a
//! scalar tail for the `S % V` leftover elements:
//!
//! ```text
//! acc[l]  += a[c * V + l] * b[c * V + l]      for every chunk c, lane l
//! sum      = acc[0] + acc[1] + ... + acc[V-1]
//! sum     += a[k] * b[k]                       for k in (S / V) * V .. S
//! ```
//!
//! The portable kernel is written so the compiler can keep `acc` in one vector
//! register. On x86_64 with AVX2 an explicit `__m256` kernel is also used, but
//! only inside the crate after runtime detection:
//!
//! ```compile_fail
//! use tilebench::matmul::lanes::{Avx2, LaneKernel};
//!
//! let _ = Avx2::dot(&[1.0; 8], &[1.0; 8]);
//! ```

/// A dot product over two equally long rows using a fixed lane count.
pub trait LaneKernel: Send + Sync {
    /// Accumulator width.
    const LANES: usize;

    /// Dot product of `a` and `b`. Only the common prefix is read.
    fn dot(a: &[f32], b: &[f32]) -> f32;
}

/// Portable `V`-lane kernel relying on auto-vectorization.
pub struct Portable<const V: usize>;

impl<const V: usize> LaneKernel for Portable<V> {
    const LANES: usize = V;

    #[inline(always)]
    fn dot(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);

        let mut acc = [0.0f32; V];
        let a_chunks = a.chunks_exact(V);
        let b_chunks = b.chunks_exact(V);
        let a_tail = a_chunks.remainder();
        let b_tail = b_chunks.remainder();

        for (ca, cb) in a_chunks.zip(b_chunks) {
            for l in 0..V {
                acc[l] += ca[l] * cb[l];
            }
        }

        let mut sum = 0.0f32;
        for lane in acc {
            sum += lane;
        }
        for (&x, &y) in a_tail.iter().zip(b_tail) {
            sum += x * y;
        }
        sum
    }
}

/// Explicit 8-lane AVX2 kernel.
///
/// Only instantiate the tiled kernel with this type after
/// [`avx2_available`] returned `true`.
#[cfg(all(avx2, target_arch = "x86_64"))]
pub(crate) struct Avx2;

#[cfg(all(avx2, target_arch = "x86_64"))]
impl LaneKernel for Avx2 {
    const LANES: usize = 8;

    #[inline(always)]
    fn dot(a: &[f32], b: &[f32]) -> f32 {
        // SAFETY: the AVX2 kernel is only selected after runtime detection.
        unsafe { avx2::dot(a, b) }
    }
}

#[cfg(all(avx2, target_arch = "x86_64"))]
mod avx2 {
    use std::arch::x86_64::*;

    const LANE_COUNT: usize = 8;

    /// # Safety
    ///
    /// The CPU must support AVX2.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let chunks = n / LANE_COUNT;

        let mut acc = _mm256_setzero_ps();
        for c in 0..chunks {
            let offset = c * LANE_COUNT;
            let va = _mm256_loadu_ps(a.as_ptr().add(offset));
            let vb = _mm256_loadu_ps(b.as_ptr().add(offset));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
        }

        let mut lanes = [0.0f32; LANE_COUNT];
        _mm256_storeu_ps(lanes.as_mut_ptr(), acc);

        let mut sum = 0.0f32;
        for lane in lanes {
            sum += lane;
        }
        for k in chunks * LANE_COUNT..n {
            sum += a[k] * b[k];
        }
        sum
    }
}

/// `true` when the explicit AVX2 kernel is compiled in and the CPU supports it.
pub fn avx2_available() -> bool {
    #[cfg(all(avx2, target_arch = "x86_64"))]
    {
        is_x86_feature_detected!("avx2")
    }
    #[cfg(not(all(avx2, target_arch = "x86_64")))]
    {
        false
    }
}
