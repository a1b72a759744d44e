use std::time::{Duration, Instant};

use crate::error::Result;

/// Runs `op` exactly `iterations` times back to back and returns the total wall
/// time, measured with the monotonic [`Instant`] clock.
///
/// Nothing else happens inside the timed region, so one-time work (allocation,
/// filling, warmup) must be done by the caller beforehand. The first error ends
/// the loop and is returned.
pub fn measure<F>(mut op: F, iterations: usize) -> Result<Duration>
where
    F: FnMut() -> Result<()>,
{
    let start = Instant::now();
    for _ in 0..iterations {
        op()?;
    }
    Ok(start.elapsed())
}
