//! Nearest-neighbor time alignment of channels onto a reference grid.
//!
//! Every import samples its sensors on an independent clock, so before an
//! expression can combine channels they must share one timestamp grid.
//! Alignment is a pure nearest-neighbor lookup: no interpolation, no
//! allocation beyond the output, no per-sample fallibility.

/// Resample a source channel `(t_src, v_src)` onto the timestamps of `t_ref`.
///
/// For each reference timestamp the value of the nearest source sample is
/// taken; when a reference timestamp sits exactly midway, the later sample
/// wins. Reference timestamps outside the source range clamp to the first or
/// last source value. Both timestamp arrays must be sorted ascending.
/// An empty source yields all zeros, same as an unbound input slot.
pub fn resample_nearest(t_ref: &[f64], t_src: &[f64], v_src: &[f64]) -> Vec<f64> {
    debug_assert_eq!(t_src.len(), v_src.len());
    if t_src.is_empty() {
        return zero_fill(t_ref.len());
    }
    let last = t_src.len() - 1;
    t_ref
        .iter()
        .map(|&t| {
            // Count of source samples strictly before t. With duplicate
            // source timestamps this lands on the first occurrence.
            let idx = t_src.partition_point(|&s| s < t);
            let pick = if idx == 0 {
                0
            } else if idx > last {
                last
            } else if t_src[idx] - t <= t - t_src[idx - 1] {
                idx
            } else {
                idx - 1
            };
            v_src[pick]
        })
        .collect()
}

/// All-zero stand-in for an unbound input slot.
#[inline]
pub fn zero_fill(len: usize) -> Vec<f64> {
    vec![0.0; len]
}
