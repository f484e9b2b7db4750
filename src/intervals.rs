//! Buffered interval sets on the absolute time axis.
//!
//! Filters turn matching sample timestamps into closed intervals
//! `[t - buffer, t + buffer]`; this module merges those into a disjoint
//! sorted set and answers membership and run queries against it.

use std::cmp::Ordering;

/// One closed time interval `[start, end]`. Degenerate intervals
/// (`start == end`) are valid and arise from zero-buffer matches.
pub type Interval = (f64, f64);

/// Expand each timestamp by ±`buffer` seconds and merge the result into a
/// disjoint, sorted interval set.
pub fn buffered_union(times: &[f64], buffer: f64) -> Vec<Interval> {
    merge(times.iter().map(|&t| (t - buffer, t + buffer)).collect())
}

/// Sweep-line union: sort by interval start, then fold every interval whose
/// start does not exceed the running interval's end into it. Idempotent on
/// already-merged input.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    let mut out: Vec<Interval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match out.last_mut() {
            Some(cur) if iv.0 <= cur.1 => cur.1 = cur.1.max(iv.1),
            _ => out.push(iv),
        }
    }
    out
}

/// Shift a whole interval set by `delta` seconds (absolute ↔ local time).
pub fn shift(intervals: &[Interval], delta: f64) -> Vec<Interval> {
    intervals.iter().map(|&(s, e)| (s + delta, e + delta)).collect()
}

/// Whether `t` lies inside a disjoint sorted interval set.
#[inline]
pub fn contains(intervals: &[Interval], t: f64) -> bool {
    let idx = intervals.partition_point(|iv| iv.0 <= t);
    idx > 0 && t <= intervals[idx - 1].1
}

/// Per-sample membership of sorted `times` in a disjoint sorted interval set.
pub fn membership(intervals: &[Interval], times: &[f64]) -> Vec<bool> {
    times.iter().map(|&t| contains(intervals, t)).collect()
}

/// Contiguous true-runs of `mask`, reported as `(times[first], times[last])`
/// per run. Used to tell the renderer where to break the line.
pub fn true_runs(mask: &[bool], times: &[f64]) -> Vec<Interval> {
    debug_assert_eq!(mask.len(), times.len());
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &m) in mask.iter().enumerate() {
        match (m, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((times[s], times[i - 1]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((times[s], times[mask.len() - 1]));
    }
    out
}
