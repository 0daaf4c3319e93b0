//! Pivot detection in an oscillator series.
//!
//! A peak at `i` is a local maximum (`v[i-1] < v[i] >= v[i+1]`). Its
//! prominence is `v[i]` minus the higher of the two minima found walking left
//! and right until a strictly higher value or the window edge. Troughs are
//! peaks of the negated series.

use serde::{Deserialize, Serialize};

/// Local extremum in an oscillator series. `index` is absolute into the input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendlinePivot {
    pub index: usize,
    pub value: f64,
    pub prominence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Peak,
    Trough,
}

/// All pivots of the given kind inside `values[start..]`, with prominence.
///
/// Non-finite values are never pivots and stop the prominence walk.
pub fn find_pivots(values: &[f64], start: usize, kind: Extremum) -> Vec<TrendlinePivot> {
    let sign = match kind {
        Extremum::Peak => 1.0,
        Extremum::Trough => -1.0,
    };
    let v = |i: usize| sign * values[i];
    let n = values.len();
    let mut pivots = Vec::new();

    if n < 3 || start + 2 >= n {
        return pivots;
    }

    for i in (start + 1)..(n - 1) {
        let (l, c, r) = (v(i - 1), v(i), v(i + 1));
        if !(l.is_finite() && c.is_finite() && r.is_finite()) {
            continue;
        }
        if !(c > l && c >= r) {
            continue;
        }

        let mut left_min = c;
        for j in (start..i).rev() {
            let x = v(j);
            if !x.is_finite() || x > c {
                break;
            }
            left_min = left_min.min(x);
        }

        let mut right_min = c;
        for j in (i + 1)..n {
            let x = v(j);
            if !x.is_finite() || x > c {
                break;
            }
            right_min = right_min.min(x);
        }

        pivots.push(TrendlinePivot {
            index: i,
            value: values[i],
            prominence: c - left_min.max(right_min),
        });
    }

    pivots
}

/// Pick up to `count` pivots by prominence (ties: more recent first), keeping
/// at least `min_separation` candles between any two. Returned in index order.
pub fn select_pivots(
    mut candidates: Vec<TrendlinePivot>,
    min_prominence: f64,
    min_separation: usize,
    count: usize,
) -> Vec<TrendlinePivot> {
    candidates.retain(|p| p.prominence >= min_prominence);
    candidates.sort_by(|a, b| {
        b.prominence
            .total_cmp(&a.prominence)
            .then(b.index.cmp(&a.index))
    });

    let mut chosen: Vec<TrendlinePivot> = Vec::with_capacity(count);
    for p in candidates {
        if chosen.len() == count {
            break;
        }
        if chosen.iter().all(|c| c.index.abs_diff(p.index) >= min_separation) {
            chosen.push(p);
        }
    }

    chosen.sort_by_key(|p| p.index);
    chosen
}
