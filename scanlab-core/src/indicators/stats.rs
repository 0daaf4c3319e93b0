//! Small numeric helpers shared by the feature layer.

/// Arithmetic mean of the finite values, or None when there are none.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Population standard deviation of the finite values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let var = finite.iter().map(|v| (v - m).powi(2)).sum::<f64>() / finite.len() as f64;
    Some(var.sqrt())
}

/// Z-score of the last value against the whole window (last included).
/// None for fewer than two points or zero dispersion.
pub fn zscore_last(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let last = *values.last()?;
    if !last.is_finite() {
        return None;
    }
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if sd <= f64::EPSILON {
        return None;
    }
    Some((last - m) / sd)
}

/// Least-squares slope of `values` against their index.
pub fn linreg_slope(values: &[f64]) -> Option<f64> {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as f64, v))
        .collect();
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    Some(sxy / sxx)
}

/// Relative change from `from` to `to`. None when `from` is zero or non-finite.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || !from.is_finite() || !to.is_finite() {
        return None;
    }
    Some((to - from) / from.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn mean_ignores_nan() {
        assert_approx(mean(&[1.0, f64::NAN, 3.0]).unwrap(), 2.0, DEFAULT_EPSILON);
        assert!(mean(&[f64::NAN]).is_none());
    }

    #[test]
    fn zscore_of_outlier() {
        let z = zscore_last(&[1.0, 1.0, 1.0, 5.0]).unwrap();
        // mean 2, std sqrt(3)
        assert_approx(z, 3.0 / 3f64.sqrt(), 1e-12);
    }

    #[test]
    fn zscore_flat_is_none() {
        assert!(zscore_last(&[2.0, 2.0, 2.0]).is_none());
    }

    #[test]
    fn slope_of_line() {
        assert_approx(linreg_slope(&[1.0, 3.0, 5.0, 7.0]).unwrap(), 2.0, DEFAULT_EPSILON);
        assert!(linreg_slope(&[1.0]).is_none());
    }

    #[test]
    fn pct_change_guards_zero() {
        assert_approx(pct_change(100.0, 110.0).unwrap(), 0.1, DEFAULT_EPSILON);
        assert!(pct_change(0.0, 1.0).is_none());
    }
}
