//! Descriptive-statistics primitives shared by the transformer and analyzer.
//! All moments are population moments; degenerate inputs (under two samples,
//! zero variance) report 0.0 rather than NaN so reports stay serializable.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance; 0.0 with fewer than 2 samples.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 with fewer than 2 samples.
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Quantile with linear interpolation between adjacent order statistics,
/// matching the interpolation used when the quartile fences were tuned.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Population skewness (third standardized moment); 0.0 when the variance
/// is zero or there are fewer than 2 samples.
pub fn skewness(values: &[f64]) -> f64 {
    let var = variance(values);
    if var == 0.0 {
        return 0.0;
    }
    let m = mean(values);
    let n = values.len() as f64;
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    m3 / var.powf(1.5)
}

/// Excess kurtosis (fourth standardized moment minus 3); 0.0 when the
/// variance is zero or there are fewer than 2 samples.
pub fn kurtosis(values: &[f64]) -> f64 {
    let var = variance(values);
    if var == 0.0 {
        return 0.0;
    }
    let m = mean(values);
    let n = values.len() as f64;
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
    m4 / (var * var) - 3.0
}

/// Pearson correlation over paired samples. `None` when fewer than two
/// pairs or when either side is constant, so undefined correlations can be
/// omitted instead of reported as zero.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs);
    let my = mean(ys);
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        var_x += (x - mx).powi(2);
        var_y += (y - my).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Round half away from zero to two decimals, the precision used in
/// reports.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_median_of_simple_series() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&values), 2.5);
        assert_eq!(median(&values), 2.5);
    }

    #[test]
    fn variance_is_zero_under_two_samples() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[42.0]), 0.0);
        assert_eq!(std_dev(&[42.0]), 0.0);
    }

    #[test]
    fn population_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.25), 1.75);
        assert_eq!(quantile(&values, 0.75), 3.25);
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
    }

    #[test]
    fn skewness_of_symmetric_series_is_zero() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(skewness(&values).abs() < 1e-12);
    }

    #[test]
    fn skewness_and_kurtosis_of_constant_series_are_zero() {
        let values = [3.0, 3.0, 3.0];
        assert_eq!(skewness(&values), 0.0);
        assert_eq!(kurtosis(&values), 0.0);
    }

    #[test]
    fn pearson_of_perfectly_correlated_series() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [10.0, 20.0, 30.0];
        let r = pearson(&xs, &ys).unwrap();
        assert!((r - 1.0).abs() < 1e-12);

        let inverted = [30.0, 20.0, 10.0];
        let r = pearson(&xs, &inverted).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_of_constant_series_is_undefined() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [5.0, 5.0, 5.0];
        assert!(pearson(&xs, &ys).is_none());
    }

    #[test]
    fn round2_rounds_to_two_decimals() {
        assert_eq!(round2(90.004), 90.0);
        assert_eq!(round2(89.995), 90.0);
    }
}
