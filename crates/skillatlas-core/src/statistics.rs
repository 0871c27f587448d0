//! Small numeric helpers shared by the estimators.

/// Scaling constant that makes the logistic curve track the standard normal
/// CDF to within 0.01 everywhere.
pub const LOGISTIC_NORMAL_SCALE: f64 = 1.702;

/// Approximate standard normal CDF.
///
/// Strictly increasing, exactly 0.5 at 0.
pub fn normal_cdf(x: f64) -> f64 {
    1.0 / (1.0 + (-LOGISTIC_NORMAL_SCALE * x).exp())
}

/// Population percentile (0-100) of an ability on the theta scale.
pub fn theta_percentile(theta: f64) -> f64 {
    (normal_cdf(theta) * 100.0).clamp(0.0, 100.0)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Weighted mean of `(value, weight)` pairs. Returns `None` when the total
/// weight is not positive.
pub fn weighted_mean<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, total) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            (sum + value * weight, total + weight)
        });
    if total > 0.0 {
        Some(sum / total)
    } else {
        None
    }
}

/// Mean of the values, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
