//! Evaluation metrics and unit conversion shared by both models.

/// Mean of `|y_true - y_pred|`. Returns 0.0 for empty input.
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n as f64
}

/// `1 - Var(y_true - y_pred) / Var(y_true)`.
///
/// A constant `y_true` gives 1.0 for a perfect fit and 0.0 otherwise.
pub fn explained_variance(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return 0.0;
    }
    let residuals: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| t - p).collect();
    let var_true = variance(&y_true[..n]);
    let var_res = variance(&residuals);

    if var_true == 0.0 {
        if var_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - var_res / var_true
    }
}

/// Largest absolute residual.
pub fn max_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .fold(0.0, f64::max)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
