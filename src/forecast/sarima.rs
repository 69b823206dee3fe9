//! Seasonal ARIMA over the daily temperature series.
//!
//! The short-range model: SARIMA(1,1,1)(1,1,1,7), fitted by conditional
//! sum of squares. If an augmented Dickey-Fuller test can't reject a unit
//! root (p > 0.05) the series is differenced once more before fitting,
//! and the forecast is integrated back to temperature levels.
//!
//! Series too short for the weekly terms are fitted as ARIMA(1,1,1).

use crate::forecast::features::temperature_series;
use crate::forecast::metrics::{fahrenheit_to_celsius, mean_absolute_error, round2};
use crate::forecast::{ForecastError, ForecastMetrics, ForecastReport, Forecaster, ModelKind};
use crate::model::DailyRecord;

/// Weekly seasonality.
pub const SEASON: usize = 7;
pub const FORECAST_STEPS: usize = 5;
/// Days held back to score the model.
pub const HOLDOUT: usize = 7;
pub const ADF_SIGNIFICANCE: f64 = 0.05;

/// Fewest points for the non-seasonal fallback.
pub const MIN_POINTS: usize = 5;
/// Fewest points for the weekly terms to be estimated.
pub const MIN_SEASONAL_POINTS: usize = 2 * (SEASON + 1) + 3;

const PARAM_BOUND: f64 = 0.99;

// ---------------------------------------------------------------------------
// Stationarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Augmented Dickey-Fuller test with a constant and one lagged difference.
///
/// Returns `None` when the series is too short (under 6 points) or the
/// regression is degenerate.
pub fn adf_test(series: &[f64]) -> Option<AdfResult> {
    if series.len() < 6 {
        return None;
    }

    // dy_t = a + g*y_{t-1} + d*dy_{t-1}
    let mut xtx = [[0.0; 3]; 3];
    let mut xty = [0.0; 3];
    let mut samples = Vec::with_capacity(series.len() - 2);
    for t in 2..series.len() {
        let x = [1.0, series[t - 1], series[t - 1] - series[t - 2]];
        let y = series[t] - series[t - 1];
        for i in 0..3 {
            xty[i] += x[i] * y;
            for j in 0..3 {
                xtx[i][j] += x[i] * x[j];
            }
        }
        samples.push((x, y));
    }

    let beta = solve3(xtx, xty)?;
    let sse: f64 = samples
        .iter()
        .map(|(x, y)| {
            let fitted: f64 = x.iter().zip(&beta).map(|(a, b)| a * b).sum();
            (y - fitted).powi(2)
        })
        .sum();
    let dof = samples.len() as f64 - 3.0;
    let sigma2 = sse / dof;

    // Var(g) = sigma2 * [(X'X)^-1]_{11}
    let inv_col = solve3(xtx, [0.0, 1.0, 0.0])?;
    let var_g = sigma2 * inv_col[1];
    if var_g.is_nan() || var_g <= 0.0 {
        return None;
    }

    let statistic = beta[1] / var_g.sqrt();
    Some(AdfResult {
        statistic,
        p_value: mackinnon_p(statistic),
    })
}

/// MacKinnon (1994) approximate p-value for the constant-only ADF test.
pub fn mackinnon_p(statistic: f64) -> f64 {
    const TAU_MAX: f64 = 2.74;
    const TAU_MIN: f64 = -18.83;
    const TAU_STAR: f64 = -1.61;
    const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
    const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

    if statistic > TAU_MAX {
        1.0
    } else if statistic < TAU_MIN {
        0.0
    } else if statistic <= TAU_STAR {
        normal_cdf(polynomial(&SMALL_P, statistic))
    } else {
        normal_cdf(polynomial(&LARGE_P, statistic))
    }
}

fn polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Gaussian elimination with partial pivoting on a 3x3 system.
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

pub fn difference(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// AR, MA, seasonal AR and seasonal MA coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SarimaParams {
    pub phi: f64,
    pub theta: f64,
    pub seasonal_phi: f64,
    pub seasonal_theta: f64,
}

impl SarimaParams {
    /// Expanded lag polynomials as `(lag, coefficient)` pairs:
    /// AR side of `(1 - phi B)(1 - Phi B^s)` and MA side of
    /// `(1 + theta B)(1 + Theta B^s)`, moved to the right-hand side.
    fn lag_terms(&self, seasonal: bool) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
        if seasonal {
            (
                vec![
                    (1, self.phi),
                    (SEASON, self.seasonal_phi),
                    (SEASON + 1, -self.phi * self.seasonal_phi),
                ],
                vec![
                    (1, self.theta),
                    (SEASON, self.seasonal_theta),
                    (SEASON + 1, self.theta * self.seasonal_theta),
                ],
            )
        } else {
            (vec![(1, self.phi)], vec![(1, self.theta)])
        }
    }
}

/// A fitted model: parameters plus which differencing it applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SarimaFit {
    pub params: SarimaParams,
    pub seasonal: bool,
    pub css: f64,
}

/// `(1 - B)` or `(1 - B)(1 - B^s)` applied to `series`.
fn model_difference(series: &[f64], seasonal: bool) -> Vec<f64> {
    let once = difference(series);
    if !seasonal {
        return once;
    }
    once.iter()
        .skip(SEASON)
        .zip(once.iter())
        .map(|(now, season_ago)| now - season_ago)
        .collect()
}

/// One-step residuals of the differenced series, zero pre-sample.
fn residuals(w: &[f64], params: &SarimaParams, seasonal: bool) -> Vec<f64> {
    let (ar, ma) = params.lag_terms(seasonal);
    let mut e = vec![0.0; w.len()];
    for t in 0..w.len() {
        let mut value = w[t];
        for &(lag, coef) in &ar {
            if lag <= t {
                value -= coef * w[t - lag];
            }
        }
        for &(lag, coef) in &ma {
            if lag <= t {
                value -= coef * e[t - lag];
            }
        }
        e[t] = value;
    }
    e
}

fn max_lag(seasonal: bool) -> usize {
    if seasonal { SEASON + 1 } else { 1 }
}

fn conditional_sum_of_squares(w: &[f64], params: &SarimaParams, seasonal: bool) -> f64 {
    residuals(w, params, seasonal)
        .iter()
        .skip(max_lag(seasonal))
        .map(|e| e * e)
        .sum()
}

fn bounded(u: f64) -> f64 {
    PARAM_BOUND * u.tanh()
}

fn params_from(u: &[f64]) -> SarimaParams {
    SarimaParams {
        phi: bounded(u[0]),
        theta: bounded(u[1]),
        seasonal_phi: u.get(2).copied().map(bounded).unwrap_or(0.0),
        seasonal_theta: u.get(3).copied().map(bounded).unwrap_or(0.0),
    }
}

/// Fits the model to `series` (levels, not differenced).
pub fn fit(series: &[f64], seasonal: bool) -> Result<SarimaFit, ForecastError> {
    let needed = if seasonal { MIN_SEASONAL_POINTS } else { MIN_POINTS };
    if series.len() < needed {
        return Err(ForecastError::InsufficientData {
            needed,
            available: series.len(),
        });
    }

    let w = model_difference(series, seasonal);
    let dims = if seasonal { 4 } else { 2 };
    let objective = |u: &[f64]| conditional_sum_of_squares(&w, &params_from(u), seasonal);

    let best = nelder_mead(&objective, &[0.0; 4][..dims], 0.5, 400, 1e-10);
    let params = params_from(&best);
    let css = conditional_sum_of_squares(&w, &params, seasonal);

    if !css.is_finite() {
        return Err(ForecastError::FitFailed("conditional sum of squares diverged".into()));
    }

    Ok(SarimaFit { params, seasonal, css })
}

/// Forecasts `steps` levels past the end of `series` with a fitted model.
pub fn forecast_levels(series: &[f64], fit: &SarimaFit, steps: usize) -> Vec<f64> {
    let (ar, ma) = fit.params.lag_terms(fit.seasonal);
    let mut w = model_difference(series, fit.seasonal);
    let mut e = residuals(&w, &fit.params, fit.seasonal);
    let mut z = series.to_vec();

    for _ in 0..steps {
        let t = w.len();
        let mut next = 0.0;
        for &(lag, coef) in &ar {
            if lag <= t {
                next += coef * w[t - lag];
            }
        }
        for &(lag, coef) in &ma {
            if lag <= t {
                next += coef * e[t - lag];
            }
        }
        w.push(next);
        e.push(0.0);

        // undo the differencing
        let n = z.len();
        let level = if fit.seasonal {
            next + z[n - 1] + z[n - SEASON] - z[n - SEASON - 1]
        } else {
            next + z[n - 1]
        };
        z.push(level);
    }

    z.split_off(series.len())
}

/// Minimises `f` with the Nelder-Mead simplex method.
fn nelder_mead<F>(f: &F, start: &[f64], step: f64, max_iter: usize, tolerance: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((start.to_vec(), f(start)));
    for i in 0..n {
        let mut point = start.to_vec();
        point[i] += step;
        let value = f(&point);
        simplex.push((point, value));
    }

    for _ in 0..max_iter {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[n].1;
        if (worst - best).abs() <= tolerance {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|(p, _)| p[j]).sum::<f64>() / n as f64)
            .collect();
        let towards = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n].0)
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let reflected = towards(1.0);
        let reflected_value = f(&reflected);

        if reflected_value < best {
            let expanded = towards(2.0);
            let expanded_value = f(&expanded);
            simplex[n] = if expanded_value < reflected_value {
                (expanded, expanded_value)
            } else {
                (reflected, reflected_value)
            };
        } else if reflected_value < simplex[n - 1].1 {
            simplex[n] = (reflected, reflected_value);
        } else {
            let contracted = towards(-0.5);
            let contracted_value = f(&contracted);
            if contracted_value < worst {
                simplex[n] = (contracted, contracted_value);
            } else {
                let anchor = simplex[0].0.clone();
                for (point, value) in simplex.iter_mut().skip(1) {
                    for (p, a) in point.iter_mut().zip(&anchor) {
                        *p = a + 0.5 * (*p - a);
                    }
                    *value = f(point);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    simplex.swap_remove(0).0
}

// ---------------------------------------------------------------------------
// Forecaster
// ---------------------------------------------------------------------------

/// A forecast of temperature levels and how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelForecast {
    pub levels: Vec<f64>,
    pub adf: Option<AdfResult>,
    pub differenced: bool,
    pub fit: SarimaFit,
}

/// Runs the whole procedure (stationarity check, optional differencing,
/// fit, forecast, integration) on a temperature series.
pub fn fit_and_forecast(series: &[f64], steps: usize) -> Result<LevelForecast, ForecastError> {
    let adf = adf_test(series);
    let differenced = adf.map(|a| a.p_value > ADF_SIGNIFICANCE).unwrap_or(false);

    let model_series = if differenced { difference(series) } else { series.to_vec() };
    let seasonal = model_series.len() >= MIN_SEASONAL_POINTS;
    let fit = fit(&model_series, seasonal)?;

    let mut levels = forecast_levels(&model_series, &fit, steps);
    if differenced {
        let mut level = series[series.len() - 1];
        for value in levels.iter_mut() {
            level += *value;
            *value = level;
        }
    }

    Ok(LevelForecast {
        levels,
        adf,
        differenced,
        fit,
    })
}

#[derive(Debug, Default)]
pub struct SarimaForecaster;

impl Forecaster for SarimaForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::SeasonalArima
    }

    fn forecast(&self, days: &[DailyRecord]) -> Result<ForecastReport, ForecastError> {
        let series = temperature_series(days);
        if series.is_empty() {
            return Err(ForecastError::NoTarget);
        }

        let result = fit_and_forecast(&series, FORECAST_STEPS)?;
        let first = result.levels[0];

        let mut notes = Vec::new();
        match result.adf {
            Some(adf) => notes.push(format!(
                "ADF statistic {:.4}, p-value {:.4}",
                adf.statistic, adf.p_value
            )),
            None => notes.push("ADF test skipped: series too short or degenerate".to_string()),
        }
        notes.push(if result.differenced {
            "Data was non-stationary, differencing applied".to_string()
        } else {
            "Data is already stationary".to_string()
        });
        if !result.fit.seasonal {
            notes.push("Series too short for weekly terms, fitted ARIMA(1,1,1)".to_string());
        }

        // Score against the last week when there is enough left to train on
        let mut mae = None;
        if series.len() > HOLDOUT {
            let (train, test) = series.split_at(series.len() - HOLDOUT);
            match fit_and_forecast(train, HOLDOUT) {
                Ok(holdout) => mae = Some(mean_absolute_error(test, &holdout.levels)),
                Err(e) => notes.push(format!("Holdout evaluation skipped: {}", e)),
            }
        }

        Ok(ForecastReport {
            model: ModelKind::SeasonalArima,
            predicted_fahrenheit: round2(first),
            predicted_celsius: round2(fahrenheit_to_celsius(first)),
            predictions_celsius: result
                .levels
                .iter()
                .map(|f| round2(fahrenheit_to_celsius(*f)))
                .collect(),
            metrics: ForecastMetrics {
                mae,
                explained_variance: None,
                max_error: None,
            },
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherAttributes;
    use chrono::{Duration, NaiveDate};

    /// Deterministic noise in [-1, 1).
    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    fn weekly(t: usize) -> f64 {
        60.0 + 10.0 * (2.0 * std::f64::consts::PI * t as f64 / SEASON as f64).sin()
    }

    fn days_from(series: &[f64]) -> Vec<DailyRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        series
            .iter()
            .enumerate()
            .map(|(i, t)| DailyRecord {
                city: "Paris".into(),
                datetime: (start + Duration::days(i as i64)).format("%Y-%m-%d").to_string(),
                attributes: WeatherAttributes {
                    temp: Some(*t),
                    ..Default::default()
                },
            })
            .collect()
    }

    #[test]
    fn test_mackinnon_p_matches_critical_values() {
        // 5% critical value for the constant-only case is about -2.86
        assert!((mackinnon_p(-2.86) - 0.05).abs() < 0.01);
        assert!(mackinnon_p(-5.0) < 0.001);
        assert!(mackinnon_p(0.0) > 0.9);
        assert_eq!(mackinnon_p(3.0), 1.0);
        assert_eq!(mackinnon_p(-20.0), 0.0);
    }

    #[test]
    fn test_adf_rejects_unit_root_for_mean_reverting_series() {
        let e = noise(200, 7);
        let mut y = vec![0.0; 200];
        for t in 1..200 {
            y[t] = 0.1 * y[t - 1] + e[t];
        }
        let adf = adf_test(&y).unwrap();
        assert!(adf.statistic < -3.0);
        assert!(adf.p_value < ADF_SIGNIFICANCE);
    }

    #[test]
    fn test_adf_needs_six_points() {
        assert!(adf_test(&[1.0, 2.0, 1.5, 3.0, 2.0]).is_none());
    }

    #[test]
    fn test_solve3() {
        let x = solve3([[2.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 4.0, 0.0]], [2.0, 3.0, 8.0]).unwrap();
        assert_eq!(x, [1.0, 2.0, 3.0]);
        assert!(solve3([[0.0; 3]; 3], [1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_nelder_mead_finds_quadratic_minimum() {
        let f = |p: &[f64]| (p[0] - 1.0).powi(2) + (p[1] + 2.0).powi(2);
        let best = nelder_mead(&f, &[0.0, 0.0], 0.5, 500, 1e-14);
        assert!((best[0] - 1.0).abs() < 1e-3);
        assert!((best[1] + 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_periodic_series_is_continued() {
        let series: Vec<f64> = (0..56).map(weekly).collect();
        let result = fit_and_forecast(&series, 5).unwrap();
        assert!(result.fit.seasonal);
        for (h, value) in result.levels.iter().enumerate() {
            assert!((value - weekly(56 + h)).abs() < 1e-6, "step {} was {}", h, value);
        }
    }

    #[test]
    fn test_noisy_weekly_series_stays_near_pattern() {
        let e = noise(70, 42);
        let series: Vec<f64> = (0..70).map(|t| weekly(t) + 0.5 * e[t]).collect();
        let report = SarimaForecaster.forecast(&days_from(&series)).unwrap();

        assert_eq!(report.model, ModelKind::SeasonalArima);
        assert_eq!(report.predictions_celsius.len(), FORECAST_STEPS);
        assert!((report.predicted_fahrenheit - weekly(70)).abs() < 3.0);
        assert!(report.metrics.mae.unwrap() < 3.0);
    }

    #[test]
    fn test_short_series_falls_back_to_non_seasonal() {
        let series = vec![55.0, 57.0, 56.0, 58.0, 60.0, 59.0, 61.0, 62.0];
        let report = SarimaForecaster.forecast(&days_from(&series)).unwrap();
        assert!(report.notes.iter().any(|n| n.contains("ARIMA(1,1,1)")));
        assert!(report.predicted_fahrenheit.is_finite());
        // one training point left after the holdout: nothing to score
        assert!(report.metrics.mae.is_none());
    }

    #[test]
    fn test_too_short_series_is_rejected() {
        let err = SarimaForecaster.forecast(&days_from(&[50.0, 51.0, 52.0])).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { .. }));
        assert!(matches!(SarimaForecaster.forecast(&[]), Err(ForecastError::NoTarget)));
    }
}
