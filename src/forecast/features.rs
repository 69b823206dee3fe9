//! Turning stored daily records into model inputs.

use chrono::Datelike;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::DailyRecord;

/// Column the models predict.
pub const TARGET: &str = "temp";

/// Lags generated for every feature.
pub const LAGS: [usize; 3] = [1, 2, 3];

/// Columns too close to the target to be used as predictors.
pub const EXCLUDED_FEATURES: [&str; 5] = ["tempmax", "tempmin", "feelslikemax", "feelslikemin", "feelslike"];

/// Lagged feature matrix with its target column.
#[derive(Debug, Clone, PartialEq)]
pub struct LagDataset {
    /// `"{feature}_lag{n}"`, in column order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl LagDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Records sorted by date; unparseable dates are dropped.
fn sorted_days(days: &[DailyRecord]) -> Vec<(chrono::NaiveDate, &DailyRecord)> {
    let mut dated: Vec<_> = days
        .iter()
        .filter_map(|d| d.date().ok().map(|date| (date, d)))
        .collect();
    dated.sort_by_key(|(date, _)| *date);
    dated
}

/// Target values in date order, skipping days without one.
pub fn temperature_series(days: &[DailyRecord]) -> Vec<f64> {
    sorted_days(days)
        .into_iter()
        .filter_map(|(_, d)| d.attributes.temp)
        .collect()
}

/// Per-day numeric values: the record's numeric attributes plus calendar
/// features (`month`, `day_of_year`, `day_of_week`).
fn numeric_table(days: &[DailyRecord]) -> Vec<BTreeMap<String, f64>> {
    sorted_days(days)
        .into_iter()
        .map(|(date, day)| {
            let mut values: BTreeMap<String, f64> = day.attributes.numeric_fields().into_iter().collect();
            values.insert("month".into(), date.month() as f64);
            values.insert("day_of_year".into(), date.ordinal() as f64);
            values.insert("day_of_week".into(), date.weekday().num_days_from_monday() as f64);
            values
        })
        .collect()
}

/// Builds lags 1–3 of every numeric feature except the target and the
/// excluded columns. Lags reaching before the first day, and features a
/// day doesn't report, are 0. Days without a target value are dropped
/// after the lags are computed.
pub fn build_lag_dataset(days: &[DailyRecord]) -> LagDataset {
    let table = numeric_table(days);

    let features: Vec<String> = table
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .filter(|name| name != TARGET && !EXCLUDED_FEATURES.contains(&name.as_str()))
        .collect();

    let columns: Vec<String> = features
        .iter()
        .flat_map(|f| LAGS.iter().map(move |lag| format!("{}_lag{}", f, lag)))
        .collect();

    let mut rows = Vec::new();
    let mut target = Vec::new();

    for (i, current) in table.iter().enumerate() {
        let Some(y) = current.get(TARGET).copied() else {
            continue;
        };

        let row: Vec<f64> = features
            .iter()
            .flat_map(|f| {
                let table = &table;
                LAGS.iter().map(move |lag| {
                    if *lag > i {
                        0.0
                    } else {
                        table[i - lag].get(f).copied().unwrap_or(0.0)
                    }
                })
            })
            .collect();

        rows.push(row);
        target.push(y);
    }

    LagDataset { columns, rows, target }
}

/// Column-wise standard scaling. Constant columns become all zeros.
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(width) = rows.first().map(Vec::len) else {
        return Vec::new();
    };
    let n = rows.len() as f64;

    let mut means = vec![0.0; width];
    for row in rows {
        for (j, v) in row.iter().enumerate() {
            means[j] += v / n;
        }
    }

    let mut stds = vec![0.0; width];
    for row in rows {
        for (j, v) in row.iter().enumerate() {
            stds[j] += (v - means[j]).powi(2) / n;
        }
    }
    for s in stds.iter_mut() {
        *s = s.sqrt();
    }

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, v)| if stds[j] > 0.0 { (v - means[j]) / stds[j] } else { 0.0 })
                .collect()
        })
        .collect()
}
