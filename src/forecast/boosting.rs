//! Gradient-boosted regression trees over lag features.
//!
//! The long-range model. Squared-error boosting of shallow regression
//! trees, with a small grid search scored by k-fold MAE on the training
//! split. The test split is the most recent 20% of days.

use crate::forecast::features::{self, LagDataset};
use crate::forecast::metrics::{
    explained_variance, fahrenheit_to_celsius, max_error, mean, mean_absolute_error, round2,
};
use crate::forecast::{ForecastError, ForecastMetrics, ForecastReport, Forecaster, ModelKind};
use crate::model::DailyRecord;

/// Fewest usable days the model will train on.
pub const MIN_ROWS: usize = 10;

/// One day in five is held out for testing.
const TEST_DIVISOR: usize = 5;
const CV_FOLDS: usize = 3;

// ---------------------------------------------------------------------------
// Regression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf(value) => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

/// Best split of `indices` by squared error, if any split improves on
/// keeping them together.
fn best_split(rows: &[Vec<f64>], y: &[f64], indices: &[usize]) -> Option<(usize, f64)> {
    let n = indices.len() as f64;
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let width = rows[indices[0]].len();

    // Minimising SSE is maximising sum_l^2/n_l + sum_r^2/n_r
    let mut best_score = total * total / n;
    let mut best: Option<(usize, f64)> = None;

    let mut order: Vec<usize> = indices.to_vec();
    for feature in 0..width {
        order.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left_sum = 0.0;
        for k in 0..order.len() - 1 {
            left_sum += y[order[k]];
            let here = rows[order[k]][feature];
            let next = rows[order[k + 1]][feature];
            if here == next {
                continue;
            }

            let n_left = (k + 1) as f64;
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left + right_sum * right_sum / (n - n_left);
            if score > best_score + 1e-12 {
                best_score = score;
                best = Some((feature, midpoint(here, next)));
            }
        }
    }

    best
}

/// A threshold with `here <= t < next`, so both sides of the split are
/// non-empty even for huge or adjacent values.
fn midpoint(here: f64, next: f64) -> f64 {
    let mid = here + (next - here) / 2.0;
    if mid.is_finite() && mid < next { mid } else { here }
}

fn build_tree(rows: &[Vec<f64>], y: &[f64], indices: &[usize], depth: usize, max_depth: usize) -> Node {
    let leaf = Node::Leaf(indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64);

    if depth >= max_depth || indices.len() < 2 {
        return leaf;
    }

    match best_split(rows, y, indices) {
        Some((feature, threshold)) => {
            let (left, right): (Vec<usize>, Vec<usize>) =
                indices.iter().copied().partition(|&i| rows[i][feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                return leaf;
            }
            Node::Split {
                feature,
                threshold,
                left: Box::new(build_tree(rows, y, &left, depth + 1, max_depth)),
                right: Box::new(build_tree(rows, y, &right, depth + 1, max_depth)),
            }
        }
        None => leaf,
    }
}

// ---------------------------------------------------------------------------
// Boosted ensemble
// ---------------------------------------------------------------------------

/// Hyperparameters for one boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

/// Grid searched when no explicit parameters are given.
pub fn default_grid() -> Vec<BoostingParams> {
    let mut grid = Vec::new();
    for n_estimators in [100, 200] {
        for learning_rate in [0.01, 0.05, 0.1] {
            for max_depth in [3, 5] {
                grid.push(BoostingParams {
                    n_estimators,
                    learning_rate,
                    max_depth,
                });
            }
        }
    }
    grid
}

#[derive(Debug, Clone)]
pub struct BoostedTrees {
    base: f64,
    learning_rate: f64,
    trees: Vec<Node>,
}

impl BoostedTrees {
    pub fn fit(rows: &[Vec<f64>], y: &[f64], params: &BoostingParams) -> Self {
        let base = mean(y);
        let mut predictions = vec![base; y.len()];
        let indices: Vec<usize> = (0..y.len()).collect();
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let tree = build_tree(rows, &residuals, &indices, 0, params.max_depth);
            for (i, row) in rows.iter().enumerate() {
                predictions[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            base,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.base
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(row))
                .sum::<f64>()
    }
}

/// Mean validation MAE over contiguous folds of the training data.
fn cross_validate(rows: &[Vec<f64>], y: &[f64], params: &BoostingParams, folds: usize) -> f64 {
    let n = y.len();
    let fold_size = n / folds;
    let mut scores = Vec::with_capacity(folds);

    for fold in 0..folds {
        let start = fold * fold_size;
        let end = if fold + 1 == folds { n } else { start + fold_size };

        let train_idx: Vec<usize> = (0..n).filter(|i| *i < start || *i >= end).collect();
        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
        let train_y: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();

        let model = BoostedTrees::fit(&train_rows, &train_y, params);
        let predicted: Vec<f64> = rows[start..end].iter().map(|r| model.predict(r)).collect();
        scores.push(mean_absolute_error(&y[start..end], &predicted));
    }

    mean(&scores)
}

// ---------------------------------------------------------------------------
// Forecaster
// ---------------------------------------------------------------------------

pub struct BoostingForecaster {
    grid: Vec<BoostingParams>,
}

impl Default for BoostingForecaster {
    fn default() -> Self {
        Self { grid: default_grid() }
    }
}

impl BoostingForecaster {
    /// Skips the grid search and trains with `params` directly.
    pub fn with_params(params: BoostingParams) -> Self {
        Self { grid: vec![params] }
    }

    fn select_params(&self, rows: &[Vec<f64>], y: &[f64]) -> BoostingParams {
        if self.grid.len() == 1 || y.len() < CV_FOLDS * 2 {
            return self.grid[0];
        }

        let mut best = self.grid[0];
        let mut best_score = f64::INFINITY;
        for params in &self.grid {
            let score = cross_validate(rows, y, params, CV_FOLDS);
            if score < best_score {
                best_score = score;
                best = *params;
            }
        }
        best
    }
}

impl Forecaster for BoostingForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosting
    }

    fn forecast(&self, days: &[DailyRecord]) -> Result<ForecastReport, ForecastError> {
        if self.grid.is_empty() {
            return Err(ForecastError::FitFailed("empty parameter grid".into()));
        }

        let LagDataset { columns, rows, target } = features::build_lag_dataset(days);
        if target.is_empty() {
            return Err(ForecastError::NoTarget);
        }
        if rows.len() < MIN_ROWS {
            return Err(ForecastError::InsufficientData {
                needed: MIN_ROWS,
                available: rows.len(),
            });
        }
        if columns.is_empty() {
            return Err(ForecastError::FitFailed("no numeric features to lag".into()));
        }

        let scaled = features::standardize(&rows);
        let test_len = rows.len().div_ceil(TEST_DIVISOR);
        let split = rows.len() - test_len;

        let (train_rows, test_rows) = scaled.split_at(split);
        let (train_y, test_y) = target.split_at(split);

        let params = self.select_params(train_rows, train_y);
        let model = BoostedTrees::fit(train_rows, train_y, &params);
        let predicted: Vec<f64> = test_rows.iter().map(|r| model.predict(r)).collect();

        let first = predicted[0];
        Ok(ForecastReport {
            model: ModelKind::GradientBoosting,
            predicted_fahrenheit: round2(first),
            predicted_celsius: round2(fahrenheit_to_celsius(first)),
            predictions_celsius: predicted.iter().map(|p| round2(fahrenheit_to_celsius(*p))).collect(),
            metrics: ForecastMetrics {
                mae: Some(mean_absolute_error(test_y, &predicted)),
                explained_variance: Some(explained_variance(test_y, &predicted)),
                max_error: Some(max_error(test_y, &predicted)),
            },
            notes: vec![format!(
                "n_estimators={}, learning_rate={}, max_depth={}",
                params.n_estimators, params.learning_rate, params.max_depth
            )],
        })
    }
}
