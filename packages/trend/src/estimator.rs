//! Slope estimators over `(year, value)` points.

use prelev_models::{SlopeMethod, TheilSenStrategy};

/// Estimates the slope of value over year.
///
/// Points carry no `NaN` values. Implementations return `None` when fewer
/// than two usable points exist or the slope is undefined.
pub trait SlopeEstimator: Send + Sync {
    /// Slope in value units per year.
    fn slope(&self, points: &[(i32, f64)]) -> Option<f64>;
}

/// Ordinary least squares.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ols;

impl SlopeEstimator for Ols {
    fn slope(&self, points: &[(i32, f64)]) -> Option<f64> {
        if points.len() < 2 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        let x_mean = points.iter().map(|(x, _)| f64::from(*x)).sum::<f64>() / n;
        let y_mean = points.iter().map(|(_, y)| *y).sum::<f64>() / n;

        let (num, den) = points.iter().fold((0.0, 0.0), |(num, den), (x, y)| {
            let dx = f64::from(*x) - x_mean;
            (dx.mul_add(y - y_mean, num), dx.mul_add(dx, den))
        });

        if den == 0.0 {
            return None;
        }
        Some(num / den)
    }
}

/// Median of all pairwise slopes, with the selected median strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TheilSen {
    /// How the median is located.
    pub strategy: TheilSenStrategy,
}

impl TheilSen {
    /// Creates an estimator with the given strategy.
    #[must_use]
    pub const fn new(strategy: TheilSenStrategy) -> Self {
        Self { strategy }
    }
}

impl SlopeEstimator for TheilSen {
    fn slope(&self, points: &[(i32, f64)]) -> Option<f64> {
        if points.len() < 2 {
            return None;
        }
        let slopes = pairwise_slopes(points);
        match self.strategy {
            TheilSenStrategy::Pairwise => median_sorted(slopes),
            TheilSenStrategy::Selection => median_select(slopes),
        }
    }
}

/// Slopes between every pair of points with distinct years.
fn pairwise_slopes(points: &[(i32, f64)]) -> Vec<f64> {
    let mut slopes = Vec::with_capacity(points.len() * (points.len() - 1) / 2);
    for (i, (xi, yi)) in points.iter().enumerate() {
        for (xj, yj) in &points[i + 1..] {
            if xi != xj {
                slopes.push((yj - yi) / (f64::from(*xj) - f64::from(*xi)));
            }
        }
    }
    slopes
}

/// Median by full sort. Even counts average the two middle values.
fn median_sorted(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Median by selection, same result as [`median_sorted`] in linear time.
fn median_select(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let len = values.len();
    let mid = len / 2;
    let (lower, upper_mid, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper_mid = *upper_mid;
    if len % 2 == 1 {
        return Some(upper_mid);
    }
    let lower_mid = lower
        .iter()
        .copied()
        .max_by(f64::total_cmp)
        .unwrap_or(upper_mid);
    Some((lower_mid + upper_mid) / 2.0)
}

/// Returns the estimator configured by `method` and `strategy`.
#[must_use]
pub fn estimator_for(
    method: SlopeMethod,
    strategy: TheilSenStrategy,
) -> Box<dyn SlopeEstimator> {
    match method {
        SlopeMethod::Ols => Box::new(Ols),
        SlopeMethod::TheilSen => Box::new(TheilSen::new(strategy)),
    }
}
