//! Normalized trend indicators derived from a slope and its series.

use prelev_aggregate::TimeSeries;
use prelev_models::SlopeResult;

use crate::estimator::SlopeEstimator;

/// Number of chronological values averaged for the first and last period.
pub const PERIOD_LEN: usize = 3;

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    Some(values.sum::<f64>() / n as f64)
}

/// `100 × numerator / denominator`, absent when the denominator is zero
/// or not finite.
fn percent_of(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(100.0 * numerator / denominator)
}

/// Compound annual growth between two period means over `span` years.
fn compound_growth_pct(first: f64, last: f64, span: i32) -> Option<f64> {
    if span <= 0 || first <= 0.0 {
        return None;
    }
    let growth = (last / first).powf(1.0 / f64::from(span));
    let pct = 100.0 * (growth - 1.0);
    pct.is_finite().then_some(pct)
}

/// Computes every indicator of one series except the z-score.
///
/// The slope is estimated only when the series has at least `min_years`
/// valid years. Means and CAGR do not depend on that gate.
#[must_use]
pub fn compute_slope_result(
    series: &TimeSeries,
    estimator: &dyn SlopeEstimator,
    min_years: usize,
) -> SlopeResult {
    let points = series.valid_points();
    let n_years = points.len();
    let (Some((first_year, _)), Some((last_year, _))) = (points.first(), points.last()) else {
        return SlopeResult::empty();
    };

    let slope = if n_years >= min_years {
        estimator.slope(&points)
    } else {
        None
    };

    let mean_value = mean(points.iter().map(|(_, v)| *v));
    let head = n_years.min(PERIOD_LEN);
    let first_period_mean = mean(points[..head].iter().map(|(_, v)| *v));
    let last_period_mean = mean(points[n_years - head..].iter().map(|(_, v)| *v));

    let slope_pct_of_mean = slope.zip(mean_value).and_then(|(s, m)| percent_of(s, m));
    let slope_pct_of_first = slope
        .zip(first_period_mean)
        .and_then(|(s, f)| percent_of(s, f));
    let cagr_pct = first_period_mean
        .zip(last_period_mean)
        .and_then(|(first, last)| compound_growth_pct(first, last, last_year - first_year));

    SlopeResult {
        slope,
        n_years,
        mean_value,
        first_period_mean,
        last_period_mean,
        slope_pct_of_mean,
        slope_pct_of_first,
        cagr_pct,
        slope_z: None,
    }
}

/// Fills `slope_z` for every result from the population of
/// `slope_pct_of_mean` values.
///
/// Uses the sample standard deviation. With fewer than two values or no
/// spread, every z-score is cleared.
pub fn apply_z_scores<'a>(results: impl IntoIterator<Item = &'a mut SlopeResult>) {
    let mut results: Vec<&mut SlopeResult> = results.into_iter().collect();
    let values: Vec<f64> = results.iter().filter_map(|r| r.slope_pct_of_mean).collect();

    let stats = if values.len() >= 2 {
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mu = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (n - 1.0);
        let sd = var.sqrt();
        (sd != 0.0 && sd.is_finite()).then_some((mu, sd))
    } else {
        None
    };

    if stats.is_none() {
        log::debug!("z-scores skipped: {} contributing values", values.len());
    }

    for result in &mut results {
        result.slope_z = stats
            .zip(result.slope_pct_of_mean)
            .map(|((mu, sd), pct)| (pct - mu) / sd);
    }
}
