#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Trend analytics over yearly withdrawal volumes.
//!
//! Entity trends estimate one slope per withdrawal point. Zone trends
//! assign each point to every zone its most recent geometry intersects
//! and estimate one slope per zone from the summed series. Both compute
//! normalized indicators and a z-score across the whole run.

pub mod estimator;
pub mod metrics;

use std::collections::BTreeMap;

use geo::{Geometry, MultiPolygon};
use prelev_aggregate::{
    AggregateError, AggregateOptions, AggregationStats, EntityProfile, aggregate,
    assign_series_to_zones,
};
use prelev_models::progress::{Cancelled, RunContext};
use prelev_models::{DEFAULT_MIN_YEARS, Record, SlopeMethod, SlopeResult, TheilSenStrategy, YearRange};
use prelev_spatial::ZoneIndex;

pub use estimator::{Ols, SlopeEstimator, TheilSen, estimator_for};
pub use metrics::{apply_z_scores, compute_slope_result};

/// Errors that can occur during trend computation.
#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    /// Aggregation of the input records failed.
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Records were kept but none of them fell inside any zone.
    #[error("No zone×year aggregate was produced ({unassigned} entities matched no zone)")]
    NoZoneAggregates {
        /// Entities without geometry or outside every zone.
        unassigned: usize,
    },

    /// The minimum-years threshold must be at least 1.
    #[error("Invalid minimum number of years: {0}")]
    InvalidMinYears(usize),

    /// The run was cancelled before completion.
    #[error("Trend computation interrupted: {0}")]
    Cancelled(#[from] Cancelled),
}

/// Options shared by the trend pipelines.
#[derive(Debug, Clone, Copy)]
pub struct TrendOptions {
    /// Slope estimator.
    pub method: SlopeMethod,
    /// Median strategy when `method` is Theil–Sen.
    pub theil_sen: TheilSenStrategy,
    /// Minimum number of valid years before a slope is estimated.
    pub min_years: usize,
    /// Inclusive year filter.
    pub year_range: Option<YearRange>,
    /// Whether the observation layer carries geometry. A study area is
    /// ignored when it does not.
    pub layer_has_geometry: bool,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            method: SlopeMethod::default(),
            theil_sen: TheilSenStrategy::default(),
            min_years: DEFAULT_MIN_YEARS,
            year_range: None,
            layer_has_geometry: true,
        }
    }
}

impl TrendOptions {
    fn validate(&self) -> Result<(), TrendError> {
        if self.min_years == 0 {
            return Err(TrendError::InvalidMinYears(self.min_years));
        }
        Ok(())
    }

    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            year_range: self.year_range,
            layer_has_geometry: self.layer_has_geometry,
        }
    }
}

/// Trend indicators of one entity.
#[derive(Debug, Clone)]
pub struct EntityTrend {
    /// Entity identifier.
    pub entity_id: String,
    /// Display name from the most recent year.
    pub name: Option<String>,
    /// Contact label from the most recent year.
    pub contact: Option<String>,
    /// Sorted, semicolon-joined category labels.
    pub categories: Option<String>,
    /// First non-empty geometry observed.
    pub geometry: Option<Geometry<f64>>,
    /// Slope and normalized indicators.
    pub metrics: SlopeResult,
}

/// Output of [`entity_trends`].
#[derive(Debug, Clone)]
pub struct EntityTrendReport {
    /// One row per entity, sorted by id.
    pub rows: Vec<EntityTrend>,
    /// Record counters from the aggregation pass.
    pub stats: AggregationStats,
}

/// Computes per-entity trends.
///
/// # Errors
///
/// * [`TrendError::InvalidMinYears`] if `options.min_years` is zero
/// * [`TrendError::Aggregate`] if no record survives the filters
/// * [`TrendError::Cancelled`] if the run context was cancelled
pub fn entity_trends(
    records: &[Record],
    study_area: Option<&ZoneIndex>,
    options: &TrendOptions,
    ctx: &RunContext,
) -> Result<EntityTrendReport, TrendError> {
    options.validate()?;
    let aggregation = aggregate(records, study_area, &options.aggregate_options(), ctx)?;
    let estimator = estimator_for(options.method, options.theil_sen);
    let series = aggregation.series();

    ctx.begin("Estimating entity slopes", series.len());

    let mut rows = Vec::with_capacity(series.len());
    for (entity_id, series) in series {
        ctx.step()?;
        let profile = aggregation.profile(&entity_id);
        let metrics = compute_slope_result(&series, estimator.as_ref(), options.min_years);
        rows.push(EntityTrend {
            name: profile.and_then(EntityProfile::name).map(str::to_string),
            contact: profile.and_then(EntityProfile::contact).map(str::to_string),
            categories: profile.and_then(EntityProfile::categories_concat),
            geometry: profile.and_then(EntityProfile::first_location).cloned(),
            entity_id,
            metrics,
        });
    }

    apply_z_scores(rows.iter_mut().map(|row| &mut row.metrics));

    let with_slope = rows.iter().filter(|r| r.metrics.slope.is_some()).count();
    log::info!(
        "Entity trends ({}): {} entities, {} with a slope (min {} years)",
        options.method,
        rows.len(),
        with_slope,
        options.min_years
    );

    Ok(EntityTrendReport {
        rows,
        stats: *aggregation.stats(),
    })
}

/// Trend indicators of one zone.
#[derive(Debug, Clone)]
pub struct ZoneTrend {
    /// Zone label.
    pub label: String,
    /// Zone polygon.
    pub geometry: MultiPolygon<f64>,
    /// Entities assigned to the zone.
    pub entity_count: usize,
    /// Slope and normalized indicators; empty when the zone has no data.
    pub metrics: SlopeResult,
}

/// One cell of the zone × year diagnostic table.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneYearRow {
    /// Zone label.
    pub label: String,
    /// Year.
    pub year: i32,
    /// Summed volume of the assigned entities.
    pub sum: f64,
    /// Number of valid values behind the sum.
    pub valid: usize,
}

/// Output of [`zone_trends`].
#[derive(Debug, Clone)]
pub struct ZoneTrendReport {
    /// One row per input zone, in input order.
    pub rows: Vec<ZoneTrend>,
    /// Every zone × year cell, sorted by label then year.
    pub zone_years: Vec<ZoneYearRow>,
    /// Entities without geometry or outside every zone.
    pub unassigned: usize,
    /// Record counters from the aggregation pass.
    pub stats: AggregationStats,
}

/// Computes per-zone trends by multi-assigning entity series to zones.
///
/// # Errors
///
/// * [`TrendError::InvalidMinYears`] if `options.min_years` is zero
/// * [`TrendError::Aggregate`] if no record survives the filters
/// * [`TrendError::NoZoneAggregates`] if no entity falls inside any zone
/// * [`TrendError::Cancelled`] if the run context was cancelled
pub fn zone_trends(
    records: &[Record],
    zones: &ZoneIndex,
    options: &TrendOptions,
    ctx: &RunContext,
) -> Result<ZoneTrendReport, TrendError> {
    options.validate()?;
    let aggregation = aggregate(records, None, &options.aggregate_options(), ctx)?;
    let table = assign_series_to_zones(&aggregation, zones, ctx)?;

    if table.sums.is_empty() {
        return Err(TrendError::NoZoneAggregates {
            unassigned: table.unassigned,
        });
    }

    let estimator = estimator_for(options.method, options.theil_sen);
    let mut by_label: BTreeMap<&str, SlopeResult> = BTreeMap::new();

    ctx.begin("Estimating zone slopes", zones.len());

    let mut rows = Vec::with_capacity(zones.len());
    for zone in zones.zones() {
        ctx.step()?;
        let metrics = by_label
            .entry(zone.label.as_str())
            .or_insert_with(|| {
                let series = table.sums.series(&zone.label);
                compute_slope_result(&series, estimator.as_ref(), options.min_years)
            })
            .clone();
        rows.push(ZoneTrend {
            label: zone.label.clone(),
            geometry: zone.geometry.clone(),
            entity_count: table.entity_counts.get(&zone.label).copied().unwrap_or(0),
            metrics,
        });
    }

    apply_z_scores(rows.iter_mut().map(|row| &mut row.metrics));

    let zone_years = table
        .sums
        .iter()
        .map(|(label, year, cell)| ZoneYearRow {
            label: label.clone(),
            year,
            sum: cell.sum,
            valid: cell.valid,
        })
        .collect();

    log::info!(
        "Zone trends ({}): {} zones, {} with data, {} entities unassigned",
        options.method,
        rows.len(),
        table.sums.len(),
        table.unassigned
    );

    Ok(ZoneTrendReport {
        rows,
        zone_years,
        unassigned: table.unassigned,
        stats: *aggregation.stats(),
    })
}
