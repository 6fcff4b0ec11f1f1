#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Observed vs authorized volume analytics.
//!
//! Builds a per-entity authorization index, joins one year of observed
//! sums against it and optionally rolls matched entities up into zones.

pub mod index;
pub mod join;
pub mod rollup;

use geo::Geometry;
use prelev_aggregate::{
    AggregateError, AggregateOptions, Aggregation, AggregationStats, EntityProfile, aggregate,
};
use prelev_models::progress::{Cancelled, RunContext};
use prelev_models::{AuthorizationEntry, MatchStatus, RatioResult, Record};
use prelev_spatial::ZoneIndex;

pub use index::{AuthorizationIndex, AuthorizationIndexEntry};
pub use join::{RatioFields, join};
pub use rollup::{ZoneRatioRow, rollup};

/// Errors that can occur during compliance analytics.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    /// Aggregation of the observed records failed.
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// The kept records carry no year to compare.
    #[error("No year available in the observed records")]
    NoAvailableYear,

    /// The requested year has no kept record.
    #[error("No observed record for year {year}")]
    NoDataForYear {
        /// Requested year.
        year: i32,
    },

    /// No observed entity has an authorization row.
    #[error("No entity matched the authorization table for year {year}")]
    NoMatchedEntities {
        /// Compared year.
        year: i32,
    },

    /// The run was cancelled before completion.
    #[error("Compliance computation interrupted: {0}")]
    Cancelled(#[from] Cancelled),
}

/// Options shared by the ratio pipelines.
#[derive(Debug, Clone, Copy)]
pub struct RatioOptions {
    /// Compared year. `None` or `Some(0)` selects the latest available year.
    pub year: Option<i32>,
    /// Whether the entity report lists entities without authorization.
    /// The zonal rollup always leaves them out.
    pub include_unmatched: bool,
    /// Whether the observation layer carries geometry. A study area is
    /// ignored when it does not.
    pub layer_has_geometry: bool,
}

impl Default for RatioOptions {
    fn default() -> Self {
        Self {
            year: None,
            include_unmatched: true,
            layer_has_geometry: true,
        }
    }
}

impl RatioOptions {
    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            layer_has_geometry: self.layer_has_geometry,
            ..AggregateOptions::default()
        }
    }

    /// Picks the compared year among the aggregated ones.
    fn select_year(&self, aggregation: &Aggregation) -> Result<i32, ComplianceError> {
        match self.year.filter(|year| *year != 0) {
            Some(year) => {
                if aggregation.years().contains(&year) {
                    Ok(year)
                } else {
                    Err(ComplianceError::NoDataForYear { year })
                }
            }
            None => aggregation
                .latest_year()
                .ok_or(ComplianceError::NoAvailableYear),
        }
    }
}

/// Ratio of one entity with its descriptive attributes.
#[derive(Debug, Clone)]
pub struct EntityRatio {
    /// Join outcome.
    pub result: RatioResult,
    /// Display name.
    pub name: Option<String>,
    /// Contact label.
    pub contact: Option<String>,
    /// Sorted, semicolon-joined category labels.
    pub categories: Option<String>,
    /// First geometry observed in the compared year.
    pub geometry: Option<Geometry<f64>>,
}

/// Output of [`entity_ratio_report`].
#[derive(Debug, Clone)]
pub struct EntityRatioReport {
    /// Compared year.
    pub year: i32,
    /// One row per reported entity, sorted by id.
    pub rows: Vec<EntityRatio>,
    /// Record counters from the aggregation pass.
    pub stats: AggregationStats,
}

/// Compares one year of observed volumes against authorized volumes per
/// entity.
///
/// # Errors
///
/// * [`ComplianceError::Aggregate`] if no record survives the filters
/// * [`ComplianceError::NoDataForYear`] if the requested year has no record
/// * [`ComplianceError::NoMatchedEntities`] if nothing matched and
///   unmatched entities are excluded
/// * [`ComplianceError::Cancelled`] if the run context was cancelled
pub fn entity_ratio_report(
    records: &[Record],
    authorizations: &[AuthorizationEntry],
    study_area: Option<&ZoneIndex>,
    options: &RatioOptions,
    ctx: &RunContext,
) -> Result<EntityRatioReport, ComplianceError> {
    let aggregation = aggregate(records, study_area, &options.aggregate_options(), ctx)?;
    let year = options.select_year(&aggregation)?;
    let index = AuthorizationIndex::build(authorizations);
    let results = join(
        &aggregation.sums_for_year(year),
        &index,
        options.include_unmatched,
    );

    let matched = count_matched(&results);
    if matched == 0 && !options.include_unmatched {
        return Err(ComplianceError::NoMatchedEntities { year });
    }

    ctx.begin("Collecting entity ratios", results.len());

    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        ctx.step()?;
        let profile = aggregation.profile(&result.entity_id);
        rows.push(EntityRatio {
            name: profile.and_then(EntityProfile::name).map(str::to_string),
            contact: profile.and_then(EntityProfile::contact).map(str::to_string),
            categories: profile.and_then(EntityProfile::categories_concat),
            geometry: profile.and_then(|p| p.location_in(year)).cloned(),
            result,
        });
    }

    log::info!(
        "Entity ratios for {year}: {} rows, {matched} matched, {} unmatched",
        rows.len(),
        rows.len() - matched
    );

    Ok(EntityRatioReport {
        year,
        rows,
        stats: *aggregation.stats(),
    })
}

/// Output of [`zone_ratio_report`].
#[derive(Debug, Clone)]
pub struct ZoneRatioReport {
    /// Compared year.
    pub year: i32,
    /// One row per input zone, then the unassigned row if any.
    pub rows: Vec<ZoneRatioRow>,
    /// Entities matched against the authorization table.
    pub matched: usize,
    /// Entities left out for lack of an authorization row.
    pub unmatched: usize,
    /// Record counters from the aggregation pass.
    pub stats: AggregationStats,
}

/// Compares one year of observed volumes against authorized volumes per
/// zone. Only matched entities are rolled up.
///
/// # Errors
///
/// * [`ComplianceError::Aggregate`] if no record survives the filters
/// * [`ComplianceError::NoDataForYear`] if the requested year has no record
/// * [`ComplianceError::NoMatchedEntities`] if no entity matched
/// * [`ComplianceError::Cancelled`] if the run context was cancelled
pub fn zone_ratio_report(
    records: &[Record],
    authorizations: &[AuthorizationEntry],
    zones: &ZoneIndex,
    options: &RatioOptions,
    ctx: &RunContext,
) -> Result<ZoneRatioReport, ComplianceError> {
    let aggregation = aggregate(records, None, &options.aggregate_options(), ctx)?;
    let year = options.select_year(&aggregation)?;
    let index = AuthorizationIndex::build(authorizations);
    let observed = aggregation.sums_for_year(year);
    let results = join(&observed, &index, false);

    if results.is_empty() {
        return Err(ComplianceError::NoMatchedEntities { year });
    }
    let matched = results.len();
    let unmatched = observed.len() - matched;
    log::info!("Zone ratios for {year}: {matched} entities matched, {unmatched} left out");

    ctx.begin("Rolling up zones", results.len());

    let entities = results.iter().map(|result| {
        let geometry = aggregation
            .profile(&result.entity_id)
            .and_then(|p| p.location_in(year));
        (result, geometry)
    });
    let rows = rollup(entities, zones, ctx)?;

    Ok(ZoneRatioReport {
        year,
        rows,
        matched,
        unmatched,
        stats: *aggregation.stats(),
    })
}

fn count_matched(results: &[RatioResult]) -> usize {
    results
        .iter()
        .filter(|r| r.match_status == MatchStatus::Matched)
        .count()
}
