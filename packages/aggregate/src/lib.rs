#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Entity-year aggregation.
//!
//! Reduces raw [`Record`]s into per-entity yearly sums in a single pass,
//! applying the optional study-area filter, the year parser and the
//! volume parser. Every dropped record is counted in [`AggregationStats`]
//! rather than reported as an error.

pub mod accumulator;
pub mod profile;

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Geometry};
use prelev_models::progress::{Cancelled, RunContext};
use prelev_models::{Record, YearRange};
use prelev_parsing::{parse_number, parse_year};
use prelev_spatial::ZoneIndex;

pub use accumulator::{TimeSeries, YearAccumulator, YearCell};
pub use profile::EntityProfile;

/// Errors that can occur during aggregation.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Every record was filtered out.
    #[error("No data for selection ({stats})")]
    NoData {
        /// Counters explaining where the records went.
        stats: AggregationStats,
    },

    /// The run was cancelled before completion.
    #[error("Aggregation interrupted: {0}")]
    Cancelled(#[from] Cancelled),
}

/// Options for [`aggregate`].
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    /// Inclusive year filter. `None` keeps every year.
    pub year_range: Option<YearRange>,
    /// Whether the input layer carries geometry at all. A study area is
    /// ignored for layers without geometry.
    pub layer_has_geometry: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            year_range: None,
            layer_has_geometry: true,
        }
    }
}

/// Per-record outcome counters of one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    /// Records read.
    pub processed: usize,
    /// Records that reached the sums.
    pub kept: usize,
    /// Dropped: geometry intersects no study-area polygon.
    pub outside_study_area: usize,
    /// Dropped: a study area was given but the record has no usable geometry.
    pub missing_geometry: usize,
    /// Dropped: no year could be parsed.
    pub unparsable_year: usize,
    /// Dropped: year outside the requested range.
    pub outside_year_range: usize,
    /// Dropped: empty or unreadable entity id.
    pub missing_entity: usize,
    /// Kept, but the value did not parse and counts as zero.
    pub unparsable_value: usize,
}

impl AggregationStats {
    /// Total records dropped for any reason.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.outside_study_area
            + self.missing_geometry
            + self.unparsable_year
            + self.outside_year_range
            + self.missing_entity
    }
}

impl std::fmt::Display for AggregationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} kept, {} outside study area, {} without geometry, \
             {} without year, {} outside year range, {} without entity id, \
             {} unparsable values",
            self.processed,
            self.kept,
            self.outside_study_area,
            self.missing_geometry,
            self.unparsable_year,
            self.outside_year_range,
            self.missing_entity,
            self.unparsable_value,
        )
    }
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    observed: YearAccumulator<String>,
    profiles: BTreeMap<String, EntityProfile>,
    stats: AggregationStats,
}

impl Aggregation {
    /// Entity × year sums and valid counts.
    #[must_use]
    pub const fn observed(&self) -> &YearAccumulator<String> {
        &self.observed
    }

    /// Descriptive attributes per entity.
    #[must_use]
    pub const fn profiles(&self) -> &BTreeMap<String, EntityProfile> {
        &self.profiles
    }

    /// Descriptive attributes of one entity.
    #[must_use]
    pub fn profile(&self, entity_id: &str) -> Option<&EntityProfile> {
        self.profiles.get(entity_id)
    }

    /// Outcome counters.
    #[must_use]
    pub const fn stats(&self) -> &AggregationStats {
        &self.stats
    }

    /// Every year with at least one kept record.
    #[must_use]
    pub fn years(&self) -> BTreeSet<i32> {
        self.observed.iter().map(|(_, year, _)| year).collect()
    }

    /// Most recent year with at least one kept record.
    #[must_use]
    pub fn latest_year(&self) -> Option<i32> {
        self.observed.iter().map(|(_, year, _)| year).max()
    }

    /// Observed sum of every entity with a kept record in `year`.
    ///
    /// Unparsable values count as zero here, so an entity whose values all
    /// failed to parse still appears with a zero sum.
    #[must_use]
    pub fn sums_for_year(&self, year: i32) -> BTreeMap<String, f64> {
        self.observed
            .iter()
            .filter(|(_, y, _)| *y == year)
            .map(|(entity, _, cell)| (entity.clone(), cell.sum))
            .collect()
    }

    /// Time series of every entity.
    #[must_use]
    pub fn series(&self) -> BTreeMap<String, TimeSeries> {
        self.observed.all_series()
    }
}

/// Non-empty geometry of a record, if any.
fn usable_location(record: &Record) -> Option<&Geometry<f64>> {
    record
        .location
        .as_ref()
        .filter(|geom| geom.bounding_rect().is_some())
}

/// Aggregates records into entity × year sums.
///
/// When `study_area` is given and not empty and the layer carries geometry,
/// a record is kept only if its geometry intersects at least one of its
/// polygons.
///
/// # Errors
///
/// * [`AggregateError::NoData`] if no record survives the filters
/// * [`AggregateError::Cancelled`] if the run context was cancelled
pub fn aggregate(
    records: &[Record],
    study_area: Option<&ZoneIndex>,
    options: &AggregateOptions,
    ctx: &RunContext,
) -> Result<Aggregation, AggregateError> {
    let study_area = study_area.filter(|index| !index.is_empty());
    if study_area.is_some() && !options.layer_has_geometry {
        log::warn!("Input layer has no geometry, study area filter skipped");
    }
    let study_area = study_area.filter(|_| options.layer_has_geometry);
    let mut out = Aggregation::default();
    let stats = &mut out.stats;

    ctx.begin("Aggregating records", records.len());

    for record in records {
        ctx.step()?;
        stats.processed += 1;

        let location = usable_location(record);
        if let Some(index) = study_area {
            let Some(geom) = location else {
                stats.missing_geometry += 1;
                continue;
            };
            if !index.intersects_any(geom) {
                stats.outside_study_area += 1;
                continue;
            }
        }

        let Some(year) = parse_year(&record.year) else {
            stats.unparsable_year += 1;
            continue;
        };
        if options.year_range.is_some_and(|range| !range.contains(year)) {
            stats.outside_year_range += 1;
            continue;
        }

        let Some(entity_id) = record.entity_id.as_text() else {
            stats.missing_entity += 1;
            continue;
        };

        let value = parse_number(&record.value);
        if value.is_nan() {
            stats.unparsable_value += 1;
        }

        out.observed.add(entity_id.clone(), year, value);
        out.profiles.entry(entity_id).or_default().observe(
            year,
            location,
            record.name.as_text(),
            record.contact.as_text(),
            record.category.as_text(),
        );
        stats.kept += 1;
    }

    log::info!("Aggregation: {}", out.stats);

    if out.stats.kept == 0 {
        return Err(AggregateError::NoData { stats: out.stats });
    }

    log::debug!(
        "Aggregated {} entities over {} years",
        out.observed.len(),
        out.years().len()
    );

    Ok(out)
}

/// Zone × year sums built by assigning entity series to zones.
#[derive(Debug, Clone, Default)]
pub struct ZoneYearTable {
    /// Zone label × year sums and valid counts.
    pub sums: YearAccumulator<String>,
    /// Number of entities assigned to each zone.
    pub entity_counts: BTreeMap<String, usize>,
    /// Entities without geometry or outside every zone.
    pub unassigned: usize,
}

/// Assigns every entity's whole series to the zones its most recent
/// geometry intersects, summing into zone × year cells.
///
/// An entity intersecting several zones contributes to each of them.
///
/// # Errors
///
/// * [`AggregateError::Cancelled`] if the run context was cancelled
pub fn assign_series_to_zones(
    aggregation: &Aggregation,
    zones: &ZoneIndex,
    ctx: &RunContext,
) -> Result<ZoneYearTable, AggregateError> {
    let mut table = ZoneYearTable::default();

    ctx.begin("Assigning entities to zones", aggregation.profiles.len());

    for (entity_id, profile) in &aggregation.profiles {
        ctx.step()?;

        let location = profile.latest_location().map(|(_, geom)| geom);
        let labels = zones.assign(location);
        if labels.is_empty() {
            table.unassigned += 1;
            continue;
        }

        for label in labels {
            *table.entity_counts.entry(label.to_string()).or_default() += 1;
            for (year, cell) in aggregation.observed.years_of(entity_id) {
                table.sums.add_cell(label.to_string(), year, cell);
            }
        }
    }

    log::info!(
        "Zone assignment: {} zones received data, {} entities unassigned",
        table.sums.len(),
        table.unassigned
    );

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, polygon};
    use prelev_models::progress::CancelToken;
    use prelev_models::{RawValue, Zone};

    fn square(label: &str, x0: f64, size: f64) -> Zone {
        Zone::new(
            label,
            polygon![
                (x: x0, y: 0.0),
                (x: x0 + size, y: 0.0),
                (x: x0 + size, y: size),
                (x: x0, y: size),
                (x: x0, y: 0.0),
            ],
        )
    }

    fn run(records: &[Record], area: Option<&ZoneIndex>) -> Result<Aggregation, AggregateError> {
        aggregate(records, area, &AggregateOptions::default(), &RunContext::new())
    }

    #[test]
    fn sums_values_per_entity_and_year() {
        let records = vec![
            Record::new("A", 2020, "10"),
            Record::new("A", "2020", 5.5),
            Record::new("A", 2021, "1 000,5"),
            Record::new("B", 2020, 3_i64),
        ];
        let agg = run(&records, None).unwrap();
        assert_eq!(
            agg.observed().get(&"A".to_string(), 2020),
            Some(YearCell { sum: 15.5, valid: 2 })
        );
        assert!((agg.sums_for_year(2021)["A"] - 1_000.5).abs() < 1e-9);
        assert_eq!(agg.years().into_iter().collect::<Vec<_>>(), vec![2020, 2021]);
        assert_eq!(agg.latest_year(), Some(2021));
        assert_eq!(agg.stats().kept, 4);
    }

    #[test]
    fn unparsable_value_is_kept_but_not_counted() {
        let records = vec![Record::new("A", 2020, "n/a"), Record::new("A", 2020, "4")];
        let agg = run(&records, None).unwrap();
        assert_eq!(
            agg.observed().get(&"A".to_string(), 2020),
            Some(YearCell { sum: 4.0, valid: 1 })
        );
        assert_eq!(agg.stats().unparsable_value, 1);
        assert_eq!(agg.stats().kept, 2);
    }

    #[test]
    fn drops_records_without_year_or_entity() {
        let records = vec![
            Record::new("A", "sans date", 1.0),
            Record::new("  ", 2020, 1.0),
            Record::new(RawValue::Unreadable, 2020, 1.0),
            Record::new("A", 2020, 1.0),
        ];
        let agg = run(&records, None).unwrap();
        let stats = agg.stats();
        assert_eq!(stats.unparsable_year, 1);
        assert_eq!(stats.missing_entity, 2);
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.dropped(), 3);
    }

    #[test]
    fn year_range_filters_records() {
        let records = vec![Record::new("A", 2010, 1.0), Record::new("A", 2015, 1.0)];
        let options = AggregateOptions {
            year_range: Some(YearRange::new(2012, 2023)),
            ..AggregateOptions::default()
        };
        let agg = aggregate(&records, None, &options, &RunContext::new()).unwrap();
        assert_eq!(agg.years().into_iter().collect::<Vec<_>>(), vec![2015]);
        assert_eq!(agg.stats().outside_year_range, 1);
    }

    #[test]
    fn study_area_keeps_intersecting_records_only() {
        let area = ZoneIndex::new(vec![square("area", 0.0, 10.0)]);
        let records = vec![
            Record::new("in", 2020, 1.0).with_location(Point::new(5.0, 5.0)),
            Record::new("out", 2020, 1.0).with_location(Point::new(50.0, 5.0)),
            Record::new("nowhere", 2020, 1.0),
        ];
        let agg = run(&records, Some(&area)).unwrap();
        assert_eq!(agg.profiles().keys().collect::<Vec<_>>(), vec!["in"]);
        assert_eq!(agg.stats().outside_study_area, 1);
        assert_eq!(agg.stats().missing_geometry, 1);
    }

    #[test]
    fn empty_study_area_disables_filtering() {
        let area = ZoneIndex::new(Vec::new());
        let records = vec![Record::new("nowhere", 2020, 1.0)];
        let agg = run(&records, Some(&area)).unwrap();
        assert_eq!(agg.stats().kept, 1);
    }

    #[test]
    fn study_area_is_ignored_for_layers_without_geometry() {
        let area = ZoneIndex::new(vec![square("area", 0.0, 10.0)]);
        let records = vec![Record::new("a", 2020, 1.0), Record::new("b", 2021, 2.0)];
        let options = AggregateOptions {
            layer_has_geometry: false,
            ..AggregateOptions::default()
        };
        let agg = aggregate(&records, Some(&area), &options, &RunContext::new()).unwrap();
        assert_eq!(agg.stats().kept, 2);
        assert_eq!(agg.stats().missing_geometry, 0);

        let err = run(&records, Some(&area)).unwrap_err();
        assert!(matches!(err, AggregateError::NoData { stats } if stats.missing_geometry == 2));
    }

    #[test]
    fn nothing_kept_is_an_error() {
        let records = vec![Record::new("A", "", 1.0)];
        let err = run(&records, None).unwrap_err();
        assert!(matches!(err, AggregateError::NoData { stats } if stats.processed == 1));
        assert!(matches!(run(&[], None), Err(AggregateError::NoData { .. })));
    }

    #[test]
    fn cancellation_returns_no_partial_result() {
        let token = CancelToken::new();
        token.cancel();
        let ctx = RunContext::new().with_cancel(token);
        let records = vec![Record::new("A", 2020, 1.0)];
        let err = aggregate(&records, None, &AggregateOptions::default(), &ctx).unwrap_err();
        assert!(matches!(err, AggregateError::Cancelled(_)));
        assert_eq!(err.to_string(), "Aggregation interrupted: operation cancelled");
    }

    #[test]
    fn series_assigned_to_every_intersecting_zone() {
        let zones = ZoneIndex::new(vec![square("A", 0.0, 10.0), square("B", 5.0, 10.0)]);
        let records = vec![
            Record::new("both", 2020, 10.0).with_location(Point::new(7.0, 1.0)),
            Record::new("both", 2021, 12.0).with_location(Point::new(7.0, 1.0)),
            Record::new("onlyA", 2020, 1.0).with_location(Point::new(1.0, 1.0)),
            Record::new("lost", 2020, 99.0).with_location(Point::new(90.0, 1.0)),
        ];
        let agg = run(&records, None).unwrap();
        let table = assign_series_to_zones(&agg, &zones, &RunContext::new()).unwrap();

        assert_eq!(table.unassigned, 1);
        assert_eq!(table.entity_counts["A"], 2);
        assert_eq!(table.entity_counts["B"], 1);
        assert_eq!(
            table.sums.get(&"A".to_string(), 2020),
            Some(YearCell { sum: 11.0, valid: 2 })
        );
        assert_eq!(
            table.sums.get(&"B".to_string(), 2021),
            Some(YearCell { sum: 12.0, valid: 1 })
        );
    }

    #[test]
    fn zone_assignment_uses_most_recent_geometry() {
        let zones = ZoneIndex::new(vec![square("A", 0.0, 10.0), square("B", 20.0, 10.0)]);
        let records = vec![
            Record::new("moved", 2020, 1.0).with_location(Point::new(1.0, 1.0)),
            Record::new("moved", 2022, 2.0).with_location(Point::new(21.0, 1.0)),
        ];
        let agg = run(&records, None).unwrap();
        let table = assign_series_to_zones(&agg, &zones, &RunContext::new()).unwrap();
        assert!(!table.entity_counts.contains_key("A"));
        assert_eq!(table.sums.series(&"B".to_string()).n_valid(), 2);
    }
}
