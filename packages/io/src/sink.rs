//! Result sinks.
//!
//! Every report is written as flat rows, either as CSV or as a GeoJSON
//! `FeatureCollection` whose properties are the same columns. The output
//! format follows the target's extension.

use std::io::Write;
use std::path::Path;

use geojson::{Feature, FeatureCollection, JsonObject};
use prelev_compliance::{EntityRatioReport, ZoneRatioReport};
use prelev_models::MatchStatus;
use prelev_trend::{EntityTrendReport, ZoneTrendReport};
use serde::Serialize;
use serde_json::Value;

use crate::IoError;
use crate::table::TableFormat;

// The csv serializer cannot flatten nested structs, so each row type
// repeats the metric columns.
#[derive(Debug, Serialize)]
struct EntityTrendRow<'a> {
    entity_id: &'a str,
    name: Option<&'a str>,
    contact: Option<&'a str>,
    categories: Option<&'a str>,
    n_years: usize,
    slope: Option<f64>,
    mean_value: Option<f64>,
    first_period_mean: Option<f64>,
    last_period_mean: Option<f64>,
    slope_pct_of_mean: Option<f64>,
    slope_pct_of_first: Option<f64>,
    cagr_pct: Option<f64>,
    slope_z: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ZoneTrendRow<'a> {
    label: &'a str,
    entity_count: usize,
    n_years: usize,
    slope: Option<f64>,
    mean_value: Option<f64>,
    first_period_mean: Option<f64>,
    last_period_mean: Option<f64>,
    slope_pct_of_mean: Option<f64>,
    slope_pct_of_first: Option<f64>,
    cagr_pct: Option<f64>,
    slope_z: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ZoneYearRow<'a> {
    label: &'a str,
    year: i32,
    sum: f64,
    valid: usize,
}

#[derive(Debug, Serialize)]
struct EntityRatioRow<'a> {
    entity_id: &'a str,
    year: i32,
    name: Option<&'a str>,
    contact: Option<&'a str>,
    categories: Option<&'a str>,
    observed_sum: f64,
    authorized_volume: Option<f64>,
    reference_ids: Option<&'a str>,
    ratio: Option<f64>,
    ratio_possible: bool,
    percent_overrun: Option<f64>,
    match_status: MatchStatus,
}

#[derive(Debug, Serialize)]
struct ZoneRatioRow<'a> {
    label: &'a str,
    year: i32,
    observed_sum: f64,
    authorized_sum: Option<f64>,
    ratio: Option<f64>,
    ratio_possible: bool,
    percent_of_authorized: Option<f64>,
    percent_overrun: Option<f64>,
    entity_count: usize,
}

/// Writes rows as CSV with a header taken from the first row.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// * [`IoError::Csv`] if a row cannot be serialized
/// * [`IoError::Io`] if the writer cannot be flushed
pub fn write_csv<W: Write, T: Serialize>(
    writer: W,
    target: &str,
    rows: impl IntoIterator<Item = T>,
) -> Result<usize, IoError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut count = 0;
    for row in rows {
        wtr.serialize(row).map_err(|source| IoError::Csv {
            layer: target.to_string(),
            source,
        })?;
        count += 1;
    }
    wtr.flush().map_err(|source| IoError::Io {
        path: target.to_string(),
        source,
    })?;
    Ok(count)
}

/// Writes rows as a GeoJSON `FeatureCollection`, one feature per row.
///
/// Returns the number of features written.
///
/// # Errors
///
/// * [`IoError::Json`] if a row cannot be serialized
pub fn write_geojson<W: Write, T: Serialize>(
    writer: W,
    rows: impl IntoIterator<Item = (T, Option<geojson::Value>)>,
) -> Result<usize, IoError> {
    let features = rows
        .into_iter()
        .map(|(row, geometry)| -> Result<Feature, serde_json::Error> {
            let properties = match serde_json::to_value(row)? {
                Value::Object(map) => map,
                _ => JsonObject::new(),
            };
            Ok(Feature {
                bbox: None,
                geometry: geometry.map(geojson::Geometry::new),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;

    let count = features.len();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    serde_json::to_writer(writer, &collection)?;
    Ok(count)
}

fn write_output<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = (T, Option<geojson::Value>)>,
) -> Result<usize, IoError> {
    let target = path.display().to_string();
    let format = TableFormat::from_path(path)?;
    let file = std::fs::File::create(path).map_err(|source| IoError::Io {
        path: target.clone(),
        source,
    })?;
    let writer = std::io::BufWriter::new(file);

    let count = match format {
        TableFormat::Csv => write_csv(writer, &target, rows.into_iter().map(|(row, _)| row))?,
        TableFormat::GeoJson => write_geojson(writer, rows)?,
    };

    log::info!("Wrote {count} rows to {target} as {format}");
    Ok(count)
}

/// Writes one row per entity trend.
///
/// # Errors
///
/// * [`IoError::UnsupportedFormat`] if the extension is neither CSV nor GeoJSON
/// * [`IoError::Io`], [`IoError::Csv`] or [`IoError::Json`] if writing fails
pub fn write_entity_trends(path: &Path, report: &EntityTrendReport) -> Result<usize, IoError> {
    write_output(
        path,
        report.rows.iter().map(|row| {
            let m = &row.metrics;
            let out = EntityTrendRow {
                entity_id: &row.entity_id,
                name: row.name.as_deref(),
                contact: row.contact.as_deref(),
                categories: row.categories.as_deref(),
                n_years: m.n_years,
                slope: m.slope,
                mean_value: m.mean_value,
                first_period_mean: m.first_period_mean,
                last_period_mean: m.last_period_mean,
                slope_pct_of_mean: m.slope_pct_of_mean,
                slope_pct_of_first: m.slope_pct_of_first,
                cagr_pct: m.cagr_pct,
                slope_z: m.slope_z,
            };
            (out, row.geometry.as_ref().map(geojson::Value::from))
        }),
    )
}

/// Writes one row per input zone with its trend metrics.
///
/// # Errors
///
/// * [`IoError::UnsupportedFormat`] if the extension is neither CSV nor GeoJSON
/// * [`IoError::Io`], [`IoError::Csv`] or [`IoError::Json`] if writing fails
pub fn write_zone_trends(path: &Path, report: &ZoneTrendReport) -> Result<usize, IoError> {
    write_output(
        path,
        report.rows.iter().map(|row| {
            let m = &row.metrics;
            let out = ZoneTrendRow {
                label: &row.label,
                entity_count: row.entity_count,
                n_years: m.n_years,
                slope: m.slope,
                mean_value: m.mean_value,
                first_period_mean: m.first_period_mean,
                last_period_mean: m.last_period_mean,
                slope_pct_of_mean: m.slope_pct_of_mean,
                slope_pct_of_first: m.slope_pct_of_first,
                cagr_pct: m.cagr_pct,
                slope_z: m.slope_z,
            };
            (out, Some(geojson::Value::from(&row.geometry)))
        }),
    )
}

/// Writes the zone × year sum table of a zone trend report.
///
/// # Errors
///
/// * [`IoError::UnsupportedFormat`] if the extension is neither CSV nor GeoJSON
/// * [`IoError::Io`], [`IoError::Csv`] or [`IoError::Json`] if writing fails
pub fn write_zone_years(path: &Path, report: &ZoneTrendReport) -> Result<usize, IoError> {
    write_output(
        path,
        report.zone_years.iter().map(|row| {
            let out = ZoneYearRow {
                label: &row.label,
                year: row.year,
                sum: row.sum,
                valid: row.valid,
            };
            (out, None)
        }),
    )
}

/// Writes one row per entity ratio.
///
/// # Errors
///
/// * [`IoError::UnsupportedFormat`] if the extension is neither CSV nor GeoJSON
/// * [`IoError::Io`], [`IoError::Csv`] or [`IoError::Json`] if writing fails
pub fn write_entity_ratios(path: &Path, report: &EntityRatioReport) -> Result<usize, IoError> {
    write_output(
        path,
        report.rows.iter().map(|row| {
            let r = &row.result;
            let out = EntityRatioRow {
                entity_id: &r.entity_id,
                year: report.year,
                name: row.name.as_deref(),
                contact: row.contact.as_deref(),
                categories: row.categories.as_deref(),
                observed_sum: r.observed_sum,
                authorized_volume: r.authorized_volume,
                reference_ids: r.reference_ids_concat.as_deref(),
                ratio: r.ratio,
                ratio_possible: r.ratio_possible,
                percent_overrun: r.percent_overrun,
                match_status: r.match_status,
            };
            (out, row.geometry.as_ref().map(geojson::Value::from))
        }),
    )
}

/// Writes one row per zone ratio. The unassigned row has no geometry.
///
/// # Errors
///
/// * [`IoError::UnsupportedFormat`] if the extension is neither CSV nor GeoJSON
/// * [`IoError::Io`], [`IoError::Csv`] or [`IoError::Json`] if writing fails
pub fn write_zone_ratios(path: &Path, report: &ZoneRatioReport) -> Result<usize, IoError> {
    write_output(
        path,
        report.rows.iter().map(|row| {
            let z = &row.rollup;
            let out = ZoneRatioRow {
                label: &z.label,
                year: report.year,
                observed_sum: z.observed_sum,
                authorized_sum: z.authorized_sum,
                ratio: z.ratio,
                ratio_possible: z.ratio_possible,
                percent_of_authorized: z.percent_of_authorized,
                percent_overrun: z.percent_overrun,
                entity_count: z.entity_count,
            };
            (out, row.geometry.as_ref().map(geojson::Value::from))
        }),
    )
}
