//! Resolves field selectors against a [`Table`] and converts its rows into
//! engine inputs.

use geo::{Geometry, Point};
use prelev_models::{AuthorizationEntry, RawValue, Record, Zone};
use prelev_parsing::parse_number;
use prelev_spatial::multipolygon_from_geometry;

use crate::IoError;
use crate::config::{AuthorizationFields, RecordFields, ZoneFields};
use crate::table::{Table, TableRow};

fn required(table: &Table, role: &'static str, field: &str) -> Result<usize, IoError> {
    table
        .column_index(field)
        .ok_or_else(|| IoError::MissingField {
            layer: table.layer.clone(),
            role,
            field: field.to_string(),
        })
}

fn optional(
    table: &Table,
    role: &'static str,
    field: Option<&str>,
) -> Result<Option<usize>, IoError> {
    field.map(|f| required(table, role, f)).transpose()
}

fn cell_or_null(row: &TableRow, index: Option<usize>) -> RawValue {
    index.map(|i| row.cell(i)).unwrap_or_default()
}

/// Column positions of the observation layer.
#[derive(Debug, Clone, Copy)]
pub struct RecordColumns {
    entity_id: usize,
    year: usize,
    value: usize,
    name: Option<usize>,
    contact: Option<usize>,
    category: Option<usize>,
    xy: Option<(usize, usize)>,
}

impl RecordColumns {
    /// Resolves every configured field once.
    ///
    /// # Errors
    ///
    /// * [`IoError::MissingField`] if a configured field is not a column
    /// * [`IoError::IncompleteCoordinates`] if only one of `x` and `y` is set
    pub fn resolve(table: &Table, fields: &RecordFields) -> Result<Self, IoError> {
        let xy = match (&fields.x, &fields.y) {
            (Some(x), Some(y)) => Some((required(table, "x", x)?, required(table, "y", y)?)),
            (None, None) => None,
            _ => {
                return Err(IoError::IncompleteCoordinates {
                    layer: table.layer.clone(),
                });
            }
        };

        Ok(Self {
            entity_id: required(table, "entity id", &fields.entity_id)?,
            year: required(table, "year", &fields.year)?,
            value: required(table, "value", &fields.value)?,
            name: optional(table, "name", fields.name.as_deref())?,
            contact: optional(table, "contact", fields.contact.as_deref())?,
            category: optional(table, "category", fields.category.as_deref())?,
            xy,
        })
    }

    /// Builds one record from a row. The row geometry wins over x/y columns.
    #[must_use]
    pub fn record(&self, row: &TableRow) -> Record {
        let location = row.geometry.clone().or_else(|| {
            let (x, y) = self.xy?;
            let x = parse_number(&row.cell(x));
            let y = parse_number(&row.cell(y));
            (x.is_finite() && y.is_finite()).then_some(Geometry::Point(Point::new(x, y)))
        });

        Record {
            entity_id: row.cell(self.entity_id),
            year: row.cell(self.year),
            value: row.cell(self.value),
            location,
            name: cell_or_null(row, self.name),
            contact: cell_or_null(row, self.contact),
            category: cell_or_null(row, self.category),
        }
    }
}

/// Column positions of the authorization table.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationColumns {
    entity_id: usize,
    volume: usize,
    reference_id: Option<usize>,
}

impl AuthorizationColumns {
    /// Resolves every configured field once.
    ///
    /// # Errors
    ///
    /// * [`IoError::MissingField`] if a configured field is not a column
    pub fn resolve(table: &Table, fields: &AuthorizationFields) -> Result<Self, IoError> {
        Ok(Self {
            entity_id: required(table, "authorization entity id", &fields.entity_id)?,
            volume: required(table, "authorized volume", &fields.volume)?,
            reference_id: optional(table, "reference id", fields.reference_id.as_deref())?,
        })
    }

    /// Builds one authorization entry from a row.
    #[must_use]
    pub fn entry(&self, row: &TableRow) -> AuthorizationEntry {
        AuthorizationEntry {
            entity_id: row.cell(self.entity_id),
            authorized_volume: row.cell(self.volume),
            reference_id: cell_or_null(row, self.reference_id),
        }
    }
}

/// Observation rows of one layer.
#[derive(Debug, Clone, Default)]
pub struct RecordLayer {
    /// One record per row, in row order.
    pub records: Vec<Record>,
    /// Whether the layer carries geometry, either as feature geometries or
    /// through configured x/y columns.
    pub has_geometry: bool,
}

/// Reads every observation row of `table` along with whether the layer
/// carries geometry.
///
/// # Errors
///
/// * [`IoError::MissingField`] if a configured field is not a column
/// * [`IoError::IncompleteCoordinates`] if only one coordinate column is set
pub fn read_record_layer(table: &Table, fields: &RecordFields) -> Result<RecordLayer, IoError> {
    let columns = RecordColumns::resolve(table, fields)?;
    let records: Vec<Record> = table.rows.iter().map(|row| columns.record(row)).collect();
    let has_geometry = columns.xy.is_some() || table.rows.iter().any(|r| r.geometry.is_some());

    if has_geometry {
        let located = records.iter().filter(|r| r.location.is_some()).count();
        log::info!(
            "{}: {} records, {located} with a location",
            table.layer,
            records.len()
        );
    } else {
        log::info!("{}: {} records, no geometry", table.layer, records.len());
    }

    Ok(RecordLayer {
        records,
        has_geometry,
    })
}

/// Reads every observation row of `table`.
///
/// # Errors
///
/// * [`IoError::MissingField`] if a configured field is not a column
/// * [`IoError::IncompleteCoordinates`] if only one coordinate column is set
pub fn read_records(table: &Table, fields: &RecordFields) -> Result<Vec<Record>, IoError> {
    read_record_layer(table, fields).map(|layer| layer.records)
}

/// Reads every authorization row of `table`.
///
/// # Errors
///
/// * [`IoError::MissingField`] if a configured field is not a column
pub fn read_authorizations(
    table: &Table,
    fields: &AuthorizationFields,
) -> Result<Vec<AuthorizationEntry>, IoError> {
    let columns = AuthorizationColumns::resolve(table, fields)?;
    let entries: Vec<AuthorizationEntry> =
        table.rows.iter().map(|row| columns.entry(row)).collect();
    log::info!("{}: {} authorization rows", table.layer, entries.len());
    Ok(entries)
}

/// Reads the areal features of `table` as zones, in row order.
///
/// Rows without a label or without a polygonal geometry are skipped.
///
/// # Errors
///
/// * [`IoError::MissingField`] if the label field is not a column
pub fn read_zones(table: &Table, fields: &ZoneFields) -> Result<Vec<Zone>, IoError> {
    let label = required(table, "zone label", &fields.label)?;

    let mut zones = Vec::with_capacity(table.rows.len());
    let mut skipped = 0_usize;
    for row in &table.rows {
        let zone = row.cell(label).as_text().and_then(|name| {
            let geometry = multipolygon_from_geometry(row.geometry.clone()?)?;
            Some(Zone::new(name, geometry))
        });
        match zone {
            Some(zone) => zones.push(zone),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log::warn!(
            "{}: skipped {skipped} rows without a label or an areal geometry",
            table.layer
        );
    }
    log::info!("{}: {} zones", table.layer, zones.len());
    Ok(zones)
}
