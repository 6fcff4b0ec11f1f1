//! Attribute tables read from CSV or GeoJSON.
//!
//! Both formats are flattened into a [`Table`]: named columns, one
//! [`RawValue`] per cell and an optional geometry per row. Cells that
//! cannot be decoded become [`RawValue::Unreadable`] instead of failing the
//! whole file.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use geo::Geometry;
use geojson::{Feature, GeoJson};
use prelev_models::RawValue;
use serde_json::Value;
use strum_macros::{Display, EnumString};

use crate::IoError;
use crate::config::CsvDialect;

/// Supported input formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TableFormat {
    /// Delimited text with a header row.
    Csv,
    /// GeoJSON `FeatureCollection`.
    #[strum(serialize = "geojson", serialize = "json")]
    GeoJson,
}

impl TableFormat {
    /// Detects the format from a path's extension.
    ///
    /// # Errors
    ///
    /// * [`IoError::UnsupportedFormat`] if the extension is missing or unknown
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .ok_or_else(|| IoError::UnsupportedFormat {
                path: path.display().to_string(),
            })
    }
}

/// One row of a [`Table`].
#[derive(Debug, Clone, Default)]
pub struct TableRow {
    /// Cells aligned with [`Table::columns`]. Missing trailing cells read
    /// as [`RawValue::Null`].
    pub cells: Vec<RawValue>,
    /// Row geometry, when the source format carries one.
    pub geometry: Option<Geometry<f64>>,
}

impl TableRow {
    /// The cell at `index`, or `Null` past the end of a short row.
    #[must_use]
    pub fn cell(&self, index: usize) -> RawValue {
        self.cells.get(index).cloned().unwrap_or_default()
    }
}

/// A named, column-oriented view over an input layer.
#[derive(Debug, Clone)]
pub struct Table {
    /// Layer name used in log and error messages.
    pub layer: String,
    /// Column names in source order.
    pub columns: Vec<String>,
    /// Data rows.
    pub rows: Vec<TableRow>,
}

impl Table {
    /// Position of a column by exact name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Reads a delimited table with a header row.
    ///
    /// Rows may have fewer or more cells than the header. Empty cells are
    /// `Null`, cells that are not valid UTF-8 are `Unreadable`.
    ///
    /// # Errors
    ///
    /// * [`IoError::Csv`] if the header or a row cannot be read
    pub fn from_csv_reader<R: Read>(
        reader: R,
        layer: &str,
        dialect: &CsvDialect,
    ) -> Result<Self, IoError> {
        let csv_err = |source| IoError::Csv {
            layer: layer.to_string(),
            source,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .delimiter(dialect.delimiter_byte()?)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for result in rdr.byte_records() {
            let record = result.map_err(csv_err)?;
            let cells = record.iter().map(csv_cell).collect();
            rows.push(TableRow {
                cells,
                geometry: None,
            });
        }

        log::debug!("Read {} CSV rows from {layer}", rows.len());

        Ok(Self {
            layer: layer.to_string(),
            columns,
            rows,
        })
    }

    /// Reads a GeoJSON `FeatureCollection`, a single `Feature` or a bare
    /// geometry.
    ///
    /// Columns are the union of property keys in first-seen order. Features
    /// whose geometry cannot be converted keep their attributes with no
    /// geometry.
    ///
    /// # Errors
    ///
    /// * [`IoError::GeoJson`] if the text is not valid GeoJSON
    pub fn from_geojson_str(text: &str, layer: &str) -> Result<Self, IoError> {
        let geojson: GeoJson = text.parse().map_err(|e| IoError::GeoJson {
            layer: layer.to_string(),
            source: Box::new(e),
        })?;

        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(geometry) => vec![Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
        };

        let mut columns: Vec<String> = Vec::new();
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();
        let mut rows = Vec::with_capacity(features.len());
        let mut bad_geometries = 0_usize;

        for feature in features {
            let mut cells = vec![RawValue::Null; columns.len()];
            for (key, value) in feature.properties.into_iter().flatten() {
                let index = *positions.entry(key.clone()).or_insert_with(|| {
                    columns.push(key);
                    columns.len() - 1
                });
                if cells.len() <= index {
                    cells.resize(index + 1, RawValue::Null);
                }
                cells[index] = json_cell(value);
            }

            let geometry = feature.geometry.and_then(|g| {
                Geometry::<f64>::try_from(g)
                    .map_err(|e| {
                        bad_geometries += 1;
                        log::trace!("Skipping unconvertible geometry in {layer}: {e}");
                    })
                    .ok()
            });

            rows.push(TableRow { cells, geometry });
        }

        if bad_geometries > 0 {
            log::warn!("{layer}: {bad_geometries} features had an unconvertible geometry");
        }
        log::debug!(
            "Read {} GeoJSON features with {} columns from {layer}",
            rows.len(),
            columns.len()
        );

        Ok(Self {
            layer: layer.to_string(),
            columns,
            rows,
        })
    }

    /// Loads a table from disk, choosing the reader by extension.
    ///
    /// # Errors
    ///
    /// * [`IoError::UnsupportedFormat`] if the extension is unknown
    /// * [`IoError::Io`] if the file cannot be opened
    /// * [`IoError::Csv`] or [`IoError::GeoJson`] if the content is invalid
    pub fn load(path: &Path, dialect: &CsvDialect) -> Result<Self, IoError> {
        let layer = path.display().to_string();
        let io_err = |source| IoError::Io {
            path: layer.clone(),
            source,
        };

        let table = match TableFormat::from_path(path)? {
            TableFormat::Csv => {
                let file = std::fs::File::open(path).map_err(io_err)?;
                Self::from_csv_reader(std::io::BufReader::new(file), &layer, dialect)?
            }
            TableFormat::GeoJson => {
                let text = std::fs::read_to_string(path).map_err(io_err)?;
                Self::from_geojson_str(&text, &layer)?
            }
        };

        log::info!("Loaded {} rows from {layer}", table.rows.len());
        Ok(table)
    }
}

fn csv_cell(bytes: &[u8]) -> RawValue {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.trim().is_empty() => RawValue::Null,
        Ok(s) => RawValue::Text(s.to_string()),
        Err(_) => RawValue::Unreadable,
    }
}

fn json_cell(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Text(b.to_string()),
        Value::Number(n) => n.as_i64().map_or_else(
            || n.as_f64().map_or(RawValue::Unreadable, RawValue::Float),
            RawValue::Integer,
        ),
        Value::String(s) => RawValue::Text(s),
        Value::Array(_) | Value::Object(_) => RawValue::Unreadable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_cells_are_raw_text_or_null() {
        let data = "id;year;volume\n42;2021;1 234,5\n43;;\n";
        let dialect = CsvDialect { delimiter: ';' };
        let table = Table::from_csv_reader(data.as_bytes(), "obs", &dialect).unwrap();
        assert_eq!(table.columns, vec!["id", "year", "volume"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cell(2), RawValue::Text("1 234,5".to_string()));
        assert_eq!(table.rows[1].cell(1), RawValue::Null);
        assert_eq!(table.rows[1].cell(2), RawValue::Null);
        assert!(table.rows[0].geometry.is_none());
    }

    #[test]
    fn short_csv_rows_read_as_null() {
        let data = "a,b,c\n1\n";
        let table = Table::from_csv_reader(data.as_bytes(), "t", &CsvDialect::default()).unwrap();
        assert_eq!(table.rows[0].cell(0), RawValue::Text("1".to_string()));
        assert_eq!(table.rows[0].cell(2), RawValue::Null);
    }

    #[test]
    fn invalid_utf8_cell_is_unreadable() {
        let mut data = b"a,b\nok,".to_vec();
        data.extend_from_slice(&[0xff, 0xfe]);
        data.push(b'\n');
        let table = Table::from_csv_reader(data.as_slice(), "t", &CsvDialect::default()).unwrap();
        assert_eq!(table.rows[0].cell(0), RawValue::Text("ok".to_string()));
        assert_eq!(table.rows[0].cell(1), RawValue::Unreadable);
    }

    #[test]
    fn geojson_properties_become_typed_cells() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [1.0, 2.0] },
                    "properties": { "id": 7, "vol": 1.5, "name": "Puits", "tags": [1] }
                },
                {
                    "type": "Feature",
                    "geometry": null,
                    "properties": { "id": "8", "extra": null }
                }
            ]
        }"#;
        let table = Table::from_geojson_str(text, "obs").unwrap();
        assert_eq!(table.columns, vec!["id", "vol", "name", "tags", "extra"]);

        let first = &table.rows[0];
        assert_eq!(first.cell(0), RawValue::Integer(7));
        assert_eq!(first.cell(1), RawValue::Float(1.5));
        assert_eq!(first.cell(2), RawValue::Text("Puits".to_string()));
        assert_eq!(first.cell(3), RawValue::Unreadable);
        assert!(matches!(first.geometry, Some(Geometry::Point(_))));

        let second = &table.rows[1];
        assert_eq!(second.cell(0), RawValue::Text("8".to_string()));
        assert_eq!(second.cell(1), RawValue::Null);
        assert_eq!(second.cell(4), RawValue::Null);
        assert!(second.geometry.is_none());
    }

    #[test]
    fn invalid_geojson_is_an_error() {
        let err = Table::from_geojson_str("{ nope", "zones").unwrap_err();
        assert!(matches!(err, IoError::GeoJson { .. }));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            TableFormat::from_path(Path::new("a/b.CSV")).unwrap(),
            TableFormat::Csv
        );
        assert_eq!(
            TableFormat::from_path(Path::new("zones.geojson")).unwrap(),
            TableFormat::GeoJson
        );
        assert_eq!(
            TableFormat::from_path(Path::new("zones.json")).unwrap(),
            TableFormat::GeoJson
        );
        assert!(TableFormat::from_path(Path::new("zones.shp")).is_err());
        assert!(TableFormat::from_path(Path::new("noext")).is_err());
    }
}
