#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input adapters and result sinks.
//!
//! Reads CSV and GeoJSON layers into attribute [`table::Table`]s, maps
//! configured fields onto engine records, authorization rows and zones, and
//! writes reports back out as CSV or GeoJSON.

pub mod columns;
pub mod config;
pub mod sink;
pub mod table;

use std::path::Path;

use prelev_models::{AuthorizationEntry, Record, Zone};

pub use columns::{RecordLayer, read_authorizations, read_record_layer, read_records, read_zones};
pub use config::FieldSelectors;
pub use sink::{
    write_entity_ratios, write_entity_trends, write_zone_ratios, write_zone_trends,
    write_zone_years,
};
pub use table::{Table, TableFormat};

/// Errors that can occur while reading inputs or writing results.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// File system error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV read or write error.
    #[error("CSV error in {layer}: {source}")]
    Csv {
        /// Layer or target involved.
        layer: String,
        /// Underlying error.
        source: csv::Error,
    },

    /// The layer is not valid GeoJSON.
    #[error("GeoJSON error in {layer}: {source}")]
    GeoJson {
        /// Layer involved.
        layer: String,
        /// Underlying error.
        source: Box<geojson::Error>,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The field selector file is invalid.
    #[error("Invalid field selectors in {path}: {source}")]
    Config {
        /// Selector file.
        path: String,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// A configured field is not a column of the layer.
    #[error("{layer}: {role} field '{field}' not found")]
    MissingField {
        /// Layer involved.
        layer: String,
        /// Role the field was configured for.
        role: &'static str,
        /// Configured attribute name.
        field: String,
    },

    /// Only one of the x and y columns is configured.
    #[error("{layer}: x and y columns must be configured together")]
    IncompleteCoordinates {
        /// Layer involved.
        layer: String,
    },

    /// The CSV delimiter is not a single ASCII character.
    #[error("Invalid CSV delimiter {0:?}")]
    InvalidDelimiter(char),

    /// The file extension is neither CSV nor GeoJSON.
    #[error("Unsupported file format: {path}")]
    UnsupportedFormat {
        /// File involved.
        path: String,
    },
}

/// Loads the observation layer at `path`.
///
/// # Errors
///
/// * [`IoError`] if the file cannot be read or a configured field is missing
pub fn load_records(path: &Path, selectors: &FieldSelectors) -> Result<Vec<Record>, IoError> {
    let table = Table::load(path, &selectors.csv)?;
    read_records(&table, &selectors.records)
}

/// Loads the observation layer at `path` along with whether it carries
/// geometry.
///
/// # Errors
///
/// * [`IoError`] if the file cannot be read or a configured field is missing
pub fn load_record_layer(
    path: &Path,
    selectors: &FieldSelectors,
) -> Result<RecordLayer, IoError> {
    let table = Table::load(path, &selectors.csv)?;
    read_record_layer(&table, &selectors.records)
}

/// Loads the authorization table at `path`.
///
/// # Errors
///
/// * [`IoError`] if the file cannot be read or a configured field is missing
pub fn load_authorizations(
    path: &Path,
    selectors: &FieldSelectors,
) -> Result<Vec<AuthorizationEntry>, IoError> {
    let table = Table::load(path, &selectors.csv)?;
    read_authorizations(&table, &selectors.authorizations)
}

/// Loads the zone layer at `path`.
///
/// # Errors
///
/// * [`IoError`] if the file cannot be read or the label field is missing
pub fn load_zones(path: &Path, selectors: &FieldSelectors) -> Result<Vec<Zone>, IoError> {
    let table = Table::load(path, &selectors.csv)?;
    read_zones(&table, &selectors.zones)
}
