//! Field selectors mapping input attributes to engine roles.
//!
//! Loaded from an optional TOML file:
//!
//! ```toml
//! [records]
//! entity_id = "ouvrage_id"
//! year = "annee"
//! value = "volume"
//! name = "nom_ouvrage"
//!
//! [authorizations]
//! entity_id = "ouvrage_id"
//! volume = "volume_autorise"
//! reference_id = "ddtm"
//!
//! [zones]
//! label = "nom_bv"
//!
//! [csv]
//! delimiter = ";"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::IoError;

/// Attribute names of the observation layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecordFields {
    /// Entity identifier.
    pub entity_id: String,
    /// Observation year.
    pub year: String,
    /// Observed volume.
    pub value: String,
    /// Display name.
    pub name: Option<String>,
    /// Contact or owner label.
    pub contact: Option<String>,
    /// Category label.
    pub category: Option<String>,
    /// X coordinate column, for tables without geometry.
    pub x: Option<String>,
    /// Y coordinate column, for tables without geometry.
    pub y: Option<String>,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self {
            entity_id: "entity_id".to_string(),
            year: "year".to_string(),
            value: "value".to_string(),
            name: None,
            contact: None,
            category: None,
            x: None,
            y: None,
        }
    }
}

/// Attribute names of the authorization table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthorizationFields {
    /// Entity identifier used for the join.
    pub entity_id: String,
    /// Authorized volume.
    pub volume: String,
    /// Administrative reference identifier.
    pub reference_id: Option<String>,
}

impl Default for AuthorizationFields {
    fn default() -> Self {
        Self {
            entity_id: "entity_id".to_string(),
            volume: "authorized_volume".to_string(),
            reference_id: None,
        }
    }
}

/// Attribute names of the zone layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ZoneFields {
    /// Zone label.
    pub label: String,
}

impl Default for ZoneFields {
    fn default() -> Self {
        Self {
            label: "label".to_string(),
        }
    }
}

/// CSV dialect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CsvDialect {
    /// Field delimiter, a single ASCII character.
    pub delimiter: char,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl CsvDialect {
    /// The delimiter as a byte.
    ///
    /// # Errors
    ///
    /// * [`IoError::InvalidDelimiter`] if the delimiter is not ASCII
    pub fn delimiter_byte(&self) -> Result<u8, IoError> {
        if self.delimiter.is_ascii() {
            u8::try_from(self.delimiter).map_err(|_| IoError::InvalidDelimiter(self.delimiter))
        } else {
            Err(IoError::InvalidDelimiter(self.delimiter))
        }
    }
}

/// Every field selector, with defaults for omitted entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldSelectors {
    /// Observation layer fields.
    pub records: RecordFields,
    /// Authorization table fields.
    pub authorizations: AuthorizationFields,
    /// Zone layer fields.
    pub zones: ZoneFields,
    /// CSV dialect for every CSV input.
    pub csv: CsvDialect,
}

impl FieldSelectors {
    /// Parses selectors from TOML text.
    ///
    /// # Errors
    ///
    /// * [`IoError::Config`] if the text is not valid selector TOML
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, IoError> {
        toml::de::from_str(text).map_err(|e| IoError::Config {
            path: origin.to_string(),
            source: e,
        })
    }

    /// Loads selectors from a TOML file.
    ///
    /// # Errors
    ///
    /// * [`IoError::Io`] if the file cannot be read
    /// * [`IoError::Config`] if the file is not valid selector TOML
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let text = std::fs::read_to_string(path).map_err(|e| IoError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&text, &path.display().to_string())
    }
}
