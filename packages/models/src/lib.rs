#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for withdrawal analytics.
//!
//! Raw inputs ([`Record`], [`AuthorizationEntry`], [`Zone`]) are produced by
//! input adapters and consumed read-only by the engine. Derived results
//! ([`SlopeResult`], [`RatioResult`], [`ZoneRollup`]) are rebuilt from
//! scratch on every invocation.

pub mod progress;

use geo::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Label of the aggregate collecting entities that match no zone.
pub const UNASSIGNED_LABEL: &str = "UNASSIGNED";

/// Default minimum number of valid years before a slope is estimated.
pub const DEFAULT_MIN_YEARS: usize = 4;

/// A single attribute value as read from an input source.
///
/// Adapters map their native cell types onto this enum once; the engine
/// decides per field whether a value is usable, defaulted or dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    /// The attribute is empty or explicitly null.
    #[default]
    Null,
    /// An integer cell.
    Integer(i64),
    /// A floating point cell.
    Float(f64),
    /// A text cell, untrimmed.
    Text(String),
    /// The attribute exists but could not be read (unsupported type,
    /// malformed cell).
    Unreadable,
}

impl RawValue {
    /// Returns the value as a trimmed, non-empty string.
    ///
    /// Numbers are rendered with their shortest display form, so an
    /// identifier stored as `42.0` reads back as `"42"`.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Self::Null | Self::Unreadable => return None,
            Self::Integer(i) => i.to_string(),
            Self::Float(f) if f.is_finite() => f.to_string(),
            Self::Float(_) => return None,
            Self::Text(s) => s.trim().to_string(),
        };
        if text.is_empty() { None } else { Some(text) }
    }

    /// Whether the adapter could not read this attribute.
    #[must_use]
    pub const fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One raw yearly observation for a withdrawal point.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// Entity identifier; records without one are dropped.
    pub entity_id: RawValue,
    /// Year of the observation; records without a parsable year are dropped.
    pub year: RawValue,
    /// Observed volume; unparsable values count as zero but not as valid.
    pub value: RawValue,
    /// Point or area geometry of the withdrawal point.
    pub location: Option<Geometry<f64>>,
    /// Display name of the entity.
    pub name: RawValue,
    /// Owner or contact label.
    pub contact: RawValue,
    /// Category label (e.g. the withdrawn medium).
    pub category: RawValue,
}

impl Record {
    /// Creates a record with the three required attributes.
    #[must_use]
    pub fn new(
        entity_id: impl Into<RawValue>,
        year: impl Into<RawValue>,
        value: impl Into<RawValue>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            year: year.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Attaches a geometry.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<Geometry<f64>>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attaches a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<RawValue>) -> Self {
        self.name = name.into();
        self
    }

    /// Attaches a contact label.
    #[must_use]
    pub fn with_contact(mut self, contact: impl Into<RawValue>) -> Self {
        self.contact = contact.into();
        self
    }

    /// Attaches a category label.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<RawValue>) -> Self {
        self.category = category.into();
        self
    }
}

/// One row of the authorization table.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationEntry {
    /// Entity identifier used for the join.
    pub entity_id: RawValue,
    /// Authorized volume, parsed leniently.
    pub authorized_volume: RawValue,
    /// Administrative reference identifier.
    pub reference_id: RawValue,
}

impl AuthorizationEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(
        entity_id: impl Into<RawValue>,
        authorized_volume: impl Into<RawValue>,
        reference_id: impl Into<RawValue>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            authorized_volume: authorized_volume.into(),
            reference_id: reference_id.into(),
        }
    }
}

/// A labelled polygonal zone. The label is the zone's identity.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Zone label, also used as the output key.
    pub label: String,
    /// Zone boundary.
    pub geometry: MultiPolygon<f64>,
}

impl Zone {
    /// Creates a zone from anything convertible into a multipolygon.
    #[must_use]
    pub fn new(label: impl Into<String>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            label: label.into(),
            geometry: geometry.into(),
        }
    }
}

/// Inclusive year interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    /// First year kept.
    pub start: i32,
    /// Last year kept.
    pub end: i32,
}

impl YearRange {
    /// Creates a range from its bounds.
    #[must_use]
    pub const fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Whether `year` falls inside the range.
    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }
}

/// Slope estimation method.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SlopeMethod {
    /// Ordinary least squares.
    #[default]
    Ols,
    /// Median of pairwise slopes.
    TheilSen,
}

/// Implementation used for the Theil–Sen median.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum TheilSenStrategy {
    /// Sorts every pairwise slope. Reference semantics.
    Pairwise,
    /// Selects the middle order statistics without a full sort.
    #[default]
    Selection,
}

/// Trend metrics for one key (entity or zone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeResult {
    /// Volume change per year, absent below the minimum-years gate.
    pub slope: Option<f64>,
    /// Years with at least one valid value.
    pub n_years: usize,
    /// Mean of the valid yearly totals.
    pub mean_value: Option<f64>,
    /// Mean of the first (up to) three valid yearly totals.
    pub first_period_mean: Option<f64>,
    /// Mean of the last (up to) three valid yearly totals.
    pub last_period_mean: Option<f64>,
    /// `100 × slope / mean_value`.
    pub slope_pct_of_mean: Option<f64>,
    /// `100 × slope / first_period_mean`.
    pub slope_pct_of_first: Option<f64>,
    /// Compound annual growth rate between the first and last periods, in percent.
    pub cagr_pct: Option<f64>,
    /// Z-score of `slope_pct_of_mean` across every key of the run.
    pub slope_z: Option<f64>,
}

impl SlopeResult {
    /// A result for a key without any valid year.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            slope: None,
            n_years: 0,
            mean_value: None,
            first_period_mean: None,
            last_period_mean: None,
            slope_pct_of_mean: None,
            slope_pct_of_first: None,
            cagr_pct: None,
            slope_z: None,
        }
    }
}

/// Whether an entity was found in the authorization index.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    /// At least one authorization row exists for the entity.
    Matched,
    /// No authorization row exists for the entity.
    Unmatched,
}

/// Observed vs authorized comparison for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioResult {
    /// Entity identifier.
    pub entity_id: String,
    /// Summed observed volume for the compared year.
    pub observed_sum: f64,
    /// Maximum authorized volume, absent if unmatched or unparsable.
    pub authorized_volume: Option<f64>,
    /// Sorted, semicolon-joined reference identifiers.
    pub reference_ids_concat: Option<String>,
    /// `observed_sum / authorized_volume`.
    pub ratio: Option<f64>,
    /// False whenever the authorized volume is absent or exactly zero.
    pub ratio_possible: bool,
    /// `100 × (observed − authorized) / authorized`.
    pub percent_overrun: Option<f64>,
    /// Join outcome.
    pub match_status: MatchStatus,
}

/// Observed vs authorized totals for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRollup {
    /// Zone label, or [`UNASSIGNED_LABEL`].
    pub label: String,
    /// Sum of observed volumes of the entities assigned to the zone.
    pub observed_sum: f64,
    /// Sum of authorized volumes, absent if no assigned entity has one.
    pub authorized_sum: Option<f64>,
    /// `observed_sum / authorized_sum`.
    pub ratio: Option<f64>,
    /// False when the authorized sum is absent or zero.
    pub ratio_possible: bool,
    /// `100 × ratio`.
    pub percent_of_authorized: Option<f64>,
    /// `100 × (observed − authorized) / authorized`.
    pub percent_overrun: Option<f64>,
    /// Number of entities assigned to the zone.
    pub entity_count: usize,
}
