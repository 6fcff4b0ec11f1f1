//! Per-entity index over the authorization table.

use std::collections::{BTreeMap, BTreeSet};

use prelev_models::AuthorizationEntry;
use prelev_parsing::parse_number;

/// Collapsed authorization rows of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationIndexEntry {
    /// Largest parsed volume, `NaN` while no row had a parsable volume.
    pub volume_max: f64,
    /// Distinct non-empty reference identifiers.
    pub reference_ids: BTreeSet<String>,
}

impl Default for AuthorizationIndexEntry {
    fn default() -> Self {
        Self {
            volume_max: f64::NAN,
            reference_ids: BTreeSet::new(),
        }
    }
}

impl AuthorizationIndexEntry {
    fn absorb(&mut self, volume: f64, reference_id: Option<String>) {
        if !volume.is_nan() && (self.volume_max.is_nan() || volume > self.volume_max) {
            self.volume_max = volume;
        }
        if let Some(reference_id) = reference_id {
            self.reference_ids.insert(reference_id);
        }
    }

    /// The authorized volume, absent when no row had a parsable volume.
    #[must_use]
    pub fn volume(&self) -> Option<f64> {
        (!self.volume_max.is_nan()).then_some(self.volume_max)
    }

    /// Reference identifiers sorted and joined with `;`.
    #[must_use]
    pub fn reference_ids_concat(&self) -> Option<String> {
        if self.reference_ids.is_empty() {
            return None;
        }
        Some(
            self.reference_ids
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
        )
    }
}

/// Authorization rows grouped by entity id.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationIndex {
    entries: BTreeMap<String, AuthorizationIndexEntry>,
}

impl AuthorizationIndex {
    /// Groups rows by trimmed entity id, keeping the maximum volume and
    /// the union of reference ids. Rows without an entity id are skipped.
    ///
    /// The result does not depend on row order.
    #[must_use]
    pub fn build<'a>(rows: impl IntoIterator<Item = &'a AuthorizationEntry>) -> Self {
        let mut entries: BTreeMap<String, AuthorizationIndexEntry> = BTreeMap::new();
        let mut read = 0_usize;
        let mut skipped = 0_usize;

        for row in rows {
            read += 1;
            let Some(entity_id) = row.entity_id.as_text() else {
                skipped += 1;
                continue;
            };
            entries
                .entry(entity_id)
                .or_default()
                .absorb(parse_number(&row.authorized_volume), row.reference_id.as_text());
        }

        log::info!(
            "Authorization index: {} keys from {read} rows ({skipped} without entity id)",
            entries.len()
        );

        Self { entries }
    }

    /// The collapsed entry of one entity.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<&AuthorizationIndexEntry> {
        self.entries.get(entity_id)
    }

    /// Number of distinct entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
