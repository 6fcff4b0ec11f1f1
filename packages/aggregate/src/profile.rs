//! Descriptive attributes carried from raw records to per-entity outputs.

use std::collections::{BTreeMap, BTreeSet};

use geo::Geometry;

/// Best-known descriptive attributes of one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityProfile {
    first_location: Option<Geometry<f64>>,
    locations_by_year: BTreeMap<i32, Geometry<f64>>,
    name: Option<Dated<String>>,
    contact: Option<Dated<String>>,
    categories: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct Dated<T> {
    year: i32,
    value: T,
}

/// Replaces the stored value when `year` is at least as recent.
fn keep_most_recent(slot: &mut Option<Dated<String>>, year: i32, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    if slot.as_ref().is_none_or(|stored| year >= stored.year) {
        *slot = Some(Dated { year, value });
    }
}

impl EntityProfile {
    /// Folds one kept record's attributes into the profile.
    pub fn observe(
        &mut self,
        year: i32,
        location: Option<&Geometry<f64>>,
        name: Option<String>,
        contact: Option<String>,
        category: Option<String>,
    ) {
        if let Some(location) = location {
            if self.first_location.is_none() {
                self.first_location = Some(location.clone());
            }
            self.locations_by_year
                .entry(year)
                .or_insert_with(|| location.clone());
        }
        keep_most_recent(&mut self.name, year, name);
        keep_most_recent(&mut self.contact, year, contact);
        if let Some(category) = category {
            self.categories.insert(category);
        }
    }

    /// First non-empty geometry seen for the entity, in input order.
    #[must_use]
    pub const fn first_location(&self) -> Option<&Geometry<f64>> {
        self.first_location.as_ref()
    }

    /// First geometry seen in the most recent year that had one.
    #[must_use]
    pub fn latest_location(&self) -> Option<(i32, &Geometry<f64>)> {
        self.locations_by_year
            .last_key_value()
            .map(|(year, geom)| (*year, geom))
    }

    /// First geometry seen in `year`.
    #[must_use]
    pub fn location_in(&self, year: i32) -> Option<&Geometry<f64>> {
        self.locations_by_year.get(&year)
    }

    /// Display name from the most recent year that carried one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|d| d.value.as_str())
    }

    /// Contact label from the most recent year that carried one.
    #[must_use]
    pub fn contact(&self) -> Option<&str> {
        self.contact.as_ref().map(|d| d.value.as_str())
    }

    /// Every distinct category label, sorted.
    #[must_use]
    pub const fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Categories joined with `;`, absent when there are none.
    #[must_use]
    pub fn categories_concat(&self) -> Option<String> {
        if self.categories.is_empty() {
            return None;
        }
        Some(self.categories.iter().map(String::as_str).collect::<Vec<_>>().join(";"))
    }
}
