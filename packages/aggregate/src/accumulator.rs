//! Key × year accumulation and the per-key time series derived from it.

use std::collections::BTreeMap;

/// Running total for one (key, year) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YearCell {
    /// Sum of parsed values; unparsable values contribute zero.
    pub sum: f64,
    /// Number of values that parsed to a number.
    pub valid: usize,
}

impl YearCell {
    /// Adds one parsed value. `NaN` adds nothing to the sum and is not
    /// counted.
    pub fn add(&mut self, value: f64) {
        if !value.is_nan() {
            self.sum += value;
            self.valid += 1;
        }
    }

    /// Folds another cell into this one.
    pub fn merge(&mut self, other: Self) {
        self.sum += other.sum;
        self.valid += other.valid;
    }

    /// Whether at least one valid value reached this cell.
    #[must_use]
    pub const fn has_valid(&self) -> bool {
        self.valid > 0
    }
}

/// Sums and valid-value counts keyed by `(key, year)`.
///
/// Keys are compared structurally, so the same accumulator serves entity
/// ids, zone labels or composite tuples.
#[derive(Debug, Clone)]
pub struct YearAccumulator<K> {
    cells: BTreeMap<K, BTreeMap<i32, YearCell>>,
}

impl<K> Default for YearAccumulator<K> {
    fn default() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> YearAccumulator<K> {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parsed value to the `(key, year)` cell, creating it if
    /// needed. The cell exists afterwards even when `value` is `NaN`.
    pub fn add(&mut self, key: K, year: i32, value: f64) {
        self.cell_mut(key, year).add(value);
    }

    /// Folds a whole cell into `(key, year)`.
    pub fn add_cell(&mut self, key: K, year: i32, cell: YearCell) {
        self.cell_mut(key, year).merge(cell);
    }

    fn cell_mut(&mut self, key: K, year: i32) -> &mut YearCell {
        self.cells.entry(key).or_default().entry(year).or_default()
    }

    /// The `(key, year)` cell, if any record reached it.
    #[must_use]
    pub fn get(&self, key: &K, year: i32) -> Option<YearCell> {
        self.cells.get(key)?.get(&year).copied()
    }

    /// Every cell of one key, ascending by year.
    pub fn years_of(&self, key: &K) -> impl Iterator<Item = (i32, YearCell)> + '_ {
        self.cells
            .get(key)
            .into_iter()
            .flat_map(|years| years.iter().map(|(y, c)| (*y, *c)))
    }

    /// Every key, in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.cells.keys()
    }

    /// Every `(key, year, cell)` triple, ordered by key then year.
    pub fn iter(&self) -> impl Iterator<Item = (&K, i32, YearCell)> {
        self.cells
            .iter()
            .flat_map(|(k, years)| years.iter().map(move |(y, c)| (k, *y, *c)))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Time series of one key. Empty if the key is unknown.
    #[must_use]
    pub fn series(&self, key: &K) -> TimeSeries {
        TimeSeries::from_cells(self.years_of(key))
    }

    /// Time series of every key.
    #[must_use]
    pub fn all_series(&self) -> BTreeMap<K, TimeSeries> {
        self.cells
            .iter()
            .map(|(k, years)| {
                let series = TimeSeries::from_cells(years.iter().map(|(y, c)| (*y, *c)));
                (k.clone(), series)
            })
            .collect()
    }
}

/// Yearly totals for one key, strictly increasing by year.
///
/// A year whose records all failed to parse is kept with a `NaN` total so
/// it does not count as an observed year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    points: Vec<(i32, f64)>,
}

impl TimeSeries {
    /// Builds a series from cells in ascending year order.
    pub fn from_cells(cells: impl IntoIterator<Item = (i32, YearCell)>) -> Self {
        let points = cells
            .into_iter()
            .map(|(year, cell)| (year, if cell.has_valid() { cell.sum } else { f64::NAN }))
            .collect();
        Self { points }
    }

    /// Builds a series from `(year, total)` pairs. Pairs are sorted by
    /// year; a repeated year keeps its first total.
    #[must_use]
    pub fn from_points(mut points: Vec<(i32, f64)>) -> Self {
        points.sort_by_key(|(year, _)| *year);
        points.dedup_by_key(|(year, _)| *year);
        Self { points }
    }

    /// Every point, including years with a `NaN` total.
    #[must_use]
    pub fn points(&self) -> &[(i32, f64)] {
        &self.points
    }

    /// Points with a numeric total, ascending by year.
    #[must_use]
    pub fn valid_points(&self) -> Vec<(i32, f64)> {
        self.points.iter().copied().filter(|(_, v)| !v.is_nan()).collect()
    }

    /// Number of years with a numeric total.
    #[must_use]
    pub fn n_valid(&self) -> usize {
        self.points.iter().filter(|(_, v)| !v.is_nan()).count()
    }

    /// Whether the series has no point at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
