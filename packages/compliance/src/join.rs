//! Observed vs authorized join.

use std::collections::BTreeMap;

use prelev_models::{MatchStatus, RatioResult};

use crate::index::AuthorizationIndex;

/// Ratio fields derived from an observed and an authorized volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioFields {
    /// `observed / authorized`.
    pub ratio: Option<f64>,
    /// False when the authorized volume is absent or exactly zero.
    pub possible: bool,
    /// `100 × (observed − authorized) / authorized`.
    pub percent_overrun: Option<f64>,
}

impl RatioFields {
    /// Computes the ratio. Only an absent or exactly zero authorized
    /// volume makes it impossible; tiny volumes yield large ratios.
    #[must_use]
    pub fn compute(observed: f64, authorized: Option<f64>) -> Self {
        match authorized {
            Some(authorized) if authorized != 0.0 => Self {
                ratio: Some(observed / authorized),
                possible: true,
                percent_overrun: Some(100.0 * (observed - authorized) / authorized),
            },
            _ => Self {
                ratio: None,
                possible: false,
                percent_overrun: None,
            },
        }
    }
}

/// Joins observed sums against the authorization index.
///
/// Every entity of `observed` yields a row, including zero sums, except
/// unmatched entities when `include_unmatched` is false: those are left
/// out entirely.
#[must_use]
pub fn join(
    observed: &BTreeMap<String, f64>,
    index: &AuthorizationIndex,
    include_unmatched: bool,
) -> Vec<RatioResult> {
    observed
        .iter()
        .filter_map(|(entity_id, observed_sum)| {
            let Some(entry) = index.get(entity_id) else {
                return include_unmatched.then(|| RatioResult {
                    entity_id: entity_id.clone(),
                    observed_sum: *observed_sum,
                    authorized_volume: None,
                    reference_ids_concat: None,
                    ratio: None,
                    ratio_possible: false,
                    percent_overrun: None,
                    match_status: MatchStatus::Unmatched,
                });
            };

            let authorized_volume = entry.volume();
            let fields = RatioFields::compute(*observed_sum, authorized_volume);
            Some(RatioResult {
                entity_id: entity_id.clone(),
                observed_sum: *observed_sum,
                authorized_volume,
                reference_ids_concat: entry.reference_ids_concat(),
                ratio: fields.ratio,
                ratio_possible: fields.possible,
                percent_overrun: fields.percent_overrun,
                match_status: MatchStatus::Matched,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prelev_models::AuthorizationEntry;

    fn observed(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn index() -> AuthorizationIndex {
        AuthorizationIndex::build(&[
            AuthorizationEntry::new("X", "100", "R-X"),
            AuthorizationEntry::new("Y", "0", "R-Y"),
            AuthorizationEntry::new("T", "0,001", ""),
            AuthorizationEntry::new("N", "n/a", "R-N"),
        ])
    }

    #[test]
    fn computes_ratio_and_overrun() {
        let rows = join(&observed(&[("X", 120.0)]), &index(), false);
        let x = &rows[0];
        assert!((x.ratio.unwrap() - 1.2).abs() < 1e-12);
        assert!((x.percent_overrun.unwrap() - 20.0).abs() < 1e-9);
        assert!(x.ratio_possible);
        assert_eq!(x.match_status, MatchStatus::Matched);
        assert_eq!(x.reference_ids_concat.as_deref(), Some("R-X"));
    }

    #[test]
    fn zero_authorized_volume_is_not_computable() {
        let rows = join(&observed(&[("Y", 50.0)]), &index(), false);
        let y = &rows[0];
        assert!(!y.ratio_possible);
        assert_eq!(y.ratio, None);
        assert_eq!(y.percent_overrun, None);
        assert_eq!(y.authorized_volume, Some(0.0));
    }

    #[test]
    fn tiny_authorized_volume_still_yields_a_ratio() {
        let rows = join(&observed(&[("T", 10.0)]), &index(), false);
        assert!(rows[0].ratio_possible);
        assert!((rows[0].ratio.unwrap() - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn matched_without_parsable_volume() {
        let rows = join(&observed(&[("N", 10.0)]), &index(), false);
        assert_eq!(rows[0].match_status, MatchStatus::Matched);
        assert_eq!(rows[0].authorized_volume, None);
        assert!(!rows[0].ratio_possible);
    }

    #[test]
    fn unmatched_rows_are_optional() {
        let obs = observed(&[("X", 1.0), ("ghost", 0.0)]);
        let without = join(&obs, &index(), false);
        assert_eq!(without.len(), 1);

        let with = join(&obs, &index(), true);
        assert_eq!(with.len(), 2);
        let ghost = with.iter().find(|r| r.entity_id == "ghost").unwrap();
        assert_eq!(ghost.match_status, MatchStatus::Unmatched);
        assert_eq!(ghost.authorized_volume, None);
        assert!(!ghost.ratio_possible);
    }
}
