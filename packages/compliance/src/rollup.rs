//! Zonal rollup of joined entity results.

use std::collections::BTreeMap;

use geo::{Geometry, MultiPolygon};
use prelev_models::progress::{Cancelled, RunContext};
use prelev_models::{MatchStatus, RatioResult, UNASSIGNED_LABEL, ZoneRollup};
use prelev_spatial::ZoneIndex;

use crate::join::RatioFields;

/// One rollup row with the geometry it is written with.
#[derive(Debug, Clone)]
pub struct ZoneRatioRow {
    /// Zone totals.
    pub rollup: ZoneRollup,
    /// Zone polygon, absent for the unassigned row.
    pub geometry: Option<MultiPolygon<f64>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ZoneTotals {
    observed: f64,
    authorized: Option<f64>,
    count: usize,
}

impl ZoneTotals {
    fn add(&mut self, result: &RatioResult) {
        self.observed += result.observed_sum;
        if let Some(authorized) = result.authorized_volume {
            *self.authorized.get_or_insert(0.0) += authorized;
        }
        self.count += 1;
    }

    fn is_default(&self) -> bool {
        self.count == 0 && self.observed == 0.0 && self.authorized.is_none()
    }

    fn into_rollup(self, label: String) -> ZoneRollup {
        let fields = RatioFields::compute(self.observed, self.authorized);
        ZoneRollup {
            label,
            observed_sum: self.observed,
            authorized_sum: self.authorized,
            ratio: fields.ratio,
            ratio_possible: fields.possible,
            percent_of_authorized: fields.ratio.map(|r| 100.0 * r),
            percent_overrun: fields.percent_overrun,
            entity_count: self.count,
        }
    }
}

/// Sums matched entity results per zone.
///
/// Each entity is added to every zone its geometry intersects. Entities
/// without geometry or outside every zone go to [`UNASSIGNED_LABEL`].
/// Unmatched entities are ignored. The output has one row per input zone,
/// in input order, followed by the unassigned row when it has content.
///
/// # Errors
///
/// * [`Cancelled`] if the run context was cancelled
pub fn rollup<'a>(
    entities: impl IntoIterator<Item = (&'a RatioResult, Option<&'a Geometry<f64>>)>,
    zones: &ZoneIndex,
    ctx: &RunContext,
) -> Result<Vec<ZoneRatioRow>, Cancelled> {
    let mut totals: BTreeMap<&str, ZoneTotals> = BTreeMap::new();
    let mut unassigned = ZoneTotals::default();

    for (result, geometry) in entities {
        ctx.step()?;
        if result.match_status != MatchStatus::Matched {
            continue;
        }

        let labels = zones.assign(geometry);
        if labels.is_empty() {
            unassigned.add(result);
            continue;
        }
        for label in labels {
            totals.entry(label).or_default().add(result);
        }
    }

    let mut rows: Vec<ZoneRatioRow> = zones
        .zones()
        .iter()
        .map(|zone| ZoneRatioRow {
            rollup: totals
                .get(zone.label.as_str())
                .copied()
                .unwrap_or_default()
                .into_rollup(zone.label.clone()),
            geometry: Some(zone.geometry.clone()),
        })
        .collect();

    log::info!(
        "Zonal rollup: {} zones, {} with entities, {} entities unassigned",
        rows.len(),
        totals.len(),
        unassigned.count
    );

    if !unassigned.is_default() {
        rows.push(ZoneRatioRow {
            rollup: unassigned.into_rollup(UNASSIGNED_LABEL.to_string()),
            geometry: None,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Point, polygon};
    use prelev_models::Zone;

    fn zones() -> ZoneIndex {
        let square = |label: &str, x0: f64| {
            Zone::new(
                label,
                polygon![
                    (x: x0, y: 0.0),
                    (x: x0 + 10.0, y: 0.0),
                    (x: x0 + 10.0, y: 10.0),
                    (x: x0, y: 10.0),
                    (x: x0, y: 0.0),
                ],
            )
        };
        ZoneIndex::new(vec![square("A", 0.0), square("B", 5.0), square("C", 50.0)])
    }

    fn matched(id: &str, observed: f64, authorized: Option<f64>) -> RatioResult {
        let fields = RatioFields::compute(observed, authorized);
        RatioResult {
            entity_id: id.to_string(),
            observed_sum: observed,
            authorized_volume: authorized,
            reference_ids_concat: None,
            ratio: fields.ratio,
            ratio_possible: fields.possible,
            percent_overrun: fields.percent_overrun,
            match_status: MatchStatus::Matched,
        }
    }

    fn pt(x: f64) -> Geometry<f64> {
        Geometry::Point(Point::new(x, 1.0))
    }

    fn by_label<'a>(rows: &'a [ZoneRatioRow], label: &str) -> &'a ZoneRollup {
        &rows.iter().find(|r| r.rollup.label == label).unwrap().rollup
    }

    #[test]
    fn entity_in_two_zones_counts_in_both() {
        let z = matched("Z", 10.0, Some(8.0));
        let g = pt(7.0);
        let rows = rollup([(&z, Some(&g))], &zones(), &RunContext::new()).unwrap();

        for label in ["A", "B"] {
            let r = by_label(&rows, label);
            assert!((r.observed_sum - 10.0).abs() < f64::EPSILON);
            assert_eq!(r.entity_count, 1);
            assert_eq!(r.authorized_sum, Some(8.0));
            assert!((r.percent_of_authorized.unwrap() - 125.0).abs() < 1e-9);
            assert!((r.percent_overrun.unwrap() - 25.0).abs() < 1e-9);
        }
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.rollup.label != UNASSIGNED_LABEL));
    }

    #[test]
    fn entity_outside_zones_goes_to_unassigned_only() {
        let z = matched("Z", 10.0, None);
        let g = pt(500.0);
        let rows = rollup([(&z, Some(&g))], &zones(), &RunContext::new()).unwrap();

        let un = rows.last().unwrap();
        assert_eq!(un.rollup.label, UNASSIGNED_LABEL);
        assert!(un.geometry.is_none());
        assert!((un.rollup.observed_sum - 10.0).abs() < f64::EPSILON);
        assert_eq!(un.rollup.authorized_sum, None);
        assert!(!un.rollup.ratio_possible);
        assert!(by_label(&rows, "A").observed_sum.abs() < f64::EPSILON);
    }

    #[test]
    fn missing_geometry_is_unassigned() {
        let z = matched("Z", 3.0, Some(3.0));
        let rows = rollup([(&z, None)], &zones(), &RunContext::new()).unwrap();
        let un = by_label(&rows, UNASSIGNED_LABEL);
        assert_eq!(un.entity_count, 1);
        assert!((un.ratio.unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_zones_are_kept_with_default_totals() {
        let z = matched("Z", 10.0, Some(10.0));
        let g = pt(1.0);
        let rows = rollup([(&z, Some(&g))], &zones(), &RunContext::new()).unwrap();
        let c = by_label(&rows, "C");
        assert_eq!(c.entity_count, 0);
        assert_eq!(c.authorized_sum, None);
        assert!(!c.ratio_possible);
        assert!(rows[2].geometry.is_some());
    }

    #[test]
    fn authorized_sum_skips_entities_without_volume() {
        let a = matched("a", 10.0, Some(4.0));
        let b = matched("b", 6.0, None);
        let g = pt(1.0);
        let rows = rollup([(&a, Some(&g)), (&b, Some(&g))], &zones(), &RunContext::new()).unwrap();
        let zone_a = by_label(&rows, "A");
        assert!((zone_a.observed_sum - 16.0).abs() < f64::EPSILON);
        assert_eq!(zone_a.authorized_sum, Some(4.0));
        assert!((zone_a.ratio.unwrap() - 4.0).abs() < f64::EPSILON);
        assert_eq!(zone_a.entity_count, 2);
    }

    #[test]
    fn unmatched_entities_never_roll_up() {
        let mut u = matched("u", 10.0, None);
        u.match_status = MatchStatus::Unmatched;
        let g = pt(1.0);
        let rows = rollup([(&u, Some(&g))], &zones(), &RunContext::new()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(by_label(&rows, "A").entity_count, 0);
    }
}
