use geo::{Point, polygon};
use prelev_compliance::{AuthorizationIndex, RatioOptions, entity_ratio_report, zone_ratio_report};
use prelev_models::progress::RunContext;
use prelev_models::{AuthorizationEntry, MatchStatus, Record, UNASSIGNED_LABEL, Zone};
use prelev_spatial::ZoneIndex;

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
    ZoneIndex::new(vec![square("A", 0.0), square("B", 5.0)])
}

#[test]
fn authorization_index_collapses_collisions() {
    let rows = vec![
        AuthorizationEntry::new("42", "80", "DDTM-1"),
        AuthorizationEntry::new("42", "95", "DDTM-2"),
    ];
    let index = AuthorizationIndex::build(&rows);
    let entry = index.get("42").unwrap();
    assert_eq!(entry.volume(), Some(95.0));
    assert_eq!(entry.reference_ids_concat().as_deref(), Some("DDTM-1;DDTM-2"));
}

#[test]
fn zone_rollup_multi_assigns_and_collects_unassigned() {
    let records = vec![
        Record::new("Z", 2023, "6").with_location(Point::new(7.0, 5.0)),
        Record::new("Z", 2023, "4").with_location(Point::new(70.0, 5.0)),
        Record::new("far", 2023, "1 000").with_location(Point::new(90.0, 5.0)),
        Record::new("nogeo", 2023, "3"),
        Record::new("stranger", 2023, "999").with_location(Point::new(1.0, 1.0)),
        Record::new("Z", 2022, "500").with_location(Point::new(1.0, 1.0)),
    ];
    let auths = vec![
        AuthorizationEntry::new("Z", "8", "R-Z"),
        AuthorizationEntry::new("far", "0", "R-F"),
        AuthorizationEntry::new("nogeo", "2", ""),
    ];

    let report = zone_ratio_report(
        &records,
        &auths,
        &zones(),
        &RatioOptions::default(),
        &RunContext::new(),
    )
    .unwrap();

    assert_eq!(report.year, 2023);
    assert_eq!(report.matched, 3);
    assert_eq!(report.unmatched, 1);

    let labels: Vec<&str> = report.rows.iter().map(|r| r.rollup.label.as_str()).collect();
    assert_eq!(labels, vec!["A", "B", UNASSIGNED_LABEL]);

    // Z's first 2023 geometry is (7, 5), inside both A and B.
    for row in &report.rows[..2] {
        assert!((row.rollup.observed_sum - 10.0).abs() < 1e-9);
        assert_eq!(row.rollup.entity_count, 1);
        assert!((row.rollup.ratio.unwrap() - 1.25).abs() < 1e-12);
    }

    let unassigned = &report.rows[2];
    assert!(unassigned.geometry.is_none());
    assert_eq!(unassigned.rollup.entity_count, 2);
    assert!((unassigned.rollup.observed_sum - 1_003.0).abs() < 1e-9);
    assert_eq!(unassigned.rollup.authorized_sum, Some(2.0));
}

#[test]
fn flat_report_keeps_unmatched_when_asked() {
    let records = vec![
        Record::new("X", 2020, "120").with_location(Point::new(1.0, 1.0)),
        Record::new("Y", 2020, "50").with_location(Point::new(1.0, 1.0)),
        Record::new("W", 2020, "7").with_location(Point::new(1.0, 1.0)),
    ];
    let auths = vec![
        AuthorizationEntry::new("X", "100", "R-X"),
        AuthorizationEntry::new("Y", "0", "R-Y"),
    ];
    let report = entity_ratio_report(
        &records,
        &auths,
        Some(&zones()),
        &RatioOptions::default(),
        &RunContext::new(),
    )
    .unwrap();

    let find = |id: &str| {
        &report
            .rows
            .iter()
            .find(|r| r.result.entity_id == id)
            .unwrap()
            .result
    };
    let x = find("X");
    assert!((x.ratio.unwrap() - 1.2).abs() < 1e-12);
    assert!((x.percent_overrun.unwrap() - 20.0).abs() < 1e-9);
    let y = find("Y");
    assert!(!y.ratio_possible);
    assert_eq!(y.ratio, None);
    assert_eq!(find("W").match_status, MatchStatus::Unmatched);
    assert!(report.rows.iter().all(|r| r.geometry.is_some()));
}

#[test]
fn study_area_does_not_drop_records_of_a_plain_table() {
    let records = vec![Record::new("X", 2022, 120.0), Record::new("Y", 2022, 50.0)];
    let auths = vec![
        AuthorizationEntry::new("X", "100", "R1"),
        AuthorizationEntry::new("Y", "100", "R2"),
    ];
    let options = RatioOptions {
        layer_has_geometry: false,
        ..RatioOptions::default()
    };
    let report = entity_ratio_report(
        &records,
        &auths,
        Some(&zones()),
        &options,
        &RunContext::new(),
    )
    .unwrap();
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.stats.missing_geometry, 0);
}
