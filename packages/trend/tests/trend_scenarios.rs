use geo::{Point, polygon};
use prelev_models::progress::RunContext;
use prelev_models::{Record, SlopeMethod, TheilSenStrategy, YearRange, Zone};
use prelev_spatial::ZoneIndex;
use prelev_trend::{TrendOptions, entity_trends, zone_trends};

fn records_for(id: &str, years: &[(i32, &str)]) -> Vec<Record> {
    years
        .iter()
        .map(|(y, v)| Record::new(id, *y, *v).with_location(Point::new(2.0, 2.0)))
        .collect()
}

#[test]
fn three_valid_years_stay_below_default_gate() {
    let records = records_for("X", &[(2020, "10"), (2021, "12"), (2022, "n/a"), (2023, "15")]);
    let report =
        entity_trends(&records, None, &TrendOptions::default(), &RunContext::new()).unwrap();
    let row = &report.rows[0];
    assert_eq!(row.metrics.n_years, 3);
    assert_eq!(row.metrics.slope, None);
    assert_eq!(report.stats.unparsable_value, 1);
}

#[test]
fn french_formatted_volumes_feed_cagr() {
    let mut years = vec![(2012, "100,0"), (2013, "100"), (2014, "1.000,0")];
    years.extend((2015..2021).map(|y| (y, "150")));
    years.extend([(2021, "200"), (2022, "200"), (2023, "200")]);
    let records = records_for("X", &years);
    let report =
        entity_trends(&records, None, &TrendOptions::default(), &RunContext::new()).unwrap();
    let metrics = &report.rows[0].metrics;
    assert!((metrics.first_period_mean.unwrap() - 400.0).abs() < 1e-9);
    assert!(metrics.slope.is_some());
    assert!(metrics.cagr_pct.unwrap() < 0.0);
}

#[test]
fn theil_sen_strategies_agree_through_pipeline() {
    let records = records_for(
        "X",
        &[
            (2015, "10"),
            (2016, "12"),
            (2017, "900"),
            (2018, "16"),
            (2019, "18"),
            (2020, "20"),
        ],
    );
    let mut options = TrendOptions {
        method: SlopeMethod::TheilSen,
        theil_sen: TheilSenStrategy::Pairwise,
        ..TrendOptions::default()
    };
    let pairwise = entity_trends(&records, None, &options, &RunContext::new()).unwrap();
    options.theil_sen = TheilSenStrategy::Selection;
    let selection = entity_trends(&records, None, &options, &RunContext::new()).unwrap();

    let a = pairwise.rows[0].metrics.slope.unwrap();
    let b = selection.rows[0].metrics.slope.unwrap();
    assert!((a - b).abs() < 1e-12);
    assert!((a - 2.0).abs() < 1e-9);
}

#[test]
fn year_range_limits_zone_series() {
    let zones = ZoneIndex::new(vec![Zone::new(
        "Z",
        polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 5.0, y: 5.0),
            (x: 0.0, y: 5.0),
            (x: 0.0, y: 0.0),
        ],
    )]);
    let records = records_for(
        "X",
        &[(2010, "1"), (2011, "2"), (2012, "3"), (2013, "4"), (2014, "5")],
    );
    let options = TrendOptions {
        year_range: Some(YearRange::new(2011, 2013)),
        min_years: 3,
        ..TrendOptions::default()
    };
    let report = zone_trends(&records, &zones, &options, &RunContext::new()).unwrap();
    assert_eq!(report.rows[0].metrics.n_years, 3);
    assert_eq!(report.zone_years.len(), 3);
    assert_eq!(report.stats.outside_year_range, 2);
}
